//! Auth Flow Integration Tests
//!
//! End-to-end runs of the authentication state machine against the
//! in-memory backends: sign-up through verification, session rotation,
//! sign-out, and both password-recovery paths.
//!
//! Author: hephaex@gmail.com

use chrono::Duration;
use inkpot_auth::test_support::{
    extract_token, test_config, TestCookieJar, TestHarness, TEST_PASSWORD,
};
use inkpot_auth::{
    decode_access_token, parse_session_cookie, ChangePasswordRequest, ForgotPasswordRequest,
    ResetPasswordRequest, SignInRequest, VerifyEmailRequest,
};
use inkpot_core::{
    AuthError, CookieJar as _, CookieOptions, RevocationStore, UserRepository, REVOKED_MARKER,
    SESSION_COOKIE, VALID_MARKER,
};
use std::sync::Arc;

/// Route audit output through the test writer; `RUST_LOG=audit=info`
/// makes the security trail visible on failures
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "inkpot_auth=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

/// Put a raw cookie value into a fresh jar, as a client replaying an old
/// session would
fn jar_with_cookie(value: &str) -> Arc<TestCookieJar> {
    let jar = Arc::new(TestCookieJar::new());
    jar.set(
        SESSION_COOKIE,
        value,
        CookieOptions {
            max_age_secs: 3600,
            http_only: true,
        },
    );
    jar
}

fn sign_in_request(email: &str, password: &str) -> SignInRequest {
    SignInRequest {
        email: email.to_string(),
        password: password.to_string(),
    }
}

// =============================================================================
// Sign-up and Email Verification
// =============================================================================

#[tokio::test]
async fn test_sign_up_opens_session_and_returns_access_token() {
    let harness = TestHarness::new();
    let (response, ctx) = harness.sign_up_user("Ivy", "ivy@blog.io").await;

    assert_eq!(response.token_type, "Bearer");
    assert_eq!(response.expires_in, test_config().tokens.access_ttl_secs);

    let claims = decode_access_token(&test_config().tokens, &response.access_token).unwrap();
    assert!(!claims.verified);

    // The jar now holds a session cookie keyed by the same account
    let cookie = ctx.session_cookie().expect("session cookie should be set");
    let (user_id, signed) = parse_session_cookie(&cookie).expect("cookie should parse");
    assert_eq!(user_id, claims.user_id().unwrap());
    assert!(!signed.is_empty());

    // The session key was recorded as live at issuance
    let marker = harness.revocations.get(&cookie).await.unwrap();
    assert_eq!(marker.as_deref(), Some(VALID_MARKER));
}

#[tokio::test]
async fn test_sign_up_stores_normalized_email() {
    let harness = TestHarness::new();
    harness.sign_up_user("Max", "  MAX@Blog.IO ").await;

    let stored = harness.users.find_by_email("max@blog.io").await.unwrap();
    assert!(stored.is_some());

    // The verification email also goes to the normalized address
    assert_eq!(harness.mailer.last().unwrap().to, "max@blog.io");
}

#[tokio::test]
async fn test_sign_up_sends_verification_link() {
    let harness = TestHarness::new();
    harness.sign_up_user("Nia", "nia@blog.io").await;

    let email = harness.mailer.last().unwrap();
    assert_eq!(email.subject, "Verify email | Inkpot");
    assert!(email
        .html
        .contains("http://localhost:3000/verify-email?token="));

    let token = extract_token(&email).unwrap();
    assert_eq!(token.len(), 43);
}

#[tokio::test]
async fn test_verify_email_end_to_end() {
    init_tracing();
    let harness = TestHarness::new();
    let (signup, ctx) = harness.sign_up_user("Erin", "erin@blog.io").await;
    let token = extract_token(&harness.mailer.last().unwrap()).unwrap();

    let mut verify_ctx = harness.bearer_context(&signup.access_token);
    let response = harness
        .service
        .verify_email(&mut verify_ctx, VerifyEmailRequest { token })
        .await
        .unwrap();
    assert_eq!(response.message, "Account is verified");

    // The pre-verification access token still carries verified=false, so
    // the user query stays closed until the client refreshes
    let mut stale_ctx = harness.bearer_context(&signup.access_token);
    let result = harness.service.current_user(&mut stale_ctx).await;
    assert!(matches!(result, Err(AuthError::NotVerified)));

    let mut refresh_ctx = harness.context_with_jar(ctx.cookies.clone());
    let refreshed = harness.service.refresh(&mut refresh_ctx).await.unwrap();
    let claims = decode_access_token(&test_config().tokens, &refreshed.access_token).unwrap();
    assert!(claims.verified);

    let mut me_ctx = harness.bearer_context(&refreshed.access_token);
    let profile = harness.service.current_user(&mut me_ctx).await.unwrap();
    assert_eq!(profile.email, "erin@blog.io");
    assert_eq!(profile.author.name, "Erin");
    assert!(profile.is_verified);
}

#[tokio::test]
async fn test_verify_email_inside_validity_window() {
    let harness = TestHarness::new();
    let (signup, _ctx) = harness.sign_up_user("Oli", "oli@blog.io").await;
    let token = extract_token(&harness.mailer.last().unwrap()).unwrap();

    // 59 minutes old: still inside the 60-minute window
    harness.verification_tokens.age_records(Duration::minutes(59));

    let mut ctx = harness.bearer_context(&signup.access_token);
    let response = harness
        .service
        .verify_email(&mut ctx, VerifyEmailRequest { token })
        .await
        .unwrap();
    assert_eq!(response.message, "Account is verified");
}

#[tokio::test]
async fn test_verify_email_past_validity_window() {
    let harness = TestHarness::new();
    let (signup, _ctx) = harness.sign_up_user("Pam", "pam@blog.io").await;
    let token = extract_token(&harness.mailer.last().unwrap()).unwrap();

    harness.verification_tokens.age_records(Duration::minutes(61));

    let mut ctx = harness.bearer_context(&signup.access_token);
    let result = harness
        .service
        .verify_email(&mut ctx, VerifyEmailRequest { token })
        .await;
    assert!(matches!(result, Err(AuthError::TokenExpired)));

    // The expired record is still there; nothing was consumed
    assert_eq!(harness.verification_tokens.len(), 1);
}

#[tokio::test]
async fn test_verify_email_rejects_unknown_token() {
    let harness = TestHarness::new();
    let (signup, _ctx) = harness.sign_up_user("Quin", "quin@blog.io").await;

    let mut ctx = harness.bearer_context(&signup.access_token);
    let result = harness
        .service
        .verify_email(
            &mut ctx,
            VerifyEmailRequest {
                token: "not-a-token-anyone-issued".to_string(),
            },
        )
        .await;
    assert!(matches!(result, Err(AuthError::InvalidToken)));
}

#[tokio::test]
async fn test_resend_verify_email_noop_when_already_verified() {
    let harness = TestHarness::new();
    let (signup, _ctx) = harness.sign_up_user("Rob", "rob@blog.io").await;
    let token = extract_token(&harness.mailer.last().unwrap()).unwrap();

    let mut verify_ctx = harness.bearer_context(&signup.access_token);
    harness
        .service
        .verify_email(&mut verify_ctx, VerifyEmailRequest { token })
        .await
        .unwrap();

    // Resend against a verified account short-circuits: no new token,
    // no new mail
    let mut resend_ctx = harness.bearer_context(&signup.access_token);
    let response = harness
        .service
        .resend_verify_email(&mut resend_ctx)
        .await
        .unwrap();
    assert_eq!(response.message, "Account is already verified");
    assert_eq!(harness.mailer.sent().len(), 1);
    assert_eq!(harness.verification_tokens.len(), 0);
}

// =============================================================================
// Sign-in
// =============================================================================

#[tokio::test]
async fn test_sign_in_accepts_case_variant_email() {
    let harness = TestHarness::new();
    harness.sign_up_user("Rita", "rita@blog.io").await;

    let mut ctx = harness.context();
    let response = harness
        .service
        .sign_in(&mut ctx, sign_in_request(" RITA@BLOG.IO ", TEST_PASSWORD))
        .await;
    assert!(response.is_ok());

    // Two live sessions now share the account's key prefix
    let user = harness
        .users
        .find_by_email("rita@blog.io")
        .await
        .unwrap()
        .unwrap();
    let keys = harness
        .revocations
        .scan_prefix(&format!("{}:", user.id))
        .await
        .unwrap();
    assert_eq!(keys.len(), 2);
}

// =============================================================================
// Refresh Rotation
// =============================================================================

#[tokio::test]
async fn test_refresh_rotates_session_cookie() {
    init_tracing();
    let harness = TestHarness::new();
    let (_, ctx) = harness.sign_up_user("Sam", "sam@blog.io").await;
    let old_cookie = ctx.session_cookie().unwrap();

    let mut refresh_ctx = harness.context_with_jar(ctx.cookies.clone());
    let refreshed = harness.service.refresh(&mut refresh_ctx).await.unwrap();
    assert!(!refreshed.access_token.is_empty());

    let new_cookie = refresh_ctx.session_cookie().unwrap();
    assert_ne!(new_cookie, old_cookie);

    // Old key blacklisted, replacement recorded as live
    let old_marker = harness.revocations.get(&old_cookie).await.unwrap();
    assert_eq!(old_marker.as_deref(), Some(REVOKED_MARKER));
    let new_marker = harness.revocations.get(&new_cookie).await.unwrap();
    assert_eq!(new_marker.as_deref(), Some(VALID_MARKER));
}

#[tokio::test]
async fn test_refresh_rejects_replayed_token() {
    let harness = TestHarness::new();
    let (_, ctx) = harness.sign_up_user("Tess", "tess@blog.io").await;
    let old_cookie = ctx.session_cookie().unwrap();

    let mut refresh_ctx = harness.context_with_jar(ctx.cookies.clone());
    harness.service.refresh(&mut refresh_ctx).await.unwrap();

    // Replaying the rotated-out cookie fails the refresh guard
    let mut replay_ctx = harness.context_with_jar(jar_with_cookie(&old_cookie));
    let result = harness.service.refresh(&mut replay_ctx).await;
    assert!(matches!(result, Err(AuthError::Unauthorized)));
}

#[tokio::test]
async fn test_refresh_fails_after_account_deletion() {
    let harness = TestHarness::new();
    let (_, ctx) = harness.sign_up_user("Uma", "uma@blog.io").await;

    let cookie = ctx.session_cookie().unwrap();
    let (user_id, _) = parse_session_cookie(&cookie).unwrap();
    harness.users.delete(user_id).await.unwrap();

    let mut refresh_ctx = harness.context_with_jar(ctx.cookies.clone());
    let result = harness.service.refresh(&mut refresh_ctx).await;
    assert!(matches!(result, Err(AuthError::Unauthorized)));
}

// =============================================================================
// Sign-out
// =============================================================================

#[tokio::test]
async fn test_sign_out_blacklists_and_clears_cookie() {
    let harness = TestHarness::new();
    let (_, ctx) = harness.sign_up_user("Vic", "vic@blog.io").await;
    let cookie = ctx.session_cookie().unwrap();

    let mut sign_out_ctx = harness.context_with_jar(ctx.cookies.clone());
    let response = harness.service.sign_out(&mut sign_out_ctx).await.unwrap();
    assert_eq!(response.message, "Signed out");

    // Cookie gone from the jar, key blacklisted in the store
    assert!(sign_out_ctx.session_cookie().is_none());
    let marker = harness.revocations.get(&cookie).await.unwrap();
    assert_eq!(marker.as_deref(), Some(REVOKED_MARKER));

    // A replay of the dead cookie cannot refresh
    let mut replay_ctx = harness.context_with_jar(jar_with_cookie(&cookie));
    let result = harness.service.refresh(&mut replay_ctx).await;
    assert!(matches!(result, Err(AuthError::Unauthorized)));
}

#[tokio::test]
async fn test_sign_out_requires_session() {
    let harness = TestHarness::new();

    let mut ctx = harness.context();
    let result = harness.service.sign_out(&mut ctx).await;
    assert!(matches!(result, Err(AuthError::Unauthorized)));
}

// =============================================================================
// Password Reset Flow
// =============================================================================

#[tokio::test]
async fn test_forgot_password_emails_reset_link() {
    let harness = TestHarness::new();
    harness.sign_up_user("Wes", "wes@blog.io").await;

    let mut ctx = harness.context();
    let response = harness
        .service
        .forgot_password(
            &mut ctx,
            ForgotPasswordRequest {
                email: "wes@blog.io".to_string(),
            },
        )
        .await
        .unwrap();
    assert_eq!(response.message, "If that account exists, an email has been sent");

    let email = harness.mailer.last().unwrap();
    assert_eq!(email.subject, "Forgot password | Inkpot");
    assert!(email
        .html
        .contains("http://localhost:3000/reset-password?token="));
    assert_eq!(harness.reset_tokens.len(), 1);
}

#[tokio::test]
async fn test_forgot_password_guard_blocks_signed_in_clients() {
    let harness = TestHarness::new();
    let (_, ctx) = harness.sign_up_user("Xan", "xan@blog.io").await;

    let mut again = harness.context_with_jar(ctx.cookies.clone());
    let result = harness
        .service
        .forgot_password(
            &mut again,
            ForgotPasswordRequest {
                email: "xan@blog.io".to_string(),
            },
        )
        .await;
    assert!(matches!(result, Err(AuthError::AlreadySignedIn)));
}

#[tokio::test]
async fn test_reset_password_revokes_every_session() {
    init_tracing();
    let harness = TestHarness::new();
    let (_, first_session) = harness.sign_up_user("Yan", "yan@blog.io").await;

    // A second device signs in
    let mut second_session = harness.context();
    harness
        .service
        .sign_in(
            &mut second_session,
            sign_in_request("yan@blog.io", TEST_PASSWORD),
        )
        .await
        .unwrap();

    let mut forgot_ctx = harness.context();
    harness
        .service
        .forgot_password(
            &mut forgot_ctx,
            ForgotPasswordRequest {
                email: "yan@blog.io".to_string(),
            },
        )
        .await
        .unwrap();
    let token = extract_token(&harness.mailer.last().unwrap()).unwrap();

    let mut reset_ctx = harness.context();
    let response = harness
        .service
        .reset_password(
            &mut reset_ctx,
            ResetPasswordRequest {
                token,
                password: "Brand-new pa55phrase".to_string(),
            },
        )
        .await
        .unwrap();
    assert_eq!(response.message, "Password has been reset");
    assert!(harness.reset_tokens.is_empty());

    // Both pre-reset sessions are dead
    let mut replay_first = harness.context_with_jar(first_session.cookies.clone());
    assert!(matches!(
        harness.service.refresh(&mut replay_first).await,
        Err(AuthError::Unauthorized)
    ));
    let mut replay_second = harness.context_with_jar(second_session.cookies.clone());
    assert!(matches!(
        harness.service.refresh(&mut replay_second).await,
        Err(AuthError::Unauthorized)
    ));

    // Only the new password opens the account
    let mut old_password_ctx = harness.context();
    assert!(matches!(
        harness
            .service
            .sign_in(
                &mut old_password_ctx,
                sign_in_request("yan@blog.io", TEST_PASSWORD)
            )
            .await,
        Err(AuthError::InvalidCredentials)
    ));
    let mut new_password_ctx = harness.context();
    assert!(harness
        .service
        .sign_in(
            &mut new_password_ctx,
            sign_in_request("yan@blog.io", "Brand-new pa55phrase")
        )
        .await
        .is_ok());
}

#[tokio::test]
async fn test_reset_password_token_is_single_use() {
    let harness = TestHarness::new();
    harness.sign_up_user("Zoe", "zoe@blog.io").await;

    let mut forgot_ctx = harness.context();
    harness
        .service
        .forgot_password(
            &mut forgot_ctx,
            ForgotPasswordRequest {
                email: "zoe@blog.io".to_string(),
            },
        )
        .await
        .unwrap();
    let token = extract_token(&harness.mailer.last().unwrap()).unwrap();

    let mut reset_ctx = harness.context();
    harness
        .service
        .reset_password(
            &mut reset_ctx,
            ResetPasswordRequest {
                token: token.clone(),
                password: "First new pa55phrase".to_string(),
            },
        )
        .await
        .unwrap();

    let mut second_ctx = harness.context();
    let result = harness
        .service
        .reset_password(
            &mut second_ctx,
            ResetPasswordRequest {
                token,
                password: "Second new pa55phrase".to_string(),
            },
        )
        .await;
    assert!(matches!(result, Err(AuthError::InvalidToken)));
}

#[tokio::test]
async fn test_reset_password_past_validity_window() {
    let harness = TestHarness::new();
    harness.sign_up_user("Abe", "abe@blog.io").await;

    let mut forgot_ctx = harness.context();
    harness
        .service
        .forgot_password(
            &mut forgot_ctx,
            ForgotPasswordRequest {
                email: "abe@blog.io".to_string(),
            },
        )
        .await
        .unwrap();
    let token = extract_token(&harness.mailer.last().unwrap()).unwrap();

    harness.reset_tokens.age_records(Duration::minutes(61));

    let mut reset_ctx = harness.context();
    let result = harness
        .service
        .reset_password(
            &mut reset_ctx,
            ResetPasswordRequest {
                token,
                password: "Too late pa55phrase".to_string(),
            },
        )
        .await;
    assert!(matches!(result, Err(AuthError::TokenExpired)));
}

#[tokio::test]
async fn test_reset_password_when_account_deleted() {
    let harness = TestHarness::new();
    let (_, ctx) = harness.sign_up_user("Ben", "ben@blog.io").await;

    let mut forgot_ctx = harness.context();
    harness
        .service
        .forgot_password(
            &mut forgot_ctx,
            ForgotPasswordRequest {
                email: "ben@blog.io".to_string(),
            },
        )
        .await
        .unwrap();
    let token = extract_token(&harness.mailer.last().unwrap()).unwrap();

    let cookie = ctx.session_cookie().unwrap();
    let (user_id, _) = parse_session_cookie(&cookie).unwrap();
    harness.users.delete(user_id).await.unwrap();

    let mut reset_ctx = harness.context();
    let result = harness
        .service
        .reset_password(
            &mut reset_ctx,
            ResetPasswordRequest {
                token,
                password: "Orphaned pa55phrase".to_string(),
            },
        )
        .await;
    assert!(matches!(result, Err(AuthError::InvalidToken)));
}

// =============================================================================
// Change Password
// =============================================================================

#[tokio::test]
async fn test_change_password_revokes_every_session() {
    init_tracing();
    let harness = TestHarness::new();
    let (signup, first_session) = harness.sign_up_user("Cal", "cal@blog.io").await;

    let mut second_session = harness.context();
    harness
        .service
        .sign_in(
            &mut second_session,
            sign_in_request("cal@blog.io", TEST_PASSWORD),
        )
        .await
        .unwrap();

    let mut change_ctx = harness.bearer_context(&signup.access_token);
    let response = harness
        .service
        .change_password(
            &mut change_ctx,
            ChangePasswordRequest {
                current_password: TEST_PASSWORD.to_string(),
                new_password: "Rotated pa55phrase".to_string(),
            },
        )
        .await
        .unwrap();
    assert_eq!(response.message, "Password has been changed");

    // Both refresh tokens are now blacklisted
    let mut replay_first = harness.context_with_jar(first_session.cookies.clone());
    assert!(matches!(
        harness.service.refresh(&mut replay_first).await,
        Err(AuthError::Unauthorized)
    ));
    let mut replay_second = harness.context_with_jar(second_session.cookies.clone());
    assert!(matches!(
        harness.service.refresh(&mut replay_second).await,
        Err(AuthError::Unauthorized)
    ));

    let mut sign_in_ctx = harness.context();
    assert!(harness
        .service
        .sign_in(
            &mut sign_in_ctx,
            sign_in_request("cal@blog.io", "Rotated pa55phrase")
        )
        .await
        .is_ok());
}

#[tokio::test]
async fn test_change_password_requires_access_token() {
    let harness = TestHarness::new();
    harness.sign_up_user("Dot", "dot@blog.io").await;

    let mut ctx = harness.context();
    let result = harness
        .service
        .change_password(
            &mut ctx,
            ChangePasswordRequest {
                current_password: TEST_PASSWORD.to_string(),
                new_password: "Whatever pa55phrase".to_string(),
            },
        )
        .await;
    assert!(matches!(result, Err(AuthError::Unauthorized)));
}

// =============================================================================
// Guard Wiring
// =============================================================================

#[tokio::test]
async fn test_current_user_requires_verified_account() {
    let harness = TestHarness::new();
    let (signup, _ctx) = harness.sign_up_user("Eli", "eli@blog.io").await;

    let mut ctx = harness.bearer_context(&signup.access_token);
    let result = harness.service.current_user(&mut ctx).await;
    assert!(matches!(result, Err(AuthError::NotVerified)));
}

#[tokio::test]
async fn test_tampered_access_token_is_rejected() {
    let harness = TestHarness::new();
    let (signup, _ctx) = harness.sign_up_user("Fin", "fin@blog.io").await;

    let parts: Vec<&str> = signup.access_token.split('.').collect();
    let tampered = format!("{}.{}.dGFtcGVyZWQ", parts[0], parts[1]);

    let mut ctx = harness.bearer_context(&tampered);
    let result = harness.service.current_user(&mut ctx).await;
    assert!(matches!(result, Err(AuthError::Unauthorized)));
}

#[tokio::test]
async fn test_refresh_token_cannot_act_as_access_token() {
    let harness = TestHarness::new();
    let (_, ctx) = harness.sign_up_user("Gus", "gus@blog.io").await;

    // Lift the signed refresh token out of the cookie and present it as
    // a bearer token; the families use different secrets
    let cookie = ctx.session_cookie().unwrap();
    let (_, signed_refresh) = parse_session_cookie(&cookie).unwrap();

    let mut bearer_ctx = harness.bearer_context(signed_refresh);
    let result = harness.service.current_user(&mut bearer_ctx).await;
    assert!(matches!(result, Err(AuthError::Unauthorized)));
}
