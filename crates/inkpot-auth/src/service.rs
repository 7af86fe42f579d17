//! Authentication service layer
//!
//! The state machine behind every auth operation: sign-up, email
//! verification, sign-in, refresh-token rotation, sign-out, the
//! password reset flow, and the current-user query. Each operation
//! first runs its guard chain from the registry, then drives the
//! capability backends (persistence, revocation store, mailer, hasher).

use crate::audit::{audit_log, AuditEvent};
use crate::context::RequestContext;
use crate::guard::{self, Operation};
use crate::{mail, token, url_token};
use futures::future::join_all;
use inkpot_core::{
    normalize_email, AuthConfig, AuthError, Author, AuthorRepository, EmailDetails, MailError,
    Mailer, PasswordHasher, PasswordResetToken, RepositoryError, ResetTokenRepository, Result,
    RevocationStore, User, UserProfile, UserRepository, VerificationToken,
    VerificationTokenRepository, REVOKED_MARKER, VALID_MARKER,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Sign-up request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignUpRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Sign-in request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

/// Email verification request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyEmailRequest {
    pub token: String,
}

/// Password reset request (start of the flow)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

/// Password reset request (end of the flow)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
}

/// Password change request for a signed-in user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// Response carrying a fresh access token. The refresh token never
/// appears here; it travels only in the session cookie.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
}

/// Response for operations that acknowledge with a message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// The capability implementations the service drives
pub struct AuthBackends {
    pub users: Arc<dyn UserRepository>,
    pub authors: Arc<dyn AuthorRepository>,
    pub verification_tokens: Arc<dyn VerificationTokenRepository>,
    pub reset_tokens: Arc<dyn ResetTokenRepository>,
    pub revocations: Arc<dyn RevocationStore>,
    pub mailer: Arc<dyn Mailer>,
    pub hasher: Arc<dyn PasswordHasher>,
}

/// Authentication service
pub struct AuthService {
    config: AuthConfig,
    backends: AuthBackends,
}

impl AuthService {
    /// Create a new authentication service
    pub fn new(config: AuthConfig, backends: AuthBackends) -> Self {
        Self { config, backends }
    }

    /// The active configuration
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Run an operation's guard chain against the context. Every public
    /// operation calls this first; hosts wiring their own dispatch can
    /// also call it directly.
    pub async fn enter(&self, operation: Operation, ctx: &mut RequestContext) -> Result<()> {
        guard::run_guards(
            operation,
            &self.config.tokens,
            self.backends.revocations.as_ref(),
            ctx,
        )
        .await
    }

    /// Register a new account
    ///
    /// Creates the author profile and the unverified user, emails a
    /// verification link, opens a session, and returns a fresh access
    /// token.
    ///
    /// # Arguments
    ///
    /// * `ctx` - Request context (must carry no session cookie)
    /// * `request` - Registration details
    ///
    /// # Returns
    ///
    /// * `Ok(AuthResponse)` - Access token for the new account
    /// * `Err(AuthError)` - `EmailTaken` on duplicates, `Mail` if the
    ///   verification email cannot be delivered
    pub async fn sign_up(
        &self,
        ctx: &mut RequestContext,
        request: SignUpRequest,
    ) -> Result<AuthResponse> {
        self.enter(Operation::SignUp, ctx).await?;

        let email = normalize_email(&request.email);

        // Check if email already exists
        if self.backends.users.find_by_email(&email).await?.is_some() {
            return Err(AuthError::EmailTaken);
        }

        let author = self
            .backends
            .authors
            .create(Author::new(request.name.clone()))
            .await?;

        let password_hash = self
            .backends
            .hasher
            .hash(&request.password)
            .map_err(|e| AuthError::Internal(format!("Failed to hash password: {e}")))?;

        let user = self
            .backends
            .users
            .create(User::new(email.clone(), password_hash, author.id))
            .await
            .map_err(|e| match e {
                // Lost the race against a concurrent sign-up
                RepositoryError::EmailAlreadyExists => AuthError::EmailTaken,
                other => other.into(),
            })?;

        let url_token = url_token::generate();
        self.backends
            .verification_tokens
            .create(VerificationToken::new(email.clone(), url_token.clone()))
            .await?;

        // Awaited before responding: a delivery failure surfaces instead
        // of masquerading as success. The account already exists at this
        // point; resendVerifyEmail recovers from a lost email.
        self.send_bounded(mail::verification_email(
            &self.config.mail,
            &request.name,
            &email,
            &url_token,
        ))
        .await?;
        audit_log(&AuditEvent::VerificationEmailSent {
            email: email.clone(),
            resend: false,
        });

        self.open_session(ctx, user.id).await?;

        audit_log(&AuditEvent::SignUp {
            user_id: user.id,
            email,
        });
        self.access_response(&user)
    }

    /// Send a fresh verification email to the signed-in account
    ///
    /// Older unconsumed verification tokens stay valid; redeeming any of
    /// them consumes all of them.
    pub async fn resend_verify_email(&self, ctx: &mut RequestContext) -> Result<MessageResponse> {
        self.enter(Operation::ResendVerifyEmail, ctx).await?;

        let user = self.principal_user(ctx).await?;
        if user.is_verified {
            return Ok(MessageResponse::new("Account is already verified"));
        }

        let name = self.greeting_name(&user).await?;
        let url_token = url_token::generate();
        self.backends
            .verification_tokens
            .create(VerificationToken::new(user.email.clone(), url_token.clone()))
            .await?;

        self.send_bounded(mail::resend_verification_email(
            &self.config.mail,
            &name,
            &user.email,
            &url_token,
        ))
        .await?;
        audit_log(&AuditEvent::VerificationEmailSent {
            email: user.email.clone(),
            resend: true,
        });

        Ok(MessageResponse::new("Verification email resent"))
    }

    /// Redeem an emailed verification token for the signed-in account
    ///
    /// # Returns
    ///
    /// * `Ok(MessageResponse)` - Verified, or the already-verified no-op
    /// * `Err(AuthError)` - `InvalidToken` for unknown tokens,
    ///   `TokenExpired` outside the validity window
    pub async fn verify_email(
        &self,
        ctx: &mut RequestContext,
        request: VerifyEmailRequest,
    ) -> Result<MessageResponse> {
        self.enter(Operation::VerifyEmail, ctx).await?;

        let user = self.principal_user(ctx).await?;
        if user.is_verified {
            return Ok(MessageResponse::new("Account is already verified"));
        }

        let record = self
            .backends
            .verification_tokens
            .find_by_token_and_email(&request.token, &user.email)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        if record.is_expired(self.config.url_token_window()) {
            return Err(AuthError::TokenExpired);
        }

        // Redeeming one token consumes every outstanding token for the
        // email, then the flag flips.
        self.backends
            .verification_tokens
            .delete_all_for_email(&user.email)
            .await?;
        self.backends.users.mark_verified(user.id).await?;

        audit_log(&AuditEvent::EmailVerified {
            user_id: user.id,
            email: user.email.clone(),
        });

        // Deliberately no token issuance here; the verified flag reaches
        // access claims when the client next refreshes.
        Ok(MessageResponse::new("Account is verified"))
    }

    /// Sign in with email and password
    ///
    /// Unknown email and wrong password are indistinguishable to the
    /// caller.
    pub async fn sign_in(
        &self,
        ctx: &mut RequestContext,
        request: SignInRequest,
    ) -> Result<AuthResponse> {
        self.enter(Operation::SignIn, ctx).await?;

        let email = normalize_email(&request.email);

        let Some(user) = self.backends.users.find_by_email(&email).await? else {
            audit_log(&AuditEvent::SignInFailure {
                email,
                reason: "unknown email".to_string(),
            });
            return Err(AuthError::InvalidCredentials);
        };

        let password_valid = self
            .backends
            .hasher
            .verify(&user.password_hash, &request.password)
            .map_err(|e| AuthError::Internal(format!("Failed to verify password: {e}")))?;

        if !password_valid {
            audit_log(&AuditEvent::SignInFailure {
                email,
                reason: "wrong password".to_string(),
            });
            return Err(AuthError::InvalidCredentials);
        }

        self.open_session(ctx, user.id).await?;
        audit_log(&AuditEvent::SignInSuccess {
            user_id: user.id,
            email,
        });
        self.access_response(&user)
    }

    /// Rotate the session's refresh token and mint a fresh access token
    ///
    /// The presented cookie is blacklisted before its replacement is
    /// issued, so each refresh token works exactly once.
    pub async fn refresh(&self, ctx: &mut RequestContext) -> Result<AuthResponse> {
        self.enter(Operation::Refresh, ctx).await?;

        let session = ctx.session.clone().ok_or(AuthError::Unauthorized)?;
        let user = self
            .backends
            .users
            .find_by_id(session.user_id)
            .await?
            .ok_or(AuthError::Unauthorized)?;

        self.backends
            .revocations
            .set(&session.cookie_value, REVOKED_MARKER)
            .await?;

        self.open_session(ctx, user.id).await?;
        audit_log(&AuditEvent::TokenRefresh { user_id: user.id });
        self.access_response(&user)
    }

    /// End the current session
    ///
    /// Blacklists the presented cookie (a no-op if it already is) and
    /// clears the session cookie.
    pub async fn sign_out(&self, ctx: &mut RequestContext) -> Result<MessageResponse> {
        self.enter(Operation::SignOut, ctx).await?;

        let session = ctx.session.clone().ok_or(AuthError::Unauthorized)?;
        self.backends
            .revocations
            .set(&session.cookie_value, REVOKED_MARKER)
            .await?;
        ctx.clear_session_cookie();

        audit_log(&AuditEvent::SignOut {
            user_id: session.user_id,
        });
        Ok(MessageResponse::new("Signed out"))
    }

    /// Start the password reset flow
    ///
    /// The response is identical whether or not the account exists; only
    /// existing accounts get mail. A relay failure is logged, never
    /// surfaced, for the same reason.
    pub async fn forgot_password(
        &self,
        ctx: &mut RequestContext,
        request: ForgotPasswordRequest,
    ) -> Result<MessageResponse> {
        self.enter(Operation::ForgotPassword, ctx).await?;

        let email = normalize_email(&request.email);

        if let Some(user) = self.backends.users.find_by_email(&email).await? {
            let url_token = url_token::generate();
            self.backends
                .reset_tokens
                .create(PasswordResetToken::new(email.clone(), url_token.clone()))
                .await?;

            let name = self.greeting_name(&user).await?;
            if let Err(e) = self
                .send_bounded(mail::password_reset_email(
                    &self.config.mail,
                    &name,
                    &email,
                    &url_token,
                ))
                .await
            {
                tracing::warn!(error = %e, "Failed to send password reset email");
            }
            audit_log(&AuditEvent::PasswordResetRequested {
                email,
                account_exists: true,
            });
        } else {
            audit_log(&AuditEvent::PasswordResetRequested {
                email,
                account_exists: false,
            });
        }

        Ok(MessageResponse::new(
            "If that account exists, an email has been sent",
        ))
    }

    /// Complete the password reset flow with an emailed token
    ///
    /// Stores the new hash, consumes the token, and blacklists every
    /// session ever issued to the account.
    pub async fn reset_password(
        &self,
        ctx: &mut RequestContext,
        request: ResetPasswordRequest,
    ) -> Result<MessageResponse> {
        self.enter(Operation::ResetPassword, ctx).await?;

        let record = self
            .backends
            .reset_tokens
            .find_by_token(&request.token)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        if record.is_expired(self.config.url_token_window()) {
            return Err(AuthError::TokenExpired);
        }

        // The account behind the token must still exist.
        let user = self
            .backends
            .users
            .find_by_email(&record.email)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        let password_hash = self
            .backends
            .hasher
            .hash(&request.password)
            .map_err(|e| AuthError::Internal(format!("Failed to hash password: {e}")))?;
        self.backends
            .users
            .update_password(user.id, &password_hash)
            .await?;

        // Single use
        self.backends.reset_tokens.delete(record.id).await?;

        // Every session issued before the reset dies with it.
        self.revoke_all_sessions(user.id).await?;

        audit_log(&AuditEvent::PasswordReset {
            user_id: user.id,
            email: user.email.clone(),
        });
        Ok(MessageResponse::new("Password has been reset"))
    }

    /// Replace the password of the signed-in account
    ///
    /// Requires the current password, and revokes outstanding sessions
    /// exactly like the reset flow does.
    pub async fn change_password(
        &self,
        ctx: &mut RequestContext,
        request: ChangePasswordRequest,
    ) -> Result<MessageResponse> {
        self.enter(Operation::ChangePassword, ctx).await?;

        let user = self.principal_user(ctx).await?;

        let current_valid = self
            .backends
            .hasher
            .verify(&user.password_hash, &request.current_password)
            .map_err(|e| AuthError::Internal(format!("Failed to verify password: {e}")))?;
        if !current_valid {
            return Err(AuthError::InvalidCredentials);
        }

        let password_hash = self
            .backends
            .hasher
            .hash(&request.new_password)
            .map_err(|e| AuthError::Internal(format!("Failed to hash password: {e}")))?;
        self.backends
            .users
            .update_password(user.id, &password_hash)
            .await?;

        self.revoke_all_sessions(user.id).await?;

        audit_log(&AuditEvent::PasswordChanged {
            user_id: user.id,
            email: user.email.clone(),
        });
        Ok(MessageResponse::new("Password has been changed"))
    }

    /// The signed-in account's profile, author relation included
    pub async fn current_user(&self, ctx: &mut RequestContext) -> Result<UserProfile> {
        self.enter(Operation::CurrentUser, ctx).await?;

        let user = self.principal_user(ctx).await?;
        let author = self
            .backends
            .authors
            .find_by_id(user.author_id)
            .await?
            .ok_or_else(|| AuthError::Internal("Author profile missing".to_string()))?;

        Ok(user.to_profile(author))
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Fresh account load for an operation running behind the access
    /// guard. The guard vouches for the claims; the record itself can
    /// have changed since the token was issued.
    async fn principal_user(&self, ctx: &RequestContext) -> Result<User> {
        let principal = ctx.principal.as_ref().ok_or(AuthError::Unauthorized)?;
        self.backends
            .users
            .find_by_id(principal.user_id)
            .await?
            .ok_or(AuthError::Unauthorized)
    }

    /// Issue a refresh token, record its session key as live, and queue
    /// the session cookie
    async fn open_session(&self, ctx: &RequestContext, user_id: Uuid) -> Result<()> {
        let signed = token::issue_refresh_token(&self.config.tokens, user_id)
            .map_err(|e| AuthError::Internal(format!("Failed to generate refresh token: {e}")))?;
        let cookie = token::session_cookie_value(user_id, &signed);

        // Recording the key at issuance is what makes the later prefix
        // scan complete.
        self.backends.revocations.set(&cookie, VALID_MARKER).await?;
        ctx.set_session_cookie(&cookie, self.config.refresh_ttl().num_seconds());
        Ok(())
    }

    fn access_response(&self, user: &User) -> Result<AuthResponse> {
        let access_token = token::issue_access_token(&self.config.tokens, user.id, user.is_verified)
            .map_err(|e| AuthError::Internal(format!("Failed to generate access token: {e}")))?;

        Ok(AuthResponse {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: self.config.tokens.access_ttl_secs,
        })
    }

    /// Blacklist every session key recorded for a user. The writes are
    /// independent and idempotent, so they run concurrently.
    async fn revoke_all_sessions(&self, user_id: Uuid) -> Result<usize> {
        let prefix = token::session_key_prefix(user_id);
        let keys = self.backends.revocations.scan_prefix(&prefix).await?;
        let count = keys.len();

        let writes = keys
            .iter()
            .map(|key| self.backends.revocations.set(key, REVOKED_MARKER));
        for result in join_all(writes).await {
            result?;
        }

        audit_log(&AuditEvent::SessionsRevoked { user_id, count });
        Ok(count)
    }

    /// Display name for email greetings. Falls back when the author
    /// relation is missing rather than blocking the mail.
    async fn greeting_name(&self, user: &User) -> Result<String> {
        let author = self.backends.authors.find_by_id(user.author_id).await?;
        Ok(author.map(|a| a.name).unwrap_or_else(|| "there".to_string()))
    }

    /// Send with the configured upper bound so a hung relay cannot
    /// stall the operation
    async fn send_bounded(&self, email: EmailDetails) -> Result<(), MailError> {
        let timeout = self.config.mail_timeout();
        match tokio::time::timeout(timeout, self.backends.mailer.send(email)).await {
            Ok(result) => result,
            Err(_) => Err(MailError::Timeout(timeout.as_secs())),
        }
    }
}
