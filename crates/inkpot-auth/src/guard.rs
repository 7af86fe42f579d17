//! Operation guards and the operation registry
//!
//! Guards are explicit, composable pre-checks that run before an
//! operation body. Each one either annotates the [`RequestContext`] with
//! an identity it has vetted or short-circuits with a taxonomy error.
//! The registry maps every operation to its guard chain statically, so
//! the full protection matrix is visible in one place and a host can
//! build its dispatch table from [`Operation::ALL`].

use crate::audit::{audit_log, AuditEvent};
use crate::context::{Principal, RequestContext, SessionTicket};
use crate::token;
use inkpot_core::config::TokenConfig;
use inkpot_core::{AuthError, Result, RevocationStore, REVOKED_MARKER};

/// A single pre-check run before an operation body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    /// Requires a valid bearer access token; annotates the context with
    /// the [`Principal`]
    AccessToken,

    /// Requires a valid, unrevoked session cookie; annotates the context
    /// with the [`SessionTicket`]
    RefreshToken,

    /// Requires the principal's verified flag (chain it after
    /// [`Guard::AccessToken`])
    Verified,

    /// Requires the absence of a session cookie
    NotSignedIn,
}

/// Every operation the auth subsystem exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    SignUp,
    ResendVerifyEmail,
    VerifyEmail,
    SignIn,
    Refresh,
    SignOut,
    ForgotPassword,
    ResetPassword,
    ChangePassword,
    CurrentUser,
}

impl Operation {
    /// The complete registry, in the order hosts usually expose the
    /// operations
    pub const ALL: &'static [Operation] = &[
        Operation::SignUp,
        Operation::ResendVerifyEmail,
        Operation::VerifyEmail,
        Operation::SignIn,
        Operation::Refresh,
        Operation::SignOut,
        Operation::ForgotPassword,
        Operation::ResetPassword,
        Operation::ChangePassword,
        Operation::CurrentUser,
    ];

    /// The guard chain protecting this operation, in execution order
    pub fn guards(self) -> &'static [Guard] {
        match self {
            Operation::SignUp => &[Guard::NotSignedIn],
            Operation::ResendVerifyEmail => &[Guard::AccessToken],
            Operation::VerifyEmail => &[Guard::AccessToken],
            Operation::SignIn => &[Guard::NotSignedIn],
            Operation::Refresh => &[Guard::RefreshToken],
            Operation::SignOut => &[Guard::RefreshToken],
            Operation::ForgotPassword => &[Guard::NotSignedIn],
            Operation::ResetPassword => &[],
            Operation::ChangePassword => &[Guard::AccessToken],
            Operation::CurrentUser => &[Guard::AccessToken, Guard::Verified],
        }
    }

    /// Wire name of the operation
    pub fn name(self) -> &'static str {
        match self {
            Operation::SignUp => "signUp",
            Operation::ResendVerifyEmail => "resendVerifyEmail",
            Operation::VerifyEmail => "verifyEmail",
            Operation::SignIn => "signIn",
            Operation::Refresh => "refresh",
            Operation::SignOut => "signOut",
            Operation::ForgotPassword => "forgotPassword",
            Operation::ResetPassword => "resetPassword",
            Operation::ChangePassword => "changePassword",
            Operation::CurrentUser => "user",
        }
    }
}

/// Run an operation's guard chain in declared order. The first failure
/// wins and the body never runs.
pub async fn run_guards(
    operation: Operation,
    config: &TokenConfig,
    store: &dyn RevocationStore,
    ctx: &mut RequestContext,
) -> Result<()> {
    for guard in operation.guards() {
        match guard {
            Guard::AccessToken => check_access_token(config, ctx)?,
            Guard::RefreshToken => check_refresh_token(config, store, ctx).await?,
            Guard::Verified => check_verified(ctx)?,
            Guard::NotSignedIn => check_not_signed_in(ctx)?,
        }
    }
    Ok(())
}

/// Require a valid bearer access token and record the [`Principal`].
///
/// Every codec failure collapses to [`AuthError::Unauthorized`]; the
/// specific reason goes to the audit log only.
pub fn check_access_token(config: &TokenConfig, ctx: &mut RequestContext) -> Result<()> {
    let Some(bearer) = ctx.bearer_token() else {
        return Err(AuthError::Unauthorized);
    };

    let claims = match token::decode_access_token(config, bearer) {
        Ok(claims) => claims,
        Err(e) => {
            audit_log(&AuditEvent::TokenRejected {
                token_kind: "access".to_string(),
                reason: e.to_string(),
            });
            return Err(AuthError::Unauthorized);
        }
    };

    let user_id = claims.user_id().map_err(|_| AuthError::Unauthorized)?;
    ctx.principal = Some(Principal {
        user_id,
        verified: claims.verified,
    });
    Ok(())
}

/// Require a valid, unrevoked session cookie and record the
/// [`SessionTicket`].
///
/// The cookie must parse as `"<userId>:<signedToken>"`, the signed part
/// must verify under the refresh secret, the embedded user id must match
/// the claims, and the full cookie value must not be blacklisted in the
/// revocation store.
pub async fn check_refresh_token(
    config: &TokenConfig,
    store: &dyn RevocationStore,
    ctx: &mut RequestContext,
) -> Result<()> {
    let cookie = ctx.session_cookie().ok_or(AuthError::Unauthorized)?;

    let Some((user_id, signed)) = token::parse_session_cookie(&cookie) else {
        audit_log(&AuditEvent::TokenRejected {
            token_kind: "refresh".to_string(),
            reason: "malformed session cookie".to_string(),
        });
        return Err(AuthError::Unauthorized);
    };

    let claims = match token::decode_refresh_token(config, signed) {
        Ok(claims) => claims,
        Err(e) => {
            audit_log(&AuditEvent::TokenRejected {
                token_kind: "refresh".to_string(),
                reason: e.to_string(),
            });
            return Err(AuthError::Unauthorized);
        }
    };

    // The cookie prefix exists for revocation-store scans; the signed
    // claim is authoritative and the two must agree.
    if claims.user_id().map_err(|_| AuthError::Unauthorized)? != user_id {
        audit_log(&AuditEvent::TokenRejected {
            token_kind: "refresh".to_string(),
            reason: "cookie prefix does not match claims".to_string(),
        });
        return Err(AuthError::Unauthorized);
    }

    if let Some(marker) = store.get(&cookie).await? {
        if marker == REVOKED_MARKER {
            audit_log(&AuditEvent::TokenRejected {
                token_kind: "refresh".to_string(),
                reason: "revoked".to_string(),
            });
            return Err(AuthError::Unauthorized);
        }
    }

    ctx.session = Some(SessionTicket {
        user_id,
        cookie_value: cookie,
    });
    Ok(())
}

/// Require the vetted principal to be verified
pub fn check_verified(ctx: &RequestContext) -> Result<()> {
    let principal = ctx.principal.as_ref().ok_or(AuthError::Unauthorized)?;
    if !principal.verified {
        return Err(AuthError::NotVerified);
    }
    Ok(())
}

/// Require that no session cookie is present
pub fn check_not_signed_in(ctx: &RequestContext) -> Result<()> {
    if ctx.session_cookie().is_some() {
        return Err(AuthError::AlreadySignedIn);
    }
    Ok(())
}
