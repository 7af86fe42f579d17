//! Security audit logging for authentication events
//!
//! Provides structured audit logging for all authentication-related
//! events: sign-ups, sign-ins, token rotation, verification, and
//! password lifecycle changes.
//!
//! All audit events are logged at INFO level with the "audit" target,
//! making them easy to filter and route to security monitoring systems.
//!
//! # Architecture
//!
//! - Uses tracing for structured logging
//! - JSON-compatible format for log aggregators
//! - Immutable event records for compliance
//! - Separate target ("audit") for filtering
//!
//! Author: hephaex@gmail.com

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

/// Security audit events for the auth subsystem
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AuditEvent {
    /// Successful account creation
    SignUp { user_id: Uuid, email: String },

    /// Successful sign-in
    SignInSuccess { user_id: Uuid, email: String },

    /// Rejected sign-in. The reason stays in internal logs; callers see
    /// one indistinguishable error either way.
    SignInFailure { email: String, reason: String },

    /// Refresh-token rotation
    TokenRefresh { user_id: Uuid },

    /// Session ended and its refresh token blacklisted
    SignOut { user_id: Uuid },

    /// Verification email dispatched
    VerificationEmailSent {
        email: String,
        resend: bool,
    },

    /// Account email confirmed
    EmailVerified { user_id: Uuid, email: String },

    /// Password reset requested. `account_exists` never leaves the logs;
    /// the caller-facing response is identical either way.
    PasswordResetRequested {
        email: String,
        account_exists: bool,
    },

    /// Password replaced through the emailed reset flow
    PasswordReset { user_id: Uuid, email: String },

    /// Password replaced by a signed-in user
    PasswordChanged { user_id: Uuid, email: String },

    /// Bulk revocation of a user's refresh tokens
    SessionsRevoked { user_id: Uuid, count: usize },

    /// A guard rejected a presented token
    TokenRejected {
        token_kind: String,
        reason: String,
    },
}

/// Log a security audit event with structured fields
///
/// Events are logged at INFO level with the "audit" target, making them
/// easy to filter and route separately from application logs.
///
/// # Arguments
///
/// * `event` - The audit event to log
///
/// # Structured Logging
///
/// The event is serialized to JSON for compatibility with log
/// aggregators. Example output:
///
/// ```json
/// {
///   "event_type": "sign_in_success",
///   "user_id": "550e8400-e29b-41d4-a716-446655440000",
///   "email": "user@example.com"
/// }
/// ```
pub fn audit_log(event: &AuditEvent) {
    let timestamp = Utc::now();

    // Serialize event to JSON for structured logging
    let event_json = serde_json::to_string(event)
        .unwrap_or_else(|e| format!("{{\"error\":\"Failed to serialize audit event: {e}\"}}"));

    // Log with special "audit" target for filtering
    // This allows security teams to route audit logs separately
    match event {
        AuditEvent::SignUp { user_id, email } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                user_id = %user_id,
                email = %email,
                "Account created"
            );
        }
        AuditEvent::SignInSuccess { user_id, email } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                user_id = %user_id,
                email = %email,
                "Sign-in successful"
            );
        }
        AuditEvent::SignInFailure { email, reason } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                email = %email,
                reason = %reason,
                "Sign-in failed"
            );
        }
        AuditEvent::TokenRefresh { user_id } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                user_id = %user_id,
                "Token refresh"
            );
        }
        AuditEvent::SignOut { user_id } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                user_id = %user_id,
                "Sign-out"
            );
        }
        AuditEvent::VerificationEmailSent { email, resend } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                email = %email,
                resend = %resend,
                "Verification email sent"
            );
        }
        AuditEvent::EmailVerified { user_id, email } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                user_id = %user_id,
                email = %email,
                "Email verified"
            );
        }
        AuditEvent::PasswordResetRequested {
            email,
            account_exists,
        } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                email = %email,
                account_exists = %account_exists,
                "Password reset requested"
            );
        }
        AuditEvent::PasswordReset { user_id, email } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                user_id = %user_id,
                email = %email,
                "Password reset"
            );
        }
        AuditEvent::PasswordChanged { user_id, email } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                user_id = %user_id,
                email = %email,
                "Password changed"
            );
        }
        AuditEvent::SessionsRevoked { user_id, count } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                user_id = %user_id,
                count = %count,
                "Sessions revoked"
            );
        }
        AuditEvent::TokenRejected { token_kind, reason } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                token_kind = %token_kind,
                reason = %reason,
                "Token rejected"
            );
        }
    }
}
