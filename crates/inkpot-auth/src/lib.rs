//! Inkpot Auth - authentication engine for the Inkpot blog API
//!
//! This crate provides cookie-session authentication with the following
//! components:
//! - Signed access and refresh tokens with independent secrets
//! - Refresh-token rotation backed by a revocation store
//! - Password hashing with Argon2
//! - One-time URL tokens for email verification and password reset
//! - Guard chains resolved from a static per-operation registry
//! - The auth service driving every operation end to end
//!
//! Transport concerns (HTTP, GraphQL, cookies on the wire, SMTP) stay
//! outside; hosts plug in through the capability traits defined in
//! `inkpot-core`.

pub mod audit;
pub mod context;
pub mod guard;
pub mod mail;
pub mod memory;
pub mod password;
pub mod service;
pub mod token;
pub mod url_token;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;

pub use audit::{audit_log, AuditEvent};
pub use context::{Principal, RequestContext, SessionTicket};
pub use guard::{run_guards, Guard, Operation};
pub use memory::{
    MemoryAuthorRepository, MemoryResetTokenRepository, MemoryRevocationStore,
    MemoryUserRepository, MemoryVerificationTokenRepository,
};
pub use password::{hash_password, verify_password, Argon2Hasher, PasswordConfig};
pub use service::{
    AuthBackends, AuthResponse, AuthService, ChangePasswordRequest, ForgotPasswordRequest,
    MessageResponse, ResetPasswordRequest, SignInRequest, SignUpRequest, VerifyEmailRequest,
};
pub use token::{
    decode_access_token, decode_refresh_token, issue_access_token, issue_refresh_token,
    parse_session_cookie, session_cookie_value, session_key_prefix, AccessClaims, RefreshClaims,
    TokenError,
};
