//! Signed token issuance and validation
//!
//! Implements the two JWT families with HMAC-SHA256 signing: short-lived
//! access tokens carried in the `Authorization` header, and long-lived
//! refresh tokens carried inside the session cookie. The families sign
//! with separate secrets and are never interchangeable.
//!
//! The session cookie transports `"<userId>:<signedRefreshToken>"`; the
//! plaintext user-id prefix is what lets the revocation store find every
//! session for a user with one prefix scan.

use inkpot_core::config::TokenConfig;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use uuid::Uuid;

/// Claims embedded in an access token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Token issuer
    pub iss: String,
    /// Subject - user ID
    pub sub: String,
    /// Issued at timestamp (Unix epoch)
    pub iat: u64,
    /// Expiration timestamp (Unix epoch)
    pub exp: u64,
    /// Verified flag captured at issuance. Stale until the client
    /// obtains a fresh token.
    pub verified: bool,
}

impl AccessClaims {
    /// Subject parsed back into a user ID
    pub fn user_id(&self) -> Result<Uuid, TokenError> {
        Uuid::parse_str(&self.sub).map_err(|_| TokenError::InvalidToken)
    }
}

/// Claims embedded in a refresh token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    /// Token issuer
    pub iss: String,
    /// Subject - user ID
    pub sub: String,
    /// JWT ID - unique token identifier for blacklisting; keeps two
    /// same-second issuances for one user distinct
    pub jti: String,
    /// Issued at timestamp (Unix epoch)
    pub iat: u64,
    /// Expiration timestamp (Unix epoch)
    pub exp: u64,
}

impl RefreshClaims {
    /// Subject parsed back into a user ID
    pub fn user_id(&self) -> Result<Uuid, TokenError> {
        Uuid::parse_str(&self.sub).map_err(|_| TokenError::InvalidToken)
    }
}

/// Token issuance and validation errors
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Failed to encode token: {0}")]
    EncodingError(#[from] jsonwebtoken::errors::Error),

    #[error("Invalid token format")]
    InvalidToken,

    #[error("Token has expired")]
    ExpiredToken,

    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("System time error: {0}")]
    SystemTimeError(#[from] std::time::SystemTimeError),
}

/// Generate a signed access token
///
/// # Arguments
///
/// * `config` - Token configuration (secrets, TTLs, issuer)
/// * `user_id` - Unique user identifier
/// * `verified` - The account's verified flag at issuance
///
/// # Returns
///
/// * `Ok(String)` - Encoded JWT
/// * `Err(TokenError)` - If token generation fails
///
/// # Example
///
/// ```no_run
/// use inkpot_auth::token::issue_access_token;
/// use inkpot_core::config::TokenConfig;
/// use uuid::Uuid;
///
/// let config = TokenConfig::default();
/// let token = issue_access_token(&config, Uuid::new_v4(), false)
///     .expect("Failed to generate token");
/// ```
pub fn issue_access_token(
    config: &TokenConfig,
    user_id: Uuid,
    verified: bool,
) -> Result<String, TokenError> {
    let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();

    let claims = AccessClaims {
        iss: config.issuer.clone(),
        sub: user_id.to_string(),
        iat: now,
        exp: now + config.access_ttl_secs,
        verified,
    };

    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(config.access_secret.as_bytes()),
    )?;

    Ok(token)
}

/// Generate a signed refresh token
///
/// # Arguments
///
/// * `config` - Token configuration (secrets, TTLs, issuer)
/// * `user_id` - Unique user identifier
///
/// # Returns
///
/// * `Ok(String)` - Encoded JWT, to be wrapped in a session cookie value
/// * `Err(TokenError)` - If token generation fails
pub fn issue_refresh_token(config: &TokenConfig, user_id: Uuid) -> Result<String, TokenError> {
    let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();

    let claims = RefreshClaims {
        iss: config.issuer.clone(),
        sub: user_id.to_string(),
        jti: Uuid::new_v4().to_string(), // Unique token ID for blacklisting
        iat: now,
        exp: now + config.refresh_ttl_days * 86_400,
    };

    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(config.refresh_secret.as_bytes()),
    )?;

    Ok(token)
}

/// Validate an access token and extract its claims
///
/// # Arguments
///
/// * `config` - Token configuration containing the access secret
/// * `token` - The JWT string to validate
///
/// # Returns
///
/// * `Ok(AccessClaims)` - Decoded and validated claims
/// * `Err(TokenError)` - If validation fails (expired, bad signature, etc.)
pub fn decode_access_token(config: &TokenConfig, token: &str) -> Result<AccessClaims, TokenError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[&config.issuer]);

    let token_data = decode::<AccessClaims>(
        token,
        &DecodingKey::from_secret(config.access_secret.as_bytes()),
        &validation,
    )
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::ExpiredToken,
        jsonwebtoken::errors::ErrorKind::InvalidSignature => TokenError::InvalidSignature,
        _ => TokenError::InvalidToken,
    })?;

    Ok(token_data.claims)
}

/// Validate a refresh token and extract its claims
///
/// # Arguments
///
/// * `config` - Token configuration containing the refresh secret
/// * `token` - The signed part of a session cookie value
///
/// # Returns
///
/// * `Ok(RefreshClaims)` - Decoded and validated claims
/// * `Err(TokenError)` - If validation fails (expired, bad signature, etc.)
pub fn decode_refresh_token(
    config: &TokenConfig,
    token: &str,
) -> Result<RefreshClaims, TokenError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[&config.issuer]);

    let token_data = decode::<RefreshClaims>(
        token,
        &DecodingKey::from_secret(config.refresh_secret.as_bytes()),
        &validation,
    )
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::ExpiredToken,
        jsonwebtoken::errors::ErrorKind::InvalidSignature => TokenError::InvalidSignature,
        _ => TokenError::InvalidToken,
    })?;

    Ok(token_data.claims)
}

/// Build the session cookie value for a freshly signed refresh token
pub fn session_cookie_value(user_id: Uuid, signed: &str) -> String {
    format!("{user_id}:{signed}")
}

/// Split a session cookie value back into its user ID and signed token.
/// Returns `None` for values that do not carry a UUID prefix.
pub fn parse_session_cookie(value: &str) -> Option<(Uuid, &str)> {
    let (prefix, signed) = value.split_once(':')?;
    let user_id = Uuid::parse_str(prefix).ok()?;
    if signed.is_empty() {
        return None;
    }
    Some((user_id, signed))
}

/// Prefix under which every session key for a user lives in the
/// revocation store
pub fn session_key_prefix(user_id: Uuid) -> String {
    format!("{user_id}:")
}
