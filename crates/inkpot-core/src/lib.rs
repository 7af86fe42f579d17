//! Inkpot Core - Domain models, traits, and shared types
//!
//! This crate defines the core abstractions used throughout the inkpot
//! auth subsystem:
//! - Account entities (users, author profiles, one-time token records)
//! - The user-facing error taxonomy for auth operations
//! - Capability traits for external collaborators (persistence,
//!   revocation store, mailer, cookie transport, password hashing)
//! - Configuration management

pub mod config;

pub use config::{AuthConfig, ConfigError};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Error Types
// ============================================================================

/// Errors an auth operation can return to its caller.
///
/// The first seven variants are the user-facing taxonomy: stable,
/// deliberately coarse, and safe to surface verbatim. The remaining
/// variants wrap collaborator failures and describe infrastructure, not
/// user mistakes.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Sign-in rejected. Covers both unknown email and wrong password so
    /// the response cannot reveal whether an account exists.
    #[error("Incorrect credentials")]
    InvalidCredentials,

    #[error("Email is taken")]
    EmailTaken,

    /// A one-time token that is unknown, malformed, or already consumed
    #[error("Invalid token")]
    InvalidToken,

    /// A one-time token presented outside its validity window
    #[error("Token has expired")]
    TokenExpired,

    /// Missing, malformed, revoked, or otherwise unusable credentials
    #[error("Not authenticated")]
    Unauthorized,

    #[error("Account is not verified")]
    NotVerified,

    #[error("Already signed in")]
    AlreadySignedIn,

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Email delivery failed: {0}")]
    Mail(#[from] MailError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T, E = AuthError> = std::result::Result<T, E>;

/// Errors surfaced by persistence implementations
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("User not found")]
    UserNotFound,

    #[error("Email already exists")]
    EmailAlreadyExists,

    #[error("Token record not found")]
    TokenNotFound,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors surfaced by revocation-store implementations
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store operation failed: {0}")]
    Operation(String),
}

/// Errors surfaced by mail transports
#[derive(Error, Debug)]
pub enum MailError {
    #[error("Mail service error: {0}")]
    Service(String),

    #[error("Mail send timed out after {0}s")]
    Timeout(u64),

    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),
}

/// Errors surfaced by password-hashing implementations
#[derive(Error, Debug)]
pub enum PasswordError {
    #[error("Failed to hash password: {0}")]
    HashingFailed(String),

    #[error("Failed to verify password: {0}")]
    VerificationFailed(String),

    #[error("Invalid password hash format")]
    InvalidHashFormat,
}

// ============================================================================
// Account Entities
// ============================================================================

/// Canonical form used for every email comparison, lookup, and stored
/// value. Matching is case-insensitive; the stored form is the trimmed,
/// ASCII-lowercased input.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

/// A registered account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier
    pub id: Uuid,

    /// Sign-in email, unique per account, stored normalized
    pub email: String,

    /// PHC-string password hash, never serialized
    #[serde(skip_serializing, default)]
    pub password_hash: String,

    /// Linked author profile
    pub author_id: Uuid,

    /// Whether the account email has been confirmed. Moves false to true
    /// exactly once; no operation clears it.
    #[serde(default)]
    pub is_verified: bool,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a new, unverified account record
    pub fn new(
        email: impl Into<String>,
        password_hash: impl Into<String>,
        author_id: Uuid,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            email: normalize_email(&email.into()),
            password_hash: password_hash.into(),
            author_id,
            is_verified: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Public projection with the author relation resolved and no
    /// credential material
    pub fn to_profile(&self, author: Author) -> UserProfile {
        UserProfile {
            id: self.id,
            email: self.email.clone(),
            is_verified: self.is_verified,
            author,
            created_at: self.created_at,
        }
    }
}

/// Public view of an account, safe to serialize in responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub is_verified: bool,
    pub author: Author,
    pub created_at: DateTime<Utc>,
}

/// Writer profile linked one-to-one from a user account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Author {
    /// Unique identifier
    pub id: Uuid,

    /// Display name
    pub name: String,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Author {
    /// Create a new author profile
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            created_at: Utc::now(),
        }
    }
}

// ============================================================================
// One-Time Token Records
// ============================================================================

/// A pending email-verification token.
///
/// Several may coexist for one email; redeeming any of them consumes all
/// of them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationToken {
    /// Unique identifier
    pub id: Uuid,

    /// Owning account email (normalized)
    pub email: String,

    /// The opaque token delivered out of band
    pub token: String,

    /// Issue timestamp the validity window counts from
    pub created_at: DateTime<Utc>,
}

impl VerificationToken {
    /// Create a record stamped now
    pub fn new(email: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: normalize_email(&email.into()),
            token: token.into(),
            created_at: Utc::now(),
        }
    }

    /// Whether the validity window has passed. The window edge itself is
    /// still valid.
    pub fn is_expired(&self, window: Duration) -> bool {
        Utc::now() - self.created_at > window
    }
}

/// A pending password-reset token. Single-use: consumed on a successful
/// reset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordResetToken {
    /// Unique identifier
    pub id: Uuid,

    /// Owning account email (normalized)
    pub email: String,

    /// The opaque token delivered out of band
    pub token: String,

    /// Issue timestamp the validity window counts from
    pub created_at: DateTime<Utc>,
}

impl PasswordResetToken {
    /// Create a record stamped now
    pub fn new(email: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: normalize_email(&email.into()),
            token: token.into(),
            created_at: Utc::now(),
        }
    }

    /// Whether the validity window has passed. The window edge itself is
    /// still valid.
    pub fn is_expired(&self, window: Duration) -> bool {
        Utc::now() - self.created_at > window
    }
}

// ============================================================================
// Transport Types
// ============================================================================

/// Name of the cookie that carries the refresh-token session value
pub const SESSION_COOKIE: &str = "session";

/// Value a revoked session key maps to in the revocation store
pub const REVOKED_MARKER: &str = "blacklisted";

/// Value written when a session key is first recorded at issuance
pub const VALID_MARKER: &str = "";

/// Attributes applied when setting a response cookie
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CookieOptions {
    /// Lifetime in seconds
    pub max_age_secs: i64,

    /// Withhold the cookie from client-side scripts
    pub http_only: bool,
}

/// A fully rendered outbound email
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailDetails {
    /// Recipient address
    pub to: String,

    /// Subject line
    pub subject: String,

    /// HTML body
    pub html: String,
}

// ============================================================================
// Capability Traits
// ============================================================================

/// Persistence for user accounts
#[async_trait::async_trait]
pub trait UserRepository: Send + Sync {
    /// Store a new account. Fails with [`RepositoryError::EmailAlreadyExists`]
    /// when the normalized email is taken.
    async fn create(&self, user: User) -> Result<User, RepositoryError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, RepositoryError>;

    /// Lookup by normalized email
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError>;

    /// Replace the stored password hash
    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<(), RepositoryError>;

    /// Flip the verified flag to true
    async fn mark_verified(&self, id: Uuid) -> Result<(), RepositoryError>;

    /// Remove an account. No auth operation calls this; it completes the
    /// persistence contract for the host application.
    async fn delete(&self, id: Uuid) -> Result<(), RepositoryError>;
}

/// Persistence for author profiles
#[async_trait::async_trait]
pub trait AuthorRepository: Send + Sync {
    async fn create(&self, author: Author) -> Result<Author, RepositoryError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Author>, RepositoryError>;
}

/// Persistence for email-verification token records
#[async_trait::async_trait]
pub trait VerificationTokenRepository: Send + Sync {
    async fn create(&self, record: VerificationToken) -> Result<VerificationToken, RepositoryError>;

    /// One record matching both the opaque token and the email, if any
    async fn find_by_token_and_email(
        &self,
        token: &str,
        email: &str,
    ) -> Result<Option<VerificationToken>, RepositoryError>;

    /// Remove every record for an email. Returns how many were removed.
    async fn delete_all_for_email(&self, email: &str) -> Result<u64, RepositoryError>;
}

/// Persistence for password-reset token records
#[async_trait::async_trait]
pub trait ResetTokenRepository: Send + Sync {
    async fn create(
        &self,
        record: PasswordResetToken,
    ) -> Result<PasswordResetToken, RepositoryError>;

    async fn find_by_token(
        &self,
        token: &str,
    ) -> Result<Option<PasswordResetToken>, RepositoryError>;

    /// Consume a single-use record
    async fn delete(&self, id: Uuid) -> Result<(), RepositoryError>;
}

/// Key/value store tracking issued refresh-token sessions.
///
/// Keys are full session-cookie values (`"<userId>:<signedToken>"`), so
/// `scan_prefix("<userId>:")` finds every session ever issued to a user.
/// A key mapping to [`REVOKED_MARKER`] is revoked; any other mapping, and
/// absence, leave the token to stand on its own signature and expiry.
/// Writes only ever restrict, so last-write-wins races are safe.
#[async_trait::async_trait]
pub trait RevocationStore: Send + Sync {
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// All keys beginning with `prefix`
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

/// Outbound email capability
#[async_trait::async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: EmailDetails) -> Result<(), MailError>;
}

/// Cookie accessors the host transport supplies for one request/response
/// exchange. Implementations buffer writes until the response is built,
/// hence the interior mutability behind `&self`.
pub trait CookieJar: Send + Sync {
    /// Value of a request cookie, if present
    fn get(&self, name: &str) -> Option<String>;

    /// Queue a response cookie
    fn set(&self, name: &str, value: &str, options: CookieOptions);

    /// Queue removal of a cookie
    fn clear(&self, name: &str);
}

/// One-way hash-and-verify capability for credentials
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, plaintext: &str) -> Result<String, PasswordError>;

    /// `Ok(false)` on mismatch. Errors are reserved for malformed stored
    /// hashes.
    fn verify(&self, hash: &str, plaintext: &str) -> Result<bool, PasswordError>;
}

// ============================================================================
// Tests
// ============================================================================
