//! Explicit request context
//!
//! The value every operation call receives in place of ambient
//! middleware state. The transport adapter builds one per request from
//! the raw `Authorization` header and its cookie jar; guards annotate it
//! with the identities they vet, and the operation body reads those
//! annotations.

use inkpot_core::{CookieJar, CookieOptions, SESSION_COOKIE};
use std::sync::Arc;
use uuid::Uuid;

/// Authenticated principal extracted from a valid access token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    /// User's unique identifier
    pub user_id: Uuid,

    /// Verified flag as captured in the access claims. Stale until the
    /// client obtains a fresh token.
    pub verified: bool,
}

/// Vetted refresh-token session extracted from the session cookie
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTicket {
    /// User the session belongs to
    pub user_id: Uuid,

    /// Full cookie value, which doubles as the revocation-store key
    pub cookie_value: String,
}

/// Per-request state handed into every auth operation
pub struct RequestContext {
    /// Raw `Authorization` header, if the request carried one
    pub authorization: Option<String>,

    /// Cookie accessors for this request/response exchange
    pub cookies: Arc<dyn CookieJar>,

    /// Populated by the access-token guard
    pub principal: Option<Principal>,

    /// Populated by the refresh-token guard
    pub session: Option<SessionTicket>,
}

impl RequestContext {
    /// Context for a request without an `Authorization` header
    pub fn new(cookies: Arc<dyn CookieJar>) -> Self {
        Self {
            authorization: None,
            cookies,
            principal: None,
            session: None,
        }
    }

    /// Context carrying an `Authorization` header value
    pub fn with_authorization(
        cookies: Arc<dyn CookieJar>,
        authorization: impl Into<String>,
    ) -> Self {
        Self {
            authorization: Some(authorization.into()),
            ..Self::new(cookies)
        }
    }

    /// The bearer token inside the `Authorization` header, if the header
    /// uses the Bearer scheme
    pub fn bearer_token(&self) -> Option<&str> {
        self.authorization.as_deref()?.strip_prefix("Bearer ")
    }

    /// Current session cookie value, if the request carried one
    pub fn session_cookie(&self) -> Option<String> {
        self.cookies.get(SESSION_COOKIE)
    }

    /// Queue the session cookie with the standard attributes
    pub fn set_session_cookie(&self, value: &str, max_age_secs: i64) {
        self.cookies.set(
            SESSION_COOKIE,
            value,
            CookieOptions {
                max_age_secs,
                http_only: true,
            },
        );
    }

    /// Queue removal of the session cookie
    pub fn clear_session_cookie(&self) {
        self.cookies.clear(SESSION_COOKIE);
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Credential material stays out of logs and test failures.
        f.debug_struct("RequestContext")
            .field("authorization", &self.authorization.as_ref().map(|_| "<redacted>"))
            .field("principal", &self.principal)
            .field("session", &self.session.as_ref().map(|s| s.user_id))
            .finish_non_exhaustive()
    }
}
