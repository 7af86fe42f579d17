//! Shared fixtures for exercising the auth service
//!
//! Wires the in-memory backends, a recording mailer, and a fast Argon2
//! profile into a ready-to-use service. Compiled for unit tests and,
//! behind the `test-utils` feature, for integration tests.
//!
//! Author: hephaex@gmail.com

use crate::context::RequestContext;
use crate::memory::{
    MemoryAuthorRepository, MemoryResetTokenRepository, MemoryRevocationStore,
    MemoryUserRepository, MemoryVerificationTokenRepository,
};
use crate::password::{Argon2Hasher, PasswordConfig};
use crate::service::{AuthBackends, AuthResponse, AuthService, SignUpRequest};
use async_trait::async_trait;
use inkpot_core::{AuthConfig, CookieJar, CookieOptions, EmailDetails, MailError, Mailer};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Password every harness-created account uses
pub const TEST_PASSWORD: &str = "Sup3r-secret pa55phrase";

/// In-memory cookie jar standing in for the transport layer
#[derive(Debug, Default)]
pub struct TestCookieJar {
    cookies: Mutex<HashMap<String, String>>,
}

impl TestCookieJar {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CookieJar for TestCookieJar {
    fn get(&self, name: &str) -> Option<String> {
        self.cookies.lock().unwrap().get(name).cloned()
    }

    fn set(&self, name: &str, value: &str, _options: CookieOptions) {
        self.cookies
            .lock()
            .unwrap()
            .insert(name.to_string(), value.to_string());
    }

    fn clear(&self, name: &str) {
        self.cookies.lock().unwrap().remove(name);
    }
}

/// Mailer that records every email instead of delivering it
#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<EmailDetails>>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything "sent" so far, in order
    pub fn sent(&self) -> Vec<EmailDetails> {
        self.sent.lock().unwrap().clone()
    }

    /// The most recent email, if any
    pub fn last(&self) -> Option<EmailDetails> {
        self.sent.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: EmailDetails) -> Result<(), MailError> {
        self.sent.lock().unwrap().push(email);
        Ok(())
    }
}

/// Mailer that never answers, for exercising the delivery timeout
#[derive(Debug)]
pub struct StalledMailer {
    delay: Duration,
}

#[async_trait]
impl Mailer for StalledMailer {
    async fn send(&self, _email: EmailDetails) -> Result<(), MailError> {
        tokio::time::sleep(self.delay).await;
        Ok(())
    }
}

/// Configuration tuned for tests: real defaults apart from a short mail
/// timeout
pub fn test_config() -> AuthConfig {
    let mut config = AuthConfig::default();
    config.mail.timeout_secs = 1;
    config
}

/// Argon2 profile weak enough to keep test runs fast
fn test_password_config() -> PasswordConfig {
    PasswordConfig {
        memory_cost: 1024,
        time_cost: 1,
        parallelism: 1,
        output_len: Some(32),
    }
}

/// A fully wired service plus handles to every backend, so tests can
/// inspect and manipulate state directly
pub struct TestHarness {
    pub service: AuthService,
    pub users: Arc<MemoryUserRepository>,
    pub authors: Arc<MemoryAuthorRepository>,
    pub verification_tokens: Arc<MemoryVerificationTokenRepository>,
    pub reset_tokens: Arc<MemoryResetTokenRepository>,
    pub revocations: Arc<MemoryRevocationStore>,
    pub mailer: Arc<RecordingMailer>,
}

impl TestHarness {
    pub fn new() -> Self {
        let mailer = Arc::new(RecordingMailer::new());
        Self::build(mailer.clone(), mailer)
    }

    /// Harness whose service mailer hangs past the delivery timeout. The
    /// recording mailer is still present but sees no traffic.
    pub fn with_stalled_mailer() -> Self {
        let stalled = Arc::new(StalledMailer {
            delay: Duration::from_secs(120),
        });
        Self::build(stalled, Arc::new(RecordingMailer::new()))
    }

    fn build(service_mailer: Arc<dyn Mailer>, recorder: Arc<RecordingMailer>) -> Self {
        let users = Arc::new(MemoryUserRepository::new());
        let authors = Arc::new(MemoryAuthorRepository::new());
        let verification_tokens = Arc::new(MemoryVerificationTokenRepository::new());
        let reset_tokens = Arc::new(MemoryResetTokenRepository::new());
        let revocations = Arc::new(MemoryRevocationStore::new());

        let service = AuthService::new(
            test_config(),
            AuthBackends {
                users: users.clone(),
                authors: authors.clone(),
                verification_tokens: verification_tokens.clone(),
                reset_tokens: reset_tokens.clone(),
                revocations: revocations.clone(),
                mailer: service_mailer,
                hasher: Arc::new(Argon2Hasher::with_config(test_password_config())),
            },
        );

        Self {
            service,
            users,
            authors,
            verification_tokens,
            reset_tokens,
            revocations,
            mailer: recorder,
        }
    }

    /// Anonymous context with a fresh cookie jar
    pub fn context(&self) -> RequestContext {
        RequestContext::new(Arc::new(TestCookieJar::new()))
    }

    /// Anonymous context sharing an existing jar, as a follow-up request
    /// from the same client would
    pub fn context_with_jar(&self, jar: Arc<dyn CookieJar>) -> RequestContext {
        RequestContext::new(jar)
    }

    /// Context presenting an access token, with a fresh jar
    pub fn bearer_context(&self, access_token: &str) -> RequestContext {
        RequestContext::with_authorization(
            Arc::new(TestCookieJar::new()),
            format!("Bearer {access_token}"),
        )
    }

    /// Context presenting an access token over an existing jar
    pub fn bearer_context_with_jar(
        &self,
        access_token: &str,
        jar: Arc<dyn CookieJar>,
    ) -> RequestContext {
        RequestContext::with_authorization(jar, format!("Bearer {access_token}"))
    }

    /// Sign-up request with the standard test password
    pub fn sign_up_request(&self, name: &str, email: &str) -> SignUpRequest {
        SignUpRequest {
            name: name.to_string(),
            email: email.to_string(),
            password: TEST_PASSWORD.to_string(),
        }
    }

    /// Register an account and hand back the response plus the context
    /// whose jar now holds the session cookie
    pub async fn sign_up_user(&self, name: &str, email: &str) -> (AuthResponse, RequestContext) {
        let mut ctx = self.context();
        let response = self
            .service
            .sign_up(&mut ctx, self.sign_up_request(name, email))
            .await
            .expect("sign up should succeed");
        (response, ctx)
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Pull the URL token out of an emailed link
pub fn extract_token(email: &EmailDetails) -> Option<String> {
    let start = email.html.find("token=")? + "token=".len();
    let rest = &email.html[start..];
    let end = rest.find('"').unwrap_or(rest.len());
    Some(rest[..end].to_string())
}
