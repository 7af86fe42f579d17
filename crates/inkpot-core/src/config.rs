//! Inkpot Configuration Management
//!
//! Handles configuration from environment variables and config files
//! with sensible defaults for development.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main auth subsystem configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    /// Signed-token parameters
    pub tokens: TokenConfig,

    /// Outbound mail parameters
    pub mail: MailConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AuthConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        // Tokens
        if let Ok(issuer) = std::env::var("AUTH_ISSUER") {
            config.tokens.issuer = issuer;
        }
        if let Ok(secret) = std::env::var("AUTH_ACCESS_TOKEN_SECRET") {
            config.tokens.access_secret = secret;
        }
        if let Ok(secret) = std::env::var("AUTH_REFRESH_TOKEN_SECRET") {
            config.tokens.refresh_secret = secret;
        }
        if let Ok(ttl) = std::env::var("AUTH_ACCESS_TOKEN_TTL_SECS") {
            config.tokens.access_ttl_secs =
                ttl.parse().map_err(|_| ConfigError::InvalidValue {
                    key: "AUTH_ACCESS_TOKEN_TTL_SECS".to_string(),
                    value: ttl,
                })?;
        }
        if let Ok(days) = std::env::var("AUTH_REFRESH_TOKEN_TTL_DAYS") {
            config.tokens.refresh_ttl_days =
                days.parse().map_err(|_| ConfigError::InvalidValue {
                    key: "AUTH_REFRESH_TOKEN_TTL_DAYS".to_string(),
                    value: days,
                })?;
        }
        if let Ok(mins) = std::env::var("AUTH_URL_TOKEN_TTL_MINS") {
            config.tokens.url_token_ttl_mins =
                mins.parse().map_err(|_| ConfigError::InvalidValue {
                    key: "AUTH_URL_TOKEN_TTL_MINS".to_string(),
                    value: mins,
                })?;
        }

        // Mail
        if let Ok(name) = std::env::var("APP_NAME") {
            config.mail.app_name = name;
        }
        if let Ok(sender) = std::env::var("MAIL_SENDER") {
            config.mail.sender = sender;
        }
        if let Ok(url) = std::env::var("MAIL_RELAY_URL") {
            config.mail.relay_url = url;
        }
        if let Ok(url) = std::env::var("CLIENT_BASE_URL") {
            config.mail.client_base_url = url;
        }
        if let Ok(secs) = std::env::var("MAIL_TIMEOUT_SECS") {
            config.mail.timeout_secs = secs.parse().map_err(|_| ConfigError::InvalidValue {
                key: "MAIL_TIMEOUT_SECS".to_string(),
                value: secs,
            })?;
        }

        // Logging
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.logging.level = level;
        }

        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        let env_config = Self::from_env()?;
        let defaults = Self::default();

        if env_config.tokens.issuer != defaults.tokens.issuer {
            self.tokens.issuer = env_config.tokens.issuer;
        }
        if env_config.tokens.access_ttl_secs != defaults.tokens.access_ttl_secs {
            self.tokens.access_ttl_secs = env_config.tokens.access_ttl_secs;
        }
        if env_config.tokens.refresh_ttl_days != defaults.tokens.refresh_ttl_days {
            self.tokens.refresh_ttl_days = env_config.tokens.refresh_ttl_days;
        }

        // Always use env for sensitive values
        if env_config.tokens.access_secret != defaults.tokens.access_secret {
            self.tokens.access_secret = env_config.tokens.access_secret;
        }
        if env_config.tokens.refresh_secret != defaults.tokens.refresh_secret {
            self.tokens.refresh_secret = env_config.tokens.refresh_secret;
        }

        Ok(self)
    }

    /// Reject configurations that cannot produce sound tokens
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tokens.access_secret.is_empty() {
            return Err(ConfigError::MissingRequired(
                "tokens.access_secret".to_string(),
            ));
        }
        if self.tokens.refresh_secret.is_empty() {
            return Err(ConfigError::MissingRequired(
                "tokens.refresh_secret".to_string(),
            ));
        }
        // The two token families must not be interchangeable.
        if self.tokens.access_secret == self.tokens.refresh_secret {
            return Err(ConfigError::InvalidValue {
                key: "tokens.refresh_secret".to_string(),
                value: "must differ from tokens.access_secret".to_string(),
            });
        }
        if self.tokens.access_ttl_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "tokens.access_ttl_secs".to_string(),
                value: "0".to_string(),
            });
        }
        if self.tokens.url_token_ttl_mins == 0 {
            return Err(ConfigError::InvalidValue {
                key: "tokens.url_token_ttl_mins".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }

    /// Access-token lifetime
    pub fn access_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.tokens.access_ttl_secs as i64)
    }

    /// Refresh-token lifetime
    pub fn refresh_ttl(&self) -> chrono::Duration {
        chrono::Duration::days(self.tokens.refresh_ttl_days as i64)
    }

    /// Validity window for emailed one-time tokens
    pub fn url_token_window(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.tokens.url_token_ttl_mins as i64)
    }

    /// Upper bound on a single mail send
    pub fn mail_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.mail.timeout_secs)
    }
}

/// Signed-token parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Issuer claim stamped into every token
    pub issuer: String,

    /// HMAC secret for access tokens
    pub access_secret: String,

    /// HMAC secret for refresh tokens. Must differ from the access
    /// secret so the two token families are never interchangeable.
    pub refresh_secret: String,

    /// Access-token lifetime in seconds
    pub access_ttl_secs: u64,

    /// Refresh-token lifetime in days
    pub refresh_ttl_days: u64,

    /// Validity window for emailed one-time tokens, in minutes
    pub url_token_ttl_mins: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            issuer: "inkpot".to_string(),
            // Development values - set real secrets via environment
            access_secret: "dev-access-secret-change-in-production".to_string(),
            refresh_secret: "dev-refresh-secret-change-in-production".to_string(),
            access_ttl_secs: 900,
            refresh_ttl_days: 365,
            url_token_ttl_mins: 60,
        }
    }
}

/// Outbound mail parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    /// Application name used in subject lines
    pub app_name: String,

    /// Sender address
    pub sender: String,

    /// Mail relay endpoint the HTTP mailer posts to
    pub relay_url: String,

    /// Base URL the emailed links point back at
    pub client_base_url: String,

    /// Upper bound on a single send, in seconds
    pub timeout_secs: u64,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            app_name: "Inkpot".to_string(),
            sender: "no-reply@inkpot.dev".to_string(),
            relay_url: "http://localhost:8025/email".to_string(),
            client_base_url: "http://localhost:3000".to_string(),
            timeout_secs: 10,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,

    /// Include file/line in logs
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            include_location: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}
