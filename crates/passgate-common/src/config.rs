//! Configuration types for the passgate service
//!
//! Configuration is assembled once at process start: an optional TOML file,
//! then environment overrides, then [`AppConfig::validate`]. The resulting value
//! is passed by reference into every component and never mutated afterwards.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

/// Shortest accepted JWT signing secret, in bytes
pub const MIN_JWT_SECRET_LEN: usize = 32;

/// Shortest password the service will ever accept
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Longest accepted session token lifetime (7 days)
pub const MAX_TOKEN_LIFETIME_SECS: u64 = 7 * 24 * 60 * 60;

/// Longest accepted verification window (30 days)
pub const MAX_VERIFICATION_WINDOW_SECS: u64 = 30 * 24 * 60 * 60;

/// Main configuration for the passgate service
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Authentication and token configuration
    pub auth: AuthConfig,
    /// Password hashing profile
    pub hashing: HashingConfig,
    /// Outbound mail configuration
    pub mail: MailConfig,
    /// Database connection configuration
    pub database: DatabaseConfig,
}

impl AppConfig {
    /// Parse a configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| Error::ConfigError(format!("Failed to parse TOML config: {e}")))
    }

    /// Load configuration from an optional TOML file, falling back to defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    Error::ConfigError(format!(
                        "Failed to read config file {}: {e}",
                        path.display()
                    ))
                })?;
                Self::from_toml_str(&content)
            }
            None => Ok(Self::default()),
        }
    }

    /// Apply `PASSGATE_*` overrides from the process environment
    #[must_use]
    pub fn with_env(mut self) -> Self {
        self.apply_overrides(|key| std::env::var(key).ok());
        self
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(secret) = get("PASSGATE_JWT_SECRET") {
            self.auth.jwt_secret = Some(secret);
        }
        if let Some(url) = get("PASSGATE_SITE_URL") {
            self.auth.site_url = url;
        }
        if let Some(host) = get("PASSGATE_HOST") {
            self.server.host = host;
        }
        if let Some(port) = get("PASSGATE_PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
        if let Some(key) = get("PASSGATE_MAIL_API_KEY") {
            self.mail.api_key = Some(key);
        }
        if let Some(sender) = get("PASSGATE_MAIL_SENDER") {
            self.mail.sender_email = Some(sender);
        }
        if let Some(url) = get("PASSGATE_DATABASE_URL") {
            self.database.url = Some(url);
        }
    }

    /// Reject configurations the service must not start with
    pub fn validate(&self) -> Result<()> {
        self.auth.validate()?;
        self.hashing.validate()?;
        self.mail.validate()?;
        Ok(())
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to (default: 8000)
    pub port: u16,
    /// Number of HTTP worker threads
    pub workers: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            workers: 4,
        }
    }
}

/// Authentication service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HS256 signing secret; required, there is no generated fallback
    pub jwt_secret: Option<String>,
    /// `iss` claim of issued session tokens
    pub jwt_issuer: String,
    /// Session token lifetime in seconds (default: 900 = 15 minutes)
    pub token_lifetime_secs: u64,
    /// Verification code validity window in seconds (default: 10800 = 3 hours)
    pub verification_window_secs: u64,
    /// Public base URL used to build verification links
    pub site_url: String,
    /// Minimum password length
    pub password_min_length: usize,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            jwt_issuer: "passgate".to_string(),
            token_lifetime_secs: 900,
            verification_window_secs: 10_800,
            site_url: "http://localhost:8000".to_string(),
            password_min_length: MIN_PASSWORD_LENGTH,
        }
    }
}

impl AuthConfig {
    /// The signing secret, or a configuration error when it is absent or too short
    pub fn signing_secret(&self) -> Result<&str> {
        let secret = self
            .jwt_secret
            .as_deref()
            .ok_or_else(|| Error::ConfigError("PASSGATE_JWT_SECRET is not set".to_string()))?;
        if secret.len() < MIN_JWT_SECRET_LEN {
            return Err(Error::ConfigError(format!(
                "JWT secret must be at least {MIN_JWT_SECRET_LEN} bytes"
            )));
        }
        Ok(secret)
    }

    fn validate(&self) -> Result<()> {
        self.signing_secret()?;
        if !(1..=MAX_TOKEN_LIFETIME_SECS).contains(&self.token_lifetime_secs) {
            return Err(Error::ConfigError(format!(
                "token_lifetime_secs must be between 1 and {MAX_TOKEN_LIFETIME_SECS}"
            )));
        }
        if !(1..=MAX_VERIFICATION_WINDOW_SECS).contains(&self.verification_window_secs) {
            return Err(Error::ConfigError(format!(
                "verification_window_secs must be between 1 and {MAX_VERIFICATION_WINDOW_SECS}"
            )));
        }
        if self.password_min_length < MIN_PASSWORD_LENGTH {
            return Err(Error::ConfigError(format!(
                "password_min_length cannot be below {MIN_PASSWORD_LENGTH}"
            )));
        }
        Ok(())
    }
}

/// Argon2id hashing profile
///
/// Fixed for the lifetime of the process. Raising any value makes existing
/// hashes report `needs_rehash`, and they are upgraded on the next login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HashingConfig {
    /// Iterations (t)
    pub time_cost: u32,
    /// Memory in KiB (m)
    pub memory_cost_kib: u32,
    /// Lanes (p)
    pub parallelism: u32,
    /// Salt length in bytes
    pub salt_len: usize,
    /// Hash output length in bytes
    pub output_len: usize,
}

impl HashingConfig {
    pub const MIN_TIME_COST: u32 = 3;
    pub const MIN_MEMORY_COST_KIB: u32 = 64 * 1024;
    pub const MIN_PARALLELISM: u32 = 2;
    pub const MIN_SALT_LEN: usize = 16;
    pub const MAX_SALT_LEN: usize = 48;

    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        if self.time_cost < Self::MIN_TIME_COST {
            problems.push(format!("time_cost must be at least {}", Self::MIN_TIME_COST));
        }
        if self.memory_cost_kib < Self::MIN_MEMORY_COST_KIB {
            problems.push(format!(
                "memory_cost_kib must be at least {}",
                Self::MIN_MEMORY_COST_KIB
            ));
        }
        if self.parallelism < Self::MIN_PARALLELISM {
            problems.push(format!(
                "parallelism must be at least {}",
                Self::MIN_PARALLELISM
            ));
        }
        if !(Self::MIN_SALT_LEN..=Self::MAX_SALT_LEN).contains(&self.salt_len) {
            problems.push(format!(
                "salt_len must be between {} and {}",
                Self::MIN_SALT_LEN,
                Self::MAX_SALT_LEN
            ));
        }
        if self.output_len < 16 {
            problems.push("output_len must be at least 16".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::ConfigError(format!(
                "Weak hashing profile: {}",
                problems.join(", ")
            )))
        }
    }
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self {
            time_cost: 3,
            memory_cost_kib: 64 * 1024,
            parallelism: 4,
            salt_len: 16,
            output_len: 32,
        }
    }
}

/// How verification emails are delivered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailProvider {
    /// Write outgoing mail to the log (development)
    #[default]
    Log,
    /// POST to a transactional mail HTTP API
    Http,
}

/// Outbound mail configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    pub provider: MailProvider,
    /// Send endpoint of the mail API
    pub api_url: String,
    pub api_key: Option<String>,
    pub sender_email: Option<String>,
    pub sender_name: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            provider: MailProvider::Log,
            api_url: "https://api.brevo.com/v3/smtp/email".to_string(),
            api_key: None,
            sender_email: None,
            sender_name: Some("Passgate".to_string()),
            timeout_secs: 10,
        }
    }
}

impl MailConfig {
    fn validate(&self) -> Result<()> {
        if self.provider == MailProvider::Http {
            if self.api_key.as_deref().map_or(true, str::is_empty) {
                return Err(Error::ConfigError(
                    "mail.api_key is required for the http mail provider".to_string(),
                ));
            }
            if self.sender_email.as_deref().map_or(true, str::is_empty) {
                return Err(Error::ConfigError(
                    "mail.sender_email is required for the http mail provider".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Database connection configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Connection URL; the built-in store is in-memory when unset
    pub url: Option<String>,
}
