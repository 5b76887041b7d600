//! Error types for the passgate credential pipeline

use thiserror::Error;

/// Message returned to clients in place of any internal error detail
pub const GENERIC_INTERNAL_MESSAGE: &str = "An internal error occurred. Please try again later.";

/// Passgate error types
#[derive(Error, Debug)]
pub enum Error {
    // Validation Errors
    #[error("Missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),

    #[error("Invalid email format")]
    InvalidEmail,

    #[error("Password does not meet requirements: {0}")]
    WeakPassword(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    // Conflict Errors
    #[error("User already exists")]
    UserAlreadyExists,

    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    // Authentication Errors
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid or expired verification code")]
    InvalidToken,

    #[error("Unauthorized")]
    Unauthorized,

    // Configuration Errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Internal Errors
    #[error("Malformed password hash: {0}")]
    MalformedHash(String),

    #[error("Password hashing failed: {0}")]
    HashingFailed(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Mail delivery failed: {0}")]
    MailError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Result type alias for passgate operations
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`], used for status mapping and logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Conflict,
    Authentication,
    Configuration,
    Internal,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingFields(_)
            | Self::InvalidEmail
            | Self::WeakPassword(_)
            | Self::ValidationError(_)
            | Self::JsonError(_) => ErrorKind::Validation,

            Self::UserAlreadyExists | Self::DuplicateKey(_) => ErrorKind::Conflict,

            Self::InvalidCredentials | Self::InvalidToken | Self::Unauthorized => {
                ErrorKind::Authentication
            }

            Self::ConfigError(_) => ErrorKind::Configuration,

            Self::MalformedHash(_)
            | Self::HashingFailed(_)
            | Self::DatabaseError(_)
            | Self::MailError(_)
            | Self::InternalError(_)
            | Self::IoError(_) => ErrorKind::Internal,
        }
    }

    /// HTTP status code for each error type
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::Validation => 400,
            ErrorKind::Authentication => 401,
            ErrorKind::Conflict => 409,
            ErrorKind::Configuration | ErrorKind::Internal => 500,
        }
    }

    /// Error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::MissingFields(_) => "missing_fields",
            Self::InvalidEmail => "invalid_email",
            Self::WeakPassword(_) => "weak_password",
            Self::ValidationError(_) => "validation_error",
            Self::JsonError(_) => "invalid_json",
            // Same code for both so a client cannot tell which constraint fired.
            Self::UserAlreadyExists | Self::DuplicateKey(_) => "user_already_exists",
            Self::InvalidCredentials => "invalid_credentials",
            Self::InvalidToken => "invalid_token",
            Self::Unauthorized => "unauthorized",
            Self::ConfigError(_)
            | Self::MalformedHash(_)
            | Self::HashingFailed(_)
            | Self::DatabaseError(_)
            | Self::MailError(_)
            | Self::InternalError(_)
            | Self::IoError(_) => "internal_error",
        }
    }

    /// Message safe to show to an API client
    pub fn public_message(&self) -> String {
        match self.kind() {
            ErrorKind::Configuration | ErrorKind::Internal => GENERIC_INTERNAL_MESSAGE.to_string(),
            ErrorKind::Conflict => "User by this email already exists".to_string(),
            _ => self.to_string(),
        }
    }
}
