//! Common types for the passgate credential pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Credential Types
// ============================================================================

/// Stored credential record
///
/// `email` is the unique, case-sensitive identifier. `password_hash` is an
/// Argon2 PHC string and is redacted from `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
    pub verification_code: Option<String>,
    pub verification_expires_at: Option<DateTime<Utc>>,
    pub email_verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CredentialRecord {
    pub fn is_verified(&self) -> bool {
        self.email_verified_at.is_some()
    }

    /// Public view of the record
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            email: self.email.clone(),
            email_verified: self.is_verified(),
            created_at: self.created_at,
        }
    }
}

impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("id", &self.id)
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("email", &self.email)
            .field("password_hash", &"<redacted>")
            .field(
                "verification_code",
                &self.verification_code.as_ref().map(|_| "<redacted>"),
            )
            .field("verification_expires_at", &self.verification_expires_at)
            .field("email_verified_at", &self.email_verified_at)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

/// Fields required to insert a new credential record
#[derive(Clone)]
pub struct NewCredential {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
}

impl NewCredential {
    pub fn into_record(self, now: DateTime<Utc>) -> CredentialRecord {
        CredentialRecord {
            id: Uuid::new_v4(),
            first_name: self.first_name,
            last_name: self.last_name,
            email: self.email,
            password_hash: self.password_hash,
            verification_code: None,
            verification_expires_at: None,
            email_verified_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl fmt::Debug for NewCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewCredential")
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("email", &self.email)
            .field("password_hash", &"<redacted>")
            .finish()
    }
}

/// User data safe to return to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub email_verified: bool,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Session Types
// ============================================================================

/// Claims carried by a session token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Audience
    pub aud: String,
    /// Subject (the account email)
    pub sub: String,
    /// Issued at (as UTC timestamp)
    pub iat: i64,
    /// Expiration time (as UTC timestamp)
    pub exp: i64,
    /// Issuer
    pub iss: String,
    /// Unique token id
    pub jti: String,
}

// ============================================================================
// Response Types
// ============================================================================

/// Standard API error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            hint: None,
        }
    }

    #[must_use]
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl From<&crate::error::Error> for ApiError {
    fn from(error: &crate::error::Error) -> Self {
        Self::new(error.error_code(), error.public_message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn sample() -> CredentialRecord {
        NewCredential {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            password_hash: "$argon2id$v=19$m=65536,t=3,p=4$c2FsdA$aGFzaA".to_string(),
        }
        .into_record(Utc::now())
    }

    #[test]
    fn test_new_record_is_unverified() {
        let record = sample();
        assert!(!record.is_verified());
        assert!(record.verification_code.is_none());
        assert_eq!(record.created_at, record.updated_at);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut record = sample();
        record.verification_code = Some("code-value".to_string());
        let rendered = format!("{record:?}");
        assert!(!rendered.contains("argon2id"));
        assert!(!rendered.contains("code-value"));
        assert!(rendered.contains("ada@example.com"));
    }

    #[test]
    fn test_profile_omits_hash() {
        let json = serde_json::to_value(sample().profile()).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["email_verified"], false);
    }

    #[test]
    fn test_api_error_from_internal_error() {
        let error = ApiError::from(&Error::DatabaseError("disk full".to_string()));
        assert_eq!(error.code, "internal_error");
        assert!(!error.message.contains("disk full"));
    }

    #[test]
    fn test_api_error_hint() {
        let error = ApiError::new("invalid_request", "Missing required field")
            .with_hint("Include 'email' field");
        assert_eq!(error.code, "invalid_request");
        assert!(error.hint.is_some());
    }
}
