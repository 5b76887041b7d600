//! Session token issuance and validation
//!
//! Tokens are HS256 JWTs. Validation checks the signature and token shape
//! first; expiry is only evaluated for authentic tokens, so a forged token is
//! always reported as `Invalid` regardless of its claimed `exp`.

use chrono::Duration;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use std::sync::Arc;
use uuid::Uuid;

use passgate_common::config::AuthConfig;
use passgate_common::error::{Error, Result};
use passgate_common::types::SessionClaims;

use crate::clock::Clock;

const AUDIENCE: &str = "authenticated";

/// A freshly signed session token
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: SessionClaims,
    /// Lifetime in seconds
    pub expires_in: u64,
}

/// Result of validating a session token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenOutcome {
    Valid(SessionClaims),
    /// Authentic, but past `exp`
    Expired,
    /// Bad signature, wrong issuer/audience, or not a token at all
    Invalid,
}

impl TokenOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }

    /// Short label for logs and metrics
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Valid(_) => "valid",
            Self::Expired => "expired",
            Self::Invalid => "invalid",
        }
    }

    /// Collapse both failure outcomes into the caller-visible `Unauthorized`
    pub fn into_result(self) -> Result<SessionClaims> {
        match self {
            Self::Valid(claims) => Ok(claims),
            Self::Expired | Self::Invalid => Err(Error::Unauthorized),
        }
    }
}

/// Issues and validates session tokens with a process-wide signing key
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    lifetime: Duration,
    algorithm: Algorithm,
    clock: Arc<dyn Clock>,
}

impl TokenService {
    /// Create a token service with the given secret
    pub fn new(secret: &[u8], issuer: &str, lifetime_secs: u64, clock: Arc<dyn Clock>) -> Self {
        let lifetime = i64::try_from(lifetime_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX);
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            issuer: issuer.to_string(),
            lifetime,
            algorithm: Algorithm::HS256,
            clock,
        }
    }

    /// Build from the auth configuration
    ///
    /// # Errors
    /// Returns `ConfigError` when the signing secret is missing or too short.
    pub fn from_config(config: &AuthConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let secret = config.signing_secret()?;
        Ok(Self::new(
            secret.as_bytes(),
            &config.jwt_issuer,
            config.token_lifetime_secs,
            clock,
        ))
    }

    /// Token lifetime in seconds
    pub fn lifetime_secs(&self) -> u64 {
        u64::try_from(self.lifetime.num_seconds()).unwrap_or(0)
    }

    /// Sign a token for `subject`
    pub fn issue(&self, subject: &str) -> Result<IssuedToken> {
        let now = self.clock.now();
        let exp = now
            .checked_add_signed(self.lifetime)
            .ok_or_else(|| Error::InternalError("token expiry out of range".to_string()))?;

        let claims = SessionClaims {
            aud: AUDIENCE.to_string(),
            sub: subject.to_string(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
            iss: self.issuer.clone(),
            jti: Uuid::new_v4().to_string(),
        };

        let token = encode(&Header::new(self.algorithm), &claims, &self.encoding_key)
            .map_err(|e| Error::InternalError(format!("Failed to encode JWT: {e}")))?;

        Ok(IssuedToken {
            token,
            claims,
            expires_in: self.lifetime_secs(),
        })
    }

    /// Validate a token. Never fails; see [`TokenOutcome`].
    pub fn validate(&self, token: &str) -> TokenOutcome {
        let mut validation = Validation::new(self.algorithm);
        // Expiry is checked below against the injected clock.
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp", "iat", "sub", "iss", "aud"]);
        validation.set_audience(&[AUDIENCE]);
        validation.set_issuer(&[&self.issuer]);

        let claims = match decode::<SessionClaims>(token, &self.decoding_key, &validation) {
            Ok(data) => data.claims,
            Err(e) => {
                tracing::debug!(error = %e, "Rejected session token");
                return TokenOutcome::Invalid;
            }
        };

        if self.clock.now().timestamp() >= claims.exp {
            return TokenOutcome::Expired;
        }

        TokenOutcome::Valid(claims)
    }
}
