//! Email verification codes
//!
//! A code is stored on the credential record together with its expiry. It is
//! cleared when consumed, and an expired code is cleared on the first attempt
//! to use it, so a code grants verification at most once.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

use passgate_common::config::AuthConfig;
use passgate_common::error::{Error, Result};

use crate::clock::Clock;
use crate::mail::{MailSender, OutgoingEmail};
use crate::store::CredentialTx;

/// A generated verification code
#[derive(Debug, Clone)]
pub struct IssuedCode {
    pub code: String,
    pub expires_at: DateTime<Utc>,
    /// False when no record matched the identifier and nothing was stored
    pub persisted: bool,
}

/// Issues, delivers and consumes single-use email verification codes
pub struct VerificationTokenIssuer {
    window: Duration,
    site_url: Url,
    mailer: Arc<dyn MailSender>,
    clock: Arc<dyn Clock>,
}

impl VerificationTokenIssuer {
    pub fn new(
        window_secs: u64,
        site_url: &str,
        mailer: Arc<dyn MailSender>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let site_url = Url::parse(site_url)
            .map_err(|e| Error::ConfigError(format!("Invalid site_url {site_url:?}: {e}")))?;
        if site_url.cannot_be_a_base() {
            return Err(Error::ConfigError(format!(
                "site_url {site_url} cannot be used as a link base"
            )));
        }
        let window = i64::try_from(window_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .ok_or_else(|| Error::ConfigError("verification window too large".to_string()))?;

        Ok(Self {
            window,
            site_url,
            mailer,
            clock,
        })
    }

    pub fn from_config(
        config: &AuthConfig,
        mailer: Arc<dyn MailSender>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        Self::new(
            config.verification_window_secs,
            &config.site_url,
            mailer,
            clock,
        )
    }

    /// Generate a code for `email` and store it on the matching record
    ///
    /// Replaces any outstanding code. When no record exists nothing is
    /// stored, and the returned code has `persisted == false`.
    pub async fn issue(&self, tx: &mut dyn CredentialTx, email: &str) -> Result<IssuedCode> {
        let code = generate_code();
        let expires_at = self
            .clock
            .now()
            .checked_add_signed(self.window)
            .ok_or_else(|| Error::InternalError("verification expiry out of range".to_string()))?;

        let Some(mut record) = tx.find_by_email(email).await? else {
            warn!("Verification code requested for unknown identifier");
            return Ok(IssuedCode {
                code,
                expires_at,
                persisted: false,
            });
        };

        record.verification_code = Some(code.clone());
        record.verification_expires_at = Some(expires_at);
        tx.update(&record).await?;

        Ok(IssuedCode {
            code,
            expires_at,
            persisted: true,
        })
    }

    /// Link that completes verification for `email`
    pub fn verification_link(&self, email: &str, code: &str) -> Result<String> {
        let mut url = self.site_url.clone();
        url.path_segments_mut()
            .map_err(|()| Error::InternalError("site_url cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(["auth", "v1", "verify"]);
        url.query_pairs_mut()
            .append_pair("email", email)
            .append_pair("code", code);
        Ok(url.into())
    }

    /// Send the verification email
    ///
    /// Returns whether delivery succeeded. A failure is logged and never
    /// affects the stored code, which stays valid for a resend.
    pub async fn dispatch(&self, email: &str, issued: &IssuedCode) -> bool {
        let link = match self.verification_link(email, &issued.code) {
            Ok(link) => link,
            Err(e) => {
                warn!(error = %e, "Could not build verification link");
                return false;
            }
        };

        let message = OutgoingEmail {
            to: email.to_string(),
            subject: "Confirm your email address".to_string(),
            text: format!(
                "Confirm your email address by opening the link below.\n\n{link}\n\n\
                 The link expires at {} UTC.",
                issued.expires_at.format("%Y-%m-%d %H:%M")
            ),
            html: None,
        };

        match self.mailer.send(&message).await {
            Ok(()) => {
                info!(to = %email, "Verification email sent");
                true
            }
            Err(e) => {
                warn!(to = %email, error = %e, "Verification email could not be sent");
                false
            }
        }
    }

    /// Check and invalidate a code in one step
    ///
    /// `Ok(false)` covers unknown identifier, no outstanding code, mismatch and
    /// expiry alike. On success the code is cleared and the record marked
    /// verified; the caller commits the transaction.
    pub async fn consume(&self, tx: &mut dyn CredentialTx, email: &str, code: &str) -> Result<bool> {
        let Some(mut record) = tx.find_by_email(email).await? else {
            return Ok(false);
        };
        let (Some(stored), Some(expires_at)) = (
            record.verification_code.clone(),
            record.verification_expires_at,
        ) else {
            return Ok(false);
        };

        let now = self.clock.now();
        if now >= expires_at {
            record.verification_code = None;
            record.verification_expires_at = None;
            tx.update(&record).await?;
            return Ok(false);
        }

        if !codes_match(&stored, code) {
            return Ok(false);
        }

        record.verification_code = None;
        record.verification_expires_at = None;
        record.email_verified_at.get_or_insert(now);
        tx.update(&record).await?;

        Ok(true)
    }
}

/// Generate an unguessable URL-safe code (32 random bytes)
fn generate_code() -> String {
    use base64::Engine;
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

fn codes_match(stored: &str, presented: &str) -> bool {
    ring::constant_time::verify_slices_are_equal(stored.as_bytes(), presented.as_bytes()).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::mail::MemoryMailer;
    use crate::store::{CredentialStore, MemoryCredentialStore};
    use passgate_common::types::NewCredential;

    const EMAIL: &str = "a@b.com";

    struct Fixture {
        store: MemoryCredentialStore,
        clock: Arc<ManualClock>,
        mailer: Arc<MemoryMailer>,
        issuer: VerificationTokenIssuer,
    }

    async fn fixture_with(mailer: MemoryMailer) -> Fixture {
        let store = MemoryCredentialStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert(NewCredential {
            first_name: "a".to_string(),
            last_name: "b".to_string(),
            email: EMAIL.to_string(),
            password_hash: "$argon2id$v=19$m=65536,t=3,p=4$c2FsdA$aGFzaA".to_string(),
        })
        .await
        .unwrap();
        tx.commit().await.unwrap();

        let clock = Arc::new(ManualClock::default());
        let mailer = Arc::new(mailer);
        let issuer = VerificationTokenIssuer::new(
            3 * 60 * 60,
            "https://app.example.com",
            mailer.clone(),
            clock.clone(),
        )
        .unwrap();

        Fixture {
            store,
            clock,
            mailer,
            issuer,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with(MemoryMailer::new()).await
    }

    impl Fixture {
        async fn issue(&self, email: &str) -> IssuedCode {
            let mut tx = self.store.begin().await.unwrap();
            let issued = self.issuer.issue(tx.as_mut(), email).await.unwrap();
            tx.commit().await.unwrap();
            issued
        }

        async fn consume(&self, email: &str, code: &str) -> bool {
            let mut tx = self.store.begin().await.unwrap();
            let ok = self.issuer.consume(tx.as_mut(), email, code).await.unwrap();
            tx.commit().await.unwrap();
            ok
        }
    }

    #[tokio::test]
    async fn test_issue_persists_code_with_window() {
        let f = fixture().await;
        let issued = f.issue(EMAIL).await;

        assert!(issued.persisted);
        assert_eq!(issued.expires_at, f.clock.now() + Duration::hours(3));

        let record = f.store.get(EMAIL).await.unwrap();
        assert_eq!(record.verification_code.as_deref(), Some(issued.code.as_str()));
        assert_eq!(record.verification_expires_at, Some(issued.expires_at));
    }

    #[tokio::test]
    async fn test_codes_are_random() {
        let f = fixture().await;
        let first = f.issue(EMAIL).await;
        let second = f.issue(EMAIL).await;
        assert_ne!(first.code, second.code);
        assert_eq!(first.code.len(), 43);

        // Re-issuing replaces the outstanding code
        assert!(!f.consume(EMAIL, &first.code).await);
        assert!(f.consume(EMAIL, &second.code).await);
    }

    #[tokio::test]
    async fn test_consume_is_single_use() {
        let f = fixture().await;
        let issued = f.issue(EMAIL).await;

        assert!(f.consume(EMAIL, &issued.code).await);
        assert!(!f.consume(EMAIL, &issued.code).await);

        let record = f.store.get(EMAIL).await.unwrap();
        assert!(record.is_verified());
        assert!(record.verification_code.is_none());
    }

    #[tokio::test]
    async fn test_expired_code_is_rejected_and_cleared() {
        let f = fixture().await;
        let issued = f.issue(EMAIL).await;

        f.clock.advance(Duration::hours(3));
        assert!(!f.consume(EMAIL, &issued.code).await);

        let record = f.store.get(EMAIL).await.unwrap();
        assert!(!record.is_verified());
        assert!(record.verification_code.is_none());

        // Rewinding time does not bring the code back
        f.clock.advance(Duration::hours(-3));
        assert!(!f.consume(EMAIL, &issued.code).await);
    }

    #[tokio::test]
    async fn test_mismatch_keeps_code() {
        let f = fixture().await;
        let issued = f.issue(EMAIL).await;

        assert!(!f.consume(EMAIL, "wrong-code").await);
        assert!(f.consume(EMAIL, &issued.code).await);
    }

    #[tokio::test]
    async fn test_unknown_identifier() {
        let f = fixture().await;
        let issued = f.issue("nobody@b.com").await;
        assert!(!issued.persisted);
        assert!(!issued.code.is_empty());

        assert!(!f.consume("nobody@b.com", &issued.code).await);
        assert_eq!(f.store.len().await, 1);
    }

    #[tokio::test]
    async fn test_dispatch_sends_link() {
        let f = fixture().await;
        let issued = f.issue(EMAIL).await;

        assert!(f.issuer.dispatch(EMAIL, &issued).await);
        let mail = f.mailer.last_to(EMAIL).unwrap();
        let link = f.issuer.verification_link(EMAIL, &issued.code).unwrap();
        assert!(mail.text.contains(&link));
        assert!(link.starts_with("https://app.example.com/auth/v1/verify?email=a%40b.com&code="));
    }

    #[tokio::test]
    async fn test_dispatch_failure_keeps_code() {
        let f = fixture_with(MemoryMailer::failing()).await;
        let issued = f.issue(EMAIL).await;

        assert!(!f.issuer.dispatch(EMAIL, &issued).await);
        assert!(f.consume(EMAIL, &issued.code).await);
    }

    #[test]
    fn test_oversized_window_rejected() {
        let result = VerificationTokenIssuer::new(
            u64::MAX,
            "https://app.example.com",
            Arc::new(MemoryMailer::new()),
            Arc::new(ManualClock::default()),
        );
        assert!(matches!(result, Err(Error::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_expiry_overflow_is_an_error() {
        let f = fixture().await;
        f.clock.set(DateTime::<Utc>::MAX_UTC);

        let mut tx = f.store.begin().await.unwrap();
        let result = f.issuer.issue(tx.as_mut(), EMAIL).await;
        assert!(matches!(result, Err(Error::InternalError(_))));
    }

    #[test]
    fn test_invalid_site_url() {
        let result = VerificationTokenIssuer::new(
            60,
            "not a url",
            Arc::new(MemoryMailer::new()),
            Arc::new(ManualClock::default()),
        );
        assert!(matches!(result, Err(Error::ConfigError(_))));
    }
}
