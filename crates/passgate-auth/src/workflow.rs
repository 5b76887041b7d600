//! Registration and login orchestration
//!
//! Reads and writes go through short store transactions: committed when the
//! step succeeds and rolled back (dropped) on any early return. Password
//! hashing runs on the blocking thread pool and never while a transaction is
//! open, so concurrent requests only queue for the store itself.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use passgate_common::config::{AppConfig, MIN_PASSWORD_LENGTH};
use passgate_common::error::{Error, Result};
use passgate_common::types::{CredentialRecord, NewCredential, SessionClaims, UserProfile};

use crate::clock::Clock;
use crate::hasher::PasswordHasher;
use crate::jwt::{IssuedToken, TokenService};
use crate::mail::MailSender;
use crate::store::CredentialStore;
use crate::verification::VerificationTokenIssuer;

const MAX_NAME_LENGTH: usize = 40;
const MAX_EMAIL_LENGTH: usize = 100;

// ============================================================================
// Request/Result Types
// ============================================================================

#[derive(Default, Deserialize)]
pub struct RegistrationRequest {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl fmt::Debug for RegistrationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrationRequest")
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("email", &self.email)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Default, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("email", &self.email)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Outcome of a successful registration
#[derive(Debug, Clone)]
pub struct Registration {
    pub user_id: Uuid,
    pub email: String,
    /// Whether the verification email was handed to the mail sender
    pub email_sent: bool,
    pub verification_expires_at: DateTime<Utc>,
}

/// Outcome of a successful login
#[derive(Debug, Clone)]
pub struct LoginSession {
    pub user_id: Uuid,
    pub token: IssuedToken,
}

// ============================================================================
// Workflow
// ============================================================================

/// Orchestrates the credential pipeline over a transactional store
pub struct CredentialWorkflow {
    store: Arc<dyn CredentialStore>,
    hasher: Arc<PasswordHasher>,
    tokens: Arc<TokenService>,
    verification: Arc<VerificationTokenIssuer>,
    password_min_length: usize,
}

impl CredentialWorkflow {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        hasher: Arc<PasswordHasher>,
        tokens: Arc<TokenService>,
        verification: Arc<VerificationTokenIssuer>,
        password_min_length: usize,
    ) -> Self {
        Self {
            store,
            hasher,
            tokens,
            verification,
            password_min_length: password_min_length.max(MIN_PASSWORD_LENGTH),
        }
    }

    /// Build every component of the pipeline from the application config
    ///
    /// # Errors
    /// Returns `ConfigError` for a missing signing secret, a weak hashing
    /// profile, or an unusable site URL.
    pub fn from_config(
        config: &AppConfig,
        store: Arc<dyn CredentialStore>,
        mailer: Arc<dyn MailSender>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let hasher = Arc::new(PasswordHasher::new(&config.hashing)?);
        let tokens = Arc::new(TokenService::from_config(&config.auth, clock.clone())?);
        let verification = Arc::new(VerificationTokenIssuer::from_config(
            &config.auth,
            mailer,
            clock,
        )?);

        Ok(Self::new(
            store,
            hasher,
            tokens,
            verification,
            config.auth.password_min_length,
        ))
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// Register a new account and send its verification email
    pub async fn register(&self, request: RegistrationRequest) -> Result<Registration> {
        let [first_name, last_name, email, password] = required([
            ("first_name", request.first_name),
            ("last_name", request.last_name),
            ("email", request.email),
            ("password", request.password),
        ])?;

        validate_name("first_name", &first_name)?;
        validate_name("last_name", &last_name)?;
        validate_email(&email)?;
        validate_password(&password, self.password_min_length)?;

        let password_hash = self.blocking(move |hasher| hasher.hash(&password)).await?;

        let mut tx = self.store.begin().await?;

        if tx.find_by_email(&email).await?.is_some() {
            info!("Registration rejected: identifier already registered");
            return Err(Error::UserAlreadyExists);
        }

        let record = tx
            .insert(NewCredential {
                first_name,
                last_name,
                email,
                password_hash,
            })
            .await
            .map_err(|e| match e {
                Error::DuplicateKey(_) => Error::UserAlreadyExists,
                other => other,
            })?;

        let issued = self.verification.issue(tx.as_mut(), &record.email).await?;
        tx.commit().await?;

        let email_sent = self.verification.dispatch(&record.email, &issued).await;
        info!(user_id = %record.id, email_sent, "New user registered");

        Ok(Registration {
            user_id: record.id,
            email: record.email,
            email_sent,
            verification_expires_at: issued.expires_at,
        })
    }

    /// Authenticate with email and password and issue a session token
    ///
    /// Every failure after input validation is `InvalidCredentials`, and an
    /// unknown email costs the same hash verification as a wrong password.
    pub async fn login(&self, request: LoginRequest) -> Result<LoginSession> {
        let [email, password] = required([
            ("email", request.email),
            ("password", request.password),
        ])?;

        let mut tx = self.store.begin().await?;
        let found = tx.find_by_email(&email).await?;
        tx.rollback().await?;

        let Some(record) = found else {
            if let Err(e) = self
                .blocking(move |hasher| hasher.verify_dummy(&password))
                .await
            {
                error!(error = %e, "Dummy password verification failed");
            }
            warn!(email = %email, "Login failed: invalid credentials");
            return Err(Error::InvalidCredentials);
        };

        let secret = password.clone();
        let stored = record.password_hash.clone();
        let verified = match self
            .blocking(move |hasher| hasher.verify(&secret, &stored))
            .await
        {
            Ok(verified) => verified,
            Err(Error::MalformedHash(e)) => {
                error!(user_id = %record.id, error = %e, "Stored password hash is malformed");
                false
            }
            Err(e) => return Err(e),
        };

        if !verified {
            warn!(email = %email, "Login failed: invalid credentials");
            return Err(Error::InvalidCredentials);
        }

        self.upgrade_hash(&record, password).await;

        let token = self.tokens.issue(&record.email)?;

        info!(user_id = %record.id, "User logged in");
        Ok(LoginSession {
            user_id: record.id,
            token,
        })
    }

    /// Consume a verification code
    ///
    /// Unknown email, wrong code and expired code all return `InvalidToken`.
    pub async fn verify_email(&self, email: Option<String>, code: Option<String>) -> Result<()> {
        let [email, code] = required([("email", email), ("code", code)])?;

        let mut tx = self.store.begin().await?;
        let consumed = self.verification.consume(tx.as_mut(), &email, &code).await?;
        tx.commit().await?;

        if consumed {
            info!(email = %email, "Email address verified");
            Ok(())
        } else {
            warn!(email = %email, "Email verification rejected");
            Err(Error::InvalidToken)
        }
    }

    /// Issue and send a fresh verification code
    ///
    /// Succeeds whether or not the email belongs to an account.
    pub async fn resend_verification(&self, email: Option<String>) -> Result<()> {
        let [email] = required([("email", email)])?;

        let mut tx = self.store.begin().await?;
        if let Some(record) = tx.find_by_email(&email).await? {
            if record.is_verified() {
                return Ok(());
            }
        }

        let issued = self.verification.issue(tx.as_mut(), &email).await?;
        tx.commit().await?;

        if issued.persisted {
            self.verification.dispatch(&email, &issued).await;
        }
        Ok(())
    }

    /// Validate a bearer token
    pub fn authenticate(&self, token: &str) -> Result<SessionClaims> {
        let outcome = self.tokens.validate(token);
        if !outcome.is_valid() {
            debug!(reason = outcome.reason(), "Unauthenticated request");
        }
        outcome.into_result()
    }

    /// Profile of an authenticated account
    ///
    /// A token that outlives its account is `Unauthorized`.
    pub async fn current_user(&self, email: &str) -> Result<UserProfile> {
        let mut tx = self.store.begin().await?;
        let record = tx.find_by_email(email).await?.ok_or(Error::Unauthorized)?;
        Ok(record.profile())
    }

    /// Re-hash with the current profile when the stored hash is stale
    ///
    /// Failures are logged; the login itself still succeeds.
    async fn upgrade_hash(&self, record: &CredentialRecord, password: String) {
        match self.hasher.needs_rehash(&record.password_hash) {
            Ok(true) => {}
            Ok(false) => return,
            Err(e) => {
                warn!(user_id = %record.id, error = %e, "Could not inspect password hash");
                return;
            }
        }

        let rehashed = match self.blocking(move |hasher| hasher.hash(&password)).await {
            Ok(hash) => hash,
            Err(e) => {
                warn!(user_id = %record.id, error = %e, "Password rehash failed");
                return;
            }
        };

        match self.replace_hash(record, rehashed).await {
            Ok(true) => info!(user_id = %record.id, "Password hash upgraded"),
            Ok(false) => {
                debug!(user_id = %record.id, "Password hash changed meanwhile; upgrade skipped");
            }
            Err(e) => {
                warn!(user_id = %record.id, error = %e, "Could not store upgraded password hash");
            }
        }
    }

    /// Swap in `rehashed` if the record still holds the hash that was verified
    async fn replace_hash(&self, verified: &CredentialRecord, rehashed: String) -> Result<bool> {
        let mut tx = self.store.begin().await?;
        let Some(mut current) = tx.find_by_id(&verified.id).await? else {
            return Ok(false);
        };
        if current.password_hash != verified.password_hash {
            return Ok(false);
        }

        current.password_hash = rehashed;
        tx.update(&current).await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&PasswordHasher) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let hasher = Arc::clone(&self.hasher);
        tokio::task::spawn_blocking(move || f(&hasher))
            .await
            .map_err(|e| Error::InternalError(format!("Hashing task failed: {e}")))?
    }
}

// ============================================================================
// Input Validation
// ============================================================================

/// Unwrap required fields, reporting every absent or empty one at once
fn required<const N: usize>(fields: [(&'static str, Option<String>); N]) -> Result<[String; N]> {
    let missing: Vec<String> = fields
        .iter()
        .filter(|(_, value)| value.as_deref().map_or(true, str::is_empty))
        .map(|(name, _)| (*name).to_string())
        .collect();

    if !missing.is_empty() {
        return Err(Error::MissingFields(missing));
    }

    Ok(fields.map(|(_, value)| value.unwrap_or_default()))
}

fn validate_name(field: &str, value: &str) -> Result<()> {
    if value.chars().count() > MAX_NAME_LENGTH {
        return Err(Error::ValidationError(format!(
            "{field} must be at most {MAX_NAME_LENGTH} characters"
        )));
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<()> {
    if !email.contains('@') || !email.contains('.') {
        return Err(Error::InvalidEmail);
    }
    if email.chars().count() > MAX_EMAIL_LENGTH {
        return Err(Error::ValidationError(format!(
            "email must be at most {MAX_EMAIL_LENGTH} characters"
        )));
    }
    Ok(())
}

fn validate_password(password: &str, min_length: usize) -> Result<()> {
    if password.chars().count() < min_length {
        return Err(Error::WeakPassword(format!(
            "Password must be at least {min_length} characters"
        )));
    }
    Ok(())
}
