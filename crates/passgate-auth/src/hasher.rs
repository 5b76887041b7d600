//! Argon2id password hashing
//!
//! Every hash is a self-describing PHC string
//! (`$argon2id$v=19$m=65536,t=3,p=4$<salt>$<hash>`), so the parameters used to
//! produce it can be compared against the current profile by
//! [`PasswordHasher::needs_rehash`].

use argon2::password_hash::{
    self, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString,
};
use argon2::{Algorithm, Argon2, Params, Version};
use once_cell::sync::OnceCell;
use rand::rngs::OsRng;
use rand::RngCore;

use passgate_common::config::HashingConfig;
use passgate_common::error::{Error, Result};

/// Password hasher bound to one fixed Argon2id profile
pub struct PasswordHasher {
    profile: HashingConfig,
    argon2: Argon2<'static>,
    dummy_hash: OnceCell<String>,
}

impl PasswordHasher {
    /// Build a hasher for `profile`
    ///
    /// # Errors
    /// Returns `ConfigError` when the profile is below the minimum cost.
    pub fn new(profile: &HashingConfig) -> Result<Self> {
        profile.validate()?;

        let params = Params::new(
            profile.memory_cost_kib,
            profile.time_cost,
            profile.parallelism,
            Some(profile.output_len),
        )
        .map_err(|e| Error::ConfigError(format!("Invalid Argon2 parameters: {e}")))?;

        Ok(Self {
            profile: profile.clone(),
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
            dummy_hash: OnceCell::new(),
        })
    }

    /// Hash `secret` with a freshly generated salt
    pub fn hash(&self, secret: &str) -> Result<String> {
        let mut salt_bytes = vec![0u8; self.profile.salt_len];
        OsRng.fill_bytes(&mut salt_bytes);
        let salt = SaltString::encode_b64(&salt_bytes)
            .map_err(|e| Error::HashingFailed(format!("Salt encoding failed: {e}")))?;

        self.argon2
            .hash_password(secret.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| Error::HashingFailed(e.to_string()))
    }

    /// Check `secret` against a stored hash
    ///
    /// Returns `Ok(false)` on mismatch. A hash that cannot be parsed as an
    /// Argon2 PHC string is `Err(MalformedHash)`.
    pub fn verify(&self, secret: &str, hash: &str) -> Result<bool> {
        let parsed = parse(hash)?;

        match self.argon2.verify_password(secret.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(e) => Err(malformed(e)),
        }
    }

    /// Whether `hash` was produced with parameters other than the current profile
    pub fn needs_rehash(&self, hash: &str) -> Result<bool> {
        let parsed = parse(hash)?;

        let algorithm = Algorithm::try_from(parsed.algorithm).map_err(malformed)?;
        let version = parsed
            .version
            .map(Version::try_from)
            .transpose()
            .map_err(malformed)?;
        let params = Params::try_from(&parsed).map_err(malformed)?;
        let output_len = parsed.hash.map(|output| output.len());

        Ok(algorithm != Algorithm::Argon2id
            || version != Some(Version::V0x13)
            || params.m_cost() != self.profile.memory_cost_kib
            || params.t_cost() != self.profile.time_cost
            || params.p_cost() != self.profile.parallelism
            || output_len != Some(self.profile.output_len))
    }

    /// Run a full verification against a throwaway hash
    ///
    /// Used when no record exists for the identifier so that the response time
    /// matches a real password check.
    pub fn verify_dummy(&self, secret: &str) -> Result<()> {
        let dummy = self.dummy_hash.get_or_try_init(|| {
            let mut filler = [0u8; 32];
            OsRng.fill_bytes(&mut filler);
            self.hash(&base64_filler(&filler))
        })?;
        self.verify(secret, dummy).map(|_| ())
    }
}

#[cfg(test)]
impl PasswordHasher {
    /// Whether `verify_dummy` has run at least once
    pub(crate) fn dummy_hash_ready(&self) -> bool {
        self.dummy_hash.get().is_some()
    }
}

fn parse(hash: &str) -> Result<PasswordHash<'_>> {
    PasswordHash::new(hash).map_err(malformed)
}

fn malformed(e: impl std::fmt::Display) -> Error {
    Error::MalformedHash(e.to_string())
}

fn base64_filler(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD_NO_PAD.encode(bytes)
}
