//! Passgate credential service
//!
//! Ties the pieces of the credential pipeline together behind one HTTP server:
//!
//! - **Password storage** - Argon2id PHC hashes with transparent rehash on login
//! - **Session tokens** - short-lived HS256 JWTs
//! - **Email verification** - single-use, expiring codes sent by mail
//! - **Registration / login** - transactional workflow over a credential store

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub use passgate_auth as auth;
pub use passgate_common as common;

use std::sync::Arc;
use tracing::{info, warn};

use passgate_auth::{AuthServer, MemoryCredentialStore};
use passgate_common::config::AppConfig;
use passgate_common::error::Result;

/// Main passgate server
pub struct PassgateServer {
    config: AppConfig,
    auth_server: AuthServer,
}

impl PassgateServer {
    /// Create a server backed by the bundled in-memory credential store
    ///
    /// # Errors
    /// Returns an error if the configuration is rejected.
    pub fn new(config: AppConfig) -> Result<Self> {
        info!("Initializing passgate");
        config.validate()?;

        if config.database.url.is_some() {
            warn!("database.url is set, but only the in-memory credential store is built in; records will not persist");
        }

        let store = Arc::new(MemoryCredentialStore::new());
        let auth_server = AuthServer::new(&config, store)?;

        Ok(Self {
            config,
            auth_server,
        })
    }

    /// Get reference to the auth server
    #[must_use]
    pub fn auth(&self) -> &AuthServer {
        &self.auth_server
    }

    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Serve until the HTTP server stops
    ///
    /// The server drains in-flight requests and returns on SIGINT or SIGTERM.
    ///
    /// # Errors
    /// Returns an error if the listener cannot be bound.
    pub async fn run(&self) -> Result<()> {
        info!(
            "Auth service: http://{}:{}/auth/v1",
            self.config.server.host, self.config.server.port
        );
        self.auth_server.run().await
    }
}
