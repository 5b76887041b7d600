//! Auth server implementation

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use std::sync::Arc;
use tracing::info;

use passgate_common::config::{AppConfig, ServerConfig};
use passgate_common::error::Result;

use crate::clock::{Clock, SystemClock};
use crate::handlers::{self, AuthState};
use crate::mail::{self, MailSender};
use crate::store::CredentialStore;
use crate::workflow::CredentialWorkflow;

/// HTTP front end for the credential workflow
pub struct AuthServer {
    config: ServerConfig,
    state: Arc<AuthState>,
}

impl AuthServer {
    /// Create a new auth server with the configured mail sender and the wall clock
    ///
    /// # Errors
    /// Returns `ConfigError` when any component rejects its configuration.
    pub fn new(config: &AppConfig, store: Arc<dyn CredentialStore>) -> Result<Self> {
        let mailer = mail::from_config(&config.mail)?;
        Self::with_components(config, store, mailer, Arc::new(SystemClock))
    }

    pub fn with_components(
        config: &AppConfig,
        store: Arc<dyn CredentialStore>,
        mailer: Arc<dyn MailSender>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let workflow = CredentialWorkflow::from_config(config, store, mailer, clock)?;

        Ok(Self {
            config: config.server.clone(),
            state: Arc::new(AuthState {
                workflow: Arc::new(workflow),
            }),
        })
    }

    /// Get auth state for sharing with other services
    pub fn state(&self) -> Arc<AuthState> {
        self.state.clone()
    }

    /// Run the auth server
    pub async fn run(&self) -> Result<()> {
        let state = self.state.clone();
        let host = self.config.host.clone();
        let port = self.config.port;

        info!("Starting Auth server on {}:{}", host, port);

        HttpServer::new(move || {
            App::new()
                .app_data(web::Data::new(state.clone()))
                .wrap(Cors::permissive())
                .wrap(middleware::Logger::default())
                .configure(routes)
        })
        .workers(self.config.workers.max(1))
        .bind((host.as_str(), port))?
        .run()
        .await?;

        Ok(())
    }
}

/// Register the `/auth/v1` endpoints
///
/// Expects `web::Data<Arc<AuthState>>` to be registered on the app.
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/auth/v1")
            .app_data(handlers::json_config())
            .service(endpoint("/health").route(web::get().to(handlers::health)))
            .service(endpoint("/register").route(web::post().to(handlers::register)))
            .service(endpoint("/login").route(web::post().to(handlers::login)))
            .service(
                endpoint("/verify")
                    .route(web::post().to(handlers::verify))
                    .route(web::get().to(handlers::verify_link)),
            )
            .service(endpoint("/resend").route(web::post().to(handlers::resend)))
            .service(endpoint("/user").route(web::get().to(handlers::get_user))),
    );
}

fn endpoint(path: &str) -> actix_web::Resource {
    web::resource(path).default_service(web::to(handlers::method_not_allowed))
}
