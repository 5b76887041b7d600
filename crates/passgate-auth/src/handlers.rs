//! HTTP handlers for authentication endpoints

use actix_web::{error::InternalError, web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

use passgate_common::error::{Error, ErrorKind};
use passgate_common::types::ApiError;

use crate::middleware::authenticate_request;
use crate::workflow::{CredentialWorkflow, LoginRequest, RegistrationRequest};

/// Largest accepted JSON body
const JSON_LIMIT: usize = 16 * 1024;

/// Shared auth state
pub struct AuthState {
    pub workflow: Arc<CredentialWorkflow>,
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct VerifyRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResendRequest {
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub message: String,
    pub user_id: Uuid,
    pub email: String,
    pub email_sent: bool,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub message: String,
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub expires_at: i64,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /auth/v1/register
pub async fn register(
    state: web::Data<Arc<AuthState>>,
    request: web::Json<RegistrationRequest>,
) -> HttpResponse {
    match state.workflow.register(request.into_inner()).await {
        Ok(registration) => {
            let message = if registration.email_sent {
                "User registered. Check your email to verify your address."
            } else {
                "User registered, but the verification email could not be sent. Request a new one."
            };
            HttpResponse::Created().json(RegisterResponse {
                message: message.to_string(),
                user_id: registration.user_id,
                email: registration.email,
                email_sent: registration.email_sent,
            })
        }
        Err(e) => error_response(e),
    }
}

/// POST /auth/v1/login
pub async fn login(
    state: web::Data<Arc<AuthState>>,
    request: web::Json<LoginRequest>,
) -> HttpResponse {
    match state.workflow.login(request.into_inner()).await {
        Ok(session) => HttpResponse::Ok().json(TokenResponse {
            message: "Login successful".to_string(),
            access_token: session.token.token,
            token_type: "bearer".to_string(),
            expires_in: session.token.expires_in,
            expires_at: session.token.claims.exp,
        }),
        Err(e) => error_response(e),
    }
}

/// POST /auth/v1/verify
pub async fn verify(
    state: web::Data<Arc<AuthState>>,
    request: web::Json<VerifyRequest>,
) -> HttpResponse {
    let VerifyRequest { email, code } = request.into_inner();
    match state.workflow.verify_email(email, code).await {
        Ok(()) => HttpResponse::Ok().json(MessageResponse::new("Email address verified")),
        Err(e) => error_response(e),
    }
}

/// GET /auth/v1/verify?email=..&code=..
///
/// Target of the link in the verification email.
pub async fn verify_link(
    state: web::Data<Arc<AuthState>>,
    query: web::Query<VerifyRequest>,
) -> HttpResponse {
    let VerifyRequest { email, code } = query.into_inner();
    match state.workflow.verify_email(email, code).await {
        Ok(()) => HttpResponse::Ok().json(MessageResponse::new("Email address verified")),
        Err(e) => error_response(e),
    }
}

/// POST /auth/v1/resend
///
/// Accepted whether or not the address has an account.
pub async fn resend(
    state: web::Data<Arc<AuthState>>,
    request: web::Json<ResendRequest>,
) -> HttpResponse {
    match state.workflow.resend_verification(request.into_inner().email).await {
        Ok(()) => HttpResponse::Accepted().json(MessageResponse::new(
            "If the address has an unverified account, a verification email is on its way",
        )),
        Err(e) => error_response(e),
    }
}

/// GET /auth/v1/user
pub async fn get_user(state: web::Data<Arc<AuthState>>, http_req: HttpRequest) -> HttpResponse {
    let context = match authenticate_request(&http_req, &state.workflow) {
        Ok(context) => context,
        Err(e) => return error_response(e),
    };

    match state.workflow.current_user(&context.email).await {
        Ok(profile) => HttpResponse::Ok().json(profile),
        Err(e) => error_response(e),
    }
}

/// GET /auth/v1/health
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "auth",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Fallback for a known path hit with the wrong method
pub async fn method_not_allowed() -> HttpResponse {
    HttpResponse::MethodNotAllowed().json(ApiError::new(
        "method_not_allowed",
        "Method not allowed for this endpoint",
    ))
}

// ============================================================================
// Helpers
// ============================================================================

/// JSON extractor settings: malformed bodies become a 400 `ApiError`
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(JSON_LIMIT)
        .error_handler(|err, _req| {
            let response = HttpResponse::BadRequest().json(
                ApiError::new(
                    "invalid_json",
                    format!("Request body is not valid JSON: {err}"),
                )
                .with_hint("Send a JSON object with Content-Type: application/json"),
            );
            InternalError::from_response(err, response).into()
        })
}

pub fn error_response(error: Error) -> HttpResponse {
    if matches!(error.kind(), ErrorKind::Internal | ErrorKind::Configuration) {
        error!(error = %error, "Request failed with internal error");
    }

    let api_error = ApiError::from(&error);
    match error.status_code() {
        400 => HttpResponse::BadRequest().json(api_error),
        401 => HttpResponse::Unauthorized().json(api_error),
        409 => HttpResponse::Conflict().json(api_error),
        _ => HttpResponse::InternalServerError().json(api_error),
    }
}
