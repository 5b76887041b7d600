//! Bearer token authentication for protected routes

use actix_web::HttpRequest;

use passgate_common::error::{Error, Result};
use passgate_common::types::SessionClaims;

use crate::workflow::CredentialWorkflow;

/// Authenticated caller attached to a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub email: String,
}

impl From<SessionClaims> for AuthContext {
    fn from(claims: SessionClaims) -> Self {
        Self { email: claims.sub }
    }
}

/// Validate the bearer token of `req` and build the caller context
pub fn authenticate_request(req: &HttpRequest, workflow: &CredentialWorkflow) -> Result<AuthContext> {
    let token = extract_token(req)?;
    let claims = workflow.authenticate(token)?;
    Ok(AuthContext::from(claims))
}

/// Extract bearer token from request
pub fn extract_token(req: &HttpRequest) -> Result<&str> {
    let header = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or(Error::Unauthorized)?;

    let (scheme, token) = header.split_once(' ').ok_or(Error::Unauthorized)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(Error::Unauthorized);
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(Error::Unauthorized);
    }
    Ok(token)
}
