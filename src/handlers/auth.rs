use axum::http::HeaderMap;
use chrono::Utc;

use crate::errors::{AppError, EngineError};
use crate::models::CallerIdentity;
use crate::services::session;
use crate::state::AppState;

/// Resolves the bearer token on a request into a verified caller.
pub fn caller(headers: &HeaderMap, state: &AppState) -> Result<CallerIdentity, AppError> {
    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(AppError::Unauthorized)?;

    session::verify(&state.config.session_secret, token, Utc::now()).map_err(|e| {
        tracing::debug!(error = %e, "rejected session token");
        AppError::Unauthorized
    })
}

pub fn staff(headers: &HeaderMap, state: &AppState) -> Result<CallerIdentity, AppError> {
    let identity = caller(headers, state)?;
    if !identity.is_staff() {
        return Err(EngineError::Forbidden("staff only".to_string()).into());
    }
    Ok(identity)
}
