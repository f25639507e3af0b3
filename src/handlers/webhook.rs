use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use chrono::Utc;

use crate::errors::AppError;
use crate::services::reconciler;
use crate::state::AppState;

/// Provider notification endpoint. Any 2xx tells the provider to stop retrying,
/// so duplicates and ignored transitions are acknowledged too.
pub async fn payment_webhook(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<serde_json::Value>, AppError> {
    let outcome = {
        let mut db = state.db()?;
        reconciler::handle_notification(&mut db, &body, &state.config.payment_server_key, Utc::now())?
    };
    Ok(Json(serde_json::json!({ "status": outcome.as_str() })))
}
