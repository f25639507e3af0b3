use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;

use crate::db::queries;
use crate::errors::{AppError, EngineError};
use crate::models::{BookingRef, PaymentNotification};
use crate::services::reconciler;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct SimulateBody {
    pub booking_code: String,
    #[serde(default = "default_status")]
    pub transaction_status: String,
    pub fraud_status: Option<String>,
    pub payment_type: Option<String>,
}

fn default_status() -> String {
    "settlement".to_string()
}

fn status_code(transaction_status: &str) -> &'static str {
    match transaction_status {
        "capture" | "settlement" | "refund" | "partial_refund" => "200",
        "pending" => "201",
        _ => "202",
    }
}

// POST /api/dev/payments/simulate
/// Feeds a correctly signed provider notification through the reconciler.
pub async fn simulate_payment(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SimulateBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let key = &state.config.payment_server_key;
    let mut db = state.db()?;

    let booking = queries::find_booking(&db, &BookingRef::Code(body.booking_code.clone()))?
        .ok_or_else(|| EngineError::BookingNotFound(body.booking_code.clone()))?;

    let code = status_code(&body.transaction_status);
    let gross_amount = format!("{}.00", booking.total_price);
    let notification = PaymentNotification {
        signature_key: reconciler::sign(&booking.booking_code, code, &gross_amount, key),
        order_id: booking.booking_code.clone(),
        status_code: code.to_string(),
        gross_amount,
        transaction_status: body.transaction_status,
        fraud_status: body.fraud_status,
        payment_type: body.payment_type.or_else(|| Some("simulator".to_string())),
        transaction_time: Some(Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()),
        transaction_id: Some(uuid::Uuid::new_v4().to_string()),
    };
    let payload = serde_json::to_vec(&notification)
        .map_err(|e| AppError::Internal(format!("failed to encode notification: {e}")))?;

    tracing::info!(
        booking_code = %booking.booking_code,
        transaction_status = %notification.transaction_status,
        "simulating payment notification"
    );
    let outcome = reconciler::handle_notification(&mut db, &payload, key, Utc::now())?;
    Ok(Json(serde_json::json!({ "status": outcome.as_str() })))
}
