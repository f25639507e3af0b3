use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;

use crate::db::queries::{self, BookingFilter};
use crate::errors::{AppError, EngineError};
use crate::models::availability::parse_instant;
use crate::models::{Booking, BookingRef, BookingStatus};
use crate::services::checkout::{self, Checkout};
use crate::services::ledger::{self, BookingRequest};
use crate::state::AppState;

use super::auth;

// POST /api/bookings
#[derive(Deserialize)]
pub struct CreateBookingBody {
    pub vehicle_id: i64,
    pub customer_id: Option<i64>,
    /// RFC 3339 instant or `YYYY-MM-DD` (midnight UTC).
    pub start_date: String,
    pub end_date: String,
    pub notes: Option<String>,
}

pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateBookingBody>,
) -> Result<(StatusCode, Json<Checkout>), AppError> {
    let caller = auth::caller(&headers, &state)?;

    let request = BookingRequest {
        vehicle_id: body.vehicle_id,
        customer_id: body.customer_id,
        start_date: parse_instant(&body.start_date)?,
        end_date: parse_instant(&body.end_date)?,
        notes: body.notes,
    };

    let checkout = checkout::create_and_checkout(&state, &caller, &request).await?;
    Ok((StatusCode::CREATED, Json(checkout)))
}

// GET /api/bookings
#[derive(Deserialize)]
pub struct MyBookingsQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

pub(crate) fn parse_status(raw: Option<&str>) -> Result<Option<BookingStatus>, EngineError> {
    raw.map(|s| {
        BookingStatus::parse(s)
            .ok_or_else(|| EngineError::Validation(format!("unknown booking status: {s}")))
    })
    .transpose()
}

pub async fn list_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<MyBookingsQuery>,
) -> Result<Json<Vec<Booking>>, AppError> {
    let caller = auth::caller(&headers, &state)?;

    let filter = BookingFilter {
        status: parse_status(query.status.as_deref())?,
        customer_id: (!caller.is_staff()).then_some(caller.user_id),
        limit: query.limit.unwrap_or(50).clamp(1, 500),
        ..Default::default()
    };

    let db = state.db()?;
    Ok(Json(queries::get_bookings(&db, &filter)?))
}

// GET /api/bookings/:ref
pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(raw_ref): Path<String>,
) -> Result<Json<Booking>, AppError> {
    let caller = auth::caller(&headers, &state)?;
    let db = state.db()?;
    let booking = ledger::get_booking(&db, &caller, &BookingRef::parse(&raw_ref))?;
    Ok(Json(booking))
}

// POST /api/bookings/:ref/cancel
pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(raw_ref): Path<String>,
) -> Result<Json<Booking>, AppError> {
    let caller = auth::caller(&headers, &state)?;
    let mut db = state.db()?;
    let booking = ledger::cancel(&mut db, &caller, &BookingRef::parse(&raw_ref), Utc::now())?;
    Ok(Json(booking))
}

// POST /api/bookings/:ref/payment
pub async fn resume_payment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(raw_ref): Path<String>,
) -> Result<Json<Checkout>, AppError> {
    let caller = auth::caller(&headers, &state)?;
    let checkout = checkout::resume_checkout(&state, &caller, &BookingRef::parse(&raw_ref)).await?;
    Ok(Json(checkout))
}
