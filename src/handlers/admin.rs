use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;

use crate::db::queries::{self, BookingFilter, DashboardStats};
use crate::errors::{AppError, EngineError};
use crate::models::vehicle::validate_rate;
use crate::models::{Booking, BookingRef, Customer, NewCustomer, NewVehicle, Vehicle};
use crate::services::ledger;
use crate::services::projector::{self, ReconcileReport};
use crate::state::AppState;

use super::auth;
use super::bookings::parse_status;

fn unique_violation(e: rusqlite::Error, what: &str) -> AppError {
    match &e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            EngineError::Validation(format!("{what} already registered")).into()
        }
        _ => e.into(),
    }
}

// GET /api/admin/stats
pub async fn get_stats(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<DashboardStats>, AppError> {
    auth::staff(&headers, &state)?;
    let db = state.db()?;
    Ok(Json(queries::get_dashboard_stats(&db)?))
}

// GET /api/admin/bookings
#[derive(Deserialize)]
pub struct BookingsQuery {
    pub status: Option<String>,
    pub vehicle_id: Option<i64>,
    pub customer_id: Option<i64>,
    pub limit: Option<i64>,
}

pub async fn get_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<BookingsQuery>,
) -> Result<Json<Vec<Booking>>, AppError> {
    auth::staff(&headers, &state)?;

    let filter = BookingFilter {
        status: parse_status(query.status.as_deref())?,
        vehicle_id: query.vehicle_id,
        customer_id: query.customer_id,
        limit: query.limit.unwrap_or(50).clamp(1, 500),
    };

    let db = state.db()?;
    Ok(Json(queries::get_bookings(&db, &filter)?))
}

// POST /api/admin/bookings/:ref/status
#[derive(Deserialize)]
pub struct StatusBody {
    pub status: String,
}

pub async fn update_booking_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(raw_ref): Path<String>,
    Json(body): Json<StatusBody>,
) -> Result<Json<Booking>, AppError> {
    let caller = auth::staff(&headers, &state)?;
    let status = parse_status(Some(&body.status))?
        .ok_or_else(|| EngineError::Validation("status is required".to_string()))?;

    let mut db = state.db()?;
    let booking = ledger::update_status(
        &mut db,
        &caller,
        &BookingRef::parse(&raw_ref),
        status,
        Utc::now(),
    )?;
    Ok(Json(booking))
}

// POST /api/admin/vehicles
pub async fn create_vehicle(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<NewVehicle>,
) -> Result<(StatusCode, Json<Vehicle>), AppError> {
    auth::staff(&headers, &state)?;
    body.validate()?;

    let db = state.db()?;
    let vehicle =
        queries::create_vehicle(&db, &body).map_err(|e| unique_violation(e, "plate number"))?;
    tracing::info!(vehicle_id = vehicle.id, plate = %vehicle.plate_number, "vehicle registered");
    Ok((StatusCode::CREATED, Json(vehicle)))
}

// POST /api/admin/vehicles/:id/rate
#[derive(Deserialize)]
pub struct RateBody {
    pub daily_rate: i64,
}

/// Changes the rate for future bookings; existing bookings keep their snapshot.
pub async fn update_rate(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<RateBody>,
) -> Result<Json<Vehicle>, AppError> {
    auth::staff(&headers, &state)?;
    validate_rate(body.daily_rate)?;

    let db = state.db()?;
    if !queries::update_vehicle_rate(&db, id, body.daily_rate, &Utc::now())? {
        return Err(EngineError::VehicleNotFound(id).into());
    }
    let vehicle = queries::get_vehicle(&db, id)?.ok_or(EngineError::VehicleNotFound(id))?;
    tracing::info!(vehicle_id = id, daily_rate = body.daily_rate, "vehicle rate updated");
    Ok(Json(vehicle))
}

// POST /api/admin/vehicles/:id/maintenance
#[derive(Deserialize)]
pub struct MaintenanceBody {
    pub maintenance: bool,
}

pub async fn set_maintenance(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<MaintenanceBody>,
) -> Result<Json<Vehicle>, AppError> {
    auth::staff(&headers, &state)?;

    let now = Utc::now();
    let db = state.db()?;
    if !queries::set_vehicle_maintenance(&db, id, body.maintenance, &now)? {
        return Err(EngineError::VehicleNotFound(id).into());
    }
    tracing::info!(vehicle_id = id, maintenance = body.maintenance, "maintenance flag changed");
    projector::refresh_after_mutation(&db, id, &now);

    let vehicle = queries::get_vehicle(&db, id)?.ok_or(EngineError::VehicleNotFound(id))?;
    Ok(Json(vehicle))
}

// POST /api/admin/customers
pub async fn create_customer(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<NewCustomer>,
) -> Result<(StatusCode, Json<Customer>), AppError> {
    auth::staff(&headers, &state)?;
    body.validate()?;

    let db = state.db()?;
    let customer = queries::create_customer(&db, &body).map_err(|e| unique_violation(e, "email"))?;
    tracing::info!(customer_id = customer.id, "customer registered");
    Ok((StatusCode::CREATED, Json(customer)))
}

// POST /api/admin/reconcile
pub async fn reconcile(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ReconcileReport>, AppError> {
    auth::staff(&headers, &state)?;
    let db = state.db()?;
    let report = projector::reconcile_all(&db, &Utc::now())?;
    if !report.corrected.is_empty() {
        tracing::warn!(corrected = report.corrected.len(), "reconcile repaired vehicle statuses");
    }
    Ok(Json(report))
}
