use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::{AppError, EngineError};
use crate::models::{BusyWindow, RentalPeriod, Vehicle, VehicleStatus};
use crate::services::availability;
use crate::state::AppState;

// GET /api/vehicles
#[derive(Deserialize)]
pub struct VehiclesQuery {
    pub status: Option<String>,
}

pub async fn list_vehicles(
    State(state): State<Arc<AppState>>,
    Query(query): Query<VehiclesQuery>,
) -> Result<Json<Vec<Vehicle>>, AppError> {
    let status = match query.status.as_deref() {
        Some(raw) => Some(VehicleStatus::parse(raw).ok_or_else(|| {
            EngineError::Validation(format!("unknown vehicle status: {raw}"))
        })?),
        None => None,
    };

    let db = state.db()?;
    Ok(Json(queries::list_vehicles(&db, status)?))
}

// GET /api/vehicles/:id
pub async fn get_vehicle(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Vehicle>, AppError> {
    let db = state.db()?;
    let vehicle = queries::get_vehicle(&db, id)?.ok_or(EngineError::VehicleNotFound(id))?;
    Ok(Json(vehicle))
}

// GET /api/vehicles/:id/availability
#[derive(Deserialize)]
pub struct AvailabilityQuery {
    pub start_date: String,
    pub end_date: String,
}

#[derive(Serialize)]
pub struct AvailabilityResponse {
    vehicle_id: i64,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    available: bool,
    busy: Vec<BusyWindow>,
}

pub async fn check_availability(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<AvailabilityResponse>, AppError> {
    let period = RentalPeriod::parse(&query.start_date, &query.end_date)?;

    let conflicts = {
        let db = state.db()?;
        availability::find_conflicts(&db, id, period.start, period.end)?
    };

    Ok(Json(AvailabilityResponse {
        vehicle_id: id,
        start_date: period.start,
        end_date: period.end,
        available: conflicts.is_empty(),
        busy: conflicts.iter().map(|b| BusyWindow::of(b, false)).collect(),
    }))
}
