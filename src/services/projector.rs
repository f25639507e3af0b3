use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;

use crate::db::queries;
use crate::errors::EngineError;
use crate::models::{Booking, VehicleStatus};

/// Derives the displayed vehicle status from its bookings.
///
/// The maintenance override wins; otherwise any confirmed or active booking
/// means the vehicle is rented out.
pub fn project_status(maintenance: bool, bookings: &[Booking]) -> VehicleStatus {
    if maintenance {
        return VehicleStatus::Maintenance;
    }
    if bookings.iter().any(|b| b.status.governs_vehicle()) {
        VehicleStatus::Rented
    } else {
        VehicleStatus::Available
    }
}

/// Recomputes and persists the status of one vehicle from the ledger.
pub fn refresh_vehicle_status(
    conn: &Connection,
    vehicle_id: i64,
    now: &DateTime<Utc>,
) -> Result<VehicleStatus, EngineError> {
    let vehicle =
        queries::get_vehicle(conn, vehicle_id)?.ok_or(EngineError::VehicleNotFound(vehicle_id))?;
    let bookings = queries::get_live_bookings_for_vehicle(conn, vehicle_id)?;
    let status = project_status(vehicle.maintenance, &bookings);

    if queries::set_vehicle_status(conn, vehicle_id, status, now)? {
        tracing::info!(vehicle_id, from = %vehicle.status, to = %status, "vehicle status updated");
    }
    Ok(status)
}

/// Refresh after a committed ledger mutation. The booking change stands even if
/// this fails; the drift is logged and repaired by the next refresh or reconcile.
pub fn refresh_after_mutation(
    conn: &Connection,
    vehicle_id: i64,
    now: &DateTime<Utc>,
) -> Option<VehicleStatus> {
    match refresh_vehicle_status(conn, vehicle_id, now) {
        Ok(status) => Some(status),
        Err(e) => {
            tracing::error!(vehicle_id, error = %e, "vehicle status projection failed, needs reconcile");
            None
        }
    }
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct ReconcileReport {
    pub checked: usize,
    pub corrected: Vec<i64>,
}

/// Re-derives every vehicle's status and repairs any drift.
pub fn reconcile_all(conn: &Connection, now: &DateTime<Utc>) -> Result<ReconcileReport, EngineError> {
    let mut report = ReconcileReport::default();
    for vehicle_id in queries::list_vehicle_ids(conn)? {
        let Some(vehicle) = queries::get_vehicle(conn, vehicle_id)? else {
            continue;
        };
        let bookings = queries::get_live_bookings_for_vehicle(conn, vehicle_id)?;
        let status = project_status(vehicle.maintenance, &bookings);
        report.checked += 1;
        if status != vehicle.status {
            queries::set_vehicle_status(conn, vehicle_id, status, now)?;
            tracing::warn!(vehicle_id, stored = %vehicle.status, derived = %status, "repaired vehicle status drift");
            report.corrected.push(vehicle_id);
        }
    }
    Ok(report)
}
