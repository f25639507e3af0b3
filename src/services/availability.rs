use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::db::queries;
use crate::errors::EngineError;
use crate::models::{Booking, RentalPeriod};

/// Live bookings on `vehicle_id` that intersect `[start, end)`.
pub fn find_conflicts(
    conn: &Connection,
    vehicle_id: i64,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<Booking>, EngineError> {
    let period = RentalPeriod::new(start, end)?;
    find_conflicts_in(conn, vehicle_id, &period)
}

pub fn is_available(
    conn: &Connection,
    vehicle_id: i64,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<bool, EngineError> {
    Ok(find_conflicts(conn, vehicle_id, start, end)?.is_empty())
}

pub(crate) fn find_conflicts_in(
    conn: &Connection,
    vehicle_id: i64,
    period: &RentalPeriod,
) -> Result<Vec<Booking>, EngineError> {
    if queries::get_vehicle(conn, vehicle_id)?.is_none() {
        return Err(EngineError::VehicleNotFound(vehicle_id));
    }

    let candidates = queries::get_overlapping_bookings(conn, vehicle_id, period)?;
    Ok(candidates
        .into_iter()
        .filter(|b| b.status.holds_slot() && b.period().overlaps(period))
        .collect())
}
