use chrono::{DateTime, Duration, SubsecRound, Utc};
use rusqlite::{Connection, TransactionBehavior};
use serde::Deserialize;

use crate::db::queries;
use crate::errors::EngineError;
use crate::models::{
    Booking, BookingRef, BookingStatus, BusyWindow, CallerIdentity, PaymentStatus, RentalPeriod,
};
use crate::services::{availability, projector};

const CODE_ATTEMPTS: usize = 3;

/// Longest rental a single booking may cover.
pub const MAX_RENTAL_DAYS: i64 = 365;

#[derive(Debug, Clone, Copy)]
pub struct LedgerPolicy {
    /// Pending, unpaid bookings older than this stop holding their slot.
    pub pending_ttl: Duration,
}

impl Default for LedgerPolicy {
    fn default() -> Self {
        Self {
            pending_ttl: Duration::minutes(60),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookingRequest {
    pub vehicle_id: i64,
    /// Required when staff book on behalf of a customer; customers book for themselves.
    #[serde(default)]
    pub customer_id: Option<i64>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[serde(default)]
    pub notes: Option<String>,
}

pub fn generate_booking_code(vehicle_id: i64, now: &DateTime<Utc>) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "BK-{}-{}-{}",
        now.format("%Y%m%d%H%M%S"),
        vehicle_id,
        suffix[..6].to_uppercase()
    )
}

fn constraint_message(e: &rusqlite::Error) -> Option<&str> {
    match e {
        rusqlite::Error::SqliteFailure(err, msg)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            msg.as_deref()
        }
        _ => None,
    }
}

fn resolve_customer(caller: &CallerIdentity, requested: Option<i64>) -> Result<i64, EngineError> {
    if caller.is_staff() {
        return requested
            .ok_or_else(|| EngineError::Validation("customer_id is required".to_string()));
    }
    match requested {
        Some(id) if id != caller.user_id => Err(EngineError::Forbidden(
            "customers may only book for themselves".to_string(),
        )),
        _ => Ok(caller.user_id),
    }
}

/// Reserves a vehicle for `[start_date, end_date)` as a pending, unpaid booking.
///
/// The availability check and the insert share one `BEGIN IMMEDIATE`
/// transaction, and the `bookings_no_overlap` trigger rejects any overlapping
/// insert that slips past it from another connection.
pub fn create_booking(
    conn: &mut Connection,
    caller: &CallerIdentity,
    request: &BookingRequest,
    policy: &LedgerPolicy,
    now: DateTime<Utc>,
) -> Result<Booking, EngineError> {
    let now = now.trunc_subsecs(0);
    let period = RentalPeriod::new(request.start_date, request.end_date)?;

    let today = now
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
        .unwrap_or(now);
    if period.start < today {
        return Err(EngineError::Validation(
            "start_date is in the past".to_string(),
        ));
    }
    let total_days = period.total_days();
    if total_days > MAX_RENTAL_DAYS {
        return Err(EngineError::Validation(format!(
            "rental may not exceed {MAX_RENTAL_DAYS} days"
        )));
    }

    let customer_id = resolve_customer(caller, request.customer_id)?;
    let notes = request
        .notes
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string);

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let vehicle = queries::get_vehicle(&tx, request.vehicle_id)?
        .ok_or(EngineError::VehicleNotFound(request.vehicle_id))?;
    if vehicle.maintenance {
        return Err(EngineError::UnderMaintenance(vehicle.id));
    }
    if queries::get_customer(&tx, customer_id)?.is_none() {
        return Err(EngineError::CustomerNotFound(customer_id));
    }

    let expired = expire_pending_in(&tx, &(now - policy.pending_ttl), Some(vehicle.id), &now)?;
    if !expired.is_empty() {
        tracing::info!(vehicle_id = vehicle.id, count = expired.len(), "expired stale pending bookings");
    }

    let conflicts = availability::find_conflicts_in(&tx, vehicle.id, &period)?;
    if !conflicts.is_empty() {
        return Err(EngineError::Conflict {
            vehicle_id: vehicle.id,
            conflicting: conflicts
                .iter()
                .map(|b| BusyWindow::of(b, caller.is_staff()))
                .collect(),
        });
    }

    let total_price = vehicle
        .daily_rate
        .checked_mul(total_days)
        .filter(|p| *p > 0)
        .ok_or_else(|| {
            EngineError::Validation(format!(
                "price for {total_days} days at {} per day is out of range",
                vehicle.daily_rate
            ))
        })?;

    let mut booking = Booking {
        id: 0,
        booking_code: String::new(),
        vehicle_id: vehicle.id,
        customer_id,
        start_date: period.start,
        end_date: period.end,
        total_days,
        daily_rate: vehicle.daily_rate,
        total_price,
        status: BookingStatus::Pending,
        payment_status: PaymentStatus::Unpaid,
        transaction_id: None,
        payment_method: None,
        payment_token: None,
        payment_url: None,
        paid_at: None,
        notes,
        created_at: now,
        updated_at: now,
    };

    let mut attempt = 0;
    let id = loop {
        attempt += 1;
        booking.booking_code = generate_booking_code(vehicle.id, &now);
        match queries::insert_booking(&tx, &booking) {
            Ok(id) => break id,
            Err(e) => match constraint_message(&e) {
                Some(msg) if msg.contains("booking_overlap") => {
                    return Err(EngineError::Conflict {
                        vehicle_id: vehicle.id,
                        conflicting: vec![],
                    });
                }
                Some(msg) if msg.contains("booking_code") && attempt < CODE_ATTEMPTS => {
                    tracing::warn!(attempt, "booking code collision, regenerating");
                    continue;
                }
                _ => return Err(e.into()),
            },
        }
    };
    booking.id = id;

    tx.commit()?;

    tracing::info!(
        booking_code = %booking.booking_code,
        vehicle_id = booking.vehicle_id,
        customer_id = booking.customer_id,
        total_price = booking.total_price,
        "booking created"
    );

    if !expired.is_empty() {
        projector::refresh_after_mutation(conn, vehicle.id, &now);
    }

    Ok(booking)
}

pub fn get_booking(
    conn: &Connection,
    caller: &CallerIdentity,
    booking_ref: &BookingRef,
) -> Result<Booking, EngineError> {
    match queries::find_booking(conn, booking_ref)? {
        Some(b) if caller.can_access(&b) => Ok(b),
        _ => Err(EngineError::BookingNotFound(booking_ref.to_string())),
    }
}

/// Moves a booking through the status state machine and re-projects its vehicle.
pub fn update_status(
    conn: &mut Connection,
    caller: &CallerIdentity,
    booking_ref: &BookingRef,
    new_status: BookingStatus,
    now: DateTime<Utc>,
) -> Result<Booking, EngineError> {
    let now = now.trunc_subsecs(0);
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let mut booking = get_booking(&tx, caller, booking_ref)?;

    if !caller.is_staff() && new_status != BookingStatus::Cancelled {
        return Err(EngineError::Forbidden(format!(
            "customers cannot mark bookings {new_status}"
        )));
    }
    if !booking.status.can_transition_to(new_status) {
        return Err(EngineError::InvalidTransition {
            from: booking.status,
            to: new_status,
        });
    }
    // A captured payment is unwound by a provider refund, which cancels via the reconciler.
    if new_status == BookingStatus::Cancelled && booking.payment_status == PaymentStatus::Paid {
        return Err(EngineError::AlreadyPaid(booking.booking_code));
    }

    queries::update_booking_status(&tx, booking.id, new_status, &now)?;
    tx.commit()?;

    tracing::info!(
        booking_code = %booking.booking_code,
        from = %booking.status,
        to = %new_status,
        by = caller.user_id,
        "booking status changed"
    );

    booking.status = new_status;
    booking.updated_at = now;
    projector::refresh_after_mutation(conn, booking.vehicle_id, &now);

    Ok(booking)
}

pub fn cancel(
    conn: &mut Connection,
    caller: &CallerIdentity,
    booking_ref: &BookingRef,
    now: DateTime<Utc>,
) -> Result<Booking, EngineError> {
    update_status(conn, caller, booking_ref, BookingStatus::Cancelled, now)
}

/// Compensates a checkout whose payment transaction could not be created.
pub fn release_unpaid(
    conn: &mut Connection,
    booking_id: i64,
    now: DateTime<Utc>,
) -> Result<(), EngineError> {
    let now = now.trunc_subsecs(0);
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let booking = queries::find_booking(&tx, &BookingRef::Id(booking_id))?
        .ok_or_else(|| EngineError::BookingNotFound(BookingRef::Id(booking_id).to_string()))?;

    if booking.status != BookingStatus::Pending || booking.payment_status != PaymentStatus::Unpaid {
        tracing::warn!(booking_code = %booking.booking_code, status = %booking.status, "not releasing booking that moved on");
        return Ok(());
    }
    queries::update_booking_status(&tx, booking.id, BookingStatus::Cancelled, &now)?;
    tx.commit()?;

    tracing::warn!(booking_code = %booking.booking_code, "released booking after failed checkout");
    projector::refresh_after_mutation(conn, booking.vehicle_id, &now);
    Ok(())
}

/// Cancels pending, unpaid bookings created before `cutoff`. Runs inside the caller's transaction.
pub(crate) fn expire_pending_in(
    conn: &Connection,
    cutoff: &DateTime<Utc>,
    vehicle_id: Option<i64>,
    now: &DateTime<Utc>,
) -> Result<Vec<Booking>, EngineError> {
    let stale = queries::get_stale_pending(conn, cutoff, vehicle_id)?;
    for booking in &stale {
        queries::update_booking_status(conn, booking.id, BookingStatus::Cancelled, now)?;
        tracing::info!(booking_code = %booking.booking_code, created_at = %booking.created_at, "expired unpaid booking");
    }
    Ok(stale)
}

/// Expires every stale pending booking and re-projects the vehicles involved.
pub fn expire_stale_pending(
    conn: &mut Connection,
    policy: &LedgerPolicy,
    now: DateTime<Utc>,
) -> Result<usize, EngineError> {
    let now = now.trunc_subsecs(0);
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let expired = expire_pending_in(&tx, &(now - policy.pending_ttl), None, &now)?;
    tx.commit()?;

    let mut vehicles: Vec<i64> = expired.iter().map(|b| b.vehicle_id).collect();
    vehicles.sort_unstable();
    vehicles.dedup();
    for vehicle_id in vehicles {
        projector::refresh_after_mutation(conn, vehicle_id, &now);
    }
    Ok(expired.len())
}
