use chrono::Utc;
use rusqlite::Connection;
use serde::Serialize;

use crate::db::queries;
use crate::errors::{AppError, EngineError};
use crate::models::{Booking, BookingRef, BookingStatus, CallerIdentity, PaymentStatus};
use crate::services::ledger::{self, BookingRequest, LedgerPolicy};
use crate::services::payments::{CustomerDetails, LineItem, PaymentSession, TransactionRequest};
use crate::state::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct Checkout {
    pub booking: Booking,
    pub payment: PaymentSession,
}

fn transaction_request(
    conn: &Connection,
    booking: &Booking,
    policy: &LedgerPolicy,
) -> Result<TransactionRequest, EngineError> {
    let vehicle = queries::get_vehicle(conn, booking.vehicle_id)?
        .ok_or(EngineError::VehicleNotFound(booking.vehicle_id))?;
    let customer = queries::get_customer(conn, booking.customer_id)?
        .ok_or(EngineError::CustomerNotFound(booking.customer_id))?;

    Ok(TransactionRequest {
        order_id: booking.booking_code.clone(),
        gross_amount: booking.total_price,
        items: vec![LineItem {
            id: format!("vehicle-{}", vehicle.id),
            name: format!("{} {} ({})", vehicle.brand, vehicle.name, vehicle.plate_number),
            price: booking.daily_rate,
            quantity: booking.total_days,
        }],
        customer: CustomerDetails {
            name: customer.name,
            email: customer.email,
            phone: customer.phone,
        },
        expiry_minutes: policy.pending_ttl.num_minutes(),
    })
}

/// Creates a pending booking and opens a payment transaction for it.
///
/// If the provider cannot open the transaction, or its session cannot be stored on
/// the booking, the booking is cancelled again so a failed checkout never keeps the slot.
pub async fn create_and_checkout(
    state: &AppState,
    caller: &CallerIdentity,
    request: &BookingRequest,
) -> Result<Checkout, AppError> {
    let policy = state.config.ledger_policy();

    let mut booking = {
        let mut db = state.db()?;
        ledger::create_booking(&mut db, caller, request, &policy, Utc::now())?
    };

    let tx_request = match state.db() {
        Ok(db) => transaction_request(&db, &booking, &policy).map_err(AppError::from),
        Err(e) => Err(e),
    };

    let session = match tx_request {
        Ok(tx_request) => state
            .payments
            .create_transaction(&tx_request)
            .await
            .map_err(|e| AppError::from(EngineError::Upstream(e.to_string()))),
        Err(e) => Err(e),
    };

    let stored = session.and_then(|session| {
        let db = state.db()?;
        queries::set_payment_session(&db, booking.id, &session.token, &session.redirect_url, &Utc::now())?;
        Ok(session)
    });

    match stored {
        Ok(session) => {
            booking.payment_token = Some(session.token.clone());
            booking.payment_url = Some(session.redirect_url.clone());
            Ok(Checkout {
                booking,
                payment: session,
            })
        }
        Err(e) => {
            tracing::error!(booking_code = %booking.booking_code, error = %e, "checkout failed, releasing booking");
            release(state, &booking);
            Err(e)
        }
    }
}

/// Compensating cancel for a checkout that did not complete. A booking that cannot
/// be released here stays pending until the sweeper expires it.
fn release(state: &AppState, booking: &Booking) {
    let outcome = state
        .db()
        .and_then(|mut db| Ok(ledger::release_unpaid(&mut db, booking.id, Utc::now())?));
    if let Err(e) = outcome {
        tracing::error!(
            booking_code = %booking.booking_code,
            error = %e,
            "failed to release booking; it will expire with the pending TTL"
        );
    }
}

/// Returns the payment session of a booking still awaiting payment, opening one if needed.
pub async fn resume_checkout(
    state: &AppState,
    caller: &CallerIdentity,
    booking_ref: &BookingRef,
) -> Result<Checkout, AppError> {
    let policy = state.config.ledger_policy();

    let (mut booking, tx_request) = {
        let db = state.db()?;
        let booking = ledger::get_booking(&db, caller, booking_ref)?;

        if booking.payment_status != PaymentStatus::Unpaid {
            return Err(EngineError::AlreadyPaid(booking.booking_code).into());
        }
        if booking.status != BookingStatus::Pending {
            return Err(EngineError::Validation(format!(
                "booking {} is {} and cannot be paid",
                booking.booking_code, booking.status
            ))
            .into());
        }
        if let (Some(token), Some(url)) = (&booking.payment_token, &booking.payment_url) {
            let payment = PaymentSession {
                token: token.clone(),
                redirect_url: url.clone(),
            };
            return Ok(Checkout { booking, payment });
        }

        let tx_request = transaction_request(&db, &booking, &policy)?;
        (booking, tx_request)
    };

    let session = state
        .payments
        .create_transaction(&tx_request)
        .await
        .map_err(|e| EngineError::Upstream(e.to_string()))?;

    let db = state.db()?;
    queries::set_payment_session(&db, booking.id, &session.token, &session.redirect_url, &Utc::now())?;
    booking.payment_token = Some(session.token.clone());
    booking.payment_url = Some(session.redirect_url.clone());

    Ok(Checkout {
        booking,
        payment: session,
    })
}
