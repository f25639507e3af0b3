use chrono::{DateTime, SubsecRound, Utc};
use rusqlite::{Connection, TransactionBehavior};
use serde::Serialize;
use sha2::{Digest, Sha512};
use subtle::ConstantTimeEq;

use crate::db::queries::{self, PaymentUpdate};
use crate::errors::EngineError;
use crate::models::{Booking, BookingRef, BookingStatus, PaymentNotification, PaymentStatus};
use crate::services::projector;

/// `hex(SHA-512(order_id || status_code || gross_amount || server_key))`
pub fn sign(order_id: &str, status_code: &str, gross_amount: &str, server_key: &str) -> String {
    let mut hasher = Sha512::new();
    hasher.update(order_id.as_bytes());
    hasher.update(status_code.as_bytes());
    hasher.update(gross_amount.as_bytes());
    hasher.update(server_key.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

pub fn verify_signature(notification: &PaymentNotification, server_key: &str) -> bool {
    if server_key.is_empty() {
        return false;
    }
    let expected = sign(
        &notification.order_id,
        &notification.status_code,
        &notification.gross_amount,
        server_key,
    );
    let given = notification.signature_key.trim().to_ascii_lowercase();
    expected.as_bytes().ct_eq(given.as_bytes()).into()
}

/// What a notification says happened to the payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Settled,
    Pending,
    Failed,
    Refunded,
    Unknown,
}

pub fn classify(notification: &PaymentNotification) -> Disposition {
    let fraud = notification
        .fraud_status
        .as_deref()
        .map(str::to_ascii_lowercase);
    if fraud.as_deref() == Some("deny") {
        return Disposition::Failed;
    }

    match notification.transaction_status.to_ascii_lowercase().as_str() {
        "capture" => match fraud.as_deref() {
            Some("accept") => Disposition::Settled,
            Some("challenge") => Disposition::Pending,
            _ => Disposition::Pending,
        },
        "settlement" => Disposition::Settled,
        "pending" => Disposition::Pending,
        "deny" | "cancel" | "expire" | "failure" => Disposition::Failed,
        "refund" | "partial_refund" => Disposition::Refunded,
        _ => Disposition::Unknown,
    }
}

/// The decision for one notification against the current booking state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    Apply {
        status: BookingStatus,
        payment_status: PaymentStatus,
    },
    Unchanged,
    Ignored(&'static str),
    /// Money was captured for a booking that no longer exists as a reservation.
    RequiresRefund,
}

pub fn plan(booking: &Booking, notification: &PaymentNotification, disposition: Disposition) -> Plan {
    use BookingStatus as S;
    use PaymentStatus as P;

    match disposition {
        Disposition::Settled => match (booking.status, booking.payment_status) {
            (_, P::Paid) => Plan::Unchanged,
            (_, P::Refunded) => Plan::Ignored("payment already refunded"),
            (S::Pending, P::Unpaid) => Plan::Apply {
                status: S::Confirmed,
                payment_status: P::Paid,
            },
            (s @ (S::Confirmed | S::Active | S::Completed), P::Unpaid) => Plan::Apply {
                status: s,
                payment_status: P::Paid,
            },
            (S::Cancelled, P::Unpaid) => Plan::RequiresRefund,
        },
        Disposition::Pending => match (booking.status, booking.payment_status) {
            (S::Pending, P::Unpaid) => {
                let new_tx = notification.transaction_id.is_some()
                    && notification.transaction_id != booking.transaction_id;
                let new_method = notification.payment_type.is_some()
                    && notification.payment_type != booking.payment_method;
                if new_tx || new_method {
                    Plan::Apply {
                        status: S::Pending,
                        payment_status: P::Unpaid,
                    }
                } else {
                    Plan::Unchanged
                }
            }
            _ => Plan::Ignored("stale pending notification"),
        },
        Disposition::Failed => match (booking.status, booking.payment_status) {
            (_, P::Paid | P::Refunded) => Plan::Ignored("payment already captured"),
            (S::Cancelled, _) => Plan::Unchanged,
            (S::Pending | S::Confirmed, P::Unpaid) => Plan::Apply {
                status: S::Cancelled,
                payment_status: P::Unpaid,
            },
            (S::Active | S::Completed, P::Unpaid) => Plan::Ignored("rental already underway"),
        },
        Disposition::Refunded => match (booking.status, booking.payment_status) {
            (_, P::Refunded) => Plan::Unchanged,
            (_, P::Unpaid) => Plan::Ignored("nothing to refund"),
            (S::Pending | S::Confirmed, P::Paid) => Plan::Apply {
                status: S::Cancelled,
                payment_status: P::Refunded,
            },
            (s, P::Paid) => Plan::Apply {
                status: s,
                payment_status: P::Refunded,
            },
        },
        Disposition::Unknown => Plan::Ignored("unrecognized transaction status"),
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Applied,
    Unchanged,
    Ignored,
    RequiresRefund,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Applied => "applied",
            Outcome::Unchanged => "unchanged",
            Outcome::Ignored => "ignored",
            Outcome::RequiresRefund => "requires_refund",
        }
    }
}

/// Whole currency units of a provider amount such as `"150000.00"`.
fn parse_gross_amount(raw: &str) -> Option<i64> {
    let (whole, fraction) = raw.trim().split_once('.').unwrap_or((raw.trim(), ""));
    if !fraction.chars().all(|c| c == '0') {
        return None;
    }
    whole.parse().ok()
}

/// Verifies and applies one provider notification.
///
/// Duplicate or reordered deliveries never move a booking backwards: the
/// current state is read inside a write transaction and compared before any
/// update. A failed vehicle projection is logged, not returned.
pub fn handle_notification(
    conn: &mut Connection,
    raw_payload: &[u8],
    server_key: &str,
    now: DateTime<Utc>,
) -> Result<Outcome, EngineError> {
    let notification: PaymentNotification = serde_json::from_slice(raw_payload)
        .map_err(|e| EngineError::Validation(format!("malformed notification: {e}")))?;

    if !verify_signature(&notification, server_key) {
        tracing::warn!(
            order_id = %notification.order_id,
            transaction_status = %notification.transaction_status,
            "rejected payment notification with invalid signature"
        );
        return Err(EngineError::InvalidSignature);
    }

    let now = now.trunc_subsecs(0);
    let disposition = classify(&notification);
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let booking = queries::find_booking(&tx, &BookingRef::Code(notification.order_id.clone()))?
        .ok_or_else(|| EngineError::BookingNotFound(notification.order_id.clone()))?;

    if let Some(amount) = parse_gross_amount(&notification.gross_amount) {
        if amount != booking.total_price {
            tracing::warn!(
                booking_code = %booking.booking_code,
                expected = booking.total_price,
                notified = amount,
                "notified amount differs from booking total"
            );
        }
    }

    let decision = plan(&booking, &notification, disposition);
    let outcome = match &decision {
        Plan::Apply {
            status,
            payment_status,
        } => {
            let paid_at = (*payment_status == PaymentStatus::Paid).then_some(now);
            queries::apply_payment_update(
                &tx,
                booking.id,
                &PaymentUpdate {
                    status: *status,
                    payment_status: *payment_status,
                    transaction_id: notification.transaction_id.clone(),
                    payment_method: notification.payment_type.clone(),
                    paid_at,
                },
                &now,
            )?;
            tracing::info!(
                booking_code = %booking.booking_code,
                transaction_status = %notification.transaction_status,
                from = %booking.status,
                to = %status,
                payment_status = %payment_status,
                "payment notification applied"
            );
            Outcome::Applied
        }
        Plan::Unchanged => {
            tracing::debug!(booking_code = %booking.booking_code, "duplicate payment notification");
            Outcome::Unchanged
        }
        Plan::Ignored(reason) => {
            tracing::warn!(
                booking_code = %booking.booking_code,
                transaction_status = %notification.transaction_status,
                status = %booking.status,
                payment_status = %booking.payment_status,
                reason,
                "payment notification ignored"
            );
            Outcome::Ignored
        }
        Plan::RequiresRefund => {
            tracing::error!(
                booking_code = %booking.booking_code,
                transaction_id = ?notification.transaction_id,
                "payment captured for cancelled booking, refund required"
            );
            Outcome::RequiresRefund
        }
    };

    queries::record_payment_event(
        &tx,
        &booking.booking_code,
        &notification.transaction_status,
        notification.transaction_id.as_deref(),
        outcome.as_str(),
    )?;
    tx.commit()?;

    if let Plan::Apply { status, .. } = decision {
        if status != booking.status {
            projector::refresh_after_mutation(conn, booking.vehicle_id, &now);
        }
    }

    Ok(outcome)
}
