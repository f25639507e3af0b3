use std::env;

use crate::services::ledger::LedgerPolicy;

/// Longest hold an unpaid booking may keep on a vehicle (7 days).
pub const MAX_PENDING_TTL_MINUTES: i64 = 7 * 24 * 60;
const DEFAULT_PENDING_TTL_MINUTES: i64 = 60;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub session_secret: String,
    pub payment_server_key: String,
    pub payment_base_url: String,
    pub pending_booking_ttl_minutes: i64,
    pub sweep_interval_secs: u64,
    pub payment_simulation: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "motorent.db".to_string()),
            session_secret: env::var("SESSION_SECRET").unwrap_or_else(|_| "changeme".to_string()),
            payment_server_key: env::var("PAYMENT_SERVER_KEY").unwrap_or_default(),
            payment_base_url: env::var("PAYMENT_BASE_URL")
                .unwrap_or_else(|_| "https://app.sandbox.midtrans.com".to_string()),
            pending_booking_ttl_minutes: pending_ttl_minutes(
                env::var("PENDING_BOOKING_TTL_MINUTES").ok().as_deref(),
            ),
            sweep_interval_secs: env::var("SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v| *v > 0)
                .unwrap_or(60),
            payment_simulation: env::var("PAYMENT_SIMULATION")
                .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
        }
    }

    pub fn ledger_policy(&self) -> LedgerPolicy {
        LedgerPolicy {
            pending_ttl: chrono::Duration::minutes(
                self.pending_booking_ttl_minutes
                    .clamp(1, MAX_PENDING_TTL_MINUTES),
            ),
        }
    }
}

fn pending_ttl_minutes(raw: Option<&str>) -> i64 {
    match raw.and_then(|v| v.trim().parse::<i64>().ok()) {
        Some(v) if (1..=MAX_PENDING_TTL_MINUTES).contains(&v) => v,
        Some(v) => {
            tracing::warn!(
                value = v,
                max = MAX_PENDING_TTL_MINUTES,
                "PENDING_BOOKING_TTL_MINUTES out of range, using default"
            );
            DEFAULT_PENDING_TTL_MINUTES
        }
        None => DEFAULT_PENDING_TTL_MINUTES,
    }
}
