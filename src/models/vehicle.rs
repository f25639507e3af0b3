use std::fmt;

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

use crate::errors::EngineError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: i64,
    pub name: String,
    pub brand: String,
    pub plate_number: String,
    pub daily_rate: i64,
    /// Stored projection of the booking ledger; see `services::projector`.
    pub status: VehicleStatus,
    /// Out-of-band maintenance override set by staff.
    pub maintenance: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VehicleStatus {
    Available,
    Rented,
    Maintenance,
}

impl VehicleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleStatus::Available => "available",
            VehicleStatus::Rented => "rented",
            VehicleStatus::Maintenance => "maintenance",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "available" => Some(VehicleStatus::Available),
            "rented" => Some(VehicleStatus::Rented),
            "maintenance" => Some(VehicleStatus::Maintenance),
            _ => None,
        }
    }
}

impl fmt::Display for VehicleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql for VehicleStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for VehicleStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        VehicleStatus::parse(s)
            .ok_or_else(|| FromSqlError::Other(format!("unknown vehicle status: {s}").into()))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewVehicle {
    pub name: String,
    pub brand: String,
    pub plate_number: String,
    pub daily_rate: i64,
}

impl NewVehicle {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.name.trim().is_empty() {
            return Err(EngineError::Validation("name is required".to_string()));
        }
        if self.plate_number.trim().is_empty() {
            return Err(EngineError::Validation("plate_number is required".to_string()));
        }
        validate_rate(self.daily_rate)
    }
}

/// Upper bound on a daily rate, in whole currency units.
pub const MAX_DAILY_RATE: i64 = 100_000_000;

pub fn validate_rate(daily_rate: i64) -> Result<(), EngineError> {
    if daily_rate <= 0 {
        return Err(EngineError::Validation(
            "daily_rate must be positive".to_string(),
        ));
    }
    if daily_rate > MAX_DAILY_RATE {
        return Err(EngineError::Validation(format!(
            "daily_rate must not exceed {MAX_DAILY_RATE}"
        )));
    }
    Ok(())
}
