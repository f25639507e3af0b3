use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::{
    Booking, BookingRef, BookingStatus, Customer, NewCustomer, NewVehicle, PaymentStatus,
    RentalPeriod, Vehicle, VehicleStatus,
};

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn fmt_ts(ts: &DateTime<Utc>) -> String {
    ts.format(TS_FORMAT).to_string()
}

fn parse_ts(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, TS_FORMAT)
        .map(|dt| dt.and_utc())
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn get_ts(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    parse_ts(idx, &s)
}

fn get_opt_ts(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let s: Option<String> = row.get(idx)?;
    s.map(|s| parse_ts(idx, &s)).transpose()
}

// ── Customers ──

pub fn create_customer(conn: &Connection, customer: &NewCustomer) -> rusqlite::Result<Customer> {
    conn.execute(
        "INSERT INTO customers (name, email, phone) VALUES (?1, ?2, ?3)",
        params![customer.name.trim(), customer.email.trim(), customer.phone],
    )?;
    let id = conn.last_insert_rowid();
    get_customer(conn, id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
}

pub fn get_customer(conn: &Connection, id: i64) -> rusqlite::Result<Option<Customer>> {
    conn.query_row(
        "SELECT id, name, email, phone, created_at FROM customers WHERE id = ?1",
        params![id],
        |row| {
            Ok(Customer {
                id: row.get(0)?,
                name: row.get(1)?,
                email: row.get(2)?,
                phone: row.get(3)?,
                created_at: get_ts(row, 4)?,
            })
        },
    )
    .optional()
}

// ── Vehicles ──

const VEHICLE_COLUMNS: &str =
    "id, name, brand, plate_number, daily_rate, status, maintenance, created_at, updated_at";

fn parse_vehicle_row(row: &rusqlite::Row) -> rusqlite::Result<Vehicle> {
    Ok(Vehicle {
        id: row.get(0)?,
        name: row.get(1)?,
        brand: row.get(2)?,
        plate_number: row.get(3)?,
        daily_rate: row.get(4)?,
        status: row.get(5)?,
        maintenance: row.get::<_, i32>(6)? != 0,
        created_at: get_ts(row, 7)?,
        updated_at: get_ts(row, 8)?,
    })
}

pub fn create_vehicle(conn: &Connection, vehicle: &NewVehicle) -> rusqlite::Result<Vehicle> {
    conn.execute(
        "INSERT INTO vehicles (name, brand, plate_number, daily_rate) VALUES (?1, ?2, ?3, ?4)",
        params![
            vehicle.name.trim(),
            vehicle.brand.trim(),
            vehicle.plate_number.trim(),
            vehicle.daily_rate,
        ],
    )?;
    let id = conn.last_insert_rowid();
    get_vehicle(conn, id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
}

pub fn get_vehicle(conn: &Connection, id: i64) -> rusqlite::Result<Option<Vehicle>> {
    conn.query_row(
        &format!("SELECT {VEHICLE_COLUMNS} FROM vehicles WHERE id = ?1"),
        params![id],
        parse_vehicle_row,
    )
    .optional()
}

pub fn list_vehicles(
    conn: &Connection,
    status_filter: Option<VehicleStatus>,
) -> rusqlite::Result<Vec<Vehicle>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {VEHICLE_COLUMNS} FROM vehicles WHERE ?1 IS NULL OR status = ?1 ORDER BY id ASC"
    ))?;
    let rows = stmt.query_map(params![status_filter], parse_vehicle_row)?;
    rows.collect()
}

pub fn list_vehicle_ids(conn: &Connection) -> rusqlite::Result<Vec<i64>> {
    let mut stmt = conn.prepare("SELECT id FROM vehicles ORDER BY id ASC")?;
    let rows = stmt.query_map([], |row| row.get(0))?;
    rows.collect()
}

pub fn update_vehicle_rate(
    conn: &Connection,
    id: i64,
    daily_rate: i64,
    now: &DateTime<Utc>,
) -> rusqlite::Result<bool> {
    let count = conn.execute(
        "UPDATE vehicles SET daily_rate = ?1, updated_at = ?2 WHERE id = ?3",
        params![daily_rate, fmt_ts(now), id],
    )?;
    Ok(count > 0)
}

pub fn set_vehicle_maintenance(
    conn: &Connection,
    id: i64,
    maintenance: bool,
    now: &DateTime<Utc>,
) -> rusqlite::Result<bool> {
    let count = conn.execute(
        "UPDATE vehicles SET maintenance = ?1, updated_at = ?2 WHERE id = ?3",
        params![maintenance as i32, fmt_ts(now), id],
    )?;
    Ok(count > 0)
}

/// Persists a projected status. Only the projector writes this column.
pub fn set_vehicle_status(
    conn: &Connection,
    id: i64,
    status: VehicleStatus,
    now: &DateTime<Utc>,
) -> rusqlite::Result<bool> {
    let count = conn.execute(
        "UPDATE vehicles SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status <> ?1",
        params![status, fmt_ts(now), id],
    )?;
    Ok(count > 0)
}

// ── Bookings ──

const BOOKING_COLUMNS: &str = "id, booking_code, vehicle_id, customer_id, start_date, end_date, \
     total_days, daily_rate, total_price, status, payment_status, transaction_id, payment_method, \
     payment_token, payment_url, paid_at, notes, created_at, updated_at";

const LIVE_STATUSES: &str = "('pending', 'confirmed', 'active')";

fn parse_booking_row(row: &rusqlite::Row) -> rusqlite::Result<Booking> {
    Ok(Booking {
        id: row.get(0)?,
        booking_code: row.get(1)?,
        vehicle_id: row.get(2)?,
        customer_id: row.get(3)?,
        start_date: get_ts(row, 4)?,
        end_date: get_ts(row, 5)?,
        total_days: row.get(6)?,
        daily_rate: row.get(7)?,
        total_price: row.get(8)?,
        status: row.get(9)?,
        payment_status: row.get(10)?,
        transaction_id: row.get(11)?,
        payment_method: row.get(12)?,
        payment_token: row.get(13)?,
        payment_url: row.get(14)?,
        paid_at: get_opt_ts(row, 15)?,
        notes: row.get(16)?,
        created_at: get_ts(row, 17)?,
        updated_at: get_ts(row, 18)?,
    })
}

/// Inserts a booking and returns its row id. The `id` field of `booking` is ignored.
pub fn insert_booking(conn: &Connection, booking: &Booking) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO bookings (booking_code, vehicle_id, customer_id, start_date, end_date, total_days,
                               daily_rate, total_price, status, payment_status, notes, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            booking.booking_code,
            booking.vehicle_id,
            booking.customer_id,
            fmt_ts(&booking.start_date),
            fmt_ts(&booking.end_date),
            booking.total_days,
            booking.daily_rate,
            booking.total_price,
            booking.status,
            booking.payment_status,
            booking.notes,
            fmt_ts(&booking.created_at),
            fmt_ts(&booking.updated_at),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn find_booking(conn: &Connection, booking_ref: &BookingRef) -> rusqlite::Result<Option<Booking>> {
    match booking_ref {
        BookingRef::Id(id) => conn
            .query_row(
                &format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?1"),
                params![id],
                parse_booking_row,
            )
            .optional(),
        BookingRef::Code(code) => conn
            .query_row(
                &format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE booking_code = ?1"),
                params![code],
                parse_booking_row,
            )
            .optional(),
    }
}

/// Live bookings on `vehicle_id` intersecting `[period.start, period.end)`.
pub fn get_overlapping_bookings(
    conn: &Connection,
    vehicle_id: i64,
    period: &RentalPeriod,
) -> rusqlite::Result<Vec<Booking>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings
         WHERE vehicle_id = ?1 AND status IN {LIVE_STATUSES}
           AND start_date < ?3 AND end_date > ?2
         ORDER BY start_date ASC"
    ))?;
    let rows = stmt.query_map(
        params![vehicle_id, fmt_ts(&period.start), fmt_ts(&period.end)],
        parse_booking_row,
    )?;
    rows.collect()
}

pub fn get_live_bookings_for_vehicle(
    conn: &Connection,
    vehicle_id: i64,
) -> rusqlite::Result<Vec<Booking>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings
         WHERE vehicle_id = ?1 AND status IN {LIVE_STATUSES}
         ORDER BY start_date ASC"
    ))?;
    let rows = stmt.query_map(params![vehicle_id], parse_booking_row)?;
    rows.collect()
}

#[derive(Debug, Default, Clone)]
pub struct BookingFilter {
    pub status: Option<BookingStatus>,
    pub vehicle_id: Option<i64>,
    pub customer_id: Option<i64>,
    pub limit: i64,
}

pub fn get_bookings(conn: &Connection, filter: &BookingFilter) -> rusqlite::Result<Vec<Booking>> {
    let mut clauses: Vec<&str> = vec![];
    let mut params_vec: Vec<Box<dyn rusqlite::types::ToSql>> = vec![];

    if let Some(status) = filter.status {
        params_vec.push(Box::new(status));
        clauses.push("status = ?");
    }
    if let Some(vehicle_id) = filter.vehicle_id {
        params_vec.push(Box::new(vehicle_id));
        clauses.push("vehicle_id = ?");
    }
    if let Some(customer_id) = filter.customer_id {
        params_vec.push(Box::new(customer_id));
        clauses.push("customer_id = ?");
    }
    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };
    params_vec.push(Box::new(filter.limit));

    let sql = format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings {where_sql} ORDER BY start_date DESC, id DESC LIMIT ?"
    );
    let mut stmt = conn.prepare(&sql)?;
    let params_refs: Vec<&dyn rusqlite::types::ToSql> =
        params_vec.iter().map(|p| p.as_ref()).collect();
    let rows = stmt.query_map(params_refs.as_slice(), parse_booking_row)?;
    rows.collect()
}

pub fn update_booking_status(
    conn: &Connection,
    id: i64,
    status: BookingStatus,
    now: &DateTime<Utc>,
) -> rusqlite::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![status, fmt_ts(now), id],
    )?;
    Ok(count > 0)
}

/// Payment-driven changes applied to a booking in one statement.
#[derive(Debug, Clone)]
pub struct PaymentUpdate {
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub transaction_id: Option<String>,
    pub payment_method: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
}

pub fn apply_payment_update(
    conn: &Connection,
    id: i64,
    update: &PaymentUpdate,
    now: &DateTime<Utc>,
) -> rusqlite::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET
           status = ?1,
           payment_status = ?2,
           transaction_id = COALESCE(?3, transaction_id),
           payment_method = COALESCE(?4, payment_method),
           paid_at = COALESCE(paid_at, ?5),
           updated_at = ?6
         WHERE id = ?7",
        params![
            update.status,
            update.payment_status,
            update.transaction_id,
            update.payment_method,
            update.paid_at.as_ref().map(fmt_ts),
            fmt_ts(now),
            id,
        ],
    )?;
    Ok(count > 0)
}

pub fn set_payment_session(
    conn: &Connection,
    id: i64,
    token: &str,
    redirect_url: &str,
    now: &DateTime<Utc>,
) -> rusqlite::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET payment_token = ?1, payment_url = ?2, updated_at = ?3 WHERE id = ?4",
        params![token, redirect_url, fmt_ts(now), id],
    )?;
    Ok(count > 0)
}

/// Pending, unpaid bookings created before `cutoff`, optionally limited to one vehicle.
pub fn get_stale_pending(
    conn: &Connection,
    cutoff: &DateTime<Utc>,
    vehicle_id: Option<i64>,
) -> rusqlite::Result<Vec<Booking>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings
         WHERE status = 'pending' AND payment_status = 'unpaid' AND created_at < ?1
           AND (?2 IS NULL OR vehicle_id = ?2)
         ORDER BY created_at ASC"
    ))?;
    let rows = stmt.query_map(params![fmt_ts(cutoff), vehicle_id], parse_booking_row)?;
    rows.collect()
}

// ── Payment events ──

#[derive(Debug, Clone)]
pub struct PaymentEvent {
    pub booking_code: String,
    pub transaction_status: String,
    pub transaction_id: Option<String>,
    pub outcome: String,
    pub received_at: String,
}

pub fn record_payment_event(
    conn: &Connection,
    booking_code: &str,
    transaction_status: &str,
    transaction_id: Option<&str>,
    outcome: &str,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO payment_events (booking_code, transaction_status, transaction_id, outcome)
         VALUES (?1, ?2, ?3, ?4)",
        params![booking_code, transaction_status, transaction_id, outcome],
    )?;
    Ok(())
}

pub fn get_payment_events(conn: &Connection, booking_code: &str) -> rusqlite::Result<Vec<PaymentEvent>> {
    let mut stmt = conn.prepare(
        "SELECT booking_code, transaction_status, transaction_id, outcome, received_at
         FROM payment_events WHERE booking_code = ?1 ORDER BY id ASC",
    )?;
    let rows = stmt.query_map(params![booking_code], |row| {
        Ok(PaymentEvent {
            booking_code: row.get(0)?,
            transaction_status: row.get(1)?,
            transaction_id: row.get(2)?,
            outcome: row.get(3)?,
            received_at: row.get(4)?,
        })
    })?;
    rows.collect()
}

// ── Dashboard ──

#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct DashboardStats {
    pub vehicles_available: i64,
    pub vehicles_rented: i64,
    pub vehicles_maintenance: i64,
    pub bookings_pending: i64,
    pub bookings_confirmed: i64,
    pub bookings_active: i64,
    pub bookings_completed: i64,
    pub bookings_cancelled: i64,
    pub revenue_paid: i64,
}

pub fn get_dashboard_stats(conn: &Connection) -> rusqlite::Result<DashboardStats> {
    let mut stats = DashboardStats::default();

    let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM vehicles GROUP BY status")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, VehicleStatus>(0)?, row.get::<_, i64>(1)?))
    })?;
    for row in rows {
        let (status, count) = row?;
        match status {
            VehicleStatus::Available => stats.vehicles_available = count,
            VehicleStatus::Rented => stats.vehicles_rented = count,
            VehicleStatus::Maintenance => stats.vehicles_maintenance = count,
        }
    }

    let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM bookings GROUP BY status")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, BookingStatus>(0)?, row.get::<_, i64>(1)?))
    })?;
    for row in rows {
        let (status, count) = row?;
        match status {
            BookingStatus::Pending => stats.bookings_pending = count,
            BookingStatus::Confirmed => stats.bookings_confirmed = count,
            BookingStatus::Active => stats.bookings_active = count,
            BookingStatus::Completed => stats.bookings_completed = count,
            BookingStatus::Cancelled => stats.bookings_cancelled = count,
        }
    }

    stats.revenue_paid = conn.query_row(
        "SELECT COALESCE(SUM(total_price), 0) FROM bookings WHERE payment_status = 'paid'",
        [],
        |row| row.get(0),
    )?;

    Ok(stats)
}
