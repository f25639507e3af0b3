use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{Duration, Utc};
use tower::ServiceExt;

use motorent::config::AppConfig;
use motorent::db::{self, queries};
use motorent::handlers;
use motorent::models::{
    BookingRef, BookingStatus, CallerIdentity, NewCustomer, NewVehicle, PaymentStatus,
    VehicleStatus,
};
use motorent::services::payments::{PaymentGateway, PaymentSession, TransactionRequest};
use motorent::services::{reconciler, session};
use motorent::state::AppState;

const SECRET: &str = "test-session-secret";
const SERVER_KEY: &str = "SB-Mid-server-test";

// ── Mock Gateway ──

struct MockGateway {
    requests: Arc<Mutex<Vec<TransactionRequest>>>,
    fail: bool,
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_transaction(&self, request: &TransactionRequest) -> anyhow::Result<PaymentSession> {
        self.requests.lock().unwrap().push(request.clone());
        if self.fail {
            anyhow::bail!("snap returned 503: service unavailable");
        }
        Ok(PaymentSession {
            token: format!("tok-{}", request.order_id),
            redirect_url: format!("https://pay.test/{}", request.order_id),
        })
    }
}

// ── Helpers ──

fn test_config() -> AppConfig {
    AppConfig {
        port: 3000,
        database_url: ":memory:".to_string(),
        session_secret: SECRET.to_string(),
        payment_server_key: SERVER_KEY.to_string(),
        payment_base_url: "http://localhost:0".to_string(),
        pending_booking_ttl_minutes: 60,
        sweep_interval_secs: 60,
        payment_simulation: false,
    }
}

struct Harness {
    state: Arc<AppState>,
    requests: Arc<Mutex<Vec<TransactionRequest>>>,
    vehicle_id: i64,
    alice: i64,
    bob: i64,
}

fn harness_with(config: AppConfig, fail: bool) -> Harness {
    let conn = db::init_db(":memory:").unwrap();

    let vehicle = queries::create_vehicle(
        &conn,
        &NewVehicle {
            name: "Vario 160".to_string(),
            brand: "Honda".to_string(),
            plate_number: "B 1234 XYZ".to_string(),
            daily_rate: 50_000,
        },
    )
    .unwrap();
    let alice = queries::create_customer(
        &conn,
        &NewCustomer {
            name: "Alice".to_string(),
            email: "alice@example.com".to_string(),
            phone: Some("+6281200000001".to_string()),
        },
    )
    .unwrap();
    let bob = queries::create_customer(
        &conn,
        &NewCustomer {
            name: "Bob".to_string(),
            email: "bob@example.com".to_string(),
            phone: None,
        },
    )
    .unwrap();

    let requests = Arc::new(Mutex::new(vec![]));
    let state = Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config,
        payments: Box::new(MockGateway {
            requests: Arc::clone(&requests),
            fail,
        }),
    });

    Harness {
        state,
        requests,
        vehicle_id: vehicle.id,
        alice: alice.id,
        bob: bob.id,
    }
}

fn harness() -> Harness {
    harness_with(test_config(), false)
}

fn test_app(state: &Arc<AppState>) -> Router {
    handlers::router(Arc::clone(state))
}

fn token(identity: CallerIdentity) -> String {
    session::issue(SECRET, &identity, Duration::hours(1), Utc::now()).unwrap()
}

fn customer(id: i64) -> String {
    token(CallerIdentity::customer(id))
}

fn staff() -> String {
    token(CallerIdentity::staff(900))
}

async fn send(
    state: &Arc<AppState>,
    method: &str,
    uri: &str,
    bearer: Option<&str>,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(t) = bearer {
        builder = builder.header("Authorization", format!("Bearer {t}"));
    }
    let req = match body {
        Some(json) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let res = test_app(state).oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

async fn book(
    h: &Harness,
    customer_id: i64,
    start: &str,
    end: &str,
) -> (StatusCode, serde_json::Value) {
    send(
        &h.state,
        "POST",
        "/api/bookings",
        Some(&customer(customer_id)),
        Some(serde_json::json!({
            "vehicle_id": h.vehicle_id,
            "start_date": start,
            "end_date": end,
        })),
    )
    .await
}

fn notification(order_id: &str, transaction_status: &str, gross_amount: &str) -> serde_json::Value {
    let status_code = match transaction_status {
        "settlement" | "capture" => "200",
        "pending" => "201",
        _ => "202",
    };
    serde_json::json!({
        "order_id": order_id,
        "status_code": status_code,
        "gross_amount": gross_amount,
        "signature_key": reconciler::sign(order_id, status_code, gross_amount, SERVER_KEY),
        "transaction_status": transaction_status,
        "fraud_status": "accept",
        "payment_type": "bank_transfer",
        "transaction_time": "2030-01-01 10:00:00",
        "transaction_id": "0f6b7a3e-2c55-4f0a-a0f3-6f6c1c1d2e3f",
    })
}

async fn notify(h: &Harness, payload: serde_json::Value) -> (StatusCode, serde_json::Value) {
    send(&h.state, "POST", "/webhook/payment", None, Some(payload)).await
}

fn vehicle_status(h: &Harness) -> VehicleStatus {
    let db = h.state.db.lock().unwrap();
    queries::get_vehicle(&db, h.vehicle_id).unwrap().unwrap().status
}

fn stored(h: &Harness, code: &str) -> motorent::models::Booking {
    let db = h.state.db.lock().unwrap();
    queries::find_booking(&db, &BookingRef::Code(code.to_string()))
        .unwrap()
        .unwrap()
}

// ── Tests ──

#[tokio::test]
async fn test_health() {
    let h = harness();
    let (status, body) = send(&h.state, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_book_pay_and_rent() {
    let h = harness();

    let (status, body) = book(&h, h.alice, "2030-01-10", "2030-01-13").await;
    assert_eq!(status, StatusCode::CREATED);

    let code = body["booking"]["booking_code"].as_str().unwrap().to_string();
    assert_eq!(body["booking"]["status"], "pending");
    assert_eq!(body["booking"]["payment_status"], "unpaid");
    assert_eq!(body["booking"]["total_days"], 3);
    assert_eq!(body["booking"]["total_price"], 150_000);
    assert_eq!(body["payment"]["token"], format!("tok-{code}"));
    assert_eq!(vehicle_status(&h), VehicleStatus::Available);

    {
        let requests = h.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].order_id, code);
        assert_eq!(requests[0].gross_amount, 150_000);
        assert_eq!(requests[0].expiry_minutes, 60);
        assert_eq!(requests[0].customer.email, "alice@example.com");
    }

    let (status, body) = notify(&h, notification(&code, "settlement", "150000.00")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "applied");

    let booking = stored(&h, &code);
    assert_eq!(booking.status, BookingStatus::Confirmed);
    assert_eq!(booking.payment_status, PaymentStatus::Paid);
    assert_eq!(booking.payment_method.as_deref(), Some("bank_transfer"));
    assert!(booking.paid_at.is_some());
    assert_eq!(vehicle_status(&h), VehicleStatus::Rented);
}

#[tokio::test]
async fn test_overlapping_booking_rejected() {
    let h = harness();
    let (_, first) = book(&h, h.alice, "2030-01-10", "2030-01-13").await;
    let first_code = first["booking"]["booking_code"].as_str().unwrap().to_string();

    let (status, body) = book(&h, h.bob, "2030-01-12", "2030-01-14").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(
        body["busy"],
        serde_json::json!([{
            "start_date": "2030-01-10T00:00:00Z",
            "end_date": "2030-01-13T00:00:00Z",
        }])
    );
    // Another customer's booking code never reaches Bob.
    assert!(!body.to_string().contains(&first_code));

    let (status, body) = send(
        &h.state,
        "POST",
        "/api/bookings",
        Some(&staff()),
        Some(serde_json::json!({
            "vehicle_id": h.vehicle_id,
            "customer_id": h.bob,
            "start_date": "2030-01-12",
            "end_date": "2030-01-14",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["busy"][0]["booking_code"], first_code);

    // Back-to-back rentals share an instant but do not overlap.
    let (status, _) = book(&h, h.bob, "2030-01-13", "2030-01-16").await;
    assert_eq!(status, StatusCode::CREATED);

    assert_eq!(h.requests.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_availability_placements() {
    let h = harness();
    let (status, _) = book(&h, h.alice, "2030-01-10", "2030-01-13").await;
    assert_eq!(status, StatusCode::CREATED);

    let cases = [
        ("2030-01-10", "2030-01-13", false),
        ("2030-01-12", "2030-01-14", false),
        ("2030-01-08", "2030-01-11", false),
        ("2030-01-09", "2030-01-15", false),
        ("2030-01-11", "2030-01-12", false),
        ("2030-01-07", "2030-01-10", true),
        ("2030-01-13", "2030-01-16", true),
    ];
    for (start, end, expected) in cases {
        let uri = format!(
            "/api/vehicles/{}/availability?start_date={start}&end_date={end}",
            h.vehicle_id
        );
        let (status, body) = send(&h.state, "GET", &uri, None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["available"], expected, "[{start}, {end})");
    }

    let uri = format!(
        "/api/vehicles/{}/availability?start_date=2030-01-11&end_date=2030-01-12",
        h.vehicle_id
    );
    let (_, body) = send(&h.state, "GET", &uri, None, None).await;
    let busy = body["busy"].as_array().unwrap();
    assert_eq!(busy.len(), 1);
    assert!(busy[0].get("customer_id").is_none());
    assert!(busy[0].get("booking_code").is_none());
}

#[tokio::test]
async fn test_invalid_interval_rejected() {
    let h = harness();
    let (status, _) = book(&h, h.alice, "2030-01-13", "2030-01-10").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let uri = format!(
        "/api/vehicles/{}/availability?start_date=2030-01-13&end_date=2030-01-13",
        h.vehicle_id
    );
    let (status, _) = send(&h.state, "GET", &uri, None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(h.requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_expired_payment_frees_slot() {
    let h = harness();
    let (_, body) = book(&h, h.alice, "2030-01-10", "2030-01-13").await;
    let code = body["booking"]["booking_code"].as_str().unwrap().to_string();

    let (status, _) = notify(&h, notification(&code, "expire", "150000.00")).await;
    assert_eq!(status, StatusCode::OK);

    let booking = stored(&h, &code);
    assert_eq!(booking.status, BookingStatus::Cancelled);
    assert_eq!(booking.payment_status, PaymentStatus::Unpaid);
    assert_eq!(vehicle_status(&h), VehicleStatus::Available);

    let (status, _) = book(&h, h.bob, "2030-01-10", "2030-01-13").await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_tampered_notification_rejected() {
    let h = harness();
    let (_, body) = book(&h, h.alice, "2030-01-10", "2030-01-13").await;
    let code = body["booking"]["booking_code"].as_str().unwrap().to_string();

    let mut payload = notification(&code, "settlement", "150000.00");
    payload["gross_amount"] = serde_json::json!("1000.00");

    let (status, body) = notify(&h, payload).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body, serde_json::json!({ "error": "invalid signature" }));

    let booking = stored(&h, &code);
    assert_eq!(booking.status, BookingStatus::Pending);
    assert_eq!(booking.payment_status, PaymentStatus::Unpaid);
    assert_eq!(vehicle_status(&h), VehicleStatus::Available);
}

#[tokio::test]
async fn test_duplicate_notification_idempotent() {
    let h = harness();
    let (_, body) = book(&h, h.alice, "2030-01-10", "2030-01-13").await;
    let code = body["booking"]["booking_code"].as_str().unwrap().to_string();
    let payload = notification(&code, "settlement", "150000.00");

    let (_, first) = notify(&h, payload.clone()).await;
    let after_first = stored(&h, &code);
    let (status, second) = notify(&h, payload).await;
    let after_second = stored(&h, &code);

    assert_eq!(first["status"], "applied");
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["status"], "unchanged");
    assert_eq!(after_first.paid_at, after_second.paid_at);
    assert_eq!(after_first.updated_at, after_second.updated_at);
    assert_eq!(vehicle_status(&h), VehicleStatus::Rented);
}

#[tokio::test]
async fn test_notification_for_unknown_booking() {
    let h = harness();
    let (status, _) = notify(&h, notification("BK-UNKNOWN", "settlement", "150000.00")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_gateway_failure_releases_booking() {
    let h = harness_with(test_config(), true);
    let (status, body) = book(&h, h.alice, "2030-01-10", "2030-01-13").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["retryable"], true);

    let bookings = {
        let db = h.state.db.lock().unwrap();
        queries::get_bookings(
            &db,
            &queries::BookingFilter {
                limit: 10,
                ..Default::default()
            },
        )
        .unwrap()
    };
    assert_eq!(bookings.len(), 1);
    assert_eq!(bookings[0].status, BookingStatus::Cancelled);

    let uri = format!(
        "/api/vehicles/{}/availability?start_date=2030-01-10&end_date=2030-01-13",
        h.vehicle_id
    );
    let (_, body) = send(&h.state, "GET", &uri, None, None).await;
    assert_eq!(body["available"], true);
}

#[tokio::test]
async fn test_session_store_failure_releases_booking() {
    let h = harness();
    h.state
        .db
        .lock()
        .unwrap()
        .execute_batch(
            "CREATE TRIGGER fail_payment_session BEFORE UPDATE OF payment_token ON bookings
             BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
        )
        .unwrap();

    let (status, body) = book(&h, h.alice, "2030-01-10", "2030-01-13").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["retryable"], true);
    assert_eq!(h.requests.lock().unwrap().len(), 1);

    let bookings = {
        let db = h.state.db.lock().unwrap();
        queries::get_bookings(
            &db,
            &queries::BookingFilter {
                limit: 10,
                ..Default::default()
            },
        )
        .unwrap()
    };
    assert_eq!(bookings.len(), 1);
    assert_eq!(bookings[0].status, BookingStatus::Cancelled);
    assert!(bookings[0].payment_token.is_none());

    let uri = format!(
        "/api/vehicles/{}/availability?start_date=2030-01-10&end_date=2030-01-13",
        h.vehicle_id
    );
    let (_, body) = send(&h.state, "GET", &uri, None, None).await;
    assert_eq!(body["available"], true);

    let (status, _) = book(&h, h.bob, "2030-01-10", "2030-01-13").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_rate_change_keeps_booking_price() {
    let h = harness();
    let (_, body) = book(&h, h.alice, "2030-01-10", "2030-01-13").await;
    let code = body["booking"]["booking_code"].as_str().unwrap().to_string();

    let uri = format!("/api/admin/vehicles/{}/rate", h.vehicle_id);
    let (status, vehicle) = send(
        &h.state,
        "POST",
        &uri,
        Some(&staff()),
        Some(serde_json::json!({ "daily_rate": 75_000 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(vehicle["daily_rate"], 75_000);

    let booking = stored(&h, &code);
    assert_eq!(booking.daily_rate, 50_000);
    assert_eq!(booking.total_price, 150_000);

    let (_, body) = book(&h, h.bob, "2030-02-01", "2030-02-03").await;
    assert_eq!(body["booking"]["total_price"], 150_000);
    assert_eq!(body["booking"]["daily_rate"], 75_000);

    let (status, _) = send(
        &h.state,
        "POST",
        &uri,
        Some(&staff()),
        Some(serde_json::json!({ "daily_rate": 0 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_full_lifecycle_projection() {
    let h = harness();
    let (_, body) = book(&h, h.alice, "2030-01-10", "2030-01-13").await;
    let code = body["booking"]["booking_code"].as_str().unwrap().to_string();
    notify(&h, notification(&code, "settlement", "150000.00")).await;
    assert_eq!(vehicle_status(&h), VehicleStatus::Rented);

    let uri = format!("/api/admin/bookings/{code}/status");
    let (status, body) = send(
        &h.state,
        "POST",
        &uri,
        Some(&staff()),
        Some(serde_json::json!({ "status": "active" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "active");
    assert_eq!(vehicle_status(&h), VehicleStatus::Rented);

    let (status, _) = send(
        &h.state,
        "POST",
        &uri,
        Some(&staff()),
        Some(serde_json::json!({ "status": "completed" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(vehicle_status(&h), VehicleStatus::Available);

    let (status, _) = send(
        &h.state,
        "POST",
        &uri,
        Some(&staff()),
        Some(serde_json::json!({ "status": "active" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(
        &h.state,
        "POST",
        &uri,
        Some(&staff()),
        Some(serde_json::json!({ "status": "returned" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_customer_cancel_rules() {
    let h = harness();
    let (_, body) = book(&h, h.alice, "2030-01-10", "2030-01-13").await;
    let code = body["booking"]["booking_code"].as_str().unwrap().to_string();
    let uri = format!("/api/bookings/{code}/cancel");

    let (status, _) = send(&h.state, "POST", &uri, Some(&customer(h.bob)), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&h.state, "POST", &uri, Some(&customer(h.alice)), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "cancelled");

    let (status, _) = send(&h.state, "POST", &uri, Some(&customer(h.alice)), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_paid_booking_cannot_be_cancelled_or_repaid() {
    let h = harness();
    let (_, body) = book(&h, h.alice, "2030-01-10", "2030-01-13").await;
    let code = body["booking"]["booking_code"].as_str().unwrap().to_string();
    notify(&h, notification(&code, "settlement", "150000.00")).await;

    let (status, _) = send(
        &h.state,
        "POST",
        &format!("/api/bookings/{code}/cancel"),
        Some(&customer(h.alice)),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(
        &h.state,
        "POST",
        &format!("/api/bookings/{code}/payment"),
        Some(&customer(h.alice)),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(stored(&h, &code).status, BookingStatus::Confirmed);
}

#[tokio::test]
async fn test_resume_payment_reuses_session() {
    let h = harness();
    let (_, body) = book(&h, h.alice, "2030-01-10", "2030-01-13").await;
    let code = body["booking"]["booking_code"].as_str().unwrap().to_string();
    let id = body["booking"]["id"].as_i64().unwrap();

    let (status, body) = send(
        &h.state,
        "POST",
        &format!("/api/bookings/{id}/payment"),
        Some(&customer(h.alice)),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["payment"]["token"], format!("tok-{code}"));
    assert_eq!(h.requests.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_booking_visibility() {
    let h = harness();
    let (_, body) = book(&h, h.alice, "2030-01-10", "2030-01-13").await;
    let code = body["booking"]["booking_code"].as_str().unwrap().to_string();
    book(&h, h.bob, "2030-03-01", "2030-03-02").await;

    let uri = format!("/api/bookings/{code}");
    let (status, _) = send(&h.state, "GET", &uri, Some(&customer(h.alice)), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&h.state, "GET", &uri, Some(&customer(h.bob)), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&h.state, "GET", &uri, Some(&staff()), None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, mine) = send(&h.state, "GET", "/api/bookings", Some(&customer(h.alice)), None).await;
    assert_eq!(mine.as_array().unwrap().len(), 1);
    let (_, all) = send(&h.state, "GET", "/api/admin/bookings", Some(&staff()), None).await;
    assert_eq!(all.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_auth_required() {
    let h = harness();

    let (status, _) = send(
        &h.state,
        "POST",
        "/api/bookings",
        None,
        Some(serde_json::json!({
            "vehicle_id": h.vehicle_id,
            "start_date": "2030-01-10",
            "end_date": "2030-01-13",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&h.state, "GET", "/api/admin/stats", Some("not-a-token"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let expired = session::issue(
        SECRET,
        &CallerIdentity::staff(1),
        Duration::minutes(1),
        Utc::now() - Duration::hours(1),
    )
    .unwrap();
    let (status, _) = send(&h.state, "GET", "/api/admin/stats", Some(&expired), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&h.state, "GET", "/api/admin/stats", Some(&customer(h.alice)), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&h.state, "GET", "/api/admin/stats", Some(&staff()), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_customer_cannot_book_for_others() {
    let h = harness();
    let (status, _) = send(
        &h.state,
        "POST",
        "/api/bookings",
        Some(&customer(h.alice)),
        Some(serde_json::json!({
            "vehicle_id": h.vehicle_id,
            "customer_id": h.bob,
            "start_date": "2030-01-10",
            "end_date": "2030-01-13",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &h.state,
        "POST",
        "/api/bookings",
        Some(&staff()),
        Some(serde_json::json!({
            "vehicle_id": h.vehicle_id,
            "customer_id": h.bob,
            "start_date": "2030-01-10T09:00:00Z",
            "end_date": "2030-01-11T12:00:00Z",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["booking"]["customer_id"], h.bob);
    assert_eq!(body["booking"]["total_days"], 2);
}

#[tokio::test]
async fn test_maintenance_blocks_booking() {
    let h = harness();
    let uri = format!("/api/admin/vehicles/{}/maintenance", h.vehicle_id);

    let (status, body) = send(
        &h.state,
        "POST",
        &uri,
        Some(&staff()),
        Some(serde_json::json!({ "maintenance": true })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "maintenance");

    let (status, _) = book(&h, h.alice, "2030-01-10", "2030-01-13").await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, body) = send(
        &h.state,
        "POST",
        &uri,
        Some(&staff()),
        Some(serde_json::json!({ "maintenance": false })),
    )
    .await;
    assert_eq!(body["status"], "available");

    let (status, _) = book(&h, h.alice, "2030-01-10", "2030-01-13").await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_admin_registers_vehicle_and_customer() {
    let h = harness();

    let (status, vehicle) = send(
        &h.state,
        "POST",
        "/api/admin/vehicles",
        Some(&staff()),
        Some(serde_json::json!({
            "name": "NMAX",
            "brand": "Yamaha",
            "plate_number": "B 5555 NM",
            "daily_rate": 90_000,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(vehicle["status"], "available");

    let (status, _) = send(
        &h.state,
        "POST",
        "/api/admin/vehicles",
        Some(&staff()),
        Some(serde_json::json!({
            "name": "NMAX",
            "brand": "Yamaha",
            "plate_number": "B 5555 NM",
            "daily_rate": 90_000,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, customer) = send(
        &h.state,
        "POST",
        "/api/admin/customers",
        Some(&staff()),
        Some(serde_json::json!({ "name": "Citra", "email": "citra@example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(customer["id"].as_i64().unwrap() > 0);

    let (_, vehicles) = send(&h.state, "GET", "/api/vehicles", None, None).await;
    assert_eq!(vehicles.as_array().unwrap().len(), 2);
    let (status, _) = send(&h.state, "GET", "/api/vehicles/999", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_stats_and_reconcile() {
    let h = harness();
    let (_, body) = book(&h, h.alice, "2030-01-10", "2030-01-13").await;
    let code = body["booking"]["booking_code"].as_str().unwrap().to_string();
    notify(&h, notification(&code, "settlement", "150000.00")).await;

    let (_, stats) = send(&h.state, "GET", "/api/admin/stats", Some(&staff()), None).await;
    assert_eq!(stats["bookings_confirmed"], 1);
    assert_eq!(stats["vehicles_rented"], 1);
    assert_eq!(stats["revenue_paid"], 150_000);

    {
        let db = h.state.db.lock().unwrap();
        queries::set_vehicle_status(&db, h.vehicle_id, VehicleStatus::Available, &Utc::now())
            .unwrap();
    }

    let (status, report) = send(&h.state, "POST", "/api/admin/reconcile", Some(&staff()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["corrected"], serde_json::json!([h.vehicle_id]));
    assert_eq!(vehicle_status(&h), VehicleStatus::Rented);
}

#[tokio::test]
async fn test_payment_simulation_endpoint() {
    let h = harness();
    let (status, _) = send(
        &h.state,
        "POST",
        "/api/dev/payments/simulate",
        None,
        Some(serde_json::json!({ "booking_code": "BK-X" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let mut config = test_config();
    config.payment_simulation = true;
    let h = harness_with(config, false);
    let (_, body) = book(&h, h.alice, "2030-01-10", "2030-01-13").await;
    let code = body["booking"]["booking_code"].as_str().unwrap().to_string();

    let (status, body) = send(
        &h.state,
        "POST",
        "/api/dev/payments/simulate",
        None,
        Some(serde_json::json!({ "booking_code": code })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "applied");
    assert_eq!(stored(&h, &code).payment_status, PaymentStatus::Paid);
}
