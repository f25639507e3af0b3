pub mod admin;
pub mod auth;
pub mod bookings;
pub mod dev;
pub mod health;
pub mod vehicles;
pub mod webhook;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    let mut app = Router::new()
        .route("/health", get(health::health))
        .route("/api/vehicles", get(vehicles::list_vehicles))
        .route("/api/vehicles/:id", get(vehicles::get_vehicle))
        .route(
            "/api/vehicles/:id/availability",
            get(vehicles::check_availability),
        )
        .route(
            "/api/bookings",
            post(bookings::create_booking).get(bookings::list_bookings),
        )
        .route("/api/bookings/:ref", get(bookings::get_booking))
        .route("/api/bookings/:ref/cancel", post(bookings::cancel_booking))
        .route("/api/bookings/:ref/payment", post(bookings::resume_payment))
        .route("/webhook/payment", post(webhook::payment_webhook))
        .route("/api/admin/stats", get(admin::get_stats))
        .route("/api/admin/bookings", get(admin::get_bookings))
        .route(
            "/api/admin/bookings/:ref/status",
            post(admin::update_booking_status),
        )
        .route("/api/admin/vehicles", post(admin::create_vehicle))
        .route("/api/admin/vehicles/:id/rate", post(admin::update_rate))
        .route(
            "/api/admin/vehicles/:id/maintenance",
            post(admin::set_maintenance),
        )
        .route("/api/admin/customers", post(admin::create_customer))
        .route("/api/admin/reconcile", post(admin::reconcile));

    if state.config.payment_simulation {
        tracing::warn!("payment simulation endpoint enabled");
        app = app.route("/api/dev/payments/simulate", post(dev::simulate_payment));
    }

    app.layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
