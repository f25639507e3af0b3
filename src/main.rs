use std::sync::{Arc, Mutex};

use tracing_subscriber::EnvFilter;

use motorent::config::AppConfig;
use motorent::db;
use motorent::handlers;
use motorent::services::payments::midtrans::MidtransSnapGateway;
use motorent::services::sweeper;
use motorent::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    if config.payment_server_key.is_empty() {
        anyhow::ensure!(
            !config.payment_simulation,
            "PAYMENT_SERVER_KEY must be set when PAYMENT_SIMULATION is enabled"
        );
        tracing::warn!("PAYMENT_SERVER_KEY is empty; checkout and payment notifications will fail");
    }
    if config.session_secret == "changeme" {
        tracing::warn!("SESSION_SECRET is the default value; set it before exposing the service");
    }

    let conn = db::init_db(&config.database_url)?;

    tracing::info!(base_url = %config.payment_base_url, "using Midtrans Snap payment gateway");
    let payments = MidtransSnapGateway::new(
        config.payment_server_key.clone(),
        config.payment_base_url.clone(),
    );

    let state = Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config: config.clone(),
        payments: Box::new(payments),
    });

    {
        let db = state.db()?;
        let report = motorent::services::projector::reconcile_all(&db, &chrono::Utc::now())?;
        tracing::info!(checked = report.checked, corrected = report.corrected.len(), "vehicle statuses reconciled at startup");
    }

    tokio::spawn(sweeper::run_sweeper(Arc::clone(&state)));

    let app = handlers::router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
