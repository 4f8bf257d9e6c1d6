//! Bahamm settlement service binary.

use std::sync::Arc;

use anyhow::Result;
use sqlx::sqlite::SqlitePoolOptions;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bahamm_settlement::config::Settings;
use bahamm_settlement::gateway::HttpGateway;
use bahamm_settlement::notify::Notifier;
use bahamm_settlement::routes::{self, AppState};
use bahamm_settlement::sweeper;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Arc::new(Settings::from_env());
    let db = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&settings.database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&db).await?;

    let nats = match &settings.nats_url {
        Some(url) => match async_nats::connect(url).await {
            Ok(client) => Some(client),
            Err(error) => {
                tracing::warn!(%error, "NATS unavailable; notifications disabled");
                None
            }
        },
        None => None,
    };
    let notifier = Notifier::new(nats);

    let gateway = Arc::new(HttpGateway::new(
        &settings.gateway_base_url,
        &settings.gateway_merchant_id,
    )?);

    let (stop_tx, stop_rx) = watch::channel(false);
    let sweeper_handle = tokio::spawn(sweeper::run(
        db.clone(),
        notifier.clone(),
        settings.sweep_interval,
        stop_rx,
    ));

    let state = AppState {
        db,
        gateway,
        notifier,
        settings: settings.clone(),
    };
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", settings.port)).await?;
    tracing::info!(port = settings.port, "bahamm-settlement listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop the sweeper before exiting so no sweep is cut off mid-group.
    let _ = stop_tx.send(true);
    let _ = sweeper_handle.await;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
