//! Trading Signal Gateway Binary
//!
//! Starts the trading-signal gateway's HTTP surface.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin trading-gateway
//! ```
//!
//! # Environment Variables
//!
//! - `CONFIG_PATH`: path to the YAML configuration file (default: `config.yaml`)
//! - `ORDER_STORE_PATH`: path to the order store's database file (default: `orders.db`)
//! - `OANDA_API_KEY`, `OANDA_ACCOUNT_ID`, `OANDA_API_URL`: Oanda credentials/endpoint override
//! - `ALPACA_API_KEY_ID`, `ALPACA_API_SECRET_KEY`: Alpaca credentials
//! - `WEBHOOK_SHARED_SECRET`: shared secret checked against inbound `/webhook` signals
//! - `RUST_LOG`: log level (default: info)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use trading_gateway::application::use_cases::{CancelOrderUseCase, SubmitSignalUseCase};
use trading_gateway::BrokerPort;
use trading_gateway::infrastructure::broker::build_broker;
use trading_gateway::infrastructure::config::ConfigStore;
use trading_gateway::infrastructure::http::{AppState, create_router};
use trading_gateway::infrastructure::persistence::TursoOrderStore;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
#[allow(clippy::too_many_lines)]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if dotenvy::dotenv().is_err() {
        load_dotenv_from_ancestors();
    }

    #[allow(clippy::unwrap_used)]
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("trading_gateway=info".parse().unwrap()),
        )
        .init();

    tracing::info!("Starting trading-signal gateway");

    let config_path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.yaml".to_string());
    let config = Arc::new(ConfigStore::load(&config_path));
    tracing::info!(path = %config_path, "configuration loaded");

    // Fail fast: an unconfigured or misconfigured broker aborts startup
    // rather than deferring the failure to the first signal (spec §4.5).
    let broker = match build_broker(config.as_ref()) {
        Ok(broker) => broker,
        Err(err) => {
            tracing::error!(error = %err, "failed to initialize broker");
            std::process::exit(1);
        }
    };

    // Verify the configured credentials actually reach the broker before
    // accepting any signal (spec §4.5 `check_connection`, SPEC_FULL §10.5).
    if let Err(err) = broker.check_connection().await {
        tracing::error!(error = %err, "broker connection check failed");
        std::process::exit(1);
    }
    tracing::info!("broker connection check succeeded");

    let store_path = std::env::var("ORDER_STORE_PATH").unwrap_or_else(|_| "orders.db".to_string());
    let store: Arc<TursoOrderStore> = match TursoOrderStore::new_local(&store_path).await {
        Ok(store) => Arc::new(store),
        Err(err) => {
            tracing::error!(error = %err, path = %store_path, "failed to open order store");
            std::process::exit(1);
        }
    };
    tracing::info!(path = %store_path, "order store opened");

    let submit_signal = Arc::new(SubmitSignalUseCase::new(
        Arc::clone(&store) as _,
        Arc::clone(&broker),
    ));
    let cancel_order = Arc::new(CancelOrderUseCase::new(
        Arc::clone(&store) as _,
        Arc::clone(&broker),
    ));

    let state = AppState {
        submit_signal,
        cancel_order,
        store: Arc::clone(&store) as _,
        config: Arc::clone(&config),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };
    let app = create_router(state);

    let host = config.get_string("webhook_server.host", "0.0.0.0");
    let port = config.get_string("webhook_server.port", "5000");
    let addr: SocketAddr = format!("{host}:{port}").parse()?;

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    tracing::info!(%addr, "HTTP server starting");
    tracing::info!("Endpoints:");
    tracing::info!("  POST /webhook");
    tracing::info!("  POST /orders");
    tracing::info!("  GET  /orders");
    tracing::info!("  GET  /orders/{{internal_id}}");
    tracing::info!("  POST /orders/{{internal_id}}/cancel");
    tracing::info!("  GET  /positions");
    tracing::info!("  GET  /positions/{{instrument}}");
    tracing::info!("  GET  /config");
    tracing::info!("  POST /config");
    tracing::info!("  GET  /health");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await?;

    tracing::info!("trading-signal gateway stopped");
    Ok(())
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv_from_ancestors() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn shutdown_signal(shutdown_tx: broadcast::Sender<()>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    let _ = shutdown_tx.send(());

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "graceful shutdown started"
    );
}
