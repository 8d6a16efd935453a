//! Broker Gateway Binary
//!
//! Starts the HTTP/WebSocket gateway in front of a Broker Session.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin broker-gateway
//! ```
//!
//! # Environment Variables
//!
//! - `BROKER_HOST`, `BROKER_PORT`, `BROKER_CLIENT_ID`, `BROKER_READONLY`:
//!   Broker Session (defaults: 127.0.0.1, 4002, 1, false)
//! - `GATEWAY_HTTP_PORT`: HTTP/WebSocket port (default: 8000)
//! - `GATEWAY_REQUEST_TIMEOUT_SECS`: broker call timeout (default: 30)
//! - `STREAM_SINK_CAPACITY`: per-connection queue length (default: 256)
//! - `BROKER_EVENT_CAPACITY`: broker event channel capacity (default: 4096)
//! - `SIM_TICK_INTERVAL_MS`, `SIM_ACCOUNTS`: simulated session (defaults: 250, DU123456)
//! - `OTEL_ENABLED`: Export spans over OTLP (default: false)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4317>)
//! - `OTEL_SERVICE_NAME`: Service name (default: broker-gateway)
//! - `RUST_LOG`: Log level (default: info)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use broker_gateway::infrastructure::telemetry;
use broker_gateway::{
    AppState, GatewayConfig, HealthState, SessionState, SimulatedBroker, SubscriptionRegistry,
    init_metrics, router, run_event_loop,
};
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    // Initialize telemetry (tracing + optional OpenTelemetry)
    let telemetry_guard = telemetry::init();

    tracing::info!(
        otel_export = telemetry_guard.is_exporting(),
        "Starting Broker Gateway"
    );

    // Initialize Prometheus metrics
    let _metrics_handle = init_metrics();

    let config = GatewayConfig::from_env().context("invalid gateway configuration")?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    // Broker Session
    let (event_tx, event_rx) = mpsc::channel(config.streaming.event_capacity);
    let broker = Arc::new(SimulatedBroker::new(
        config.broker.clone(),
        config.simulator.clone(),
        event_tx,
    ));

    // Subscription registry and event loop
    let registry = Arc::new(SubscriptionRegistry::new(broker.clone()));
    let session = Arc::new(SessionState::new());
    let event_loop = tokio::spawn(run_event_loop(
        event_rx,
        Arc::clone(&registry),
        Arc::clone(&session),
        shutdown_token.clone(),
    ));

    broker.connect().await;

    // HTTP server
    let state = AppState {
        broker: broker.clone(),
        registry: Arc::clone(&registry),
        request_timeout: config.server.request_timeout,
        sink_capacity: config.streaming.sink_capacity,
        shutdown: shutdown_token.clone(),
    };
    let health_state = Arc::new(HealthState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&session),
        Arc::clone(&registry),
    ));
    let app = router(state, health_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.http_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind HTTP listener on {addr}"))?;
    tracing::info!(addr = %addr, "HTTP server listening");

    let server_shutdown = shutdown_token.clone();
    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
            .await
        {
            tracing::error!(error = %e, "HTTP server error");
        }
        tracing::info!("HTTP server stopped");
    });

    tracing::info!("Broker Gateway ready");

    await_shutdown(shutdown_token).await;

    if tokio::time::timeout(SHUTDOWN_TIMEOUT, server).await.is_err() {
        tracing::warn!("HTTP server did not stop within the shutdown timeout");
    }
    broker.shutdown();
    let _ = event_loop.await;

    tracing::info!(
        remaining_keys = registry.stats().active_keys,
        "Broker Gateway stopped"
    );
    Ok(())
}

/// Log the parsed configuration.
fn log_config(config: &GatewayConfig) {
    tracing::info!(
        broker_host = %config.broker.host,
        broker_port = config.broker.port,
        client_id = config.broker.client_id,
        readonly = config.broker.readonly,
        http_port = config.server.http_port,
        "Configuration loaded"
    );
    tracing::debug!(
        request_timeout_secs = config.server.request_timeout.as_secs(),
        sink_capacity = config.streaming.sink_capacity,
        event_capacity = config.streaming.event_capacity,
        tick_interval_ms = u64::try_from(config.simulator.tick_interval.as_millis()).unwrap_or(u64::MAX),
        accounts = ?config.simulator.accounts,
        "Streaming settings"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
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
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
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

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
