//! Shared harness for gateway integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use broker_gateway::{
    AppState, GatewayConfig, HealthState, SessionState, SimulatedBroker, SubscriptionRegistry,
    router, run_event_loop,
};

/// A fully wired gateway over the simulated broker.
pub struct Gateway {
    pub app: Router,
    pub broker: Arc<SimulatedBroker>,
    pub registry: Arc<SubscriptionRegistry>,
    pub session: Arc<SessionState>,
    pub shutdown: CancellationToken,
    event_loop: JoinHandle<()>,
}

impl Gateway {
    /// Build a gateway from environment-style overrides.
    pub async fn start(overrides: &[(&str, &str)]) -> Self {
        let vars: HashMap<String, String> = overrides
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        let config = GatewayConfig::from_lookup(|key| vars.get(key).cloned()).unwrap();

        let shutdown = CancellationToken::new();
        let (event_tx, event_rx) = mpsc::channel(config.streaming.event_capacity);
        let broker = Arc::new(SimulatedBroker::new(
            config.broker.clone(),
            config.simulator.clone(),
            event_tx,
        ));
        let registry = Arc::new(SubscriptionRegistry::new(broker.clone()));
        let session = Arc::new(SessionState::new());
        let event_loop = tokio::spawn(run_event_loop(
            event_rx,
            Arc::clone(&registry),
            Arc::clone(&session),
            shutdown.clone(),
        ));

        broker.connect().await;
        wait_until(|| session.is_connected()).await;

        let state = AppState {
            broker: broker.clone(),
            registry: Arc::clone(&registry),
            request_timeout: config.server.request_timeout,
            sink_capacity: config.streaming.sink_capacity,
            shutdown: shutdown.clone(),
        };
        let health = Arc::new(HealthState::new(
            "test".to_string(),
            Arc::clone(&session),
            Arc::clone(&registry),
        ));

        Self {
            app: router(state, health),
            broker,
            registry,
            session,
            shutdown,
            event_loop,
        }
    }

    /// Default gateway with a fast tick.
    pub async fn default_fast() -> Self {
        Self::start(&[("SIM_TICK_INTERVAL_MS", "20")]).await
    }

    /// Send one request through the router and decode the JSON reply.
    pub async fn send(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body.map_or_else(Body::empty, |b| Body::from(b.to_string())))
            .unwrap();
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    /// Serve the router on an ephemeral port.
    pub async fn serve(&self) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = self.app.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
                .unwrap();
        });
        addr
    }

    /// Cancel everything and wait for the event loop.
    pub async fn stop(self) {
        self.shutdown.cancel();
        self.broker.shutdown();
        let _ = self.event_loop.await;
    }
}

/// Poll `condition` until it holds, failing after two seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
