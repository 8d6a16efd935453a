//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer, plus the HTTP surface and process-wide
//! concerns.

/// Simulated Broker Session adapter.
pub mod broker;

/// Configuration from the environment.
pub mod config;

/// Health check and metrics routes.
pub mod health;

/// REST and WebSocket API.
pub mod http;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Logging and OpenTelemetry tracing integration.
pub mod telemetry;
