//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_breaker_state` (gauge): 0=closed, 1=open, 2=half-open, by upstream
//! - `gateway_breaker_trips_total` (counter): closed/half-open → open transitions, by upstream
//! - `gateway_endpoint_health` (gauge): 1=healthy, 0=unhealthy, by endpoint
//! - `gateway_endpoint_selected_total` (counter): selections, by endpoint
//! - `gateway_no_healthy_endpoint_total` (counter): selections that found no healthy endpoint
//! - `gateway_tasks_total` (counter): task terminal transitions, by status
//! - `gateway_agents_busy` (gauge): agents with at least one active task
//!
//! Without an installed recorder every call here is a no-op, so the core can be
//! used (and tested) without the exporter.

use std::net::SocketAddr;
use metrics::{counter, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use crate::resilience::circuit_breaker::CircuitState;

/// Install the Prometheus recorder and its scrape listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Prometheus metrics exporter listening");
    Ok(())
}

pub fn record_breaker_state(upstream: &str, state: CircuitState) {
    gauge!("gateway_breaker_state", "upstream" => upstream.to_string()).set(state.as_gauge());
}

pub fn record_breaker_trip(upstream: &str) {
    counter!("gateway_breaker_trips_total", "upstream" => upstream.to_string()).increment(1);
}

pub fn record_endpoint_health(endpoint: &str, healthy: bool) {
    let value = if healthy { 1.0 } else { 0.0 };
    gauge!("gateway_endpoint_health", "endpoint" => endpoint.to_string()).set(value);
}

pub fn record_endpoint_selected(endpoint: &str) {
    counter!("gateway_endpoint_selected_total", "endpoint" => endpoint.to_string()).increment(1);
}

pub fn record_no_healthy_endpoint() {
    counter!("gateway_no_healthy_endpoint_total").increment(1);
}

/// Record a task reaching a terminal status ("completed" or "failed").
pub fn record_task(status: &'static str) {
    counter!("gateway_tasks_total", "status" => status).increment(1);
}

pub fn record_busy_agents(count: usize) {
    gauge!("gateway_agents_busy").set(count as f64);
}
