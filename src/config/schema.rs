//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;
use serde::{Deserialize, Serialize};

/// Root configuration for the gateway core.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Upstream targets the routing layer forwards to.
    pub upstreams: Vec<UpstreamConfig>,

    /// Circuit breaker settings, shared by every upstream.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Endpoint selection settings.
    pub load_balancer: LoadBalancerConfig,

    /// Task dispatch settings.
    pub dispatch: DispatchConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl GatewayConfig {
    /// Addresses of all configured upstreams, in declaration order.
    pub fn upstream_addresses(&self) -> Vec<String> {
        self.upstreams.iter().map(|u| u.address.clone()).collect()
    }
}

/// A single upstream target.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct UpstreamConfig {
    /// Upstream identifier for logging/metrics.
    pub name: String,

    /// Upstream address (e.g., "127.0.0.1:8001").
    pub address: String,
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that trip a closed breaker.
    pub failure_threshold: u32,

    /// Time an open breaker waits before allowing a trial call, in milliseconds.
    pub reset_timeout_ms: u64,
}

impl CircuitBreakerConfig {
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_ms: 30_000,
        }
    }
}

/// Endpoint selection strategy.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    #[default]
    RoundRobin,
    LeastConnections,
    Random,
}

/// Load balancer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoadBalancerConfig {
    /// Selection strategy applied to the healthy subset.
    pub strategy: Strategy,

    /// Delay before an unhealthy endpoint is automatically re-admitted, in milliseconds.
    pub recovery_delay_ms: u64,
}

impl LoadBalancerConfig {
    pub fn recovery_delay(&self) -> Duration {
        Duration::from_millis(self.recovery_delay_ms)
    }
}

impl Default for LoadBalancerConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::RoundRobin,
            recovery_delay_ms: 30_000,
        }
    }
}

/// Task dispatch configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Active tasks at which an agent stops receiving assignments.
    pub max_active_tasks: usize,

    /// Score bonus for agents declaring the task type.
    pub type_match_bonus: f64,

    /// Score added per completed task.
    pub experience_weight: f64,

    /// Score removed per active task.
    pub load_penalty: f64,

    /// Exclude agents that do not declare the task type.
    pub require_type_match: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_active_tasks: 3,
            type_match_bonus: 10.0,
            experience_weight: 0.1,
            load_penalty: 2.0,
            require_type_match: false,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
