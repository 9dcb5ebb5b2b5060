//! AI gateway core: upstream resilience, endpoint selection and task dispatch.
//!
//! # Architecture Overview
//!
//! ```text
//!   caller ──▶ Gateway::call
//!                 │
//!                 ├─▶ load_balancer::EndpointSelector ──▶ healthy subset ──▶ strategy
//!                 │         ▲ mark_unhealthy / re-admission (health::RecoveryScheduler)
//!                 │         │
//!                 └─▶ resilience::BreakerRegistry ──▶ CircuitBreaker per endpoint
//!
//!   producer ──▶ orchestrator::DispatchEngine ──▶ best agent ──▶ TaskExecutor
//!
//!   cross-cutting: config (TOML + hot reload), observability (tracing + Prometheus),
//!                  lifecycle (startup, signals, shutdown)
//! ```

pub mod config;
pub mod error;
pub mod gateway;
pub mod health;
pub mod lifecycle;
pub mod load_balancer;
pub mod observability;
pub mod orchestrator;
pub mod resilience;

pub use config::GatewayConfig;
pub use error::{CallError, GatewayError};
pub use gateway::{Gateway, GatewaySnapshot};
pub use lifecycle::Shutdown;
pub use load_balancer::{EndpointSelector, SelectorError};
pub use orchestrator::{DispatchEngine, DispatchError, TaskExecutor};
pub use resilience::{CircuitBreaker, CircuitState};
