//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to upstream:
//!     → registry.rs (breaker for this upstream)
//!     → circuit_breaker.rs permit_call (fail fast while open)
//!     → caller performs the call
//!     → circuit_breaker.rs record_success / record_failure
//! ```
//!
//! # Design Decisions
//! - Retry and timeout policy belong to the caller
//! - Circuit breaker prevents cascading failures

pub mod circuit_breaker;
pub mod registry;

pub use circuit_breaker::{BreakerMetrics, CircuitBreaker, CircuitState};
pub use registry::BreakerRegistry;
