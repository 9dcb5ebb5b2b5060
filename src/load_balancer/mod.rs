//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Gateway::call asks for a target
//!     → selector.rs (compute healthy subset; fail if empty)
//!     → Apply load balancing algorithm to the healthy subset:
//!         - round_robin.rs (rotate through endpoints)
//!         - least_conn.rs (fewest outstanding, then fewest served)
//!         - random.rs (uniform pick)
//!     → endpoint.rs (guard tracks the outstanding request)
//!     → Return endpoint guard or NoHealthyEndpoint
//! ```
//!
//! # Design Decisions
//! - Strategies are stateless over health; the selector filters first
//! - The healthy subset is recomputed on every call, never cached
//! - Unhealthy endpoints are never returned while a healthy one exists

use std::fmt::Debug;
use std::sync::Arc;
use crate::config::Strategy;

pub mod endpoint;
pub mod least_conn;
pub mod random;
pub mod round_robin;
pub mod selector;

pub use endpoint::{Endpoint, EndpointGuard};
pub use selector::{EndpointMetrics, EndpointSelector, SelectorError, SelectorMetrics};

/// A selection algorithm over an already-filtered healthy subset.
pub trait LoadBalancer: Debug + Send + Sync {
    fn next_server(&self, healthy: &[Arc<Endpoint>]) -> Option<Arc<Endpoint>>;
}

/// Build the balancer implementing `strategy`.
pub fn balancer_for(strategy: Strategy) -> Box<dyn LoadBalancer> {
    match strategy {
        Strategy::RoundRobin => Box::new(round_robin::RoundRobin::new()),
        Strategy::LeastConnections => Box::new(least_conn::LeastConnections::new()),
        Strategy::Random => Box::new(random::Random::new()),
    }
}
