//! Round-robin load balancing strategy.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use crate::load_balancer::{LoadBalancer, endpoint::Endpoint};

/// Round-robin selector.
/// The cursor persists across calls and is taken modulo the current healthy-subset size.
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursor: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoadBalancer for RoundRobin {
    fn next_server(&self, healthy: &[Arc<Endpoint>]) -> Option<Arc<Endpoint>> {
        if healthy.is_empty() {
            return None;
        }

        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % healthy.len();
        Some(healthy[index].clone())
    }
}
