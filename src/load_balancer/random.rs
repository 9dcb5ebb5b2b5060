//! Uniform random load balancing strategy.

use std::sync::Arc;
use rand::Rng;
use crate::load_balancer::{LoadBalancer, endpoint::Endpoint};

#[derive(Debug, Default)]
pub struct Random;

impl Random {
    pub fn new() -> Self {
        Self
    }
}

impl LoadBalancer for Random {
    fn next_server(&self, healthy: &[Arc<Endpoint>]) -> Option<Arc<Endpoint>> {
        if healthy.is_empty() {
            return None;
        }
        let index = rand::thread_rng().gen_range(0..healthy.len());
        Some(healthy[index].clone())
    }
}
