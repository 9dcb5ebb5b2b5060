//! Least Connections load balancing strategy.

use std::sync::Arc;
use crate::load_balancer::{LoadBalancer, endpoint::Endpoint};

/// Least connections selector.
/// Picks the endpoint with the fewest outstanding requests, then the fewest
/// total selections. In case of a tie, the first one is selected (stability).
#[derive(Debug, Default)]
pub struct LeastConnections;

impl LeastConnections {
    pub fn new() -> Self {
        Self
    }
}

impl LoadBalancer for LeastConnections {
    fn next_server(&self, healthy: &[Arc<Endpoint>]) -> Option<Arc<Endpoint>> {
        healthy
            .iter()
            .min_by_key(|e| (e.outstanding(), e.total_served()))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn served(address: &str, count: u64) -> Arc<Endpoint> {
        let endpoint = Arc::new(Endpoint::new(address));
        for _ in 0..count {
            endpoint.record_served();
        }
        endpoint
    }

    #[test]
    fn test_least_served_first_in_order() {
        let lb = LeastConnections::new();
        let healthy = vec![served("a", 5), served("b", 2), served("c", 2)];

        let pick = lb.next_server(&healthy).unwrap();
        assert_eq!(pick.address(), "b");

        let reordered = vec![healthy[0].clone(), healthy[2].clone(), healthy[1].clone()];
        assert_eq!(lb.next_server(&reordered).unwrap().address(), "c");
    }

    #[test]
    fn test_outstanding_requests_dominate() {
        let lb = LeastConnections::new();
        let a = served("a", 10);
        let b = served("b", 0);
        let healthy = vec![a.clone(), b.clone()];

        // artificially hold a request on b
        let _guard = b.acquire();
        assert_eq!(lb.next_server(&healthy).unwrap().address(), "a");
    }

    #[test]
    fn test_empty() {
        assert!(LeastConnections::new().next_server(&[]).is_none());
    }
}
