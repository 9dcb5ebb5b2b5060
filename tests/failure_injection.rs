//! Failure injection tests against real TCP backends.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use ai_gateway::config::Strategy;
use ai_gateway::health::TokioScheduler;
use ai_gateway::{CallError, CircuitState, Gateway, GatewayError};

mod common;

fn gateway(config: ai_gateway::GatewayConfig) -> Gateway {
    Gateway::new(config, Arc::new(TokioScheduler::current().unwrap()))
}

#[tokio::test]
async fn test_flapping_backend_trips_then_recovers() {
    let call_count = Arc::new(AtomicU32::new(0));
    let cc = call_count.clone();
    let backend = common::start_programmable_backend(move || {
        let cc = cc.clone();
        async move {
            if cc.fetch_add(1, Ordering::SeqCst) < 3 {
                (503, "Service Unavailable".into())
            } else {
                (200, "Success".into())
            }
        }
    })
    .await;

    let gateway = gateway(common::gateway_config(&[backend], 3, 200, 200, Strategy::RoundRobin));

    for _ in 0..3 {
        let err = gateway.call(common::probe).await.unwrap_err();
        assert!(matches!(err, CallError::Upstream(_)));
    }
    let breaker = gateway.breakers().get(&backend.to_string()).unwrap();
    assert_eq!(breaker.state(), CircuitState::Open);

    // Out of rotation: the backend is not contacted.
    let err = gateway.call(common::probe).await.unwrap_err();
    assert_eq!(err.rejected(), Some(&GatewayError::NoHealthyEndpoint));
    assert_eq!(call_count.load(Ordering::SeqCst), 3);

    tokio::time::sleep(Duration::from_millis(350)).await;

    assert_eq!(gateway.call(common::probe).await.unwrap(), 200);
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(breaker.metrics().circuit_open_count, 1);
}

#[tokio::test]
async fn test_dead_backend_is_taken_out_of_rotation() {
    let live = common::start_mock_backend(200).await;
    let dead = common::dead_address().await;
    let gateway = gateway(common::gateway_config(&[live, dead], 2, 60_000, 60_000, Strategy::RoundRobin));

    let mut failures = 0;
    for _ in 0..4 {
        if gateway.call(common::probe).await.is_err() {
            failures += 1;
        }
    }
    assert_eq!(failures, 2);
    assert_eq!(gateway.selector().is_healthy(&dead.to_string()), Some(false));

    for _ in 0..10 {
        assert_eq!(gateway.call(common::probe).await.unwrap(), 200);
    }

    let snapshot = gateway.snapshot();
    assert_eq!(snapshot.endpoints.healthy_endpoints, 1);
    assert_eq!(snapshot.endpoints.distribution[&live.to_string()], 12);
}

#[tokio::test]
async fn test_failed_trial_reopens_circuit() {
    let backend = common::start_mock_backend(502).await;
    let gateway = gateway(common::gateway_config(&[backend], 1, 150, 150, Strategy::LeastConnections));

    assert!(gateway.call(common::probe).await.is_err());
    let breaker = gateway.breakers().get(&backend.to_string()).unwrap();
    assert_eq!(breaker.state(), CircuitState::Open);

    tokio::time::sleep(Duration::from_millis(250)).await;

    // Re-admitted and half-open: the single trial fails and the circuit opens again.
    assert!(matches!(
        gateway.call(common::probe).await.unwrap_err(),
        CallError::Upstream(_)
    ));
    assert_eq!(breaker.state(), CircuitState::Open);
    assert_eq!(breaker.metrics().circuit_open_count, 2);
    assert_eq!(gateway.selector().healthy_count(), 0);
}

#[tokio::test]
async fn test_removed_endpoint_is_not_revived() {
    let keep = common::start_mock_backend(200).await;
    let dead = common::dead_address().await;
    let gateway = gateway(common::gateway_config(&[dead, keep], 1, 100, 100, Strategy::RoundRobin));

    assert!(gateway.call(common::probe).await.is_err());
    assert_eq!(gateway.selector().is_healthy(&dead.to_string()), Some(false));

    gateway.apply_config(common::gateway_config(&[keep], 1, 100, 100, Strategy::RoundRobin));
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(!gateway.selector().contains(&dead.to_string()));
    assert!(gateway.breakers().get(&dead.to_string()).is_none());
    assert_eq!(gateway.selector().len(), 1);
    assert_eq!(gateway.call(common::probe).await.unwrap(), 200);
}
