//! Load testing for the request path and the dispatch engine.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use futures_util::future::join_all;
use serde_json::json;
use ai_gateway::config::{DispatchConfig, Strategy};
use ai_gateway::health::TokioScheduler;
use ai_gateway::orchestrator::{Agent, AgentDescriptor, DispatchError, ExecutionError, Task, TaskDescriptor};
use ai_gateway::{DispatchEngine, Gateway};

mod common;

#[tokio::test]
async fn test_gateway_load_distribution() {
    let backends = vec![
        common::start_mock_backend(200).await,
        common::start_mock_backend(200).await,
        common::start_mock_backend(200).await,
    ];
    let config = common::gateway_config(&backends, 5, 30_000, 30_000, Strategy::LeastConnections);
    let gateway = Gateway::new(config, Arc::new(TokioScheduler::current().unwrap()));

    let concurrency = 20;
    let requests_per_task = 15;
    let total_requests = concurrency * requests_per_task;
    let start = Instant::now();

    let workers = (0..concurrency).map(|_| async {
        let mut latencies = Vec::new();
        for _ in 0..requests_per_task {
            let req_start = Instant::now();
            if gateway.call(common::probe).await.is_ok() {
                latencies.push(req_start.elapsed());
            }
        }
        latencies
    });
    let mut all_latencies: Vec<Duration> = join_all(workers).await.into_iter().flatten().collect();
    let duration = start.elapsed();

    assert_eq!(all_latencies.len(), total_requests, "every request should succeed");

    let snapshot = gateway.snapshot();
    assert_eq!(snapshot.endpoints.total_requests, total_requests as u64);
    assert_eq!(snapshot.endpoints.distribution.values().sum::<u64>(), total_requests as u64);
    assert!(snapshot.endpoints.endpoints.iter().all(|e| e.outstanding == 0));
    assert!(snapshot.breakers.iter().all(|b| b.failed_requests == 0));

    all_latencies.sort();
    let p50 = all_latencies[all_latencies.len() / 2];
    let p99 = all_latencies[(all_latencies.len() as f64 * 0.99) as usize];

    println!("\n--- Gateway Load Results ---");
    println!("Total Requests: {}", total_requests);
    println!("Concurrency:    {}", concurrency);
    println!("Total Duration: {:?}", duration);
    println!("P50 Latency:    {:?}", p50);
    println!("P99 Latency:    {:?}", p99);
    println!("Distribution:   {:?}", snapshot.endpoints.distribution);
    println!("----------------------------\n");
}

#[derive(Default)]
struct InFlight {
    current: HashMap<String, usize>,
    peak: HashMap<String, usize>,
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_dispatch_respects_capacity_under_load() {
    let in_flight = Arc::new(Mutex::new(InFlight::default()));
    let tracker = in_flight.clone();
    let executor = move |agent: Agent, task: Task| {
        let tracker = tracker.clone();
        async move {
            {
                let mut state = tracker.lock().unwrap();
                let current = state.current.entry(agent.id.clone()).or_default();
                *current += 1;
                let now = *current;
                let peak = state.peak.entry(agent.id.clone()).or_default();
                *peak = (*peak).max(now);
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
            *tracker.lock().unwrap().current.get_mut(&agent.id).unwrap() -= 1;

            if task.task_type == "flaky" {
                Err(ExecutionError::from("flaky task"))
            } else {
                Ok::<_, ExecutionError>(json!({ "agent": agent.id }))
            }
        }
    };

    let engine = Arc::new(DispatchEngine::new(DispatchConfig::default(), executor));
    for i in 0..4 {
        engine
            .register_agent(AgentDescriptor::new(format!("agent-{i}"), ["chat", "flaky"]))
            .unwrap();
    }

    let total_tasks = 200;
    let submissions = (0..total_tasks).map(|i| {
        let engine = engine.clone();
        tokio::spawn(async move {
            let task_type = if i % 10 == 0 { "flaky" } else { "chat" };
            let mut rejected = 0;
            loop {
                let descriptor = TaskDescriptor::with_id(format!("task-{i}-{rejected}"), task_type);
                match engine.submit_task(descriptor).await {
                    Err(DispatchError::NoSuitableAgent { .. }) => {
                        rejected += 1;
                        tokio::time::sleep(Duration::from_millis(1)).await;
                    }
                    other => return (other.is_ok(), rejected),
                }
            }
        })
    });
    let outcomes: Vec<_> = join_all(submissions)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let succeeded = outcomes.iter().filter(|(ok, _)| *ok).count();
    let rejected: usize = outcomes.iter().map(|(_, rejected)| rejected).sum();
    assert_eq!(succeeded, 180);

    let peaks = in_flight.lock().unwrap().peak.clone();
    let max_active_tasks = DispatchConfig::default().max_active_tasks;
    for (agent, peak) in &peaks {
        assert!(*peak <= max_active_tasks, "{agent} ran {peak} tasks at once");
    }

    let metrics = engine.metrics();
    assert_eq!(metrics.completed_tasks, 180);
    assert_eq!(metrics.failed_tasks, 20);
    assert_eq!(metrics.active_tasks, 0);
    assert_eq!(metrics.busy_agents, 0);
    assert!(metrics.agents.iter().all(|a| a.active_tasks == 0));
    assert_eq!(engine.tasks().len(), total_tasks);

    println!("\n--- Dispatch Load Results ---");
    println!("Tasks:          {}", total_tasks);
    println!("Rejections:     {}", rejected);
    println!("Peak per agent: {:?}", peaks);
    println!("Avg execution:  {:.2}ms", metrics.average_execution_ms);
    println!("-----------------------------\n");
}
