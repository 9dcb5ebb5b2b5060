//! The pluggable task-execution seam.
//!
//! The engine never runs work itself; it hands the agent and task to a
//! `TaskExecutor` and awaits the outcome. Timeouts and cancellation are the
//! executor's (or the caller's) concern.

use std::future::Future;
use serde_json::Value;
use thiserror::Error;
use crate::orchestrator::agent::Agent;
use crate::orchestrator::task::Task;

/// Failure reported by an executor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ExecutionError(pub String);

impl From<String> for ExecutionError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

impl From<&str> for ExecutionError {
    fn from(message: &str) -> Self {
        Self(message.to_string())
    }
}

/// Runs a task on an agent.
pub trait TaskExecutor: Send + Sync {
    fn execute(&self, agent: &Agent, task: &Task) -> impl Future<Output = Result<Value, ExecutionError>> + Send;
}

/// Any `Fn(Agent, Task) -> Future` works as an executor.
impl<F, Fut> TaskExecutor for F
where
    F: Fn(Agent, Task) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, ExecutionError>> + Send,
{
    fn execute(&self, agent: &Agent, task: &Task) -> impl Future<Output = Result<Value, ExecutionError>> + Send {
        self(agent.clone(), task.clone())
    }
}
