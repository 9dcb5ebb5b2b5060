//! Agent registry and task dispatch.
//!
//! # Responsibilities
//! - Register and deregister agents
//! - Score agents per task and pick the best one under capacity
//! - Run the task through the executor and record the terminal outcome
//! - Report dispatch metrics
//!
//! # Design Decisions
//! - All agent and task state lives behind one mutex; choosing an agent and
//!   reserving a slot on it happen in the same critical section
//! - The lock is never held across the executor's await
//! - A submission dropped mid-execution fails its task and frees the slot

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use crate::config::DispatchConfig;
use crate::observability::metrics;
use crate::orchestrator::agent::{Agent, AgentDescriptor, AgentStatus};
use crate::orchestrator::executor::TaskExecutor;
use crate::orchestrator::task::{Requirements, Task, TaskDescriptor, TaskStatus};

const CANCELLED: &str = "execution cancelled";

/// Dispatch failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("no suitable agent for task type {task_type:?}")]
    NoSuitableAgent { task_type: String },

    #[error("task {task_id} failed: {message}")]
    TaskExecution { task_id: String, message: String },

    #[error("agent {0} is already registered")]
    DuplicateAgent(String),

    #[error("agent {0} is not registered")]
    AgentNotFound(String),

    #[error("task {0} already exists")]
    DuplicateTask(String),

    #[error("task {0} not found")]
    TaskNotFound(String),

    #[error("task {task_id} is {status}, not in progress")]
    TaskNotInProgress { task_id: String, status: TaskStatus },
}

/// Per-agent view in `DispatchMetrics`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentMetrics {
    pub id: String,
    pub status: AgentStatus,
    pub active_tasks: usize,
    pub completed_tasks: u64,
    pub failed_tasks: u64,
}

/// Point-in-time view of the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchMetrics {
    pub total_agents: usize,
    pub busy_agents: usize,
    pub idle_agents: usize,
    pub active_tasks: usize,
    pub completed_tasks: u64,
    pub failed_tasks: u64,
    /// Mean time from assignment to terminal state over finished tasks.
    pub average_execution_ms: f64,
    pub agents: Vec<AgentMetrics>,
}

#[derive(Debug, Default)]
struct Registry {
    agents: HashMap<String, Agent>,
    tasks: HashMap<String, Task>,
    next_seq: u64,
    completed: u64,
    failed: u64,
    total_execution: Duration,
}

impl Registry {
    fn busy_agents(&self) -> usize {
        self.agents
            .values()
            .filter(|a| a.status == AgentStatus::Busy)
            .count()
    }

    /// Move an in-progress task to its terminal state and release its agent slot.
    fn finish(&mut self, task_id: &str, outcome: Result<Value, String>) -> Result<(), DispatchError> {
        let task = self
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| DispatchError::TaskNotFound(task_id.to_string()))?;
        if task.status != TaskStatus::InProgress {
            return Err(DispatchError::TaskNotInProgress {
                task_id: task_id.to_string(),
                status: task.status,
            });
        }

        let succeeded = outcome.is_ok();
        let elapsed = task.finish(outcome);
        self.total_execution += elapsed;
        let status = if succeeded {
            self.completed += 1;
            "completed"
        } else {
            self.failed += 1;
            "failed"
        };
        metrics::record_task(status);

        let agent_id = task.assigned_agent.clone();
        let agent_seq = task.agent_seq;
        let agent = agent_id
            .as_deref()
            .and_then(|id| self.agents.get_mut(id))
            .filter(|agent| Some(agent.seq) == agent_seq);
        match agent {
            Some(agent) => {
                agent.active_task_count = agent.active_task_count.saturating_sub(1);
                if succeeded {
                    agent.completed_task_count += 1;
                } else {
                    agent.failed_task_count += 1;
                }
                if agent.active_task_count == 0 {
                    agent.status = AgentStatus::Idle;
                }
                agent.last_activity = SystemTime::now();
            }
            None => {
                tracing::debug!(task_id = %task_id, agent = ?agent_id, "Task finished after its agent was deregistered");
            }
        }

        metrics::record_busy_agents(self.busy_agents());
        Ok(())
    }
}

/// Matches tasks to agents and runs them through a `TaskExecutor`.
#[derive(Debug)]
pub struct DispatchEngine<E> {
    config: DispatchConfig,
    executor: E,
    registry: Mutex<Registry>,
}

impl<E: TaskExecutor> DispatchEngine<E> {
    pub fn new(config: DispatchConfig, executor: E) -> Self {
        Self {
            config,
            executor,
            registry: Mutex::new(Registry::default()),
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    // Registry critical sections never panic halfway, so a poisoned lock is still usable.
    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add an agent. It starts idle with zeroed counters.
    pub fn register_agent(&self, descriptor: AgentDescriptor) -> Result<(), DispatchError> {
        let mut registry = self.registry();
        if registry.agents.contains_key(&descriptor.id) {
            return Err(DispatchError::DuplicateAgent(descriptor.id));
        }

        let seq = registry.next_seq;
        registry.next_seq += 1;
        tracing::info!(agent = %descriptor.id, task_types = ?descriptor.task_types, "Agent registered");
        registry
            .agents
            .insert(descriptor.id.clone(), Agent::register(descriptor, seq));
        Ok(())
    }

    /// Remove an agent. Tasks already running on it still finish normally.
    pub fn deregister_agent(&self, agent_id: &str) -> Result<Agent, DispatchError> {
        let mut registry = self.registry();
        let agent = registry
            .agents
            .remove(agent_id)
            .ok_or_else(|| DispatchError::AgentNotFound(agent_id.to_string()))?;

        if agent.active_task_count > 0 {
            tracing::warn!(agent = %agent_id, active_tasks = agent.active_task_count, "Agent deregistered with tasks in flight");
        } else {
            tracing::info!(agent = %agent_id, "Agent deregistered");
        }
        metrics::record_busy_agents(registry.busy_agents());
        Ok(agent)
    }

    /// The agent that would receive a task of `task_type` right now, if any.
    ///
    /// Agents at capacity are never chosen. Score is the type-match bonus plus
    /// experience minus load; ties go to the earliest registered agent.
    /// Requirements are forwarded to the executor and do not affect scoring.
    pub fn find_best_agent(&self, task_type: &str, _requirements: &Requirements) -> Option<Agent> {
        let registry = self.registry();
        self.best_agent_id(&registry, task_type)
            .and_then(|id| registry.agents.get(&id).cloned())
    }

    fn best_agent_id(&self, registry: &Registry, task_type: &str) -> Option<String> {
        let mut best: Option<(&Agent, f64)> = None;

        for agent in registry.agents.values() {
            if agent.active_task_count >= self.config.max_active_tasks {
                continue;
            }
            let supports = agent.supports(task_type);
            if self.config.require_type_match && !supports {
                continue;
            }

            let score = self.score(agent, supports);
            let better = match best {
                None => true,
                Some((current, current_score)) => {
                    score > current_score || (score == current_score && agent.seq < current.seq)
                }
            };
            if better {
                best = Some((agent, score));
            }
        }

        best.map(|(agent, _)| agent.id.clone())
    }

    fn score(&self, agent: &Agent, supports: bool) -> f64 {
        let bonus = if supports { self.config.type_match_bonus } else { 0.0 };
        bonus + agent.completed_task_count as f64 * self.config.experience_weight
            - agent.active_task_count as f64 * self.config.load_penalty
    }

    /// Pick an agent and reserve a slot on it in one critical section.
    fn reserve(&self, descriptor: TaskDescriptor) -> Result<(Agent, Task), DispatchError> {
        let mut registry = self.registry();
        if registry.tasks.contains_key(&descriptor.id) {
            return Err(DispatchError::DuplicateTask(descriptor.id));
        }

        let agent_id = self
            .best_agent_id(&registry, &descriptor.task_type)
            .ok_or_else(|| DispatchError::NoSuitableAgent {
                task_type: descriptor.task_type.clone(),
            })?;

        let agent = registry
            .agents
            .get_mut(&agent_id)
            .ok_or_else(|| DispatchError::AgentNotFound(agent_id.clone()))?;
        let mut task = Task::new(descriptor);
        task.assign(agent);
        agent.active_task_count += 1;
        agent.status = AgentStatus::Busy;
        agent.last_activity = SystemTime::now();
        let agent = agent.clone();

        registry.tasks.insert(task.id.clone(), task.clone());
        metrics::record_busy_agents(registry.busy_agents());
        Ok((agent, task))
    }

    /// Assign the task to the best agent, execute it and record the outcome.
    ///
    /// Fails with `NoSuitableAgent` without recording the task when no agent
    /// can take it. Execution failures are recorded and returned, never retried.
    pub async fn submit_task(&self, descriptor: TaskDescriptor) -> Result<Value, DispatchError> {
        let task_type = descriptor.task_type.clone();
        let (agent, task) = match self.reserve(descriptor) {
            Ok(reserved) => reserved,
            Err(err) => {
                tracing::warn!(task_type = %task_type, error = %err, "Task rejected");
                return Err(err);
            }
        };
        tracing::info!(task_id = %task.id, task_type = %task.task_type, agent = %agent.id, "Task assigned");

        let reservation = Reservation {
            engine: self,
            task_id: Some(task.id.clone()),
        };
        let outcome = self.executor.execute(&agent, &task).await;
        reservation.disarm();

        let recorded = match &outcome {
            Ok(value) => self.complete_task(&task.id, value.clone()),
            Err(err) => self.fail_task(&task.id, err.to_string()),
        };
        if let Err(err) = recorded {
            tracing::warn!(task_id = %task.id, error = %err, "Execution outcome not recorded");
        }

        outcome.map_err(|err| DispatchError::TaskExecution {
            task_id: task.id,
            message: err.0,
        })
    }

    /// Mark an in-progress task completed with `result`.
    pub fn complete_task(&self, task_id: &str, result: Value) -> Result<(), DispatchError> {
        self.registry().finish(task_id, Ok(result))?;
        tracing::info!(task_id = %task_id, "Task completed");
        Ok(())
    }

    /// Mark an in-progress task failed with `error`.
    pub fn fail_task(&self, task_id: &str, error: impl Into<String>) -> Result<(), DispatchError> {
        let error = error.into();
        self.registry().finish(task_id, Err(error.clone()))?;
        tracing::warn!(task_id = %task_id, error = %error, "Task failed");
        Ok(())
    }

    pub fn agent(&self, agent_id: &str) -> Option<Agent> {
        self.registry().agents.get(agent_id).cloned()
    }

    /// Registered agents in registration order.
    pub fn agents(&self) -> Vec<Agent> {
        let mut agents: Vec<_> = self.registry().agents.values().cloned().collect();
        agents.sort_by_key(|a| a.seq);
        agents
    }

    pub fn task(&self, task_id: &str) -> Option<Task> {
        self.registry().tasks.get(task_id).cloned()
    }

    /// Every task seen, oldest first.
    pub fn tasks(&self) -> Vec<Task> {
        let mut tasks: Vec<_> = self.registry().tasks.values().cloned().collect();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        tasks
    }

    pub fn metrics(&self) -> DispatchMetrics {
        let registry = self.registry();

        let mut agents: Vec<_> = registry.agents.values().collect();
        agents.sort_by_key(|a| a.seq);
        let busy_agents = registry.busy_agents();
        let finished = registry.completed + registry.failed;
        let average_execution_ms = if finished == 0 {
            0.0
        } else {
            registry.total_execution.as_nanos() as f64 / 1_000_000.0 / finished as f64
        };

        DispatchMetrics {
            total_agents: agents.len(),
            busy_agents,
            idle_agents: agents.len() - busy_agents,
            active_tasks: registry
                .tasks
                .values()
                .filter(|t| t.status == TaskStatus::InProgress)
                .count(),
            completed_tasks: registry.completed,
            failed_tasks: registry.failed,
            average_execution_ms,
            agents: agents
                .into_iter()
                .map(|a| AgentMetrics {
                    id: a.id.clone(),
                    status: a.status,
                    active_tasks: a.active_task_count,
                    completed_tasks: a.completed_task_count,
                    failed_tasks: a.failed_task_count,
                })
                .collect(),
        }
    }
}

/// Fails the task if `submit_task` is dropped before the executor returns.
struct Reservation<'a, E: TaskExecutor> {
    engine: &'a DispatchEngine<E>,
    task_id: Option<String>,
}

impl<E: TaskExecutor> Reservation<'_, E> {
    fn disarm(mut self) {
        self.task_id = None;
    }
}

impl<E: TaskExecutor> Drop for Reservation<'_, E> {
    fn drop(&mut self) {
        if let Some(task_id) = self.task_id.take() {
            tracing::warn!(task_id = %task_id, "Task submission dropped mid-execution");
            if let Err(err) = self.engine.registry().finish(&task_id, Err(CANCELLED.to_string())) {
                tracing::warn!(task_id = %task_id, error = %err, "Cancelled task not recorded");
            }
        }
    }
}
