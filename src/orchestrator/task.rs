//! Units of work and their lifecycle.
//!
//! ```text
//! Pending → InProgress (assigned to an agent at submission)
//! InProgress → Completed | Failed (terminal)
//! ```

use std::fmt;
use std::time::SystemTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::time::Instant;
use uuid::Uuid;
use crate::orchestrator::agent::Agent;

/// Free-form requirements forwarded to the executor.
pub type Requirements = Map<String, Value>;

/// What a queue/API layer submits.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TaskDescriptor {
    pub id: String,
    #[serde(rename = "type")]
    pub task_type: String,
    #[serde(default)]
    pub requirements: Requirements,
}

impl TaskDescriptor {
    /// A task with a fresh random id.
    pub fn new(task_type: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), task_type)
    }

    pub fn with_id(id: impl Into<String>, task_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            task_type: task_type.into(),
            requirements: Requirements::new(),
        }
    }

    pub fn requirement(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.requirements.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        })
    }
}

/// A submitted task. `assigned_agent` is a lookup key, not ownership.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Task {
    pub id: String,
    pub task_type: String,
    pub requirements: Requirements,
    pub status: TaskStatus,
    pub assigned_agent: Option<String>,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub created_at: SystemTime,
    pub started_at: Option<SystemTime>,
    pub finished_at: Option<SystemTime>,
    /// Registration of the assigned agent; a re-registered id is a different agent.
    #[serde(skip)]
    pub(crate) agent_seq: Option<u64>,
    #[serde(skip)]
    pub(crate) started: Option<Instant>,
}

impl Task {
    pub(crate) fn new(descriptor: TaskDescriptor) -> Self {
        Self {
            id: descriptor.id,
            task_type: descriptor.task_type,
            requirements: descriptor.requirements,
            status: TaskStatus::Pending,
            assigned_agent: None,
            result: None,
            error: None,
            created_at: SystemTime::now(),
            started_at: None,
            finished_at: None,
            agent_seq: None,
            started: None,
        }
    }

    pub(crate) fn assign(&mut self, agent: &Agent) {
        self.status = TaskStatus::InProgress;
        self.assigned_agent = Some(agent.id.clone());
        self.agent_seq = Some(agent.seq);
        self.started_at = Some(SystemTime::now());
        self.started = Some(Instant::now());
    }

    /// Move to a terminal state. Returns the time spent in progress.
    pub(crate) fn finish(&mut self, outcome: Result<Value, String>) -> std::time::Duration {
        match outcome {
            Ok(value) => {
                self.status = TaskStatus::Completed;
                self.result = Some(value);
            }
            Err(message) => {
                self.status = TaskStatus::Failed;
                self.error = Some(message);
            }
        }
        self.finished_at = Some(SystemTime::now());
        self.started.map(|started| started.elapsed()).unwrap_or_default()
    }
}
