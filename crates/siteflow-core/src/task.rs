//! Durable pending tasks
//!
//! The general work-queue record behind REST-triggered workflows (install
//! WordPress, change domain, clone site). Tasks move strictly forward:
//! `Ready` → `InProcess` → `Complete` | `Failed`.

use crate::error::CoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a pending task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskState {
    Ready,
    InProcess,
    Complete,
    Failed,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Complete | TaskState::Failed)
    }

    /// Forward-only transition check
    pub fn can_transition_to(&self, next: TaskState) -> bool {
        matches!(
            (self, next),
            (TaskState::Ready, TaskState::InProcess)
                | (TaskState::Ready, TaskState::Failed)
                | (TaskState::InProcess, TaskState::Complete)
                | (TaskState::InProcess, TaskState::Failed)
        )
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskState::Ready => write!(f, "ready"),
            TaskState::InProcess => write!(f, "in-process"),
            TaskState::Complete => write!(f, "complete"),
            TaskState::Failed => write!(f, "failed"),
        }
    }
}

/// One durable unit of asynchronous work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingTask {
    pub id: Uuid,
    pub version: u64,

    /// Discriminates which workflow consumes the task
    /// (e.g., "install-wp", "change-domain", "clone-site")
    pub task_type: String,

    /// Natural key such as a domain name or server id; at most one
    /// non-terminal task may exist per (key, type)
    pub key: String,

    pub state: TaskState,

    /// Workflow input parameters
    pub payload: serde_json::Value,

    /// Server the task operates on, if any
    pub server_id: Option<Uuid>,

    /// Human-readable note shown in task listings
    pub comment: String,

    pub attempts: u32,

    /// Final result or failure detail attached on completion
    pub result: Option<serde_json::Value>,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl PendingTask {
    pub fn new(
        key: impl Into<String>,
        task_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            version: 0,
            task_type: task_type.into(),
            key: key.into(),
            state: TaskState::Ready,
            payload,
            server_id: None,
            comment: String::new(),
            attempts: 0,
            result: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn with_server(mut self, server_id: Uuid) -> Self {
        self.server_id = Some(server_id);
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    /// Apply a forward transition, stamping the relevant timestamp
    pub fn transition(&mut self, next: TaskState) -> Result<(), CoreError> {
        if !self.state.can_transition_to(next) {
            return Err(CoreError::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }

        match next {
            TaskState::InProcess => {
                self.attempts += 1;
                self.started_at = Some(Utc::now());
            }
            TaskState::Complete | TaskState::Failed => {
                self.completed_at = Some(Utc::now());
            }
            TaskState::Ready => {}
        }
        self.state = next;
        Ok(())
    }
}
