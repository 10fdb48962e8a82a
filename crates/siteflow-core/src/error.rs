//! Core data model error types

use thiserror::Error;
use uuid::Uuid;

/// Record and task persistence errors
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Server record not found: {0}")]
    ServerNotFound(Uuid),

    #[error("Task not found: {0}")]
    TaskNotFound(Uuid),

    #[error("Stale write for record {id}: expected version {expected}, found {found}")]
    VersionConflict { id: Uuid, expected: u64, found: u64 },

    #[error("A task of type {task_type} is already pending for key {key}")]
    DuplicateTask { key: String, task_type: String },

    #[error("Record {id} already exists")]
    AlreadyExists { id: Uuid },

    #[error("Invalid task transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
