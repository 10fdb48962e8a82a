//! Orchestration error types

use siteflow_cloud::CloudError;
use siteflow_core::CoreError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Server record not found: {0}")]
    ServerNotFound(Uuid),

    #[error("Server record {0} is trashed")]
    RecordTrashed(Uuid),

    #[error("Server record {0} has no provider instance yet")]
    NoInstance(Uuid),

    #[error("Unknown instance action: {0}")]
    UnknownAction(String),

    #[error("Another action is already running against record {0}")]
    ActionInFlight(Uuid),

    #[error("Missing action parameter: {0}")]
    MissingParam(&'static str),

    #[error("No in-process task for key {key} and type {task_type}")]
    NoInProcessTask { key: String, task_type: String },

    #[error("Remote command failed on {host}: {output}")]
    Exec { host: String, output: String },

    #[error("Resize failed on provider side for instance {0}")]
    ResizeFailed(String),

    #[error(transparent)]
    Cloud(#[from] CloudError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
