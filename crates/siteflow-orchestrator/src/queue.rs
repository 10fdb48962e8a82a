//! Durable task queue
//!
//! REST-triggered workflows enqueue a `PendingTask` and return immediately;
//! a periodic drain picks up ready tasks and runs the hook registered for
//! each task type. At most one non-terminal task may exist per (key, type),
//! so retrying clients cannot pile up duplicate work.

use crate::error::{OrchestratorError, Result};
use async_trait::async_trait;
use siteflow_core::{PendingTask, RecordStore, TaskState};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Workflow body for one task type
///
/// Returns the task's result value, or a failure detail string. The hook
/// never touches the task's state itself; the queue owns the transitions.
#[async_trait]
pub trait TaskHook: Send + Sync {
    async fn run(&self, task: &PendingTask) -> std::result::Result<serde_json::Value, String>;
}

/// Observer invoked after every task state change
#[async_trait]
pub trait TransitionObserver: Send + Sync {
    async fn on_transition(&self, task: &PendingTask);
}

/// Outcome of one drain pass
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DrainReport {
    pub picked_up: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Queue over the durable store
pub struct TaskQueue {
    store: Arc<dyn RecordStore>,
    hooks: HashMap<String, Arc<dyn TaskHook>>,
    observers: Vec<Arc<dyn TransitionObserver>>,
}

impl TaskQueue {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            hooks: HashMap::new(),
            observers: Vec::new(),
        }
    }

    /// Register the workflow hook for a task type
    pub fn register_hook(&mut self, task_type: impl Into<String>, hook: Arc<dyn TaskHook>) {
        self.hooks.insert(task_type.into(), hook);
    }

    pub fn add_observer(&mut self, observer: Arc<dyn TransitionObserver>) {
        self.observers.push(observer);
    }

    async fn notify(&self, task: &PendingTask) {
        for observer in &self.observers {
            observer.on_transition(task).await;
        }
    }

    /// Enqueue a task, rejecting duplicates
    ///
    /// A second enqueue for the same (key, type) while an earlier one is
    /// still ready or in process is refused; once the earlier task reaches
    /// a terminal state the pair becomes available again. The duplicate
    /// check is the store's conditional insert, so two racing enqueues
    /// cannot both get through.
    pub async fn enqueue(&self, task: PendingTask) -> Result<Uuid> {
        let id = task.id;
        let task_type = task.task_type.clone();
        let key = task.key.clone();
        self.store.insert_task_unless_pending(task).await?;
        tracing::info!(task = %id, task_type = %task_type, key = %key, "Enqueued task");
        Ok(id)
    }

    /// Process every ready task once
    ///
    /// A task whose type has no registered hook is failed immediately;
    /// otherwise the task is moved to in-process, the hook runs, and the
    /// task is completed or failed by (key, type) lookup. A hook failure
    /// never aborts the drain for the remaining tasks.
    pub async fn drain(&self) -> Result<DrainReport> {
        let ready = self.store.tasks_in_state(TaskState::Ready).await?;
        let mut report = DrainReport::default();

        for task in ready {
            report.picked_up += 1;

            let Some(hook) = self.hooks.get(&task.task_type).cloned() else {
                let mut task = task;
                task.comment = format!("no handler registered for '{}'", task.task_type);
                task.transition(TaskState::Failed)?;
                let task = self.store.update_task(task).await?;
                self.notify(&task).await;
                report.failed += 1;
                continue;
            };

            let mut task = task;
            task.transition(TaskState::InProcess)?;
            let task = self.store.update_task(task).await?;
            self.notify(&task).await;

            match hook.run(&task).await {
                Ok(result) => {
                    self.complete_task(&task.key, &task.task_type, result).await?;
                    report.completed += 1;
                }
                Err(detail) => {
                    tracing::warn!(
                        task = %task.id,
                        task_type = %task.task_type,
                        detail,
                        "Task hook failed"
                    );
                    self.fail_task(&task.key, &task.task_type, &detail).await?;
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Complete the in-process task for (key, type), attaching its result
    pub async fn complete_task(
        &self,
        key: &str,
        task_type: &str,
        result: serde_json::Value,
    ) -> Result<PendingTask> {
        let mut task = self
            .store
            .find_task(key, task_type, TaskState::InProcess)
            .await?
            .ok_or_else(|| OrchestratorError::NoInProcessTask {
                key: key.to_string(),
                task_type: task_type.to_string(),
            })?;

        task.result = Some(result);
        task.transition(TaskState::Complete)?;
        let task = self.store.update_task(task).await?;
        self.notify(&task).await;
        Ok(task)
    }

    /// Fail the in-process task for (key, type), recording the detail
    pub async fn fail_task(
        &self,
        key: &str,
        task_type: &str,
        detail: &str,
    ) -> Result<PendingTask> {
        let mut task = self
            .store
            .find_task(key, task_type, TaskState::InProcess)
            .await?
            .ok_or_else(|| OrchestratorError::NoInProcessTask {
                key: key.to_string(),
                task_type: task_type.to_string(),
            })?;

        task.result = Some(serde_json::json!({ "error": detail }));
        task.comment = detail.to_string();
        task.transition(TaskState::Failed)?;
        let task = self.store.update_task(task).await?;
        self.notify(&task).await;
        Ok(task)
    }
}
