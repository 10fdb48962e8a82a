//! Persistence contract and in-memory implementation
//!
//! All record writes go through a compare-and-swap on the record's version,
//! so a scheduler tick and a concurrent user action can never silently lose
//! each other's updates; the loser gets `VersionConflict` and retries from
//! fresh state.

use crate::error::{CoreError, Result};
use crate::record::{ActionStatus, ServerRecord};
use crate::task::{PendingTask, TaskState};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Persistence contract for server records and pending tasks
#[async_trait]
pub trait RecordStore: Send + Sync {
    // Server records

    async fn insert_server(&self, record: ServerRecord) -> Result<()>;

    async fn get_server(&self, id: Uuid) -> Result<Option<ServerRecord>>;

    /// Compare-and-swap update: the record's `version` must match the
    /// stored version. Returns the record with the bumped version.
    async fn update_server(&self, record: ServerRecord) -> Result<ServerRecord>;

    /// Soft-delete: the record stays queryable by id but disappears from
    /// listings, pending provider-side confirmation.
    async fn trash_server(&self, id: Uuid) -> Result<()>;

    /// All non-trashed server records
    async fn list_servers(&self) -> Result<Vec<ServerRecord>>;

    /// Records the deferred-action scheduler should pick up
    async fn servers_with_action_status(
        &self,
        status: ActionStatus,
    ) -> Result<Vec<ServerRecord>>;

    // Pending tasks

    async fn insert_task(&self, task: PendingTask) -> Result<()>;

    /// Insert a task only if no task with the same (key, type) is still
    /// Ready or InProcess. Check and insert happen under one write lock,
    /// so two racing callers cannot both get through; the loser gets
    /// `DuplicateTask`.
    async fn insert_task_unless_pending(&self, task: PendingTask) -> Result<()>;

    async fn get_task(&self, id: Uuid) -> Result<Option<PendingTask>>;

    /// Compare-and-swap update, same contract as `update_server`
    async fn update_task(&self, task: PendingTask) -> Result<PendingTask>;

    /// The single task matching (key, type, state), if one exists
    async fn find_task(
        &self,
        key: &str,
        task_type: &str,
        state: TaskState,
    ) -> Result<Option<PendingTask>>;

    async fn tasks_in_state(&self, state: TaskState) -> Result<Vec<PendingTask>>;
}

/// In-memory store
///
/// Backs the daemon in single-node mode and every test. Durable backends
/// implement `RecordStore` outside this workspace.
#[derive(Default)]
pub struct MemoryStore {
    servers: RwLock<HashMap<Uuid, ServerRecord>>,
    tasks: RwLock<HashMap<Uuid, PendingTask>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn insert_server(&self, record: ServerRecord) -> Result<()> {
        let mut servers = self.servers.write().await;
        if servers.contains_key(&record.id) {
            return Err(CoreError::AlreadyExists { id: record.id });
        }
        servers.insert(record.id, record);
        Ok(())
    }

    async fn get_server(&self, id: Uuid) -> Result<Option<ServerRecord>> {
        Ok(self.servers.read().await.get(&id).cloned())
    }

    async fn update_server(&self, mut record: ServerRecord) -> Result<ServerRecord> {
        let mut servers = self.servers.write().await;
        let current = servers
            .get(&record.id)
            .ok_or(CoreError::ServerNotFound(record.id))?;

        if current.version != record.version {
            return Err(CoreError::VersionConflict {
                id: record.id,
                expected: record.version,
                found: current.version,
            });
        }

        record.version += 1;
        record.updated_at = Utc::now();
        servers.insert(record.id, record.clone());
        Ok(record)
    }

    async fn trash_server(&self, id: Uuid) -> Result<()> {
        let mut servers = self.servers.write().await;
        let record = servers.get_mut(&id).ok_or(CoreError::ServerNotFound(id))?;
        record.trashed = true;
        record.version += 1;
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn list_servers(&self) -> Result<Vec<ServerRecord>> {
        let servers = self.servers.read().await;
        let mut records: Vec<ServerRecord> =
            servers.values().filter(|r| !r.trashed).cloned().collect();
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }

    async fn servers_with_action_status(
        &self,
        status: ActionStatus,
    ) -> Result<Vec<ServerRecord>> {
        let servers = self.servers.read().await;
        let mut records: Vec<ServerRecord> = servers
            .values()
            .filter(|r| !r.trashed && r.action_status == status)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }

    async fn insert_task(&self, task: PendingTask) -> Result<()> {
        let mut tasks = self.tasks.write().await;
        if tasks.contains_key(&task.id) {
            return Err(CoreError::AlreadyExists { id: task.id });
        }
        tasks.insert(task.id, task);
        Ok(())
    }

    async fn insert_task_unless_pending(&self, task: PendingTask) -> Result<()> {
        let mut tasks = self.tasks.write().await;
        if tasks.contains_key(&task.id) {
            return Err(CoreError::AlreadyExists { id: task.id });
        }
        let pending_twin = tasks
            .values()
            .any(|t| t.key == task.key && t.task_type == task.task_type && !t.state.is_terminal());
        if pending_twin {
            return Err(CoreError::DuplicateTask {
                key: task.key,
                task_type: task.task_type,
            });
        }
        tasks.insert(task.id, task);
        Ok(())
    }

    async fn get_task(&self, id: Uuid) -> Result<Option<PendingTask>> {
        Ok(self.tasks.read().await.get(&id).cloned())
    }

    async fn update_task(&self, mut task: PendingTask) -> Result<PendingTask> {
        let mut tasks = self.tasks.write().await;
        let current = tasks.get(&task.id).ok_or(CoreError::TaskNotFound(task.id))?;

        if current.version != task.version {
            return Err(CoreError::VersionConflict {
                id: task.id,
                expected: task.version,
                found: current.version,
            });
        }

        task.version += 1;
        tasks.insert(task.id, task.clone());
        Ok(task)
    }

    async fn find_task(
        &self,
        key: &str,
        task_type: &str,
        state: TaskState,
    ) -> Result<Option<PendingTask>> {
        let tasks = self.tasks.read().await;
        Ok(tasks
            .values()
            .find(|t| t.key == key && t.task_type == task_type && t.state == state)
            .cloned())
    }

    async fn tasks_in_state(&self, state: TaskState) -> Result<Vec<PendingTask>> {
        let tasks = self.tasks.read().await;
        let mut matching: Vec<PendingTask> =
            tasks.values().filter(|t| t.state == state).cloned().collect();
        matching.sort_by_key(|t| t.created_at);
        Ok(matching)
    }
}
