//! Request-facing service layer
//!
//! Thin facade the REST surface calls into. Slow work is never done inline:
//! each operation validates, persists a record and/or enqueues a task, and
//! returns ids the caller can poll. The queue drain and the scheduler do
//! the rest in the background.

use crate::action::{ActionParams, InstanceAction};
use crate::error::{OrchestratorError, Result};
use crate::orchestrator::Orchestrator;
use crate::queue::TaskQueue;
use serde::{Deserialize, Serialize};
use siteflow_core::{PendingTask, RecordStore, ServerRecord};
use std::sync::Arc;
use uuid::Uuid;

pub const TASK_CREATE_SERVER: &str = "create-server";
pub const TASK_DELETE_SERVER: &str = "delete-server";
pub const TASK_SITE_ACTION: &str = "site-action";
pub const TASK_CHANGE_DOMAIN: &str = "change-domain";
pub const TASK_CLONE_SITE: &str = "clone-site";
pub const TASK_INSTALL_WP: &str = "install-wp";

/// Input for provisioning a new server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateServerParams {
    pub name: String,
    pub provider: String,
    pub region: String,
    pub size: String,
    pub owner: Option<String>,
    pub initial_os: Option<String>,
    pub ssh_key_id: Option<String>,
    /// Override for the post-provision command
    pub script: Option<String>,
}

/// Ids handed back to a provisioning caller for polling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateServerResponse {
    pub server_id: Uuid,
    pub task_id: Uuid,
}

/// Payload of a [`TASK_SITE_ACTION`] task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteActionPayload {
    pub action: InstanceAction,
    #[serde(default)]
    pub params: ActionParams,
}

/// Payload of a [`TASK_CHANGE_DOMAIN`] task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeDomainPayload {
    pub from_domain: String,
    pub to_domain: String,
}

/// Payload of a [`TASK_CLONE_SITE`] task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloneSitePayload {
    pub source_domain: String,
    pub target_domain: String,
}

/// Payload of a [`TASK_INSTALL_WP`] task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallWpPayload {
    pub domain: String,
    pub site_title: String,
    pub admin_email: String,
}

pub struct Services {
    orchestrator: Arc<Orchestrator>,
    queue: Arc<TaskQueue>,
    store: Arc<dyn RecordStore>,
}

impl Services {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        queue: Arc<TaskQueue>,
        store: Arc<dyn RecordStore>,
    ) -> Self {
        Self {
            orchestrator,
            queue,
            store,
        }
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// Provision a new server asynchronously
    ///
    /// The record is inserted idle, with no deferred action, so only the
    /// queued create task kicks off provisioning; the scheduler cannot
    /// race it into a double create.
    pub async fn create_server(&self, params: CreateServerParams) -> Result<CreateServerResponse> {
        let mut record = ServerRecord::new(
            params.name.clone(),
            params.provider.clone(),
            params.region.clone(),
            params.size.clone(),
        );
        if let Some(owner) = &params.owner {
            record = record.with_owner(owner.clone());
        }
        record.audit("provisioning requested");

        let server_id = record.id;
        self.store.insert_server(record).await?;

        let task = PendingTask::new(
            server_id.to_string(),
            TASK_CREATE_SERVER,
            serde_json::to_value(&params)?,
        )
        .with_server(server_id)
        .with_comment(format!("provision '{}' on {}", params.name, params.provider));
        let task_id = self.queue.enqueue(task).await?;

        tracing::info!(server = %server_id, task = %task_id, "Server provisioning queued");
        Ok(CreateServerResponse { server_id, task_id })
    }

    /// Queue provider-side deletion of a server
    pub async fn delete_server(&self, server_id: Uuid) -> Result<Uuid> {
        let record = self.require_record(server_id).await?;

        let task = PendingTask::new(
            server_id.to_string(),
            TASK_DELETE_SERVER,
            serde_json::Value::Null,
        )
        .with_server(server_id)
        .with_comment(format!("delete '{}'", record.name));
        self.queue.enqueue(task).await
    }

    /// Queue a lifecycle action (reboot, resize, relocate, ...) against a
    /// server
    pub async fn execute_site_action(
        &self,
        server_id: Uuid,
        action: InstanceAction,
        params: ActionParams,
    ) -> Result<Uuid> {
        let record = self.require_record(server_id).await?;

        let payload = SiteActionPayload { action, params };
        let task = PendingTask::new(
            server_id.to_string(),
            TASK_SITE_ACTION,
            serde_json::to_value(&payload)?,
        )
        .with_server(server_id)
        .with_comment(format!("{} '{}'", action, record.name));
        self.queue.enqueue(task).await
    }

    /// Queue a domain change on a server's site
    ///
    /// Keyed by the current domain, so concurrent renames of the same site
    /// are refused rather than interleaved.
    pub async fn change_domain(
        &self,
        server_id: Uuid,
        from_domain: impl Into<String>,
        to_domain: impl Into<String>,
    ) -> Result<Uuid> {
        self.require_record(server_id).await?;

        let payload = ChangeDomainPayload {
            from_domain: from_domain.into(),
            to_domain: to_domain.into(),
        };
        let task = PendingTask::new(
            payload.from_domain.clone(),
            TASK_CHANGE_DOMAIN,
            serde_json::to_value(&payload)?,
        )
        .with_server(server_id)
        .with_comment(format!("{} -> {}", payload.from_domain, payload.to_domain));
        self.queue.enqueue(task).await
    }

    /// Queue cloning one site into a new domain on the same server
    pub async fn clone_site(
        &self,
        server_id: Uuid,
        source_domain: impl Into<String>,
        target_domain: impl Into<String>,
    ) -> Result<Uuid> {
        self.require_record(server_id).await?;

        let payload = CloneSitePayload {
            source_domain: source_domain.into(),
            target_domain: target_domain.into(),
        };
        let task = PendingTask::new(
            payload.target_domain.clone(),
            TASK_CLONE_SITE,
            serde_json::to_value(&payload)?,
        )
        .with_server(server_id)
        .with_comment(format!(
            "clone {} -> {}",
            payload.source_domain, payload.target_domain
        ));
        self.queue.enqueue(task).await
    }

    /// Queue a fresh WordPress install on a server
    pub async fn install_wordpress(
        &self,
        server_id: Uuid,
        payload: InstallWpPayload,
    ) -> Result<Uuid> {
        self.require_record(server_id).await?;

        let task = PendingTask::new(
            payload.domain.clone(),
            TASK_INSTALL_WP,
            serde_json::to_value(&payload)?,
        )
        .with_server(server_id)
        .with_comment(format!("install WordPress on {}", payload.domain));
        self.queue.enqueue(task).await
    }

    pub async fn get_server(&self, server_id: Uuid) -> Result<ServerRecord> {
        self.store
            .get_server(server_id)
            .await?
            .ok_or(OrchestratorError::ServerNotFound(server_id))
    }

    pub async fn list_servers(&self) -> Result<Vec<ServerRecord>> {
        Ok(self.store.list_servers().await?)
    }

    async fn require_record(&self, server_id: Uuid) -> Result<ServerRecord> {
        let record = self.get_server(server_id).await?;
        if record.trashed {
            return Err(OrchestratorError::RecordTrashed(server_id));
        }
        Ok(record)
    }
}
