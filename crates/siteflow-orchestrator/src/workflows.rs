//! Task hooks binding queue task types to lifecycle work
//!
//! Each hook parses its task's payload, delegates to the orchestrator (or
//! to a remote command on the server's host), and reports success or a
//! failure detail back to the queue. Hooks never transition task state.

use crate::action::{ActionParams, InstanceAction};
use crate::orchestrator::Orchestrator;
use crate::queue::TaskHook;
use crate::services::{
    ChangeDomainPayload, CloneSitePayload, CreateServerParams, InstallWpPayload, SiteActionPayload,
};
use async_trait::async_trait;
use serde_json::json;
use siteflow_core::PendingTask;
use std::sync::Arc;
use uuid::Uuid;

fn require_server(task: &PendingTask) -> Result<Uuid, String> {
    task.server_id
        .ok_or_else(|| format!("task {} has no server reference", task.id))
}

fn parse_payload<T: serde::de::DeserializeOwned>(task: &PendingTask) -> Result<T, String> {
    serde_json::from_value(task.payload.clone())
        .map_err(|e| format!("malformed payload for task {}: {}", task.id, e))
}

/// Runs the `create` lifecycle action for a queued provisioning request
pub struct CreateServerHook {
    orchestrator: Arc<Orchestrator>,
}

impl CreateServerHook {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl TaskHook for CreateServerHook {
    async fn run(&self, task: &PendingTask) -> Result<serde_json::Value, String> {
        let server_id = require_server(task)?;
        let params: CreateServerParams = parse_payload(task)?;

        let action_params = ActionParams {
            script: params.script,
            initial_os: params.initial_os,
            ssh_key_id: params.ssh_key_id,
            ..ActionParams::default()
        };

        let record = self
            .orchestrator
            .do_instance_action(server_id, InstanceAction::Create, &action_params)
            .await
            .map_err(|e| e.to_string())?;

        Ok(json!({
            "instance_id": record.instance_id,
            "ipv4": record.ipv4,
            "state": record.state,
        }))
    }
}

/// Runs the `delete` lifecycle action for a queued deletion
pub struct DeleteServerHook {
    orchestrator: Arc<Orchestrator>,
}

impl DeleteServerHook {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl TaskHook for DeleteServerHook {
    async fn run(&self, task: &PendingTask) -> Result<serde_json::Value, String> {
        let server_id = require_server(task)?;

        let record = self
            .orchestrator
            .do_instance_action(server_id, InstanceAction::Delete, &ActionParams::default())
            .await
            .map_err(|e| e.to_string())?;

        Ok(json!({ "trashed": record.trashed }))
    }
}

/// Runs an arbitrary queued lifecycle action (reboot, resize, relocate, ...)
pub struct SiteActionHook {
    orchestrator: Arc<Orchestrator>,
}

impl SiteActionHook {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl TaskHook for SiteActionHook {
    async fn run(&self, task: &PendingTask) -> Result<serde_json::Value, String> {
        let server_id = require_server(task)?;
        let payload: SiteActionPayload = parse_payload(task)?;

        let record = self
            .orchestrator
            .do_instance_action(server_id, payload.action, &payload.params)
            .await
            .map_err(|e| e.to_string())?;

        Ok(json!({
            "action": payload.action,
            "state": record.state,
        }))
    }
}

/// Rewrites a site's domain via a remote command on its server
pub struct ChangeDomainHook {
    orchestrator: Arc<Orchestrator>,
}

impl ChangeDomainHook {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl TaskHook for ChangeDomainHook {
    async fn run(&self, task: &PendingTask) -> Result<serde_json::Value, String> {
        let server_id = require_server(task)?;
        let payload: ChangeDomainPayload = parse_payload(task)?;

        let command = format!(
            "bash /root/siteflow-change-domain.sh {} {}",
            payload.from_domain, payload.to_domain
        );
        self.orchestrator
            .run_site_command(server_id, &command, "change-domain")
            .await
            .map_err(|e| e.to_string())?;

        Ok(json!({ "domain": payload.to_domain }))
    }
}

/// Clones a site into a new domain on the same server
pub struct CloneSiteHook {
    orchestrator: Arc<Orchestrator>,
}

impl CloneSiteHook {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl TaskHook for CloneSiteHook {
    async fn run(&self, task: &PendingTask) -> Result<serde_json::Value, String> {
        let server_id = require_server(task)?;
        let payload: CloneSitePayload = parse_payload(task)?;

        let command = format!(
            "bash /root/siteflow-clone-site.sh {} {}",
            payload.source_domain, payload.target_domain
        );
        self.orchestrator
            .run_site_command(server_id, &command, "clone-site")
            .await
            .map_err(|e| e.to_string())?;

        Ok(json!({ "domain": payload.target_domain }))
    }
}

/// Installs a fresh WordPress site on an already-provisioned server
pub struct InstallWpHook {
    orchestrator: Arc<Orchestrator>,
}

impl InstallWpHook {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl TaskHook for InstallWpHook {
    async fn run(&self, task: &PendingTask) -> Result<serde_json::Value, String> {
        let server_id = require_server(task)?;
        let payload: InstallWpPayload = parse_payload(task)?;

        let command = format!(
            "bash /root/siteflow-install-wp.sh {} '{}' {}",
            payload.domain, payload.site_title, payload.admin_email
        );
        self.orchestrator
            .run_site_command(server_id, &command, "install-wp")
            .await
            .map_err(|e| e.to_string())?;

        Ok(json!({ "domain": payload.domain }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_require_server_missing() {
        let task = PendingTask::new("example.com", "change-domain", json!({}));
        assert!(require_server(&task).is_err());
    }

    #[test]
    fn test_malformed_payload_reported() {
        let task = PendingTask::new("example.com", "change-domain", json!({"nope": 1}));
        let err = parse_payload::<ChangeDomainPayload>(&task).unwrap_err();
        assert!(err.contains("malformed payload"));
    }
}
