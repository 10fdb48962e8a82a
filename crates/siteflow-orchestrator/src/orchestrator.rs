//! Server lifecycle orchestrator
//!
//! `do_instance_action` is the single dispatch point for every lifecycle
//! transition. It resolves the provider adapter, refreshes the record from
//! provider-reported state, runs the requested action, and persists the
//! updated record — chaining the next deferred action where the workflow
//! has more steps.

use crate::action::{ActionParams, InstanceAction};
use crate::error::{OrchestratorError, Result};
use crate::notify::Notifier;
use crate::ssh::{RemoteExecutor, SshAuth};
use siteflow_cloud::{
    CloudError, CreateServerRequest, Feature, ProviderRegistry, ResizeProgress, ServerDetails,
    ServerProvider, ServerState,
};
use siteflow_core::{PendingResize, RecordStore, ServerRecord};
use std::sync::Arc;
use uuid::Uuid;

/// Post-provision script run once the instance reports active
const DEFAULT_SETUP_COMMAND: &str = "bash /root/siteflow-setup.sh";

/// Lifecycle orchestrator
///
/// Holds no per-server state; everything it needs between invocations
/// lives on the persisted record.
pub struct Orchestrator {
    registry: ProviderRegistry,
    store: Arc<dyn RecordStore>,
    executor: Arc<dyn RemoteExecutor>,
    notifier: Arc<dyn Notifier>,
}

impl Orchestrator {
    pub fn new(
        registry: ProviderRegistry,
        store: Arc<dyn RecordStore>,
        executor: Arc<dyn RemoteExecutor>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            registry,
            store,
            executor,
            notifier,
        }
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Run one lifecycle action against a server record
    ///
    /// The record's previous error is cleared when the action starts, not
    /// when it succeeds, so stale errors never outlive the next attempt.
    /// An advisory mutex token is taken for the duration; a second caller
    /// arriving mid-action gets `ActionInFlight` instead of racing.
    pub async fn do_instance_action(
        &self,
        server_id: Uuid,
        action: InstanceAction,
        params: &ActionParams,
    ) -> Result<ServerRecord> {
        let mut record = self
            .store
            .get_server(server_id)
            .await?
            .ok_or(OrchestratorError::ServerNotFound(server_id))?;

        if record.trashed && action != InstanceAction::Delete {
            return Err(OrchestratorError::RecordTrashed(server_id));
        }

        let provider = self.registry.get(&record.provider)?;

        if record.command_mutex.is_some() {
            return Err(OrchestratorError::ActionInFlight(server_id));
        }

        let token = Uuid::new_v4().to_string();
        record.command_mutex = Some(token.clone());
        record.error = None;
        record.audit(format!("action '{}' started", action));
        let mut record = self.store.update_server(record).await?;

        let outcome = self.dispatch(&mut record, &provider, action, params).await;

        match &outcome {
            Ok(()) => record.audit(format!("action '{}' finished", action)),
            Err(e) => {
                record.audit(format!("action '{}' failed: {}", action, e));
                record.error = Some(e.to_string());
            }
        }

        // Release the advisory mutex unless a terminal step already
        // cleared all deferred-action fields
        if record.command_mutex.as_deref() == Some(token.as_str()) {
            record.command_mutex = None;
        }

        let record = self.store.update_server(record).await?;
        outcome.map(|()| record)
    }

    /// Run an ad-hoc command on a server's host as the provider's root user
    ///
    /// Used by queued site workflows (domain changes, clones, installs)
    /// that operate on an already-provisioned server.
    pub async fn run_site_command(
        &self,
        server_id: Uuid,
        command: &str,
        action_tag: &str,
    ) -> Result<crate::ssh::ExecOutcome> {
        let record = self
            .store
            .get_server(server_id)
            .await?
            .ok_or(OrchestratorError::ServerNotFound(server_id))?;
        if record.trashed {
            return Err(OrchestratorError::RecordTrashed(server_id));
        }

        let provider = self.registry.get(&record.provider)?;
        let host = record
            .ipv4
            .clone()
            .ok_or(OrchestratorError::NoInstance(server_id))?;
        let auth = SshAuth::for_user(provider.identity().root_user());

        let outcome = self
            .executor
            .exec(&host, command, &auth, action_tag, record.id)
            .await?;
        if !outcome.success {
            return Err(OrchestratorError::Exec {
                host,
                output: outcome.output,
            });
        }
        Ok(outcome)
    }

    async fn dispatch(
        &self,
        record: &mut ServerRecord,
        provider: &Arc<dyn ServerProvider>,
        action: InstanceAction,
        params: &ActionParams,
    ) -> Result<()> {
        // Refresh provider-reported state before mutating anything. A
        // failed lookup aborts every action except delete: the instance
        // may already have vanished on the provider side.
        let details = match &record.instance_id {
            Some(instance_id) => match provider.details(instance_id).await {
                Ok(details) => Some(details),
                Err(e) if action == InstanceAction::Delete => {
                    tracing::warn!(
                        server = %record.id,
                        error = %e,
                        "Proceeding with delete despite details failure"
                    );
                    None
                }
                Err(e) => return Err(e.into()),
            },
            None => None,
        };

        if let Some(details) = &details {
            record.state = details.state;
            if details.ipv4.is_some() {
                record.ipv4 = details.ipv4.clone();
            }
            if details.ipv6.is_some() {
                record.ipv6 = details.ipv6.clone();
            }
        }

        match action {
            InstanceAction::Create => self.run_create(record, provider, params).await,
            InstanceAction::AfterCreateCommands => {
                self.run_after_create(record, provider, &details, params).await
            }
            InstanceAction::Email => self.run_email(record, &details).await,
            InstanceAction::Reboot => {
                let id = self.require_instance(record)?;
                record.state = provider.reboot(&id).await?;
                Ok(())
            }
            InstanceAction::Off => {
                let id = self.require_instance(record)?;
                record.state = provider.power_off(&id).await?;
                Ok(())
            }
            InstanceAction::On => {
                let id = self.require_instance(record)?;
                record.state = provider.power_on(&id).await?;
                Ok(())
            }
            InstanceAction::Delete => self.run_delete(record, provider).await,
            InstanceAction::Relocate | InstanceAction::Reinstall => {
                self.run_replace(record, action, params).await
            }
            InstanceAction::Resize => self.run_resize(record, provider, params).await,
            InstanceAction::ResizePoll => self.run_resize_poll(record, provider).await,
        }
    }

    fn require_instance(&self, record: &ServerRecord) -> Result<String> {
        record
            .instance_id
            .clone()
            .ok_or(OrchestratorError::NoInstance(record.id))
    }

    async fn run_create(
        &self,
        record: &mut ServerRecord,
        provider: &Arc<dyn ServerProvider>,
        params: &ActionParams,
    ) -> Result<()> {
        let request = CreateServerRequest {
            name: record.name.clone(),
            region: record.region.clone(),
            size: record.size_raw.clone(),
            initial_os: params.initial_os.clone(),
            ssh_key_id: params.ssh_key_id.clone(),
            startup_script: params.script.clone(),
            backups: provider.features().supports(Feature::Backups),
            tags: vec!["siteflow".to_string()],
        };

        let created = provider.create(&request).await?;
        record.instance_id = Some(created.instance_id.clone());
        record.ipv4 = created.ipv4;
        record.ipv6 = created.ipv6;
        record.state = ServerState::New;
        record.audit(format!("provisioned instance {}", created.instance_id));

        // Continuation: run setup commands once the instance is active
        record.schedule_action(InstanceAction::AfterCreateCommands.as_str());
        Ok(())
    }

    async fn run_after_create(
        &self,
        record: &mut ServerRecord,
        provider: &Arc<dyn ServerProvider>,
        details: &Option<ServerDetails>,
        params: &ActionParams,
    ) -> Result<()> {
        let Some(details) = details else {
            return Err(OrchestratorError::NoInstance(record.id));
        };

        // Not active yet: leave the deferred action in place, the next
        // tick retries
        if !details.state.is_active() {
            record.audit(format!("waiting for active state (currently {})", details.state));
            return Ok(());
        }

        let host = record
            .ipv4
            .clone()
            .ok_or(OrchestratorError::NoInstance(record.id))?;
        let auth = SshAuth::for_user(provider.identity().root_user());
        let command = params
            .script
            .clone()
            .unwrap_or_else(|| DEFAULT_SETUP_COMMAND.to_string());

        let outcome = self
            .executor
            .exec(
                &host,
                &command,
                &auth,
                InstanceAction::AfterCreateCommands.as_str(),
                record.id,
            )
            .await?;

        if !outcome.success {
            return Err(OrchestratorError::Exec {
                host,
                output: outcome.output,
            });
        }

        record.audit("post-provision commands completed");
        record.schedule_action(InstanceAction::Email.as_str());
        Ok(())
    }

    async fn run_email(
        &self,
        record: &mut ServerRecord,
        details: &Option<ServerDetails>,
    ) -> Result<()> {
        let Some(details) = details else {
            return Err(OrchestratorError::NoInstance(record.id));
        };

        if !details.state.is_active() {
            record.audit(format!("waiting for active state (currently {})", details.state));
            return Ok(());
        }

        let to = record.owner.clone().unwrap_or_else(|| "admin".to_string());
        let body = format!(
            "Server {} is ready at {}",
            record.name,
            record.ipv4.as_deref().unwrap_or("unknown address"),
        );
        self.notifier.send(&to, "Your server is ready", &body).await?;

        record.audit("completion notice sent");
        // Terminal step: no more continuation remains
        record.clear_deferred_action();
        Ok(())
    }

    async fn run_delete(
        &self,
        record: &mut ServerRecord,
        provider: &Arc<dyn ServerProvider>,
    ) -> Result<()> {
        if let Some(instance_id) = record.instance_id.clone() {
            match provider.delete(&instance_id).await {
                Ok(()) => {}
                Err(e) if e.is_instance_missing() => {
                    record.audit("instance already gone on provider side");
                }
                Err(e) => return Err(e.into()),
            }
        }

        record.clear_deferred_action();
        record.trashed = true;
        record.audit("record trashed after provider-side delete");
        Ok(())
    }

    /// Relocate/reinstall: build a replacement record pointing back at
    /// this one and provision it; the old record is only cleaned up once
    /// cutover is confirmed, never before.
    async fn run_replace(
        &self,
        record: &mut ServerRecord,
        action: InstanceAction,
        params: &ActionParams,
    ) -> Result<()> {
        let provider_slug = params
            .target_provider
            .clone()
            .unwrap_or_else(|| record.provider.clone());
        let region = params
            .target_region
            .clone()
            .unwrap_or_else(|| record.region.clone());

        let new_provider = self.registry.get(&provider_slug)?;

        let mut replacement = ServerRecord::new(
            record.name.clone(),
            provider_slug,
            region,
            record.size_raw.clone(),
        )
        .with_parent(record.id);
        if let Some(owner) = &record.owner {
            replacement = replacement.with_owner(owner.clone());
        }

        self.run_create(&mut replacement, &new_provider, params).await?;

        let replacement_id = replacement.id;
        self.store.insert_server(replacement).await?;

        record.audit(format!(
            "{} started; replacement record {}",
            action, replacement_id
        ));
        Ok(())
    }

    async fn run_resize(
        &self,
        record: &mut ServerRecord,
        provider: &Arc<dyn ServerProvider>,
        params: &ActionParams,
    ) -> Result<()> {
        if !provider.features().supports(Feature::Resize) {
            return Err(CloudError::unsupported(&record.provider, "resize").into());
        }

        let new_size = params
            .new_size
            .clone()
            .ok_or(OrchestratorError::MissingParam("new_size"))?;
        let instance_id = self.require_instance(record)?;

        let started = provider.resize(&instance_id, &new_size).await?;

        // Pairing is keyed by provider + instance + action id so a
        // completion can never be misattributed to another server
        record.pending_resize = Some(PendingResize {
            provider: record.provider.clone(),
            instance_id,
            action_id: started.action_id,
            new_size,
        });
        record.schedule_action(InstanceAction::ResizePoll.as_str());
        Ok(())
    }

    async fn run_resize_poll(
        &self,
        record: &mut ServerRecord,
        provider: &Arc<dyn ServerProvider>,
    ) -> Result<()> {
        let Some(pending) = record.pending_resize.clone() else {
            // Nothing to poll; deregister
            record.clear_deferred_action();
            return Ok(());
        };

        if pending.provider != record.provider
            || record.instance_id.as_deref() != Some(pending.instance_id.as_str())
        {
            record.audit("dropped stale resize pairing");
            record.pending_resize = None;
            record.clear_deferred_action();
            return Ok(());
        }

        match provider
            .resize_status(&pending.instance_id, &pending.action_id)
            .await?
        {
            ResizeProgress::InProgress => {
                record.audit("resize still in progress");
                Ok(())
            }
            ResizeProgress::Completed => {
                // Providers power the instance off during a cold resize.
                // Restart first: a failed power-on must keep the pairing
                // so the next tick retries it, and only a successful
                // restart finalizes the new size.
                record.state = provider.power_on(&pending.instance_id).await?;

                record.size = pending.new_size.clone();
                record.size_raw = pending.new_size.clone();
                record.pending_resize = None;
                record.audit(format!("resize to {} completed, instance restarted", pending.new_size));
                record.clear_deferred_action();
                Ok(())
            }
            ResizeProgress::Errored => {
                record.pending_resize = None;
                record.clear_deferred_action();
                Err(OrchestratorError::ResizeFailed(pending.instance_id))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::LogNotifier;
    use crate::ssh::ExecOutcome;
    use async_trait::async_trait;
    use siteflow_cloud::{
        ConnectionStatus, CreatedServer, FeatureSet, ProviderIdentity, RegionInfo, SizeInfo,
        SshKeyInfo,
    };
    use siteflow_core::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NoopExecutor;

    #[async_trait]
    impl RemoteExecutor for NoopExecutor {
        async fn exec(
            &self,
            _host: &str,
            _command: &str,
            _auth: &SshAuth,
            _action_tag: &str,
            _record_id: Uuid,
        ) -> Result<ExecOutcome> {
            Ok(ExecOutcome {
                success: true,
                output: String::new(),
            })
        }

        async fn download(&self, _: &str, _: &str, _: &SshAuth) -> Result<Vec<u8>> {
            Ok(Vec::new())
        }
    }

    /// Provider whose instances have all vanished
    struct VanishedProvider {
        identity: ProviderIdentity,
        features: FeatureSet,
        delete_calls: AtomicUsize,
    }

    impl VanishedProvider {
        fn new() -> Self {
            Self {
                identity: ProviderIdentity::new("vanished", "Vanished Cloud"),
                features: FeatureSet::none(),
                delete_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ServerProvider for VanishedProvider {
        fn identity(&self) -> &ProviderIdentity {
            &self.identity
        }

        fn features(&self) -> &FeatureSet {
            &self.features
        }

        async fn sizes(&self) -> siteflow_cloud::Result<Vec<SizeInfo>> {
            Ok(Vec::new())
        }

        async fn regions(&self) -> siteflow_cloud::Result<Vec<RegionInfo>> {
            Ok(Vec::new())
        }

        async fn ssh_keys(&self) -> siteflow_cloud::Result<Vec<SshKeyInfo>> {
            Ok(Vec::new())
        }

        async fn create(
            &self,
            _request: &CreateServerRequest,
        ) -> siteflow_cloud::Result<CreatedServer> {
            unreachable!("not exercised")
        }

        async fn details(&self, instance_id: &str) -> siteflow_cloud::Result<ServerDetails> {
            Err(CloudError::InstanceNotFound(instance_id.to_string()))
        }

        async fn reboot(&self, _: &str) -> siteflow_cloud::Result<ServerState> {
            Err(CloudError::InstanceNotFound("gone".to_string()))
        }

        async fn power_off(&self, _: &str) -> siteflow_cloud::Result<ServerState> {
            Err(CloudError::InstanceNotFound("gone".to_string()))
        }

        async fn power_on(&self, _: &str) -> siteflow_cloud::Result<ServerState> {
            Err(CloudError::InstanceNotFound("gone".to_string()))
        }

        async fn delete(&self, instance_id: &str) -> siteflow_cloud::Result<()> {
            self.delete_calls.fetch_add(1, Ordering::SeqCst);
            Err(CloudError::InstanceNotFound(instance_id.to_string()))
        }

        async fn test_connection(&self) -> siteflow_cloud::Result<ConnectionStatus> {
            Ok(ConnectionStatus::ok("test"))
        }
    }

    fn orchestrator_with(provider: Arc<dyn ServerProvider>) -> (Orchestrator, Arc<MemoryStore>) {
        let mut registry = ProviderRegistry::new();
        registry.register(provider);
        let store = Arc::new(MemoryStore::new());
        let orchestrator = Orchestrator::new(
            registry,
            store.clone(),
            Arc::new(NoopExecutor),
            Arc::new(LogNotifier::new()),
        );
        (orchestrator, store)
    }

    #[tokio::test]
    async fn test_delete_proceeds_when_instance_missing() {
        let provider = Arc::new(VanishedProvider::new());
        let (orchestrator, store) = orchestrator_with(provider.clone());

        let mut record = ServerRecord::new("doomed", "vanished", "r1", "small");
        record.instance_id = Some("12345".to_string());
        let id = record.id;
        store.insert_server(record).await.unwrap();

        let updated = orchestrator
            .do_instance_action(id, InstanceAction::Delete, &ActionParams::default())
            .await
            .unwrap();

        assert!(updated.trashed);
        assert_eq!(provider.delete_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_non_delete_aborts_when_details_fail() {
        let provider = Arc::new(VanishedProvider::new());
        let (orchestrator, store) = orchestrator_with(provider);

        let mut record = ServerRecord::new("stuck", "vanished", "r1", "small");
        record.instance_id = Some("12345".to_string());
        let id = record.id;
        store.insert_server(record).await.unwrap();

        let err = orchestrator
            .do_instance_action(id, InstanceAction::Reboot, &ActionParams::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::Cloud(CloudError::InstanceNotFound(_))
        ));

        // The failure is persisted on the record and the mutex released
        let record = store.get_server(id).await.unwrap().unwrap();
        assert!(record.error.is_some());
        assert!(record.command_mutex.is_none());
        assert!(!record.trashed);
    }

    #[tokio::test]
    async fn test_second_caller_sees_action_in_flight() {
        let provider = Arc::new(VanishedProvider::new());
        let (orchestrator, store) = orchestrator_with(provider);

        let mut record = ServerRecord::new("busy", "vanished", "r1", "small");
        record.command_mutex = Some("held-elsewhere".to_string());
        let id = record.id;
        store.insert_server(record).await.unwrap();

        let err = orchestrator
            .do_instance_action(id, InstanceAction::Reboot, &ActionParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::ActionInFlight(_)));
    }
}
