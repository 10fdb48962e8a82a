use async_trait::async_trait;
use siteflow_cloud::{
    CloudError, ConnectionStatus, CreateServerRequest, CreatedServer, Feature, FeatureSet,
    ProviderIdentity, ProviderRegistry, RegionInfo, ResizeProgress, ResizeStarted, ServerDetails,
    ServerProvider, ServerState, SizeInfo, SshKeyInfo,
};
use siteflow_cloud_custom::{CustomServerConfig, CustomServerProvider};
use siteflow_core::MemoryStore;
use siteflow_orchestrator::{
    ChangeDomainHook, CloneSiteHook, CreateServerHook, DeferredActionScheduler, DeleteServerHook,
    ExecOutcome, InstallWpHook, Notifier, Orchestrator, RemoteExecutor, Result, Services,
    SiteActionHook, SshAuth, TaskQueue, services,
};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use uuid::Uuid;

pub const SCRIPTED_SLUG: &str = "scripted";

/// Provider whose details and resize answers are fed in by the test
pub struct ScriptedProvider {
    identity: ProviderIdentity,
    features: FeatureSet,
    pub details_states: Mutex<VecDeque<ServerState>>,
    pub resize_progress: Mutex<VecDeque<ResizeProgress>>,
    pub create_calls: AtomicUsize,
    pub power_on_calls: AtomicUsize,
    pub power_on_failures: AtomicUsize,
    pub delete_calls: AtomicUsize,
    pub vanished: Mutex<bool>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            identity: ProviderIdentity::new(SCRIPTED_SLUG, "Scripted Cloud"),
            features: FeatureSet::none()
                .with(Feature::Resize)
                .with(Feature::Snapshots)
                .with(Feature::TestConnection),
            details_states: Mutex::new(VecDeque::new()),
            resize_progress: Mutex::new(VecDeque::new()),
            create_calls: AtomicUsize::new(0),
            power_on_calls: AtomicUsize::new(0),
            power_on_failures: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
            vanished: Mutex::new(false),
        }
    }

    pub fn script_details(&self, states: &[ServerState]) {
        self.details_states.lock().unwrap().extend(states.iter().copied());
    }

    pub fn script_resize(&self, progress: &[ResizeProgress]) {
        self.resize_progress.lock().unwrap().extend(progress.iter().copied());
    }

    /// All further lookups report the instance as gone
    pub fn vanish(&self) {
        *self.vanished.lock().unwrap() = true;
    }

    /// Make the next `count` power-on calls fail with a transport error
    pub fn fail_power_on(&self, count: usize) {
        self.power_on_failures.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl ServerProvider for ScriptedProvider {
    fn identity(&self) -> &ProviderIdentity {
        &self.identity
    }

    fn features(&self) -> &FeatureSet {
        &self.features
    }

    async fn sizes(&self) -> siteflow_cloud::Result<Vec<SizeInfo>> {
        Ok(vec![SizeInfo {
            slug: "small".to_string(),
            description: "1 vCPU / 1 GB".to_string(),
        }])
    }

    async fn regions(&self) -> siteflow_cloud::Result<Vec<RegionInfo>> {
        Ok(vec![RegionInfo {
            slug: "r1".to_string(),
            description: "Region 1".to_string(),
        }])
    }

    async fn ssh_keys(&self) -> siteflow_cloud::Result<Vec<SshKeyInfo>> {
        Ok(Vec::new())
    }

    async fn create(
        &self,
        _request: &CreateServerRequest,
    ) -> siteflow_cloud::Result<CreatedServer> {
        let n = self.create_calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(CreatedServer {
            instance_id: format!("inst-{}", n),
            created_at: chrono::Utc::now(),
            ipv4: Some("203.0.113.99".to_string()),
            ipv6: None,
        })
    }

    async fn details(&self, instance_id: &str) -> siteflow_cloud::Result<ServerDetails> {
        if *self.vanished.lock().unwrap() {
            return Err(CloudError::InstanceNotFound(instance_id.to_string()));
        }
        let state = self
            .details_states
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ServerState::Active);
        Ok(ServerDetails {
            state,
            ipv4: Some("203.0.113.99".to_string()),
            ipv6: None,
            os: Some("Ubuntu 22.04".to_string()),
        })
    }

    async fn reboot(&self, _instance_id: &str) -> siteflow_cloud::Result<ServerState> {
        Ok(ServerState::Active)
    }

    async fn power_off(&self, _instance_id: &str) -> siteflow_cloud::Result<ServerState> {
        Ok(ServerState::Off)
    }

    async fn power_on(&self, _instance_id: &str) -> siteflow_cloud::Result<ServerState> {
        if self
            .power_on_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(CloudError::Transport("connection reset".to_string()));
        }
        self.power_on_calls.fetch_add(1, Ordering::SeqCst);
        Ok(ServerState::Active)
    }

    async fn delete(&self, instance_id: &str) -> siteflow_cloud::Result<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if *self.vanished.lock().unwrap() {
            return Err(CloudError::InstanceNotFound(instance_id.to_string()));
        }
        Ok(())
    }

    async fn resize(
        &self,
        _instance_id: &str,
        _new_size: &str,
    ) -> siteflow_cloud::Result<ResizeStarted> {
        Ok(ResizeStarted {
            action_id: "act-1".to_string(),
        })
    }

    async fn resize_status(
        &self,
        _instance_id: &str,
        _action_id: &str,
    ) -> siteflow_cloud::Result<ResizeProgress> {
        Ok(self
            .resize_progress
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ResizeProgress::InProgress))
    }

    async fn test_connection(&self) -> siteflow_cloud::Result<ConnectionStatus> {
        Ok(ConnectionStatus::ok("scripted account"))
    }
}

/// Executor that records every command instead of opening connections
#[derive(Default)]
pub struct RecordingExecutor {
    pub commands: Mutex<Vec<String>>,
    pub fail_next: Mutex<bool>,
}

impl RecordingExecutor {
    pub fn exec_count(&self) -> usize {
        self.commands.lock().unwrap().len()
    }
}

#[async_trait]
impl RemoteExecutor for RecordingExecutor {
    async fn exec(
        &self,
        _host: &str,
        command: &str,
        _auth: &SshAuth,
        _action_tag: &str,
        _record_id: Uuid,
    ) -> Result<ExecOutcome> {
        self.commands.lock().unwrap().push(command.to_string());
        let failed = std::mem::take(&mut *self.fail_next.lock().unwrap());
        Ok(ExecOutcome {
            success: !failed,
            output: if failed { "boom".to_string() } else { String::new() },
        })
    }

    async fn download(&self, _: &str, _: &str, _: &SshAuth) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, to: &str, subject: &str, _body: &str) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), subject.to_string()));
        Ok(())
    }
}

/// Fully wired engine over the in-memory store
pub struct Harness {
    pub provider: Arc<ScriptedProvider>,
    pub store: Arc<MemoryStore>,
    pub executor: Arc<RecordingExecutor>,
    pub notifier: Arc<RecordingNotifier>,
    pub orchestrator: Arc<Orchestrator>,
    pub queue: Arc<TaskQueue>,
    pub services: Services,
    pub scheduler: DeferredActionScheduler,
}

impl Harness {
    pub fn new() -> Self {
        let provider = Arc::new(ScriptedProvider::new());

        let mut registry = ProviderRegistry::new();
        registry.register(provider.clone());
        let custom = CustomServerConfig::new("custom-server", "Custom Server", "198.51.100.7");
        registry.register(Arc::new(CustomServerProvider::new(custom).unwrap()));

        let store = Arc::new(MemoryStore::new());
        let executor = Arc::new(RecordingExecutor::default());
        let notifier = Arc::new(RecordingNotifier::default());

        let orchestrator = Arc::new(Orchestrator::new(
            registry,
            store.clone(),
            executor.clone(),
            notifier.clone(),
        ));

        let mut queue = TaskQueue::new(store.clone());
        queue.register_hook(
            services::TASK_CREATE_SERVER,
            Arc::new(CreateServerHook::new(orchestrator.clone())),
        );
        queue.register_hook(
            services::TASK_DELETE_SERVER,
            Arc::new(DeleteServerHook::new(orchestrator.clone())),
        );
        queue.register_hook(
            services::TASK_SITE_ACTION,
            Arc::new(SiteActionHook::new(orchestrator.clone())),
        );
        queue.register_hook(
            services::TASK_CHANGE_DOMAIN,
            Arc::new(ChangeDomainHook::new(orchestrator.clone())),
        );
        queue.register_hook(
            services::TASK_CLONE_SITE,
            Arc::new(CloneSiteHook::new(orchestrator.clone())),
        );
        queue.register_hook(
            services::TASK_INSTALL_WP,
            Arc::new(InstallWpHook::new(orchestrator.clone())),
        );
        let queue = Arc::new(queue);

        let services = Services::new(orchestrator.clone(), queue.clone(), store.clone());
        let scheduler = DeferredActionScheduler::new(orchestrator.clone(), store.clone());

        Self {
            provider,
            store,
            executor,
            notifier,
            orchestrator,
            queue,
            services,
            scheduler,
        }
    }
}
