//! Deferred-action scheduler
//!
//! Multi-step workflows park their next step on the server record
//! (`pending_action` + `ActionStatus::InProgress`) instead of blocking a
//! request. The scheduler re-drives those records on a fixed interval until
//! a terminal step clears the deferred-action fields.

use crate::action::{ActionParams, InstanceAction};
use crate::error::Result;
use crate::orchestrator::Orchestrator;
use siteflow_core::{ActionStatus, RecordStore, ServerRecord};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(60);

/// Outcome of one scheduler tick
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub picked_up: usize,
    pub succeeded: usize,
    pub failed: usize,
}

pub struct DeferredActionScheduler {
    orchestrator: Arc<Orchestrator>,
    store: Arc<dyn RecordStore>,
    interval: Duration,
}

impl DeferredActionScheduler {
    pub fn new(orchestrator: Arc<Orchestrator>, store: Arc<dyn RecordStore>) -> Self {
        Self {
            orchestrator,
            store,
            interval: DEFAULT_TICK_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Process every record with a pending deferred action once
    ///
    /// Failures are isolated per record: the error lands on the record via
    /// the orchestrator and the tick moves on. A record whose step is still
    /// waiting (e.g. the instance is not active yet) keeps its pending
    /// action and is picked up again next tick.
    pub async fn tick(&self) -> Result<TickReport> {
        let pending = self
            .store
            .servers_with_action_status(ActionStatus::InProgress)
            .await?;

        let mut report = TickReport::default();
        for record in pending {
            report.picked_up += 1;
            match self.drive(&record).await {
                Ok(()) => report.succeeded += 1,
                Err(e) => {
                    tracing::warn!(server = %record.id, error = %e, "Deferred action failed");
                    report.failed += 1;
                }
            }
        }

        if report.picked_up > 0 {
            tracing::debug!(
                picked_up = report.picked_up,
                succeeded = report.succeeded,
                failed = report.failed,
                "Scheduler tick done"
            );
        }
        Ok(report)
    }

    async fn drive(&self, record: &ServerRecord) -> Result<()> {
        let Some(name) = record.pending_action.as_deref() else {
            // Status said in-progress but no action is named; repair the
            // record so it stops matching the query
            let mut repaired = record.clone();
            repaired.clear_deferred_action();
            repaired.audit("cleared dangling action status");
            self.store.update_server(repaired).await?;
            return Ok(());
        };

        let action = match InstanceAction::from_str(name) {
            Ok(action) => action,
            Err(e) => {
                // Unparseable action would spin forever; park the record
                // with the error instead
                let mut broken = record.clone();
                broken.error = Some(e.to_string());
                broken.clear_deferred_action();
                broken.audit(format!("dropped unknown deferred action '{}'", name));
                self.store.update_server(broken).await?;
                return Err(e);
            }
        };

        self.orchestrator
            .do_instance_action(record.id, action, &ActionParams::default())
            .await?;
        Ok(())
    }

    /// Drive ticks forever on the configured interval
    pub async fn run(&self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if let Err(e) = self.tick().await {
                tracing::error!(error = %e, "Scheduler tick errored");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::Notifier;
    use crate::ssh::{ExecOutcome, RemoteExecutor, SshAuth};
    use async_trait::async_trait;
    use siteflow_cloud::ProviderRegistry;
    use siteflow_cloud_custom::{CustomServerConfig, CustomServerProvider};
    use siteflow_core::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    struct OkExecutor;

    #[async_trait]
    impl RemoteExecutor for OkExecutor {
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

    #[derive(Default)]
    struct CountingNotifier {
        sent: AtomicUsize,
    }

    #[async_trait]
    impl Notifier for CountingNotifier {
        async fn send(&self, _to: &str, _subject: &str, _body: &str) -> Result<()> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn scheduler() -> (
        DeferredActionScheduler,
        Arc<MemoryStore>,
        Arc<CountingNotifier>,
    ) {
        let mut registry = ProviderRegistry::new();
        let config = CustomServerConfig::new("custom-server", "Custom Server", "198.51.100.7");
        registry.register(Arc::new(
            CustomServerProvider::new(config).expect("valid config"),
        ));

        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(CountingNotifier::default());
        let orchestrator = Arc::new(Orchestrator::new(
            registry,
            store.clone(),
            Arc::new(OkExecutor),
            notifier.clone(),
        ));
        let scheduler =
            DeferredActionScheduler::new(orchestrator, store.clone());
        (scheduler, store, notifier)
    }

    #[tokio::test]
    async fn test_tick_drives_email_step_and_is_idempotent() {
        let (scheduler, store, notifier) = scheduler();

        let mut record =
            ServerRecord::new("site1", "custom-server", "custom-server-region", "small");
        record.instance_id = Some("12345678".to_string());
        record.schedule_action(InstanceAction::Email.as_str());
        let id = record.id;
        store.insert_server(record).await.unwrap();

        let report = scheduler.tick().await.unwrap();
        assert_eq!(report.picked_up, 1);
        assert_eq!(report.succeeded, 1);
        assert_eq!(notifier.sent.load(Ordering::SeqCst), 1);

        let record = store.get_server(id).await.unwrap().unwrap();
        assert_eq!(record.action_status, ActionStatus::Idle);
        assert!(record.pending_action.is_none());

        // Terminal step cleared the deferred action, so another tick has
        // nothing to pick up
        let report = scheduler.tick().await.unwrap();
        assert_eq!(report, TickReport::default());
        assert_eq!(notifier.sent.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_deferred_action_is_dropped_with_error() {
        let (scheduler, store, _notifier) = scheduler();

        let mut record =
            ServerRecord::new("site1", "custom-server", "custom-server-region", "small");
        record.schedule_action("explode");
        let id = record.id;
        store.insert_server(record).await.unwrap();

        let report = scheduler.tick().await.unwrap();
        assert_eq!(report.failed, 1);

        let record = store.get_server(id).await.unwrap().unwrap();
        assert!(record.error.is_some());
        assert_eq!(record.action_status, ActionStatus::Idle);

        // No longer picked up
        let report = scheduler.tick().await.unwrap();
        assert_eq!(report.picked_up, 0);
    }
}
