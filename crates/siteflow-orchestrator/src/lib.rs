//! SiteFlow orchestration engine
//!
//! Drives long-running server lifecycle workflows without blocking the
//! caller: an action is issued, its continuation is stored on the server
//! record, and background ticks re-drive the orchestrator until the
//! workflow reaches a terminal state. All cross-tick state lives in the
//! persisted records, so the engine is crash-safe and restartable.
//!
//! Two background mechanisms coexist:
//!
//! - the deferred-action scheduler re-runs the named continuation stored
//!   on a server record (`after-server-create-commands` → `email` → done);
//! - the pending task queue drains durable tasks enqueued by the service
//!   entry points (install WordPress, change domain, clone site, ...).

pub mod action;
pub mod error;
pub mod notify;
pub mod orchestrator;
pub mod queue;
pub mod scheduler;
pub mod services;
pub mod ssh;
pub mod workflows;

// Re-exports
pub use action::{ActionParams, InstanceAction};
pub use error::{OrchestratorError, Result};
pub use notify::{LogNotifier, Notifier};
pub use orchestrator::Orchestrator;
pub use queue::{DrainReport, TaskHook, TaskQueue, TransitionObserver};
pub use scheduler::{DeferredActionScheduler, TickReport};
pub use services::{
    ChangeDomainPayload, CloneSitePayload, CreateServerParams, CreateServerResponse,
    InstallWpPayload, Services, SiteActionPayload,
};
pub use ssh::{ExecOutcome, OpenSshExecutor, RemoteExecutor, SshAuth};
pub use workflows::{
    ChangeDomainHook, CloneSiteHook, CreateServerHook, DeleteServerHook, InstallWpHook,
    SiteActionHook,
};
