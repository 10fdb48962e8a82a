//! SiteFlow core data model
//!
//! Server records and pending tasks are the engine's unit of work: all
//! cross-request state lives in them, which keeps the orchestrator and
//! scheduler stateless between ticks and restartable at any point.
//!
//! The `RecordStore` trait is the persistence contract; durable backends
//! live outside this workspace. The in-tree `MemoryStore` backs the daemon
//! in single-node mode and every test.

pub mod error;
pub mod record;
pub mod store;
pub mod task;

// Re-exports
pub use error::{CoreError, Result};
pub use record::{ActionStatus, AuditEntry, PendingResize, ServerRecord};
pub use store::{MemoryStore, RecordStore};
pub use task::{PendingTask, TaskState};
