//! SiteFlow cloud provider abstraction
//!
//! This crate defines the contract every cloud provider adapter implements,
//! plus the pieces shared by all adapters: the canonical server state enum,
//! the response cache for idempotent provider queries, and the provider
//! registry used for dependency injection.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │            siteflow-orchestrator                 │
//! │        (lifecycle actions, scheduler)            │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │               siteflow-cloud                     │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │          Provider Abstraction             │   │
//! │  │  trait ServerProvider { ... }             │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────────┐  ┌──────────────┐            │
//! │  │   Registry   │  │    Cache     │            │
//! │  └──────────────┘  └──────────────┘            │
//! └───────┬─────────────────┬───────────────────────┘
//!         │                 │
//! ┌───────▼───────┐ ┌───────▼───────┐
//! │ digitalocean  │ │ custom-server │
//! │   provider    │ │   provider    │
//! └───────────────┘ └───────────────┘
//! ```

pub mod cache;
pub mod error;
pub mod provider;
pub mod registry;
pub mod state;

// Re-exports
pub use cache::{CacheConfig, Clock, ManualClock, ResponseCache, SystemClock, credential_hash};
pub use error::{CloudError, Result};
pub use provider::{
    ConnectionStatus, CreateServerRequest, CreatedServer, Feature, FeatureSet, ProviderIdentity,
    RegionInfo, ResizeProgress, ResizeStarted, ServerDetails, ServerProvider, SizeInfo,
    SnapshotInfo, SnapshotStarted, SshKeyInfo,
};
pub use registry::ProviderRegistry;
pub use state::ServerState;
