//! Cloud provider trait definition

use crate::error::{CloudError, Result};
use crate::state::ServerState;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Immutable identity of a provider instance
///
/// The slug is the stable namespace used for cache keys, configuration
/// lookups, and server records. Custom servers cloned from a real
/// provider's billing metadata carry that provider in `base_provider`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderIdentity {
    /// Unique, stable slug (e.g., "digitalocean", "custom-server")
    pub slug: String,

    /// Friendly name for UI and logs
    pub display_name: String,

    /// Slug of the real provider this one is derived from, if any
    pub base_provider: Option<String>,

    /// Cosmetic prefix for region labels
    pub region_prefix: Option<String>,

    /// Root login override; defaults to "root" when unset
    pub root_user: Option<String>,
}

impl ProviderIdentity {
    pub fn new(slug: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            display_name: display_name.into(),
            base_provider: None,
            region_prefix: None,
            root_user: None,
        }
    }

    pub fn with_base_provider(mut self, base: impl Into<String>) -> Self {
        self.base_provider = Some(base.into());
        self
    }

    pub fn with_region_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.region_prefix = Some(prefix.into());
        self
    }

    pub fn with_root_user(mut self, user: impl Into<String>) -> Self {
        self.root_user = Some(user.into());
        self
    }

    /// Login user for post-provision commands
    pub fn root_user(&self) -> &str {
        self.root_user.as_deref().unwrap_or("root")
    }
}

/// Optional provider capabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Snapshots,
    Resize,
    SshCreate,
    TestConnection,
    Backups,
    CustomImages,
    DynamicSizes,
    DynamicRegions,
}

/// Set of capabilities a provider declares at construction
///
/// Orchestration logic must consult this before invoking a capability-gated
/// operation; an unsupported call returns `CloudError::Unsupported` instead
/// of silently doing nothing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureSet {
    features: BTreeSet<Feature>,
}

impl FeatureSet {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with(mut self, feature: Feature) -> Self {
        self.features.insert(feature);
        self
    }

    pub fn supports(&self, feature: Feature) -> bool {
        self.features.contains(&feature)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.features.iter()
    }
}

/// Request to provision a new instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateServerRequest {
    /// Instance name / hostname
    pub name: String,

    /// Provider region code
    pub region: String,

    /// Provider size code
    pub size: String,

    /// Internal OS token (e.g., "ubuntu2204lts"); adapters map this to
    /// their own image identifier
    pub initial_os: Option<String>,

    /// Provider-side SSH key reference
    pub ssh_key_id: Option<String>,

    /// Free-form startup script run by the provider on first boot
    pub startup_script: Option<String>,

    /// Enable provider-side backups where supported
    pub backups: bool,

    /// Provider-side tags
    pub tags: Vec<String>,
}

impl CreateServerRequest {
    pub fn new(
        name: impl Into<String>,
        region: impl Into<String>,
        size: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            region: region.into(),
            size: size.into(),
            initial_os: None,
            ssh_key_id: None,
            startup_script: None,
            backups: false,
            tags: Vec::new(),
        }
    }
}

/// Result of a successful create
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedServer {
    /// Provider-assigned instance id
    pub instance_id: String,

    /// Provider-side creation timestamp
    pub created_at: DateTime<Utc>,

    /// Assigned IPv4, if already known
    pub ipv4: Option<String>,

    /// Assigned IPv6, if available
    pub ipv6: Option<String>,
}

/// Normalized details of an existing instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerDetails {
    pub state: ServerState,
    pub ipv4: Option<String>,
    pub ipv6: Option<String>,
    /// Human-readable OS description, if the provider reports one
    pub os: Option<String>,
}

/// Size offered by a provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizeInfo {
    /// Provider size code (e.g., "s-1vcpu-1gb")
    pub slug: String,
    /// Display label
    pub description: String,
}

/// Region offered by a provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionInfo {
    pub slug: String,
    pub description: String,
}

/// SSH key registered with a provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshKeyInfo {
    pub id: String,
    pub name: String,
    pub fingerprint: Option<String>,
}

/// Asynchronous resize accepted by the provider
///
/// The action id is ephemeral operation-tracking state and must never be
/// cached; the orchestrator persists it on the server record and polls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResizeStarted {
    pub action_id: String,
}

/// Progress of a previously issued resize
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResizeProgress {
    InProgress,
    Completed,
    Errored,
}

/// Snapshot request accepted by the provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotStarted {
    pub action_id: String,
}

/// Snapshot known to a provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotInfo {
    pub id: String,
    pub name: String,
    pub created_at: Option<DateTime<Utc>>,
}

/// Result of a connection test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionStatus {
    /// Whether credentials are valid
    pub connected: bool,

    /// Account information if available
    pub account_info: Option<String>,

    /// Error message if not connected
    pub error: Option<String>,
}

impl ConnectionStatus {
    pub fn ok(account_info: impl Into<String>) -> Self {
        Self {
            connected: true,
            account_info: Some(account_info.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            connected: false,
            account_info: None,
            error: Some(error.into()),
        }
    }
}

/// Cloud provider abstraction trait
///
/// All providers (DigitalOcean, custom/self-hosted servers, etc.) implement
/// this trait to give the orchestrator one polymorphic surface. Adapters
/// backed by a real API must return `CloudError::MissingCredentials` before
/// any network I/O when credentials are absent, and must map unrecognized
/// provider status strings to `ServerState::Unknown` rather than failing.
#[async_trait]
pub trait ServerProvider: Send + Sync {
    /// Stable identity; set once at construction
    fn identity(&self) -> &ProviderIdentity;

    /// Declared capabilities; set once at construction
    fn features(&self) -> &FeatureSet;

    /// List available instance sizes. Cacheable.
    async fn sizes(&self) -> Result<Vec<SizeInfo>>;

    /// List available regions. Cacheable.
    async fn regions(&self) -> Result<Vec<RegionInfo>>;

    /// List registered SSH keys. Cacheable.
    async fn ssh_keys(&self) -> Result<Vec<SshKeyInfo>>;

    /// Provision a new instance
    async fn create(&self, request: &CreateServerRequest) -> Result<CreatedServer>;

    /// Fetch current normalized state and addresses
    async fn details(&self, instance_id: &str) -> Result<ServerDetails>;

    /// Reboot the instance
    async fn reboot(&self, instance_id: &str) -> Result<ServerState>;

    /// Power the instance off
    async fn power_off(&self, instance_id: &str) -> Result<ServerState>;

    /// Power the instance on
    async fn power_on(&self, instance_id: &str) -> Result<ServerState>;

    /// Destroy the instance
    async fn delete(&self, instance_id: &str) -> Result<()>;

    /// Start an asynchronous resize. Gated on `Feature::Resize`.
    ///
    /// Providers may power the instance off as a side effect; completion is
    /// detected by polling `resize_status` and the instance restarted by
    /// the orchestrator once the resize finishes.
    async fn resize(&self, instance_id: &str, new_size: &str) -> Result<ResizeStarted> {
        let _ = (instance_id, new_size);
        Err(CloudError::unsupported(&self.identity().slug, "resize"))
    }

    /// Query a previously issued resize. Gated on `Feature::Resize`.
    async fn resize_status(&self, instance_id: &str, action_id: &str) -> Result<ResizeProgress> {
        let _ = (instance_id, action_id);
        Err(CloudError::unsupported(&self.identity().slug, "resize_status"))
    }

    /// Take a snapshot. Gated on `Feature::Snapshots`.
    async fn snapshot(&self, instance_id: &str) -> Result<SnapshotStarted> {
        let _ = instance_id;
        Err(CloudError::unsupported(&self.identity().slug, "snapshot"))
    }

    /// List all snapshots. Gated on `Feature::Snapshots`.
    async fn list_snapshots(&self) -> Result<Vec<SnapshotInfo>> {
        Err(CloudError::unsupported(&self.identity().slug, "list_snapshots"))
    }

    /// Register a public key with the provider. Gated on `Feature::SshCreate`.
    async fn ssh_create(&self, name: &str, public_key: &str) -> Result<SshKeyInfo> {
        let _ = (name, public_key);
        Err(CloudError::unsupported(&self.identity().slug, "ssh_create"))
    }

    /// Verify credentials. Gated on `Feature::TestConnection`.
    async fn test_connection(&self) -> Result<ConnectionStatus> {
        Err(CloudError::unsupported(&self.identity().slug, "test_connection"))
    }
}
