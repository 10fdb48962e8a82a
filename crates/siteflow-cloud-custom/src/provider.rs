//! Simulated provider implementation

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use siteflow_cloud::{
    CloudError, ConnectionStatus, CreateServerRequest, CreatedServer, Feature, FeatureSet,
    ProviderIdentity, RegionInfo, Result, ServerDetails, ServerProvider, ServerState, SizeInfo,
    SshKeyInfo,
};

/// Configuration for one custom provider instance
///
/// Variants that used to differ only in labels are expressed as different
/// config values, not different types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomServerConfig {
    /// Stable provider slug (e.g., "custom-server")
    pub slug: String,

    /// Friendly name
    pub name: String,

    /// Real provider whose billing/region metadata this server was cloned
    /// from, if any
    pub base_provider: Option<String>,

    /// Cosmetic region disambiguation prefix
    pub region_prefix: Option<String>,

    /// Static IPv4 the server answers on
    pub ipv4: String,

    /// Static IPv6, if configured
    pub ipv6: Option<String>,

    /// Alternate root login for post-provision commands
    pub root_user: Option<String>,

    /// Display-only region label
    pub region_label: String,

    /// Display-only size labels
    pub size_labels: Vec<String>,

    /// Display-only SSH key label
    pub ssh_key_label: String,

    /// Link to the hosting dashboard, shown in listings
    pub dashboard_url: Option<String>,
}

impl CustomServerConfig {
    pub fn new(slug: impl Into<String>, name: impl Into<String>, ipv4: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            name: name.into(),
            base_provider: None,
            region_prefix: None,
            ipv4: ipv4.into(),
            ipv6: None,
            root_user: None,
            region_label: "Custom Server Region".to_string(),
            size_labels: vec!["small".to_string(), "medium".to_string(), "large".to_string()],
            ssh_key_label: "Pre-installed key".to_string(),
            dashboard_url: None,
        }
    }
}

/// Provider adapter for operator-managed servers
#[derive(Debug)]
pub struct CustomServerProvider {
    identity: ProviderIdentity,
    features: FeatureSet,
    config: CustomServerConfig,
}

impl CustomServerProvider {
    pub fn new(config: CustomServerConfig) -> Result<Self> {
        if config.ipv4.trim().is_empty() {
            return Err(CloudError::MissingCredentials(format!(
                "custom provider {} has no IP configured",
                config.slug
            )));
        }

        let mut identity = ProviderIdentity::new(&config.slug, &config.name);
        if let Some(base) = &config.base_provider {
            identity = identity.with_base_provider(base);
        }
        if let Some(prefix) = &config.region_prefix {
            identity = identity.with_region_prefix(prefix);
        }
        if let Some(user) = &config.root_user {
            identity = identity.with_root_user(user);
        }

        // No real backend: only the connection test is meaningful
        let features = FeatureSet::none().with(Feature::TestConnection);

        Ok(Self {
            identity,
            features,
            config,
        })
    }

    fn region_slug(&self) -> String {
        match &self.config.region_prefix {
            Some(prefix) => format!("{}-region", prefix),
            None => format!("{}-region", self.config.slug),
        }
    }
}

#[async_trait]
impl ServerProvider for CustomServerProvider {
    fn identity(&self) -> &ProviderIdentity {
        &self.identity
    }

    fn features(&self) -> &FeatureSet {
        &self.features
    }

    async fn sizes(&self) -> Result<Vec<SizeInfo>> {
        Ok(self
            .config
            .size_labels
            .iter()
            .map(|label| SizeInfo {
                slug: label.clone(),
                description: label.clone(),
            })
            .collect())
    }

    async fn regions(&self) -> Result<Vec<RegionInfo>> {
        Ok(vec![RegionInfo {
            slug: self.region_slug(),
            description: self.config.region_label.clone(),
        }])
    }

    async fn ssh_keys(&self) -> Result<Vec<SshKeyInfo>> {
        Ok(vec![SshKeyInfo {
            id: format!("{}-key", self.config.slug),
            name: self.config.ssh_key_label.clone(),
            fingerprint: None,
        }])
    }

    async fn create(&self, request: &CreateServerRequest) -> Result<CreatedServer> {
        // Nothing to provision; mint an instance id and report the static IP
        let instance_id: u64 = rand::thread_rng().gen_range(10_000_000..100_000_000);
        tracing::debug!(
            provider = %self.identity.slug,
            name = %request.name,
            instance_id,
            "Simulated server creation"
        );

        Ok(CreatedServer {
            instance_id: instance_id.to_string(),
            created_at: Utc::now(),
            ipv4: Some(self.config.ipv4.clone()),
            ipv6: self.config.ipv6.clone(),
        })
    }

    async fn details(&self, _instance_id: &str) -> Result<ServerDetails> {
        Ok(ServerDetails {
            state: ServerState::Active,
            ipv4: Some(self.config.ipv4.clone()),
            ipv6: self.config.ipv6.clone(),
            os: Some("Operator-managed".to_string()),
        })
    }

    async fn reboot(&self, _instance_id: &str) -> Result<ServerState> {
        Ok(ServerState::Active)
    }

    async fn power_off(&self, _instance_id: &str) -> Result<ServerState> {
        // The box is outside our control; report what the contract expects
        Ok(ServerState::Off)
    }

    async fn power_on(&self, _instance_id: &str) -> Result<ServerState> {
        Ok(ServerState::Active)
    }

    async fn delete(&self, instance_id: &str) -> Result<()> {
        tracing::debug!(
            provider = %self.identity.slug,
            instance_id,
            "Simulated server deletion"
        );
        Ok(())
    }

    async fn test_connection(&self) -> Result<ConnectionStatus> {
        Ok(ConnectionStatus::ok(format!(
            "static host {}",
            self.config.ipv4
        )))
    }
}
