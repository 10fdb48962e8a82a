//! DigitalOcean provider implementation

use crate::api::{CreateDropletRequest, DoApi};
use crate::images;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use siteflow_cloud::{
    CloudError, ConnectionStatus, CreateServerRequest, CreatedServer, Feature, FeatureSet,
    ProviderIdentity, RegionInfo, ResizeProgress, ResizeStarted, ResponseCache, Result,
    ServerDetails, ServerProvider, ServerState, SizeInfo, SnapshotInfo, SnapshotStarted,
    SshKeyInfo, credential_hash,
};
use std::sync::Arc;

/// Normalize a DigitalOcean droplet status string
///
/// Total over the provider's vocabulary: anything unrecognized maps to
/// `Unknown`, never an error.
pub fn map_status(status: &str) -> ServerState {
    match status {
        "new" => ServerState::New,
        "active" => ServerState::Active,
        "off" => ServerState::Off,
        "archive" => ServerState::Errored,
        _ => ServerState::Unknown,
    }
}

/// DigitalOcean provider adapter
pub struct DigitalOceanProvider {
    identity: ProviderIdentity,
    features: FeatureSet,
    api: DoApi,
    cache: Option<Arc<ResponseCache>>,
    credential_hash: String,
}

impl DigitalOceanProvider {
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let token = token.into();
        Ok(Self {
            identity: ProviderIdentity::new("digitalocean", "DigitalOcean"),
            features: FeatureSet::none()
                .with(Feature::Snapshots)
                .with(Feature::Resize)
                .with(Feature::SshCreate)
                .with(Feature::TestConnection)
                .with(Feature::Backups)
                .with(Feature::DynamicSizes)
                .with(Feature::DynamicRegions),
            credential_hash: credential_hash(&token),
            api: DoApi::new(token).map_err(CloudError::from)?,
            cache: None,
        })
    }

    /// Route list-style queries through the shared response cache
    pub fn with_cache(mut self, cache: Arc<ResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Point the API client at an alternate endpoint (tests, mocks)
    pub fn with_base_url(token: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let token = token.into();
        let mut provider = Self::new(token.clone())?;
        provider.api = DoApi::with_base_url(token, base_url).map_err(CloudError::from)?;
        Ok(provider)
    }

    async fn cached_get(&self, method: &str) -> Option<serde_json::Value> {
        match &self.cache {
            Some(cache) => {
                cache
                    .get(&self.identity.slug, &self.credential_hash, method)
                    .await
            }
            None => None,
        }
    }

    async fn cached_put(&self, method: &str, value: serde_json::Value) {
        if let Some(cache) = &self.cache {
            cache
                .put(&self.identity.slug, &self.credential_hash, method, value)
                .await;
        }
    }
}

#[async_trait]
impl ServerProvider for DigitalOceanProvider {
    fn identity(&self) -> &ProviderIdentity {
        &self.identity
    }

    fn features(&self) -> &FeatureSet {
        &self.features
    }

    async fn sizes(&self) -> Result<Vec<SizeInfo>> {
        // Credential guard first, so a misconfigured provider never reaches
        // the network or the cache
        self.api.ensure_token().map_err(CloudError::from)?;

        if let Some(hit) = self.cached_get("sizes").await {
            return Ok(serde_json::from_value(hit)?);
        }

        let sizes: Vec<SizeInfo> = self
            .api
            .list_sizes()
            .await
            .map_err(CloudError::from)?
            .into_iter()
            .filter(|s| s.available)
            .map(|s| SizeInfo {
                description: s.description(),
                slug: s.slug,
            })
            .collect();

        self.cached_put("sizes", serde_json::to_value(&sizes)?).await;
        Ok(sizes)
    }

    async fn regions(&self) -> Result<Vec<RegionInfo>> {
        self.api.ensure_token().map_err(CloudError::from)?;

        if let Some(hit) = self.cached_get("regions").await {
            return Ok(serde_json::from_value(hit)?);
        }

        let regions: Vec<RegionInfo> = self
            .api
            .list_regions()
            .await
            .map_err(CloudError::from)?
            .into_iter()
            .filter(|r| r.available)
            .map(|r| RegionInfo {
                slug: r.slug,
                description: r.name,
            })
            .collect();

        self.cached_put("regions", serde_json::to_value(&regions)?).await;
        Ok(regions)
    }

    async fn ssh_keys(&self) -> Result<Vec<SshKeyInfo>> {
        self.api.ensure_token().map_err(CloudError::from)?;

        if let Some(hit) = self.cached_get("ssh_keys").await {
            return Ok(serde_json::from_value(hit)?);
        }

        let keys: Vec<SshKeyInfo> = self
            .api
            .list_keys()
            .await
            .map_err(CloudError::from)?
            .into_iter()
            .map(|k| SshKeyInfo {
                id: k.id.to_string(),
                name: k.name,
                fingerprint: k.fingerprint,
            })
            .collect();

        self.cached_put("ssh_keys", serde_json::to_value(&keys)?).await;
        Ok(keys)
    }

    async fn create(&self, request: &CreateServerRequest) -> Result<CreatedServer> {
        let body = CreateDropletRequest {
            name: request.name.clone(),
            region: request.region.clone(),
            size: request.size.clone(),
            image: images::image_for(request.initial_os.as_deref()).to_string(),
            ssh_keys: request.ssh_key_id.iter().cloned().collect(),
            backups: request.backups,
            ipv6: true,
            user_data: request.startup_script.clone(),
            tags: request.tags.clone(),
        };

        let droplet = self.api.create_droplet(&body).await.map_err(CloudError::from)?;
        tracing::info!(droplet_id = droplet.id, name = %droplet.name, "Created droplet");

        let created_at = droplet
            .created_at
            .parse::<DateTime<Utc>>()
            .unwrap_or_else(|_| Utc::now());

        Ok(CreatedServer {
            instance_id: droplet.id.to_string(),
            created_at,
            ipv4: droplet.public_ipv4(),
            ipv6: droplet.public_ipv6(),
        })
    }

    async fn details(&self, instance_id: &str) -> Result<ServerDetails> {
        let droplet = self.api.get_droplet(instance_id).await.map_err(CloudError::from)?;

        Ok(ServerDetails {
            state: map_status(&droplet.status),
            ipv4: droplet.public_ipv4(),
            ipv6: droplet.public_ipv6(),
            os: droplet.os_description(),
        })
    }

    async fn reboot(&self, instance_id: &str) -> Result<ServerState> {
        self.api
            .droplet_action(instance_id, "reboot", serde_json::json!({}))
            .await
            .map_err(CloudError::from)?;
        Ok(ServerState::InProgress)
    }

    async fn power_off(&self, instance_id: &str) -> Result<ServerState> {
        self.api
            .droplet_action(instance_id, "power_off", serde_json::json!({}))
            .await
            .map_err(CloudError::from)?;
        Ok(ServerState::Off)
    }

    async fn power_on(&self, instance_id: &str) -> Result<ServerState> {
        self.api
            .droplet_action(instance_id, "power_on", serde_json::json!({}))
            .await
            .map_err(CloudError::from)?;
        Ok(ServerState::InProgress)
    }

    async fn delete(&self, instance_id: &str) -> Result<()> {
        self.api.delete_droplet(instance_id).await.map_err(CloudError::from)?;
        tracing::info!(instance_id, "Deleted droplet");
        Ok(())
    }

    async fn resize(&self, instance_id: &str, new_size: &str) -> Result<ResizeStarted> {
        // DigitalOcean powers the droplet off for a cold resize; the
        // orchestrator polls the returned action and restarts the droplet
        // once the resize completes
        let action = self
            .api
            .droplet_action(
                instance_id,
                "resize",
                serde_json::json!({ "size": new_size, "disk": false }),
            )
            .await
            .map_err(CloudError::from)?;

        tracing::info!(instance_id, action_id = action.id, new_size, "Resize started");
        Ok(ResizeStarted {
            action_id: action.id.to_string(),
        })
    }

    async fn resize_status(&self, instance_id: &str, action_id: &str) -> Result<ResizeProgress> {
        let action = self
            .api
            .get_action(instance_id, action_id)
            .await
            .map_err(CloudError::from)?;

        Ok(match action.status.as_str() {
            "completed" => ResizeProgress::Completed,
            "errored" => ResizeProgress::Errored,
            _ => ResizeProgress::InProgress,
        })
    }

    async fn snapshot(&self, instance_id: &str) -> Result<SnapshotStarted> {
        let action = self
            .api
            .droplet_action(
                instance_id,
                "snapshot",
                serde_json::json!({ "name": format!("siteflow-{}", Utc::now().format("%Y%m%d%H%M%S")) }),
            )
            .await
            .map_err(CloudError::from)?;

        Ok(SnapshotStarted {
            action_id: action.id.to_string(),
        })
    }

    async fn list_snapshots(&self) -> Result<Vec<SnapshotInfo>> {
        let snapshots = self.api.list_snapshots().await.map_err(CloudError::from)?;
        Ok(snapshots
            .into_iter()
            .map(|s| SnapshotInfo {
                id: s.id,
                name: s.name,
                created_at: s
                    .created_at
                    .and_then(|t| t.parse::<DateTime<Utc>>().ok()),
            })
            .collect())
    }

    async fn ssh_create(&self, name: &str, public_key: &str) -> Result<SshKeyInfo> {
        let key = self
            .api
            .create_key(name, public_key)
            .await
            .map_err(CloudError::from)?;

        Ok(SshKeyInfo {
            id: key.id.to_string(),
            name: key.name,
            fingerprint: key.fingerprint,
        })
    }

    async fn test_connection(&self) -> Result<ConnectionStatus> {
        match self.api.account().await {
            Ok(account) => Ok(ConnectionStatus::ok(account.email)),
            Err(e) => Ok(ConnectionStatus::failed(e.to_string())),
        }
    }
}
