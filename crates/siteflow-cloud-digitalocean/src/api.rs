//! Typed client for the DigitalOcean v2 REST API

use crate::error::{DigitalOceanError, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.digitalocean.com/v2";

/// Provider calls share the AJAX-era 120 second ceiling
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Thin typed wrapper over the droplet and action endpoints
pub struct DoApi {
    client: reqwest::Client,
    token: String,
    base_url: String,
}

impl DoApi {
    pub fn new(token: impl Into<String>) -> Result<Self> {
        Self::with_base_url(token, DEFAULT_BASE_URL)
    }

    /// Point the client at an alternate endpoint (tests, API mocks)
    ///
    /// Fails if the HTTP client cannot be constructed; a client without
    /// the request timeout is never handed out.
    pub fn with_base_url(token: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            token: token.into(),
            base_url: base_url.into(),
        })
    }

    /// Guard called before every request; avoids network I/O entirely when
    /// no token is configured
    pub fn ensure_token(&self) -> Result<()> {
        if self.token.trim().is_empty() {
            return Err(DigitalOceanError::MissingToken);
        }
        Ok(())
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    async fn parse<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body: ApiErrorBody = response.json().await.unwrap_or_default();
            return Err(DigitalOceanError::Api {
                status: status.as_u16(),
                id: body.id,
                message: body.message,
            });
        }

        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            DigitalOceanError::Malformed(format!("{} (body: {:.200})", e, text))
        })
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.ensure_token()?;
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token)
            .send()
            .await?;
        self.parse(response).await
    }

    async fn post<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<T> {
        self.ensure_token()?;
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;
        self.parse(response).await
    }

    pub async fn list_sizes(&self) -> Result<Vec<Size>> {
        let page: SizesPage = self.get("/sizes?per_page=200").await?;
        Ok(page.sizes)
    }

    pub async fn list_regions(&self) -> Result<Vec<Region>> {
        let page: RegionsPage = self.get("/regions?per_page=200").await?;
        Ok(page.regions)
    }

    pub async fn list_keys(&self) -> Result<Vec<SshKey>> {
        let page: KeysPage = self.get("/account/keys?per_page=200").await?;
        Ok(page.ssh_keys)
    }

    pub async fn account(&self) -> Result<Account> {
        let wrapper: AccountWrapper = self.get("/account").await?;
        Ok(wrapper.account)
    }

    pub async fn create_droplet(&self, request: &CreateDropletRequest) -> Result<Droplet> {
        let wrapper: DropletWrapper = self
            .post("/droplets", serde_json::to_value(request).map_err(|e| {
                DigitalOceanError::Malformed(format!("request serialization: {}", e))
            })?)
            .await?;
        Ok(wrapper.droplet)
    }

    pub async fn get_droplet(&self, id: &str) -> Result<Droplet> {
        let wrapper: DropletWrapper = self.get(&format!("/droplets/{}", id)).await?;
        Ok(wrapper.droplet)
    }

    pub async fn delete_droplet(&self, id: &str) -> Result<()> {
        self.ensure_token()?;
        let response = self
            .client
            .delete(format!("{}/droplets/{}", self.base_url, id))
            .bearer_auth(&self.token)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body: ApiErrorBody = response.json().await.unwrap_or_default();
        Err(DigitalOceanError::Api {
            status: status.as_u16(),
            id: body.id,
            message: body.message,
        })
    }

    /// Issue a droplet action (reboot, power_off, power_on, resize, snapshot)
    pub async fn droplet_action(
        &self,
        id: &str,
        action_type: &str,
        extra: serde_json::Value,
    ) -> Result<DoAction> {
        let mut body = json!({ "type": action_type });
        if let Some(map) = extra.as_object() {
            for (k, v) in map {
                body[k] = v.clone();
            }
        }

        let wrapper: ActionWrapper = self
            .post(&format!("/droplets/{}/actions", id), body)
            .await?;
        Ok(wrapper.action)
    }

    pub async fn get_action(&self, droplet_id: &str, action_id: &str) -> Result<DoAction> {
        let wrapper: ActionWrapper = self
            .get(&format!("/droplets/{}/actions/{}", droplet_id, action_id))
            .await?;
        Ok(wrapper.action)
    }

    pub async fn list_snapshots(&self) -> Result<Vec<Snapshot>> {
        let page: SnapshotsPage = self.get("/snapshots?resource_type=droplet&per_page=200").await?;
        Ok(page.snapshots)
    }

    pub async fn create_key(&self, name: &str, public_key: &str) -> Result<SshKey> {
        let wrapper: KeyWrapper = self
            .post(
                "/account/keys",
                json!({ "name": name, "public_key": public_key }),
            )
            .await?;
        Ok(wrapper.ssh_key)
    }
}

// Wire types

#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    id: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct SizesPage {
    sizes: Vec<Size>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Size {
    pub slug: String,
    pub vcpus: u32,
    pub memory: u32,
    pub disk: u32,
    #[serde(default)]
    pub available: bool,
}

impl Size {
    pub fn description(&self) -> String {
        format!(
            "{} vCPU / {} MB RAM / {} GB disk",
            self.vcpus, self.memory, self.disk
        )
    }
}

#[derive(Debug, Deserialize)]
struct RegionsPage {
    regions: Vec<Region>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Region {
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub available: bool,
}

#[derive(Debug, Deserialize)]
struct KeysPage {
    ssh_keys: Vec<SshKey>,
}

#[derive(Debug, Deserialize)]
struct KeyWrapper {
    ssh_key: SshKey,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SshKey {
    pub id: u64,
    pub name: String,
    pub fingerprint: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AccountWrapper {
    account: Account,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Account {
    pub email: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct CreateDropletRequest {
    pub name: String,
    pub region: String,
    pub size: String,
    pub image: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ssh_keys: Vec<String>,
    pub backups: bool,
    pub ipv6: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_data: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct DropletWrapper {
    droplet: Droplet,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Droplet {
    pub id: u64,
    pub name: String,
    pub status: String,
    pub created_at: String,
    #[serde(default)]
    pub networks: Networks,
    pub image: Option<Image>,
}

impl Droplet {
    pub fn public_ipv4(&self) -> Option<String> {
        self.networks
            .v4
            .iter()
            .find(|n| n.kind == "public")
            .map(|n| n.ip_address.clone())
    }

    pub fn public_ipv6(&self) -> Option<String> {
        self.networks
            .v6
            .iter()
            .find(|n| n.kind == "public")
            .map(|n| n.ip_address.clone())
    }

    pub fn os_description(&self) -> Option<String> {
        self.image
            .as_ref()
            .map(|i| format!("{} {}", i.distribution, i.name))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Networks {
    #[serde(default)]
    pub v4: Vec<NetworkAddress>,
    #[serde(default)]
    pub v6: Vec<NetworkAddress>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkAddress {
    pub ip_address: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Image {
    #[serde(default)]
    pub distribution: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct ActionWrapper {
    action: DoAction,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DoAction {
    pub id: u64,
    pub status: String,
    #[serde(rename = "type", default)]
    pub action_type: String,
}

#[derive(Debug, Deserialize)]
struct SnapshotsPage {
    snapshots: Vec<Snapshot>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Snapshot {
    pub id: String,
    pub name: String,
    pub created_at: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_droplet_network_selection() {
        let droplet: Droplet = serde_json::from_value(serde_json::json!({
            "id": 3164444,
            "name": "example.com",
            "status": "active",
            "created_at": "2024-07-21T18:37:44Z",
            "networks": {
                "v4": [
                    {"ip_address": "10.128.192.124", "type": "private"},
                    {"ip_address": "104.236.32.182", "type": "public"}
                ],
                "v6": [
                    {"ip_address": "2604:a880:0:1010::18a:a001", "type": "public"}
                ]
            },
            "image": {"distribution": "Ubuntu", "name": "22.04 (LTS) x64"}
        }))
        .unwrap();

        assert_eq!(droplet.public_ipv4().as_deref(), Some("104.236.32.182"));
        assert_eq!(
            droplet.public_ipv6().as_deref(),
            Some("2604:a880:0:1010::18a:a001")
        );
        assert_eq!(
            droplet.os_description().as_deref(),
            Some("Ubuntu 22.04 (LTS) x64")
        );
    }

    #[test]
    fn test_missing_token_guard() {
        let api = DoApi::new("").unwrap();
        assert!(matches!(
            api.ensure_token(),
            Err(DigitalOceanError::MissingToken)
        ));
    }
}
