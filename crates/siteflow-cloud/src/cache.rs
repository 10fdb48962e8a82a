//! Response cache for idempotent provider queries
//!
//! List-style provider endpoints (sizes, regions, SSH keys) are rate
//! limited and change rarely, so adapters consult this cache before
//! performing network I/O and store the normalized result afterward.
//!
//! Keys incorporate a version prefix, a scope label, the provider slug, and
//! a hash of the credential in use, so entries never leak across plugin
//! versions, tenants, providers, or credential rotations. Mutating methods
//! that return ephemeral operation-tracking ids are never cache-eligible.

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

/// Default TTL for cacheable methods
const DEFAULT_TTL_MINUTES: i64 = 15;

/// Clock abstraction so tests can control expiry
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock implementation used in production
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock for tests
#[derive(Debug)]
pub struct ManualClock {
    now: std::sync::RwLock<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: std::sync::RwLock::new(start),
        }
    }

    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.write().expect("clock lock poisoned");
        *now = *now + duration;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read().expect("clock lock poisoned")
    }
}

/// Hash a raw credential for use in cache keys
///
/// The raw credential never appears in a key; providers that accept either
/// an API key or a secret key produce two distinct hash variants, both of
/// which `clear` removes.
pub fn credential_hash(credential: &str) -> String {
    hex::encode(Sha256::digest(credential.as_bytes()))
}

/// Cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Key prefix tied to the running version
    pub version_prefix: String,

    /// Tenant/site scope, for deployments sharing one codebase
    pub scope: String,

    /// Default entry lifetime
    pub default_ttl: Duration,

    /// Per-method TTL overrides
    pub method_ttl: HashMap<String, Duration>,

    /// Methods allowed into the cache
    pub eligible_methods: HashSet<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            version_prefix: format!("siteflow-{}", env!("CARGO_PKG_VERSION")),
            scope: "default".to_string(),
            default_ttl: Duration::minutes(DEFAULT_TTL_MINUTES),
            method_ttl: HashMap::new(),
            eligible_methods: ["sizes", "regions", "ssh_keys"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl CacheConfig {
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    pub fn with_method_ttl(mut self, method: impl Into<String>, ttl: Duration) -> Self {
        self.method_ttl.insert(method.into(), ttl);
        self
    }

    /// Widen the cache-eligible set beyond the list-style defaults
    pub fn with_eligible_method(mut self, method: impl Into<String>) -> Self {
        self.eligible_methods.insert(method.into());
        self
    }

    fn ttl_for(&self, method: &str) -> Duration {
        self.method_ttl
            .get(method)
            .copied()
            .unwrap_or(self.default_ttl)
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    provider: String,
    value: Value,
    expires_at: DateTime<Utc>,
}

/// Per-provider, per-method response cache
pub struct ResponseCache {
    config: CacheConfig,
    clock: std::sync::Arc<dyn Clock>,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl ResponseCache {
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, std::sync::Arc::new(SystemClock))
    }

    pub fn with_clock(config: CacheConfig, clock: std::sync::Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn key(&self, provider_slug: &str, credential_hash: &str, method: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.config.version_prefix.as_bytes());
        hasher.update(b"|");
        hasher.update(self.config.scope.as_bytes());
        hasher.update(b"|");
        hasher.update(provider_slug.as_bytes());
        hasher.update(b"|");
        hasher.update(credential_hash.as_bytes());
        format!("{}:{}", hex::encode(hasher.finalize()), method)
    }

    /// Fetch a cached value if present and unexpired
    pub async fn get(
        &self,
        provider_slug: &str,
        credential_hash: &str,
        method: &str,
    ) -> Option<Value> {
        let key = self.key(provider_slug, credential_hash, method);
        let now = self.clock.now();

        {
            let entries = self.entries.read().await;
            match entries.get(&key) {
                Some(entry) if entry.expires_at > now => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        // Entry exists but has expired; drop it
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get(&key) {
            if entry.expires_at <= now {
                entries.remove(&key);
                tracing::debug!(provider = provider_slug, method, "Dropped expired cache entry");
            }
        }
        None
    }

    /// Store a value if the method is cache-eligible
    ///
    /// Returns false (and stores nothing) for methods outside the eligible
    /// set, so adapters can call this unconditionally after every fetch.
    pub async fn put(
        &self,
        provider_slug: &str,
        credential_hash: &str,
        method: &str,
        value: Value,
    ) -> bool {
        if !self.config.eligible_methods.contains(method) {
            return false;
        }

        let key = self.key(provider_slug, credential_hash, method);
        let entry = CacheEntry {
            provider: provider_slug.to_string(),
            value,
            expires_at: self.clock.now() + self.config.ttl_for(method),
        };

        self.entries.write().await.insert(key, entry);
        true
    }

    /// Drop every entry for a provider, across all credential variants
    ///
    /// Called whenever a provider's credentials are edited in settings.
    pub async fn clear(&self, provider_slug: &str) {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.provider != provider_slug);
        let removed = before - entries.len();
        if removed > 0 {
            tracing::debug!(provider = provider_slug, removed, "Cleared provider cache");
        }
    }

    /// Number of live entries (expired entries may still be counted until
    /// their next read)
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
