//! SiteFlow daemon
//!
//! Wires the provider registry, orchestrator, task queue, and scheduler
//! together and drives the two background loops: queue drains and deferred
//! action ticks.

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use siteflow_cloud::{CacheConfig, ProviderRegistry, ResponseCache, credential_hash};
use siteflow_cloud_custom::{CustomServerConfig, CustomServerProvider};
use siteflow_cloud_digitalocean::DigitalOceanProvider;
use siteflow_config::{SecretBox, Settings};
use siteflow_core::MemoryStore;
use siteflow_orchestrator::{
    ChangeDomainHook, CloneSiteHook, CreateServerHook, DeferredActionScheduler, DeleteServerHook,
    InstallWpHook, LogNotifier, OpenSshExecutor, Orchestrator, SiteActionHook, TaskQueue,
    services,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "siteflowd", version, about = "SiteFlow provisioning daemon")]
struct Cli {
    /// Settings file (defaults to the platform config directory)
    #[arg(long, env = "SITEFLOW_CONFIG_PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the background engine
    Run {
        /// Seconds between deferred-action scheduler ticks
        #[arg(long, default_value_t = 60)]
        tick_interval: u64,

        /// Seconds between task queue drains
        #[arg(long, default_value_t = 10)]
        drain_interval: u64,
    },

    /// List configured providers
    Providers,

    /// Verify a provider's credentials
    TestConnection {
        /// Provider slug (e.g., "digitalocean")
        provider: String,
    },
}

fn load_settings(config: &Option<PathBuf>) -> anyhow::Result<Settings> {
    match config {
        Some(path) => Settings::load_from(path).context("failed to load settings file"),
        None => Settings::load().context("failed to load settings"),
    }
}

/// Build the provider registry from settings and environment
///
/// The DigitalOcean token comes from `DIGITALOCEAN_TOKEN` or, when
/// `SITEFLOW_SECRET_KEY` is set, the encrypted `digitalocean.api_token`
/// setting. Custom providers come entirely from settings.
fn build_registry(settings: &Settings) -> anyhow::Result<ProviderRegistry> {
    let mut registry = ProviderRegistry::new();

    let token = match std::env::var("DIGITALOCEAN_TOKEN") {
        Ok(token) if !token.is_empty() => Some(token),
        _ => match std::env::var("SITEFLOW_SECRET_KEY") {
            Ok(passphrase) => {
                let secrets = SecretBox::from_passphrase(&passphrase);
                settings
                    .get_secret(&secrets, "digitalocean.api_token")
                    .context("failed to decrypt DigitalOcean token")?
            }
            Err(_) => None,
        },
    };

    if let Some(token) = token {
        let cache = Arc::new(ResponseCache::new(CacheConfig::default()));
        let hash = credential_hash(&token);
        registry.register(Arc::new(
            DigitalOceanProvider::new(token)
                .context("failed to build DigitalOcean client")?
                .with_cache(cache),
        ));
        tracing::info!(credential = %&hash[..8], "DigitalOcean provider configured");
    }

    if let Some(ipv4) = settings.get("custom_server.ipv4") {
        let mut config = CustomServerConfig::new(
            settings.get("custom_server.slug").unwrap_or("custom-server"),
            settings.get("custom_server.name").unwrap_or("Custom Server"),
            ipv4,
        );
        config.ipv6 = settings.get("custom_server.ipv6").map(str::to_string);
        config.root_user = settings.get("custom_server.root_user").map(str::to_string);
        config.base_provider = settings
            .get("custom_server.base_provider")
            .map(str::to_string);
        config.dashboard_url = settings
            .get("custom_server.dashboard_url")
            .map(str::to_string);
        registry.register(Arc::new(CustomServerProvider::new(config)?));
    }

    Ok(registry)
}

fn build_engine(registry: ProviderRegistry) -> (DeferredActionScheduler, Arc<TaskQueue>) {
    let store = Arc::new(MemoryStore::new());
    let orchestrator = Arc::new(Orchestrator::new(
        registry,
        store.clone(),
        Arc::new(OpenSshExecutor::new()),
        Arc::new(LogNotifier::new()),
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
    let scheduler = DeferredActionScheduler::new(orchestrator, store);

    (scheduler, queue)
}

async fn run(registry: ProviderRegistry, tick_interval: u64, drain_interval: u64) -> anyhow::Result<()> {
    if registry.is_empty() {
        bail!("no providers configured; set DIGITALOCEAN_TOKEN or custom_server.* settings");
    }
    tracing::info!(providers = ?registry.slugs(), "Starting engine");

    let (scheduler, queue) = build_engine(registry);
    let scheduler = scheduler.with_interval(Duration::from_secs(tick_interval));

    let drain_loop = async {
        let mut ticker = tokio::time::interval(Duration::from_secs(drain_interval));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            match queue.drain().await {
                Ok(report) if report.picked_up > 0 => {
                    tracing::info!(
                        picked_up = report.picked_up,
                        completed = report.completed,
                        failed = report.failed,
                        "Queue drained"
                    );
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Queue drain errored"),
            }
        }
    };

    tokio::select! {
        _ = scheduler.run() => {}
        _ = drain_loop => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
        }
    }
    Ok(())
}

async fn test_connection(registry: &ProviderRegistry, slug: &str) -> anyhow::Result<()> {
    let provider = registry.get(slug)?;
    let status = provider.test_connection().await?;
    if status.connected {
        println!(
            "{}: connected ({})",
            slug,
            status.account_info.as_deref().unwrap_or("no account info")
        );
        Ok(())
    } else {
        bail!(
            "{}: not connected: {}",
            slug,
            status.error.as_deref().unwrap_or("unknown error")
        )
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "siteflowd=info,siteflow_orchestrator=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let settings = load_settings(&cli.config)?;
    let registry = build_registry(&settings)?;

    match cli.command {
        Command::Run {
            tick_interval,
            drain_interval,
        } => run(registry, tick_interval, drain_interval).await,
        Command::Providers => {
            for slug in registry.slugs() {
                let provider = registry.get(&slug)?;
                println!("{} ({})", slug, provider.identity().display_name);
            }
            Ok(())
        }
        Command::TestConnection { provider } => test_connection(&registry, &provider).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_from_custom_settings() {
        let mut settings = Settings::new();
        settings.set("custom_server.ipv4", "203.0.113.10");
        settings.set("custom_server.slug", "office-box");

        let registry = build_registry(&settings).unwrap();
        assert!(registry.get("office-box").is_ok());
    }

    #[test]
    fn test_empty_settings_yield_empty_registry() {
        // Only applies when no token is present in the environment
        if std::env::var("DIGITALOCEAN_TOKEN").is_ok() {
            return;
        }
        let registry = build_registry(&Settings::new()).unwrap();
        assert!(registry.is_empty());
    }
}
