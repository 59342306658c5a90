//! Per-invocation project context
//!
//! Loads the config and the saved state, wires the lifecycle engine to a
//! provider and writes the state back when the command is done.

use anyhow::Context;
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tidepool_cloud::{DropletProvider, ObservedStatus, SimulatedProvider};
use tidepool_cloud_digitalocean::DigitalOceanProvider;
use tidepool_config::{Config, ProviderKind};
use tidepool_core::{
    Completion, Dispatcher, DropletManager, Finalized, Intent, RuntimeState, Snapshot, StateLock,
    StateStore,
};
use tokio::sync::mpsc;

pub struct Session {
    pub config: Config,
    pub config_path: PathBuf,
    pub manager: DropletManager,
    pub dispatcher: Dispatcher,
    completions: mpsc::UnboundedReceiver<Completion>,
    store: StateStore,
    lock: Option<StateLock>,
}

impl Session {
    /// Open the project for reading
    pub async fn open() -> anyhow::Result<Self> {
        Self::load(false).await
    }

    /// Open the project holding the state lock until [`Session::close`]
    pub async fn open_locked() -> anyhow::Result<Self> {
        Self::load(true).await
    }

    async fn load(locked: bool) -> anyhow::Result<Self> {
        let (config_path, config) = Config::discover()?;
        tracing::debug!("Using config {}", config_path.display());

        let project_root = std::env::current_dir()?;
        let store = StateStore::new(&project_root);
        let lock = if locked {
            Some(store.acquire_lock().await?)
        } else {
            None
        };

        let snapshot = store
            .load()
            .await
            .with_context(|| format!("failed to read {}", store.state_path().display()))?;

        let ledger = config.build_ledger()?;
        let manager = DropletManager::new(Arc::new(ledger));
        snapshot.restore_into(&manager)?;
        config.apply_limits(manager.ledger())?;

        let provider = build_provider(&config, &snapshot).await;
        let (dispatcher, completions) = Dispatcher::new(provider, config.dispatch_timeout());

        Ok(Self {
            config,
            config_path,
            manager,
            dispatcher,
            completions,
            store,
            lock,
        })
    }

    pub fn provider(&self) -> &Arc<dyn DropletProvider> {
        self.dispatcher.provider()
    }

    /// Hand an intent to the provider and apply its completion
    pub async fn run(&mut self, intent: Intent) -> anyhow::Result<Finalized> {
        println!(
            "{}",
            format!("→ {} ({})", intent.operation, self.provider().display_name()).dimmed()
        );

        self.dispatcher.dispatch(intent);
        let completion = self
            .completions
            .recv()
            .await
            .context("dispatcher stopped before reporting a result")?;

        Ok(self.manager.handle(completion)?)
    }

    /// Save the state and release the lock
    pub async fn close(self) -> anyhow::Result<()> {
        self.store.save(&Snapshot::capture(&self.manager)).await?;
        if let Some(lock) = self.lock {
            lock.release().await?;
        }
        Ok(())
    }
}

async fn build_provider(config: &Config, snapshot: &Snapshot) -> Arc<dyn DropletProvider> {
    match config.provider {
        ProviderKind::DigitalOcean => Arc::new(DigitalOceanProvider::new(
            config.digitalocean.context.clone(),
            config.digitalocean.access_token(),
        )),
        ProviderKind::Simulated => {
            let provider = SimulatedProvider::new();
            for droplet in &snapshot.droplets {
                if let Some(backend_id) = &droplet.backend_id {
                    let status = match droplet.runtime {
                        RuntimeState::Offline => ObservedStatus::Off,
                        _ => ObservedStatus::Active,
                    };
                    provider.seed(backend_id.clone(), droplet.size.clone(), status).await;
                }
            }
            Arc::new(provider)
        }
    }
}

/// Show which config file was used
pub fn print_config_source(path: &Path) {
    println!("Config: {}", path.display().to_string().cyan());
}
