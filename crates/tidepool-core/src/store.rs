//! State file persistence
//!
//! Manages the `.tidepool/state.json` file which holds every droplet record
//! and the quota counters of every scope between CLI invocations.

use crate::error::{Result, TidepoolError};
use crate::manager::DropletManager;
use crate::quota::QuotaSnapshot;
use crate::state::Droplet;
use crate::ScopeId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

const STATE_VERSION: u32 = 1;
const STATE_DIR: &str = ".tidepool";
const STATE_FILE: &str = "state.json";
const STATE_BACKUP: &str = "state.json.backup";
const STATE_STAGING: &str = "state.json.tmp";
const LOCK_FILE: &str = "lock.json";

/// Hours after which a lock is considered abandoned
const STALE_LOCK_HOURS: i64 = 1;

/// Everything persisted between runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// State file version
    pub version: u32,

    /// Last modified timestamp
    pub updated_at: DateTime<Utc>,

    pub droplets: Vec<Droplet>,

    /// Quota counters indexed by scope
    #[serde(default)]
    pub quotas: BTreeMap<ScopeId, QuotaSnapshot>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            updated_at: Utc::now(),
            droplets: Vec::new(),
            quotas: BTreeMap::new(),
        }
    }
}

impl Snapshot {
    /// Capture the records and counters of a manager
    pub fn capture(manager: &DropletManager) -> Self {
        let ledger = manager.ledger();
        Self {
            version: STATE_VERSION,
            updated_at: Utc::now(),
            droplets: manager.list(),
            quotas: ledger
                .scopes()
                .into_iter()
                .map(|scope| {
                    let counters = ledger.snapshot(&scope);
                    (scope, counters)
                })
                .collect(),
        }
    }

    /// Load records and counters into a manager
    pub fn restore_into(&self, manager: &DropletManager) -> Result<()> {
        for (scope, counters) in &self.quotas {
            manager.ledger().restore(scope, counters)?;
        }
        for droplet in &self.droplets {
            manager.insert(droplet.clone());
        }
        Ok(())
    }
}

/// Reads and writes the state file of a project
pub struct StateStore {
    /// `<project>/.tidepool`
    dir: PathBuf,
}

impl StateStore {
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        Self {
            dir: project_root.as_ref().join(STATE_DIR),
        }
    }

    pub fn state_path(&self) -> PathBuf {
        self.dir.join(STATE_FILE)
    }

    fn backup_path(&self) -> PathBuf {
        self.dir.join(STATE_BACKUP)
    }

    fn lock_path(&self) -> PathBuf {
        self.dir.join(LOCK_FILE)
    }

    /// Load the saved state, or an empty one if there is none yet
    pub async fn load(&self) -> Result<Snapshot> {
        let content = match fs::read_to_string(self.state_path()).await {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!("No state file in {}, starting empty", self.dir.display());
                return Ok(Snapshot::default());
            }
            Err(e) => return Err(e.into()),
        };

        let snapshot: Snapshot = serde_json::from_str(&content)?;
        if snapshot.version > STATE_VERSION {
            return Err(TidepoolError::Store(format!(
                "state file has version {}, this build reads up to {}",
                snapshot.version, STATE_VERSION
            )));
        }

        tracing::debug!(
            "Loaded {} droplet(s) and {} quota scope(s)",
            snapshot.droplets.len(),
            snapshot.quotas.len()
        );
        Ok(snapshot)
    }

    /// Save the state
    ///
    /// The previous file is copied to `state.json.backup` and the new one is
    /// written next to it and renamed into place, so a crash mid-write leaves
    /// the old state readable.
    pub async fn save(&self, snapshot: &Snapshot) -> Result<()> {
        fs::create_dir_all(&self.dir).await?;

        let path = self.state_path();
        match fs::copy(&path, self.backup_path()).await {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let staged = self.dir.join(STATE_STAGING);
        fs::write(&staged, serde_json::to_vec_pretty(snapshot)?).await?;
        fs::rename(&staged, &path).await?;

        tracing::debug!("Saved {} droplet(s) to {}", snapshot.droplets.len(), path.display());
        Ok(())
    }

    /// Take the project lock
    ///
    /// The lock file is created exclusively. A lock older than one hour is
    /// taken over.
    pub async fn acquire_lock(&self) -> Result<StateLock> {
        fs::create_dir_all(&self.dir).await?;
        let path = self.lock_path();
        let holder = LockHolder::current();
        let body = serde_json::to_vec_pretty(&holder)?;

        loop {
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(mut file) => {
                    file.write_all(&body).await?;
                    file.flush().await?;
                    tracing::debug!("Locked {} as {}", self.dir.display(), holder.holder);
                    return Ok(StateLock {
                        path,
                        released: false,
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    let existing: LockHolder =
                        serde_json::from_str(&fs::read_to_string(&path).await?)?;
                    if (Utc::now() - existing.acquired_at).num_hours() < STALE_LOCK_HOURS {
                        return Err(TidepoolError::Store(format!(
                            "State is locked by {} since {}",
                            existing.holder, existing.acquired_at
                        )));
                    }
                    tracing::warn!(
                        "Taking over stale lock of {} from {}",
                        existing.holder,
                        existing.acquired_at
                    );
                    fs::remove_file(&path).await?;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Contents of `lock.json`
#[derive(Debug, Serialize, Deserialize)]
struct LockHolder {
    holder: String,
    #[serde(default)]
    pid: Option<u32>,
    acquired_at: DateTime<Utc>,
}

impl LockHolder {
    fn current() -> Self {
        let host = std::env::var("HOSTNAME")
            .or_else(|_| std::env::var("HOST"))
            .unwrap_or_else(|_| "localhost".to_string());
        Self {
            holder: host,
            pid: Some(std::process::id()),
            acquired_at: Utc::now(),
        }
    }
}

/// Held project lock, removed on release or drop
pub struct StateLock {
    path: PathBuf,
    released: bool,
}

impl StateLock {
    pub async fn release(mut self) -> Result<()> {
        self.released = true;
        match fs::remove_file(&self.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        tracing::debug!("Released {}", self.path.display());
        Ok(())
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if !self.released {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}
