pub mod error;

pub use error::*;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tidepool_core::{Catalog, QuotaLedger, ScopeId};

pub const CONFIG_PATH_ENV: &str = "TIDEPOOL_CONFIG_PATH";

const CANDIDATES: [&str; 2] = ["tidepool.local.yaml", "tidepool.yaml"];

/// Locate the project's config file
///
/// Search order:
/// 1. `TIDEPOOL_CONFIG_PATH` environment variable
/// 2. current directory: tidepool.local.yaml, tidepool.yaml
/// 3. the same names inside ./.tidepool/
/// 4. ~/.config/tidepool/tidepool.yaml
pub fn find_config_file() -> Result<PathBuf> {
    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
        tracing::warn!("{} points at missing file {}", CONFIG_PATH_ENV, path.display());
    }

    let current_dir = std::env::current_dir()?;

    for filename in &CANDIDATES {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(path);
        }
    }

    let project_dir = current_dir.join(".tidepool");
    if project_dir.is_dir() {
        for filename in &CANDIDATES {
            let path = project_dir.join(filename);
            if path.exists() {
                return Ok(path);
            }
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global_config = config_dir.join("tidepool").join("tidepool.yaml");
        if global_config.exists() {
            return Ok(global_config);
        }
    }

    Err(ConfigError::ConfigFileNotFound)
}

/// Backend that runs droplet operations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    DigitalOcean,
    Simulated,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::DigitalOcean => write!(f, "digitalocean"),
            ProviderKind::Simulated => write!(f, "simulated"),
        }
    }
}

/// Settings passed to doctl
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigitalOceanConfig {
    /// doctl auth context
    #[serde(default)]
    pub context: Option<String>,

    /// Environment variable holding an API token
    #[serde(default)]
    pub access_token_env: Option<String>,
}

impl DigitalOceanConfig {
    pub fn access_token(&self) -> Option<String> {
        self.access_token_env
            .as_ref()
            .and_then(|name| std::env::var(name).ok())
            .filter(|token| !token.is_empty())
    }
}

/// Quota limits; `None` means unlimited
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// Limits every scope starts with, by counter name
    #[serde(default)]
    pub defaults: BTreeMap<String, Option<u64>>,

    /// Per-scope overrides
    #[serde(default)]
    pub scopes: BTreeMap<ScopeId, BTreeMap<String, Option<u64>>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub provider: ProviderKind,

    #[serde(default)]
    pub digitalocean: DigitalOceanConfig,

    /// Seconds a provider call may take before it counts as failed
    #[serde(default)]
    pub dispatch_timeout_secs: Option<u64>,

    #[serde(default)]
    pub quotas: QuotaConfig,

    #[serde(default)]
    pub catalog: Catalog,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_yaml(&content)?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Find and load the project's config file
    pub fn discover() -> Result<(PathBuf, Self)> {
        let path = find_config_file()?;
        let config = Self::load(&path)?;
        Ok((path, config))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.catalog.validate()?;

        let ledger = QuotaLedger::for_droplets();
        let limits = self
            .quotas
            .defaults
            .keys()
            .chain(self.quotas.scopes.values().flat_map(|limits| limits.keys()));
        for name in limits {
            ledger.default_limit(name)?;
        }

        if self.dispatch_timeout_secs == Some(0) {
            return Err(ConfigError::Invalid(
                "dispatch_timeout_secs must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    pub fn dispatch_timeout(&self) -> Option<Duration> {
        self.dispatch_timeout_secs.map(Duration::from_secs)
    }

    /// Ledger with the configured default limits
    pub fn build_ledger(&self) -> Result<QuotaLedger> {
        let mut ledger = QuotaLedger::for_droplets();
        for (name, limit) in &self.quotas.defaults {
            ledger.set_default_limit(name, *limit)?;
        }
        Ok(ledger)
    }

    /// Set the limit of every counter in every known scope
    ///
    /// A scope override wins over the default. Run this after loading saved
    /// counters so edited limits take effect.
    pub fn apply_limits(&self, ledger: &QuotaLedger) -> Result<()> {
        let mut scopes = ledger.scopes();
        scopes.extend(self.quotas.scopes.keys().cloned());
        scopes.sort();
        scopes.dedup();

        let names: Vec<String> = ledger.counters().map(str::to_string).collect();
        for scope in &scopes {
            let overrides = self.quotas.scopes.get(scope);
            for name in &names {
                let limit = match overrides.and_then(|o| o.get(name)) {
                    Some(limit) => *limit,
                    None => ledger.default_limit(name)?,
                };
                ledger.set_limit(scope, name, limit)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use tidepool_core::quota::{DROPLET_COUNT, RAM, VCPU};

    const SAMPLE: &str = r#"
provider: simulated
digitalocean:
  context: work
  access_token_env: TIDEPOOL_TEST_TOKEN
dispatch_timeout_secs: 600
quotas:
  defaults:
    vcpu: 16
    ram: ~
  scopes:
    spl-1:
      vcpu: 4
catalog:
  regions:
    - slug: ams3
      name: Amsterdam 3
  images:
    - slug: ubuntu-24-04-x64
      name: 24.04 (LTS) x64
      distribution: Ubuntu
      min_disk_size: 7168
  sizes:
    - slug: s-1vcpu-1gb
      cores: 1
      ram: 1024
      disk: 25600
      regions: [ams3]
"#;

    #[test]
    fn test_parse_sample() {
        let config = Config::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.provider, ProviderKind::Simulated);
        assert_eq!(config.digitalocean.context.as_deref(), Some("work"));
        assert_eq!(config.dispatch_timeout(), Some(Duration::from_secs(600)));
        assert_eq!(config.catalog.sizes[0].regions, vec!["ams3".to_string()]);
        assert!(config.catalog.image("ubuntu-24-04-x64").unwrap().is_ssh_key_mandatory());
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_yaml("{}").unwrap();
        assert_eq!(config.provider, ProviderKind::DigitalOcean);
        assert!(config.dispatch_timeout().is_none());
        assert!(config.catalog.sizes.is_empty());
    }

    #[test]
    fn test_unknown_counter_is_rejected() {
        let err = Config::from_yaml("quotas:\n  defaults:\n    gpus: 2\n").unwrap_err();
        assert!(err.to_string().contains("gpus"));
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        assert!(Config::from_yaml("dispatch_timeout_secs: 0\n").is_err());
    }

    #[test]
    fn test_limits() {
        let config = Config::from_yaml(SAMPLE).unwrap();
        let ledger = config.build_ledger().unwrap();
        config.apply_limits(&ledger).unwrap();

        assert_eq!(ledger.snapshot("spl-1")[VCPU].limit, Some(4));
        assert_eq!(ledger.snapshot("spl-2")[VCPU].limit, Some(16));
        assert_eq!(ledger.snapshot("spl-2")[RAM].limit, None);
        assert_eq!(ledger.snapshot("spl-2")[DROPLET_COUNT].limit, Some(50));
    }

    #[test]
    fn test_access_token_from_env() {
        let config = Config::from_yaml(SAMPLE).unwrap();
        temp_env::with_var("TIDEPOOL_TEST_TOKEN", Some("dop_v1_abc"), || {
            assert_eq!(
                config.digitalocean.access_token().as_deref(),
                Some("dop_v1_abc")
            );
        });
        temp_env::with_var_unset("TIDEPOOL_TEST_TOKEN", || {
            assert!(config.digitalocean.access_token().is_none());
        });
    }

    #[test]
    #[serial]
    fn test_find_config_file_in_current_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();
        fs::write(temp_dir.path().join("tidepool.yaml"), "{}").unwrap();

        std::env::set_current_dir(&temp_dir).unwrap();
        let result = temp_env::with_var_unset(CONFIG_PATH_ENV, find_config_file);
        std::env::set_current_dir(original_dir).unwrap();

        assert!(result.unwrap().ends_with("tidepool.yaml"));
    }

    #[test]
    #[serial]
    fn test_find_config_file_local_priority() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();
        fs::write(temp_dir.path().join("tidepool.yaml"), "{}").unwrap();
        fs::write(temp_dir.path().join("tidepool.local.yaml"), "{}").unwrap();

        std::env::set_current_dir(&temp_dir).unwrap();
        let result = temp_env::with_var_unset(CONFIG_PATH_ENV, find_config_file);
        std::env::set_current_dir(original_dir).unwrap();

        assert!(result.unwrap().ends_with("tidepool.local.yaml"));
    }

    #[test]
    #[serial]
    fn test_find_config_file_in_project_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();
        let project_dir = temp_dir.path().join(".tidepool");
        fs::create_dir(&project_dir).unwrap();
        fs::write(project_dir.join("tidepool.yaml"), "{}").unwrap();

        std::env::set_current_dir(&temp_dir).unwrap();
        let result = temp_env::with_var_unset(CONFIG_PATH_ENV, find_config_file);
        std::env::set_current_dir(original_dir).unwrap();

        assert!(result.unwrap().ends_with(".tidepool/tidepool.yaml"));
    }

    #[test]
    #[serial]
    fn test_find_config_file_env_var() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("custom.yaml");
        fs::write(&config_path, "{}").unwrap();

        let result = temp_env::with_var(CONFIG_PATH_ENV, Some(&config_path), find_config_file);
        assert_eq!(result.unwrap(), config_path);
    }

    #[test]
    #[serial]
    fn test_find_config_file_not_found() {
        let temp_dir = tempfile::tempdir().unwrap();
        let xdg_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();

        std::env::set_current_dir(&temp_dir).unwrap();
        let result = temp_env::with_vars(
            [
                (CONFIG_PATH_ENV, None),
                ("XDG_CONFIG_HOME", Some(xdg_dir.path().as_os_str())),
            ],
            find_config_file,
        );
        std::env::set_current_dir(original_dir).unwrap();

        assert!(matches!(result, Err(ConfigError::ConfigFileNotFound)));
        // lookup never creates the user config dir
        assert!(!xdg_dir.path().join("tidepool").exists());
    }
}
