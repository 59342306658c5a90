#![allow(deprecated)]

use assert_cmd::Command;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

pub const CATALOG: &str = r#"
catalog:
  regions:
    - slug: ams3
      name: Amsterdam 3
    - slug: nyc1
      name: New York 1
  images:
    - slug: debian-12-x64
      name: 12 x64
      distribution: Debian
      min_disk_size: 10240
    - slug: ubuntu-24-04-x64
      name: 24.04 (LTS) x64
      distribution: Ubuntu
  sizes:
    - slug: s-1vcpu-1gb
      cores: 1
      ram: 1024
      disk: 25600
    - slug: s-2vcpu-2gb
      cores: 2
      ram: 2048
      disk: 25600
    - slug: s-2vcpu-4gb
      cores: 2
      ram: 4096
      disk: 51200
    - slug: s-4vcpu-8gb-nyc
      cores: 4
      ram: 8192
      disk: 25600
      regions: [nyc1]
"#;

pub struct TestProject {
    pub root: TempDir,
}

impl TestProject {
    /// Project using the simulated provider and the test catalog
    pub fn simulated(extra: &str) -> Self {
        let project = Self {
            root: tempfile::tempdir().unwrap(),
        };
        project.write_config(&format!("provider: simulated\n{}\n{}", extra, CATALOG));
        project
    }

    pub fn empty() -> Self {
        Self {
            root: tempfile::tempdir().unwrap(),
        }
    }

    pub fn write_config(&self, content: &str) {
        fs::write(self.root.path().join("tidepool.yaml"), content).unwrap();
    }

    pub fn path(&self) -> PathBuf {
        self.root.path().to_path_buf()
    }

    /// `tide` running inside the project, isolated from the user's config
    pub fn tide(&self) -> Command {
        let mut cmd = Command::cargo_bin("tide").unwrap();
        cmd.current_dir(self.path())
            .env_remove("TIDEPOOL_CONFIG_PATH")
            .env_remove("TIDE_SCOPE")
            .env("XDG_CONFIG_HOME", self.path().join("xdg"))
            .env("RUST_LOG", "warn");
        cmd
    }

    /// Saved state as JSON
    #[allow(dead_code)]
    pub fn state(&self) -> serde_json::Value {
        let path = self.path().join(".tidepool").join("state.json");
        let content = fs::read_to_string(path).unwrap();
        serde_json::from_str(&content).unwrap()
    }

    /// Saved usage of one counter in one scope
    #[allow(dead_code)]
    pub fn usage(&self, scope: &str, counter: &str) -> u64 {
        self.state()["quotas"][scope][counter]["usage"]
            .as_u64()
            .unwrap_or(0)
    }

    /// Saved record of one droplet
    #[allow(dead_code)]
    pub fn droplet(&self, name: &str) -> Option<serde_json::Value> {
        self.state()["droplets"]
            .as_array()?
            .iter()
            .find(|d| d["name"] == name)
            .cloned()
    }
}
