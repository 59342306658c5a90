//! doctl CLI wrapper
//!
//! Wraps the doctl commands used for droplet lifecycle operations.

use crate::error::{DoctlError, Result};
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use tokio::process::Command;

/// Environment variable doctl reads the API token from
pub const ACCESS_TOKEN_ENV: &str = "DIGITALOCEAN_ACCESS_TOKEN";

/// Droplet id that never exists, used to test write scope without side effects
const UNUSED_DROPLET_ID: &str = "0";

/// doctl CLI wrapper
pub struct Doctl {
    program: String,
    context: Option<String>,
    access_token: Option<String>,
}

impl Doctl {
    pub fn new(context: Option<String>, access_token: Option<String>) -> Self {
        Self {
            program: "doctl".to_string(),
            context,
            access_token,
        }
    }

    /// Use another doctl binary
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Check if doctl is installed and authenticated
    pub async fn account(&self) -> Result<AccountInfo> {
        let output = self
            .run_command(&["account", "get", "--output", "json"])
            .await?;

        let account: AccountInfo = serde_json::from_str(&output)?;
        Ok(account)
    }

    /// Check whether the token may change resources
    ///
    /// Sends a power-on for a droplet that cannot exist. A token with write
    /// scope gets "not found", a read-only token gets 403.
    pub async fn check_write_access(&self) -> Result<bool> {
        match self
            .run_command(&[
                "compute",
                "droplet-action",
                "power-on",
                UNUSED_DROPLET_ID,
                "--output",
                "json",
            ])
            .await
        {
            Ok(_) | Err(DoctlError::DropletNotFound(_)) => Ok(true),
            Err(DoctlError::ReadOnlyToken(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Run a doctl command and return stdout
    async fn run_command(&self, args: &[&str]) -> Result<String> {
        let mut cmd = Command::new(&self.program);
        if let Some(ref context) = self.context {
            cmd.arg("--context").arg(context);
        }
        // keep the token out of the process list
        if let Some(ref token) = self.access_token {
            cmd.env(ACCESS_TOKEN_ENV, token);
        }
        cmd.args(args);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        tracing::debug!("Running: {} {}", self.program, args.join(" "));

        let output = match cmd.output().await {
            Ok(output) => output,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DoctlError::DoctlNotFound);
            }
            Err(e) => return Err(e.into()),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(stderr.trim()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Get droplet by ID
    pub async fn get_droplet(&self, id: &str) -> Result<DropletInfo> {
        let output = self
            .run_command(&["compute", "droplet", "get", id, "--output", "json"])
            .await?;

        first_droplet(&output).ok_or_else(|| DoctlError::DropletNotFound(id.to_string()))
    }

    /// Create a droplet and wait until it is active
    pub async fn create_droplet(&self, config: &CreateDropletConfig) -> Result<DropletInfo> {
        let mut args = vec![
            "compute",
            "droplet",
            "create",
            config.name.as_str(),
            "--region",
            config.region.as_str(),
            "--image",
            config.image.as_str(),
            "--size",
            config.size.as_str(),
            "--wait",
            "--output",
            "json",
        ];

        if let Some(ref ssh_key) = config.ssh_key {
            args.push("--ssh-keys");
            args.push(ssh_key.as_str());
        }

        let output = self.run_command(&args).await?;

        first_droplet(&output).ok_or_else(|| DoctlError::UnexpectedOutput(output.clone()))
    }

    /// Delete a droplet
    pub async fn delete_droplet(&self, id: &str) -> Result<()> {
        self.run_command(&["compute", "droplet", "delete", id, "--force"])
            .await?;
        Ok(())
    }

    /// Power on a droplet
    pub async fn power_on(&self, id: &str) -> Result<()> {
        self.droplet_action("power-on", id, &[]).await
    }

    /// Power off a droplet (hard power off; doctl `shutdown` is the graceful variant)
    pub async fn power_off(&self, id: &str) -> Result<()> {
        self.droplet_action("power-off", id, &[]).await
    }

    /// Reboot a droplet
    pub async fn reboot(&self, id: &str) -> Result<()> {
        self.droplet_action("reboot", id, &[]).await
    }

    /// Resize a droplet, optionally growing its disk
    pub async fn resize(&self, id: &str, size: &str, resize_disk: bool) -> Result<()> {
        let mut extra = vec!["--size", size];
        if resize_disk {
            extra.push("--resize-disk");
        }
        self.droplet_action("resize", id, &extra).await
    }

    async fn droplet_action(&self, action: &str, id: &str, extra: &[&str]) -> Result<()> {
        let mut args = vec!["compute", "droplet-action", action, id];
        args.extend_from_slice(extra);
        args.extend_from_slice(&["--wait", "--output", "json"]);

        let output = self.run_command(&args).await?;

        if output.trim().is_empty() {
            return Ok(());
        }

        let actions: Vec<ActionInfo> = serde_json::from_str(&output)?;
        match actions.first() {
            Some(info) if info.status == "errored" => Err(DoctlError::ActionFailed {
                action: action.to_string(),
                status: info.status.clone(),
            }),
            _ => Ok(()),
        }
    }
}

/// Map doctl stderr to an error kind
fn classify_failure(stderr: &str) -> DoctlError {
    let lower = stderr.to_lowercase();
    if lower.contains("403") || lower.contains("do not have access") {
        DoctlError::ReadOnlyToken(stderr.to_string())
    } else if lower.contains("401") || lower.contains("unable to authenticate") {
        DoctlError::AuthenticationFailed(stderr.to_string())
    } else if lower.contains("404") || lower.contains("could not be found") {
        DoctlError::DropletNotFound(stderr.to_string())
    } else {
        DoctlError::CommandFailed(stderr.to_string())
    }
}

/// doctl prints droplet lists even for single-droplet commands
fn first_droplet(output: &str) -> Option<DropletInfo> {
    if output.trim().is_empty() {
        return None;
    }
    serde_json::from_str::<Vec<DropletInfo>>(output)
        .ok()?
        .into_iter()
        .next()
}

/// Account information from doctl
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountInfo {
    pub email: String,
    pub uuid: String,
    #[serde(default)]
    pub status: Option<String>,
}

/// Droplet information from doctl
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DropletInfo {
    pub id: u64,

    pub name: String,

    pub status: String,

    #[serde(default)]
    pub vcpus: Option<u32>,

    /// Memory in MiB
    #[serde(default)]
    pub memory: Option<u64>,

    /// Disk in GiB
    #[serde(default)]
    pub disk: Option<u64>,

    #[serde(default)]
    pub size_slug: Option<String>,
}

impl DropletInfo {
    pub fn id_str(&self) -> String {
        self.id.to_string()
    }
}

/// Action information from doctl
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionInfo {
    pub id: u64,
    pub status: String,
    #[serde(rename = "type")]
    pub action_type: String,
}

/// Configuration for creating a droplet
#[derive(Debug, Clone)]
pub struct CreateDropletConfig {
    pub name: String,
    pub region: String,
    pub image: String,
    pub size: String,
    pub ssh_key: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_droplet_parses_list() {
        let output = r#"[{"id": 3164444, "name": "web-1", "status": "active",
            "vcpus": 2, "memory": 2048, "disk": 60, "size_slug": "s-2vcpu-2gb"}]"#;

        let droplet = first_droplet(output).unwrap();
        assert_eq!(droplet.id_str(), "3164444");
        assert_eq!(droplet.status, "active");
        assert_eq!(droplet.memory, Some(2048));
    }

    #[test]
    fn test_first_droplet_empty_output() {
        assert!(first_droplet("").is_none());
        assert!(first_droplet("[]").is_none());
    }

    #[test]
    fn test_classify_failure() {
        assert!(matches!(
            classify_failure("Error: POST https://api.digitalocean.com/v2/droplets: 403 You do not have access for the attempted action."),
            DoctlError::ReadOnlyToken(_)
        ));
        assert!(matches!(
            classify_failure("Error: GET https://api.digitalocean.com/v2/droplets/1: 404 The resource you were accessing could not be found."),
            DoctlError::DropletNotFound(_)
        ));
        assert!(matches!(
            classify_failure("Error: Unable to authenticate you"),
            DoctlError::AuthenticationFailed(_)
        ));
        assert!(matches!(
            classify_failure("Error: 422 size is not available"),
            DoctlError::CommandFailed(_)
        ));
    }
}
