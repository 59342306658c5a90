//! Droplet provider trait definition

use crate::action::{CreateDropletRequest, ObservedStatus, PowerAction};
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Droplet provider abstraction trait
///
/// Every backend that can host droplets (the `doctl` driven DigitalOcean
/// provider, the in-memory simulator) implements this trait. All droplets are
/// addressed by the identifier the provider assigned at creation.
#[async_trait]
pub trait DropletProvider: Send + Sync {
    /// Returns the provider name (e.g., "digitalocean", "simulated")
    fn name(&self) -> &str;

    /// Returns the provider display name for UI
    fn display_name(&self) -> &str;

    /// Check if the provider is properly configured and authenticated
    async fn check_auth(&self) -> Result<AuthStatus>;

    /// Create a droplet and return its backend id
    async fn create_droplet(&self, request: &CreateDropletRequest) -> Result<String>;

    /// Destroy a droplet
    async fn delete_droplet(&self, backend_id: &str) -> Result<()>;

    /// Resize a droplet to another size slug
    ///
    /// `permanent` also grows the disk, which cannot be undone.
    async fn resize_droplet(&self, backend_id: &str, size: &str, permanent: bool) -> Result<()>;

    /// Run a power action
    async fn power_action(&self, backend_id: &str, action: PowerAction) -> Result<()>;

    /// Read the current status reported by the provider
    async fn droplet_status(&self, backend_id: &str) -> Result<ObservedStatus>;
}

/// Authentication status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthStatus {
    /// Whether authentication is valid
    pub authenticated: bool,

    /// Whether the token only grants read access
    pub read_only: bool,

    /// Account/user information if available
    pub account_info: Option<String>,

    /// Error message if not authenticated
    pub error: Option<String>,
}

impl AuthStatus {
    pub fn ok(account_info: impl Into<String>) -> Self {
        Self {
            authenticated: true,
            read_only: false,
            account_info: Some(account_info.into()),
            error: None,
        }
    }

    pub fn read_only(account_info: impl Into<String>) -> Self {
        Self {
            read_only: true,
            ..Self::ok(account_info)
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            authenticated: false,
            read_only: false,
            account_info: None,
            error: Some(error.into()),
        }
    }

    /// Whether the provider accepts mutating calls
    pub fn can_write(&self) -> bool {
        self.authenticated && !self.read_only
    }
}
