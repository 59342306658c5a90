//! DigitalOcean provider implementation

use crate::doctl::{CreateDropletConfig, Doctl};
use crate::error::DoctlError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tidepool_cloud::{
    AuthStatus, CloudError, CreateDropletRequest, DropletProvider, ObservedStatus, PowerAction,
};

/// DigitalOcean provider
pub struct DigitalOceanProvider {
    doctl: Doctl,
    context: String,
    /// Set when a write was refused with 403, cleared by the next accepted write
    read_only: AtomicBool,
}

impl DigitalOceanProvider {
    /// Create a provider bound to a doctl auth context
    ///
    /// When `access_token` is given it overrides the token stored in the context.
    pub fn new(context: Option<String>, access_token: Option<String>) -> Self {
        let label = context.clone().unwrap_or_else(|| "default".to_string());
        Self {
            doctl: Doctl::new(context, access_token),
            context: label,
            read_only: AtomicBool::new(false),
        }
    }

    /// Run doctl from another path
    pub fn with_program(self, program: impl Into<String>) -> Self {
        Self {
            doctl: self.doctl.with_program(program),
            ..self
        }
    }

    fn raise_read_only_alert(&self) {
        if !self.read_only.swap(true, Ordering::SeqCst) {
            tracing::warn!(
                alert_type = "token_is_read_only",
                "DigitalOcean token for {} is read-only.",
                self.context
            );
        }
    }

    fn close_read_only_alert(&self) {
        if self.read_only.swap(false, Ordering::SeqCst) {
            tracing::info!(
                alert_type = "token_is_read_only",
                "DigitalOcean token for {} has write access again.",
                self.context
            );
        }
    }

    /// Track the token's write access from the outcome of a mutating call
    fn track_write<T>(&self, result: crate::error::Result<T>) -> tidepool_cloud::Result<T> {
        match result {
            Ok(value) => {
                self.close_read_only_alert();
                Ok(value)
            }
            Err(err) => Err(self.map_err(err)),
        }
    }

    /// Convert a doctl error, raising the read-only alert when needed
    fn map_err(&self, err: DoctlError) -> CloudError {
        if let DoctlError::ReadOnlyToken(_) = err {
            self.raise_read_only_alert();
        }
        err.into()
    }
}

#[async_trait]
impl DropletProvider for DigitalOceanProvider {
    fn name(&self) -> &str {
        "digitalocean"
    }

    fn display_name(&self) -> &str {
        "DigitalOcean"
    }

    async fn check_auth(&self) -> tidepool_cloud::Result<AuthStatus> {
        let account = match self.doctl.account().await {
            Ok(account) => format!("{} ({})", account.email, account.uuid),
            Err(DoctlError::DoctlNotFound) => {
                return Ok(AuthStatus::failed("doctl is not installed"));
            }
            Err(e) => return Ok(AuthStatus::failed(e.to_string())),
        };

        match self.doctl.check_write_access().await {
            Ok(true) => {
                self.close_read_only_alert();
                Ok(AuthStatus::ok(account))
            }
            Ok(false) => {
                self.raise_read_only_alert();
                Ok(AuthStatus::read_only(account))
            }
            Err(e) => Ok(AuthStatus::failed(e.to_string())),
        }
    }

    async fn create_droplet(
        &self,
        request: &CreateDropletRequest,
    ) -> tidepool_cloud::Result<String> {
        tracing::info!("Creating droplet: {}", request.name);

        let config = CreateDropletConfig {
            name: request.name.clone(),
            region: request.region.clone(),
            image: request.image.clone(),
            size: request.size.clone(),
            ssh_key: request.ssh_key.clone(),
        };

        let droplet = self.track_write(self.doctl.create_droplet(&config).await)?;

        tracing::info!("Droplet {} created (ID: {})", droplet.name, droplet.id);
        Ok(droplet.id_str())
    }

    async fn delete_droplet(&self, backend_id: &str) -> tidepool_cloud::Result<()> {
        tracing::info!("Deleting droplet: {}", backend_id);
        self.track_write(self.doctl.delete_droplet(backend_id).await)
    }

    async fn resize_droplet(
        &self,
        backend_id: &str,
        size: &str,
        permanent: bool,
    ) -> tidepool_cloud::Result<()> {
        tracing::info!(
            "Resizing droplet {} to {} (resize disk: {})",
            backend_id,
            size,
            permanent
        );
        self.track_write(self.doctl.resize(backend_id, size, permanent).await)
    }

    async fn power_action(
        &self,
        backend_id: &str,
        action: PowerAction,
    ) -> tidepool_cloud::Result<()> {
        tracing::info!("Running {} on droplet {}", action, backend_id);
        let result = match action {
            PowerAction::Start => self.doctl.power_on(backend_id).await,
            PowerAction::Stop => self.doctl.power_off(backend_id).await,
            PowerAction::Restart => self.doctl.reboot(backend_id).await,
        };
        self.track_write(result)
    }

    async fn droplet_status(&self, backend_id: &str) -> tidepool_cloud::Result<ObservedStatus> {
        let droplet = self
            .doctl
            .get_droplet(backend_id)
            .await
            .map_err(|e| self.map_err(e))?;
        Ok(ObservedStatus::parse(&droplet.status))
    }
}
