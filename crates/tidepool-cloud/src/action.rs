//! Operation types sent to droplet providers

use crate::error::Result;
use crate::provider::DropletProvider;
use serde::{Deserialize, Serialize};

/// Power actions supported by droplets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerAction {
    Start,
    Stop,
    Restart,
}

impl std::fmt::Display for PowerAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PowerAction::Start => write!(f, "start"),
            PowerAction::Stop => write!(f, "stop"),
            PowerAction::Restart => write!(f, "restart"),
        }
    }
}

/// Parameters for creating a droplet, all given as provider-side identifiers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateDropletRequest {
    /// Droplet name
    pub name: String,

    /// Region slug (e.g., "ams3")
    pub region: String,

    /// Image slug or id (e.g., "ubuntu-24-04-x64")
    pub image: String,

    /// Size slug (e.g., "s-2vcpu-2gb")
    pub size: String,

    /// SSH key id or fingerprint
    pub ssh_key: Option<String>,
}

/// A single call against a droplet provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderOperation {
    Create(CreateDropletRequest),
    Delete {
        backend_id: String,
    },
    Resize {
        backend_id: String,
        size: String,
        permanent: bool,
    },
    Power {
        backend_id: String,
        action: PowerAction,
    },
}

impl ProviderOperation {
    /// Run the operation against a provider
    pub async fn run(&self, provider: &dyn DropletProvider) -> Result<ProviderReceipt> {
        match self {
            ProviderOperation::Create(request) => {
                let backend_id = provider.create_droplet(request).await?;
                Ok(ProviderReceipt::Created { backend_id })
            }
            ProviderOperation::Delete { backend_id } => {
                provider.delete_droplet(backend_id).await?;
                Ok(ProviderReceipt::Completed)
            }
            ProviderOperation::Resize {
                backend_id,
                size,
                permanent,
            } => {
                provider.resize_droplet(backend_id, size, *permanent).await?;
                Ok(ProviderReceipt::Completed)
            }
            ProviderOperation::Power { backend_id, action } => {
                provider.power_action(backend_id, *action).await?;
                Ok(ProviderReceipt::Completed)
            }
        }
    }
}

impl std::fmt::Display for ProviderOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderOperation::Create(request) => write!(
                f,
                "create {} ({} in {})",
                request.name, request.size, request.region
            ),
            ProviderOperation::Delete { backend_id } => write!(f, "delete {}", backend_id),
            ProviderOperation::Resize {
                backend_id,
                size,
                permanent,
            } => {
                let mode = if *permanent { "permanent" } else { "flexible" };
                write!(f, "resize {} to {} ({})", backend_id, size, mode)
            }
            ProviderOperation::Power { backend_id, action } => {
                write!(f, "{} {}", action, backend_id)
            }
        }
    }
}

/// Successful result of a provider operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderReceipt {
    /// Droplet created with the given backend id
    Created { backend_id: String },
    /// Operation finished without a payload
    Completed,
}

/// Droplet status as reported by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservedStatus {
    /// Droplet is still being provisioned
    New,
    /// Droplet is powered on
    Active,
    /// Droplet is powered off
    Off,
    /// Droplet is archived
    Archive,
    /// Provider answered with something we do not understand
    Unknown,
}

impl ObservedStatus {
    /// Parse a DigitalOcean status string
    pub fn parse(status: &str) -> Self {
        match status {
            "new" => ObservedStatus::New,
            "active" => ObservedStatus::Active,
            "off" => ObservedStatus::Off,
            "archive" => ObservedStatus::Archive,
            _ => ObservedStatus::Unknown,
        }
    }
}

impl std::fmt::Display for ObservedStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObservedStatus::New => write!(f, "new"),
            ObservedStatus::Active => write!(f, "active"),
            ObservedStatus::Off => write!(f, "off"),
            ObservedStatus::Archive => write!(f, "archive"),
            ObservedStatus::Unknown => write!(f, "unknown"),
        }
    }
}
