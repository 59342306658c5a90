//! DigitalOcean provider error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DoctlError {
    #[error("doctl not found. Please install: brew install doctl")]
    DoctlNotFound,

    #[error("doctl authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("DigitalOcean token is read-only: {0}")]
    ReadOnlyToken(String),

    #[error("doctl command failed: {0}")]
    CommandFailed(String),

    #[error("Droplet not found: {0}")]
    DropletNotFound(String),

    #[error("Droplet action {action} ended with status {status}")]
    ActionFailed { action: String, status: String },

    #[error("Unexpected doctl output: {0}")]
    UnexpectedOutput(String),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DoctlError>;

impl From<DoctlError> for tidepool_cloud::CloudError {
    fn from(err: DoctlError) -> Self {
        use tidepool_cloud::CloudError;
        match err {
            DoctlError::DoctlNotFound => CloudError::InvalidConfig(err.to_string()),
            DoctlError::AuthenticationFailed(_) | DoctlError::ReadOnlyToken(_) => {
                CloudError::AuthenticationFailed(err.to_string())
            }
            DoctlError::DropletNotFound(id) => CloudError::DropletNotFound(id),
            DoctlError::CommandFailed(_) | DoctlError::ActionFailed { .. } => {
                CloudError::CommandFailed(err.to_string())
            }
            DoctlError::UnexpectedOutput(_) => CloudError::ApiError(err.to_string()),
            DoctlError::JsonError(e) => CloudError::Json(e),
            DoctlError::IoError(e) => CloudError::Io(e),
        }
    }
}
