//! Error types for the lifecycle engine

use crate::command::CommandKind;
use crate::quota::QuotaError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TidepoolError {
    #[error("Cannot {command} droplet {droplet}: {reason}")]
    ConflictingState {
        droplet: String,
        command: CommandKind,
        reason: String,
    },

    #[error("Quota {name} exceeded in scope {scope}: usage {usage} {delta:+} would exceed limit {limit}")]
    QuotaExceeded {
        scope: String,
        name: String,
        usage: u64,
        delta: i64,
        limit: u64,
    },

    #[error("Invalid resize: {0}")]
    InvalidResize(String),

    #[error("Unknown quota counter: {0}")]
    UnknownCounter(String),

    #[error("Provider failure: {0}")]
    ProviderFailure(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Droplet not found: {0}")]
    DropletNotFound(String),

    #[error("{kind} not found in catalog: {slug}")]
    CatalogEntryNotFound { kind: &'static str, slug: String },

    #[error("Illegal {axis} transition: {from} -> {to}")]
    InvalidTransition {
        axis: &'static str,
        from: String,
        to: String,
    },

    #[error("State file error: {0}")]
    Store(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TidepoolError {
    /// HTTP-equivalent status for the request layer
    pub fn status_code(&self) -> u16 {
        match self {
            TidepoolError::ConflictingState { .. } => 409,
            TidepoolError::QuotaExceeded { .. }
            | TidepoolError::InvalidResize(_)
            | TidepoolError::Validation(_) => 400,
            TidepoolError::DropletNotFound(_) | TidepoolError::CatalogEntryNotFound { .. } => 404,
            _ => 500,
        }
    }
}

impl From<QuotaError> for TidepoolError {
    fn from(err: QuotaError) -> Self {
        match err {
            QuotaError::UnknownCounter(name) => TidepoolError::UnknownCounter(name),
            QuotaError::Exceeded {
                scope,
                name,
                usage,
                delta,
                limit,
            } => TidepoolError::QuotaExceeded {
                scope,
                name,
                usage,
                delta,
                limit,
            },
        }
    }
}

impl From<tidepool_cloud::CloudError> for TidepoolError {
    fn from(err: tidepool_cloud::CloudError) -> Self {
        TidepoolError::ProviderFailure(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TidepoolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let conflict = TidepoolError::ConflictingState {
            droplet: "web-1".to_string(),
            command: CommandKind::Resize,
            reason: "droplet is updating".to_string(),
        };
        assert_eq!(conflict.status_code(), 409);
        assert_eq!(TidepoolError::InvalidResize("x".into()).status_code(), 400);
        assert_eq!(TidepoolError::DropletNotFound("x".into()).status_code(), 404);
        assert_eq!(TidepoolError::UnknownCounter("gpu".into()).status_code(), 500);
    }

    #[test]
    fn test_quota_error_conversion() {
        let err: TidepoolError = QuotaError::UnknownCounter("gpu".to_string()).into();
        assert!(matches!(err, TidepoolError::UnknownCounter(name) if name == "gpu"));
    }
}
