use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "Config file not found. Looked in:\n\
        - current directory: tidepool.local.yaml, tidepool.yaml\n\
        - ./.tidepool/ directory\n\
        - ~/.config/tidepool/tidepool.yaml\n\
        Set TIDEPOOL_CONFIG_PATH to point at a file directly"
    )]
    ConfigFileNotFound,

    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error(transparent)]
    Core(#[from] tidepool_core::TidepoolError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<tidepool_core::QuotaError> for ConfigError {
    fn from(err: tidepool_core::QuotaError) -> Self {
        ConfigError::Invalid(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;
