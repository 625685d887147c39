use std::path::PathBuf;
use thiserror::Error;

/// Reasons a deck configuration document is rejected
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_yml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Configuration has no source file to reload from")]
    NoSource,
}
