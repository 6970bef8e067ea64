use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompensationError {
    #[error("{field} must contain exactly {expected} entries, got {actual}")]
    InvalidScheduleLength {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("invalid tier table: {0}")]
    InvalidTierTable(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("unknown scenario: {0}")]
    UnknownScenario(String),

    #[error("unknown plan variant: {0}")]
    UnknownVariant(String),

    #[error("failed to read settings file {}: {source}", path.display())]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, CompensationError>;
