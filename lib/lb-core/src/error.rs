use crate::client::ClientError;
use crate::config::ConfigError;
use crate::source::SourceError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Cluster API error: {0}")]
    Source(#[from] SourceError),

    #[error("Load balancer error: {0}")]
    Client(#[from] ClientError),

    #[error("Invariant violated: {0}")]
    Invariant(String),

    #[error("Fatal: {0}")]
    Fatal(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
