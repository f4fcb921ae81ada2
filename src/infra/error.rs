use thiserror::Error;

use crate::{catalog::CatalogError, config::LoadError, infra::db::ConnectionError};

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("database error: {0}")]
    Database(#[from] ConnectionError),
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),
    #[error("configuration error: {0}")]
    Configuration(#[from] LoadError),
    #[error("telemetry initialization failed: {0}")]
    Telemetry(String),
    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl InfraError {
    pub fn telemetry(message: impl Into<String>) -> Self {
        Self::Telemetry(message.into())
    }
}
