//! Errors raised while building a simulated detector or writing exports.

use thiserror::Error;
use tracklet_core::ConfigError;
use tracklet_env::EnvError;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("detector tables: {0}")]
    Env(#[from] EnvError),

    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid simulation setup: {0}")]
    Setup(String),
}
