//! Error types for the detector environment layer.

use crate::types::ChannelId;
use thiserror::Error;

/// Errors that can occur while loading or editing geometry and calibration tables.
#[derive(Debug, Error)]
pub enum EnvError {
    /// Reading a table file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Table content could not be parsed
    #[error("Parse error: {0}")]
    ParseError(String),

    /// The same channel appears twice in one table
    #[error("Duplicate channel {0}")]
    DuplicateChannel(ChannelId),

    /// A cell or resolution entry holds an unusable value
    #[error("Invalid entry for channel {channel}: {reason}")]
    InvalidEntry { channel: ChannelId, reason: String },
}

impl EnvError {
    /// Creates a parse error.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::ParseError(msg.into())
    }

    /// Creates an invalid-entry error.
    pub fn invalid(channel: ChannelId, reason: impl Into<String>) -> Self {
        Self::InvalidEntry {
            channel,
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for EnvError {
    fn from(err: serde_json::Error) -> Self {
        Self::ParseError(err.to_string())
    }
}
