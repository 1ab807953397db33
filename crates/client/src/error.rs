//! Client error types.

use gnfd_transfer::TransferError;

use crate::config::ConfigError;

/// Errors produced by the client and its orchestrators.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("no endpoint known for storage provider {0}; refresh endpoints first")]
    UnknownProvider(String),

    #[error("object {bucket}/{object} is not sealed")]
    NotSealed { bucket: String, object: String },

    #[error("object {bucket}/{object} still not sealed after {polls} polls")]
    SealTimeout {
        bucket: String,
        object: String,
        polls: u32,
    },

    #[error(transparent)]
    Transfer(#[from] TransferError),
}

impl ClientError {
    /// Returns the underlying transfer error, if any.
    pub fn as_transfer(&self) -> Option<&TransferError> {
        match self {
            Self::Transfer(e) => Some(e),
            _ => None,
        }
    }
}
