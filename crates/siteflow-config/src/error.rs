//! Configuration error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not determine the platform configuration directory")]
    ConfigDirNotFound,

    #[error("Secret decryption failed")]
    DecryptionFailed,

    #[error("Encrypted value is not valid base64 or is truncated")]
    InvalidSecret,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
