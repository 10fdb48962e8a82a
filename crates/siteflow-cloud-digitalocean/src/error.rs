//! DigitalOcean adapter error types

use siteflow_cloud::CloudError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DigitalOceanError {
    #[error("DigitalOcean API token is not configured")]
    MissingToken,

    #[error("DigitalOcean API error ({status}): {id}: {message}")]
    Api {
        status: u16,
        id: String,
        message: String,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Malformed API response: {0}")]
    Malformed(String),
}

impl From<DigitalOceanError> for CloudError {
    fn from(err: DigitalOceanError) -> Self {
        match err {
            DigitalOceanError::MissingToken => {
                CloudError::MissingCredentials("DigitalOcean API token".to_string())
            }
            DigitalOceanError::Api { status: 404, id, message } => {
                CloudError::InstanceNotFound(format!("{}: {}", id, message))
            }
            DigitalOceanError::Api { status, id, message } => CloudError::Api {
                status,
                code: id,
                message,
            },
            DigitalOceanError::Http(e) => CloudError::Transport(e.to_string()),
            DigitalOceanError::Malformed(msg) => CloudError::MalformedResponse(msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, DigitalOceanError>;
