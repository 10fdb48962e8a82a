//! Cloud provider error types

use thiserror::Error;

/// Cloud provider errors
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Provider not found: {0}")]
    ProviderNotFound(String),

    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    #[error("Method {method} is not supported by provider {provider}")]
    Unsupported { provider: String, method: String },

    #[error("Provider API error ({status}): {code}: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Instance not found: {0}")]
    InstanceNotFound(String),

    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    /// Build the error returned when a capability-gated method is invoked
    /// on a provider that does not support it.
    pub fn unsupported(provider: impl Into<String>, method: impl Into<String>) -> Self {
        Self::Unsupported {
            provider: provider.into(),
            method: method.into(),
        }
    }

    /// True if the error means the instance no longer exists on the
    /// provider side. `delete` treats this as success-equivalent.
    pub fn is_instance_missing(&self) -> bool {
        matches!(self, CloudError::InstanceNotFound(_))
            || matches!(self, CloudError::Api { status: 404, .. })
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
