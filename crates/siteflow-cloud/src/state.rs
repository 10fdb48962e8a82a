//! Canonical server lifecycle state
//!
//! Every adapter normalizes its provider-specific status vocabulary into
//! exactly one of these values. `InProgress` and `Unknown` are
//! orchestration-internal and never reported by a real provider API.

use serde::{Deserialize, Serialize};

/// Normalized lifecycle status of a server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServerState {
    /// Provider accepted the request but the instance is not ready yet
    New,
    /// Instance is up and reachable
    Active,
    /// Instance is in an error state
    Errored,
    /// Synthetic: provisioning was initiated but no provider state has
    /// been observed yet
    InProgress,
    /// Instance is powered off
    Off,
    /// Provider reported a status we do not recognize
    Unknown,
}

impl ServerState {
    /// True for states the deferred-action handlers are allowed to act on.
    pub fn is_active(&self) -> bool {
        matches!(self, ServerState::Active)
    }
}

impl std::fmt::Display for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerState::New => write!(f, "new"),
            ServerState::Active => write!(f, "active"),
            ServerState::Errored => write!(f, "errored"),
            ServerState::InProgress => write!(f, "in-progress"),
            ServerState::Off => write!(f, "off"),
            ServerState::Unknown => write!(f, "unknown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_matches_serde() {
        for state in [
            ServerState::New,
            ServerState::Active,
            ServerState::Errored,
            ServerState::InProgress,
            ServerState::Off,
            ServerState::Unknown,
        ] {
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(json.trim_matches('"'), state.to_string());
        }
    }
}
