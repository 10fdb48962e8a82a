//! Instance actions
//!
//! Names double as the on-record continuation identifiers, so the string
//! forms are part of the persisted format.

use crate::error::OrchestratorError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// A lifecycle action against one server record
///
/// `AfterCreateCommands`, `Email`, and `ResizePoll` are internal
/// continuation steps chained by the orchestrator and re-driven by the
/// deferred-action scheduler; the rest are entry actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstanceAction {
    Create,
    Reboot,
    Off,
    On,
    Delete,
    Relocate,
    Reinstall,
    Resize,
    #[serde(rename = "after-server-create-commands")]
    AfterCreateCommands,
    Email,
    ResizePoll,
}

impl InstanceAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceAction::Create => "create",
            InstanceAction::Reboot => "reboot",
            InstanceAction::Off => "off",
            InstanceAction::On => "on",
            InstanceAction::Delete => "delete",
            InstanceAction::Relocate => "relocate",
            InstanceAction::Reinstall => "reinstall",
            InstanceAction::Resize => "resize",
            InstanceAction::AfterCreateCommands => "after-server-create-commands",
            InstanceAction::Email => "email",
            InstanceAction::ResizePoll => "resize-poll",
        }
    }
}

impl std::fmt::Display for InstanceAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstanceAction {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "create" => InstanceAction::Create,
            "reboot" => InstanceAction::Reboot,
            "off" => InstanceAction::Off,
            "on" => InstanceAction::On,
            "delete" => InstanceAction::Delete,
            "relocate" => InstanceAction::Relocate,
            "reinstall" => InstanceAction::Reinstall,
            "resize" => InstanceAction::Resize,
            "after-server-create-commands" => InstanceAction::AfterCreateCommands,
            "email" => InstanceAction::Email,
            "resize-poll" => InstanceAction::ResizePoll,
            other => return Err(OrchestratorError::UnknownAction(other.to_string())),
        })
    }
}

/// Optional parameters accompanying an action
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionParams {
    /// Target size for `resize`
    pub new_size: Option<String>,

    /// Target region for `relocate`
    pub target_region: Option<String>,

    /// Target provider for `relocate`
    pub target_provider: Option<String>,

    /// Override for the post-provision command
    pub script: Option<String>,

    /// Internal OS token passed through to the adapter on `create`
    pub initial_os: Option<String>,

    /// Provider-side SSH key reference for `create`
    pub ssh_key_id: Option<String>,
}
