//! Persisted server records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use siteflow_cloud::ServerState;
use uuid::Uuid;

/// Status of the background action attached to a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionStatus {
    /// No background work pending
    #[default]
    Idle,
    /// A deferred action is waiting for the next scheduler tick
    InProgress,
}

/// One line of the per-record audit trail
///
/// Multi-step workflows append an entry before and after every dispatch, so
/// history survives independently of any log aggregation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub at: DateTime<Utc>,
    pub message: String,
}

impl AuditEntry {
    pub fn now(message: impl Into<String>) -> Self {
        Self {
            at: Utc::now(),
            message: message.into(),
        }
    }
}

/// Resize issued to the provider but not yet finished
///
/// Keyed defensively by provider slug + instance id + action id so a
/// completion event can never be misattributed across credential rotations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingResize {
    pub provider: String,
    pub instance_id: String,
    pub action_id: String,
    pub new_size: String,
}

/// A provisioned (or provisioning) server
///
/// `version` is bumped on every store update; writers must present the
/// version they read or the write is rejected. `command_mutex` is the
/// advisory token checked before a background action runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerRecord {
    pub id: Uuid,
    pub version: u64,

    /// Instance name / hostname
    pub name: String,

    /// Slug of the provider that owns the instance
    pub provider: String,

    /// Provider-assigned instance id, once known
    pub instance_id: Option<String>,

    pub region: String,

    /// Display size label
    pub size: String,

    /// Raw provider-specific size code
    pub size_raw: String,

    pub ipv4: Option<String>,
    pub ipv6: Option<String>,

    /// Last observed lifecycle state
    pub state: ServerState,

    /// Name of the next deferred action, when one is chained
    pub pending_action: Option<String>,

    /// Whether the scheduler should pick this record up
    pub action_status: ActionStatus,

    /// Advisory token preventing two concurrent background actions
    pub command_mutex: Option<String>,

    /// Last action error, cleared when a new action starts
    pub error: Option<String>,

    /// Resize in flight, if any
    pub pending_resize: Option<PendingResize>,

    /// Old record this one replaces during relocate/reinstall; the parent
    /// is only cleaned up after cutover is confirmed
    pub parent_id: Option<Uuid>,

    /// Owning user reference
    pub owner: Option<String>,

    pub history: Vec<AuditEntry>,

    /// Soft-deleted; kept until provider-side deletion is confirmed
    pub trashed: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ServerRecord {
    pub fn new(
        name: impl Into<String>,
        provider: impl Into<String>,
        region: impl Into<String>,
        size: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        let size = size.into();
        Self {
            id: Uuid::new_v4(),
            version: 0,
            name: name.into(),
            provider: provider.into(),
            instance_id: None,
            region: region.into(),
            size_raw: size.clone(),
            size,
            ipv4: None,
            ipv6: None,
            state: ServerState::InProgress,
            pending_action: None,
            action_status: ActionStatus::Idle,
            command_mutex: None,
            error: None,
            pending_resize: None,
            parent_id: None,
            owner: None,
            history: Vec::new(),
            trashed: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn with_parent(mut self, parent_id: Uuid) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    /// Queue a deferred action for the next scheduler tick
    pub fn schedule_action(&mut self, action: impl Into<String>) {
        self.pending_action = Some(action.into());
        self.action_status = ActionStatus::InProgress;
    }

    /// Clear all deferred-action metadata; the terminal signal that no
    /// continuation steps remain
    pub fn clear_deferred_action(&mut self) {
        self.pending_action = None;
        self.action_status = ActionStatus::Idle;
        self.command_mutex = None;
    }

    pub fn audit(&mut self, message: impl Into<String>) {
        self.history.push(AuditEntry::now(message));
    }
}
