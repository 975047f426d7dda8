//! Sync state types and the owner's remote document layout.

use crate::share::ShareRef;
use crate::snapshot::BoardSnapshot;
use serde::{Deserialize, Serialize};

/// Session state machine: `Idle → Loading → {Synced, Error}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// No identity.
    #[default]
    Idle,
    /// Initial pull in progress; local edits are buffered.
    Loading,
    Synced,
    Error,
}

/// Persistence status of the owner's record, for a status indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncStatus {
    #[default]
    LocalOnly,
    Syncing,
    Synced,
    Error,
}

/// The owner's synchronized board as seen by the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncRecord {
    pub owner_id: String,
    pub snapshot: BoardSnapshot,
    pub last_synced_at: Option<i64>,
    pub sync_status: SyncStatus,
}

/// Layout of `users/{ownerId}` in the remote store.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub board: Option<BoardSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_synced_at: Option<i64>,
    #[serde(default)]
    pub shares: Vec<ShareRef>,
}
