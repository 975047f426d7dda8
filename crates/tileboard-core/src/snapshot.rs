//! Board snapshots and per-record merging of auxiliary collections.

use crate::widget::Widget;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// One record of a tool's auxiliary data (a note, a medicine entry, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuxRecord {
    /// Stable record id, unique within its collection.
    pub id: String,
    /// Last modification time in epoch milliseconds.
    pub last_modified: i64,
    /// Tool-specific content.
    #[serde(default)]
    pub data: serde_json::Value,
}

impl AuxRecord {
    /// Create a record stamped with the current time.
    pub fn new(id: impl Into<String>, data: serde_json::Value) -> Self {
        Self::with_timestamp(id, now_ms(), data)
    }

    pub fn with_timestamp(
        id: impl Into<String>,
        last_modified: i64,
        data: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            last_modified,
            data,
        }
    }
}

/// Auxiliary data collections keyed by collection name.
pub type Collections = BTreeMap<String, Vec<AuxRecord>>;

/// A self-contained copy of one board: the unit persisted, synced and shared.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardSnapshot {
    /// Widgets in placement order.
    #[serde(default)]
    pub widgets: Vec<Widget>,
    #[serde(default)]
    pub collections: Collections,
}

impl BoardSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.widgets.is_empty() && self.collections.values().all(Vec::is_empty)
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// How to settle a record id present on both sides of a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergePolicy {
    /// Keep the later `last_modified`; the remote copy wins ties.
    #[default]
    TimestampWins,
    /// Remote always wins, timestamps ignored. Matches older clients.
    RemoteWins,
}

/// Merge two versions of one collection, keyed by record id.
///
/// Local order is kept; records only the remote side has are appended in
/// remote order.
pub fn merge_records(
    local: &[AuxRecord],
    remote: &[AuxRecord],
    policy: MergePolicy,
) -> Vec<AuxRecord> {
    let mut merged: Vec<AuxRecord> = local.to_vec();
    for incoming in remote {
        match merged.iter_mut().find(|r| r.id == incoming.id) {
            Some(existing) => {
                let remote_wins = match policy {
                    MergePolicy::RemoteWins => true,
                    MergePolicy::TimestampWins => incoming.last_modified >= existing.last_modified,
                };
                if remote_wins {
                    *existing = incoming.clone();
                }
            }
            None => merged.push(incoming.clone()),
        }
    }
    merged
}

/// Merge every collection present on either side.
pub fn merge_collections(
    local: &Collections,
    remote: &Collections,
    policy: MergePolicy,
) -> Collections {
    let mut merged = local.clone();
    for (name, records) in remote {
        let combined = match local.get(name) {
            Some(existing) => merge_records(existing, records, policy),
            None => records.clone(),
        };
        merged.insert(name.clone(), combined);
    }
    merged
}
