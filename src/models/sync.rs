//! Per-source synchronization state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Idle,
    Syncing,
    Completed,
    Failed,
}

impl SyncState {
    /// idle -> syncing -> {completed | failed}; finished runs may start again
    pub fn can_transition_to(self, next: SyncState) -> bool {
        use SyncState::*;
        matches!(
            (self, next),
            (Idle | Completed | Failed, Syncing) | (Syncing, Completed | Failed)
        )
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Syncing => "syncing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCounters {
    /// Records pulled from the connector, valid or not
    pub seen: u64,
    /// Records whose resolution committed a change
    pub processed: u64,
    pub created: u64,
    pub updated: u64,
    /// Records linked to an existing actor by fuzzy match
    pub linked: u64,
    /// Exact-path records identical to what is stored
    pub unchanged: u64,
    pub queued_for_review: u64,
    pub rejected: u64,
    pub edges_added: u64,
    pub edges_rejected: u64,
    pub edges_deferred: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub source_id: String,
    pub state: SyncState,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub counters: SyncCounters,
    pub last_error: Option<String>,
    /// Number of runs started for this source
    pub run_count: u64,
}

impl SyncStatus {
    pub fn idle(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            state: SyncState::Idle,
            started_at: None,
            finished_at: None,
            duration_ms: None,
            counters: SyncCounters::default(),
            last_error: None,
            run_count: 0,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state == SyncState::Syncing
    }
}
