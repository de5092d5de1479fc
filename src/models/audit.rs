//! Resolver decision audit trail and the manual review queue

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::actor::{ActorId, MatchMethod, SourceKey};
use super::raw::RawRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// New canonical actor from an unresolvable record
    Created,
    /// Existing link refreshed with equal or higher confidence
    ExactUpdate,
    /// Record linked to an existing actor by similarity
    FuzzyLink,
    /// Reviewer linked a queued record to an actor
    ManualLink,
    /// Two canonical actors merged into one
    ActorMerge,
    ArchivedActor,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::ExactUpdate => "exact_update",
            Self::FuzzyLink => "fuzzy_link",
            Self::ManualLink => "manual_link",
            Self::ActorMerge => "actor_merge",
            Self::ArchivedActor => "archived_actor",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeAuditEntry {
    pub id: Uuid,
    pub decided_at: DateTime<Utc>,
    pub action: AuditAction,
    pub source: Option<SourceKey>,
    pub actor_id: ActorId,
    pub absorbed_actor_id: Option<ActorId>,
    pub method: MatchMethod,
    pub confidence: f64,
    pub best_score: Option<f64>,
    pub runner_up_score: Option<f64>,
}

impl MergeAuditEntry {
    pub fn new(action: AuditAction, actor_id: ActorId, method: MatchMethod, confidence: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            decided_at: Utc::now(),
            action,
            source: None,
            actor_id,
            absorbed_actor_id: None,
            method,
            confidence,
            best_score: None,
            runner_up_score: None,
        }
    }

    pub fn for_source(mut self, key: SourceKey) -> Self {
        self.source = Some(key);
        self
    }

    pub fn with_scores(mut self, best: f64, runner_up: Option<f64>) -> Self {
        self.best_score = Some(best);
        self.runner_up_score = runner_up;
        self
    }

    pub fn absorbing(mut self, absorbed: ActorId) -> Self {
        self.absorbed_actor_id = Some(absorbed);
        self
    }
}

/// A record the resolver refused to decide on
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewItem {
    pub id: Uuid,
    pub record: RawRecord,
    /// Candidate actors with their similarity scores, best first
    pub candidates: Vec<(ActorId, f64)>,
    pub queued_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_actor_id: Option<ActorId>,
}

impl ReviewItem {
    pub fn is_pending(&self) -> bool {
        self.resolved_at.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewDecision {
    LinkTo(ActorId),
    CreateNew,
}
