//! Sanction candidates and their score breakdowns

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::actor::ActorId;
use super::case::CaseId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SanctionStatus {
    Candidate,
    Proposed,
    UnderReview,
    Sanctioned,
    Rejected,
}

impl SanctionStatus {
    fn stage(self) -> u8 {
        match self {
            Self::Candidate => 0,
            Self::Proposed => 1,
            Self::UnderReview => 2,
            Self::Sanctioned | Self::Rejected => 3,
        }
    }

    pub fn is_final(self) -> bool {
        self.stage() == 3
    }

    /// Forward moves only. A final decision is terminal until reopened.
    pub fn can_transition_to(self, next: SanctionStatus) -> bool {
        !self.is_final() && next.stage() > self.stage()
    }
}

impl fmt::Display for SanctionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Candidate => "candidate",
            Self::Proposed => "proposed",
            Self::UnderReview => "under_review",
            Self::Sanctioned => "sanctioned",
            Self::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// Weights applied to the three score components
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub evidence: f64,
    pub centrality: f64,
    pub severity: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            evidence: 0.5,
            centrality: 0.3,
            severity: 0.2,
        }
    }
}

impl ScoreWeights {
    pub fn new(evidence: f64, centrality: f64, severity: f64) -> Self {
        Self {
            evidence,
            centrality,
            severity,
        }
    }

    pub fn sum(&self) -> f64 {
        self.evidence + self.centrality + self.severity
    }
}

/// Everything needed to re-derive a score by hand
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    /// E in [0, 1]
    pub evidence_component: f64,
    /// C in [0, 1]
    pub centrality_component: f64,
    /// S in [0, 1]
    pub severity_component: f64,
    pub verified_evidence: usize,
    pub total_evidence: usize,
    pub centrality: usize,
    pub mean_severity: Option<f64>,
    pub case_count: usize,
    pub weights: ScoreWeights,
}

impl ScoreBreakdown {
    pub fn score(&self) -> f64 {
        let raw = self.weights.evidence * self.evidence_component
            + self.weights.centrality * self.centrality_component
            + self.weights.severity * self.severity_component;
        raw.clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SanctionCandidate {
    pub id: Uuid,
    pub actor_id: ActorId,
    pub status: SanctionStatus,
    pub evidence_strength_score: f64,
    /// 1 = highest priority
    pub priority_level: u8,
    pub breakdown: ScoreBreakdown,
    pub score_computed_at: DateTime<Utc>,
    pub supporting_cases: Vec<CaseId>,
    // Decision fields: the only hand-editable part of a candidate
    pub recommendation_date: Option<NaiveDate>,
    pub proposed_sanctions: Vec<String>,
    pub legal_basis: Option<String>,
    pub reviewing_body: Option<String>,
    pub decision_date: Option<NaiveDate>,
    pub decision_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Hand-edited decision fields accompanying a status change
#[derive(Debug, Clone, Default)]
pub struct DecisionUpdate {
    pub notes: Option<String>,
    pub reviewing_body: Option<String>,
    pub legal_basis: Option<String>,
    pub proposed_sanctions: Option<Vec<String>>,
}

impl DecisionUpdate {
    pub fn notes(notes: impl Into<String>) -> Self {
        Self {
            notes: Some(notes.into()),
            ..Default::default()
        }
    }
}

pub const DEFAULT_CANDIDATE_LIMIT: usize = 50;
pub const MAX_CANDIDATE_LIMIT: usize = 500;

#[derive(Debug, Clone, Default)]
pub struct CandidateFilter {
    pub status: Option<SanctionStatus>,
    /// Keep candidates whose priority level is at most this (1 = highest)
    pub max_priority_level: Option<u8>,
    pub min_score: Option<f64>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl CandidateFilter {
    pub fn effective_limit(&self) -> usize {
        self.limit
            .unwrap_or(DEFAULT_CANDIDATE_LIMIT)
            .clamp(1, MAX_CANDIDATE_LIMIT)
    }

    pub fn matches(&self, candidate: &SanctionCandidate) -> bool {
        self.status.is_none_or(|s| candidate.status == s)
            && self
                .max_priority_level
                .is_none_or(|p| candidate.priority_level <= p)
            && self
                .min_score
                .is_none_or(|m| candidate.evidence_strength_score >= m)
    }
}
