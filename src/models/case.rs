//! Violation cases, their linked actors, and attached evidence

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::actor::ActorId;

pub type CaseId = Uuid;
pub type EvidenceId = Uuid;

/// Transnational-repression category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TnrType {
    DirectAttack,
    CoOpting,
    MobilityControls,
    ThreatsFromDistance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Open,
    UnderInvestigation,
    Documented,
    Closed,
    Archived,
}

impl CaseStatus {
    /// Forward moves only; skipping ahead is allowed, going back needs a reopen
    pub fn can_advance_to(self, next: CaseStatus) -> bool {
        next > self
    }

    pub fn can_reopen(self) -> bool {
        matches!(self, Self::Closed | Self::Archived)
    }
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Open => "open",
            Self::UnderInvestigation => "under_investigation",
            Self::Documented => "documented",
            Self::Closed => "closed",
            Self::Archived => "archived",
        };
        f.write_str(s)
    }
}

/// Association between a case and an actor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseActor {
    pub actor_id: ActorId,
    /// e.g. "perpetrator", "victim", "witness"
    pub role: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Case {
    pub id: CaseId,
    pub title: String,
    pub title_korean: Option<String>,
    pub case_number: Option<String>,
    pub status: CaseStatus,
    pub tnr_type: Option<TnrType>,
    pub date_occurred: Option<NaiveDate>,
    pub country: Option<String>,
    pub summary: Option<String>,
    /// 1 (minor) to 10 (gravest)
    pub severity: Option<u8>,
    pub tags: Vec<String>,
    pub actors: Vec<CaseActor>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Case {
    pub fn involves(&self, actor_id: ActorId) -> bool {
        self.actors.iter().any(|a| a.actor_id == actor_id)
    }
}

/// Fields for creating a case
#[derive(Debug, Clone, Default)]
pub struct NewCase {
    pub title: String,
    pub title_korean: Option<String>,
    pub case_number: Option<String>,
    pub tnr_type: Option<TnrType>,
    pub date_occurred: Option<NaiveDate>,
    pub country: Option<String>,
    pub summary: Option<String>,
    pub severity: Option<u8>,
    pub tags: Vec<String>,
}

impl NewCase {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn severity(mut self, severity: u8) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn tnr_type(mut self, tnr_type: TnrType) -> Self {
        self.tnr_type = Some(tnr_type);
        self
    }

    pub fn case_number(mut self, number: impl Into<String>) -> Self {
        self.case_number = Some(number.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceType {
    Document,
    Testimony,
    Media,
    Satellite,
    Financial,
    Communication,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    pub id: EvidenceId,
    pub case_id: CaseId,
    pub evidence_type: EvidenceType,
    pub title: String,
    pub description: Option<String>,
    pub source_name: Option<String>,
    pub source_url: Option<String>,
    pub file_hash: Option<String>,
    pub authenticity_score: Option<f64>,
    pub is_verified: bool,
    pub verified_by: Option<String>,
    pub verification_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

/// Fields for attaching evidence to a case
#[derive(Debug, Clone)]
pub struct NewEvidence {
    pub case_id: CaseId,
    pub evidence_type: EvidenceType,
    pub title: String,
    pub description: Option<String>,
    pub source_name: Option<String>,
    pub source_url: Option<String>,
    pub file_hash: Option<String>,
    pub authenticity_score: Option<f64>,
}

impl NewEvidence {
    pub fn new(case_id: CaseId, evidence_type: EvidenceType, title: impl Into<String>) -> Self {
        Self {
            case_id,
            evidence_type,
            title: title.into(),
            description: None,
            source_name: None,
            source_url: None,
            file_hash: None,
            authenticity_score: None,
        }
    }

    pub fn authenticity(mut self, score: f64) -> Self {
        self.authenticity_score = Some(score);
        self
    }
}
