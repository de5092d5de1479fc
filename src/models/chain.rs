//! Chain-of-command edges

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::actor::ActorId;

pub type EdgeId = Uuid;

/// Directed superior -> subordinate edge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainEdge {
    pub id: EdgeId,
    pub superior_id: ActorId,
    pub subordinate_id: ActorId,
    /// e.g. "command", "supervision", "employment"
    pub relationship_type: String,
    pub organization: Option<String>,
    pub confidence: f64,
    pub start_date: Option<NaiveDate>,
    /// Set on deactivation; the edge stays for historical queries
    pub end_date: Option<NaiveDate>,
    pub evidence_ids: Vec<Uuid>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChainEdge {
    /// Not expired as of `date`
    pub fn is_active_on(&self, date: NaiveDate) -> bool {
        self.end_date.is_none_or(|end| end > date)
    }

    pub fn key(&self) -> EdgeKey {
        EdgeKey {
            superior_id: self.superior_id,
            subordinate_id: self.subordinate_id,
            organization: self.organization.clone(),
        }
    }
}

/// Uniqueness key: one edge per (superior, subordinate, organization)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeKey {
    pub superior_id: ActorId,
    pub subordinate_id: ActorId,
    pub organization: Option<String>,
}

/// Validity window of an edge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidityWindow {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl ValidityWindow {
    pub fn open_since(start: NaiveDate) -> Self {
        Self {
            start_date: Some(start),
            end_date: None,
        }
    }

    pub fn is_well_formed(&self) -> bool {
        match (self.start_date, self.end_date) {
            (Some(start), Some(end)) => end >= start,
            _ => true,
        }
    }
}

/// Fields for adding (or refreshing) an edge
#[derive(Debug, Clone)]
pub struct NewChainEdge {
    pub superior_id: ActorId,
    pub subordinate_id: ActorId,
    pub relationship_type: String,
    pub organization: Option<String>,
    pub confidence: f64,
    pub window: ValidityWindow,
    pub evidence_ids: Vec<Uuid>,
    pub notes: Option<String>,
}

impl NewChainEdge {
    pub fn new(superior_id: ActorId, subordinate_id: ActorId, confidence: f64) -> Self {
        Self {
            superior_id,
            subordinate_id,
            relationship_type: "command".to_string(),
            organization: None,
            confidence,
            window: ValidityWindow::default(),
            evidence_ids: Vec::new(),
            notes: None,
        }
    }

    pub fn relationship(mut self, relationship_type: impl Into<String>) -> Self {
        self.relationship_type = relationship_type.into();
        self
    }

    pub fn organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = Some(organization.into());
        self
    }

    pub fn window(mut self, window: ValidityWindow) -> Self {
        self.window = window;
        self
    }

    pub fn key(&self) -> EdgeKey {
        EdgeKey {
            superior_id: self.superior_id,
            subordinate_id: self.subordinate_id,
            organization: self.organization.clone(),
        }
    }
}
