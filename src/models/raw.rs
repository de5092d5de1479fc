//! Uniform raw-record shape produced by source connectors
//!
//! Connectors normalize every feed into `RawRecord`. Fields the core does
//! not understand land in `attributes` (flattened on deserialization), so
//! nothing source-specific leaks into the typed model.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::actor::{ActorType, AttributeBag, NameFields, SourceKey, MAX_NAME_LEN};
use crate::error::{Result, TrackerError};

fn default_confidence() -> f64 {
    1.0
}

/// A chain-of-command hint carried by a record: "my superior is `superior_external_id`
/// in the same source"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipHint {
    pub superior_external_id: String,
    pub relationship_type: String,
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub source_id: String,
    pub external_id: String,
    pub actor_type: ActorType,
    #[serde(default)]
    pub names: NameFields,
    #[serde(default)]
    pub nationality: Option<String>,
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default)]
    pub description: Option<String>,
    /// Source-assigned confidence in this record's content
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub relationships: Vec<RelationshipHint>,
    pub fetch_time: DateTime<Utc>,
    #[serde(flatten)]
    pub attributes: AttributeBag,
}

impl RawRecord {
    pub fn new(
        source_id: impl Into<String>,
        external_id: impl Into<String>,
        actor_type: ActorType,
        names: NameFields,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            external_id: external_id.into(),
            actor_type,
            names,
            nationality: None,
            organization: None,
            position: None,
            date_of_birth: None,
            description: None,
            confidence: 1.0,
            relationships: Vec::new(),
            fetch_time: Utc::now(),
            attributes: AttributeBag::new(),
        }
    }

    pub fn with_nationality(mut self, nationality: impl Into<String>) -> Self {
        self.nationality = Some(nationality.into());
        self
    }

    pub fn with_organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = Some(organization.into());
        self
    }

    pub fn with_position(mut self, position: impl Into<String>) -> Self {
        self.position = Some(position.into());
        self
    }

    pub fn with_date_of_birth(mut self, dob: NaiveDate) -> Self {
        self.date_of_birth = Some(dob);
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_relationship(mut self, hint: RelationshipHint) -> Self {
        self.relationships.push(hint);
        self
    }

    pub fn key(&self) -> SourceKey {
        SourceKey::new(&self.source_id, &self.external_id)
    }

    /// Reject malformed or out-of-range input before anything is persisted
    pub fn validate(&self) -> Result<()> {
        let reject = |reason: String| {
            Err(TrackerError::validation(
                &self.source_id,
                &self.external_id,
                reason,
            ))
        };

        if self.source_id.trim().is_empty() {
            return reject("source_id is empty".into());
        }
        if self.external_id.trim().is_empty() {
            return reject("external_id is empty".into());
        }
        if self.names.is_empty() {
            return reject("record carries no name".into());
        }
        if let Some(long) = self.names.all().find(|n| n.chars().count() > MAX_NAME_LEN) {
            return reject(format!(
                "name exceeds {} characters: {}...",
                MAX_NAME_LEN,
                long.chars().take(24).collect::<String>()
            ));
        }
        if !in_unit_range(self.confidence) {
            return reject(format!("confidence {} outside [0, 1]", self.confidence));
        }
        for hint in &self.relationships {
            if hint.superior_external_id.trim().is_empty() {
                return reject("relationship without superior".into());
            }
            if hint.superior_external_id == self.external_id {
                return reject("record names itself as superior".into());
            }
            if !in_unit_range(hint.confidence) {
                return reject(format!(
                    "relationship confidence {} outside [0, 1]",
                    hint.confidence
                ));
            }
            if let (Some(start), Some(end)) = (hint.start_date, hint.end_date) {
                if end < start {
                    return reject(format!("relationship ends {} before it starts {}", end, start));
                }
            }
        }
        Ok(())
    }

    /// Content hash used to detect unchanged replays; excludes fetch time
    pub fn content_hash(&self) -> String {
        #[derive(Serialize)]
        struct HashView<'a> {
            source_id: &'a str,
            external_id: &'a str,
            actor_type: ActorType,
            names: &'a NameFields,
            nationality: &'a Option<String>,
            organization: &'a Option<String>,
            position: &'a Option<String>,
            date_of_birth: &'a Option<NaiveDate>,
            description: &'a Option<String>,
            confidence: f64,
            relationships: &'a [RelationshipHint],
            attributes: &'a AttributeBag,
        }

        let view = HashView {
            source_id: &self.source_id,
            external_id: &self.external_id,
            actor_type: self.actor_type,
            names: &self.names,
            nationality: &self.nationality,
            organization: &self.organization,
            position: &self.position,
            date_of_birth: &self.date_of_birth,
            description: &self.description,
            confidence: self.confidence,
            relationships: &self.relationships,
            attributes: &self.attributes,
        };
        // Serializing plain data with string keys cannot fail
        let bytes = serde_json::to_vec(&view).unwrap_or_default();
        blake3::hash(&bytes).to_hex().to_string()
    }
}

pub(crate) fn in_unit_range(value: f64) -> bool {
    value.is_finite() && (0.0..=1.0).contains(&value)
}
