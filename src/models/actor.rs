//! Canonical actor identities and their source provenance

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Type alias for actor IDs
pub type ActorId = Uuid;

/// Opaque bag for source-specific fields the core does not interpret
pub type AttributeBag = BTreeMap<String, serde_json::Value>;

/// Namespace for deterministic source-record IDs (v5 over source + external id)
const SOURCE_RECORD_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2b1e_9d4a_4c3e_8a57_1e0b_33c2_7d91);

/// Maximum length of any single name field
pub const MAX_NAME_LEN: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorType {
    Perpetrator,
    Victim,
    Entity,
    Witness,
    Official,
}

impl fmt::Display for ActorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Perpetrator => "perpetrator",
            Self::Victim => "victim",
            Self::Entity => "entity",
            Self::Witness => "witness",
            Self::Official => "official",
        };
        f.write_str(s)
    }
}

/// How a source record was tied to its canonical actor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    Manual,
    RuleBased,
    Predicted,
}

impl fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Manual => "manual",
            Self::RuleBased => "rule_based",
            Self::Predicted => "predicted",
        };
        f.write_str(s)
    }
}

/// Multilingual name fields as they arrive from a source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameFields {
    /// Primary (usually romanized) name
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub name_korean: Option<String>,
    #[serde(default)]
    pub name_russian: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl NameFields {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn with_korean(mut self, name: impl Into<String>) -> Self {
        self.name_korean = Some(name.into());
        self
    }

    pub fn with_russian(mut self, name: impl Into<String>) -> Self {
        self.name_russian = Some(name.into());
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    /// All non-empty names, primary first, aliases last
    pub fn all(&self) -> impl Iterator<Item = &str> {
        self.name
            .iter()
            .chain(self.name_korean.iter())
            .chain(self.name_russian.iter())
            .chain(self.aliases.iter())
            .map(|s| s.as_str())
            .filter(|s| !s.trim().is_empty())
    }

    /// First available name in primary, korean, russian, alias order
    pub fn display_name(&self) -> Option<&str> {
        self.all().next()
    }

    pub fn is_empty(&self) -> bool {
        self.all().next().is_none()
    }
}

/// One contribution of a source to a canonical actor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub source_id: String,
    pub external_id: String,
    pub confidence: f64,
    pub method: MatchMethod,
    pub recorded_at: DateTime<Utc>,
}

/// Canonical identity for a tracked person or organization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    pub id: ActorId,
    /// Display name (original casing)
    pub name: String,
    pub name_korean: Option<String>,
    pub name_russian: Option<String>,
    pub actor_type: ActorType,
    pub nationality: Option<String>,
    pub organization: Option<String>,
    pub position: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub aliases: Vec<String>,
    pub description: Option<String>,
    pub attributes: AttributeBag,
    pub provenance: Vec<Provenance>,
    /// Set when deactivated; actors are never purged
    pub archived_at: Option<DateTime<Utc>>,
    /// Survivor ID when this actor was absorbed by a merge
    pub merged_into: Option<ActorId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Actor {
    pub fn new(name: impl Into<String>, actor_type: ActorType) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            name_korean: None,
            name_russian: None,
            actor_type,
            nationality: None,
            organization: None,
            position: None,
            date_of_birth: None,
            aliases: Vec::new(),
            description: None,
            attributes: AttributeBag::new(),
            provenance: Vec::new(),
            archived_at: None,
            merged_into: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_archived(&self) -> bool {
        self.archived_at.is_some()
    }

    pub fn name_fields(&self) -> NameFields {
        NameFields {
            name: Some(self.name.clone()),
            name_korean: self.name_korean.clone(),
            name_russian: self.name_russian.clone(),
            aliases: self.aliases.clone(),
        }
    }

    /// Fold another set of names into this actor without losing any spelling.
    ///
    /// Missing language fields are filled; names that differ from the stored
    /// ones become aliases.
    pub fn absorb_names(&mut self, names: &NameFields) {
        match (&self.name_korean, names.name_korean.as_deref()) {
            (None, Some(k)) if !k.trim().is_empty() => self.name_korean = Some(k.to_string()),
            (Some(_), Some(k)) => self.push_alias_if_new(k),
            _ => {}
        }
        match (&self.name_russian, names.name_russian.as_deref()) {
            (None, Some(r)) if !r.trim().is_empty() => self.name_russian = Some(r.to_string()),
            (Some(_), Some(r)) => self.push_alias_if_new(r),
            _ => {}
        }
        if let Some(n) = names.name.as_deref() {
            self.push_alias_if_new(n);
        }
        for alias in &names.aliases {
            self.push_alias_if_new(alias);
        }
    }

    fn push_alias_if_new(&mut self, candidate: &str) {
        let trimmed = candidate.trim();
        if trimmed.is_empty() {
            return;
        }
        let known = std::iter::once(self.name.as_str())
            .chain(self.name_korean.as_deref())
            .chain(self.name_russian.as_deref())
            .chain(self.aliases.iter().map(|a| a.as_str()))
            .any(|existing| existing.trim() == trimmed);
        if !known {
            self.aliases.push(trimmed.to_string());
        }
    }

    /// Append provenance, replacing an older entry for the same source key
    pub fn record_provenance(&mut self, entry: Provenance) {
        self.provenance
            .retain(|p| !(p.source_id == entry.source_id && p.external_id == entry.external_id));
        self.provenance.push(entry);
    }
}

/// Unique (source, external_id) key of a raw record
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceKey {
    pub source_id: String,
    pub external_id: String,
}

impl SourceKey {
    pub fn new(source_id: impl Into<String>, external_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            external_id: external_id.into(),
        }
    }

    /// Deterministic record ID, so the same key always maps to the same row
    pub fn record_id(&self) -> Uuid {
        let material = format!("{}\u{1f}{}", self.source_id, self.external_id);
        Uuid::new_v5(&SOURCE_RECORD_NAMESPACE, material.as_bytes())
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.source_id, self.external_id)
    }
}

/// Raw link from a source identifier to one canonical actor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRecord {
    pub id: Uuid,
    pub source_id: String,
    pub external_id: String,
    pub actor_id: ActorId,
    pub confidence: f64,
    pub method: MatchMethod,
    /// BLAKE3 hash of the last committed record content
    pub content_hash: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl SourceRecord {
    pub fn key(&self) -> SourceKey {
        SourceKey::new(&self.source_id, &self.external_id)
    }
}

/// Filter for actor listings
#[derive(Debug, Clone, Default)]
pub struct ActorQuery {
    /// Normalized substring match against every name field
    pub name: Option<String>,
    pub actor_type: Option<ActorType>,
    pub nationality: Option<String>,
    pub include_archived: bool,
    pub limit: Option<usize>,
    pub offset: usize,
}
