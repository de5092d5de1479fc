//! TNR Tracker core
//!
//! Unifies records about the same people and organizations arriving from
//! independent sources into canonical actors, keeps an acyclic
//! chain-of-command graph over them, and derives reproducible sanction
//! priority scores.
//!
//! ## Layout
//!
//! - `models`: pure domain types
//! - `store`: storage port plus the in-memory adapter
//! - `entity_linking`: name normalization and the pluggable comparator
//! - `graph`: bounded traversals over chain edges
//! - `services`: resolver, graph builder, cases, scoring, sync
//! - `connectors`: source connector contract
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tnr_tracker::{ActorType, InMemoryStore, NameFields, RawRecord, Tracker, TrackerConfig};
//!
//! # async fn run() -> tnr_tracker::Result<()> {
//! let tracker = Tracker::new(Arc::new(InMemoryStore::new()), TrackerConfig::default())?;
//! let record = RawRecord::new("hudoc", "001-1", ActorType::Official, NameFields::new("Ivan Petrov"));
//! let resolution = tracker.resolve_or_create(&record).await?;
//! let chain = tracker.reporting_chain(resolution.actor_id).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connectors;
pub mod entity_linking;
pub mod error;
pub mod graph;
pub mod models;
pub mod services;
pub mod store;
pub mod tracker;

pub use config::{ComparatorWeights, GraphConfig, ResolverConfig, ScoringConfig, TrackerConfig};
pub use connectors::{JsonlConnector, SourceConnector, VecConnector};
pub use entity_linking::{MatchProfile, NameComparator, WeightedNameComparator};
pub use error::{ErrorClass, Result, TrackerError};
pub use models::*;
pub use services::{
    AddedEdge, EdgeChange, MergeOutcome, Rederivation, Resolution, ResolutionOutcome,
    ScoreTrigger,
};
pub use store::{InMemoryStore, TrackerStore};
pub use tracker::Tracker;
