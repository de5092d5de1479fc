//! Stateful services over the tracker store

pub mod case_service;
pub mod chain_graph;
pub mod identity_resolver;
pub mod locks;
pub mod scoring;
pub mod sync_tracker;

pub use case_service::CaseService;
pub use chain_graph::{AddedEdge, ChainGraph, EdgeChange};
pub use identity_resolver::{
    decide, IdentityResolver, MatchDecision, MergeOutcome, Resolution, ResolutionOutcome,
};
pub use locks::WriteLocks;
pub use scoring::{score_breakdown, Rederivation, ScoreTrigger, ScoringEngine};
pub use sync_tracker::{SyncTracker, DEFAULT_CHECKPOINT_EVERY};
