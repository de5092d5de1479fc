//! Domain models
//!
//! Pure data types shared by the store, the services, and the connectors.
//! Nothing in here touches storage or the async runtime.

pub mod actor;
pub mod audit;
pub mod case;
pub mod chain;
pub mod raw;
pub mod sanction;
pub mod sync;

pub use actor::{
    Actor, ActorId, ActorQuery, ActorType, AttributeBag, MatchMethod, NameFields, Provenance,
    SourceKey, SourceRecord,
};
pub use audit::{AuditAction, MergeAuditEntry, ReviewDecision, ReviewItem};
pub use case::{
    Case, CaseActor, CaseId, CaseStatus, Evidence, EvidenceId, EvidenceType, NewCase,
    NewEvidence, TnrType,
};
pub use chain::{ChainEdge, EdgeId, EdgeKey, NewChainEdge, ValidityWindow};
pub use raw::{RawRecord, RelationshipHint};
pub use sanction::{
    CandidateFilter, DecisionUpdate, SanctionCandidate, SanctionStatus, ScoreBreakdown,
    ScoreWeights,
};
pub use sync::{SyncCounters, SyncState, SyncStatus};
