//! Storage port for the tracker core.
//!
//! Services depend only on `TrackerStore`; `memory::InMemoryStore` is the
//! bundled adapter. Every write method is one committed transaction: either
//! all of its effects land or none do. Multi-entity writes that must stay
//! consistent (a resolution, a merge) get their own atomic method instead of
//! being composed from single-row calls.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

pub use memory::{InMemoryStore, SNAPSHOT_VERSION};

/// Blocking keys for fuzzy candidate retrieval
#[derive(Debug, Clone)]
pub struct CandidateQuery {
    /// Normalized name tokens of the incoming record
    pub tokens: Vec<String>,
    /// Canonical nationality code, if known
    pub nationality: Option<String>,
    pub actor_type: ActorType,
    pub limit: usize,
}

/// One resolver decision, committed atomically
#[derive(Debug, Clone)]
pub struct ResolutionCommit {
    /// Actor row after the decision (inserted or replaced)
    pub actor: Actor,
    /// Source link after the decision (inserted or replaced)
    pub link: SourceRecord,
    pub audit: MergeAuditEntry,
    /// Reject the commit if a link for the same key already exists
    pub expect_new_link: bool,
    /// Review item closed by this decision
    pub resolved_review: Option<Uuid>,
}

/// A fully planned actor merge, committed atomically
#[derive(Debug, Clone)]
pub struct MergePlan {
    /// Survivor after absorbing names, attributes and provenance
    pub survivor: Actor,
    /// Absorbed actor, archived with `merged_into` set
    pub absorbed: Actor,
    /// Edges rewritten onto the survivor (replacing rows with the same id)
    pub upsert_edges: Vec<ChainEdge>,
    /// Self-loops and collapsed duplicates
    pub remove_edges: Vec<EdgeId>,
    pub updated_cases: Vec<Case>,
    /// Candidate that survives the merge, keyed by the survivor
    pub candidate: Option<SanctionCandidate>,
    pub audit: MergeAuditEntry,
}

/// Storage operations for the tracker core.
#[async_trait]
pub trait TrackerStore: Send + Sync {
    // ── Actors ─────────────────────────────────────────────────

    async fn get_actor(&self, id: ActorId) -> Result<Option<Actor>>;

    /// Filtered listing ordered by name, then id
    async fn search_actors(&self, query: &ActorQuery) -> Result<Vec<Actor>>;

    /// Non-archived actors of the requested type sharing a blocking key
    /// with the query, most shared tokens first
    async fn candidate_actors(&self, query: &CandidateQuery) -> Result<Vec<Actor>>;

    /// Set `archived_at`; archiving twice keeps the first timestamp
    async fn archive_actor(&self, id: ActorId, at: DateTime<Utc>) -> Result<Actor>;

    async fn actor_count(&self) -> Result<usize>;

    // ── Source records ─────────────────────────────────────────

    async fn find_source_record(&self, key: &SourceKey) -> Result<Option<SourceRecord>>;

    async fn source_records_for(&self, actor_id: ActorId) -> Result<Vec<SourceRecord>>;

    async fn commit_resolution(&self, commit: ResolutionCommit) -> Result<()>;

    /// Apply a merge and repoint the absorbed actor's source links.
    /// Returns the number of links repointed.
    async fn apply_merge(&self, plan: MergePlan) -> Result<usize>;

    // ── Chain edges ────────────────────────────────────────────

    async fn get_edge(&self, id: EdgeId) -> Result<Option<ChainEdge>>;

    async fn find_edge(&self, key: &EdgeKey) -> Result<Option<ChainEdge>>;

    /// Insert or replace by edge id
    async fn upsert_edge(&self, edge: ChainEdge) -> Result<()>;

    async fn list_edges(&self) -> Result<Vec<ChainEdge>>;

    /// Edges where the actor is either endpoint, active or not
    async fn edges_touching(&self, actor_id: ActorId) -> Result<Vec<ChainEdge>>;

    // ── Cases & evidence ───────────────────────────────────────

    /// Fails with `Validation` if the case number is already taken
    async fn insert_case(&self, case: Case) -> Result<()>;

    async fn get_case(&self, id: CaseId) -> Result<Option<Case>>;

    async fn update_case(&self, case: Case) -> Result<()>;

    async fn cases_for_actor(&self, actor_id: ActorId) -> Result<Vec<Case>>;

    async fn insert_evidence(&self, evidence: Evidence) -> Result<()>;

    async fn get_evidence(&self, id: EvidenceId) -> Result<Option<Evidence>>;

    async fn update_evidence(&self, evidence: Evidence) -> Result<()>;

    async fn evidence_for_case(&self, case_id: CaseId) -> Result<Vec<Evidence>>;

    // ── Sanction candidates ────────────────────────────────────

    async fn get_candidate(&self, actor_id: ActorId) -> Result<Option<SanctionCandidate>>;

    async fn upsert_candidate(&self, candidate: SanctionCandidate) -> Result<()>;

    async fn list_candidates(&self) -> Result<Vec<SanctionCandidate>>;

    // ── Sync sessions ──────────────────────────────────────────

    /// Move the source to `syncing` unless a run is already in flight
    async fn try_begin_sync(&self, source_id: &str, at: DateTime<Utc>) -> Result<SyncStatus>;

    async fn checkpoint_sync(&self, source_id: &str, counters: &SyncCounters) -> Result<()>;

    /// Store the final status and append it to the source's history
    async fn finish_sync(&self, status: SyncStatus) -> Result<()>;

    /// Current status; `idle` for a source that never ran
    async fn sync_status(&self, source_id: &str) -> Result<SyncStatus>;

    /// Finished runs, most recent first
    async fn sync_history(&self, source_id: &str) -> Result<Vec<SyncStatus>>;

    // ── Review queue ───────────────────────────────────────────

    /// Queue an item; a pending item for the same source key is returned
    /// instead of queueing a duplicate
    async fn enqueue_review(&self, item: ReviewItem) -> Result<ReviewItem>;

    async fn get_review(&self, id: Uuid) -> Result<Option<ReviewItem>>;

    async fn pending_review_for(&self, key: &SourceKey) -> Result<Option<ReviewItem>>;

    /// Pending items, oldest first
    async fn pending_reviews(&self) -> Result<Vec<ReviewItem>>;

    // ── Audit ──────────────────────────────────────────────────

    async fn append_audit(&self, entry: MergeAuditEntry) -> Result<()>;

    /// Entries naming the actor as subject or absorbed side, oldest first
    async fn audit_trail(&self, actor_id: ActorId) -> Result<Vec<MergeAuditEntry>>;
}
