//! In-memory `TrackerStore` adapter
//!
//! All state sits behind one `tokio::sync::RwLock`, so every trait method
//! is a single critical section and therefore atomic. Readers share the
//! lock; they see the last committed state and never a half-applied write.
//!
//! The blocking indexes (name token and nationality) are derived data: they
//! are skipped on serialization and rebuilt on load.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use super::{CandidateQuery, MergePlan, ResolutionCommit, TrackerStore};
use crate::entity_linking::{normalize_name, normalize_nationality, MatchProfile};
use crate::error::{Result, TrackerError};
use crate::models::*;

/// Snapshot format version - increment when the state layout changes
pub const SNAPSHOT_VERSION: u32 = 1;

/// Finished runs kept per source
const MAX_SYNC_HISTORY: usize = 100;

type IdBucket = SmallVec<[ActorId; 8]>;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreState {
    actors: HashMap<ActorId, Actor>,
    /// Keyed by `SourceKey::record_id()`
    source_records: HashMap<Uuid, SourceRecord>,
    edges: HashMap<EdgeId, ChainEdge>,
    cases: HashMap<CaseId, Case>,
    evidence: HashMap<EvidenceId, Evidence>,
    /// One candidate per actor
    candidates: HashMap<ActorId, SanctionCandidate>,
    sync_status: HashMap<String, SyncStatus>,
    sync_history: HashMap<String, Vec<SyncStatus>>,
    reviews: HashMap<Uuid, ReviewItem>,
    audit: Vec<MergeAuditEntry>,

    /// Normalized name token → non-archived actors carrying it
    #[serde(skip)]
    token_index: HashMap<String, IdBucket>,

    /// Canonical nationality code → non-archived actors
    #[serde(skip)]
    nationality_index: HashMap<String, IdBucket>,
}

impl StoreState {
    fn blocking_keys(actor: &Actor) -> (Vec<String>, Option<String>) {
        let tokens = MatchProfile::from_actor(actor).blocking_tokens();
        let nationality = actor.nationality.as_deref().and_then(normalize_nationality);
        (tokens, nationality)
    }

    fn index(&mut self, actor: &Actor) {
        if actor.is_archived() {
            return;
        }
        let (tokens, nationality) = Self::blocking_keys(actor);
        for token in tokens {
            let bucket = self.token_index.entry(token).or_default();
            if !bucket.contains(&actor.id) {
                bucket.push(actor.id);
            }
        }
        if let Some(code) = nationality {
            let bucket = self.nationality_index.entry(code).or_default();
            if !bucket.contains(&actor.id) {
                bucket.push(actor.id);
            }
        }
    }

    fn unindex(&mut self, actor: &Actor) {
        let (tokens, nationality) = Self::blocking_keys(actor);
        for token in tokens {
            remove_from_bucket(&mut self.token_index, &token, actor.id);
        }
        if let Some(code) = nationality {
            remove_from_bucket(&mut self.nationality_index, &code, actor.id);
        }
    }

    /// Insert or replace an actor, keeping the blocking indexes in step
    fn put_actor(&mut self, actor: Actor) {
        if let Some(previous) = self.actors.remove(&actor.id) {
            self.unindex(&previous);
        }
        self.index(&actor);
        self.actors.insert(actor.id, actor);
    }

    fn rebuild_indexes(&mut self) {
        self.token_index.clear();
        self.nationality_index.clear();
        let actors: Vec<Actor> = self.actors.values().cloned().collect();
        for actor in &actors {
            self.index(actor);
        }
    }

    /// A snapshot taken mid-run leaves the source `syncing` forever; fail it
    fn recover_interrupted_syncs(&mut self, saved_at: DateTime<Utc>) {
        for status in self.sync_status.values_mut() {
            if status.is_running() {
                warn!(source_id = %status.source_id, "Sync was in flight when the snapshot was saved");
                status.state = SyncState::Failed;
                status.finished_at = Some(saved_at);
                status.last_error = Some("interrupted".to_string());
                self.sync_history
                    .entry(status.source_id.clone())
                    .or_default()
                    .insert(0, status.clone());
            }
        }
    }
}

fn remove_from_bucket(index: &mut HashMap<String, IdBucket>, key: &str, id: ActorId) {
    if let Some(bucket) = index.get_mut(key) {
        bucket.retain(|existing| *existing != id);
        if bucket.is_empty() {
            index.remove(key);
        }
    }
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    version: u32,
    saved_at: DateTime<Utc>,
    state: &'a StoreState,
}

#[derive(Deserialize)]
struct Snapshot {
    version: u32,
    saved_at: DateTime<Utc>,
    state: StoreState,
}

/// Row counts for operators
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub actors: usize,
    pub archived_actors: usize,
    pub source_records: usize,
    pub edges: usize,
    pub active_edges: usize,
    pub cases: usize,
    pub evidence: usize,
    pub candidates: usize,
    pub pending_reviews: usize,
    pub audit_entries: usize,
}

impl fmt::Display for StoreStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Tracker store:")?;
        writeln!(
            f,
            "  Actors: {} ({} archived)",
            self.actors, self.archived_actors
        )?;
        writeln!(f, "  Source records: {}", self.source_records)?;
        writeln!(f, "  Chain edges: {} ({} active)", self.edges, self.active_edges)?;
        writeln!(f, "  Cases: {}", self.cases)?;
        writeln!(f, "  Evidence: {}", self.evidence)?;
        writeln!(f, "  Sanction candidates: {}", self.candidates)?;
        writeln!(f, "  Pending reviews: {}", self.pending_reviews)?;
        write!(f, "  Audit entries: {}", self.audit_entries)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<StoreState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a store from a JSON snapshot written by `save_snapshot`
    pub async fn load_snapshot(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let snapshot: Snapshot = serde_json::from_slice(&bytes)?;

        if snapshot.version != SNAPSHOT_VERSION {
            return Err(TrackerError::Config(format!(
                "store snapshot version mismatch: expected {}, got {}",
                SNAPSHOT_VERSION, snapshot.version
            )));
        }

        let mut state = snapshot.state;
        state.rebuild_indexes();
        state.recover_interrupted_syncs(snapshot.saved_at);
        info!(
            path = %path.display(),
            actors = state.actors.len(),
            edges = state.edges.len(),
            "Loaded store snapshot"
        );

        Ok(Self {
            state: RwLock::new(state),
        })
    }

    /// Write the full store to `path`, replacing any previous snapshot
    pub async fn save_snapshot(&self, path: &Path) -> Result<()> {
        let bytes = {
            let state = self.state.read().await;
            serde_json::to_vec_pretty(&SnapshotRef {
                version: SNAPSHOT_VERSION,
                saved_at: Utc::now(),
                state: &*state,
            })?
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        info!(path = %path.display(), "Saved store snapshot");
        Ok(())
    }

    pub async fn stats(&self) -> StoreStats {
        let state = self.state.read().await;
        let today = Utc::now().date_naive();
        StoreStats {
            actors: state.actors.len(),
            archived_actors: state.actors.values().filter(|a| a.is_archived()).count(),
            source_records: state.source_records.len(),
            edges: state.edges.len(),
            active_edges: state.edges.values().filter(|e| e.is_active_on(today)).count(),
            cases: state.cases.len(),
            evidence: state.evidence.len(),
            candidates: state.candidates.len(),
            pending_reviews: state.reviews.values().filter(|r| r.is_pending()).count(),
            audit_entries: state.audit.len(),
        }
    }
}

fn matches_query(actor: &Actor, query: &ActorQuery) -> bool {
    if !query.include_archived && actor.is_archived() {
        return false;
    }
    if query.actor_type.is_some_and(|t| t != actor.actor_type) {
        return false;
    }
    if let Some(wanted) = query.nationality.as_deref().and_then(normalize_nationality) {
        let have = actor.nationality.as_deref().and_then(normalize_nationality);
        if have.as_deref() != Some(wanted.as_str()) {
            return false;
        }
    }
    if let Some(needle) = query.name.as_deref().map(|n| normalize_name(n, false)) {
        if !needle.is_empty()
            && !actor
                .name_fields()
                .all()
                .any(|n| normalize_name(n, false).contains(&needle))
        {
            return false;
        }
    }
    true
}

fn dedupe_candidates(candidates: &mut Vec<(ActorId, f64)>) {
    let mut best: HashMap<ActorId, f64> = HashMap::new();
    for (id, score) in candidates.drain(..) {
        let entry = best.entry(id).or_insert(score);
        *entry = entry.max(score);
    }
    candidates.extend(best);
    candidates.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
}

#[async_trait]
impl TrackerStore for InMemoryStore {
    // ── Actors ─────────────────────────────────────────────────

    async fn get_actor(&self, id: ActorId) -> Result<Option<Actor>> {
        Ok(self.state.read().await.actors.get(&id).cloned())
    }

    async fn search_actors(&self, query: &ActorQuery) -> Result<Vec<Actor>> {
        let state = self.state.read().await;
        let mut hits: Vec<&Actor> = state
            .actors
            .values()
            .filter(|a| matches_query(a, query))
            .collect();
        hits.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(hits
            .into_iter()
            .skip(query.offset)
            .take(query.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn candidate_actors(&self, query: &CandidateQuery) -> Result<Vec<Actor>> {
        let state = self.state.read().await;

        let mut shared: HashMap<ActorId, usize> = HashMap::new();
        for token in &query.tokens {
            if let Some(bucket) = state.token_index.get(token) {
                for id in bucket {
                    *shared.entry(*id).or_default() += 1;
                }
            }
        }
        if let Some(bucket) = query
            .nationality
            .as_ref()
            .and_then(|code| state.nationality_index.get(code))
        {
            for id in bucket {
                shared.entry(*id).or_default();
            }
        }

        let mut ranked: Vec<(usize, &Actor)> = shared
            .into_iter()
            .filter_map(|(id, count)| state.actors.get(&id).map(|a| (count, a)))
            .filter(|(_, a)| !a.is_archived() && a.actor_type == query.actor_type)
            .collect();
        ranked.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.id.cmp(&b.1.id)));

        Ok(ranked
            .into_iter()
            .take(query.limit)
            .map(|(_, a)| a.clone())
            .collect())
    }

    async fn archive_actor(&self, id: ActorId, at: DateTime<Utc>) -> Result<Actor> {
        let mut state = self.state.write().await;
        let mut actor = state
            .actors
            .get(&id)
            .cloned()
            .ok_or_else(|| TrackerError::not_found("actor", id))?;
        if actor.archived_at.is_none() {
            actor.archived_at = Some(at);
            actor.updated_at = at;
            state.put_actor(actor.clone());
        }
        Ok(actor)
    }

    async fn actor_count(&self) -> Result<usize> {
        Ok(self.state.read().await.actors.len())
    }

    // ── Source records ─────────────────────────────────────────

    async fn find_source_record(&self, key: &SourceKey) -> Result<Option<SourceRecord>> {
        Ok(self
            .state
            .read()
            .await
            .source_records
            .get(&key.record_id())
            .cloned())
    }

    async fn source_records_for(&self, actor_id: ActorId) -> Result<Vec<SourceRecord>> {
        let state = self.state.read().await;
        let mut links: Vec<SourceRecord> = state
            .source_records
            .values()
            .filter(|r| r.actor_id == actor_id)
            .cloned()
            .collect();
        links.sort_by(|a, b| a.key().cmp(&b.key()));
        Ok(links)
    }

    async fn commit_resolution(&self, commit: ResolutionCommit) -> Result<()> {
        let mut state = self.state.write().await;

        if commit.link.actor_id != commit.actor.id {
            return Err(TrackerError::Invariant(format!(
                "link {} points at {} but commits actor {}",
                commit.link.key(),
                commit.link.actor_id,
                commit.actor.id
            )));
        }
        if commit.link.id != commit.link.key().record_id() {
            return Err(TrackerError::Invariant(format!(
                "link {} has a non-deterministic id",
                commit.link.key()
            )));
        }
        if commit.expect_new_link && state.source_records.contains_key(&commit.link.id) {
            return Err(TrackerError::Invariant(format!(
                "source record {} is already linked",
                commit.link.key()
            )));
        }
        if let Some(review_id) = commit.resolved_review {
            match state.reviews.get(&review_id) {
                Some(item) if item.is_pending() => {}
                Some(_) => {
                    return Err(TrackerError::IllegalTransition {
                        entity: "review_item",
                        from: "resolved".into(),
                        to: "resolved".into(),
                    })
                }
                None => return Err(TrackerError::not_found("review_item", review_id)),
            }
        }

        if let Some(item) = commit
            .resolved_review
            .and_then(|id| state.reviews.get_mut(&id))
        {
            item.resolved_at = Some(commit.audit.decided_at);
            item.resolved_actor_id = Some(commit.actor.id);
        }
        state.put_actor(commit.actor);
        state.source_records.insert(commit.link.id, commit.link);
        state.audit.push(commit.audit);
        Ok(())
    }

    async fn apply_merge(&self, plan: MergePlan) -> Result<usize> {
        let mut state = self.state.write().await;
        let survivor_id = plan.survivor.id;
        let absorbed_id = plan.absorbed.id;

        for id in [survivor_id, absorbed_id] {
            if !state.actors.contains_key(&id) {
                return Err(TrackerError::not_found("actor", id));
            }
        }
        if plan.absorbed.merged_into != Some(survivor_id) || !plan.absorbed.is_archived() {
            return Err(TrackerError::Invariant(format!(
                "absorbed actor {} is not archived into {}",
                absorbed_id, survivor_id
            )));
        }
        if let Some(candidate) = plan.candidate.as_ref().filter(|c| c.actor_id != survivor_id) {
            return Err(TrackerError::Invariant(format!(
                "surviving candidate {} does not belong to {}",
                candidate.id, survivor_id
            )));
        }

        let mut repointed = 0;
        for link in state.source_records.values_mut() {
            if link.actor_id == absorbed_id {
                link.actor_id = survivor_id;
                repointed += 1;
            }
        }
        for id in &plan.remove_edges {
            state.edges.remove(id);
        }
        for edge in plan.upsert_edges {
            state.edges.insert(edge.id, edge);
        }
        for case in plan.updated_cases {
            state.cases.insert(case.id, case);
        }
        state.candidates.remove(&absorbed_id);
        if let Some(candidate) = plan.candidate {
            state.candidates.insert(candidate.actor_id, candidate);
        }
        for item in state.reviews.values_mut().filter(|r| r.is_pending()) {
            if item.candidates.iter().any(|(id, _)| *id == absorbed_id) {
                for (id, _) in item.candidates.iter_mut() {
                    if *id == absorbed_id {
                        *id = survivor_id;
                    }
                }
                dedupe_candidates(&mut item.candidates);
            }
        }
        state.put_actor(plan.survivor);
        state.put_actor(plan.absorbed);
        state.audit.push(plan.audit);
        Ok(repointed)
    }

    // ── Chain edges ────────────────────────────────────────────

    async fn get_edge(&self, id: EdgeId) -> Result<Option<ChainEdge>> {
        Ok(self.state.read().await.edges.get(&id).cloned())
    }

    async fn find_edge(&self, key: &EdgeKey) -> Result<Option<ChainEdge>> {
        let state = self.state.read().await;
        Ok(state.edges.values().find(|e| e.key() == *key).cloned())
    }

    async fn upsert_edge(&self, edge: ChainEdge) -> Result<()> {
        let mut state = self.state.write().await;
        let key = edge.key();
        if state
            .edges
            .values()
            .any(|e| e.id != edge.id && e.key() == key)
        {
            return Err(TrackerError::Invariant(format!(
                "duplicate edge {} -> {} ({:?})",
                key.superior_id, key.subordinate_id, key.organization
            )));
        }
        state.edges.insert(edge.id, edge);
        Ok(())
    }

    async fn list_edges(&self) -> Result<Vec<ChainEdge>> {
        let state = self.state.read().await;
        let mut edges: Vec<ChainEdge> = state.edges.values().cloned().collect();
        edges.sort_by_key(|e| e.id);
        Ok(edges)
    }

    async fn edges_touching(&self, actor_id: ActorId) -> Result<Vec<ChainEdge>> {
        let state = self.state.read().await;
        let mut edges: Vec<ChainEdge> = state
            .edges
            .values()
            .filter(|e| e.superior_id == actor_id || e.subordinate_id == actor_id)
            .cloned()
            .collect();
        edges.sort_by(|a, b| {
            a.start_date
                .cmp(&b.start_date)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });
        Ok(edges)
    }

    // ── Cases & evidence ───────────────────────────────────────

    async fn insert_case(&self, case: Case) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(number) = case.case_number.as_deref() {
            if state
                .cases
                .values()
                .any(|c| c.case_number.as_deref() == Some(number))
            {
                return Err(TrackerError::validation(
                    "case",
                    number,
                    "case number already exists",
                ));
            }
        }
        state.cases.insert(case.id, case);
        Ok(())
    }

    async fn get_case(&self, id: CaseId) -> Result<Option<Case>> {
        Ok(self.state.read().await.cases.get(&id).cloned())
    }

    async fn update_case(&self, case: Case) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.cases.contains_key(&case.id) {
            return Err(TrackerError::not_found("case", case.id));
        }
        state.cases.insert(case.id, case);
        Ok(())
    }

    async fn cases_for_actor(&self, actor_id: ActorId) -> Result<Vec<Case>> {
        let state = self.state.read().await;
        let mut cases: Vec<Case> = state
            .cases
            .values()
            .filter(|c| c.involves(actor_id))
            .cloned()
            .collect();
        cases.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(cases)
    }

    async fn insert_evidence(&self, evidence: Evidence) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.cases.contains_key(&evidence.case_id) {
            return Err(TrackerError::not_found("case", evidence.case_id));
        }
        state.evidence.insert(evidence.id, evidence);
        Ok(())
    }

    async fn get_evidence(&self, id: EvidenceId) -> Result<Option<Evidence>> {
        Ok(self.state.read().await.evidence.get(&id).cloned())
    }

    async fn update_evidence(&self, evidence: Evidence) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.evidence.contains_key(&evidence.id) {
            return Err(TrackerError::not_found("evidence", evidence.id));
        }
        state.evidence.insert(evidence.id, evidence);
        Ok(())
    }

    async fn evidence_for_case(&self, case_id: CaseId) -> Result<Vec<Evidence>> {
        let state = self.state.read().await;
        let mut items: Vec<Evidence> = state
            .evidence
            .values()
            .filter(|e| e.case_id == case_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(items)
    }

    // ── Sanction candidates ────────────────────────────────────

    async fn get_candidate(&self, actor_id: ActorId) -> Result<Option<SanctionCandidate>> {
        Ok(self.state.read().await.candidates.get(&actor_id).cloned())
    }

    async fn upsert_candidate(&self, candidate: SanctionCandidate) -> Result<()> {
        let mut state = self.state.write().await;
        state.candidates.insert(candidate.actor_id, candidate);
        Ok(())
    }

    async fn list_candidates(&self) -> Result<Vec<SanctionCandidate>> {
        let state = self.state.read().await;
        let mut candidates: Vec<SanctionCandidate> = state.candidates.values().cloned().collect();
        candidates.sort_by_key(|c| c.actor_id);
        Ok(candidates)
    }

    // ── Sync sessions ──────────────────────────────────────────

    async fn try_begin_sync(&self, source_id: &str, at: DateTime<Utc>) -> Result<SyncStatus> {
        let mut state = self.state.write().await;
        let current = state
            .sync_status
            .get(source_id)
            .cloned()
            .unwrap_or_else(|| SyncStatus::idle(source_id));

        if !current.state.can_transition_to(SyncState::Syncing) {
            return Err(TrackerError::SyncInProgress {
                source_id: source_id.to_string(),
            });
        }

        let next = SyncStatus {
            source_id: source_id.to_string(),
            state: SyncState::Syncing,
            started_at: Some(at),
            finished_at: None,
            duration_ms: None,
            counters: SyncCounters::default(),
            last_error: None,
            run_count: current.run_count + 1,
        };
        state.sync_status.insert(source_id.to_string(), next.clone());
        Ok(next)
    }

    async fn checkpoint_sync(&self, source_id: &str, counters: &SyncCounters) -> Result<()> {
        let mut state = self.state.write().await;
        match state.sync_status.get_mut(source_id) {
            Some(status) if status.is_running() => {
                status.counters = counters.clone();
                Ok(())
            }
            Some(status) => Err(TrackerError::IllegalTransition {
                entity: "sync",
                from: status.state.to_string(),
                to: SyncState::Syncing.to_string(),
            }),
            None => Err(TrackerError::not_found("sync", source_id)),
        }
    }

    async fn finish_sync(&self, status: SyncStatus) -> Result<()> {
        let mut state = self.state.write().await;
        let current = state
            .sync_status
            .get(&status.source_id)
            .map(|s| s.state)
            .unwrap_or(SyncState::Idle);
        if current != SyncState::Syncing || !current.can_transition_to(status.state) {
            return Err(TrackerError::IllegalTransition {
                entity: "sync",
                from: current.to_string(),
                to: status.state.to_string(),
            });
        }

        let history = state
            .sync_history
            .entry(status.source_id.clone())
            .or_default();
        history.insert(0, status.clone());
        history.truncate(MAX_SYNC_HISTORY);
        state.sync_status.insert(status.source_id.clone(), status);
        Ok(())
    }

    async fn sync_status(&self, source_id: &str) -> Result<SyncStatus> {
        let state = self.state.read().await;
        Ok(state
            .sync_status
            .get(source_id)
            .cloned()
            .unwrap_or_else(|| SyncStatus::idle(source_id)))
    }

    async fn sync_history(&self, source_id: &str) -> Result<Vec<SyncStatus>> {
        let state = self.state.read().await;
        Ok(state.sync_history.get(source_id).cloned().unwrap_or_default())
    }

    // ── Review queue ───────────────────────────────────────────

    async fn enqueue_review(&self, item: ReviewItem) -> Result<ReviewItem> {
        let mut state = self.state.write().await;
        let key = item.record.key();
        if let Some(existing) = state
            .reviews
            .values_mut()
            .find(|r| r.is_pending() && r.record.key() == key)
        {
            existing.record = item.record;
            existing.candidates = item.candidates;
            return Ok(existing.clone());
        }
        state.reviews.insert(item.id, item.clone());
        Ok(item)
    }

    async fn get_review(&self, id: Uuid) -> Result<Option<ReviewItem>> {
        Ok(self.state.read().await.reviews.get(&id).cloned())
    }

    async fn pending_review_for(&self, key: &SourceKey) -> Result<Option<ReviewItem>> {
        let state = self.state.read().await;
        Ok(state
            .reviews
            .values()
            .find(|r| r.is_pending() && r.record.key() == *key)
            .cloned())
    }

    async fn pending_reviews(&self) -> Result<Vec<ReviewItem>> {
        let state = self.state.read().await;
        let mut items: Vec<ReviewItem> = state
            .reviews
            .values()
            .filter(|r| r.is_pending())
            .cloned()
            .collect();
        items.sort_by(|a, b| a.queued_at.cmp(&b.queued_at).then(a.id.cmp(&b.id)));
        Ok(items)
    }

    // ── Audit ──────────────────────────────────────────────────

    async fn append_audit(&self, entry: MergeAuditEntry) -> Result<()> {
        self.state.write().await.audit.push(entry);
        Ok(())
    }

    async fn audit_trail(&self, actor_id: ActorId) -> Result<Vec<MergeAuditEntry>> {
        let state = self.state.read().await;
        Ok(state
            .audit
            .iter()
            .filter(|e| e.actor_id == actor_id || e.absorbed_actor_id == Some(actor_id))
            .cloned()
            .collect())
    }
}
