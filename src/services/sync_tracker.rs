//! Per-source sync sessions
//!
//! A run moves its source `idle → syncing → {completed | failed}`. Each
//! record resolution commits on its own, so a failed or cancelled run keeps
//! whatever it committed and a replay only does the remaining work: records
//! already stored with the same content hash come back `Unchanged`.
//!
//! Relationship hints are resolved within the run's source. A hint whose
//! superior has not been seen yet waits until the end of the run.

use chrono::Utc;
use futures::future::join_all;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::chain_graph::{ChainGraph, EdgeChange};
use super::identity_resolver::{IdentityResolver, ResolutionOutcome};
use super::scoring::{ScoreTrigger, ScoringEngine};
use crate::connectors::SourceConnector;
use crate::error::{ErrorClass, Result, TrackerError};
use crate::models::*;
use crate::store::TrackerStore;

/// Counters are checkpointed to the store every this many records
pub const DEFAULT_CHECKPOINT_EVERY: u64 = 25;

struct PendingHint {
    subordinate: ActorId,
    subordinate_external_id: String,
    hint: RelationshipHint,
}

/// Mutable state of one run
struct Session<'a> {
    source_id: &'a str,
    counters: SyncCounters,
    /// External ids resolved during this run
    resolved: HashMap<String, ActorId>,
    deferred: Vec<PendingHint>,
}

pub struct SyncTracker {
    store: Arc<dyn TrackerStore>,
    resolver: Arc<IdentityResolver>,
    graph: Arc<ChainGraph>,
    scoring: Arc<ScoringEngine>,
    checkpoint_every: u64,
}

impl SyncTracker {
    pub fn new(
        store: Arc<dyn TrackerStore>,
        resolver: Arc<IdentityResolver>,
        graph: Arc<ChainGraph>,
        scoring: Arc<ScoringEngine>,
    ) -> Self {
        Self {
            store,
            resolver,
            graph,
            scoring,
            checkpoint_every: DEFAULT_CHECKPOINT_EVERY,
        }
    }

    pub fn with_checkpoint_every(mut self, every: u64) -> Self {
        self.checkpoint_every = every.max(1);
        self
    }

    /// Run one sync for the connector's source.
    ///
    /// Returns the completed status. On failure or cancellation the failed
    /// status (with partial counters) is stored and the error is returned.
    #[instrument(skip(self, connector, cancel), fields(source_id = %connector.source_id()))]
    pub async fn run(
        &self,
        connector: &dyn SourceConnector,
        cancel: &CancellationToken,
    ) -> Result<SyncStatus> {
        let source_id = connector.source_id();
        let started_at = Utc::now();
        let clock = Instant::now();
        let begun = self.store.try_begin_sync(source_id, started_at).await?;
        info!(run = begun.run_count, "Sync started");

        let mut session = Session {
            source_id,
            counters: SyncCounters::default(),
            resolved: HashMap::new(),
            deferred: Vec::new(),
        };
        let result = self.drive(connector, cancel, &mut session).await;

        let finished_at = Utc::now();
        let mut status = SyncStatus {
            source_id: source_id.to_string(),
            state: SyncState::Completed,
            started_at: Some(started_at),
            finished_at: Some(finished_at),
            duration_ms: Some(clock.elapsed().as_millis() as u64),
            counters: session.counters,
            last_error: None,
            run_count: begun.run_count,
        };

        match result {
            Ok(()) => {
                if let Err(err) = self.store.finish_sync(status.clone()).await {
                    // Never leave the source stuck in `syncing`
                    status.state = SyncState::Failed;
                    status.last_error = Some(err.to_string());
                    if let Err(store_err) = self.store.finish_sync(status).await {
                        error!(error = %store_err, "Could not record failed sync status");
                    }
                    warn!(error = %err, class = %err.class(), "Sync completed but its status could not be stored");
                    return Err(err);
                }
                info!(
                    processed = status.counters.processed,
                    created = status.counters.created,
                    updated = status.counters.updated,
                    linked = status.counters.linked,
                    unchanged = status.counters.unchanged,
                    rejected = status.counters.rejected,
                    queued_for_review = status.counters.queued_for_review,
                    duration_ms = status.duration_ms,
                    "Sync completed"
                );
                Ok(status)
            }
            Err(err) => {
                status.state = SyncState::Failed;
                status.last_error = Some(match &err {
                    TrackerError::Cancelled { .. } => "cancelled".to_string(),
                    other => other.to_string(),
                });
                if let Err(store_err) = self.store.finish_sync(status.clone()).await {
                    error!(error = %store_err, "Could not record failed sync status");
                }
                warn!(
                    error = %err,
                    class = %err.class(),
                    processed = status.counters.processed,
                    "Sync failed"
                );
                Err(err)
            }
        }
    }

    async fn drive(
        &self,
        connector: &dyn SourceConnector,
        cancel: &CancellationToken,
        session: &mut Session<'_>,
    ) -> Result<()> {
        let mut records = connector.records();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(TrackerError::Cancelled { source_id: session.source_id.to_string() });
                }
                next = records.next() => next,
            };
            let Some(item) = next else { break };

            match item {
                Ok(record) => self.process(record, session).await?,
                Err(err) if err.class() == ErrorClass::Validation => {
                    session.counters.seen += 1;
                    session.counters.rejected += 1;
                    warn!(error = %err, "Connector yielded malformed record");
                }
                Err(err) => return Err(err),
            }

            if session.counters.seen % self.checkpoint_every == 0 {
                self.store
                    .checkpoint_sync(session.source_id, &session.counters)
                    .await?;
            }
        }

        let deferred = std::mem::take(&mut session.deferred);
        for pending in deferred {
            if cancel.is_cancelled() {
                return Err(TrackerError::Cancelled {
                    source_id: session.source_id.to_string(),
                });
            }
            match self
                .superior_for(session, &pending.hint.superior_external_id)
                .await?
            {
                Some(superior) => self.add_hinted_edge(superior, &pending, session).await?,
                None => {
                    session.counters.edges_deferred += 1;
                    debug!(
                        external_id = %pending.subordinate_external_id,
                        superior_external_id = %pending.hint.superior_external_id,
                        "Relationship hint left unresolved"
                    );
                }
            }
        }
        Ok(())
    }

    async fn process(&self, record: RawRecord, session: &mut Session<'_>) -> Result<()> {
        session.counters.seen += 1;
        if record.source_id != session.source_id {
            session.counters.rejected += 1;
            warn!(
                record_source = %record.source_id,
                external_id = %record.external_id,
                "Record from another source rejected"
            );
            return Ok(());
        }

        let resolution = match self.resolver.resolve(&record).await {
            Ok(resolution) => resolution,
            Err(TrackerError::AmbiguousMatch { .. }) => {
                session.counters.queued_for_review += 1;
                return Ok(());
            }
            Err(err) if err.class() == ErrorClass::Validation => {
                session.counters.rejected += 1;
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        let counters = &mut session.counters;
        match resolution.outcome {
            ResolutionOutcome::Created => {
                counters.processed += 1;
                counters.created += 1;
            }
            ResolutionOutcome::Updated => {
                counters.processed += 1;
                counters.updated += 1;
            }
            ResolutionOutcome::Linked { .. } => {
                counters.processed += 1;
                counters.linked += 1;
            }
            ResolutionOutcome::Unchanged => counters.unchanged += 1,
        }
        session
            .resolved
            .insert(record.external_id.clone(), resolution.actor_id);

        for hint in record.relationships {
            let pending = PendingHint {
                subordinate: resolution.actor_id,
                subordinate_external_id: record.external_id.clone(),
                hint,
            };
            match self
                .superior_for(session, &pending.hint.superior_external_id)
                .await?
            {
                Some(superior) => self.add_hinted_edge(superior, &pending, session).await?,
                None => session.deferred.push(pending),
            }
        }
        Ok(())
    }

    async fn superior_for(&self, session: &Session<'_>, external_id: &str) -> Result<Option<ActorId>> {
        if let Some(id) = session.resolved.get(external_id) {
            return Ok(Some(*id));
        }
        let key = SourceKey::new(session.source_id, external_id);
        Ok(self.store.find_source_record(&key).await?.map(|l| l.actor_id))
    }

    async fn add_hinted_edge(
        &self,
        superior: ActorId,
        pending: &PendingHint,
        session: &mut Session<'_>,
    ) -> Result<()> {
        let hint = &pending.hint;
        let new = NewChainEdge {
            superior_id: superior,
            subordinate_id: pending.subordinate,
            relationship_type: hint.relationship_type.clone(),
            organization: hint.organization.clone(),
            confidence: hint.confidence,
            window: ValidityWindow {
                start_date: hint.start_date,
                end_date: hint.end_date,
            },
            evidence_ids: Vec::new(),
            notes: None,
        };

        match self.graph.add_edge(new).await {
            Ok(added) => {
                if matches!(added.change, EdgeChange::Created | EdgeChange::Reopened) {
                    session.counters.edges_added += 1;
                }
                if added.affects_scores() {
                    self.scoring
                        .apply_trigger(ScoreTrigger::EdgeConfidenceChanged(added.edge.id))
                        .await?;
                }
                Ok(())
            }
            // Cycles, archived or unknown endpoints, bad windows
            Err(err) if matches!(err.class(), ErrorClass::Validation | ErrorClass::Structural) => {
                session.counters.edges_rejected += 1;
                warn!(
                    error = %err,
                    external_id = %pending.subordinate_external_id,
                    "Relationship hint rejected"
                );
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Sync several sources concurrently; one result per connector, in order
    pub async fn run_all(
        &self,
        connectors: &[Arc<dyn SourceConnector>],
        cancel: &CancellationToken,
    ) -> Vec<Result<SyncStatus>> {
        join_all(connectors.iter().map(|c| self.run(c.as_ref(), cancel))).await
    }

    pub async fn status(&self, source_id: &str) -> Result<SyncStatus> {
        self.store.sync_status(source_id).await
    }

    pub async fn history(&self, source_id: &str) -> Result<Vec<SyncStatus>> {
        self.store.sync_history(source_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrackerConfig;
    use crate::connectors::VecConnector;
    use crate::entity_linking::WeightedNameComparator;
    use crate::services::locks::WriteLocks;
    use crate::store::{CandidateQuery, InMemoryStore, MergePlan, ResolutionCommit};

    fn tracker() -> (SyncTracker, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        (tracker_over(store.clone()), store)
    }

    fn tracker_over(store: Arc<dyn TrackerStore>) -> SyncTracker {
        let config = TrackerConfig::default();
        let locks = Arc::new(WriteLocks::new());
        let resolver = Arc::new(IdentityResolver::new(
            store.clone(),
            Arc::new(WeightedNameComparator::default()),
            config.resolver.clone(),
            locks.clone(),
        ));
        let graph = Arc::new(ChainGraph::new(store.clone(), config.graph.clone(), locks.clone()));
        let scoring = Arc::new(ScoringEngine::new(
            store.clone(),
            graph.clone(),
            config.scoring.clone(),
            locks,
        ));
        SyncTracker::new(store, resolver, graph, scoring)
    }

    fn officer(id: &str, name: &str) -> RawRecord {
        RawRecord::new("mss_leaks", id, ActorType::Official, NameFields::new(name))
    }

    fn reports_to(superior: &str) -> RelationshipHint {
        RelationshipHint {
            superior_external_id: superior.into(),
            relationship_type: "command".into(),
            organization: Some("MSS".into()),
            confidence: 0.8,
            start_date: None,
            end_date: None,
        }
    }

    #[tokio::test]
    async fn test_forward_hints_resolve_at_end_of_run() {
        let (tracker, _) = tracker();
        let records = vec![
            officer("E-2", "Zhang Wei").with_relationship(reports_to("E-1")),
            officer("E-1", "Liu Yang"),
            officer("E-3", "Chen Jie").with_relationship(reports_to("E-9")),
        ];
        let status = tracker
            .run(&VecConnector::new("mss_leaks", records), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(status.state, SyncState::Completed);
        assert_eq!(status.counters.created, 3);
        assert_eq!(status.counters.edges_added, 1);
        assert_eq!(status.counters.edges_deferred, 1);
    }

    #[tokio::test]
    async fn test_cycle_hint_counted_not_fatal() {
        let (tracker, _) = tracker();
        let records = vec![
            officer("E-1", "Liu Yang").with_relationship(reports_to("E-2")),
            officer("E-2", "Zhang Wei").with_relationship(reports_to("E-1")),
        ];
        let status = tracker
            .run(&VecConnector::new("mss_leaks", records), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(status.counters.edges_added, 1);
        assert_eq!(status.counters.edges_rejected, 1);
    }

    #[tokio::test]
    async fn test_rejects_foreign_and_invalid_records() {
        let (tracker, store) = tracker();
        let records = vec![
            officer("E-1", "Liu Yang"),
            RawRecord::new("other", "X-1", ActorType::Official, NameFields::new("Someone")),
            officer("E-2", "Zhang Wei").with_confidence(3.0),
        ];
        let status = tracker
            .run(&VecConnector::new("mss_leaks", records), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(status.counters.seen, 3);
        assert_eq!(status.counters.rejected, 2);
        assert_eq!(store.actor_count().await.unwrap(), 1);
    }

    /// Delegates to the in-memory store but refuses the first completed finish
    struct RefusesCompletion {
        inner: InMemoryStore,
        refused: std::sync::atomic::AtomicBool,
    }

    #[async_trait::async_trait]
    impl TrackerStore for RefusesCompletion {
        async fn get_actor(&self, id: ActorId) -> Result<Option<Actor>> {
            self.inner.get_actor(id).await
        }
        async fn search_actors(&self, query: &ActorQuery) -> Result<Vec<Actor>> {
            self.inner.search_actors(query).await
        }
        async fn candidate_actors(&self, query: &CandidateQuery) -> Result<Vec<Actor>> {
            self.inner.candidate_actors(query).await
        }
        async fn archive_actor(&self, id: ActorId, at: chrono::DateTime<Utc>) -> Result<Actor> {
            self.inner.archive_actor(id, at).await
        }
        async fn actor_count(&self) -> Result<usize> {
            self.inner.actor_count().await
        }
        async fn find_source_record(&self, key: &SourceKey) -> Result<Option<SourceRecord>> {
            self.inner.find_source_record(key).await
        }
        async fn source_records_for(&self, actor_id: ActorId) -> Result<Vec<SourceRecord>> {
            self.inner.source_records_for(actor_id).await
        }
        async fn commit_resolution(&self, commit: ResolutionCommit) -> Result<()> {
            self.inner.commit_resolution(commit).await
        }
        async fn apply_merge(&self, plan: MergePlan) -> Result<usize> {
            self.inner.apply_merge(plan).await
        }
        async fn get_edge(&self, id: EdgeId) -> Result<Option<ChainEdge>> {
            self.inner.get_edge(id).await
        }
        async fn find_edge(&self, key: &EdgeKey) -> Result<Option<ChainEdge>> {
            self.inner.find_edge(key).await
        }
        async fn upsert_edge(&self, edge: ChainEdge) -> Result<()> {
            self.inner.upsert_edge(edge).await
        }
        async fn list_edges(&self) -> Result<Vec<ChainEdge>> {
            self.inner.list_edges().await
        }
        async fn edges_touching(&self, actor_id: ActorId) -> Result<Vec<ChainEdge>> {
            self.inner.edges_touching(actor_id).await
        }
        async fn insert_case(&self, case: Case) -> Result<()> {
            self.inner.insert_case(case).await
        }
        async fn get_case(&self, id: CaseId) -> Result<Option<Case>> {
            self.inner.get_case(id).await
        }
        async fn update_case(&self, case: Case) -> Result<()> {
            self.inner.update_case(case).await
        }
        async fn cases_for_actor(&self, actor_id: ActorId) -> Result<Vec<Case>> {
            self.inner.cases_for_actor(actor_id).await
        }
        async fn insert_evidence(&self, evidence: Evidence) -> Result<()> {
            self.inner.insert_evidence(evidence).await
        }
        async fn get_evidence(&self, id: EvidenceId) -> Result<Option<Evidence>> {
            self.inner.get_evidence(id).await
        }
        async fn update_evidence(&self, evidence: Evidence) -> Result<()> {
            self.inner.update_evidence(evidence).await
        }
        async fn evidence_for_case(&self, case_id: CaseId) -> Result<Vec<Evidence>> {
            self.inner.evidence_for_case(case_id).await
        }
        async fn get_candidate(&self, actor_id: ActorId) -> Result<Option<SanctionCandidate>> {
            self.inner.get_candidate(actor_id).await
        }
        async fn upsert_candidate(&self, candidate: SanctionCandidate) -> Result<()> {
            self.inner.upsert_candidate(candidate).await
        }
        async fn list_candidates(&self) -> Result<Vec<SanctionCandidate>> {
            self.inner.list_candidates().await
        }
        async fn try_begin_sync(&self, source_id: &str, at: chrono::DateTime<Utc>) -> Result<SyncStatus> {
            self.inner.try_begin_sync(source_id, at).await
        }
        async fn checkpoint_sync(&self, source_id: &str, counters: &SyncCounters) -> Result<()> {
            self.inner.checkpoint_sync(source_id, counters).await
        }
        async fn finish_sync(&self, status: SyncStatus) -> Result<()> {
            if status.state == SyncState::Completed
                && !self.refused.swap(true, std::sync::atomic::Ordering::SeqCst)
            {
                return Err(TrackerError::Transient("status table unavailable".into()));
            }
            self.inner.finish_sync(status).await
        }
        async fn sync_status(&self, source_id: &str) -> Result<SyncStatus> {
            self.inner.sync_status(source_id).await
        }
        async fn sync_history(&self, source_id: &str) -> Result<Vec<SyncStatus>> {
            self.inner.sync_history(source_id).await
        }
        async fn enqueue_review(&self, item: ReviewItem) -> Result<ReviewItem> {
            self.inner.enqueue_review(item).await
        }
        async fn get_review(&self, id: uuid::Uuid) -> Result<Option<ReviewItem>> {
            self.inner.get_review(id).await
        }
        async fn pending_review_for(&self, key: &SourceKey) -> Result<Option<ReviewItem>> {
            self.inner.pending_review_for(key).await
        }
        async fn pending_reviews(&self) -> Result<Vec<ReviewItem>> {
            self.inner.pending_reviews().await
        }
        async fn append_audit(&self, entry: MergeAuditEntry) -> Result<()> {
            self.inner.append_audit(entry).await
        }
        async fn audit_trail(&self, actor_id: ActorId) -> Result<Vec<MergeAuditEntry>> {
            self.inner.audit_trail(actor_id).await
        }
    }

    #[tokio::test]
    async fn test_unrecorded_completion_does_not_wedge_source() {
        let store: Arc<dyn TrackerStore> = Arc::new(RefusesCompletion {
            inner: InMemoryStore::new(),
            refused: std::sync::atomic::AtomicBool::new(false),
        });
        let tracker = tracker_over(store.clone());
        let feed = VecConnector::new("mss_leaks", vec![officer("E-1", "Liu Yang")]);

        let err = tracker.run(&feed, &CancellationToken::new()).await.unwrap_err();
        assert!(err.is_retryable());
        let status = tracker.status("mss_leaks").await.unwrap();
        assert_eq!(status.state, SyncState::Failed);
        assert!(status.last_error.as_deref().unwrap().contains("status table unavailable"));

        let again = tracker.run(&feed, &CancellationToken::new()).await.unwrap();
        assert_eq!(again.state, SyncState::Completed);
        assert_eq!(again.counters.unchanged, 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_records_failure() {
        let (tracker, _) = tracker();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = tracker
            .run(
                &VecConnector::new("mss_leaks", vec![officer("E-1", "Liu Yang")]),
                &cancel,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TrackerError::Cancelled { .. }));

        let status = tracker.status("mss_leaks").await.unwrap();
        assert_eq!(status.state, SyncState::Failed);
        assert_eq!(status.last_error.as_deref(), Some("cancelled"));
        assert_eq!(status.counters.processed, 0);
        assert_eq!(tracker.history("mss_leaks").await.unwrap().len(), 1);
    }
}
