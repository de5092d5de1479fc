//! Tracker facade
//!
//! Wires the services over one store and one set of write locks, exposes the
//! query-layer operations, and fires the score triggers that follow case,
//! evidence, edge and merge mutations.

use chrono::NaiveDate;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::config::TrackerConfig;
use crate::connectors::SourceConnector;
use crate::entity_linking::{NameComparator, WeightedNameComparator};
use crate::error::Result;
use crate::models::*;
use crate::services::{
    AddedEdge, CaseService, ChainGraph, IdentityResolver, MergeOutcome, Resolution, ScoreTrigger,
    ScoringEngine, SyncTracker, WriteLocks,
};
use crate::store::TrackerStore;

pub struct Tracker {
    store: Arc<dyn TrackerStore>,
    config: TrackerConfig,
    resolver: Arc<IdentityResolver>,
    graph: Arc<ChainGraph>,
    cases: CaseService,
    scoring: Arc<ScoringEngine>,
    sync: SyncTracker,
}

impl Tracker {
    /// Tracker with the default weighted comparator
    pub fn new(store: Arc<dyn TrackerStore>, config: TrackerConfig) -> Result<Self> {
        let comparator = Arc::new(WeightedNameComparator::new(config.comparator.clone()));
        Self::with_comparator(store, config, comparator)
    }

    pub fn with_comparator(
        store: Arc<dyn TrackerStore>,
        config: TrackerConfig,
        comparator: Arc<dyn NameComparator>,
    ) -> Result<Self> {
        config.validate()?;
        let locks = Arc::new(WriteLocks::new());
        let resolver = Arc::new(IdentityResolver::new(
            store.clone(),
            comparator,
            config.resolver.clone(),
            locks.clone(),
        ));
        let graph = Arc::new(ChainGraph::new(
            store.clone(),
            config.graph.clone(),
            locks.clone(),
        ));
        let scoring = Arc::new(ScoringEngine::new(
            store.clone(),
            graph.clone(),
            config.scoring.clone(),
            locks.clone(),
        ));
        let cases = CaseService::new(store.clone(), locks);
        let sync = SyncTracker::new(
            store.clone(),
            resolver.clone(),
            graph.clone(),
            scoring.clone(),
        );
        Ok(Self {
            store,
            config,
            resolver,
            graph,
            cases,
            scoring,
            sync,
        })
    }

    pub fn store(&self) -> &Arc<dyn TrackerStore> {
        &self.store
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn resolver(&self) -> &IdentityResolver {
        &self.resolver
    }

    pub fn graph(&self) -> &ChainGraph {
        &self.graph
    }

    pub fn cases(&self) -> &CaseService {
        &self.cases
    }

    pub fn scoring(&self) -> &ScoringEngine {
        &self.scoring
    }

    pub fn sync(&self) -> &SyncTracker {
        &self.sync
    }

    // ── Query-layer operations ─────────────────────────────────

    pub async fn resolve_or_create(&self, record: &RawRecord) -> Result<Resolution> {
        self.resolver.resolve(record).await
    }

    pub async fn reporting_chain(&self, actor_id: ActorId) -> Result<Vec<ActorId>> {
        self.graph.reporting_chain(actor_id).await
    }

    pub async fn centrality(&self, actor_id: ActorId) -> Result<usize> {
        self.graph.centrality(actor_id).await
    }

    pub async fn candidate_list(&self, filter: &CandidateFilter) -> Result<Vec<SanctionCandidate>> {
        self.scoring.candidate_list(filter).await
    }

    pub async fn sync_status(&self, source_id: &str) -> Result<SyncStatus> {
        self.sync.status(source_id).await
    }

    // ── Mutations with score triggers ──────────────────────────

    pub async fn sync_source(
        &self,
        connector: &dyn SourceConnector,
        cancel: &CancellationToken,
    ) -> Result<SyncStatus> {
        self.sync.run(connector, cancel).await
    }

    pub async fn sync_all(
        &self,
        connectors: &[Arc<dyn SourceConnector>],
        cancel: &CancellationToken,
    ) -> Vec<Result<SyncStatus>> {
        self.sync.run_all(connectors, cancel).await
    }

    pub async fn link_actor(&self, case_id: CaseId, actor_id: ActorId, role: &str) -> Result<Case> {
        let (case, linked) = self.cases.link_actor(case_id, actor_id, role, None).await?;
        if linked {
            self.scoring
                .apply_trigger(ScoreTrigger::CaseLinked { case_id, actor_id })
                .await?;
        }
        Ok(case)
    }

    /// Advance a case; archiving drops it out of every linked actor's score
    pub async fn advance_case_status(&self, case_id: CaseId, next: CaseStatus) -> Result<Case> {
        let case = self.cases.advance_case_status(case_id, next).await?;
        self.rescore_case_actors(&case).await?;
        Ok(case)
    }

    pub async fn reopen_case(&self, case_id: CaseId) -> Result<Case> {
        let case = self.cases.reopen_case(case_id).await?;
        self.rescore_case_actors(&case).await?;
        Ok(case)
    }

    async fn rescore_case_actors(&self, case: &Case) -> Result<()> {
        let rescored = self
            .scoring
            .rescore_existing(case.actors.iter().map(|a| a.actor_id))
            .await?;
        debug!(case_id = %case.id, status = %case.status, rescored = rescored.len(), "Rescored after case change");
        Ok(())
    }

    /// Attach evidence and rescore the case's candidates; unverified
    /// evidence lowers the verified ratio
    pub async fn attach_evidence(&self, new: NewEvidence) -> Result<Evidence> {
        let evidence = self.cases.attach_evidence(new).await?;
        let case = self.cases.get_case(evidence.case_id).await?;
        self.rescore_case_actors(&case).await?;
        Ok(evidence)
    }

    pub async fn verify_evidence(
        &self,
        evidence_id: EvidenceId,
        verifier: &str,
        date: NaiveDate,
    ) -> Result<Evidence> {
        let (evidence, changed) = self.cases.verify_evidence(evidence_id, verifier, date).await?;
        if changed {
            self.scoring
                .apply_trigger(ScoreTrigger::EvidenceVerified(evidence_id))
                .await?;
        }
        Ok(evidence)
    }

    pub async fn add_edge(&self, new: NewChainEdge) -> Result<AddedEdge> {
        let added = self.graph.add_edge(new).await?;
        if added.affects_scores() {
            self.scoring
                .apply_trigger(ScoreTrigger::EdgeConfidenceChanged(added.edge.id))
                .await?;
        }
        Ok(added)
    }

    pub async fn deactivate_edge(&self, edge_id: EdgeId, end_date: NaiveDate) -> Result<ChainEdge> {
        let edge = self.graph.deactivate_edge(edge_id, end_date).await?;
        self.scoring
            .apply_trigger(ScoreTrigger::EdgeConfidenceChanged(edge_id))
            .await?;
        Ok(edge)
    }

    /// Merge two actors, then rescore the survivor and everyone above it
    pub async fn merge_actors(&self, survivor_id: ActorId, absorbed_id: ActorId) -> Result<MergeOutcome> {
        let outcome = self.resolver.merge_actors(survivor_id, absorbed_id).await?;
        let mut affected = self.graph.active_ancestors(survivor_id).await?;
        affected.push(survivor_id);
        let rescored = self.scoring.rescore_existing(affected).await?;
        debug!(survivor_id = %survivor_id, rescored = rescored.len(), "Rescored after merge");
        Ok(outcome)
    }

    pub async fn resolve_review(&self, item_id: Uuid, decision: ReviewDecision) -> Result<Resolution> {
        self.resolver.resolve_review(item_id, decision).await
    }
}
