//! Identity resolver
//!
//! Decides, per raw record, whether it denotes an existing canonical actor
//! or a new one:
//!
//! 1. **Exact path**: a source link for (source, external_id) exists. The
//!    actor is refreshed only when the incoming confidence is at least the
//!    stored one and the content actually changed.
//! 2. **Fuzzy path**: candidates sharing a blocking key are scored by the
//!    pluggable comparator. The best is linked when it clears the merge
//!    threshold and leads the runner-up by more than the ambiguity margin.
//!    A runner-up inside the margin sends the record to manual review.
//! 3. Otherwise a new actor is created.
//!
//! Every write goes through the single-writer merge queue, so two syncs can
//! never both create an actor for the same entity, and the exact-path lookup
//! is repeated inside the queue.

use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::locks::WriteLocks;
use crate::config::ResolverConfig;
use crate::entity_linking::{normalize_nationality, MatchProfile, NameComparator};
use crate::error::{Result, TrackerError};
use crate::graph::{find_cycle, ChainIndex};
use crate::models::*;
use crate::store::{CandidateQuery, MergePlan, ResolutionCommit, TrackerStore};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResolutionOutcome {
    /// New canonical actor
    Created,
    /// Exact-path refresh of an existing actor
    Updated,
    /// Exact path, nothing to commit (same content or lower confidence)
    Unchanged,
    /// Linked to an existing actor by similarity or by a reviewer
    Linked { score: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolution {
    pub actor_id: ActorId,
    pub outcome: ResolutionOutcome,
}

/// Outcome of scoring one record against its candidates
#[derive(Debug, Clone, PartialEq)]
pub enum MatchDecision {
    Link {
        actor_id: ActorId,
        score: f64,
        runner_up: Option<f64>,
    },
    /// Best match cleared the threshold but is not clearly ahead
    Ambiguous { candidates: Vec<(ActorId, f64)> },
    Create { best: Option<(ActorId, f64)> },
}

/// Apply the merge rule to candidates sorted best first
pub fn decide(scored: &[(ActorId, f64)], config: &ResolverConfig) -> MatchDecision {
    let Some(&(best_id, best)) = scored.first() else {
        return MatchDecision::Create { best: None };
    };
    if best < config.merge_threshold {
        return MatchDecision::Create {
            best: Some((best_id, best)),
        };
    }
    let runner_up = scored.get(1).map(|(_, s)| *s);
    match runner_up {
        Some(second) if best - second <= config.ambiguity_margin => MatchDecision::Ambiguous {
            candidates: scored
                .iter()
                .filter(|(_, s)| best - s <= config.ambiguity_margin)
                .copied()
                .collect(),
        },
        _ => MatchDecision::Link {
            actor_id: best_id,
            score: best,
            runner_up,
        },
    }
}

/// Summary of a completed actor merge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub survivor_id: ActorId,
    pub absorbed_id: ActorId,
    pub links_repointed: usize,
    pub edges_repointed: usize,
    pub edges_dropped: usize,
    pub cases_updated: usize,
}

pub struct IdentityResolver {
    store: Arc<dyn TrackerStore>,
    comparator: Arc<dyn NameComparator>,
    config: ResolverConfig,
    locks: Arc<WriteLocks>,
}

impl IdentityResolver {
    pub fn new(
        store: Arc<dyn TrackerStore>,
        comparator: Arc<dyn NameComparator>,
        config: ResolverConfig,
        locks: Arc<WriteLocks>,
    ) -> Self {
        Self {
            store,
            comparator,
            config,
            locks,
        }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Resolve a raw record to its canonical actor, creating one if needed.
    ///
    /// Fails with `Validation` for malformed input (nothing persisted) and
    /// with `AmbiguousMatch` when the record was queued for manual review.
    #[instrument(skip(self, record), fields(source_id = %record.source_id, external_id = %record.external_id))]
    pub async fn resolve(&self, record: &RawRecord) -> Result<Resolution> {
        if let Err(err) = record.validate() {
            warn!(error = %err, "Rejected raw record");
            return Err(err);
        }
        let key = record.key();
        let hash = record.content_hash();

        // Unchanged replays never wait on the merge queue
        if let Some(link) = self.store.find_source_record(&key).await? {
            if link.content_hash == hash {
                debug!(actor_id = %link.actor_id, "Record unchanged since last commit");
                return Ok(Resolution {
                    actor_id: link.actor_id,
                    outcome: ResolutionOutcome::Unchanged,
                });
            }
        }

        let _queue = self.locks.merge().await;
        match self.store.find_source_record(&key).await? {
            Some(link) => self.resolve_exact(record, link, hash).await,
            None => self.resolve_fuzzy(record, hash).await,
        }
    }

    async fn resolve_exact(
        &self,
        record: &RawRecord,
        link: SourceRecord,
        hash: String,
    ) -> Result<Resolution> {
        let unchanged = Resolution {
            actor_id: link.actor_id,
            outcome: ResolutionOutcome::Unchanged,
        };
        if link.content_hash == hash {
            return Ok(unchanged);
        }
        if record.confidence < link.confidence {
            debug!(
                actor_id = %link.actor_id,
                incoming = record.confidence,
                stored = link.confidence,
                "Lower-confidence record left untouched"
            );
            return Ok(unchanged);
        }

        let mut actor = self.store.get_actor(link.actor_id).await?.ok_or_else(|| {
            TrackerError::Invariant(format!(
                "source record {} points at missing actor {}",
                link.key(),
                link.actor_id
            ))
        })?;

        let now = Utc::now();
        fold_record(&mut actor, record, true);
        actor.record_provenance(provenance(record, link.method, record.confidence));
        actor.updated_at = now;

        let link = SourceRecord {
            confidence: record.confidence,
            content_hash: hash,
            last_seen: now,
            ..link
        };
        let audit = MergeAuditEntry::new(
            AuditAction::ExactUpdate,
            actor.id,
            link.method,
            record.confidence,
        )
        .for_source(link.key());

        info!(
            actor_id = %actor.id,
            method = %link.method,
            confidence = record.confidence,
            "Exact-path update"
        );
        let actor_id = actor.id;
        self.store
            .commit_resolution(ResolutionCommit {
                actor,
                link,
                audit,
                expect_new_link: false,
                resolved_review: None,
            })
            .await?;

        Ok(Resolution {
            actor_id,
            outcome: ResolutionOutcome::Updated,
        })
    }

    async fn resolve_fuzzy(&self, record: &RawRecord, hash: String) -> Result<Resolution> {
        let profile = MatchProfile::from_record(record);
        let query = CandidateQuery {
            tokens: profile.blocking_tokens(),
            nationality: record.nationality.as_deref().and_then(normalize_nationality),
            actor_type: record.actor_type,
            limit: self.config.candidate_limit,
        };
        let candidates = self.store.candidate_actors(&query).await?;

        let mut scored: Vec<(ActorId, f64)> = candidates
            .iter()
            .map(|actor| {
                let score = self
                    .comparator
                    .compare(&profile, &MatchProfile::from_actor(actor));
                (actor.id, if score.is_finite() { score.clamp(0.0, 1.0) } else { 0.0 })
            })
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        debug!(
            candidates = scored.len(),
            best = scored.first().map(|c| c.1),
            comparator = self.comparator.name(),
            "Scored fuzzy candidates"
        );

        let stale_review = self
            .store
            .pending_review_for(&record.key())
            .await?
            .map(|r| r.id);

        match decide(&scored, &self.config) {
            MatchDecision::Link {
                actor_id,
                score,
                runner_up,
            } => {
                let mut actor = candidates
                    .into_iter()
                    .find(|a| a.id == actor_id)
                    .ok_or_else(|| {
                        TrackerError::Invariant(format!("scored actor {} vanished", actor_id))
                    })?;
                let now = Utc::now();
                fold_record(&mut actor, record, false);
                actor.record_provenance(provenance(record, MatchMethod::Predicted, score));
                actor.updated_at = now;

                let audit = MergeAuditEntry::new(
                    AuditAction::FuzzyLink,
                    actor_id,
                    MatchMethod::Predicted,
                    score,
                )
                .for_source(record.key())
                .with_scores(score, runner_up);

                info!(
                    actor_id = %actor_id,
                    method = %MatchMethod::Predicted,
                    confidence = score,
                    runner_up = runner_up,
                    "Linked record to existing actor"
                );
                self.store
                    .commit_resolution(ResolutionCommit {
                        link: new_link(record, actor_id, score, MatchMethod::Predicted, hash),
                        actor,
                        audit,
                        expect_new_link: true,
                        resolved_review: stale_review,
                    })
                    .await?;

                Ok(Resolution {
                    actor_id,
                    outcome: ResolutionOutcome::Linked { score },
                })
            }
            MatchDecision::Ambiguous { candidates } => {
                let item = self
                    .store
                    .enqueue_review(ReviewItem {
                        id: Uuid::new_v4(),
                        record: record.clone(),
                        candidates: candidates.clone(),
                        queued_at: Utc::now(),
                        resolved_at: None,
                        resolved_actor_id: None,
                    })
                    .await?;
                warn!(
                    review_item_id = %item.id,
                    best = candidates.first().map(|c| c.1),
                    runner_up = candidates.get(1).map(|c| c.1),
                    "Ambiguous match queued for manual review"
                );
                Err(TrackerError::AmbiguousMatch {
                    source_id: record.source_id.clone(),
                    external_id: record.external_id.clone(),
                    review_item_id: item.id,
                    candidates,
                })
            }
            MatchDecision::Create { best } => {
                self.create(
                    record,
                    hash,
                    MatchMethod::RuleBased,
                    record.confidence,
                    best,
                    stale_review,
                )
                .await
            }
        }
    }

    async fn create(
        &self,
        record: &RawRecord,
        hash: String,
        method: MatchMethod,
        confidence: f64,
        best: Option<(ActorId, f64)>,
        resolved_review: Option<Uuid>,
    ) -> Result<Resolution> {
        let mut actor = actor_from_record(record)?;
        actor.record_provenance(provenance(record, method, confidence));

        let mut audit = MergeAuditEntry::new(AuditAction::Created, actor.id, method, confidence)
            .for_source(record.key());
        if let Some((_, score)) = best {
            audit = audit.with_scores(score, None);
        }

        info!(
            actor_id = %actor.id,
            method = %method,
            confidence = confidence,
            best_candidate = best.map(|b| b.1),
            "Created canonical actor"
        );
        let actor_id = actor.id;
        self.store
            .commit_resolution(ResolutionCommit {
                link: new_link(record, actor_id, confidence, method, hash),
                actor,
                audit,
                expect_new_link: true,
                resolved_review,
            })
            .await?;

        Ok(Resolution {
            actor_id,
            outcome: ResolutionOutcome::Created,
        })
    }

    /// Apply a reviewer's decision to a queued record
    #[instrument(skip(self))]
    pub async fn resolve_review(&self, item_id: Uuid, decision: ReviewDecision) -> Result<Resolution> {
        let _queue = self.locks.merge().await;

        let item = self
            .store
            .get_review(item_id)
            .await?
            .ok_or_else(|| TrackerError::not_found("review_item", item_id))?;
        if !item.is_pending() {
            return Err(TrackerError::IllegalTransition {
                entity: "review_item",
                from: "resolved".into(),
                to: "resolved".into(),
            });
        }
        let record = &item.record;
        record.validate()?;
        if let Some(link) = self.store.find_source_record(&record.key()).await? {
            return Err(TrackerError::IllegalTransition {
                entity: "review_item",
                from: format!("linked to {}", link.actor_id),
                to: "resolved".into(),
            });
        }
        let hash = record.content_hash();

        match decision {
            ReviewDecision::CreateNew => {
                self.create(record, hash, MatchMethod::Manual, 1.0, None, Some(item.id))
                    .await
            }
            ReviewDecision::LinkTo(actor_id) => {
                let mut actor = self
                    .store
                    .get_actor(actor_id)
                    .await?
                    .ok_or_else(|| TrackerError::not_found("actor", actor_id))?;
                if actor.is_archived() {
                    return Err(TrackerError::IllegalTransition {
                        entity: "actor",
                        from: "archived".into(),
                        to: "linked".into(),
                    });
                }
                let now = Utc::now();
                fold_record(&mut actor, record, false);
                actor.record_provenance(provenance(record, MatchMethod::Manual, 1.0));
                actor.updated_at = now;

                let mut audit =
                    MergeAuditEntry::new(AuditAction::ManualLink, actor_id, MatchMethod::Manual, 1.0)
                        .for_source(record.key());
                if let Some((_, score)) = item.candidates.iter().find(|(id, _)| *id == actor_id) {
                    audit = audit.with_scores(*score, None);
                }

                info!(actor_id = %actor_id, method = %MatchMethod::Manual, confidence = 1.0, "Reviewer linked record");
                self.store
                    .commit_resolution(ResolutionCommit {
                        link: new_link(record, actor_id, 1.0, MatchMethod::Manual, hash),
                        actor,
                        audit,
                        expect_new_link: true,
                        resolved_review: Some(item.id),
                    })
                    .await?;
                Ok(Resolution {
                    actor_id,
                    outcome: ResolutionOutcome::Linked { score: 1.0 },
                })
            }
        }
    }

    /// Fold `absorbed` into `survivor`.
    ///
    /// Source links, chain edges, case links and the sanction candidate move
    /// to the survivor; self-loops are dropped and duplicate edges collapse
    /// onto the one active today, or the higher-confidence one when both
    /// are active or both ended. Fails with `CycleDetected`, leaving the
    /// store untouched, when the merged graph would contain an active cycle.
    #[instrument(skip(self))]
    pub async fn merge_actors(&self, survivor_id: ActorId, absorbed_id: ActorId) -> Result<MergeOutcome> {
        if survivor_id == absorbed_id {
            return Err(TrackerError::validation(
                "actor",
                absorbed_id.to_string(),
                "cannot merge an actor into itself",
            ));
        }
        let _queue = self.locks.merge().await;
        let _graph = self.locks.graph().await;
        let _candidates = self.locks.candidates().await;

        let mut survivor = self.live_actor(survivor_id).await?;
        let absorbed = self.live_actor(absorbed_id).await?;
        let now = Utc::now();

        absorb_actor(&mut survivor, &absorbed);
        survivor.updated_at = now;
        let mut archived = absorbed;
        archived.archived_at = Some(now);
        archived.merged_into = Some(survivor_id);
        archived.updated_at = now;

        let edges = self.store.list_edges().await?;
        let rewrite = rewrite_edges(&edges, survivor_id, absorbed_id, now);
        let index = ChainIndex::active_on(rewrite.edges.iter(), now.date_naive());
        if let Some(cycle) = find_cycle(&index) {
            warn!(cycle = ?cycle, "Merge rejected: merged chain would contain a cycle");
            return Err(TrackerError::CycleDetected {
                superior: cycle[0],
                subordinate: cycle.get(1).copied().unwrap_or(cycle[0]),
                path: cycle,
            });
        }

        let mut updated_cases = self.store.cases_for_actor(absorbed_id).await?;
        for case in &mut updated_cases {
            for link in &mut case.actors {
                if link.actor_id == absorbed_id {
                    link.actor_id = survivor_id;
                }
            }
            let mut seen = HashSet::new();
            case.actors
                .retain(|a| seen.insert((a.actor_id, a.role.clone())));
            case.updated_at = now;
        }

        let candidate = match (
            self.store.get_candidate(survivor_id).await?,
            self.store.get_candidate(absorbed_id).await?,
        ) {
            (Some(kept), _) => Some(kept),
            (None, Some(mut moved)) => {
                moved.actor_id = survivor_id;
                moved.updated_at = now;
                Some(moved)
            }
            (None, None) => None,
        };

        let audit = MergeAuditEntry::new(AuditAction::ActorMerge, survivor_id, MatchMethod::Manual, 1.0)
            .absorbing(absorbed_id);

        let edges_repointed = rewrite.upsert.len();
        let edges_dropped = rewrite.remove.len();
        let cases_updated = updated_cases.len();
        let links_repointed = self
            .store
            .apply_merge(MergePlan {
                survivor,
                absorbed: archived,
                upsert_edges: rewrite.upsert,
                remove_edges: rewrite.remove,
                updated_cases,
                candidate,
                audit,
            })
            .await?;

        info!(
            survivor_id = %survivor_id,
            absorbed_id = %absorbed_id,
            links_repointed,
            edges_repointed,
            edges_dropped,
            cases_updated,
            "Merged actors"
        );
        Ok(MergeOutcome {
            survivor_id,
            absorbed_id,
            links_repointed,
            edges_repointed,
            edges_dropped,
            cases_updated,
        })
    }

    /// Deactivate an actor; it keeps its links but stops matching
    pub async fn archive_actor(&self, actor_id: ActorId) -> Result<Actor> {
        let _queue = self.locks.merge().await;
        let current = self
            .store
            .get_actor(actor_id)
            .await?
            .ok_or_else(|| TrackerError::not_found("actor", actor_id))?;
        if current.is_archived() {
            return Ok(current);
        }
        let actor = self.store.archive_actor(actor_id, Utc::now()).await?;
        self.store
            .append_audit(MergeAuditEntry::new(
                AuditAction::ArchivedActor,
                actor_id,
                MatchMethod::Manual,
                1.0,
            ))
            .await?;
        info!(actor_id = %actor_id, "Archived actor");
        Ok(actor)
    }

    pub async fn get_actor(&self, actor_id: ActorId) -> Result<Actor> {
        self.store
            .get_actor(actor_id)
            .await?
            .ok_or_else(|| TrackerError::not_found("actor", actor_id))
    }

    pub async fn search_actors(&self, query: &ActorQuery) -> Result<Vec<Actor>> {
        self.store.search_actors(query).await
    }

    pub async fn audit_trail(&self, actor_id: ActorId) -> Result<Vec<MergeAuditEntry>> {
        self.store.audit_trail(actor_id).await
    }

    pub async fn pending_reviews(&self) -> Result<Vec<ReviewItem>> {
        self.store.pending_reviews().await
    }

    async fn live_actor(&self, actor_id: ActorId) -> Result<Actor> {
        let actor = self.get_actor(actor_id).await?;
        if actor.is_archived() {
            return Err(TrackerError::IllegalTransition {
                entity: "actor",
                from: "archived".into(),
                to: "merged".into(),
            });
        }
        Ok(actor)
    }
}

fn provenance(record: &RawRecord, method: MatchMethod, confidence: f64) -> Provenance {
    Provenance {
        source_id: record.source_id.clone(),
        external_id: record.external_id.clone(),
        confidence,
        method,
        recorded_at: Utc::now(),
    }
}

fn new_link(
    record: &RawRecord,
    actor_id: ActorId,
    confidence: f64,
    method: MatchMethod,
    content_hash: String,
) -> SourceRecord {
    let now = Utc::now();
    let key = record.key();
    SourceRecord {
        id: key.record_id(),
        source_id: key.source_id,
        external_id: key.external_id,
        actor_id,
        confidence,
        method,
        content_hash,
        first_seen: now,
        last_seen: now,
    }
}

fn actor_from_record(record: &RawRecord) -> Result<Actor> {
    let names = &record.names;
    let display = names.display_name().ok_or_else(|| {
        TrackerError::validation(&record.source_id, &record.external_id, "record carries no name")
    })?;
    let mut actor = Actor::new(display.trim(), record.actor_type);
    actor.name_korean = names.name_korean.clone();
    actor.name_russian = names.name_russian.clone();
    actor.absorb_names(names);
    fold_record(&mut actor, record, true);
    Ok(actor)
}

/// Copy record attributes onto the actor; without `overwrite` only gaps are filled
fn fold_record(actor: &mut Actor, record: &RawRecord, overwrite: bool) {
    fn apply<T: Clone>(slot: &mut Option<T>, incoming: &Option<T>, overwrite: bool) {
        if incoming.is_some() && (overwrite || slot.is_none()) {
            slot.clone_from(incoming);
        }
    }

    actor.absorb_names(&record.names);
    apply(&mut actor.nationality, &record.nationality, overwrite);
    apply(&mut actor.organization, &record.organization, overwrite);
    apply(&mut actor.position, &record.position, overwrite);
    apply(&mut actor.date_of_birth, &record.date_of_birth, overwrite);
    apply(&mut actor.description, &record.description, overwrite);
    for (key, value) in &record.attributes {
        if overwrite || !actor.attributes.contains_key(key) {
            actor.attributes.insert(key.clone(), value.clone());
        }
    }
}

fn absorb_actor(survivor: &mut Actor, absorbed: &Actor) {
    survivor.absorb_names(&absorbed.name_fields());
    for (slot, incoming) in [
        (&mut survivor.nationality, &absorbed.nationality),
        (&mut survivor.organization, &absorbed.organization),
        (&mut survivor.position, &absorbed.position),
        (&mut survivor.description, &absorbed.description),
    ] {
        if slot.is_none() {
            slot.clone_from(incoming);
        }
    }
    if survivor.date_of_birth.is_none() {
        survivor.date_of_birth = absorbed.date_of_birth;
    }
    for (key, value) in &absorbed.attributes {
        survivor
            .attributes
            .entry(key.clone())
            .or_insert_with(|| value.clone());
    }
    for entry in &absorbed.provenance {
        survivor.record_provenance(entry.clone());
    }
}

/// Edge changes planned by a merge
#[derive(Debug, Default)]
pub(crate) struct EdgeRewrite {
    pub upsert: Vec<ChainEdge>,
    pub remove: Vec<EdgeId>,
    /// Full edge set after the merge
    pub edges: Vec<ChainEdge>,
}

pub(crate) fn rewrite_edges(
    edges: &[ChainEdge],
    survivor: ActorId,
    absorbed: ActorId,
    now: chrono::DateTime<Utc>,
) -> EdgeRewrite {
    let touches = |e: &ChainEdge| e.superior_id == absorbed || e.subordinate_id == absorbed;
    let today = now.date_naive();

    let mut by_key: std::collections::HashMap<EdgeKey, ChainEdge> = edges
        .iter()
        .filter(|e| !touches(e))
        .map(|e| (e.key(), e.clone()))
        .collect();
    let mut rewrite = EdgeRewrite::default();

    for edge in edges.iter().filter(|e| touches(e)) {
        let mut edge = edge.clone();
        if edge.superior_id == absorbed {
            edge.superior_id = survivor;
        }
        if edge.subordinate_id == absorbed {
            edge.subordinate_id = survivor;
        }
        if edge.superior_id == edge.subordinate_id {
            rewrite.remove.push(edge.id);
            continue;
        }
        edge.updated_at = now;

        match by_key.get_mut(&edge.key()) {
            Some(existing) => {
                // An active edge always survives a collision with an ended one
                let incoming_wins = match (edge.is_active_on(today), existing.is_active_on(today)) {
                    (true, false) => true,
                    (false, true) => false,
                    _ => edge.confidence > existing.confidence,
                };
                let (mut winner, loser) = if incoming_wins {
                    (edge, existing.clone())
                } else {
                    (existing.clone(), edge)
                };
                for evidence in loser.evidence_ids {
                    if !winner.evidence_ids.contains(&evidence) {
                        winner.evidence_ids.push(evidence);
                    }
                }
                winner.updated_at = now;
                rewrite.upsert.retain(|e| e.id != loser.id && e.id != winner.id);
                rewrite.remove.push(loser.id);
                rewrite.upsert.push(winner.clone());
                *existing = winner;
            }
            None => {
                by_key.insert(edge.key(), edge.clone());
                rewrite.upsert.push(edge);
            }
        }
    }

    rewrite.edges = by_key.into_values().collect();
    rewrite.edges.sort_by_key(|e| e.id);
    rewrite
}
