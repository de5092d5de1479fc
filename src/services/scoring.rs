//! Sanctions scoring engine
//!
//! `score = w_e·E + w_c·C + w_s·S` where, over the actor's non-archived cases:
//!
//! - `E = (verified / total) · v / (v + k_e)` with `v` the verified count
//! - `C = c / (c + k_c)` with `c` the actor's centrality
//! - `S = (mean severity − 1) / 9`
//!
//! Every input is read from the store, so a stored score can always be
//! re-derived and checked.

use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::chain_graph::ChainGraph;
use super::locks::WriteLocks;
use crate::config::ScoringConfig;
use crate::error::{Result, TrackerError};
use crate::models::*;
use crate::store::TrackerStore;

/// Tolerance when comparing a stored score with its re-derivation
const REDERIVE_TOLERANCE: f64 = 1e-9;

/// Stored-state change that may move candidate scores
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreTrigger {
    EvidenceVerified(EvidenceId),
    CaseLinked { case_id: CaseId, actor_id: ActorId },
    /// Confidence change, insert, or deactivation of an edge
    EdgeConfidenceChanged(EdgeId),
}

/// Result of re-deriving a candidate's score from stored data
#[derive(Debug, Clone)]
pub struct Rederivation {
    pub actor_id: ActorId,
    pub stored: f64,
    pub derived: f64,
    pub breakdown: ScoreBreakdown,
    pub matches: bool,
}

/// Pure score computation over already-loaded inputs
pub fn score_breakdown(
    cases: &[Case],
    evidence: &[Evidence],
    centrality: usize,
    config: &ScoringConfig,
) -> ScoreBreakdown {
    let live: BTreeSet<CaseId> = cases
        .iter()
        .filter(|c| c.status != CaseStatus::Archived)
        .map(|c| c.id)
        .collect();

    let considered: Vec<&Evidence> = evidence.iter().filter(|e| live.contains(&e.case_id)).collect();
    let total = considered.len();
    let verified = considered.iter().filter(|e| e.is_verified).count();
    let evidence_component = if total == 0 {
        0.0
    } else {
        let ratio = verified as f64 / total as f64;
        let v = verified as f64;
        ratio * v / (v + config.evidence_half_saturation)
    };

    let c = centrality as f64;
    let centrality_component = c / (c + config.centrality_half_saturation);

    let severities: Vec<f64> = cases
        .iter()
        .filter(|c| live.contains(&c.id))
        .filter_map(|c| c.severity)
        .map(f64::from)
        .collect();
    let mean_severity = if severities.is_empty() {
        None
    } else {
        Some(severities.iter().sum::<f64>() / severities.len() as f64)
    };
    let severity_component = mean_severity.map_or(0.0, |m| ((m - 1.0) / 9.0).clamp(0.0, 1.0));

    ScoreBreakdown {
        evidence_component,
        centrality_component,
        severity_component,
        verified_evidence: verified,
        total_evidence: total,
        centrality,
        mean_severity,
        case_count: live.len(),
        weights: config.weights,
    }
}

pub struct ScoringEngine {
    store: Arc<dyn TrackerStore>,
    graph: Arc<ChainGraph>,
    config: ScoringConfig,
    locks: Arc<WriteLocks>,
}

impl ScoringEngine {
    pub fn new(
        store: Arc<dyn TrackerStore>,
        graph: Arc<ChainGraph>,
        config: ScoringConfig,
        locks: Arc<WriteLocks>,
    ) -> Self {
        Self {
            store,
            graph,
            config,
            locks,
        }
    }

    /// Score inputs for an actor, plus the cases that contributed
    pub async fn compute_breakdown(&self, actor_id: ActorId) -> Result<(ScoreBreakdown, Vec<CaseId>)> {
        let centrality = self.graph.centrality(actor_id).await?;
        let cases = self.store.cases_for_actor(actor_id).await?;
        let mut evidence = Vec::new();
        for case in cases.iter().filter(|c| c.status != CaseStatus::Archived) {
            evidence.extend(self.store.evidence_for_case(case.id).await?);
        }
        let breakdown = score_breakdown(&cases, &evidence, centrality, &self.config);
        let supporting = cases
            .iter()
            .filter(|c| c.status != CaseStatus::Archived)
            .map(|c| c.id)
            .collect();
        Ok((breakdown, supporting))
    }

    /// Flag an actor as a sanction candidate; nominating twice returns the
    /// existing candidate
    #[instrument(skip(self))]
    pub async fn nominate(&self, actor_id: ActorId) -> Result<SanctionCandidate> {
        let _guard = self.locks.candidates().await;
        if let Some(existing) = self.store.get_candidate(actor_id).await? {
            return Ok(existing);
        }
        let actor = self
            .store
            .get_actor(actor_id)
            .await?
            .ok_or_else(|| TrackerError::not_found("actor", actor_id))?;
        if actor.is_archived() {
            return Err(TrackerError::IllegalTransition {
                entity: "actor",
                from: "archived".into(),
                to: "sanction candidate".into(),
            });
        }

        let (breakdown, supporting_cases) = self.compute_breakdown(actor_id).await?;
        let score = breakdown.score();
        let now = Utc::now();
        let candidate = SanctionCandidate {
            id: Uuid::new_v4(),
            actor_id,
            status: SanctionStatus::Candidate,
            evidence_strength_score: score,
            priority_level: self.config.priority_level(score),
            breakdown,
            score_computed_at: now,
            supporting_cases,
            recommendation_date: None,
            proposed_sanctions: Vec::new(),
            legal_basis: None,
            reviewing_body: None,
            decision_date: None,
            decision_notes: None,
            created_at: now,
            updated_at: now,
        };
        self.store.upsert_candidate(candidate.clone()).await?;
        info!(
            actor_id = %actor_id,
            score,
            priority_level = candidate.priority_level,
            "Sanction candidate nominated"
        );
        Ok(candidate)
    }

    pub async fn get_candidate(&self, actor_id: ActorId) -> Result<SanctionCandidate> {
        self.store
            .get_candidate(actor_id)
            .await?
            .ok_or_else(|| TrackerError::not_found("sanction_candidate", actor_id))
    }

    /// Recompute a candidate's score from current stored state
    pub async fn recompute(&self, actor_id: ActorId) -> Result<SanctionCandidate> {
        let _guard = self.locks.candidates().await;
        let candidate = self.get_candidate(actor_id).await?;
        self.refresh(candidate).await
    }

    async fn refresh(&self, mut candidate: SanctionCandidate) -> Result<SanctionCandidate> {
        let (breakdown, supporting_cases) = self.compute_breakdown(candidate.actor_id).await?;
        let score = breakdown.score();
        let previous = candidate.evidence_strength_score;
        let now = Utc::now();

        candidate.evidence_strength_score = score;
        candidate.priority_level = self.config.priority_level(score);
        candidate.breakdown = breakdown;
        candidate.supporting_cases = supporting_cases;
        candidate.score_computed_at = now;
        candidate.updated_at = now;
        self.store.upsert_candidate(candidate.clone()).await?;
        debug!(
            actor_id = %candidate.actor_id,
            previous,
            score,
            priority_level = candidate.priority_level,
            "Candidate score recomputed"
        );
        Ok(candidate)
    }

    /// Move a candidate forward and record the decision fields
    #[instrument(skip(self, update))]
    pub async fn transition(
        &self,
        actor_id: ActorId,
        next: SanctionStatus,
        update: DecisionUpdate,
    ) -> Result<SanctionCandidate> {
        let _guard = self.locks.candidates().await;
        let mut candidate = self.get_candidate(actor_id).await?;
        if !candidate.status.can_transition_to(next) {
            return Err(TrackerError::IllegalTransition {
                entity: "sanction_candidate",
                from: candidate.status.to_string(),
                to: next.to_string(),
            });
        }
        let from = candidate.status;
        let today = Utc::now().date_naive();

        candidate.status = next;
        if next == SanctionStatus::Proposed && candidate.recommendation_date.is_none() {
            candidate.recommendation_date = Some(today);
        }
        if next.is_final() {
            candidate.decision_date = Some(today);
        }
        apply_decision(&mut candidate, update);
        candidate.updated_at = Utc::now();
        self.store.upsert_candidate(candidate.clone()).await?;
        info!(actor_id = %actor_id, from = %from, to = %next, "Candidate status changed");
        Ok(candidate)
    }

    /// Explicit reopen of a final decision back to review
    pub async fn reopen(&self, actor_id: ActorId, notes: impl Into<String>) -> Result<SanctionCandidate> {
        let _guard = self.locks.candidates().await;
        let mut candidate = self.get_candidate(actor_id).await?;
        if !candidate.status.is_final() {
            return Err(TrackerError::IllegalTransition {
                entity: "sanction_candidate",
                from: candidate.status.to_string(),
                to: SanctionStatus::UnderReview.to_string(),
            });
        }
        let from = candidate.status;
        candidate.status = SanctionStatus::UnderReview;
        candidate.decision_date = None;
        candidate.decision_notes = Some(notes.into());
        candidate.updated_at = Utc::now();
        self.store.upsert_candidate(candidate.clone()).await?;
        info!(actor_id = %actor_id, from = %from, "Candidate reopened for review");
        Ok(candidate)
    }

    /// Recompute from stored data without writing, for audit
    pub async fn rederive(&self, actor_id: ActorId) -> Result<Rederivation> {
        let candidate = self.get_candidate(actor_id).await?;
        let (breakdown, _) = self.compute_breakdown(actor_id).await?;
        let derived = breakdown.score();
        let stored = candidate.evidence_strength_score;
        Ok(Rederivation {
            actor_id,
            stored,
            derived,
            matches: (stored - derived).abs() <= REDERIVE_TOLERANCE,
            breakdown,
        })
    }

    /// Candidates ranked by priority, then score (highest first), then actor id
    pub async fn candidate_list(&self, filter: &CandidateFilter) -> Result<Vec<SanctionCandidate>> {
        let mut candidates: Vec<SanctionCandidate> = self
            .store
            .list_candidates()
            .await?
            .into_iter()
            .filter(|c| filter.matches(c))
            .collect();
        candidates.sort_by(|a, b| {
            a.priority_level
                .cmp(&b.priority_level)
                .then(b.evidence_strength_score.total_cmp(&a.evidence_strength_score))
                .then(a.actor_id.cmp(&b.actor_id))
        });
        Ok(candidates
            .into_iter()
            .skip(filter.offset)
            .take(filter.effective_limit())
            .collect())
    }

    /// Recompute every existing candidate the trigger can affect.
    /// Returns the actors whose candidates were rescored.
    #[instrument(skip(self))]
    pub async fn apply_trigger(&self, trigger: ScoreTrigger) -> Result<Vec<ActorId>> {
        let affected: BTreeSet<ActorId> = match trigger {
            ScoreTrigger::EvidenceVerified(evidence_id) => {
                let evidence = self
                    .store
                    .get_evidence(evidence_id)
                    .await?
                    .ok_or_else(|| TrackerError::not_found("evidence", evidence_id))?;
                match self.store.get_case(evidence.case_id).await? {
                    Some(case) => case.actors.iter().map(|a| a.actor_id).collect(),
                    None => BTreeSet::new(),
                }
            }
            ScoreTrigger::CaseLinked { actor_id, .. } => BTreeSet::from([actor_id]),
            ScoreTrigger::EdgeConfidenceChanged(edge_id) => {
                let edge = self.graph.get_edge(edge_id).await?;
                let mut above: BTreeSet<ActorId> =
                    self.graph.active_ancestors(edge.superior_id).await?.into_iter().collect();
                above.insert(edge.superior_id);
                above
            }
        };

        let rescored = self.rescore_existing(affected).await?;
        debug!(trigger = ?trigger, rescored = rescored.len(), "Applied score trigger");
        Ok(rescored)
    }

    /// Recompute the candidates of those actors that have one
    pub async fn rescore_existing(
        &self,
        actors: impl IntoIterator<Item = ActorId>,
    ) -> Result<Vec<ActorId>> {
        let _guard = self.locks.candidates().await;
        let mut rescored = Vec::new();
        for actor_id in actors {
            if let Some(candidate) = self.store.get_candidate(actor_id).await? {
                self.refresh(candidate).await?;
                rescored.push(actor_id);
            }
        }
        Ok(rescored)
    }
}

fn apply_decision(candidate: &mut SanctionCandidate, update: DecisionUpdate) {
    if update.notes.is_some() {
        candidate.decision_notes = update.notes;
    }
    if update.reviewing_body.is_some() {
        candidate.reviewing_body = update.reviewing_body;
    }
    if update.legal_basis.is_some() {
        candidate.legal_basis = update.legal_basis;
    }
    if let Some(proposed) = update.proposed_sanctions {
        candidate.proposed_sanctions = proposed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn case(severity: u8) -> Case {
        let now = Utc::now();
        Case {
            id: Uuid::new_v4(),
            title: format!("severity {}", severity),
            title_korean: None,
            case_number: None,
            status: CaseStatus::Documented,
            tnr_type: Some(TnrType::DirectAttack),
            date_occurred: None,
            country: None,
            summary: None,
            severity: Some(severity),
            tags: vec![],
            actors: vec![],
            created_at: now,
            updated_at: now,
        }
    }

    fn evidence(case_id: CaseId, verified: bool) -> Evidence {
        Evidence {
            id: Uuid::new_v4(),
            case_id,
            evidence_type: EvidenceType::Document,
            title: "exhibit".into(),
            description: None,
            source_name: None,
            source_url: None,
            file_hash: None,
            authenticity_score: Some(0.9),
            is_verified: verified,
            verified_by: None,
            verification_date: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_reference_score() {
        let cases: Vec<Case> = [8, 9, 7].into_iter().map(case).collect();
        let evidence: Vec<Evidence> = cases.iter().map(|c| evidence(c.id, true)).collect();
        let breakdown = score_breakdown(&cases, &evidence, 12, &ScoringConfig::default());

        assert!((breakdown.evidence_component - 0.5).abs() < 1e-12);
        assert!((breakdown.centrality_component - 12.0 / 22.0).abs() < 1e-12);
        assert!((breakdown.severity_component - 7.0 / 9.0).abs() < 1e-12);
        let score = breakdown.score();
        assert!((score - 0.569_191_919).abs() < 1e-6, "score {score}");
        assert_eq!(ScoringConfig::default().priority_level(score), 3);
    }

    #[test]
    fn test_unverified_evidence_dilutes() {
        let cases = vec![case(5)];
        let all_verified = vec![evidence(cases[0].id, true), evidence(cases[0].id, true)];
        let half = vec![evidence(cases[0].id, true), evidence(cases[0].id, false)];
        let config = ScoringConfig::default();
        assert!(
            score_breakdown(&cases, &half, 0, &config).score()
                < score_breakdown(&cases, &all_verified, 0, &config).score()
        );
    }

    #[test]
    fn test_archived_cases_excluded() {
        let mut cases = vec![case(10), case(2)];
        cases[0].status = CaseStatus::Archived;
        let evidence = vec![evidence(cases[0].id, true)];
        let breakdown = score_breakdown(&cases, &evidence, 0, &ScoringConfig::default());
        assert_eq!(breakdown.case_count, 1);
        assert_eq!(breakdown.total_evidence, 0);
        assert_eq!(breakdown.mean_severity, Some(2.0));
    }

    #[test]
    fn test_empty_inputs_score_zero() {
        let breakdown = score_breakdown(&[], &[], 0, &ScoringConfig::default());
        assert_eq!(breakdown.score(), 0.0);
        assert_eq!(ScoringConfig::default().priority_level(0.0), 5);
    }
}
