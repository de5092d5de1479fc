//! Chain-of-command graph builder
//!
//! Owns every edge mutation. Inserts and re-opens run a reachability check
//! from the subordinate back to the superior over the edges active today
//! and are rejected with `CycleDetected` before anything is written.
//! Queries load the edge list and run the pure traversals in `crate::graph`.

use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::locks::WriteLocks;
use crate::config::GraphConfig;
use crate::error::{Result, TrackerError};
use crate::graph::{self, ChainIndex};
use crate::models::*;
use crate::store::TrackerStore;

/// What `add_edge` did to the stored edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeChange {
    Created,
    /// A deactivated edge with the same key became active again
    Reopened,
    /// An active edge with the same key was refreshed in place
    Updated { confidence_changed: bool },
}

#[derive(Debug, Clone)]
pub struct AddedEdge {
    pub edge: ChainEdge,
    pub change: EdgeChange,
}

impl AddedEdge {
    /// Whether scores of actors above this edge may have moved
    pub fn affects_scores(&self) -> bool {
        !matches!(
            self.change,
            EdgeChange::Updated {
                confidence_changed: false
            }
        )
    }
}

pub struct ChainGraph {
    store: Arc<dyn TrackerStore>,
    config: GraphConfig,
    locks: Arc<WriteLocks>,
}

impl ChainGraph {
    pub fn new(store: Arc<dyn TrackerStore>, config: GraphConfig, locks: Arc<WriteLocks>) -> Self {
        Self {
            store,
            config,
            locks,
        }
    }

    // ── Mutations ──────────────────────────────────────────────

    /// Insert a superior → subordinate edge, or refresh the one with the same
    /// (superior, subordinate, organization) key.
    #[instrument(skip(self, new), fields(superior = %new.superior_id, subordinate = %new.subordinate_id))]
    pub async fn add_edge(&self, new: NewChainEdge) -> Result<AddedEdge> {
        if new.superior_id == new.subordinate_id {
            return Err(TrackerError::CycleDetected {
                superior: new.superior_id,
                subordinate: new.subordinate_id,
                path: vec![new.superior_id, new.subordinate_id],
            });
        }
        let reject = |reason: String| {
            Err(TrackerError::validation(
                "chain_edge",
                format!("{}->{}", new.superior_id, new.subordinate_id),
                reason,
            ))
        };
        if !crate::models::raw::in_unit_range(new.confidence) {
            return reject(format!("confidence {} outside [0, 1]", new.confidence));
        }
        if !new.window.is_well_formed() {
            return reject("validity window ends before it starts".into());
        }
        if new.relationship_type.trim().is_empty() {
            return reject("relationship_type is empty".into());
        }

        let _graph = self.locks.graph().await;
        self.live_endpoint(new.superior_id).await?;
        self.live_endpoint(new.subordinate_id).await?;

        let today = Utc::now().date_naive();
        let now = Utc::now();
        let existing = self.store.find_edge(&new.key()).await?;

        let (edge, change) = match existing {
            Some(mut edge) if edge.is_active_on(today) => {
                let confidence_changed = edge.confidence != new.confidence;
                edge.confidence = new.confidence;
                edge.relationship_type = new.relationship_type.clone();
                if new.window.start_date.is_some() {
                    edge.start_date = new.window.start_date;
                }
                if new.window.end_date.is_some() {
                    edge.end_date = new.window.end_date;
                }
                merge_evidence(&mut edge.evidence_ids, &new.evidence_ids);
                if new.notes.is_some() {
                    edge.notes.clone_from(&new.notes);
                }
                edge.updated_at = now;
                (edge, EdgeChange::Updated { confidence_changed })
            }
            Some(mut edge) => {
                edge.confidence = new.confidence;
                edge.relationship_type = new.relationship_type.clone();
                edge.start_date = new.window.start_date.or(edge.start_date);
                edge.end_date = new.window.end_date;
                merge_evidence(&mut edge.evidence_ids, &new.evidence_ids);
                if new.notes.is_some() {
                    edge.notes.clone_from(&new.notes);
                }
                edge.updated_at = now;
                (edge, EdgeChange::Reopened)
            }
            None => (
                ChainEdge {
                    id: Uuid::new_v4(),
                    superior_id: new.superior_id,
                    subordinate_id: new.subordinate_id,
                    relationship_type: new.relationship_type.clone(),
                    organization: new.organization.clone(),
                    confidence: new.confidence,
                    start_date: new.window.start_date,
                    end_date: new.window.end_date,
                    evidence_ids: new.evidence_ids.clone(),
                    notes: new.notes.clone(),
                    created_at: now,
                    updated_at: now,
                },
                EdgeChange::Created,
            ),
        };

        if !matches!(change, EdgeChange::Updated { .. }) && edge.is_active_on(today) {
            let index = ChainIndex::active_on(self.store.list_edges().await?.iter(), today);
            if let Some(back) = graph::find_path(&index, edge.subordinate_id, edge.superior_id, None)
            {
                let mut path = Vec::with_capacity(back.len() + 1);
                path.push(edge.superior_id);
                path.extend(back);
                warn!(path = ?path, "Edge rejected: would close a cycle");
                return Err(TrackerError::CycleDetected {
                    superior: edge.superior_id,
                    subordinate: edge.subordinate_id,
                    path,
                });
            }
        }

        self.store.upsert_edge(edge.clone()).await?;
        info!(
            edge_id = %edge.id,
            change = ?change,
            confidence = edge.confidence,
            organization = edge.organization.as_deref().unwrap_or(""),
            "Chain edge stored"
        );
        Ok(AddedEdge { edge, change })
    }

    /// End an edge on `end_date`; it stays in the history
    #[instrument(skip(self))]
    pub async fn deactivate_edge(&self, edge_id: EdgeId, end_date: NaiveDate) -> Result<ChainEdge> {
        let _graph = self.locks.graph().await;
        let mut edge = self
            .store
            .get_edge(edge_id)
            .await?
            .ok_or_else(|| TrackerError::not_found("chain_edge", edge_id))?;
        if let Some(ended) = edge.end_date {
            return Err(TrackerError::IllegalTransition {
                entity: "chain_edge",
                from: format!("ended {}", ended),
                to: format!("ended {}", end_date),
            });
        }
        if edge.start_date.is_some_and(|start| end_date < start) {
            return Err(TrackerError::validation(
                "chain_edge",
                edge_id.to_string(),
                format!("end date {} precedes start date", end_date),
            ));
        }
        edge.end_date = Some(end_date);
        edge.updated_at = Utc::now();
        self.store.upsert_edge(edge.clone()).await?;
        info!(edge_id = %edge_id, end_date = %end_date, "Chain edge deactivated");
        Ok(edge)
    }

    // ── Queries ────────────────────────────────────────────────

    /// Edges active on `date`, indexed for traversal
    pub async fn active_index(&self, date: NaiveDate) -> Result<ChainIndex> {
        let edges = self.store.list_edges().await?;
        Ok(ChainIndex::active_on(edges.iter(), date))
    }

    /// Ordered ancestors of `actor_id` as of today, nearest first
    pub async fn reporting_chain(&self, actor_id: ActorId) -> Result<Vec<ActorId>> {
        self.reporting_chain_on(actor_id, Utc::now().date_naive())
            .await
    }

    pub async fn reporting_chain_on(&self, actor_id: ActorId, date: NaiveDate) -> Result<Vec<ActorId>> {
        self.known_actor(actor_id).await?;
        let index = self.active_index(date).await?;
        let chain = graph::reporting_chain(&index, actor_id, self.config.max_traversal_steps);
        debug!(actor_id = %actor_id, depth = chain.len(), "Computed reporting chain");
        Ok(chain)
    }

    /// Distinct actors transitively below `actor_id` over active edges
    pub async fn centrality(&self, actor_id: ActorId) -> Result<usize> {
        self.known_actor(actor_id).await?;
        let index = self.active_index(Utc::now().date_naive()).await?;
        Ok(graph::centrality(&index, actor_id))
    }

    pub async fn subordinates(
        &self,
        actor_id: ActorId,
        max_depth: Option<usize>,
    ) -> Result<Vec<(ActorId, usize)>> {
        self.known_actor(actor_id).await?;
        let index = self.active_index(Utc::now().date_naive()).await?;
        Ok(graph::descendants(&index, actor_id, max_depth))
    }

    /// Every active ancestor of `actor_id`, over all superior edges
    pub async fn active_ancestors(&self, actor_id: ActorId) -> Result<Vec<ActorId>> {
        let index = self.active_index(Utc::now().date_naive()).await?;
        Ok(graph::ancestors(&index, actor_id))
    }

    /// All edges touching the actor, ended ones included, by start date
    pub async fn edge_history(&self, actor_id: ActorId) -> Result<Vec<ChainEdge>> {
        self.known_actor(actor_id).await?;
        self.store.edges_touching(actor_id).await
    }

    pub async fn get_edge(&self, edge_id: EdgeId) -> Result<ChainEdge> {
        self.store
            .get_edge(edge_id)
            .await?
            .ok_or_else(|| TrackerError::not_found("chain_edge", edge_id))
    }

    async fn known_actor(&self, actor_id: ActorId) -> Result<Actor> {
        self.store
            .get_actor(actor_id)
            .await?
            .ok_or_else(|| TrackerError::not_found("actor", actor_id))
    }

    async fn live_endpoint(&self, actor_id: ActorId) -> Result<()> {
        let actor = self.known_actor(actor_id).await?;
        if actor.is_archived() {
            return Err(TrackerError::IllegalTransition {
                entity: "actor",
                from: "archived".into(),
                to: "chain_edge endpoint".into(),
            });
        }
        Ok(())
    }
}

fn merge_evidence(into: &mut Vec<Uuid>, incoming: &[Uuid]) {
    for id in incoming {
        if !into.contains(id) {
            into.push(*id);
        }
    }
}
