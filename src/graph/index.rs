//! Adjacency index over chain-of-command edges active on a given date

use chrono::NaiveDate;
use smallvec::SmallVec;
use std::collections::{HashMap, HashSet};

use crate::models::{ActorId, ChainEdge, EdgeId};

/// An edge seen from the subordinate's side
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SuperiorLink {
    pub edge_id: EdgeId,
    pub superior: ActorId,
    pub confidence: f64,
    pub start_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default)]
pub struct ChainIndex {
    /// subordinate → its edges upward (one per organization)
    up: HashMap<ActorId, SmallVec<[SuperiorLink; 4]>>,
    /// superior → distinct direct subordinates
    down: HashMap<ActorId, SmallVec<[ActorId; 8]>>,
    nodes: HashSet<ActorId>,
    edges: usize,
}

impl ChainIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index only the edges not expired as of `date`
    pub fn active_on<'a>(edges: impl IntoIterator<Item = &'a ChainEdge>, date: NaiveDate) -> Self {
        let mut index = Self::new();
        for edge in edges.into_iter().filter(|e| e.is_active_on(date)) {
            index.insert(edge);
        }
        index
    }

    pub fn insert(&mut self, edge: &ChainEdge) {
        self.link(
            SuperiorLink {
                edge_id: edge.id,
                superior: edge.superior_id,
                confidence: edge.confidence,
                start_date: edge.start_date,
            },
            edge.subordinate_id,
        );
    }

    pub fn link(&mut self, link: SuperiorLink, subordinate: ActorId) {
        self.nodes.insert(link.superior);
        self.nodes.insert(subordinate);
        self.up.entry(subordinate).or_default().push(link);
        let down = self.down.entry(link.superior).or_default();
        if !down.contains(&subordinate) {
            down.push(subordinate);
        }
        self.edges += 1;
    }

    pub fn superiors(&self, actor: ActorId) -> &[SuperiorLink] {
        self.up.get(&actor).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn subordinates(&self, actor: ActorId) -> &[ActorId] {
        self.down.get(&actor).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn nodes(&self) -> impl Iterator<Item = ActorId> + '_ {
        self.nodes.iter().copied()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges
    }

    pub fn contains(&self, actor: ActorId) -> bool {
        self.nodes.contains(&actor)
    }
}
