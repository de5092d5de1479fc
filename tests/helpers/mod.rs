//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::sync::Arc;

use tnr_tracker::{
    ActorId, ActorType, InMemoryStore, NameFields, RawRecord, RelationshipHint, Tracker,
    TrackerConfig, TrackerStore,
};

pub fn tracker() -> (Tracker, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new());
    let tracker = Tracker::new(store.clone(), TrackerConfig::default()).unwrap();
    (tracker, store)
}

pub fn perpetrator(source: &str, external_id: &str, name: &str) -> RawRecord {
    RawRecord::new(source, external_id, ActorType::Perpetrator, NameFields::new(name))
}

pub fn reports_to(superior_external_id: &str, confidence: f64) -> RelationshipHint {
    RelationshipHint {
        superior_external_id: superior_external_id.into(),
        relationship_type: "command".into(),
        organization: None,
        confidence,
        start_date: None,
        end_date: None,
    }
}

/// Distinct, non-overlapping names so the fuzzy path never links two of them
pub fn batch(source: &str, n: usize) -> Vec<RawRecord> {
    (0..n)
        .map(|i| perpetrator(source, &format!("R-{i:03}"), &format!("Agent{i:03}x Unit{i:03}y")))
        .collect()
}

pub async fn create(tracker: &Tracker, record: RawRecord) -> ActorId {
    tracker.resolve_or_create(&record).await.unwrap().actor_id
}

pub async fn live_actor_count(store: &InMemoryStore) -> usize {
    store
        .search_actors(&tnr_tracker::ActorQuery::default())
        .await
        .unwrap()
        .len()
}
