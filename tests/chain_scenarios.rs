//! Chain-of-command graph behaviour through the tracker

mod helpers;

use chrono::NaiveDate;

use tnr_tracker::{
    ActorId, EdgeChange, NewChainEdge, Tracker, TrackerError, TrackerStore, ValidityWindow,
};

use helpers::{create, perpetrator, tracker};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

async fn actors(tracker: &Tracker, names: &[&str]) -> Vec<ActorId> {
    let mut ids = Vec::new();
    for (i, name) in names.iter().enumerate() {
        ids.push(create(tracker, perpetrator("tjwg", &format!("C-{i}"), name)).await);
    }
    ids
}

#[tokio::test]
async fn test_reverse_edge_is_rejected() {
    let (tracker, store) = tracker();
    let ids = actors(&tracker, &["Colonel Ahn", "Major Baek"]).await;
    let (a, b) = (ids[0], ids[1]);

    tracker.add_edge(NewChainEdge::new(a, b, 0.9)).await.unwrap();
    let err = tracker.add_edge(NewChainEdge::new(b, a, 0.9)).await.unwrap_err();
    match err {
        TrackerError::CycleDetected { path, .. } => assert_eq!(path, vec![b, a, b]),
        other => panic!("expected a cycle, got {other:?}"),
    }

    let edges = store.list_edges().await.unwrap();
    assert_eq!(edges.len(), 1);
    assert_eq!((edges[0].superior_id, edges[0].subordinate_id), (a, b));
    assert_eq!(tracker.reporting_chain(b).await.unwrap(), vec![a]);
    assert!(tracker.reporting_chain(a).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_long_cycle_is_rejected() {
    let (tracker, store) = tracker();
    let ids = actors(&tracker, &["Gen Cha", "Col Do", "Maj Eom", "Capt Gu"]).await;
    for pair in ids.windows(2) {
        tracker.add_edge(NewChainEdge::new(pair[0], pair[1], 0.8)).await.unwrap();
    }
    let err = tracker
        .add_edge(NewChainEdge::new(ids[3], ids[0], 0.8))
        .await
        .unwrap_err();
    assert!(matches!(err, TrackerError::CycleDetected { .. }));
    assert_eq!(store.list_edges().await.unwrap().len(), 3);
    assert_eq!(
        tracker.reporting_chain(ids[3]).await.unwrap(),
        vec![ids[2], ids[1], ids[0]]
    );
}

#[tokio::test]
async fn test_chain_follows_strongest_then_most_recent_superior() {
    let (tracker, _) = tracker();
    let ids = actors(&tracker, &["Go Myong", "Hwang Sok", "In Chol", "Jang Song"]).await;
    let (agent, weak, recent, older) = (ids[0], ids[1], ids[2], ids[3]);

    tracker.add_edge(NewChainEdge::new(weak, agent, 0.6)).await.unwrap();
    tracker
        .add_edge(NewChainEdge::new(older, agent, 0.9).window(ValidityWindow::open_since(date(2015, 1, 1))))
        .await
        .unwrap();
    tracker
        .add_edge(NewChainEdge::new(recent, agent, 0.9).window(ValidityWindow::open_since(date(2021, 6, 1))))
        .await
        .unwrap();

    assert_eq!(tracker.reporting_chain(agent).await.unwrap(), vec![recent]);
    // All three superiors still see the agent below them
    for superior in [weak, recent, older] {
        assert_eq!(tracker.centrality(superior).await.unwrap(), 1);
    }
}

#[tokio::test]
async fn test_centrality_counts_each_subordinate_once() {
    let (tracker, _) = tracker();
    let ids = actors(&tracker, &["Ko Un", "Lee Pyong", "Moon Dae", "Na Hun", "Oh Gwang"]).await;
    let (chief, left, right, shared, leaf) = (ids[0], ids[1], ids[2], ids[3], ids[4]);

    for (sup, sub) in [(chief, left), (chief, right), (left, shared), (right, shared), (shared, leaf)] {
        tracker.add_edge(NewChainEdge::new(sup, sub, 0.7)).await.unwrap();
    }
    assert_eq!(tracker.centrality(chief).await.unwrap(), 4);
    assert_eq!(tracker.centrality(left).await.unwrap(), 2);
    assert_eq!(tracker.centrality(leaf).await.unwrap(), 0);

    let direct = tracker.graph().subordinates(chief, Some(1)).await.unwrap();
    assert_eq!(direct.len(), 2);
    assert!(direct.iter().all(|(_, depth)| *depth == 1));
}

#[tokio::test]
async fn test_ended_edges_leave_the_active_graph() {
    let (tracker, _) = tracker();
    let ids = actors(&tracker, &["Park Nam", "Quan Sik", "Ryu Gyong"]).await;
    let (old_boss, officer, new_boss) = (ids[0], ids[1], ids[2]);

    let first = tracker
        .add_edge(NewChainEdge::new(old_boss, officer, 0.9).window(ValidityWindow::open_since(date(2010, 3, 1))))
        .await
        .unwrap();
    tracker
        .deactivate_edge(first.edge.id, date(2019, 12, 31))
        .await
        .unwrap();
    tracker
        .add_edge(NewChainEdge::new(new_boss, officer, 0.5).window(ValidityWindow::open_since(date(2020, 1, 1))))
        .await
        .unwrap();

    assert_eq!(tracker.reporting_chain(officer).await.unwrap(), vec![new_boss]);
    assert_eq!(tracker.centrality(old_boss).await.unwrap(), 0);
    assert_eq!(
        tracker
            .graph()
            .reporting_chain_on(officer, date(2015, 6, 1))
            .await
            .unwrap(),
        vec![old_boss]
    );
    assert_eq!(tracker.graph().edge_history(officer).await.unwrap().len(), 2);

    // The old boss can now sit below the officer without closing a loop
    let reversed = tracker.add_edge(NewChainEdge::new(officer, old_boss, 0.4)).await.unwrap();
    assert_eq!(reversed.change, EdgeChange::Created);

    // Reopening the first edge would now close old_boss -> officer -> old_boss
    let err = tracker
        .add_edge(NewChainEdge::new(old_boss, officer, 0.9))
        .await
        .unwrap_err();
    assert!(matches!(err, TrackerError::CycleDetected { .. }));
}

#[tokio::test]
async fn test_edge_refresh_and_organizations() {
    let (tracker, store) = tracker();
    let ids = actors(&tracker, &["Minister Seo", "Consul Tak"]).await;
    let (minister, consul) = (ids[0], ids[1]);

    let created = tracker.add_edge(NewChainEdge::new(minister, consul, 0.6)).await.unwrap();
    let same = tracker.add_edge(NewChainEdge::new(minister, consul, 0.6)).await.unwrap();
    let stronger = tracker.add_edge(NewChainEdge::new(minister, consul, 0.8)).await.unwrap();
    assert_eq!(created.change, EdgeChange::Created);
    assert_eq!(same.change, EdgeChange::Updated { confidence_changed: false });
    assert!(!same.affects_scores());
    assert_eq!(stronger.change, EdgeChange::Updated { confidence_changed: true });
    assert_eq!(stronger.edge.id, created.edge.id);

    tracker
        .add_edge(NewChainEdge::new(minister, consul, 0.7).organization("Ministry of State Security"))
        .await
        .unwrap();
    assert_eq!(store.list_edges().await.unwrap().len(), 2);
    assert_eq!(tracker.centrality(minister).await.unwrap(), 1);
}

#[tokio::test]
async fn test_bad_edges_change_nothing() {
    let (tracker, store) = tracker();
    let ids = actors(&tracker, &["General Um", "Sergeant Von"]).await;

    assert!(matches!(
        tracker.add_edge(NewChainEdge::new(ids[0], ids[0], 0.5)).await,
        Err(TrackerError::CycleDetected { .. })
    ));
    assert!(matches!(
        tracker.add_edge(NewChainEdge::new(ids[0], ids[1], 1.5)).await,
        Err(TrackerError::Validation { .. })
    ));
    assert!(matches!(
        tracker.add_edge(NewChainEdge::new(ids[0], uuid::Uuid::new_v4(), 0.5)).await,
        Err(TrackerError::NotFound { .. })
    ));
    assert!(store.list_edges().await.unwrap().is_empty());
}
