//! Sync runs: partial failure, replay, cancellation and source exclusivity

mod helpers;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use tnr_tracker::{
    RawRecord, Result, SourceConnector, SyncState, Tracker, TrackerError, TrackerStore,
    VecConnector,
};

use helpers::{batch, live_actor_count, perpetrator, reports_to, tracker};

/// Feed driven by the test through a channel; the run stays open until the
/// sender is dropped.
struct ChannelConnector {
    source_id: String,
    rx: Mutex<Option<mpsc::UnboundedReceiver<RawRecord>>>,
}

impl ChannelConnector {
    fn new(source_id: &str) -> (Arc<Self>, mpsc::UnboundedSender<RawRecord>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            source_id: source_id.into(),
            rx: Mutex::new(Some(rx)),
        });
        (connector, tx)
    }
}

impl SourceConnector for ChannelConnector {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    fn records(&self) -> BoxStream<'_, Result<RawRecord>> {
        let rx = self.rx.lock().unwrap().take();
        match rx {
            Some(rx) => stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|record| (Ok(record), rx))
            })
            .boxed(),
            None => stream::empty().boxed(),
        }
    }
}

async fn wait_for_state(tracker: &Tracker, source: &str, state: SyncState) {
    for _ in 0..200 {
        if tracker.sync_status(source).await.unwrap().state == state {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("source {source} never reached {state}");
}

async fn wait_for_actors(store: &tnr_tracker::InMemoryStore, n: usize) {
    for _ in 0..200 {
        if store.actor_count().await.unwrap() >= n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("expected {n} actors");
}

#[tokio::test]
async fn test_failed_run_replays_without_duplicates() {
    let (tracker, store) = tracker();
    let records = batch("hudoc", 100);

    let failing = VecConnector::new("hudoc", records.clone()).with_failure_at(60, "upstream reset");
    let err = tracker
        .sync_source(&failing, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.is_retryable());

    let failed = tracker.sync_status("hudoc").await.unwrap();
    assert_eq!(failed.state, SyncState::Failed);
    assert_eq!(failed.counters.created, 60);
    assert_eq!(failed.counters.seen, 60);
    assert!(failed.last_error.as_deref().unwrap().contains("upstream reset"));
    assert_eq!(store.actor_count().await.unwrap(), 60);

    let replay = tracker
        .sync_source(&VecConnector::new("hudoc", records), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(replay.state, SyncState::Completed);
    assert_eq!(replay.counters.seen, 100);
    assert_eq!(replay.counters.processed, 40);
    assert_eq!(replay.counters.created, 40);
    assert_eq!(replay.counters.unchanged, 60);
    assert_eq!(replay.run_count, 2);
    assert_eq!(store.actor_count().await.unwrap(), 100);

    let history = tracker.sync().history("hudoc").await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].state, SyncState::Completed);
    assert_eq!(history[1].state, SyncState::Failed);
}

#[tokio::test]
async fn test_replay_after_completion_changes_nothing() {
    let (tracker, store) = tracker();
    let records = vec![
        perpetrator("icc", "A", "Alexei Sorokin").with_nationality("RU"),
        perpetrator("icc", "B", "Dmitri Volkov")
            .with_nationality("RU")
            .with_relationship(reports_to("A", 0.8)),
    ];
    let connector = VecConnector::new("icc", records);

    let first = tracker.sync_source(&connector, &CancellationToken::new()).await.unwrap();
    assert_eq!(first.counters.created, 2);
    assert_eq!(first.counters.edges_added, 1);

    let second = tracker.sync_source(&connector, &CancellationToken::new()).await.unwrap();
    assert_eq!(second.counters.processed, 0);
    assert_eq!(second.counters.unchanged, 2);
    assert_eq!(second.counters.edges_added, 0);
    assert_eq!(store.actor_count().await.unwrap(), 2);
    assert_eq!(store.list_edges().await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_same_source_cannot_run_twice() {
    let (tracker, store) = tracker();
    let tracker = Arc::new(tracker);
    let (connector, tx) = ChannelConnector::new("tjwg");

    let running = {
        let tracker = tracker.clone();
        let connector = connector.clone();
        tokio::spawn(async move {
            tracker
                .sync_source(connector.as_ref(), &CancellationToken::new())
                .await
        })
    };

    tx.send(perpetrator("tjwg", "T-1", "Pak Jong Chon")).unwrap();
    wait_for_actors(&store, 1).await;
    assert_eq!(
        tracker.sync_status("tjwg").await.unwrap().state,
        SyncState::Syncing
    );

    let second = VecConnector::new("tjwg", vec![perpetrator("tjwg", "T-2", "Jo Yong Won")]);
    let err = tracker
        .sync_source(&second, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, TrackerError::SyncInProgress { ref source_id } if source_id == "tjwg"));

    // Another source is unaffected
    let other = VecConnector::new("un_coi", vec![perpetrator("un_coi", "U-1", "Jo Yong Won")]);
    tracker.sync_source(&other, &CancellationToken::new()).await.unwrap();

    drop(tx);
    let done = running.await.unwrap().unwrap();
    assert_eq!(done.state, SyncState::Completed);
    assert_eq!(done.counters.created, 1);
    assert_eq!(live_actor_count(&store).await, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancellation_keeps_committed_records() {
    let (tracker, store) = tracker();
    let tracker = Arc::new(tracker);
    let (connector, tx) = ChannelConnector::new("kr_press");
    let cancel = CancellationToken::new();

    let running = {
        let tracker = tracker.clone();
        let connector = connector.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { tracker.sync_source(connector.as_ref(), &cancel).await })
    };

    tx.send(perpetrator("kr_press", "K-1", "Han Kwang Song")).unwrap();
    tx.send(perpetrator("kr_press", "K-2", "So Myong Ho")).unwrap();
    wait_for_actors(&store, 2).await;
    cancel.cancel();

    let err = running.await.unwrap().unwrap_err();
    assert!(matches!(err, TrackerError::Cancelled { .. }));

    let status = tracker.sync_status("kr_press").await.unwrap();
    assert_eq!(status.state, SyncState::Failed);
    assert_eq!(status.last_error.as_deref(), Some("cancelled"));
    assert_eq!(status.counters.created, 2);
    assert_eq!(store.actor_count().await.unwrap(), 2);

    // The source can start again after a cancelled run
    wait_for_state(&tracker, "kr_press", SyncState::Failed).await;
    let retry = VecConnector::new("kr_press", vec![perpetrator("kr_press", "K-1", "Han Kwang Song")]);
    let again = tracker.sync_source(&retry, &CancellationToken::new()).await.unwrap();
    assert_eq!(again.counters.unchanged, 1);
}

#[tokio::test]
async fn test_parallel_sources_all_complete() {
    let (tracker, store) = tracker();
    let connectors: Vec<Arc<dyn SourceConnector>> = ["hudoc", "icc", "un_coi"]
        .into_iter()
        .map(|source| {
            let records = (0..10)
                .map(|i| perpetrator(source, &format!("{source}-{i}"), &format!("{source}{i}q Officer{source}{i}")))
                .collect();
            Arc::new(VecConnector::new(source, records)) as Arc<dyn SourceConnector>
        })
        .collect();

    let results = tracker.sync_all(&connectors, &CancellationToken::new()).await;
    assert_eq!(results.len(), 3);
    for result in results {
        let status = result.unwrap();
        assert_eq!(status.state, SyncState::Completed);
        assert_eq!(status.counters.created, 10);
    }
    assert_eq!(store.actor_count().await.unwrap(), 30);
}

#[tokio::test]
async fn test_checkpoints_expose_progress() {
    let (tracker, store) = tracker();
    let connector = VecConnector::new("hudoc", batch("hudoc", 30)).with_failure_at(27, "timeout");
    assert!(tracker
        .sync_source(&connector, &CancellationToken::new())
        .await
        .is_err());

    // The failed status carries the full partial counters, not just the last checkpoint
    let status = store.sync_status("hudoc").await.unwrap();
    assert_eq!(status.counters.seen, 27);
    assert_eq!(status.counters.created, 27);
}
