//! Source connector contract
//!
//! Fetching and scraping live outside the core. A connector only has to
//! turn its feed into a stream of `RawRecord`s; per-record errors are
//! yielded in-stream so one bad row does not end the run.

pub mod jsonl;

use futures::stream::{self, BoxStream, StreamExt};

use crate::error::{Result, TrackerError};
use crate::models::RawRecord;

pub use jsonl::JsonlConnector;

pub trait SourceConnector: Send + Sync {
    fn source_id(&self) -> &str;

    /// Records in feed order. A `Validation` item rejects one record; any
    /// other error ends the run.
    fn records(&self) -> BoxStream<'_, Result<RawRecord>>;
}

/// In-memory feed, optionally failing part-way through
#[derive(Debug, Clone)]
pub struct VecConnector {
    source_id: String,
    records: Vec<RawRecord>,
    failure: Option<(usize, String)>,
}

impl VecConnector {
    pub fn new(source_id: impl Into<String>, records: Vec<RawRecord>) -> Self {
        Self {
            source_id: source_id.into(),
            records,
            failure: None,
        }
    }

    /// Yield a transient error after `position` records, then stop
    pub fn with_failure_at(mut self, position: usize, message: impl Into<String>) -> Self {
        self.failure = Some((position, message.into()));
        self
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl SourceConnector for VecConnector {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    fn records(&self) -> BoxStream<'_, Result<RawRecord>> {
        let cut = self
            .failure
            .as_ref()
            .map_or(self.records.len(), |(at, _)| (*at).min(self.records.len()));
        let head = stream::iter(self.records[..cut].iter().cloned().map(Ok));
        match &self.failure {
            Some((_, message)) => head
                .chain(stream::once(async move {
                    Err(TrackerError::Transient(message.clone()))
                }))
                .boxed(),
            None => head.boxed(),
        }
    }
}
