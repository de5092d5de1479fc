//! One `RawRecord` per line

use futures::stream::{self, BoxStream, StreamExt};
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};

use super::SourceConnector;
use crate::error::{Result, TrackerError};
use crate::models::RawRecord;

#[derive(Debug, Clone)]
pub struct JsonlConnector {
    source_id: String,
    path: PathBuf,
}

impl JsonlConnector {
    pub fn new(source_id: impl Into<String>, path: impl AsRef<Path>) -> Self {
        Self {
            source_id: source_id.into(),
            path: path.as_ref().to_path_buf(),
        }
    }
}

enum ReadState {
    Unopened,
    Reading {
        lines: Lines<BufReader<File>>,
        line_no: usize,
    },
    Done,
}

impl SourceConnector for JsonlConnector {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    fn records(&self) -> BoxStream<'_, Result<RawRecord>> {
        stream::unfold(ReadState::Unopened, move |state| async move {
            let (mut lines, mut line_no) = match state {
                ReadState::Unopened => match File::open(&self.path).await {
                    Ok(file) => (BufReader::new(file).lines(), 0),
                    Err(err) => {
                        let msg = format!("cannot open {}: {}", self.path.display(), err);
                        return Some((Err(TrackerError::Transient(msg)), ReadState::Done));
                    }
                },
                ReadState::Reading { lines, line_no } => (lines, line_no),
                ReadState::Done => return None,
            };

            loop {
                line_no += 1;
                match lines.next_line().await {
                    Ok(Some(line)) if line.trim().is_empty() => continue,
                    Ok(Some(line)) => {
                        let item = serde_json::from_str::<RawRecord>(&line).map_err(|e| {
                            TrackerError::validation(
                                &self.source_id,
                                format!("line {}", line_no),
                                e.to_string(),
                            )
                        });
                        return Some((item, ReadState::Reading { lines, line_no }));
                    }
                    Ok(None) => return None,
                    Err(err) => {
                        let msg = format!("read error at line {}: {}", line_no, err);
                        return Some((Err(TrackerError::Transient(msg)), ReadState::Done));
                    }
                }
            }
        })
        .boxed()
    }
}
