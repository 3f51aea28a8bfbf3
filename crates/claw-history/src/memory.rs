//! In-memory log store.
//!
//! [`InMemoryLogStore`] is a [`LogStoreClient`] that keeps every pushed
//! stream in process. Rows pushed under the same label set land in the same
//! stream and stay sorted by timestamp. It can be stopped to simulate an
//! unreachable store.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;

use crate::client::LogStoreClient;
use crate::encoder::Stream;
use crate::error::{HistoryError, Result};
use crate::labels::LabelSet;
use crate::merge::{QueryResult, SampleStream};
use crate::selector::Selector;

#[derive(Debug, Clone)]
struct StoredStream {
    labels: LabelSet,
    /// `(unix nanos, line)`, ascending by timestamp.
    rows: Vec<(i64, String)>,
}

impl StoredStream {
    fn matches(&self, selectors: &[Selector]) -> bool {
        selectors
            .iter()
            .all(|sel| sel.matches(self.labels.get(sel.label())))
    }

    fn insert(&mut self, nanos: i64, line: String) {
        let at = self.rows.partition_point(|(ts, _)| *ts <= nanos);
        self.rows.insert(at, (nanos, line));
    }
}

/// Thread-safe in-memory label-indexed log store.
#[derive(Debug)]
pub struct InMemoryLogStore {
    /// Streams keyed by canonical label string.
    streams: RwLock<BTreeMap<String, StoredStream>>,
    /// Whether the store is reachable.
    accepting: AtomicBool,
}

impl Default for InMemoryLogStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLogStore {
    /// Creates an empty, running store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            streams: RwLock::new(BTreeMap::new()),
            accepting: AtomicBool::new(true),
        }
    }

    /// Makes every subsequent call fail as if the store were unreachable.
    pub fn stop(&self) {
        self.accepting.store(false, Ordering::Release);
    }

    /// Makes the store reachable again.
    pub fn start(&self) {
        self.accepting.store(true, Ordering::Release);
    }

    /// Returns true if the store is reachable.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    /// Number of distinct streams held.
    #[must_use]
    pub fn stream_count(&self) -> usize {
        self.streams.read().len()
    }

    /// Number of rows across all streams.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.streams.read().values().map(|s| s.rows.len()).sum()
    }

    /// Removes every stream.
    pub fn clear(&self) {
        self.streams.write().clear();
    }

    fn ensure_running(&self, operation: &'static str) -> Result<()> {
        if self.is_running() {
            Ok(())
        } else {
            Err(HistoryError::transport(operation, "log store is unavailable"))
        }
    }

    fn append(&self, streams: &[Stream]) -> Result<()> {
        // Resolve every timestamp first so a bad row rejects the whole batch.
        let mut batch = Vec::with_capacity(streams.len());
        for stream in streams {
            let mut rows = Vec::with_capacity(stream.values.len());
            for row in &stream.values {
                let nanos = row.at.timestamp_nanos_opt().ok_or_else(|| {
                    HistoryError::transport("push", format!("timestamp {} out of range", row.at))
                })?;
                rows.push((nanos, row.line.clone()));
            }
            batch.push((&stream.labels, rows));
        }

        let mut stored = self.streams.write();
        for (labels, rows) in batch {
            let target = stored
                .entry(labels.canonical())
                .or_insert_with(|| StoredStream {
                    labels: labels.clone(),
                    rows: Vec::new(),
                });
            for (nanos, line) in rows {
                target.insert(nanos, line);
            }
        }
        Ok(())
    }

    fn select(&self, selectors: &[Selector], start: i64, end: i64) -> QueryResult {
        let stored = self.streams.read();
        let result = stored
            .values()
            .filter(|s| s.matches(selectors))
            .filter_map(|s| {
                let values: Vec<[String; 2]> = s
                    .rows
                    .iter()
                    .filter(|(ts, _)| (start..end).contains(ts))
                    .map(|(ts, line)| [ts.to_string(), line.clone()])
                    .collect();
                (!values.is_empty()).then(|| SampleStream {
                    stream: s.labels.clone(),
                    values,
                })
            })
            .collect();
        QueryResult::new(result)
    }
}

impl LogStoreClient for InMemoryLogStore {
    async fn ping(&self) -> Result<()> {
        self.ensure_running("ping")
    }

    async fn push(&self, streams: &[Stream]) -> Result<()> {
        self.ensure_running("push")?;
        self.append(streams)
    }

    async fn query(&self, selectors: &[Selector], start: i64, end: i64) -> Result<QueryResult> {
        self.ensure_running("query")?;
        Ok(self.select(selectors, start, end))
    }
}
