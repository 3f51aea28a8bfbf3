//! Merging of per-stream query results into a single timeline.
//!
//! The log store returns one sorted list of rows per stream it holds. History
//! is presented as one linear sequence, so the lists are merged with a k-way
//! merge keyed on the row timestamp. Any row that cannot be decoded aborts the
//! whole merge.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::entry::reencode_line;
use crate::error::{HistoryError, Result};
use crate::labels::LabelSet;

/// Name of the merged history frame.
pub const FRAME_NAME: &str = "states";
/// Name of the time column.
pub const TIME_COLUMN: &str = "time";
/// Name of the log line column.
pub const LINE_COLUMN: &str = "line";
/// Name of the labels column.
pub const LABELS_COLUMN: &str = "labels";

/// Response of a log store range query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Response payload.
    pub data: QueryData,
}

/// Payload of a range query response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryData {
    /// One entry per stream held by the store.
    #[serde(default)]
    pub result: Vec<SampleStream>,
}

/// Rows of one stored stream, sorted ascending by timestamp.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleStream {
    /// Labels of the stream.
    pub stream: LabelSet,
    /// `[unix nanos, line]` pairs.
    #[serde(default)]
    pub values: Vec<[String; 2]>,
}

impl QueryResult {
    /// Wraps a list of streams.
    #[must_use]
    pub const fn new(result: Vec<SampleStream>) -> Self {
        Self {
            data: QueryData { result },
        }
    }

    /// The streams of this result.
    #[must_use]
    pub fn streams(&self) -> &[SampleStream] {
        &self.data.result
    }

    /// Total number of rows across all streams.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.data.result.iter().map(|s| s.values.len()).sum()
    }
}

/// State history as three row-aligned columns ordered by time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HistoryFrame {
    /// Frame name, always [`FRAME_NAME`].
    pub name: String,
    /// Rule the history was queried for, if any.
    pub rule_uid: Option<String>,
    /// When each transition happened.
    pub times: Vec<DateTime<Utc>>,
    /// Entry JSON of each transition.
    pub lines: Vec<String>,
    /// Label JSON of the stream each transition was read from.
    pub labels: Vec<String>,
}

/// A borrowed row of a [`HistoryFrame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRow<'a> {
    /// When the transition happened.
    pub time: DateTime<Utc>,
    /// Entry JSON.
    pub line: &'a str,
    /// Stream label JSON.
    pub labels: &'a str,
}

impl HistoryFrame {
    fn with_capacity(rule_uid: Option<&str>, capacity: usize) -> Self {
        Self {
            name: FRAME_NAME.to_string(),
            rule_uid: rule_uid.map(ToString::to_string),
            times: Vec::with_capacity(capacity),
            lines: Vec::with_capacity(capacity),
            labels: Vec::with_capacity(capacity),
        }
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.times.len()
    }

    /// Returns true if the frame has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Iterates rows in time order.
    pub fn rows(&self) -> impl Iterator<Item = FrameRow<'_>> {
        self.times
            .iter()
            .zip(&self.lines)
            .zip(&self.labels)
            .map(|((time, line), labels)| FrameRow {
                time: *time,
                line,
                labels,
            })
    }

    fn push(&mut self, time: DateTime<Utc>, line: String, labels: String) {
        self.times.push(time);
        self.lines.push(line);
        self.labels.push(labels);
    }
}

fn parse_timestamp(raw: &str) -> Result<i64> {
    raw.parse::<i64>().map_err(|e| {
        HistoryError::decode(format!("failed to parse timestamp {raw:?} from log store response: {e}"))
    })
}

/// Merges per-stream rows into one frame ordered by time.
///
/// Rows with equal timestamps keep the order of the streams they came from.
/// Every line is decoded and re-encoded as an entry.
///
/// # Errors
///
/// Returns `HistoryError::Decode` if any timestamp is not an integer, any
/// line is not a valid entry, or stream labels cannot be serialized. No
/// partial frame is returned.
pub fn merge(result: &QueryResult, rule_uid: Option<&str>) -> Result<HistoryFrame> {
    let streams = result.streams();
    let mut frame = HistoryFrame::with_capacity(rule_uid, result.row_count());

    // Min-heap of (timestamp, stream index) over the head row of each stream.
    let mut heads = BinaryHeap::with_capacity(streams.len());
    let mut cursors = vec![0usize; streams.len()];
    for (idx, stream) in streams.iter().enumerate() {
        if let Some([ts, _]) = stream.values.first() {
            heads.push(Reverse((parse_timestamp(ts)?, idx)));
        }
    }

    while let Some(Reverse((nanos, idx))) = heads.pop() {
        let stream = &streams[idx];
        let [_, line] = &stream.values[cursors[idx]];

        let line = reencode_line(line)
            .map_err(|e| HistoryError::decode(format!("a line was in an invalid format: {e}")))?;
        let labels = serde_json::to_string(&stream.stream)
            .map_err(|e| HistoryError::decode(format!("failed to serialize stream labels: {e}")))?;
        frame.push(Utc.timestamp_nanos(nanos), line, labels);

        cursors[idx] += 1;
        if let Some([ts, _]) = stream.values.get(cursors[idx]) {
            heads.push(Reverse((parse_timestamp(ts)?, idx)));
        }
    }

    Ok(frame)
}
