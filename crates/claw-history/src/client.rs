//! The seam between the historian and a log store backend.

use crate::encoder::Stream;
use crate::error::Result;
use crate::merge::QueryResult;
use crate::selector::Selector;

/// A label-indexed log store.
///
/// Implementors accept pushed streams and answer range queries over stream
/// selectors. Timestamps are Unix nanoseconds; the range is `[start, end)`.
pub trait LogStoreClient: Send + Sync {
    /// Checks that the store is reachable.
    ///
    /// # Errors
    ///
    /// Returns `HistoryError::Transport` if the store cannot be reached.
    fn ping(&self) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Writes a batch of streams.
    ///
    /// # Errors
    ///
    /// Returns `HistoryError::Transport` if the store rejects the batch.
    fn push(&self, streams: &[Stream]) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Reads every row in `[start, end)` from streams matching all selectors.
    ///
    /// # Errors
    ///
    /// Returns `HistoryError::Transport` if the query fails.
    fn query(
        &self,
        selectors: &[Selector],
        start: i64,
        end: i64,
    ) -> impl std::future::Future<Output = Result<QueryResult>> + Send;
}
