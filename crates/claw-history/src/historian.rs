//! The remote state historian.
//!
//! [`RemoteHistorian`] ties the pieces together. Recording encodes a batch of
//! transitions into streams and pushes them on a spawned task, reporting the
//! outcome through a one-shot channel. Querying builds selectors, resolves
//! the time window, reads from the store and merges the result.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::client::LogStoreClient;
use crate::config::HistorianConfig;
use crate::encoder::StreamEncoder;
use crate::error::{HistoryError, Result};
use crate::merge::{merge, HistoryFrame};
use crate::selector::build_selectors;
use crate::types::{HistoryQuery, RuleMeta, StateTransition};

/// Records state transitions to, and reads history from, a log store.
pub struct RemoteHistorian<C> {
    client: Arc<C>,
    encoder: StreamEncoder,
    lookback: Duration,
}

impl<C> std::fmt::Debug for RemoteHistorian<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteHistorian")
            .field("encoder", &self.encoder)
            .field("lookback", &self.lookback)
            .finish_non_exhaustive()
    }
}

impl<C: LogStoreClient + 'static> RemoteHistorian<C> {
    /// Creates a historian writing through `client`.
    ///
    /// # Errors
    ///
    /// Returns `HistoryError::Config` if the configuration is invalid.
    pub fn new(client: Arc<C>, config: HistorianConfig) -> Result<Self> {
        config.validate()?;
        let lookback = config.default_lookback();
        Ok(Self {
            client,
            encoder: StreamEncoder::new(config.external_labels, config.policy),
            lookback,
        })
    }

    /// The log store client.
    #[must_use]
    pub const fn client(&self) -> &Arc<C> {
        &self.client
    }

    /// The encoder used for recording.
    #[must_use]
    pub const fn encoder(&self) -> &StreamEncoder {
        &self.encoder
    }

    /// Checks that the log store is reachable.
    ///
    /// # Errors
    ///
    /// Returns `HistoryError::Cancelled` if `token` fires first, or the
    /// client's error if the ping fails.
    pub async fn test_connection(&self, token: &CancellationToken) -> Result<()> {
        tokio::select! {
            biased;
            () = token.cancelled() => Err(HistoryError::Cancelled),
            res = self.client.ping() => res,
        }
    }

    /// Records a batch of transitions without waiting for the store.
    ///
    /// Encoding happens before this returns; the push runs on its own task.
    /// The receiver yields exactly one value: `Ok(())` once the batch is
    /// stored, or `HistoryError::SaveBatch` wrapping the failure. Dropping
    /// the receiver does not stop the push.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime, since the push is spawned
    /// onto the current runtime.
    pub fn record_states_async(
        &self,
        token: &CancellationToken,
        rule: &RuleMeta,
        transitions: &[StateTransition],
    ) -> oneshot::Receiver<Result<()>> {
        let streams = self.encoder.encode(rule, transitions);
        let (tx, rx) = oneshot::channel();
        let client = Arc::clone(&self.client);
        let token = token.clone();
        let rule_uid = rule.uid.clone();
        let org_id = rule.org_id;

        tokio::spawn(async move {
            let pushed = tokio::select! {
                biased;
                () = token.cancelled() => Err(HistoryError::Cancelled),
                res = client.push(&streams) => res,
            };

            let outcome = match pushed {
                Ok(()) => {
                    debug!(
                        rule_uid = %rule_uid,
                        org_id,
                        streams = streams.len(),
                        "saved state history batch"
                    );
                    Ok(())
                }
                Err(HistoryError::Cancelled) => {
                    warn!(rule_uid = %rule_uid, org_id, "state history batch cancelled");
                    Err(HistoryError::SaveBatch(Box::new(HistoryError::Cancelled)))
                }
                Err(e) => {
                    error!(
                        rule_uid = %rule_uid,
                        org_id,
                        error = %e,
                        "failed to save state history batch"
                    );
                    Err(HistoryError::SaveBatch(Box::new(e)))
                }
            };

            // The caller may have dropped the receiver.
            let _ = tx.send(outcome);
        });

        rx
    }

    /// Reads the state history matching `query` as one time-ordered frame.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSelector` or `InvalidTimeRange` before contacting the
    /// store, `Cancelled` if `token` fires during the query, the client's
    /// error if the query fails, or `Decode` if the result cannot be merged.
    pub async fn query_states(
        &self,
        token: &CancellationToken,
        query: &HistoryQuery,
    ) -> Result<HistoryFrame> {
        let selectors = build_selectors(query)?;
        let (start, end) = self.resolve_window(query, Utc::now())?;

        let result = tokio::select! {
            biased;
            () = token.cancelled() => Err(HistoryError::Cancelled),
            res = self.client.query(&selectors, start, end) => res,
        }?;

        debug!(
            org_id = query.org_id,
            streams = result.streams().len(),
            rows = result.row_count(),
            "merging state history query result"
        );
        merge(&result, query.rule_filter())
    }

    /// Resolves the query window to `[start, end)` in Unix nanoseconds.
    fn resolve_window(&self, query: &HistoryQuery, now: DateTime<Utc>) -> Result<(i64, i64)> {
        let end = query.to.unwrap_or(now);
        let start = match query.from {
            Some(from) => from,
            None => chrono::Duration::from_std(self.lookback)
                .ok()
                .and_then(|lookback| end.checked_sub_signed(lookback))
                .ok_or_else(|| invalid_range("lookback reaches before the earliest time"))?,
        };

        if start > end {
            return Err(invalid_range(format!("start {start} is after end {end}")));
        }

        let start = start
            .timestamp_nanos_opt()
            .ok_or_else(|| invalid_range(format!("start {start} cannot be expressed in nanoseconds")))?;
        let end = end
            .timestamp_nanos_opt()
            .ok_or_else(|| invalid_range(format!("end {end} cannot be expressed in nanoseconds")))?;
        Ok((start, end))
    }
}

fn invalid_range(reason: impl Into<String>) -> HistoryError {
    HistoryError::InvalidTimeRange {
        reason: reason.into(),
    }
}
