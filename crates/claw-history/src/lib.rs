//! # claw-history
//!
//! Alert state history for Clawbernetes, kept in a label-indexed log store.
//!
//! This crate provides:
//!
//! - [`StreamEncoder`]: Groups state transitions into label-keyed streams
//! - [`build_selectors`]: Turns a [`HistoryQuery`] into stream selectors
//! - [`merge()`]: Merges per-stream query results into one timeline
//! - [`RemoteHistorian`]: Background recording and history queries
//! - [`LogStoreClient`]: Abstract trait for log store backends
//! - [`InMemoryLogStore`]: In-process log store
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use chrono::Utc;
//! use claw_history::{
//!     EvalState, HistorianConfig, HistoryQuery, InMemoryLogStore, RemoteHistorian, RuleMeta,
//!     StateTransition,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> claw_history::Result<()> {
//! let historian = RemoteHistorian::new(Arc::new(InMemoryLogStore::new()), HistorianConfig::default())?;
//! let token = CancellationToken::new();
//!
//! let rule = RuleMeta {
//!     org_id: 1,
//!     uid: "high-cpu".to_string(),
//!     group: "node-health".to_string(),
//!     namespace_uid: "infra".to_string(),
//!     ..RuleMeta::default()
//! };
//! let transition = StateTransition::new(EvalState::Normal, EvalState::Alerting, Utc::now())
//!     .with_label("node", "gpu-01")
//!     .with_value("A", 97.5);
//!
//! historian
//!     .record_states_async(&token, &rule, &[transition])
//!     .await
//!     .map_err(|_| claw_history::HistoryError::Cancelled)??;
//!
//! let frame = historian
//!     .query_states(&token, &HistoryQuery::new(1).with_rule("high-cpu"))
//!     .await?;
//! assert_eq!(frame.len(), 1);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod config;
pub mod encoder;
pub mod entry;
pub mod error;
pub mod historian;
pub mod labels;
pub mod memory;
pub mod merge;
pub mod policy;
pub mod selector;
pub mod types;

// Re-export main types
pub use client::LogStoreClient;
pub use config::{HistorianConfig, DEFAULT_LOOKBACK_SECS};
pub use encoder::{Row, Stream, StreamEncoder};
pub use entry::{reencode_line, Entry, SCHEMA_VERSION};
pub use error::{HistoryError, Result};
pub use historian::RemoteHistorian;
pub use labels::{
    is_private_label, LabelSet, FOLDER_UID_LABEL, GROUP_LABEL, ORG_ID_LABEL, RULE_UID_LABEL,
    STATE_HISTORY_LABEL_KEY, STATE_HISTORY_LABEL_VALUE,
};
pub use memory::InMemoryLogStore;
pub use merge::{merge, FrameRow, HistoryFrame, QueryData, QueryResult, SampleStream};
pub use policy::RecordPolicy;
pub use selector::{build_selectors, selector_string, Operator, Selector};
pub use types::{format_state, EvalState, HistoryQuery, RuleMeta, StateTransition};
