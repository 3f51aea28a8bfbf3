//! Core types consumed by the state historian.
//!
//! This module provides:
//! - [`EvalState`]: Evaluation state of an alert instance
//! - [`StateTransition`]: One evaluation result relative to the previous one
//! - [`RuleMeta`]: Identity of the rule that owns a batch of transitions
//! - [`HistoryQuery`]: Parameters for reading history back

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::labels::LabelSet;

/// Evaluation state of an alert instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EvalState {
    /// The condition is not met.
    Normal,
    /// The condition is met and the alert is firing.
    Alerting,
    /// The condition is met but has not held long enough to fire.
    Pending,
    /// The query returned no data.
    NoData,
    /// The evaluation failed.
    Error,
}

impl EvalState {
    /// Returns the display name of this state.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::Alerting => "Alerting",
            Self::Pending => "Pending",
            Self::NoData => "NoData",
            Self::Error => "Error",
        }
    }

    /// Returns true if evaluation values are meaningless in this state.
    #[must_use]
    pub const fn discards_values(&self) -> bool {
        matches!(self, Self::Error | Self::NoData)
    }
}

impl fmt::Display for EvalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Renders a state together with its optional reason, e.g. `Normal (MissingSeries)`.
#[must_use]
pub fn format_state(state: EvalState, reason: &str) -> String {
    if reason.is_empty() {
        state.as_str().to_string()
    } else {
        format!("{state} ({reason})")
    }
}

/// A single evaluation result of an alert instance, relative to the previous one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateTransition {
    /// State before this evaluation.
    pub previous: EvalState,
    /// Reason attached to the previous state.
    #[serde(default)]
    pub previous_reason: String,
    /// State after this evaluation.
    pub current: EvalState,
    /// Reason attached to the current state.
    #[serde(default)]
    pub current_reason: String,
    /// When the evaluation happened.
    pub evaluated_at: DateTime<Utc>,
    /// Labels identifying the alert instance.
    #[serde(default)]
    pub labels: LabelSet,
    /// Numeric results of the evaluation, if any.
    #[serde(default)]
    pub values: Option<BTreeMap<String, f64>>,
    /// Evaluation error, if the evaluation failed.
    #[serde(default)]
    pub error: Option<String>,
}

impl StateTransition {
    /// Creates a transition with no labels, values or error.
    #[must_use]
    pub fn new(previous: EvalState, current: EvalState, evaluated_at: DateTime<Utc>) -> Self {
        Self {
            previous,
            previous_reason: String::new(),
            current,
            current_reason: String::new(),
            evaluated_at,
            labels: LabelSet::new(),
            values: None,
            error: None,
        }
    }

    /// Adds an instance label.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key, value);
        self
    }

    /// Adds an evaluation value.
    #[must_use]
    pub fn with_value(mut self, name: impl Into<String>, value: f64) -> Self {
        self.values
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), value);
        self
    }

    /// Sets the evaluation error.
    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Sets the reasons attached to the previous and current states.
    #[must_use]
    pub fn with_reasons(mut self, previous: impl Into<String>, current: impl Into<String>) -> Self {
        self.previous_reason = previous.into();
        self.current_reason = current.into();
        self
    }

    /// Returns true if the state or its reason differs from the previous evaluation.
    #[must_use]
    pub fn changed(&self) -> bool {
        self.previous != self.current || self.previous_reason != self.current_reason
    }

    /// Display form of the previous state.
    #[must_use]
    pub fn previous_formatted(&self) -> String {
        format_state(self.previous, &self.previous_reason)
    }

    /// Display form of the current state.
    #[must_use]
    pub fn formatted(&self) -> String {
        format_state(self.current, &self.current_reason)
    }
}

/// Identity of the rule that owns a batch of transitions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleMeta {
    /// Organization the rule belongs to.
    pub org_id: i64,
    /// Unique identifier of the rule.
    pub uid: String,
    /// Evaluation group name.
    pub group: String,
    /// UID of the folder (namespace) containing the rule.
    pub namespace_uid: String,
    /// Dashboard the rule is linked to, empty if none.
    #[serde(default)]
    pub dashboard_uid: String,
    /// Panel the rule is linked to, zero if none.
    #[serde(default)]
    pub panel_id: i64,
}

/// Parameters for reading state history back from the log store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryQuery {
    /// Organization to read history for.
    pub org_id: i64,
    /// Restrict to a single rule when set.
    #[serde(default)]
    pub rule_uid: Option<String>,
    /// Start of the window (inclusive).
    #[serde(default)]
    pub from: Option<DateTime<Utc>>,
    /// End of the window (exclusive).
    #[serde(default)]
    pub to: Option<DateTime<Utc>>,
    /// Additional exact-match label filters.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl HistoryQuery {
    /// Creates a query for all history of an organization.
    #[must_use]
    pub fn new(org_id: i64) -> Self {
        Self {
            org_id,
            ..Self::default()
        }
    }

    /// Restricts the query to one rule.
    #[must_use]
    pub fn with_rule(mut self, rule_uid: impl Into<String>) -> Self {
        self.rule_uid = Some(rule_uid.into());
        self
    }

    /// Sets the time window.
    #[must_use]
    pub const fn with_range(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }

    /// Adds an exact-match label filter.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// The rule filter, treating an empty string as absent.
    #[must_use]
    pub fn rule_filter(&self) -> Option<&str> {
        self.rule_uid.as_deref().filter(|uid| !uid.is_empty())
    }
}
