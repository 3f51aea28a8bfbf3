//! Label selectors for scoping history queries.
//!
//! A [`Selector`] is a validated `(label, operator, value)` triple. The
//! [`build_selectors`] function turns a [`HistoryQuery`] into the ordered list
//! sent to the log store: organization first, the state history marker second,
//! then the caller's label filters, and finally the rule when one is given.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{HistoryError, Result};
use crate::labels::{ORG_ID_LABEL, RULE_UID_LABEL, STATE_HISTORY_LABEL_KEY, STATE_HISTORY_LABEL_VALUE};
use crate::types::HistoryQuery;

/// Regex for valid label names in the store's query language.
static LABEL_NAME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").unwrap_or_else(|_| unreachable!()));

/// Returns true if `name` is a valid label name.
pub(crate) fn is_valid_label_name(name: &str) -> bool {
    LABEL_NAME_REGEX.is_match(name)
}

/// Matching operator of a selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    /// Exact match (`=`).
    #[serde(rename = "=")]
    Eq,
    /// Not equal (`!=`).
    #[serde(rename = "!=")]
    Neq,
    /// Regex match (`=~`).
    #[serde(rename = "=~")]
    Re,
    /// Negated regex match (`!~`).
    #[serde(rename = "!~")]
    Nre,
}

impl Operator {
    /// Returns the operator symbol.
    #[must_use]
    pub const fn as_symbol(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Neq => "!=",
            Self::Re => "=~",
            Self::Nre => "!~",
        }
    }

    /// Returns true for the regex operators.
    #[must_use]
    pub const fn is_regex(&self) -> bool {
        matches!(self, Self::Re | Self::Nre)
    }
}

impl std::str::FromStr for Operator {
    type Err = HistoryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "=" => Ok(Self::Eq),
            "!=" => Ok(Self::Neq),
            "=~" => Ok(Self::Re),
            "!~" => Ok(Self::Nre),
            other => Err(HistoryError::InvalidSelector {
                reason: format!("'{other}' is not a valid query operator"),
            }),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_symbol())
    }
}

/// A validated label matcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Selector {
    label: String,
    op: Operator,
    value: String,
}

impl Selector {
    /// Creates a selector from an operator symbol.
    ///
    /// # Errors
    ///
    /// Returns `HistoryError::InvalidSelector` if the operator is unknown, the
    /// label is not a valid label name, or the value cannot be expressed.
    pub fn new(label: impl Into<String>, op: &str, value: impl Into<String>) -> Result<Self> {
        Self::with_operator(label, op.parse()?, value)
    }

    /// Creates an exact-match selector.
    ///
    /// # Errors
    ///
    /// Returns `HistoryError::InvalidSelector` if the label or value is invalid.
    pub fn exact(label: impl Into<String>, value: impl Into<String>) -> Result<Self> {
        Self::with_operator(label, Operator::Eq, value)
    }

    /// Creates a selector with the given operator.
    ///
    /// # Errors
    ///
    /// Returns `HistoryError::InvalidSelector` if the label or value is invalid.
    pub fn with_operator(
        label: impl Into<String>,
        op: Operator,
        value: impl Into<String>,
    ) -> Result<Self> {
        let label = label.into();
        let value = value.into();

        if !is_valid_label_name(&label) {
            return Err(HistoryError::InvalidSelector {
                reason: format!("'{label}' is not a valid label name"),
            });
        }

        if let Some(c) = value.chars().find(|c| c.is_control() && *c != '\t') {
            return Err(HistoryError::InvalidSelector {
                reason: format!("value for '{label}' contains control character {c:?}"),
            });
        }

        if op.is_regex() {
            Regex::new(&value).map_err(|e| HistoryError::InvalidSelector {
                reason: format!("value for '{label}' is not a valid regex: {e}"),
            })?;
        }

        Ok(Self { label, op, value })
    }

    /// The label name.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The matching operator.
    #[must_use]
    pub const fn op(&self) -> Operator {
        self.op
    }

    /// The value matched against.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Returns true if `actual` (the label's value, if present) satisfies this selector.
    ///
    /// A missing label matches as the empty string.
    #[must_use]
    pub fn matches(&self, actual: Option<&str>) -> bool {
        let actual = actual.unwrap_or_default();
        match self.op {
            Operator::Eq => actual == self.value,
            Operator::Neq => actual != self.value,
            Operator::Re | Operator::Nre => {
                let anchored = format!("^(?:{})$", self.value);
                let hit = Regex::new(&anchored).is_ok_and(|re| re.is_match(actual));
                hit == (self.op == Operator::Re)
            }
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}\"", self.label, self.op)?;
        for c in self.value.chars() {
            match c {
                '"' => f.write_str("\\\"")?,
                '\\' => f.write_str("\\\\")?,
                '\t' => f.write_str("\\t")?,
                c => write!(f, "{c}")?,
            }
        }
        f.write_str("\"")
    }
}

/// Renders selectors as a stream selector expression, e.g. `{orgID="1",from="state-history"}`.
#[must_use]
pub fn selector_string(selectors: &[Selector]) -> String {
    let parts: Vec<String> = selectors.iter().map(ToString::to_string).collect();
    format!("{{{}}}", parts.join(","))
}

/// Builds the ordered selectors for a history query.
///
/// # Errors
///
/// Returns `HistoryError::InvalidSelector` if any label filter or the rule UID
/// cannot be expressed as a selector. No partial list is returned.
pub fn build_selectors(query: &HistoryQuery) -> Result<Vec<Selector>> {
    // Organization and state history marker are always present.
    let mut selectors = Vec::with_capacity(query.labels.len() + 3);
    selectors.push(Selector::exact(ORG_ID_LABEL, query.org_id.to_string())?);
    selectors.push(Selector::exact(STATE_HISTORY_LABEL_KEY, STATE_HISTORY_LABEL_VALUE)?);

    for (label, value) in &query.labels {
        selectors.push(Selector::exact(label.as_str(), value.as_str())?);
    }

    if let Some(rule_uid) = query.rule_filter() {
        selectors.push(Selector::exact(RULE_UID_LABEL, rule_uid)?);
    }

    Ok(selectors)
}
