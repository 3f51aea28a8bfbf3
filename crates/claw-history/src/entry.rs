//! The persisted state history entry.
//!
//! One [`Entry`] is written per recorded transition as the log line of a
//! stream row. The JSON layout is a stable contract: readers decode and
//! re-encode it, so field names and order must not change.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::error::Result;
use crate::types::{EvalState, RuleMeta, StateTransition};

/// Current version of the entry schema.
pub const SCHEMA_VERSION: i64 = 1;

/// A single state history record as stored in the log line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    /// Version of this schema.
    pub schema_version: i64,
    /// Display form of the previous state.
    pub previous: String,
    /// Display form of the current state.
    pub current: String,
    /// Evaluation error, only set when the current state is `Error`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
    /// Evaluation values, or `{}` when the current state carries none.
    #[serde(default)]
    pub values: Value,
    /// Dashboard linked to the rule.
    #[serde(rename = "dashboardUID", default)]
    pub dashboard_uid: String,
    /// Panel linked to the rule.
    #[serde(rename = "panelID", default)]
    pub panel_id: i64,
}

impl Entry {
    /// Builds the entry recorded for a transition of the given rule.
    #[must_use]
    pub fn from_transition(rule: &RuleMeta, transition: &StateTransition) -> Self {
        let values = if transition.current.discards_values() {
            Value::Object(Map::new())
        } else {
            values_blob(transition.values.as_ref())
        };

        let error = if transition.current == EvalState::Error {
            transition.error.clone().unwrap_or_default()
        } else {
            String::new()
        };

        Self {
            schema_version: SCHEMA_VERSION,
            previous: transition.previous_formatted(),
            current: transition.formatted(),
            error,
            values,
            dashboard_uid: rule.dashboard_uid.clone(),
            panel_id: rule.panel_id,
        }
    }

    /// Serializes the entry to its log line.
    ///
    /// # Errors
    ///
    /// Returns `HistoryError::Serialization` if encoding fails.
    pub fn to_line(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes an entry from a log line.
    ///
    /// # Errors
    ///
    /// Returns `HistoryError::Serialization` if the line is not a valid entry.
    pub fn from_line(line: &str) -> Result<Self> {
        Ok(serde_json::from_str(line)?)
    }
}

/// Decodes a log line as an [`Entry`] and encodes it again.
///
/// # Errors
///
/// Returns `HistoryError::Serialization` if the line does not hold a valid entry.
pub fn reencode_line(line: &str) -> Result<String> {
    Entry::from_line(line)?.to_line()
}

/// Renders evaluation values as a JSON object.
///
/// Non-finite numbers have no JSON representation and are written as strings.
fn values_blob(values: Option<&BTreeMap<String, f64>>) -> Value {
    let Some(values) = values else {
        return Value::Null;
    };

    let map = values
        .iter()
        .map(|(name, v)| {
            let json = Number::from_f64(*v).map_or_else(
                || Value::String(non_finite_repr(*v).to_string()),
                Value::Number,
            );
            (name.clone(), json)
        })
        .collect();
    Value::Object(map)
}

fn non_finite_repr(v: f64) -> &'static str {
    if v.is_nan() {
        "NaN"
    } else if v.is_sign_positive() {
        "+Inf"
    } else {
        "-Inf"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn rule() -> RuleMeta {
        RuleMeta {
            org_id: 1,
            uid: "r1".to_string(),
            group: "g".to_string(),
            namespace_uid: "f".to_string(),
            dashboard_uid: "dash-1".to_string(),
            panel_id: 4,
        }
    }

    #[test]
    fn entry_layout_matches_schema() {
        let t = StateTransition::new(EvalState::Normal, EvalState::Alerting, Utc::now())
            .with_value("B", 2.0)
            .with_value("A", 1.5);
        let line = Entry::from_transition(&rule(), &t).to_line().unwrap();
        assert_eq!(
            line,
            r#"{"schemaVersion":1,"previous":"Normal","current":"Alerting","values":{"A":1.5,"B":2.0},"dashboardUID":"dash-1","panelID":4}"#
        );
    }

    #[test]
    fn no_data_values_are_empty_object() {
        let t = StateTransition::new(EvalState::Alerting, EvalState::NoData, Utc::now())
            .with_value("A", 99.0);
        let entry = Entry::from_transition(&rule(), &t);
        assert_eq!(entry.values, Value::Object(Map::new()));
        assert!(entry.to_line().unwrap().contains(r#""values":{}"#));
    }

    #[test]
    fn error_state_carries_error_and_empty_values() {
        let t = StateTransition::new(EvalState::Normal, EvalState::Error, Utc::now())
            .with_value("A", 3.0)
            .with_error("datasource unreachable");
        let entry = Entry::from_transition(&rule(), &t);
        assert_eq!(entry.error, "datasource unreachable");
        assert_eq!(entry.values, Value::Object(Map::new()));
    }

    #[test]
    fn error_is_omitted_outside_error_state() {
        let t = StateTransition::new(EvalState::Error, EvalState::Normal, Utc::now())
            .with_error("stale error");
        let line = Entry::from_transition(&rule(), &t).to_line().unwrap();
        assert!(!line.contains("\"error\""));
    }

    #[test]
    fn missing_values_render_as_null() {
        let t = StateTransition::new(EvalState::Pending, EvalState::Alerting, Utc::now());
        let entry = Entry::from_transition(&rule(), &t);
        assert_eq!(entry.values, Value::Null);
    }

    #[test]
    fn non_finite_values_render_as_strings() {
        let t = StateTransition::new(EvalState::Normal, EvalState::Alerting, Utc::now())
            .with_value("inf", f64::INFINITY)
            .with_value("neg", f64::NEG_INFINITY)
            .with_value("nan", f64::NAN);
        let entry = Entry::from_transition(&rule(), &t);
        assert_eq!(entry.values["inf"], Value::String("+Inf".to_string()));
        assert_eq!(entry.values["neg"], Value::String("-Inf".to_string()));
        assert_eq!(entry.values["nan"], Value::String("NaN".to_string()));
    }

    #[test]
    fn reencode_is_byte_identical() {
        let t = StateTransition::new(EvalState::Normal, EvalState::Error, Utc::now())
            .with_reasons("", "Error")
            .with_error("boom");
        let line = Entry::from_transition(&rule(), &t).to_line().unwrap();
        assert_eq!(reencode_line(&line).unwrap(), line);

        let t = StateTransition::new(EvalState::Pending, EvalState::Alerting, Utc::now())
            .with_value("A", 0.1)
            .with_value("B", 7.0);
        let line = Entry::from_transition(&rule(), &t).to_line().unwrap();
        assert_eq!(reencode_line(&line).unwrap(), line);
    }

    #[test]
    fn reencode_rejects_malformed_lines() {
        assert!(reencode_line("not json").is_err());
        assert!(reencode_line(r#"{"schemaVersion":"one"}"#).is_err());
        assert!(reencode_line("[1,2,3]").is_err());
    }
}
