//! Conversion of state transitions into label-keyed log streams.
//!
//! The log store groups rows by their exact label set, so every recorded
//! transition is bucketed by the canonical form of its merged labels. Rows of
//! a stream are sorted by evaluation time.
//!
//! A transition that fails to encode is logged and skipped; the rest of the
//! batch is still written. With the current [`Entry`] layout this cannot
//! happen: every field is a string, an integer or a `serde_json::Value`
//! whose numbers are finite, so `to_line` always succeeds. A bucket whose
//! label key does not parse back is logged and dropped as a whole.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::ser::{Error as _, SerializeSeq};
use serde::{Serialize, Serializer};
use tracing::{debug, error};

use crate::entry::Entry;
use crate::labels::LabelSet;
use crate::policy::RecordPolicy;
use crate::types::{RuleMeta, StateTransition};

/// One log line of a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    /// Evaluation time of the transition.
    pub at: DateTime<Utc>,
    /// Serialized [`Entry`].
    pub line: String,
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let nanos = self
            .at
            .timestamp_nanos_opt()
            .ok_or_else(|| S::Error::custom("row timestamp out of range for nanoseconds"))?;
        let mut seq = serializer.serialize_seq(Some(2))?;
        seq.serialize_element(&nanos.to_string())?;
        seq.serialize_element(&self.line)?;
        seq.end()
    }
}

/// Rows sharing one label set, in the shape the log store accepts on push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Stream {
    /// Labels of every row in the stream.
    #[serde(rename = "stream")]
    pub labels: LabelSet,
    /// Rows sorted by evaluation time; equal times keep input order.
    pub values: Vec<Row>,
}

/// Encodes transitions of a rule into streams.
#[derive(Debug, Clone, Default)]
pub struct StreamEncoder {
    external_labels: BTreeMap<String, String>,
    policy: RecordPolicy,
}

impl StreamEncoder {
    /// Creates an encoder adding `external_labels` to every stream.
    #[must_use]
    pub const fn new(external_labels: BTreeMap<String, String>, policy: RecordPolicy) -> Self {
        Self {
            external_labels,
            policy,
        }
    }

    /// Returns the recording policy.
    #[must_use]
    pub const fn policy(&self) -> &RecordPolicy {
        &self.policy
    }

    /// Returns the static labels added to every stream.
    #[must_use]
    pub const fn external_labels(&self) -> &BTreeMap<String, String> {
        &self.external_labels
    }

    /// Merged labels of a transition: instance labels without private keys,
    /// then external labels, then the rule's identity labels.
    #[must_use]
    pub fn labels_for(&self, rule: &RuleMeta, transition: &StateTransition) -> LabelSet {
        let mut labels = transition.labels.without_private();
        labels.overlay(&self.external_labels);
        labels.set_identity(rule);
        labels
    }

    /// Converts a batch of transitions into streams.
    ///
    /// Transitions rejected by the recording policy contribute no rows.
    /// Streams are returned in canonical label order.
    #[must_use]
    pub fn encode(&self, rule: &RuleMeta, transitions: &[StateTransition]) -> Vec<Stream> {
        let mut buckets: BTreeMap<String, Vec<Row>> = BTreeMap::new();

        for transition in transitions {
            if !self.policy.should_record(transition) {
                continue;
            }

            let repr = self.labels_for(rule, transition).canonical();
            let line = match Entry::from_transition(rule, transition).to_line() {
                Ok(line) => line,
                Err(e) => {
                    error!(
                        rule_uid = %rule.uid,
                        error = %e,
                        "failed to construct history record for state, skipping"
                    );
                    continue;
                }
            };

            buckets.entry(repr).or_default().push(Row {
                at: transition.evaluated_at,
                line,
            });
        }

        let streams = Self::into_streams(buckets, &rule.uid);
        debug!(
            rule_uid = %rule.uid,
            streams = streams.len(),
            transitions = transitions.len(),
            "encoded state history streams"
        );
        streams
    }

    fn into_streams(buckets: BTreeMap<String, Vec<Row>>, rule_uid: &str) -> Vec<Stream> {
        let mut streams = Vec::with_capacity(buckets.len());
        for (repr, mut values) in buckets {
            values.sort_by_key(|row| row.at);
            match LabelSet::parse_canonical(&repr) {
                Ok(labels) => streams.push(Stream { labels, values }),
                Err(e) => {
                    error!(
                        rule_uid = %rule_uid,
                        labels = %repr,
                        error = %e,
                        "failed to parse stream labels, skipping state history batch"
                    );
                }
            }
        }
        streams
    }
}
