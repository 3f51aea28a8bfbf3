//! Recording policy deciding which transitions are written to history.

use serde::{Deserialize, Serialize};

use crate::types::{EvalState, StateTransition};

/// Filter applied to every transition before it is encoded.
///
/// The default records only transitions whose state or reason changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordPolicy {
    /// Record evaluations that left the state and reason unchanged.
    pub record_unchanged: bool,
    /// Never record transitions into these states.
    pub excluded_states: Vec<EvalState>,
}

impl RecordPolicy {
    /// Creates the default policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Also records unchanged evaluations.
    #[must_use]
    pub const fn record_unchanged(mut self, record: bool) -> Self {
        self.record_unchanged = record;
        self
    }

    /// Excludes transitions into `state`.
    #[must_use]
    pub fn exclude(mut self, state: EvalState) -> Self {
        if !self.excluded_states.contains(&state) {
            self.excluded_states.push(state);
        }
        self
    }

    /// Returns true if the transition should be written to history.
    #[must_use]
    pub fn should_record(&self, transition: &StateTransition) -> bool {
        if !self.record_unchanged && !transition.changed() {
            return false;
        }
        !self.excluded_states.contains(&transition.current)
    }
}
