//! Label sets and their canonical string form.
//!
//! Streams in the log store are keyed by their label set. Transitions are
//! bucketed by the canonical form of their merged labels, which is sorted by
//! key and quotes both keys and values so that distinct label sets never
//! produce the same string.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{HistoryError, Result};
use crate::types::RuleMeta;

/// Label holding the organization id.
pub const ORG_ID_LABEL: &str = "orgID";
/// Label holding the rule UID.
pub const RULE_UID_LABEL: &str = "ruleUID";
/// Label holding the evaluation group name.
pub const GROUP_LABEL: &str = "group";
/// Label holding the folder UID.
pub const FOLDER_UID_LABEL: &str = "folderUID";
/// Key of the marker label present on every state history row.
pub const STATE_HISTORY_LABEL_KEY: &str = "from";
/// Value of the marker label present on every state history row.
pub const STATE_HISTORY_LABEL_VALUE: &str = "state-history";

/// A set of labels with unique keys, ordered by key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelSet(BTreeMap<String, String>);

impl LabelSet {
    /// Creates an empty label set.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Inserts a label, replacing any previous value for the key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Returns the value of a label.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Number of labels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no labels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates labels in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns a copy without private labels.
    #[must_use]
    pub fn without_private(&self) -> Self {
        Self(
            self.0
                .iter()
                .filter(|(k, _)| !is_private_label(k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    /// Overlays `other` on top of this set; keys in `other` win.
    pub fn overlay<'a, I>(&mut self, other: I)
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        for (k, v) in other {
            self.0.insert(k.clone(), v.clone());
        }
    }

    /// Sets the identity labels of a rule and the state history marker.
    pub fn set_identity(&mut self, rule: &RuleMeta) {
        self.insert(STATE_HISTORY_LABEL_KEY, STATE_HISTORY_LABEL_VALUE);
        self.insert(ORG_ID_LABEL, rule.org_id.to_string());
        self.insert(RULE_UID_LABEL, rule.uid.as_str());
        self.insert(GROUP_LABEL, rule.group.as_str());
        self.insert(FOLDER_UID_LABEL, rule.namespace_uid.as_str());
    }

    /// Renders the canonical form: `{"k1"="v1", "k2"="v2"}` in key order.
    #[must_use]
    pub fn canonical(&self) -> String {
        let mut out = String::from("{");
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            push_quoted(&mut out, k);
            out.push('=');
            push_quoted(&mut out, v);
        }
        out.push('}');
        out
    }

    /// Parses a string produced by [`LabelSet::canonical`].
    ///
    /// # Errors
    ///
    /// Returns `HistoryError::LabelParse` if the input is not a well-formed
    /// canonical label string or repeats a key.
    pub fn parse_canonical(input: &str) -> Result<Self> {
        let mut parser = CanonicalParser::new(input);
        parser.expect('{')?;

        let mut labels = BTreeMap::new();
        if parser.peek() == Some('}') {
            parser.bump();
        } else {
            loop {
                let key = parser.quoted()?;
                parser.expect('=')?;
                let value = parser.quoted()?;
                if labels.insert(key.clone(), value).is_some() {
                    return Err(parse_error(format!("duplicate label key {key:?}")));
                }
                match parser.bump() {
                    Some(',') => parser.expect(' ')?,
                    Some('}') => break,
                    Some(c) => return Err(parse_error(format!("unexpected character {c:?}"))),
                    None => return Err(parse_error("unterminated label set")),
                }
            }
        }

        if let Some(c) = parser.peek() {
            return Err(parse_error(format!("trailing character {c:?}")));
        }
        Ok(Self(labels))
    }
}

impl fmt::Display for LabelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for LabelSet {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl From<BTreeMap<String, String>> for LabelSet {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

impl<'a> IntoIterator for &'a LabelSet {
    type Item = (&'a String, &'a String);
    type IntoIter = std::collections::btree_map::Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Returns true for internal labels that must not be written to the store.
#[must_use]
pub fn is_private_label(key: &str) -> bool {
    key.starts_with("__") || key.ends_with("__")
}

fn push_quoted(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
}

fn parse_error(reason: impl Into<String>) -> HistoryError {
    HistoryError::LabelParse {
        reason: reason.into(),
    }
}

struct CanonicalParser<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
}

impl<'a> CanonicalParser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn bump(&mut self) -> Option<char> {
        self.chars.next()
    }

    fn expect(&mut self, want: char) -> Result<()> {
        match self.bump() {
            Some(c) if c == want => Ok(()),
            Some(c) => Err(parse_error(format!("expected {want:?}, found {c:?}"))),
            None => Err(parse_error(format!("expected {want:?}, found end of input"))),
        }
    }

    fn quoted(&mut self) -> Result<String> {
        self.expect('"')?;
        let mut out = String::new();
        loop {
            match self.bump() {
                Some('"') => return Ok(out),
                Some('\\') => match self.bump() {
                    Some('"') => out.push('"'),
                    Some('\\') => out.push('\\'),
                    Some('n') => out.push('\n'),
                    Some('r') => out.push('\r'),
                    Some('t') => out.push('\t'),
                    Some(c) => return Err(parse_error(format!("unknown escape \\{c}"))),
                    None => return Err(parse_error("unterminated escape")),
                },
                Some(c) => out.push(c),
                None => return Err(parse_error("unterminated quoted string")),
            }
        }
    }
}
