//! Side-channel for reporting symbolic input sizes from a child to the harness.
//!
//! The child writes a single line `__SHAPE__:{"n":1000}__END_SHAPE__` on its stderr. Stdout stays
//! reserved for the answer, so a solution which never reports a shape keeps working unchanged.

use std::{
    collections::BTreeMap,
    fmt,
    io::{self, Write as _},
};

use lazy_regex::regex;
use serde::{Deserialize, Serialize};

pub const SHAPE_BEGIN_MARKER: &str = "__SHAPE__:";
pub const SHAPE_END_MARKER: &str = "__END_SHAPE__";

/// Symbolic input dimensions, e.g. `{n: 1000, k: 3}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Shape(BTreeMap<String, u64>);

#[derive(Debug, thiserror::Error)]
pub enum ShapeError {
    #[error("Shape marker payload is not a JSON object of integers: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("Shape key '{0}' is not a short ASCII identifier")]
    Key(String),
}

impl Shape {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: u64) -> Self {
        self.0.insert(key.into(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<u64> {
        self.0.get(key).copied()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn validate(self) -> Result<Self, ShapeError> {
        let bad_key = self.0.keys().find(|k| {
            k.is_empty()
                || k.len() > 32
                || !k.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        });
        match bad_key {
            Some(k) => Err(ShapeError::Key(k.clone())),
            None => Ok(self),
        }
    }
}

impl<K: Into<String>> FromIterator<(K, u64)> for Shape {
    fn from_iter<I: IntoIterator<Item = (K, u64)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let parts: Vec<_> = self.0.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

/// The exact line [`emit_shape`] writes, newline included.
pub fn format_shape(shape: &Shape) -> String {
    let json = serde_json::to_string(shape).unwrap_or_else(|_| "{}".to_owned());
    format!("{}{}{}\n", SHAPE_BEGIN_MARKER, json, SHAPE_END_MARKER)
}

/// Reports the input dimensions of the current invocation to the harness.
pub fn emit_shape(shape: &Shape) {
    let mut stderr = io::stderr().lock();
    let _ = stderr.write_all(format_shape(shape).as_bytes());
    let _ = stderr.flush();
}

/// Returns the shape carried by the last marker in `text`.
///
/// Absence of a marker is `None`. A malformed marker is also `None`, with a warning.
pub fn parse_shape_from_output(text: &str) -> Option<Shape> {
    let Some(caps) = regex!(r"__SHAPE__:(.*?)__END_SHAPE__").captures_iter(text).last() else {
        if text.contains(SHAPE_BEGIN_MARKER) {
            log::warn!("Unterminated shape marker in child stderr");
        }
        return None
    };
    let payload = &caps[1];
    match decode_payload(payload) {
        Ok(shape) => Some(shape),
        Err(e) => {
            log::warn!("Ignoring malformed shape marker '{}': {}", payload, e);
            None
        }
    }
}

fn decode_payload(payload: &str) -> Result<Shape, ShapeError> {
    let shape: Shape = serde_json::from_str(payload)?;
    shape.validate()
}

/// Removes every marker block (and the newline following it) from `text`.
pub fn strip_shape_from_output(text: &str) -> String {
    regex!(r"__SHAPE__:.*?__END_SHAPE__(\r?\n)?")
        .replace_all(text, "")
        .into_owned()
}
