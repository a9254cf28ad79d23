//! Path lookup into parsed player documents.
//!
//! A player save file is parsed into a `serde_json::Value` tree and stats are
//! located with dotted paths such as `advancementData.totalCaptureCount`.
//! Each segment selects an object member, or an array element when the
//! segment is a non-negative integer. `~1` inside a segment stands for a
//! literal `.` and `~0` for a literal `~`.

use serde_json::Value;

/// A validated, pre-split lookup path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatPath {
    raw: String,
    segments: Vec<String>,
}

/// Errors from parsing a path expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    /// The path expression is empty.
    Empty,
    /// A segment between two dots (or at either end) is empty.
    EmptySegment { path: String, position: usize },
}

impl std::fmt::Display for PathError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathError::Empty => write!(f, "path is empty"),
            PathError::EmptySegment { path, position } => {
                write!(f, "path '{path}' has an empty segment at position {position}")
            }
        }
    }
}

impl std::error::Error for PathError {}

impl StatPath {
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        if raw.is_empty() {
            return Err(PathError::Empty);
        }
        let segments = raw
            .split('.')
            .enumerate()
            .map(|(position, segment)| {
                if segment.is_empty() {
                    Err(PathError::EmptySegment {
                        path: raw.to_string(),
                        position,
                    })
                } else {
                    Ok(unescape(segment))
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    /// The path as written in configuration.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    #[cfg(test)]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl std::fmt::Display for StatPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// `~1` must be replaced before `~0` so that `~01` decodes to `~1`.
fn unescape(segment: &str) -> String {
    segment.replace("~1", ".").replace("~0", "~")
}

/// Outcome of resolving a stat path against a document.
#[derive(Debug, Clone, PartialEq)]
pub enum StatValue {
    /// Nothing (or `null`) at the path.
    Absent,
    Number(f64),
    /// Something other than a number is at the path; carries its JSON type.
    Mismatch(&'static str),
}

/// Parse raw file contents into a document.
pub fn parse_document(bytes: &[u8]) -> Result<Value, serde_json::Error> {
    serde_json::from_slice(bytes)
}

/// Find the value at `path`, treating `null` as absent.
pub fn lookup<'a>(document: &'a Value, path: &StatPath) -> Option<&'a Value> {
    descend(document, &path.segments)
}

fn descend<'a>(node: &'a Value, segments: &[String]) -> Option<&'a Value> {
    let Some((head, rest)) = segments.split_first() else {
        return match node {
            Value::Null => None,
            other => Some(other),
        };
    };
    let child = match node {
        Value::Object(members) => members.get(head)?,
        Value::Array(items) => items.get(head.parse::<usize>().ok()?)?,
        _ => return None,
    };
    descend(child, rest)
}

/// Resolve `path` and classify the result as a numeric stat.
pub fn resolve_stat(document: &Value, path: &StatPath) -> StatValue {
    match lookup(document, path) {
        None => StatValue::Absent,
        Some(Value::Number(n)) => match n.as_f64() {
            Some(v) => StatValue::Number(v),
            None => StatValue::Mismatch("number"),
        },
        Some(other) => StatValue::Mismatch(kind_name(other)),
    }
}

/// JSON type name used in mismatch diagnostics.
pub fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
