//! Value Model
//!
//! The tagged value variant shared by the parser, evaluator, and every
//! external collaborator. Mirrors the shape of `serde_json::Value` closely
//! enough that JSON heredocs and `JSON_STRINGIFY`-style functions can convert
//! losslessly, while keeping Rexx's untyped-string truthiness and numeric
//! coercion rules on top.

use indexmap::IndexMap;
use std::fmt;

/// A Rexx value. Every value the evaluator produces or consumes is one of
/// these variants; there are no untyped boxes anywhere in the core.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Array(Vec<Value>),
    Object(IndexMap<String, Value>),
    /// A heredoc payload: raw content plus the delimiter that introduced it.
    /// Delimiters containing "json" (case-insensitive) are parsed eagerly by
    /// the evaluator into `Array`/`Object` (see `Value::from_heredoc`).
    HeredocString { content: String, delimiter: String },
}

/// Error raised when a heredoc tagged as JSON fails to parse (or is empty).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonHeredocError {
    pub delimiter: String,
    pub message: String,
}

impl fmt::Display for JsonHeredocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid JSON heredoc <<{}: {}", self.delimiter, self.message)
    }
}

impl std::error::Error for JsonHeredocError {}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    /// Build a `Value` from a heredoc, parsing it as JSON when the delimiter
    /// mentions "json" (case-insensitive). An empty or invalid JSON payload
    /// under a JSON-tagged delimiter is a hard error — there is no silent
    /// fallback to a plain string.
    pub fn from_heredoc(content: &str, delimiter: &str) -> Result<Value, JsonHeredocError> {
        if delimiter.to_ascii_lowercase().contains("json") {
            if content.trim().is_empty() {
                return Err(JsonHeredocError {
                    delimiter: delimiter.to_string(),
                    message: "empty JSON payload".to_string(),
                });
            }
            let parsed: serde_json::Value = serde_json::from_str(content).map_err(|e| JsonHeredocError {
                delimiter: delimiter.to_string(),
                message: e.to_string(),
            })?;
            Ok(Value::from_json(parsed))
        } else {
            Ok(Value::HeredocString {
                content: content.to_string(),
                delimiter: delimiter.to_string(),
            })
        }
    }

    pub fn from_json(v: serde_json::Value) -> Value {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Integer(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(a) => Value::Array(a.into_iter().map(Value::from_json).collect()),
            serde_json::Value::Object(o) => {
                let mut map = IndexMap::with_capacity(o.len());
                for (k, v) in o {
                    map.insert(k, Value::from_json(v));
                }
                Value::Object(map)
            }
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Integer(i) => serde_json::Value::Number((*i).into()),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Array(a) => serde_json::Value::Array(a.iter().map(Value::to_json).collect()),
            Value::Object(o) => {
                let mut map = serde_json::Map::with_capacity(o.len());
                for (k, v) in o {
                    map.insert(k.clone(), v.to_json());
                }
                serde_json::Value::Object(map)
            }
            Value::HeredocString { content, .. } => serde_json::Value::String(content.clone()),
        }
    }

    /// Rexx truthiness: empty string, `0`, `0.0`, `Null`, and empty
    /// array/object are false; everything else is true.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Integer(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => !s.is_empty() && s != "0",
            Value::Array(a) => !a.is_empty(),
            Value::Object(o) => !o.is_empty(),
            Value::HeredocString { content, .. } => !content.is_empty(),
        }
    }

    /// Attempt to coerce to a number for arithmetic. Strings are parsed as
    /// integer or float; anything else fails.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Null => Some(0.0),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// True if the value is numeric or a numeric-looking string.
    pub fn is_numeric_coercible(&self) -> bool {
        self.as_number().is_some()
    }

    /// Whether the underlying numeric value (if any) is an integer, used to
    /// decide if arithmetic results should stay `Integer` or promote to
    /// `Float`.
    pub fn is_integral(&self) -> bool {
        match self {
            Value::Integer(_) => true,
            Value::String(s) => s.trim().parse::<i64>().is_ok(),
            _ => false,
        }
    }

    pub fn to_display_string(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => format_float(*f),
            Value::String(s) => s.clone(),
            Value::Array(_) | Value::Object(_) => {
                serde_json::to_string(&self.to_json()).unwrap_or_default()
            }
            Value::HeredocString { content, .. } => content.clone(),
        }
    }
}

fn format_float(f: f64) -> String {
    if f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        let mut s = format!("{}", f);
        if !s.contains('.') && !s.contains('e') {
            s.push_str(".0");
        }
        s
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_display_string())
    }
}

/// Comparison outcome for Rexx's `=`, `<`, `>`, etc. Numeric comparison is
/// used when both operands coerce to numbers; otherwise falls back to
/// string comparison (matching Rexx's loose-typed comparison rules).
pub fn compare_values(left: &Value, right: &Value) -> std::cmp::Ordering {
    if let (Some(l), Some(r)) = (left.as_number(), right.as_number()) {
        l.partial_cmp(&r).unwrap_or(std::cmp::Ordering::Equal)
    } else {
        left.to_display_string().cmp(&right.to_display_string())
    }
}

pub fn values_equal(left: &Value, right: &Value) -> bool {
    if let (Some(l), Some(r)) = (left.as_number(), right.as_number()) {
        l == r
    } else {
        left.to_display_string() == right.to_display_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness_matches_rexx_rules() {
        assert!(!Value::String(String::new()).is_truthy());
        assert!(!Value::String("0".to_string()).is_truthy());
        assert!(Value::String("0.0".to_string()).is_truthy());
        assert!(Value::Integer(0) == Value::Integer(0));
        assert!(!Value::Integer(0).is_truthy());
        assert!(Value::Integer(1).is_truthy());
    }

    #[test]
    fn numeric_coercion() {
        assert_eq!(Value::String("3".to_string()).as_number(), Some(3.0));
        assert_eq!(Value::String("three".to_string()).as_number(), None);
    }

    #[test]
    fn json_heredoc_empty_is_hard_error() {
        let err = Value::from_heredoc("", "JSON").unwrap_err();
        assert!(err.message.contains("empty"));
    }

    #[test]
    fn json_heredoc_parses_object() {
        let v = Value::from_heredoc(r#"{"a": 1}"#, "ENDJSON").unwrap();
        match v {
            Value::Object(m) => assert_eq!(m.get("a"), Some(&Value::Integer(1))),
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn non_json_heredoc_stays_raw() {
        let v = Value::from_heredoc("hello\nworld", "EOF").unwrap();
        match v {
            Value::HeredocString { content, delimiter } => {
                assert_eq!(content, "hello\nworld");
                assert_eq!(delimiter, "EOF");
            }
            _ => panic!("expected heredoc string"),
        }
    }

    #[test]
    fn compare_is_numeric_when_possible() {
        assert_eq!(
            compare_values(&Value::String("10".to_string()), &Value::String("9".to_string())),
            std::cmp::Ordering::Greater
        );
    }
}
