//! Normalized trace records produced by the event parser.

use super::timestamp::Timestamp;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Chrome event phase codes the converter understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// `B` - opens a duration on the thread's stack
    Begin,
    /// `E` - closes the innermost open duration
    End,
    /// `X` - start plus duration in one record
    Complete,
    /// `i` / `I` - a point in time
    Instant,
    /// `C` - counter values
    Counter,
    /// `M` - process/thread naming
    Metadata,
    /// `b` - nestable async begin
    AsyncBegin,
    /// `e` - nestable async end
    AsyncEnd,
    /// `n` - nestable async instant
    AsyncInstant,
}

impl Phase {
    /// Map a Chrome `ph` code to a phase
    ///
    /// Returns `None` for codes the converter skips (flow, object, sample, ...).
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "B" => Some(Phase::Begin),
            "E" => Some(Phase::End),
            "X" => Some(Phase::Complete),
            "i" | "I" => Some(Phase::Instant),
            "C" => Some(Phase::Counter),
            "M" => Some(Phase::Metadata),
            "b" => Some(Phase::AsyncBegin),
            "e" => Some(Phase::AsyncEnd),
            "n" => Some(Phase::AsyncInstant),
            _ => None,
        }
    }

    /// Canonical Chrome code for this phase
    pub fn code(self) -> &'static str {
        match self {
            Phase::Begin => "B",
            Phase::End => "E",
            Phase::Complete => "X",
            Phase::Instant => "i",
            Phase::Counter => "C",
            Phase::Metadata => "M",
            Phase::AsyncBegin => "b",
            Phase::AsyncEnd => "e",
            Phase::AsyncInstant => "n",
        }
    }

    /// Whether events of this phase must carry a `ts`
    pub fn is_timed(self) -> bool {
        !matches!(self, Phase::Metadata)
    }

    /// Whether events of this phase live on an async track
    pub fn is_async(self) -> bool {
        matches!(
            self,
            Phase::AsyncBegin | Phase::AsyncEnd | Phase::AsyncInstant
        )
    }
}

/// Scalar value of an `args` entry
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ArgValue {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
}

impl ArgValue {
    /// Convert a JSON value into an argument value
    ///
    /// `null` yields `None`; arrays and objects are kept as compact JSON text.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(b) => Some(ArgValue::Bool(*b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(ArgValue::Int(i))
                } else if let Some(u) = n.as_u64() {
                    Some(ArgValue::UInt(u))
                } else {
                    n.as_f64().map(ArgValue::Float)
                }
            }
            Value::String(s) => Some(ArgValue::Str(s.clone())),
            Value::Array(_) | Value::Object(_) => Some(ArgValue::Str(value.to_string())),
        }
    }

    /// Text form, as used for metadata names
    pub fn to_text(&self) -> String {
        match self {
            ArgValue::Bool(b) => b.to_string(),
            ArgValue::Int(i) => i.to_string(),
            ArgValue::UInt(u) => u.to_string(),
            ArgValue::Float(f) => f.to_string(),
            ArgValue::Str(s) => s.clone(),
        }
    }
}

/// One parsed Chrome trace event
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    /// Position of the event in the source `traceEvents` array
    pub index: usize,
    pub phase: Phase,
    pub name: String,
    /// Empty when the source has no `cat`
    pub category: String,
    pub pid: i64,
    pub tid: i64,
    pub timestamp: Timestamp,
    /// Only present (and then required) for `Complete` events
    pub duration: Option<Timestamp>,
    /// Async track identifier for `b` / `e` / `n` events
    pub async_id: Option<String>,
    pub args: BTreeMap<String, ArgValue>,
}

/// Parser output for a single array entry
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedEvent {
    /// A record the timeline builder consumes
    Record(RawEvent),
    /// An event the converter does not handle; counted, not dropped silently
    Ignored {
        index: usize,
        /// The unknown `ph` code, `None` for empty objects
        phase: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_phase_codes() {
        assert_eq!(Phase::from_code("X"), Some(Phase::Complete));
        assert_eq!(Phase::from_code("I"), Some(Phase::Instant));
        assert_eq!(Phase::from_code("i"), Some(Phase::Instant));
        assert_eq!(Phase::from_code("s"), None);
        assert_eq!(Phase::from_code("f"), None);
        assert_eq!(Phase::Instant.code(), "i");
        assert!(!Phase::Metadata.is_timed());
        assert!(Phase::AsyncEnd.is_async());
    }

    #[test]
    fn test_arg_values() {
        assert_eq!(ArgValue::from_json(&json!(3)), Some(ArgValue::Int(3)));
        assert_eq!(
            ArgValue::from_json(&json!(u64::MAX)),
            Some(ArgValue::UInt(u64::MAX))
        );
        assert_eq!(ArgValue::from_json(&json!(0.5)), Some(ArgValue::Float(0.5)));
        assert_eq!(ArgValue::from_json(&json!(null)), None);
        assert_eq!(
            ArgValue::from_json(&json!([1, 2])),
            Some(ArgValue::Str("[1,2]".to_string()))
        );
    }
}
