//! Chrome Trace Event Format reader.
//!
//! Loads a trace document (object or array form, optionally gzip-compressed)
//! and turns each entry of its event array into a [`ParsedEvent`].
//! Events are converted lazily, one per `next()` call.

use super::event::{ArgValue, ParsedEvent, Phase, RawEvent};
use super::timestamp::Timestamp;
use crate::utils::config::{GZIP_MAGIC, TRACE_EVENTS_FIELD};
use crate::utils::error::ParseError;
use flate2::read::GzDecoder;
use log::debug;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::iter::Enumerate;
use std::path::Path;
use std::slice;

/// A loaded Chrome trace document
#[derive(Debug, Clone, Default)]
pub struct TraceDocument {
    events: Vec<Value>,
}

impl TraceDocument {
    /// Parse a document from raw JSON bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ParseError> {
        let value: Value = serde_json::from_slice(bytes)?;
        Self::from_value(value)
    }

    /// Parse a document from a reader
    pub fn from_reader(reader: impl Read) -> Result<Self, ParseError> {
        let value: Value = serde_json::from_reader(reader)?;
        Self::from_value(value)
    }

    /// Accept both the JSON object format and the bare JSON array format
    pub fn from_value(value: Value) -> Result<Self, ParseError> {
        let events = match value {
            Value::Array(events) => {
                debug!("Trace is in JSON array format");
                events
            }
            Value::Object(mut obj) => match obj.remove(TRACE_EVENTS_FIELD) {
                Some(Value::Array(events)) => events,
                Some(_) => {
                    return Err(ParseError::InvalidFormat(format!(
                        "'{}' must be an array",
                        TRACE_EVENTS_FIELD
                    )))
                }
                None => {
                    return Err(ParseError::InvalidFormat(format!(
                        "Trace object has no '{}' field",
                        TRACE_EVENTS_FIELD
                    )))
                }
            },
            _ => {
                return Err(ParseError::InvalidFormat(
                    "Trace must be a JSON object or array".to_string(),
                ))
            }
        };

        debug!("Loaded trace document with {} events", events.len());
        Ok(Self { events })
    }

    /// Number of entries in the event array
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Lazy sequence of parsed events, in source order
    pub fn events(&self) -> EventStream<'_> {
        EventStream {
            inner: self.events.iter().enumerate(),
        }
    }
}

/// Iterator over the parsed events of a [`TraceDocument`]
pub struct EventStream<'a> {
    inner: Enumerate<slice::Iter<'a, Value>>,
}

impl Iterator for EventStream<'_> {
    type Item = Result<ParsedEvent, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner
            .next()
            .map(|(index, value)| parse_event(index, value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

/// Open a trace file, decompressing it when it starts with the gzip magic
///
/// **Public** - used by the convert command
pub fn open_trace_file(path: impl AsRef<Path>) -> Result<TraceDocument, ParseError> {
    TraceDocument::from_slice(&read_input_file(path.as_ref())?)
}

/// Read a whole input file, gunzipping it if needed
///
/// **Public** - shared by the trace and memory profile loaders
pub fn read_input_file(path: &Path) -> Result<Vec<u8>, ParseError> {
    debug!("Reading input from: {}", path.display());

    let mut reader = BufReader::new(File::open(path)?);
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;

    if bytes.starts_with(&GZIP_MAGIC) {
        debug!("Input is gzip-compressed");
        let mut decoded = Vec::new();
        GzDecoder::new(bytes.as_slice()).read_to_end(&mut decoded)?;
        Ok(decoded)
    } else {
        Ok(bytes)
    }
}

/// Convert one entry of the event array
///
/// **Public** - exposed for tests and single-event tooling
pub fn parse_event(index: usize, value: &Value) -> Result<ParsedEvent, ParseError> {
    let obj = value.as_object().ok_or_else(|| {
        ParseError::InvalidFormat(format!("Event {} is not a JSON object", index))
    })?;

    // Traces may end with an empty object
    if obj.is_empty() {
        return Ok(ParsedEvent::Ignored { index, phase: None });
    }

    let code = match obj.get("ph") {
        Some(Value::String(code)) => code,
        Some(other) => {
            return Err(ParseError::InvalidField {
                index,
                field: "ph",
                reason: format!("expected string, found {}", other),
            })
        }
        None => return Err(ParseError::MissingField { index, field: "ph" }),
    };

    let Some(phase) = Phase::from_code(code) else {
        return Ok(ParsedEvent::Ignored {
            index,
            phase: Some(code.clone()),
        });
    };

    let timestamp = match obj.get("ts") {
        Some(value) => parse_time(index, "ts", value)?,
        None if phase.is_timed() => {
            return Err(ParseError::MissingField { index, field: "ts" })
        }
        None => Timestamp::ZERO,
    };

    let duration = if phase == Phase::Complete {
        let value = obj
            .get("dur")
            .ok_or(ParseError::MissingField { index, field: "dur" })?;
        let duration = parse_time(index, "dur", value)?;
        if duration.is_negative() {
            return Err(ParseError::InvalidField {
                index,
                field: "dur",
                reason: format!("negative duration {}", duration),
            });
        }
        if timestamp.checked_add(duration).is_none() {
            return Err(ParseError::InvalidField {
                index,
                field: "dur",
                reason: format!("end time {} + {} overflows", timestamp, duration),
            });
        }
        Some(duration)
    } else {
        None
    };

    let async_id = if phase.is_async() {
        Some(extract_async_id(obj).ok_or(ParseError::MissingField { index, field: "id" })?)
    } else {
        None
    };

    Ok(ParsedEvent::Record(RawEvent {
        index,
        phase,
        name: text_field(obj, "name").unwrap_or_default(),
        category: text_field(obj, "cat").unwrap_or_default(),
        pid: integer_field(index, obj, "pid")?,
        tid: integer_field(index, obj, "tid")?,
        timestamp,
        duration,
        async_id,
        args: extract_args(obj),
    }))
}

/// Parse a `ts`/`dur` value into an exact timestamp
///
/// **Private** - internal helper for parse_event
fn parse_time(index: usize, field: &'static str, value: &Value) -> Result<Timestamp, ParseError> {
    Timestamp::from_json(value).ok_or_else(|| ParseError::InvalidField {
        index,
        field,
        reason: format!("expected microseconds, found {}", value),
    })
}

/// Read a string-like field; numbers are accepted and stringified
///
/// **Private** - internal helper for parse_event
fn text_field(obj: &Map<String, Value>, field: &str) -> Option<String> {
    match obj.get(field)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Read `pid`/`tid`, defaulting to 0 when absent
///
/// **Private** - internal helper for parse_event
fn integer_field(
    index: usize,
    obj: &Map<String, Value>,
    field: &'static str,
) -> Result<i64, ParseError> {
    let invalid = |value: &Value| ParseError::InvalidField {
        index,
        field,
        reason: format!("expected integer, found {}", value),
    };

    match obj.get(field) {
        None | Some(Value::Null) => Ok(0),
        Some(value @ Value::Number(n)) => n.as_i64().ok_or_else(|| invalid(value)),
        Some(value @ Value::String(s)) => s.trim().parse::<i64>().map_err(|_| invalid(value)),
        Some(value) => Err(invalid(value)),
    }
}

/// Async identity: `id`, or the `local`/`global` member of `id2`
///
/// **Private** - internal helper for parse_event
fn extract_async_id(obj: &Map<String, Value>) -> Option<String> {
    let id = obj.get("id").or_else(|| {
        let id2 = obj.get("id2")?;
        id2.get("local").or_else(|| id2.get("global"))
    })?;

    match id {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Collect scalar `args`, dropping nulls
///
/// **Private** - internal helper for parse_event
fn extract_args(obj: &Map<String, Value>) -> BTreeMap<String, ArgValue> {
    let Some(Value::Object(args)) = obj.get("args") else {
        return BTreeMap::new();
    };

    args.iter()
        .filter_map(|(key, value)| ArgValue::from_json(value).map(|v| (key.clone(), v)))
        .collect()
}
