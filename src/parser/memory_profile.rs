//! TensorFlow memory profile reader.
//!
//! A memory profile (`<host>.memory_profile.json[.gz]`) lists snapshots per
//! allocator. Each snapshot carries a `timeOffsetPs`, the `memoryActivity`
//! that produced it, and metadata/aggregation fields that become attributes.

use super::chrome_trace::read_input_file;
use super::event::ArgValue;
use super::timestamp::Timestamp;
use crate::utils::config::{MEMORY_UINT_FIELDS, PICOS_PER_TICK};
use crate::utils::error::ParseError;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMemoryProfile {
    memory_profile_per_allocator: BTreeMap<String, RawAllocator>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAllocator {
    #[serde(default)]
    memory_profile_snapshots: Vec<RawSnapshot>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSnapshot {
    time_offset_ps: Option<Value>,
    #[serde(default)]
    activity_metadata: Map<String, Value>,
    #[serde(default)]
    aggregation_stats: Map<String, Value>,
}

/// One allocator snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct MemorySnapshot {
    /// Position across all snapshots of the profile
    pub index: usize,
    pub timestamp: Timestamp,
    /// `activityMetadata.memoryActivity`, e.g. `ALLOCATION`
    pub activity: String,
    /// Activity metadata merged with aggregation stats
    pub attributes: BTreeMap<String, ArgValue>,
}

/// Snapshots of one allocator, in file order
#[derive(Debug, Clone, PartialEq)]
pub struct AllocatorProfile {
    pub name: String,
    pub snapshots: Vec<MemorySnapshot>,
}

/// A loaded memory profile; allocators are ordered by name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryProfile {
    pub allocators: Vec<AllocatorProfile>,
}

impl MemoryProfile {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ParseError> {
        Self::from_value(serde_json::from_slice(bytes)?)
    }

    /// Convert a parsed JSON value
    ///
    /// # Errors
    /// * `ParseError::JsonError` - `memoryProfilePerAllocator` is missing or mistyped
    /// * `ParseError::MissingField` - a snapshot has no time or activity
    /// * `ParseError::InvalidField` - a time offset is not an integer
    pub fn from_value(value: Value) -> Result<Self, ParseError> {
        let raw: RawMemoryProfile = serde_json::from_value(value)?;

        let mut index = 0;
        let mut allocators = Vec::with_capacity(raw.memory_profile_per_allocator.len());
        for (name, allocator) in raw.memory_profile_per_allocator {
            let mut snapshots = Vec::with_capacity(allocator.memory_profile_snapshots.len());
            for snapshot in allocator.memory_profile_snapshots {
                snapshots.push(convert_snapshot(index, snapshot)?);
                index += 1;
            }
            allocators.push(AllocatorProfile { name, snapshots });
        }

        Ok(Self { allocators })
    }

    pub fn snapshot_count(&self) -> usize {
        self.allocators.iter().map(|a| a.snapshots.len()).sum()
    }
}

/// Load a memory profile file, plain or gzip
///
/// **Public** - used by the convert command for `--memory-profile`
pub fn open_memory_profile(path: impl AsRef<Path>) -> Result<MemoryProfile, ParseError> {
    MemoryProfile::from_slice(&read_input_file(path.as_ref())?)
}

fn convert_snapshot(index: usize, raw: RawSnapshot) -> Result<MemorySnapshot, ParseError> {
    let time = raw.time_offset_ps.ok_or(ParseError::MissingField {
        index,
        field: "timeOffsetPs",
    })?;
    let timestamp = picos_to_timestamp(&time).ok_or_else(|| ParseError::InvalidField {
        index,
        field: "timeOffsetPs",
        reason: format!("expected integer picoseconds, found {}", time),
    })?;

    let activity = match raw.activity_metadata.get("memoryActivity") {
        Some(Value::String(s)) => s.clone(),
        _ => {
            return Err(ParseError::MissingField {
                index,
                field: "memoryActivity",
            })
        }
    };

    let attributes = raw
        .activity_metadata
        .iter()
        .chain(raw.aggregation_stats.iter())
        .filter_map(|(key, value)| attribute_value(key, value).map(|v| (key.clone(), v)))
        .collect();

    Ok(MemorySnapshot {
        index,
        timestamp,
        activity,
        attributes,
    })
}

/// Picoseconds (number or numeric string) floored to nanosecond ticks
fn picos_to_timestamp(value: &Value) -> Option<Timestamp> {
    let picos = match value {
        Value::Number(n) => n.as_i64()?,
        Value::String(s) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    Some(Timestamp::from_ticks(picos.div_euclid(PICOS_PER_TICK)))
}

/// Typed attribute value; known byte/id fields are unsigned even when quoted
fn attribute_value(key: &str, value: &Value) -> Option<ArgValue> {
    if MEMORY_UINT_FIELDS.contains(&key) {
        let parsed = match value {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse::<u64>().ok(),
            _ => None,
        };
        if let Some(u) = parsed {
            return Some(ArgValue::UInt(u));
        }
    }
    ArgValue::from_json(value)
}
