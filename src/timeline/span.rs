//! Intermediate representation shared by the resolver and emitter passes.
//!
//! The timeline builder produces these records once; both later passes only
//! read them.

use crate::definitions::symbols::StringRef;
use crate::parser::Timestamp;
use crate::utils::config::MEMORY_PROFILE_PID;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::Range;

/// Which timeline of a process a record belongs to
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Track {
    /// An OS thread (`tid`)
    Thread(i64),
    /// A nestable async span track (`id`)
    Async(String),
    /// The per-process measurement location carrying counter samples
    Counters,
    /// A memory allocator of a TensorFlow memory profile
    Allocator(String),
}

/// Identity of a location before ids are assigned
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct LocationKey {
    pub pid: i64,
    pub track: Track,
}

impl LocationKey {
    pub fn thread(pid: i64, tid: i64) -> Self {
        Self {
            pid,
            track: Track::Thread(tid),
        }
    }

    pub fn async_track(pid: i64, id: impl Into<String>) -> Self {
        Self {
            pid,
            track: Track::Async(id.into()),
        }
    }

    pub fn counters(pid: i64) -> Self {
        Self {
            pid,
            track: Track::Counters,
        }
    }

    /// Allocator locations all belong to the memory allocator group
    pub fn allocator(name: impl Into<String>) -> Self {
        Self {
            pid: MEMORY_PROFILE_PID,
            track: Track::Allocator(name.into()),
        }
    }
}

impl fmt::Display for LocationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.track {
            Track::Thread(tid) => write!(f, "pid {} tid {}", self.pid, tid),
            Track::Async(id) => write!(f, "pid {} async {}", self.pid, id),
            Track::Counters => write!(f, "pid {} counters", self.pid),
            Track::Allocator(name) => write!(f, "allocator {}", name),
        }
    }
}

/// Attribute value attached to an enter record
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AttributeValue {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Double(f64),
    String(StringRef),
}

/// One `args` entry of a span, with interned key
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Attribute {
    pub key: StringRef,
    pub value: AttributeValue,
}

/// A resolved, well-nested interval on one location
#[derive(Debug, Clone, PartialEq)]
pub struct Span {
    pub name: StringRef,
    pub category: StringRef,
    pub location: LocationKey,
    pub start: Timestamp,
    pub end: Timestamp,
    pub attributes: Vec<Attribute>,
    /// Index of the source event that opened the span
    pub sequence: usize,
}

impl Span {
    pub fn duration(&self) -> Timestamp {
        Timestamp::from_ticks(self.end.ticks() - self.start.ticks())
    }

    /// Whether `other` lies entirely within this span
    pub fn contains(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

/// Numeric value of a counter sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetricValue {
    Int(i64),
    Double(f64),
}

/// One series value of a Chrome counter event
#[derive(Debug, Clone, PartialEq)]
pub struct CounterSample {
    pub pid: i64,
    /// Counter event name
    pub name: StringRef,
    /// `args` key the value came from
    pub series: StringRef,
    pub timestamp: Timestamp,
    pub value: MetricValue,
    pub sequence: usize,
}

/// Recoverable problems found while building the timeline
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConversionWarning {
    /// An `E` with no open `B` on its location
    DanglingEnd { index: usize, location: LocationKey },
    /// A `B` still open at end of input
    DanglingBegin {
        index: usize,
        location: LocationKey,
        name: String,
    },
    /// An `E` earlier than the `B` it closes
    InvertedPair {
        begin_index: usize,
        end_index: usize,
        location: LocationKey,
        name: String,
    },
    /// A span that starts inside another but ends after it
    OverlappingSpan {
        index: usize,
        location: LocationKey,
        name: String,
    },
    /// A counter argument that is not a number
    NonNumericCounter {
        index: usize,
        name: String,
        series: String,
    },
}

impl fmt::Display for ConversionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversionWarning::DanglingEnd { index, location } => {
                write!(f, "event {}: end without open begin on {}", index, location)
            }
            ConversionWarning::DanglingBegin {
                index,
                location,
                name,
            } => write!(
                f,
                "event {}: begin of '{}' never closed on {}",
                index, name, location
            ),
            ConversionWarning::InvertedPair {
                begin_index,
                end_index,
                location,
                name,
            } => write!(
                f,
                "events {}/{}: '{}' ends before it begins on {}",
                begin_index, end_index, name, location
            ),
            ConversionWarning::OverlappingSpan {
                index,
                location,
                name,
            } => write!(
                f,
                "event {}: '{}' overlaps its enclosing span on {}",
                index, name, location
            ),
            ConversionWarning::NonNumericCounter {
                index,
                name,
                series,
            } => write!(
                f,
                "event {}: counter '{}' series '{}' is not numeric",
                index, name, series
            ),
        }
    }
}

/// Counts gathered while building the timeline
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TimelineStats {
    pub events_read: usize,
    pub spans_resolved: usize,
    pub counter_samples: usize,
    pub metadata_events: usize,
    pub dangling_begins: usize,
    pub dangling_ends: usize,
    pub inverted_pairs: usize,
    pub overlapping_spans: usize,
    pub non_numeric_counters: usize,
    pub skipped_events: usize,
    pub memory_snapshots: usize,
}

impl TimelineStats {
    /// Total of all recoverable problems
    pub fn warning_count(&self) -> usize {
        self.dangling_begins
            + self.dangling_ends
            + self.inverted_pairs
            + self.overlapping_spans
            + self.non_numeric_counters
    }
}

/// The buffered intermediate representation
///
/// Spans live in one arena, grouped by location and sorted by start time
/// within each group.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    pub(crate) spans: Vec<Span>,
    pub(crate) locations: BTreeMap<LocationKey, Range<usize>>,
    pub(crate) counters: BTreeMap<i64, Vec<CounterSample>>,
    pub(crate) processes: BTreeSet<i64>,
    pub(crate) process_names: BTreeMap<i64, String>,
    pub(crate) thread_names: BTreeMap<(i64, i64), String>,
    pub(crate) warnings: Vec<ConversionWarning>,
    pub(crate) stats: TimelineStats,
}

impl Timeline {
    /// The span arena
    pub fn spans(&self) -> &[Span] {
        &self.spans
    }

    /// All locations in key order, with their spans sorted by start time
    pub fn locations(&self) -> impl Iterator<Item = (&LocationKey, &[Span])> {
        self.locations
            .iter()
            .map(|(key, range)| (key, &self.spans[range.clone()]))
    }

    /// Spans of one location, empty when the location is unknown
    pub fn location_spans(&self, key: &LocationKey) -> &[Span] {
        self.locations
            .get(key)
            .map(|range| &self.spans[range.clone()])
            .unwrap_or(&[])
    }

    pub fn location_count(&self) -> usize {
        self.locations.len()
    }

    /// Counter samples of one process, sorted by timestamp
    pub fn counters_for(&self, pid: i64) -> &[CounterSample] {
        self.counters.get(&pid).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All counter samples, by process id then timestamp
    pub fn counters(&self) -> impl Iterator<Item = &CounterSample> {
        self.counters.values().flatten()
    }

    /// Every process id seen anywhere in the input, ascending
    pub fn processes(&self) -> impl Iterator<Item = i64> + '_ {
        self.processes.iter().copied()
    }

    pub fn process_name(&self, pid: i64) -> Option<&str> {
        self.process_names.get(&pid).map(String::as_str)
    }

    pub fn thread_name(&self, pid: i64, tid: i64) -> Option<&str> {
        self.thread_names.get(&(pid, tid)).map(String::as_str)
    }

    pub fn warnings(&self) -> &[ConversionWarning] {
        &self.warnings
    }

    pub fn stats(&self) -> &TimelineStats {
        &self.stats
    }
}
