//! Per-location call-stack reconstruction.
//!
//! Turns the flat event stream into well-nested spans:
//! - `X` events resolve immediately
//! - `B` pushes onto the location's [`ThreadStack`], `E` pops it
//! - instants become zero-length spans
//! - counters become [`CounterSample`]s
//! - memory profile snapshots become back-to-back spans per allocator
//!
//! Broken pairs are dropped and reported as [`ConversionWarning`]s.

use super::span::{
    Attribute, AttributeValue, ConversionWarning, CounterSample, LocationKey, MetricValue, Span,
    Timeline, TimelineStats,
};
use crate::definitions::symbols::SymbolTable;
use crate::parser::{
    ArgValue, MemoryProfile, MemorySnapshot, ParsedEvent, Phase, RawEvent, Timestamp,
};
use crate::utils::config::{
    MEMORY_ACTIVITY_CATEGORY, PROCESS_NAME_METADATA, SYSTEM_PID, SYSTEM_TID,
    THREAD_NAME_METADATA,
};
use log::{debug, warn};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};

/// Options for the timeline builder
#[derive(Debug, Clone)]
pub struct TimelineOptions {
    /// Ignore `thread_name` metadata of the system pair (pid 0, tid 0)
    pub ignore_system_thread: bool,
}

impl Default for TimelineOptions {
    fn default() -> Self {
        Self {
            ignore_system_thread: true,
        }
    }
}

/// A `B` record waiting for its `E`
#[derive(Debug, Clone)]
pub struct OpenSpan {
    pub index: usize,
    pub name: String,
    pub category: String,
    pub start: Timestamp,
    pub args: BTreeMap<String, ArgValue>,
}

/// Stack of open spans for one location
#[derive(Debug, Clone, Default)]
pub struct ThreadStack {
    open: Vec<OpenSpan>,
}

impl ThreadStack {
    pub fn push(&mut self, span: OpenSpan) {
        self.open.push(span);
    }

    pub fn pop(&mut self) -> Option<OpenSpan> {
        self.open.pop()
    }

    pub fn depth(&self) -> usize {
        self.open.len()
    }

    /// Remove all open spans, outermost first
    pub fn drain(&mut self) -> impl Iterator<Item = OpenSpan> + '_ {
        self.open.drain(..)
    }
}

/// Builds a [`Timeline`] from parsed events
///
/// **Public** - driven by the converter, one event at a time
pub struct TimelineBuilder<'a> {
    symbols: &'a mut SymbolTable,
    options: TimelineOptions,
    stacks: BTreeMap<LocationKey, ThreadStack>,
    pending: BTreeMap<LocationKey, Vec<Span>>,
    counters: BTreeMap<i64, Vec<CounterSample>>,
    processes: BTreeSet<i64>,
    process_names: BTreeMap<i64, String>,
    thread_names: BTreeMap<(i64, i64), String>,
    warnings: Vec<ConversionWarning>,
    stats: TimelineStats,
}

impl<'a> TimelineBuilder<'a> {
    pub fn new(symbols: &'a mut SymbolTable, options: TimelineOptions) -> Self {
        Self {
            symbols,
            options,
            stacks: BTreeMap::new(),
            pending: BTreeMap::new(),
            counters: BTreeMap::new(),
            processes: BTreeSet::new(),
            process_names: BTreeMap::new(),
            thread_names: BTreeMap::new(),
            warnings: Vec::new(),
            stats: TimelineStats::default(),
        }
    }

    /// Feed one parser result
    pub fn add(&mut self, parsed: ParsedEvent) {
        self.stats.events_read += 1;

        match parsed {
            ParsedEvent::Record(event) => self.add_event(event),
            ParsedEvent::Ignored { index, phase } => {
                self.stats.skipped_events += 1;
                match phase {
                    Some(code) => debug!("Skipping event {} with unsupported phase '{}'", index, code),
                    None => debug!("Skipping empty event {}", index),
                }
            }
        }
    }

    /// Feed a TensorFlow memory profile
    ///
    /// Each snapshot becomes a span on its allocator's location that lasts
    /// until that allocator's next snapshot; the last one has zero length.
    pub fn add_memory_profile(&mut self, profile: &MemoryProfile) {
        for allocator in &profile.allocators {
            let location = LocationKey::allocator(allocator.name.clone());
            self.register_location(&location);

            let mut snapshots: Vec<&MemorySnapshot> = allocator.snapshots.iter().collect();
            snapshots.sort_by_key(|snapshot| (snapshot.timestamp, snapshot.index));

            for (i, snapshot) in snapshots.iter().enumerate() {
                let end = snapshots
                    .get(i + 1)
                    .map_or(snapshot.timestamp, |next| next.timestamp);
                let span = self.make_span(
                    &snapshot.activity,
                    MEMORY_ACTIVITY_CATEGORY,
                    location.clone(),
                    snapshot.timestamp,
                    end,
                    &snapshot.attributes,
                    snapshot.index,
                );
                self.push_span(span);
            }

            debug!(
                "Allocator {}: {} memory snapshots",
                allocator.name,
                snapshots.len()
            );
            self.stats.memory_snapshots += snapshots.len();
        }
    }

    fn add_event(&mut self, event: RawEvent) {
        match event.phase {
            Phase::Complete => self.add_complete(event),
            Phase::Begin | Phase::AsyncBegin => self.add_begin(event),
            Phase::End | Phase::AsyncEnd => self.add_end(event),
            Phase::Instant | Phase::AsyncInstant => self.add_instant(event),
            Phase::Counter => self.add_counter(event),
            Phase::Metadata => self.add_metadata(event),
        }
    }

    /// Location a timed event lives on
    ///
    /// **Private** - async events go to their id track, everything else to the thread
    fn location_of(&mut self, event: &RawEvent) -> LocationKey {
        let key = match (&event.async_id, event.phase.is_async()) {
            (Some(id), true) => LocationKey::async_track(event.pid, id.clone()),
            _ => LocationKey::thread(event.pid, event.tid),
        };
        self.register_location(&key);
        key
    }

    fn register_location(&mut self, key: &LocationKey) {
        self.processes.insert(key.pid);
        if !self.pending.contains_key(key) {
            self.pending.insert(key.clone(), Vec::new());
        }
    }

    fn add_complete(&mut self, event: RawEvent) {
        let location = self.location_of(&event);
        let duration = event.duration.unwrap_or(Timestamp::ZERO);
        // The parser rejects overflowing ends; hand-built events are skipped
        let Some(end) = event.timestamp.checked_add(duration) else {
            warn!("Event {}: end time overflows, span dropped", event.index);
            self.stats.skipped_events += 1;
            return;
        };

        let span = self.make_span(
            &event.name,
            &event.category,
            location,
            event.timestamp,
            end,
            &event.args,
            event.index,
        );
        self.push_span(span);
    }

    fn add_instant(&mut self, event: RawEvent) {
        let location = self.location_of(&event);
        let span = self.make_span(
            &event.name,
            &event.category,
            location,
            event.timestamp,
            event.timestamp,
            &event.args,
            event.index,
        );
        self.push_span(span);
    }

    fn add_begin(&mut self, event: RawEvent) {
        let location = self.location_of(&event);
        let stack = self.stacks.entry(location).or_default();
        debug!(
            "Event {} ({}) opens '{}' at depth {}",
            event.index,
            event.phase.code(),
            event.name,
            stack.depth()
        );
        stack.push(OpenSpan {
            index: event.index,
            name: event.name,
            category: event.category,
            start: event.timestamp,
            args: event.args,
        });
    }

    fn add_end(&mut self, event: RawEvent) {
        let location = self.location_of(&event);

        let Some(mut open) = self.stacks.get_mut(&location).and_then(ThreadStack::pop) else {
            self.warn(ConversionWarning::DanglingEnd {
                index: event.index,
                location,
            });
            self.stats.dangling_ends += 1;
            return;
        };

        if event.timestamp < open.start {
            self.warn(ConversionWarning::InvertedPair {
                begin_index: open.index,
                end_index: event.index,
                location,
                name: open.name,
            });
            self.stats.inverted_pairs += 1;
            return;
        }

        if !event.name.is_empty() && event.name != open.name {
            debug!(
                "Event {}: end named '{}' closes '{}' on {}",
                event.index, event.name, open.name, location
            );
        }

        // Args given on the end record complement the begin's args
        open.args.extend(event.args);

        let span = self.make_span(
            &open.name,
            &open.category,
            location,
            open.start,
            event.timestamp,
            &open.args,
            open.index,
        );
        self.push_span(span);
    }

    fn add_counter(&mut self, event: RawEvent) {
        // The emitting thread is still a location of its own
        self.location_of(&event);
        self.register_location(&LocationKey::counters(event.pid));

        let name = self.symbols.intern(&event.name);
        for (series, value) in &event.args {
            let Some(value) = metric_value(value) else {
                self.warn(ConversionWarning::NonNumericCounter {
                    index: event.index,
                    name: event.name.clone(),
                    series: series.clone(),
                });
                self.stats.non_numeric_counters += 1;
                continue;
            };

            let sample = CounterSample {
                pid: event.pid,
                name,
                series: self.symbols.intern(series),
                timestamp: event.timestamp,
                value,
                sequence: event.index,
            };
            self.counters.entry(event.pid).or_default().push(sample);
            self.stats.counter_samples += 1;
        }
    }

    fn add_metadata(&mut self, event: RawEvent) {
        self.stats.metadata_events += 1;

        if self.options.ignore_system_thread
            && event.name == THREAD_NAME_METADATA
            && event.pid == SYSTEM_PID
            && event.tid == SYSTEM_TID
        {
            debug!("Ignoring thread name of the system pair in event {}", event.index);
            return;
        }
        self.processes.insert(event.pid);

        let label = event.args.get("name").map(ArgValue::to_text);
        match (event.name.as_str(), label) {
            (PROCESS_NAME_METADATA, Some(label)) => {
                self.process_names.insert(event.pid, label);
            }
            (THREAD_NAME_METADATA, Some(label)) => {
                self.register_location(&LocationKey::thread(event.pid, event.tid));
                self.thread_names.insert((event.pid, event.tid), label);
            }
            (other, _) => {
                debug!("Event {}: metadata '{}' carries no naming", event.index, other);
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn make_span(
        &mut self,
        name: &str,
        category: &str,
        location: LocationKey,
        start: Timestamp,
        end: Timestamp,
        args: &BTreeMap<String, ArgValue>,
        sequence: usize,
    ) -> Span {
        let attributes = args
            .iter()
            .map(|(key, value)| Attribute {
                key: self.symbols.intern(key),
                value: match value {
                    ArgValue::Bool(b) => AttributeValue::Bool(*b),
                    ArgValue::Int(i) => AttributeValue::Int(*i),
                    ArgValue::UInt(u) => AttributeValue::UInt(*u),
                    ArgValue::Float(f) => AttributeValue::Double(*f),
                    ArgValue::Str(s) => AttributeValue::String(self.symbols.intern(s)),
                },
            })
            .collect();

        Span {
            name: self.symbols.intern(name),
            category: self.symbols.intern(category),
            location,
            start,
            end,
            attributes,
            sequence,
        }
    }

    fn push_span(&mut self, span: Span) {
        self.pending.entry(span.location.clone()).or_default().push(span);
    }

    fn warn(&mut self, warning: ConversionWarning) {
        warn!("{}", warning);
        self.warnings.push(warning);
    }

    /// Close the input: report dangling begins, sort, check nesting
    ///
    /// **Public** - consumes the builder and releases the symbol table borrow
    pub fn finish(mut self) -> Timeline {
        let mut stacks = std::mem::take(&mut self.stacks);
        for (location, stack) in stacks.iter_mut() {
            for open in stack.drain() {
                self.warn(ConversionWarning::DanglingBegin {
                    index: open.index,
                    location: location.clone(),
                    name: open.name,
                });
                self.stats.dangling_begins += 1;
            }
        }

        let mut spans = Vec::new();
        let mut locations = BTreeMap::new();
        let pending = std::mem::take(&mut self.pending);

        for (location, mut list) in pending {
            list.sort_by_key(|span| (span.start, Reverse(span.end), span.sequence));

            let first = spans.len();
            for span in self.reject_overlaps(list) {
                spans.push(span);
            }
            locations.insert(location, first..spans.len());
        }

        for samples in self.counters.values_mut() {
            samples.sort_by_key(|sample| sample.timestamp);
        }

        self.stats.spans_resolved = spans.len();
        debug!(
            "Timeline built: {} spans on {} locations, {} counter samples",
            spans.len(),
            locations.len(),
            self.stats.counter_samples
        );

        Timeline {
            spans,
            locations,
            counters: self.counters,
            processes: self.processes,
            process_names: self.process_names,
            thread_names: self.thread_names,
            warnings: self.warnings,
            stats: self.stats,
        }
    }

    /// Drop spans that start inside an enclosing span but end after it
    ///
    /// **Private** - input must be sorted by (start, longer first)
    fn reject_overlaps(&mut self, sorted: Vec<Span>) -> Vec<Span> {
        let mut kept: Vec<Span> = Vec::with_capacity(sorted.len());
        let mut open_ends: Vec<Timestamp> = Vec::new();

        for span in sorted {
            while open_ends.last().is_some_and(|end| *end <= span.start) {
                open_ends.pop();
            }

            if open_ends.last().is_some_and(|end| span.end > *end) {
                let name = self
                    .symbols
                    .resolve(span.name)
                    .unwrap_or_default()
                    .to_string();
                self.warn(ConversionWarning::OverlappingSpan {
                    index: span.sequence,
                    location: span.location.clone(),
                    name,
                });
                self.stats.overlapping_spans += 1;
                continue;
            }

            open_ends.push(span.end);
            kept.push(span);
        }

        kept
    }
}

/// Numeric value of a counter argument
///
/// **Private** - numeric strings are accepted, as some producers quote numbers
fn metric_value(value: &ArgValue) -> Option<MetricValue> {
    match value {
        ArgValue::Int(i) => Some(MetricValue::Int(*i)),
        ArgValue::UInt(u) => Some(match i64::try_from(*u) {
            Ok(i) => MetricValue::Int(i),
            Err(_) => MetricValue::Double(*u as f64),
        }),
        ArgValue::Float(f) => Some(MetricValue::Double(*f)),
        ArgValue::Str(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .map(MetricValue::Int)
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(MetricValue::Double))
        }
        ArgValue::Bool(_) => None,
    }
}

/// Build a timeline from already parsed events
///
/// **Public** - convenience for tests and library users
pub fn build_timeline(
    events: impl IntoIterator<Item = ParsedEvent>,
    symbols: &mut SymbolTable,
    options: TimelineOptions,
) -> Timeline {
    let mut builder = TimelineBuilder::new(symbols, options);
    for event in events {
        builder.add(event);
    }
    builder.finish()
}
