//! Conversion driver.
//!
//! Runs the strictly staged pipeline:
//! 1. parse events (lazy stream over the loaded document)
//! 2. build the per-location timeline
//! 3. resolve global definitions
//! 4. emit definitions and event streams
//!
//! Steps 1-3 never touch the writer, so malformed input aborts before
//! anything is written.

use crate::definitions::{resolve_definitions, Definitions, SymbolTable};
use crate::emitter::{EmitStats, TraceEmitter, TraceWriter};
use crate::parser::{MemoryProfile, TraceDocument};
use crate::timeline::{Timeline, TimelineBuilder, TimelineOptions};
use crate::utils::error::ConvertError;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Options for a conversion
#[derive(Debug, Clone, Default)]
pub struct ConverterOptions {
    pub timeline: TimelineOptions,
}

/// Final counts of a conversion
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionSummary {
    pub events_read: usize,
    pub spans_resolved: usize,
    pub counter_samples: usize,
    pub metadata_events: usize,
    pub skipped_events: usize,
    #[serde(default)]
    pub memory_snapshots: usize,
    pub dangling_begins: usize,
    pub dangling_ends: usize,
    pub inverted_pairs: usize,
    pub overlapping_spans: usize,
    pub non_numeric_counters: usize,
    pub strings: usize,
    pub regions: usize,
    pub locations: usize,
    pub location_groups: usize,
    pub metrics: usize,
    pub enters: usize,
    pub leaves: usize,
    pub metric_samples: usize,
}

impl ConversionSummary {
    /// Log the summary at info level, and the warning tally at warn level
    pub fn log(&self) {
        info!(
            "Events read: {} | spans: {} | counter samples: {} | skipped: {}",
            self.events_read, self.spans_resolved, self.counter_samples, self.skipped_events
        );
        if self.memory_snapshots > 0 {
            info!("Memory snapshots: {}", self.memory_snapshots);
        }
        info!(
            "Definitions: {} strings, {} regions, {} locations, {} groups, {} metrics",
            self.strings, self.regions, self.locations, self.location_groups, self.metrics
        );
        if self.warning_count() > 0 {
            warn!(
                "Dropped: {} dangling begins, {} dangling ends, {} inverted pairs, {} overlapping spans, {} non-numeric counters",
                self.dangling_begins,
                self.dangling_ends,
                self.inverted_pairs,
                self.overlapping_spans,
                self.non_numeric_counters
            );
        }
    }

    pub fn warning_count(&self) -> usize {
        self.dangling_begins
            + self.dangling_ends
            + self.inverted_pairs
            + self.overlapping_spans
            + self.non_numeric_counters
    }

    fn add_emit_stats(&mut self, stats: &EmitStats) {
        self.enters = stats.enters;
        self.leaves = stats.leaves;
        self.metric_samples = stats.metric_samples;
    }
}

impl fmt::Display for ConversionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Events read:        {}", self.events_read)?;
        writeln!(f, "Spans resolved:     {}", self.spans_resolved)?;
        writeln!(f, "Counter samples:    {}", self.counter_samples)?;
        writeln!(f, "Skipped events:     {}", self.skipped_events)?;
        if self.memory_snapshots > 0 {
            writeln!(f, "Memory snapshots:   {}", self.memory_snapshots)?;
        }
        writeln!(f, "Dangling begins:    {}", self.dangling_begins)?;
        writeln!(f, "Dangling ends:      {}", self.dangling_ends)?;
        writeln!(f, "Inverted pairs:     {}", self.inverted_pairs)?;
        writeln!(f, "Overlapping spans:  {}", self.overlapping_spans)?;
        writeln!(f, "Regions:            {}", self.regions)?;
        writeln!(f, "Locations:          {}", self.locations)?;
        write!(f, "Location groups:    {}", self.location_groups)
    }
}

/// Output of passes 1-3: everything needed to write an archive
///
/// The symbol table is frozen here; the emitter only reads it.
#[derive(Debug, Clone)]
pub struct PreparedTrace {
    symbols: SymbolTable,
    timeline: Timeline,
    definitions: Definitions,
}

impl PreparedTrace {
    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn definitions(&self) -> &Definitions {
        &self.definitions
    }

    /// Counts known before emission
    pub fn summary(&self) -> ConversionSummary {
        let stats = self.timeline.stats();
        ConversionSummary {
            events_read: stats.events_read,
            spans_resolved: stats.spans_resolved,
            counter_samples: stats.counter_samples,
            metadata_events: stats.metadata_events,
            skipped_events: stats.skipped_events,
            memory_snapshots: stats.memory_snapshots,
            dangling_begins: stats.dangling_begins,
            dangling_ends: stats.dangling_ends,
            inverted_pairs: stats.inverted_pairs,
            overlapping_spans: stats.overlapping_spans,
            non_numeric_counters: stats.non_numeric_counters,
            strings: self.symbols.len(),
            regions: self.definitions.regions.len(),
            locations: self.definitions.locations.len(),
            location_groups: self.definitions.location_groups.len(),
            metrics: self.definitions.metrics.len(),
            ..Default::default()
        }
    }

    /// Pass 4: write everything through `writer`
    pub fn emit<W: TraceWriter + ?Sized>(
        &self,
        writer: &mut W,
    ) -> Result<ConversionSummary, ConvertError> {
        let stats = TraceEmitter::new(&self.timeline, &self.definitions, &self.symbols)
            .emit(writer)?;

        let mut summary = self.summary();
        summary.add_emit_stats(&stats);
        Ok(summary)
    }
}

/// Run passes 1-3 over a loaded document
///
/// **Public** - main entry point of the library
///
/// # Errors
/// * `ConvertError::Parse` - the first malformed event aborts the conversion
pub fn prepare(
    document: &TraceDocument,
    options: &ConverterOptions,
) -> Result<PreparedTrace, ConvertError> {
    prepare_with_memory_profile(document, None, options)
}

/// Run passes 1-3 over a trace and an optional TensorFlow memory profile
///
/// The profile adds a "TF Memory Allocators" group with one location per allocator.
pub fn prepare_with_memory_profile(
    document: &TraceDocument,
    memory_profile: Option<&MemoryProfile>,
    options: &ConverterOptions,
) -> Result<PreparedTrace, ConvertError> {
    let mut symbols = SymbolTable::new();

    let timeline = {
        let mut builder = TimelineBuilder::new(&mut symbols, options.timeline.clone());
        for parsed in document.events() {
            builder.add(parsed?);
        }
        if let Some(profile) = memory_profile {
            builder.add_memory_profile(profile);
        }
        builder.finish()
    };

    let definitions = resolve_definitions(&timeline, &mut symbols);

    Ok(PreparedTrace {
        symbols,
        timeline,
        definitions,
    })
}

/// Run the full conversion into `writer`
pub fn convert<W: TraceWriter + ?Sized>(
    document: &TraceDocument,
    options: &ConverterOptions,
    writer: &mut W,
) -> Result<ConversionSummary, ConvertError> {
    prepare(document, options)?.emit(writer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emitter::MemoryWriter;
    use crate::utils::error::ParseError;

    #[test]
    fn test_malformed_input_writes_nothing() {
        let doc = TraceDocument::from_slice(
            br#"[{"ph": "X", "name": "ok", "ts": 1, "dur": 1}, {"ph": "X", "name": "bad", "ts": 2}]"#,
        )
        .unwrap();

        let mut writer = MemoryWriter::new();
        let err = convert(&doc, &ConverterOptions::default(), &mut writer).unwrap_err();

        assert!(matches!(
            err,
            ConvertError::Parse(ParseError::MissingField { index: 1, field: "dur" })
        ));
        assert!(writer.records().is_empty());
    }

    #[test]
    fn test_summary_counts() {
        let doc = TraceDocument::from_slice(
            br#"{"traceEvents": [
                {"ph": "M", "name": "process_name", "pid": 1, "args": {"name": "p"}},
                {"ph": "B", "name": "a", "pid": 1, "tid": 1, "ts": 1},
                {"ph": "E", "pid": 1, "tid": 1, "ts": 2},
                {"ph": "E", "pid": 1, "tid": 1, "ts": 3},
                {"ph": "B", "name": "open", "pid": 1, "tid": 1, "ts": 4},
                {"ph": "s", "id": 1, "pid": 1, "tid": 1, "ts": 5},
                {"ph": "C", "name": "c", "pid": 1, "ts": 6, "args": {"v": 1}}
            ]}"#,
        )
        .unwrap();

        let mut writer = MemoryWriter::new();
        let summary = convert(&doc, &ConverterOptions::default(), &mut writer).unwrap();

        assert_eq!(summary.events_read, 7);
        assert_eq!(summary.spans_resolved, 1);
        assert_eq!(summary.dangling_ends, 1);
        assert_eq!(summary.dangling_begins, 1);
        assert_eq!(summary.skipped_events, 1);
        assert_eq!(summary.counter_samples, 1);
        assert_eq!(summary.metadata_events, 1);
        assert_eq!(summary.regions, 1);
        assert_eq!(summary.location_groups, 1);
        // thread 1, thread 0 (counter emitter), counters track
        assert_eq!(summary.locations, 3);
        assert_eq!((summary.enters, summary.leaves, summary.metric_samples), (1, 1, 1));
        assert_eq!(summary.warning_count(), 2);
    }
}
