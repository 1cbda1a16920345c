//! Second pass: write definitions and per-location event streams.

use super::writer::TraceWriter;
use crate::definitions::{Definitions, Location, MetricId, RegionId, SymbolTable};
use crate::parser::Timestamp;
use crate::timeline::{CounterSample, Span, Timeline, Track};
use crate::utils::error::{ConvertError, WriterError};
use log::debug;
use serde::Serialize;

/// Counts of records written by the emitter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EmitStats {
    pub strings: usize,
    pub enters: usize,
    pub leaves: usize,
    pub metric_samples: usize,
    pub locations_written: usize,
}

/// One record of a location's stream, before it is written
#[derive(Debug)]
enum Step<'a> {
    Enter(&'a Span, RegionId),
    Leave(Timestamp, RegionId),
    Sample(&'a CounterSample, MetricId),
}

impl Step<'_> {
    fn timestamp(&self) -> Timestamp {
        match self {
            Step::Enter(span, _) => span.start,
            Step::Leave(timestamp, _) => *timestamp,
            Step::Sample(sample, _) => sample.timestamp,
        }
    }
}

/// Writes a resolved timeline through a [`TraceWriter`]
///
/// **Public** - pass 4 of the conversion; all inputs are read-only
pub struct TraceEmitter<'a> {
    timeline: &'a Timeline,
    definitions: &'a Definitions,
    symbols: &'a SymbolTable,
}

impl<'a> TraceEmitter<'a> {
    pub fn new(
        timeline: &'a Timeline,
        definitions: &'a Definitions,
        symbols: &'a SymbolTable,
    ) -> Self {
        Self {
            timeline,
            definitions,
            symbols,
        }
    }

    /// Write all definitions, then every location's stream, then finish
    ///
    /// # Errors
    /// * `ConvertError::Definitions` - the writer rejected a definition
    /// * `ConvertError::Write` - the writer failed on a location's stream
    pub fn emit<W: TraceWriter + ?Sized>(&self, writer: &mut W) -> Result<EmitStats, ConvertError> {
        let mut stats = EmitStats::default();

        self.write_definitions(writer, &mut stats)
            .map_err(ConvertError::Definitions)?;

        for location in &self.definitions.locations {
            self.write_location(writer, location, &mut stats)
                .map_err(|source| ConvertError::Write {
                    location: location.id.id(),
                    source,
                })?;
        }

        writer.finish().map_err(ConvertError::Definitions)?;

        debug!(
            "Emitted {} enters, {} leaves, {} metric samples",
            stats.enters, stats.leaves, stats.metric_samples
        );
        Ok(stats)
    }

    fn write_definitions<W: TraceWriter + ?Sized>(
        &self,
        writer: &mut W,
        stats: &mut EmitStats,
    ) -> Result<(), WriterError> {
        for (id, value) in self.symbols.iter() {
            writer.define_string(id, value)?;
            stats.strings += 1;
        }
        for group in &self.definitions.location_groups {
            writer.define_location_group(group)?;
        }
        for location in &self.definitions.locations {
            writer.define_location(location)?;
        }
        for region in &self.definitions.regions {
            writer.define_region(region)?;
        }
        for metric in &self.definitions.metrics {
            writer.define_metric(metric)?;
        }
        Ok(())
    }

    fn write_location<W: TraceWriter + ?Sized>(
        &self,
        writer: &mut W,
        location: &Location,
        stats: &mut EmitStats,
    ) -> Result<(), WriterError> {
        let regions = self.region_steps(location)?;
        let samples = self.sample_steps(location)?;
        if regions.is_empty() && samples.is_empty() {
            return Ok(());
        }

        for step in merge_by_time(regions, samples) {
            match step {
                Step::Enter(span, region) => {
                    writer.enter(location.id, span.start, region, &span.attributes)?;
                    stats.enters += 1;
                }
                Step::Leave(timestamp, region) => {
                    writer.leave(location.id, timestamp, region)?;
                    stats.leaves += 1;
                }
                Step::Sample(sample, metric) => {
                    writer.metric(location.id, sample.timestamp, metric, sample.value)?;
                    stats.metric_samples += 1;
                }
            }
        }

        stats.locations_written += 1;
        Ok(())
    }

    /// Enter/leave sequence for the location's spans
    ///
    /// **Private** - spans are sorted and well-nested, so an open stack is enough
    fn region_steps(&self, location: &Location) -> Result<Vec<Step<'a>>, WriterError> {
        let spans = self.timeline.location_spans(&location.key);
        let mut steps = Vec::with_capacity(spans.len() * 2);
        let mut open: Vec<(Timestamp, RegionId)> = Vec::new();

        for span in spans {
            let region = self
                .definitions
                .region_for(span.name, span.category)
                .ok_or(WriterError::UndefinedReference {
                    kind: "region for string",
                    id: span.name.id(),
                })?;

            while let Some((end, done)) = open.last().copied() {
                if end > span.start {
                    break;
                }
                steps.push(Step::Leave(end, done));
                open.pop();
            }

            steps.push(Step::Enter(span, region));
            open.push((span.end, region));
        }

        while let Some((end, region)) = open.pop() {
            steps.push(Step::Leave(end, region));
        }

        Ok(steps)
    }

    /// Metric samples, only on a process's measurement location
    fn sample_steps(&self, location: &Location) -> Result<Vec<Step<'a>>, WriterError> {
        if location.key.track != Track::Counters {
            return Ok(Vec::new());
        }

        self.timeline
            .counters_for(location.key.pid)
            .iter()
            .map(|sample| {
                let metric = self
                    .definitions
                    .metric_for(sample.name, sample.series)
                    .ok_or(WriterError::UndefinedReference {
                        kind: "metric for string",
                        id: sample.name.id(),
                    })?;
                Ok(Step::Sample(sample, metric))
            })
            .collect()
    }
}

/// Merge two time-ordered step lists; region steps win ties
///
/// **Private** - both inputs keep their relative order
fn merge_by_time<'a>(regions: Vec<Step<'a>>, samples: Vec<Step<'a>>) -> Vec<Step<'a>> {
    let mut merged = Vec::with_capacity(regions.len() + samples.len());
    let mut regions = regions.into_iter().peekable();
    let mut samples = samples.into_iter().peekable();

    loop {
        let take_region = match (regions.peek(), samples.peek()) {
            (Some(r), Some(s)) => r.timestamp() <= s.timestamp(),
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => break,
        };

        let next = if take_region {
            regions.next()
        } else {
            samples.next()
        };
        merged.extend(next);
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::{
        resolve_definitions, LocationGroup, LocationId, Metric, Region, StringRef,
    };
    use crate::emitter::writer::{MemoryWriter, WriterRecord};
    use crate::parser::parse_event;
    use crate::timeline::{
        build_timeline, Attribute, LocationKey, MetricValue, TimelineOptions,
    };
    use serde_json::{json, Value};

    fn emit(events: Vec<Value>) -> (MemoryWriter, Definitions, SymbolTable, EmitStats) {
        let mut symbols = SymbolTable::new();
        let parsed = events
            .iter()
            .enumerate()
            .map(|(i, v)| parse_event(i, v).unwrap());
        let timeline = build_timeline(parsed, &mut symbols, TimelineOptions::default());
        let defs = resolve_definitions(&timeline, &mut symbols);

        let mut writer = MemoryWriter::new();
        let stats = TraceEmitter::new(&timeline, &defs, &symbols)
            .emit(&mut writer)
            .unwrap();
        (writer, defs, symbols, stats)
    }

    /// (is_enter, ticks, region id) for region records of a location
    fn region_events(writer: &MemoryWriter, location: LocationId) -> Vec<(bool, i64, u32)> {
        writer
            .events_for(location)
            .into_iter()
            .filter_map(|r| match r {
                WriterRecord::Enter { timestamp, region, .. } => {
                    Some((true, timestamp.ticks(), region.id()))
                }
                WriterRecord::Leave { timestamp, region, .. } => {
                    Some((false, timestamp.ticks(), region.id()))
                }
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_single_complete_event() {
        let (writer, _, _, stats) = emit(vec![
            json!({"ph": "X", "name": "f", "pid": 1, "tid": 1, "ts": 100, "dur": 50}),
        ]);

        assert_eq!(
            region_events(&writer, LocationId::new(0)),
            vec![(true, 100_000, 0), (false, 150_000, 0)]
        );
        assert_eq!((stats.enters, stats.leaves), (1, 1));
        assert!(writer.is_finished());
    }

    #[test]
    fn test_definitions_precede_events() {
        let (writer, _, _, _) = emit(vec![
            json!({"ph": "X", "name": "f", "ts": 1, "dur": 1}),
            json!({"ph": "C", "name": "c", "ts": 1, "args": {"v": 1}}),
        ]);

        let first_event = writer
            .records()
            .iter()
            .position(|r| !r.is_definition())
            .unwrap();
        assert!(writer.records()[first_event..]
            .iter()
            .all(|r| !r.is_definition()));
    }

    #[test]
    fn test_siblings_and_children() {
        let (writer, _, _, _) = emit(vec![
            json!({"ph": "X", "name": "outer", "ts": 0, "dur": 10}),
            json!({"ph": "X", "name": "a", "ts": 1, "dur": 2}),
            json!({"ph": "X", "name": "b", "ts": 3, "dur": 2}),
            json!({"ph": "X", "name": "next", "ts": 10, "dur": 1}),
        ]);

        assert_eq!(
            region_events(&writer, LocationId::new(0)),
            vec![
                (true, 0, 0),
                (true, 1_000, 1),
                (false, 3_000, 1),
                (true, 3_000, 2),
                (false, 5_000, 2),
                (false, 10_000, 0),
                (true, 10_000, 3),
                (false, 11_000, 3),
            ]
        );
    }

    #[test]
    fn test_counters_go_to_measurement_location() {
        let (writer, defs, _, stats) = emit(vec![
            json!({"ph": "C", "name": "mem", "pid": 1, "tid": 1, "ts": 5, "args": {"used": 7}}),
            json!({"ph": "C", "name": "mem", "pid": 1, "tid": 1, "ts": 2, "args": {"used": 3}}),
            json!({"ph": "X", "name": "f", "pid": 1, "tid": 1, "ts": 0, "dur": 9}),
        ]);

        assert_eq!(defs.regions.len(), 1);
        let thread = defs.location_for(&LocationKey::thread(1, 1)).unwrap();
        let counters = defs.measurement_location(1).unwrap();

        assert!(writer
            .events_for(thread)
            .iter()
            .all(|r| !matches!(r, WriterRecord::Sample { .. })));

        let samples: Vec<_> = writer
            .events_for(counters)
            .into_iter()
            .map(|r| match r {
                WriterRecord::Sample { timestamp, value, .. } => (timestamp.ticks(), *value),
                other => panic!("unexpected record {:?}", other),
            })
            .collect();
        assert_eq!(
            samples,
            vec![(2_000, MetricValue::Int(3)), (5_000, MetricValue::Int(7))]
        );
        assert_eq!(stats.metric_samples, 2);
    }

    #[test]
    fn test_merge_prefers_regions_on_ties() {
        let span = Span {
            name: crate::definitions::StringRef::new(0),
            category: crate::definitions::StringRef::new(0),
            location: LocationKey::counters(0),
            start: Timestamp::from_ticks(5),
            end: Timestamp::from_ticks(5),
            attributes: Vec::new(),
            sequence: 0,
        };
        let sample = CounterSample {
            pid: 0,
            name: crate::definitions::StringRef::new(0),
            series: crate::definitions::StringRef::new(0),
            timestamp: Timestamp::from_ticks(5),
            value: MetricValue::Int(1),
            sequence: 1,
        };

        let merged = merge_by_time(
            vec![Step::Enter(&span, RegionId::new(0))],
            vec![Step::Sample(&sample, MetricId::new(0))],
        );
        assert!(matches!(merged[0], Step::Enter(..)));
        assert!(matches!(merged[1], Step::Sample(..)));
    }

    /// Records like [`MemoryWriter`] but fails every event call after `budget` of them
    struct FailingWriter {
        inner: MemoryWriter,
        budget: usize,
        calls_after_failure: usize,
        failed: bool,
        finished: bool,
    }

    impl FailingWriter {
        fn new(budget: usize) -> Self {
            Self {
                inner: MemoryWriter::new(),
                budget,
                calls_after_failure: 0,
                failed: false,
                finished: false,
            }
        }

        fn note_call(&mut self) {
            if self.failed {
                self.calls_after_failure += 1;
            }
        }

        fn spend(&mut self) -> Result<(), WriterError> {
            self.note_call();
            if self.budget == 0 {
                self.failed = true;
                return Err(WriterError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "disk full",
                )));
            }
            self.budget -= 1;
            Ok(())
        }
    }

    impl TraceWriter for FailingWriter {
        fn define_string(&mut self, id: StringRef, value: &str) -> Result<(), WriterError> {
            self.note_call();
            self.inner.define_string(id, value)
        }

        fn define_location_group(&mut self, group: &LocationGroup) -> Result<(), WriterError> {
            self.note_call();
            self.inner.define_location_group(group)
        }

        fn define_location(&mut self, location: &Location) -> Result<(), WriterError> {
            self.note_call();
            self.inner.define_location(location)
        }

        fn define_region(&mut self, region: &Region) -> Result<(), WriterError> {
            self.note_call();
            self.inner.define_region(region)
        }

        fn define_metric(&mut self, metric: &Metric) -> Result<(), WriterError> {
            self.note_call();
            self.inner.define_metric(metric)
        }

        fn enter(
            &mut self,
            location: LocationId,
            timestamp: Timestamp,
            region: RegionId,
            attributes: &[Attribute],
        ) -> Result<(), WriterError> {
            self.spend()?;
            self.inner.enter(location, timestamp, region, attributes)
        }

        fn leave(
            &mut self,
            location: LocationId,
            timestamp: Timestamp,
            region: RegionId,
        ) -> Result<(), WriterError> {
            self.spend()?;
            self.inner.leave(location, timestamp, region)
        }

        fn metric(
            &mut self,
            location: LocationId,
            timestamp: Timestamp,
            metric: MetricId,
            value: MetricValue,
        ) -> Result<(), WriterError> {
            self.spend()?;
            self.inner.metric(location, timestamp, metric, value)
        }

        fn finish(&mut self) -> Result<(), WriterError> {
            self.note_call();
            self.finished = true;
            self.inner.finish()
        }
    }

    #[test]
    fn test_writer_failure_aborts_immediately() {
        let mut symbols = SymbolTable::new();
        let parsed = [
            json!({"ph": "X", "name": "a", "pid": 1, "tid": 1, "ts": 0, "dur": 5}),
            json!({"ph": "X", "name": "b", "pid": 1, "tid": 2, "ts": 0, "dur": 5}),
        ]
        .iter()
        .enumerate()
        .map(|(i, v)| parse_event(i, v).unwrap())
        .collect::<Vec<_>>();
        let timeline = build_timeline(parsed, &mut symbols, TimelineOptions::default());
        let defs = resolve_definitions(&timeline, &mut symbols);

        // the enter on the first location succeeds, its leave fails
        let mut writer = FailingWriter::new(1);
        let err = TraceEmitter::new(&timeline, &defs, &symbols)
            .emit(&mut writer)
            .unwrap_err();

        assert!(matches!(
            err,
            ConvertError::Write {
                location: 0,
                source: WriterError::Io(_)
            }
        ));
        assert_eq!(writer.calls_after_failure, 0);
        assert!(!writer.finished);
        assert_eq!(writer.inner.events_for(LocationId::new(1)).len(), 0);
    }
}
