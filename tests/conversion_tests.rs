use chrome2otf2::definitions::LocationKind;
use chrome2otf2::emitter::{MemoryWriter, WriterRecord};
use chrome2otf2::output::codec::{LOCATION_CPU_THREAD, LOCATION_METRIC};
use chrome2otf2::output::{read_archive, ArchiveContents, ArchiveWriter, DecodedValue, EventRecord};
use chrome2otf2::parser::TraceDocument;
use chrome2otf2::timeline::ConversionWarning;
use chrome2otf2::{convert, prepare, ConverterOptions};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::path::Path;
use tempfile::tempdir;

fn document(events: Value) -> TraceDocument {
    TraceDocument::from_value(json!({ "traceEvents": events })).unwrap()
}

fn convert_to_dir(doc: &TraceDocument, dir: &Path) -> ArchiveContents {
    let mut writer = ArchiveWriter::create(dir).unwrap();
    convert(doc, &ConverterOptions::default(), &mut writer).unwrap();
    read_archive(dir).unwrap()
}

/// Enter/Leave per location: timestamps non-decreasing, leaves match the innermost enter
fn assert_stack_discipline(contents: &ArchiveContents) {
    for (location, records) in &contents.events {
        let mut stack = Vec::new();
        let mut last = i64::MIN;
        for record in records {
            assert!(
                record.timestamp() >= last,
                "location {} goes back in time",
                location
            );
            last = record.timestamp();
            match record {
                EventRecord::Enter { region, .. } => stack.push(*region),
                EventRecord::Leave { region, .. } => assert_eq!(stack.pop(), Some(*region)),
                EventRecord::Metric { .. } => {}
            }
        }
        assert!(stack.is_empty(), "location {} left regions open", location);
    }
}

fn mixed_trace() -> TraceDocument {
    document(json!([
        {"ph": "M", "name": "process_name", "pid": 1, "args": {"name": "Browser"}},
        {"ph": "M", "name": "thread_name", "pid": 1, "tid": 7, "args": {"name": "CrRendererMain"}},
        {"ph": "B", "name": "outer", "cat": "loop", "pid": 1, "tid": 7, "ts": 10},
        {"ph": "X", "name": "paint", "cat": "gfx", "pid": 1, "tid": 7, "ts": 12, "dur": 3, "args": {"layer": 2}},
        {"ph": "X", "name": "paint", "cat": "gfx", "pid": 1, "tid": 8, "ts": 5, "dur": 1},
        {"ph": "i", "name": "mark", "pid": 1, "tid": 8, "ts": 9},
        {"ph": "E", "pid": 1, "tid": 7, "ts": 20},
        {"ph": "b", "name": "fetch", "cat": "net", "id": "0x1", "pid": 1, "tid": 7, "ts": 11},
        {"ph": "e", "name": "fetch", "cat": "net", "id": "0x1", "pid": 1, "tid": 9, "ts": 30},
        {"ph": "C", "name": "heap", "pid": 1, "tid": 7, "ts": 4, "args": {"used": 100, "total": 250.5}},
        {"ph": "C", "name": "heap", "pid": 1, "tid": 7, "ts": 14, "args": {"used": 120, "total": 250.5}},
        {"ph": "X", "name": "gc", "cat": "v8", "pid": 2, "tid": 1, "ts": 1.5, "dur": 0.25}
    ]))
}

#[test]
fn test_region_count_is_distinct_name_and_category() {
    let dir = tempdir().unwrap();
    let contents = convert_to_dir(&mixed_trace(), &dir.path().join("out"));

    let expected: BTreeSet<(&str, &str)> = [
        ("outer", "loop"),
        ("paint", "gfx"),
        ("mark", ""),
        ("fetch", "net"),
        ("gc", "v8"),
    ]
    .into_iter()
    .collect();
    let actual: BTreeSet<(&str, &str)> = contents
        .regions
        .iter()
        .map(|r| {
            (
                contents.string(r.name).unwrap(),
                contents.string(r.category).unwrap(),
            )
        })
        .collect();

    assert_eq!(actual, expected);
    assert_eq!(contents.regions.len(), 5);
}

#[test]
fn test_every_location_keeps_stack_discipline() {
    let dir = tempdir().unwrap();
    let contents = convert_to_dir(&mixed_trace(), &dir.path().join("out"));

    assert_stack_discipline(&contents);

    let anchor = contents.anchor.clone().unwrap();
    assert_eq!(anchor.events as usize, contents.event_count());
    assert_eq!(anchor.timer_resolution, 1_000_000_000);
    assert_eq!(anchor.first_timestamp, 1_500);
    assert_eq!(anchor.last_timestamp, 30_000);
}

#[test]
fn test_identical_input_gives_identical_archive() {
    let dir = tempdir().unwrap();
    let first = dir.path().join("first");
    let second = dir.path().join("second");

    convert_to_dir(&mixed_trace(), &first);
    convert_to_dir(&mixed_trace(), &second);

    let files = |root: &Path| -> Vec<(String, Vec<u8>)> {
        let mut out = Vec::new();
        let mut pending = vec![root.to_path_buf()];
        while let Some(dir) = pending.pop() {
            for entry in std::fs::read_dir(&dir).unwrap() {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    pending.push(path);
                } else {
                    let relative = path.strip_prefix(root).unwrap().display().to_string();
                    out.push((relative, std::fs::read(&path).unwrap()));
                }
            }
        }
        out.sort();
        out
    };

    let a = files(&first);
    assert!(a.len() >= 4);
    assert_eq!(a, files(&second));
}

#[test]
fn test_single_complete_event_round_trip() {
    let doc = document(json!([
        {"ph": "X", "name": "f", "cat": "c", "pid": 1, "tid": 2, "ts": 100, "dur": 50, "args": {"n": 3}}
    ]));
    let dir = tempdir().unwrap();
    let contents = convert_to_dir(&doc, &dir.path().join("out"));

    assert_eq!(contents.location_groups.len(), 1);
    assert_eq!(contents.string(contents.location_groups[0].name), Some("1"));
    assert_eq!(contents.locations.len(), 1);
    assert_eq!(contents.locations[0].kind, LOCATION_CPU_THREAD);
    assert_eq!(contents.location_name(0), Some("1 2"));
    assert_eq!(contents.regions.len(), 1);

    let events = &contents.events[&0];
    assert_eq!(events.len(), 2);
    match &events[0] {
        EventRecord::Enter {
            timestamp,
            region,
            attributes,
        } => {
            assert_eq!(*timestamp, 100_000);
            assert_eq!(contents.region_name(*region), Some("f"));
            assert_eq!(attributes.len(), 1);
            assert_eq!(contents.string(attributes[0].0), Some("n"));
            assert_eq!(attributes[0].1, DecodedValue::Int(3));
        }
        other => panic!("expected enter, got {:?}", other),
    }
    assert_eq!(
        events[1],
        EventRecord::Leave {
            timestamp: 150_000,
            region: 0
        }
    );
}

#[test]
fn test_inverted_pair_is_dropped_with_warning() {
    let doc = document(json!([
        {"ph": "B", "name": "late", "pid": 1, "tid": 1, "ts": 10},
        {"ph": "E", "pid": 1, "tid": 1, "ts": 5}
    ]));

    let prepared = prepare(&doc, &ConverterOptions::default()).unwrap();
    assert_eq!(prepared.timeline().spans().len(), 0);
    assert_eq!(prepared.timeline().stats().inverted_pairs, 1);
    assert!(matches!(
        prepared.timeline().warnings()[0],
        ConversionWarning::InvertedPair { begin_index: 0, end_index: 1, .. }
    ));

    let mut writer = MemoryWriter::new();
    let summary = prepared.emit(&mut writer).unwrap();
    assert_eq!(summary.enters, 0);
    assert_eq!(summary.regions, 0);
}

#[test]
fn test_dangling_begin_is_counted() {
    let doc = document(json!([
        {"ph": "X", "name": "ok", "pid": 1, "tid": 1, "ts": 0, "dur": 1},
        {"ph": "B", "name": "never_closed", "pid": 1, "tid": 1, "ts": 3}
    ]));
    let mut writer = MemoryWriter::new();
    let summary = convert(&doc, &ConverterOptions::default(), &mut writer).unwrap();

    assert_eq!(summary.dangling_begins, 1);
    assert_eq!(summary.spans_resolved, 1);
    assert_eq!(summary.regions, 1);
    assert_eq!((summary.enters, summary.leaves), (1, 1));
}

#[test]
fn test_nested_begin_end_pairs() {
    let doc = document(json!([
        {"ph": "B", "name": "A", "pid": 1, "tid": 1, "ts": 1},
        {"ph": "B", "name": "B", "pid": 1, "tid": 1, "ts": 2},
        {"ph": "E", "pid": 1, "tid": 1, "ts": 3},
        {"ph": "E", "pid": 1, "tid": 1, "ts": 4}
    ]));
    let dir = tempdir().unwrap();
    let contents = convert_to_dir(&doc, &dir.path().join("out"));

    let trail: Vec<(String, i64, String)> = contents.events[&0]
        .iter()
        .map(|r| match r {
            EventRecord::Enter { timestamp, region, .. } => (
                "enter".to_string(),
                *timestamp,
                contents.region_name(*region).unwrap().to_string(),
            ),
            EventRecord::Leave { timestamp, region } => (
                "leave".to_string(),
                *timestamp,
                contents.region_name(*region).unwrap().to_string(),
            ),
            EventRecord::Metric { .. } => panic!("no metrics expected"),
        })
        .collect();

    assert_eq!(
        trail,
        vec![
            ("enter".to_string(), 1_000, "A".to_string()),
            ("enter".to_string(), 2_000, "B".to_string()),
            ("leave".to_string(), 3_000, "B".to_string()),
            ("leave".to_string(), 4_000, "A".to_string()),
        ]
    );
}

#[test]
fn test_counters_land_on_measurement_location() {
    let dir = tempdir().unwrap();
    let contents = convert_to_dir(&mixed_trace(), &dir.path().join("out"));

    let metric_locations: Vec<_> = contents
        .locations
        .iter()
        .filter(|l| l.kind == LOCATION_METRIC)
        .collect();
    assert_eq!(metric_locations.len(), 1);
    let measurement = metric_locations[0].id;
    assert_eq!(contents.location_name(measurement), Some("Browser 1 counters"));
    assert_eq!(contents.events.len(), contents.locations.len());

    // one metric per (counter, series)
    let metrics: BTreeSet<(&str, &str)> = contents
        .metrics
        .iter()
        .map(|m| {
            (
                contents.string(m.name).unwrap(),
                contents.string(m.series).unwrap(),
            )
        })
        .collect();
    assert_eq!(
        metrics,
        [("heap", "total"), ("heap", "used")].into_iter().collect()
    );

    for (location, records) in &contents.events {
        let samples = records
            .iter()
            .filter(|r| matches!(r, EventRecord::Metric { .. }))
            .count();
        if *location == measurement {
            assert_eq!(samples, 4);
            assert_eq!(samples, records.len());
        } else {
            assert_eq!(samples, 0);
        }
    }

    // counters never define regions
    assert!(contents.regions.iter().all(|r| contents.string(r.name) != Some("heap")));
}

#[test]
fn test_async_events_get_their_own_track() {
    let prepared = prepare(&mixed_trace(), &ConverterOptions::default()).unwrap();
    let defs = prepared.definitions();

    let async_tracks: Vec<_> = defs
        .locations
        .iter()
        .filter(|l| l.kind == LocationKind::AsyncTrack)
        .collect();
    assert_eq!(async_tracks.len(), 1);
    assert_eq!(
        prepared.symbols().resolve(async_tracks[0].name),
        Some("Browser 1 async 0x1")
    );
}

#[test]
fn test_definitions_precede_events() {
    let mut writer = MemoryWriter::new();
    convert(&mixed_trace(), &ConverterOptions::default(), &mut writer).unwrap();

    let records = writer.records();
    let first_event = records
        .iter()
        .position(|r| !r.is_definition())
        .unwrap();
    assert!(records[first_event..].iter().all(|r| !r.is_definition()));
    assert!(writer.is_finished());
    assert!(matches!(records[0], WriterRecord::String { .. }));
}
