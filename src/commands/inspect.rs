//! Inspect and version commands.

use crate::output::{read_archive, ArchiveContents, DecodedValue, EventRecord};
use crate::utils::config::{ARCHIVE_FORMAT_VERSION, REPORT_SCHEMA_VERSION, TIMER_RESOLUTION};
use anyhow::{Context, Result};
use std::path::Path;

/// Print the definitions (and optionally the events) of an archive
///
/// **Public** - entry point of `chrome2otf2 inspect`
pub fn execute_inspect(archive: impl AsRef<Path>, show_events: bool) -> Result<ArchiveContents> {
    let archive = archive.as_ref();
    let contents = read_archive(archive)
        .with_context(|| format!("Failed to read archive {}", archive.display()))?;

    println!("Archive: {}", archive.display());
    if let Some(anchor) = &contents.anchor {
        println!("  Format version:   {}", anchor.version);
        println!("  Timer resolution: {} ticks/s", anchor.timer_resolution);
        println!("  Events:           {}", anchor.events);
        println!(
            "  Time range:       {} .. {}",
            anchor.first_timestamp, anchor.last_timestamp
        );
    }

    println!("  Location groups:  {}", contents.location_groups.len());
    for group in &contents.location_groups {
        println!(
            "    [{}] {} (pid {})",
            group.id,
            contents.string(group.name).unwrap_or("?"),
            group.pid
        );
    }

    println!("  Locations:        {}", contents.locations.len());
    for location in &contents.locations {
        let events = contents.events.get(&location.id).map_or(0, Vec::len);
        println!(
            "    [{}] {} (group {}, {} events)",
            location.id,
            contents.string(location.name).unwrap_or("?"),
            location.group,
            events
        );
    }

    println!("  Regions:          {}", contents.regions.len());
    for region in &contents.regions {
        println!(
            "    [{}] {} [{}]",
            region.id,
            contents.string(region.name).unwrap_or("?"),
            contents.string(region.category).unwrap_or("")
        );
    }

    println!("  Metrics:          {}", contents.metrics.len());
    for metric in &contents.metrics {
        println!(
            "    [{}] {}.{}",
            metric.id,
            contents.string(metric.name).unwrap_or("?"),
            contents.string(metric.series).unwrap_or("?")
        );
    }

    if show_events {
        for (location, records) in &contents.events {
            println!();
            println!("Location {}:", contents.location_name(*location).unwrap_or("?"));
            for record in records {
                println!("  {}", format_event(&contents, record));
            }
        }
    }

    Ok(contents)
}

/// **Private** - one line per event record
fn format_event(contents: &ArchiveContents, record: &EventRecord) -> String {
    match record {
        EventRecord::Enter {
            timestamp,
            region,
            attributes,
        } => {
            let mut line = format!(
                "{:>16} ENTER {}",
                timestamp,
                contents.region_name(*region).unwrap_or("?")
            );
            for (key, value) in attributes {
                line.push_str(&format!(
                    " {}={}",
                    contents.string(*key).unwrap_or("?"),
                    format_value(contents, value)
                ));
            }
            line
        }
        EventRecord::Leave { timestamp, region } => format!(
            "{:>16} LEAVE {}",
            timestamp,
            contents.region_name(*region).unwrap_or("?")
        ),
        EventRecord::Metric {
            timestamp,
            metric,
            value,
        } => format!(
            "{:>16} METRIC {} = {}",
            timestamp,
            metric,
            format_value(contents, value)
        ),
    }
}

fn format_value(contents: &ArchiveContents, value: &DecodedValue) -> String {
    match value {
        DecodedValue::Bool(v) => v.to_string(),
        DecodedValue::Int(v) => v.to_string(),
        DecodedValue::UInt(v) => v.to_string(),
        DecodedValue::Double(v) => v.to_string(),
        DecodedValue::String(id) => format!("{:?}", contents.string(*id).unwrap_or("?")),
    }
}

/// Display version information
pub fn display_version() {
    println!("chrome2otf2 v{}", env!("CARGO_PKG_VERSION"));
    println!("Archive format: v{}", ARCHIVE_FORMAT_VERSION);
    println!("Timer resolution: {} ticks/s", TIMER_RESOLUTION);
    println!("Report schema: v{}", REPORT_SCHEMA_VERSION);
    println!();
    println!("Converts Chrome Trace Event Format JSON into OTF2-style trace archives.");
}
