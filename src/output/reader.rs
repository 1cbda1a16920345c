//! Reads an archive back into memory.
//!
//! Used by the `inspect` command and by tests to check what was written.

use super::archive::event_file_path;
use super::codec::*;
use crate::utils::config::{ANCHOR_FILE_NAME, ARCHIVE_FORMAT_VERSION, DEFINITIONS_FILE_NAME};
use crate::utils::error::WriterError;
use log::debug;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Anchor file contents
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Anchor {
    pub version: u16,
    pub timer_resolution: u64,
    pub strings: u32,
    pub location_groups: u32,
    pub locations: u32,
    pub regions: u32,
    pub metrics: u32,
    pub events: u64,
    pub first_timestamp: i64,
    pub last_timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupRecord {
    pub id: u32,
    pub name: u32,
    pub pid: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocationRecord {
    pub id: u32,
    pub name: u32,
    pub kind: u8,
    pub group: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegionRecord {
    pub id: u32,
    pub name: u32,
    pub category: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricRecord {
    pub id: u32,
    pub name: u32,
    pub series: u32,
}

/// A decoded attribute or metric value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DecodedValue {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Double(f64),
    String(u32),
}

/// A decoded event record
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventRecord {
    Enter {
        timestamp: i64,
        region: u32,
        attributes: Vec<(u32, DecodedValue)>,
    },
    Leave {
        timestamp: i64,
        region: u32,
    },
    Metric {
        timestamp: i64,
        metric: u32,
        value: DecodedValue,
    },
}

impl EventRecord {
    pub fn timestamp(&self) -> i64 {
        match self {
            EventRecord::Enter { timestamp, .. }
            | EventRecord::Leave { timestamp, .. }
            | EventRecord::Metric { timestamp, .. } => *timestamp,
        }
    }
}

/// Everything stored in an archive directory
#[derive(Debug, Clone, Default)]
pub struct ArchiveContents {
    pub anchor: Option<Anchor>,
    pub strings: BTreeMap<u32, String>,
    pub location_groups: Vec<GroupRecord>,
    pub locations: Vec<LocationRecord>,
    pub regions: Vec<RegionRecord>,
    pub metrics: Vec<MetricRecord>,
    /// Event streams by location id; every defined location has one
    pub events: BTreeMap<u32, Vec<EventRecord>>,
}

impl ArchiveContents {
    pub fn string(&self, id: u32) -> Option<&str> {
        self.strings.get(&id).map(String::as_str)
    }

    /// Name of a region, resolved through the string table
    pub fn region_name(&self, id: u32) -> Option<&str> {
        let region = self.regions.iter().find(|r| r.id == id)?;
        self.string(region.name)
    }

    pub fn location_name(&self, id: u32) -> Option<&str> {
        let location = self.locations.iter().find(|l| l.id == id)?;
        self.string(location.name)
    }

    pub fn event_count(&self) -> usize {
        self.events.values().map(Vec::len).sum()
    }
}

/// Read an archive directory
///
/// **Public** - inverse of `ArchiveWriter`
///
/// # Errors
/// * `WriterError::Io` - a file is missing or unreadable
/// * `WriterError::InvalidArchive` - bad magic, unknown tag or truncated record
pub fn read_archive(root: impl AsRef<Path>) -> Result<ArchiveContents, WriterError> {
    let root = root.as_ref();
    debug!("Reading archive from: {}", root.display());

    let mut contents = ArchiveContents {
        anchor: Some(read_anchor(&fs::read(root.join(ANCHOR_FILE_NAME))?)?),
        ..Default::default()
    };

    read_definitions(&fs::read(root.join(DEFINITIONS_FILE_NAME))?, &mut contents)?;

    for location in &contents.locations {
        let path = event_file_path(root, crate::definitions::LocationId::new(location.id));
        let records = read_events(&fs::read(&path)?, location.id)?;
        contents.events.insert(location.id, records);
    }

    Ok(contents)
}

fn read_anchor(bytes: &[u8]) -> Result<Anchor, WriterError> {
    let mut dec = Decoder::new(bytes);
    dec.header(KIND_ANCHOR)?;

    let version = dec.u16()?;
    if version != ARCHIVE_FORMAT_VERSION {
        return Err(WriterError::InvalidArchive(format!(
            "unsupported format version {}",
            version
        )));
    }

    Ok(Anchor {
        version,
        timer_resolution: dec.u64()?,
        strings: dec.u32()?,
        location_groups: dec.u32()?,
        locations: dec.u32()?,
        regions: dec.u32()?,
        metrics: dec.u32()?,
        events: dec.u64()?,
        first_timestamp: dec.i64()?,
        last_timestamp: dec.i64()?,
    })
}

fn read_definitions(bytes: &[u8], contents: &mut ArchiveContents) -> Result<(), WriterError> {
    let mut dec = Decoder::new(bytes);
    dec.header(KIND_DEFINITIONS)?;

    while !dec.is_empty() {
        match dec.u8()? {
            TAG_STRING => {
                let id = dec.u32()?;
                contents.strings.insert(id, dec.str()?);
            }
            TAG_LOCATION_GROUP => contents.location_groups.push(GroupRecord {
                id: dec.u32()?,
                name: dec.u32()?,
                pid: dec.i64()?,
            }),
            TAG_LOCATION => contents.locations.push(LocationRecord {
                id: dec.u32()?,
                name: dec.u32()?,
                kind: dec.u8()?,
                group: dec.u32()?,
            }),
            TAG_REGION => contents.regions.push(RegionRecord {
                id: dec.u32()?,
                name: dec.u32()?,
                category: dec.u32()?,
            }),
            TAG_METRIC => contents.metrics.push(MetricRecord {
                id: dec.u32()?,
                name: dec.u32()?,
                series: dec.u32()?,
            }),
            tag => {
                return Err(WriterError::InvalidArchive(format!(
                    "unknown definition tag {}",
                    tag
                )))
            }
        }
    }

    Ok(())
}

fn read_events(bytes: &[u8], location: u32) -> Result<Vec<EventRecord>, WriterError> {
    let mut dec = Decoder::new(bytes);
    dec.header(KIND_EVENTS)?;

    let stored = dec.u32()?;
    if stored != location {
        return Err(WriterError::InvalidArchive(format!(
            "event file for location {} claims location {}",
            location, stored
        )));
    }

    let mut records = Vec::new();
    while !dec.is_empty() {
        let record = match dec.u8()? {
            TAG_ENTER => {
                let timestamp = dec.i64()?;
                let region = dec.u32()?;
                let count = dec.u32()?;
                let mut attributes = Vec::new();
                for _ in 0..count {
                    let key = dec.u32()?;
                    attributes.push((key, read_value(&mut dec)?));
                }
                EventRecord::Enter {
                    timestamp,
                    region,
                    attributes,
                }
            }
            TAG_LEAVE => EventRecord::Leave {
                timestamp: dec.i64()?,
                region: dec.u32()?,
            },
            TAG_METRIC_SAMPLE => EventRecord::Metric {
                timestamp: dec.i64()?,
                metric: dec.u32()?,
                value: read_value(&mut dec)?,
            },
            tag => {
                return Err(WriterError::InvalidArchive(format!(
                    "unknown event tag {} in location {}",
                    tag, location
                )))
            }
        };
        records.push(record);
    }

    Ok(records)
}

fn read_value(dec: &mut Decoder<'_>) -> Result<DecodedValue, WriterError> {
    Ok(match dec.u8()? {
        TYPE_BOOL => DecodedValue::Bool(dec.u8()? != 0),
        TYPE_INT => DecodedValue::Int(dec.i64()?),
        TYPE_UINT => DecodedValue::UInt(dec.u64()?),
        TYPE_DOUBLE => DecodedValue::Double(dec.f64()?),
        TYPE_STRING => DecodedValue::String(dec.u32()?),
        other => {
            return Err(WriterError::InvalidArchive(format!(
                "unknown value type {}",
                other
            )))
        }
    })
}
