//! OTF2-style archive writer.
//!
//! Layout of an archive directory:
//! - `traces.otf2` - anchor: format version, timer resolution, counts, time range
//! - `traces.def` - global definitions
//! - `traces/<location>.evt` - one event stream per location
//!
//! The writer refuses definitions after the first event and events that
//! reference undefined ids. It does no transactional cleanup: after an I/O
//! error the directory is left as it is.

use super::codec::*;
use crate::definitions::{
    Location, LocationGroup, LocationId, LocationKind, Metric, MetricId, Region, RegionId,
    StringRef,
};
use crate::emitter::TraceWriter;
use crate::parser::Timestamp;
use crate::timeline::{Attribute, AttributeValue, MetricValue};
use crate::utils::config::{
    ANCHOR_FILE_NAME, ARCHIVE_FORMAT_VERSION, DEFINITIONS_FILE_NAME, EVENTS_DIR_NAME,
    EVENTS_FILE_EXTENSION, TIMER_RESOLUTION,
};
use crate::utils::error::WriterError;
use log::{debug, info};
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// Path of a location's event stream inside an archive
pub fn event_file_path(root: &Path, location: LocationId) -> PathBuf {
    root.join(EVENTS_DIR_NAME)
        .join(format!("{}.{}", location.id(), EVENTS_FILE_EXTENSION))
}

/// Writes one archive directory
pub struct ArchiveWriter {
    root: PathBuf,
    definitions: Encoder<BufWriter<File>>,
    stream: Option<(LocationId, Encoder<BufWriter<File>>)>,
    started_streams: HashSet<LocationId>,
    strings: HashSet<StringRef>,
    groups: HashSet<u32>,
    locations: HashSet<LocationId>,
    regions: HashSet<RegionId>,
    metrics: HashSet<MetricId>,
    events_started: bool,
    event_count: u64,
    time_range: Option<(Timestamp, Timestamp)>,
}

impl ArchiveWriter {
    /// Create the archive directory and its definitions file
    ///
    /// # Errors
    /// * `WriterError::OutputExists` - `root` exists and is not empty
    /// * `WriterError::Io` - directories or files cannot be created
    pub fn create(root: impl AsRef<Path>) -> Result<Self, WriterError> {
        let root = root.as_ref().to_path_buf();

        if root.exists() && fs::read_dir(&root)?.next().is_some() {
            return Err(WriterError::OutputExists(root));
        }

        info!("Creating archive at: {}", root.display());
        fs::create_dir_all(root.join(EVENTS_DIR_NAME))?;

        let file = File::create(root.join(DEFINITIONS_FILE_NAME))?;
        let mut definitions = Encoder::new(BufWriter::new(file));
        definitions.header(KIND_DEFINITIONS)?;

        Ok(Self {
            root,
            definitions,
            stream: None,
            started_streams: HashSet::new(),
            strings: HashSet::new(),
            groups: HashSet::new(),
            locations: HashSet::new(),
            regions: HashSet::new(),
            metrics: HashSet::new(),
            events_started: false,
            event_count: 0,
            time_range: None,
        })
    }

    fn check_open_for_definitions(&self, what: &str) -> Result<(), WriterError> {
        if self.events_started {
            return Err(WriterError::DefinitionsClosed(what.to_string()));
        }
        Ok(())
    }

    fn check_string(&self, id: StringRef) -> Result<(), WriterError> {
        if !self.strings.contains(&id) {
            return Err(WriterError::UndefinedReference {
                kind: "string",
                id: id.id(),
            });
        }
        Ok(())
    }

    /// Switch the current stream to `location`, opening its file if needed
    ///
    /// **Private** - streams are normally written one location at a time
    fn stream_for(
        &mut self,
        location: LocationId,
        timestamp: Timestamp,
    ) -> Result<&mut Encoder<BufWriter<File>>, WriterError> {
        if !self.locations.contains(&location) {
            return Err(WriterError::UndefinedReference {
                kind: "location",
                id: location.id(),
            });
        }

        if !self.events_started {
            self.events_started = true;
            self.definitions.flush()?;
        }

        self.event_count += 1;
        self.time_range = Some(match self.time_range {
            Some((first, last)) => (first.min(timestamp), last.max(timestamp)),
            None => (timestamp, timestamp),
        });

        let current = self.stream.as_ref().map(|(id, _)| *id);
        if current != Some(location) {
            if let Some((_, mut previous)) = self.stream.take() {
                previous.flush()?;
            }

            let encoder = self.open_stream(location)?;
            self.stream = Some((location, encoder));
        }

        match self.stream.as_mut() {
            Some((_, encoder)) => Ok(encoder),
            None => Err(WriterError::InvalidArchive(
                "event stream not open".to_string(),
            )),
        }
    }

    /// Open a location's event file for appending, writing its header on first use
    fn open_stream(&mut self, location: LocationId) -> Result<Encoder<BufWriter<File>>, WriterError> {
        let path = event_file_path(&self.root, location);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let mut encoder = Encoder::new(BufWriter::new(file));
        if self.started_streams.insert(location) {
            debug!("Opening event stream: {}", path.display());
            encoder.header(KIND_EVENTS)?;
            encoder.u32(location.id())?;
        }
        Ok(encoder)
    }

    fn write_anchor(&self) -> Result<(), WriterError> {
        let file = File::create(self.root.join(ANCHOR_FILE_NAME))?;
        let mut anchor = Encoder::new(BufWriter::new(file));
        let (first, last) = self
            .time_range
            .unwrap_or((Timestamp::ZERO, Timestamp::ZERO));

        anchor.header(KIND_ANCHOR)?;
        anchor.u16(ARCHIVE_FORMAT_VERSION)?;
        anchor.u64(TIMER_RESOLUTION)?;
        anchor.u32(self.strings.len() as u32)?;
        anchor.u32(self.groups.len() as u32)?;
        anchor.u32(self.locations.len() as u32)?;
        anchor.u32(self.regions.len() as u32)?;
        anchor.u32(self.metrics.len() as u32)?;
        anchor.u64(self.event_count)?;
        anchor.i64(first.ticks())?;
        anchor.i64(last.ticks())?;
        anchor.flush()
    }
}

impl TraceWriter for ArchiveWriter {
    fn define_string(&mut self, id: StringRef, value: &str) -> Result<(), WriterError> {
        self.check_open_for_definitions("string")?;
        self.definitions.u8(TAG_STRING)?;
        self.definitions.u32(id.id())?;
        self.definitions.str(value)?;
        self.strings.insert(id);
        Ok(())
    }

    fn define_location_group(&mut self, group: &LocationGroup) -> Result<(), WriterError> {
        self.check_open_for_definitions("location group")?;
        self.check_string(group.name)?;
        self.definitions.u8(TAG_LOCATION_GROUP)?;
        self.definitions.u32(group.id.id())?;
        self.definitions.u32(group.name.id())?;
        self.definitions.i64(group.pid)?;
        self.groups.insert(group.id.id());
        Ok(())
    }

    fn define_location(&mut self, location: &Location) -> Result<(), WriterError> {
        self.check_open_for_definitions("location")?;
        self.check_string(location.name)?;
        if !self.groups.contains(&location.group.id()) {
            return Err(WriterError::UndefinedReference {
                kind: "location group",
                id: location.group.id(),
            });
        }

        let kind = match location.kind {
            LocationKind::CpuThread => LOCATION_CPU_THREAD,
            LocationKind::AsyncTrack => LOCATION_ASYNC_TRACK,
            LocationKind::Metric => LOCATION_METRIC,
        };
        self.definitions.u8(TAG_LOCATION)?;
        self.definitions.u32(location.id.id())?;
        self.definitions.u32(location.name.id())?;
        self.definitions.u8(kind)?;
        self.definitions.u32(location.group.id())?;
        self.locations.insert(location.id);
        Ok(())
    }

    fn define_region(&mut self, region: &Region) -> Result<(), WriterError> {
        self.check_open_for_definitions("region")?;
        self.check_string(region.name)?;
        self.check_string(region.category)?;
        self.definitions.u8(TAG_REGION)?;
        self.definitions.u32(region.id.id())?;
        self.definitions.u32(region.name.id())?;
        self.definitions.u32(region.category.id())?;
        self.regions.insert(region.id);
        Ok(())
    }

    fn define_metric(&mut self, metric: &Metric) -> Result<(), WriterError> {
        self.check_open_for_definitions("metric")?;
        self.check_string(metric.name)?;
        self.check_string(metric.series)?;
        self.definitions.u8(TAG_METRIC)?;
        self.definitions.u32(metric.id.id())?;
        self.definitions.u32(metric.name.id())?;
        self.definitions.u32(metric.series.id())?;
        self.metrics.insert(metric.id);
        Ok(())
    }

    fn enter(
        &mut self,
        location: LocationId,
        timestamp: Timestamp,
        region: RegionId,
        attributes: &[Attribute],
    ) -> Result<(), WriterError> {
        if !self.regions.contains(&region) {
            return Err(WriterError::UndefinedReference {
                kind: "region",
                id: region.id(),
            });
        }
        for attribute in attributes {
            self.check_string(attribute.key)?;
            if let AttributeValue::String(value) = attribute.value {
                self.check_string(value)?;
            }
        }

        let stream = self.stream_for(location, timestamp)?;
        stream.u8(TAG_ENTER)?;
        stream.i64(timestamp.ticks())?;
        stream.u32(region.id())?;
        stream.u32(attributes.len() as u32)?;
        for attribute in attributes {
            stream.u32(attribute.key.id())?;
            match attribute.value {
                AttributeValue::Bool(b) => {
                    stream.u8(TYPE_BOOL)?;
                    stream.u8(b as u8)?;
                }
                AttributeValue::Int(i) => {
                    stream.u8(TYPE_INT)?;
                    stream.i64(i)?;
                }
                AttributeValue::UInt(u) => {
                    stream.u8(TYPE_UINT)?;
                    stream.u64(u)?;
                }
                AttributeValue::Double(f) => {
                    stream.u8(TYPE_DOUBLE)?;
                    stream.f64(f)?;
                }
                AttributeValue::String(s) => {
                    stream.u8(TYPE_STRING)?;
                    stream.u32(s.id())?;
                }
            }
        }
        Ok(())
    }

    fn leave(
        &mut self,
        location: LocationId,
        timestamp: Timestamp,
        region: RegionId,
    ) -> Result<(), WriterError> {
        if !self.regions.contains(&region) {
            return Err(WriterError::UndefinedReference {
                kind: "region",
                id: region.id(),
            });
        }

        let stream = self.stream_for(location, timestamp)?;
        stream.u8(TAG_LEAVE)?;
        stream.i64(timestamp.ticks())?;
        stream.u32(region.id())
    }

    fn metric(
        &mut self,
        location: LocationId,
        timestamp: Timestamp,
        metric: MetricId,
        value: MetricValue,
    ) -> Result<(), WriterError> {
        if !self.metrics.contains(&metric) {
            return Err(WriterError::UndefinedReference {
                kind: "metric",
                id: metric.id(),
            });
        }

        let stream = self.stream_for(location, timestamp)?;
        stream.u8(TAG_METRIC_SAMPLE)?;
        stream.i64(timestamp.ticks())?;
        stream.u32(metric.id())?;
        match value {
            MetricValue::Int(i) => {
                stream.u8(TYPE_INT)?;
                stream.i64(i)
            }
            MetricValue::Double(f) => {
                stream.u8(TYPE_DOUBLE)?;
                stream.f64(f)
            }
        }
    }

    fn finish(&mut self) -> Result<(), WriterError> {
        if let Some((_, mut stream)) = self.stream.take() {
            stream.flush()?;
        }

        // Every location gets a stream, even one without events
        let mut silent: Vec<LocationId> = self
            .locations
            .iter()
            .filter(|id| !self.started_streams.contains(id))
            .copied()
            .collect();
        silent.sort();
        for location in silent {
            self.open_stream(location)?.flush()?;
        }

        self.definitions.flush()?;
        self.write_anchor()?;

        info!(
            "Archive closed: {} events on {} streams",
            self.event_count,
            self.started_streams.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::LocationKey;

    fn group() -> LocationGroup {
        LocationGroup {
            id: crate::definitions::LocationGroupId::new(0),
            name: StringRef::new(0),
            pid: 1,
        }
    }

    fn location() -> Location {
        Location {
            id: LocationId::new(0),
            name: StringRef::new(0),
            kind: LocationKind::CpuThread,
            group: group().id,
            key: LocationKey::thread(1, 1),
        }
    }

    #[test]
    fn test_refuses_non_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("stale"), b"x").unwrap();

        let result = ArchiveWriter::create(dir.path());
        assert!(matches!(result, Err(WriterError::OutputExists(_))));
    }

    #[test]
    fn test_accepts_existing_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ArchiveWriter::create(dir.path()).is_ok());
    }

    #[test]
    fn test_undefined_references_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = ArchiveWriter::create(dir.path().join("trace")).unwrap();

        assert!(matches!(
            writer.define_location_group(&group()),
            Err(WriterError::UndefinedReference { kind: "string", .. })
        ));

        writer.define_string(StringRef::new(0), "p").unwrap();
        writer.define_location_group(&group()).unwrap();
        writer.define_location(&location()).unwrap();

        assert!(matches!(
            writer.enter(LocationId::new(0), Timestamp::ZERO, RegionId::new(3), &[]),
            Err(WriterError::UndefinedReference { kind: "region", .. })
        ));
    }

    #[test]
    fn test_definitions_close_after_first_event() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = ArchiveWriter::create(dir.path().join("trace")).unwrap();
        writer.define_string(StringRef::new(0), "f").unwrap();
        writer.define_location_group(&group()).unwrap();
        writer.define_location(&location()).unwrap();
        writer
            .define_region(&Region {
                id: RegionId::new(0),
                name: StringRef::new(0),
                category: StringRef::new(0),
            })
            .unwrap();

        writer
            .enter(LocationId::new(0), Timestamp::ZERO, RegionId::new(0), &[])
            .unwrap();
        assert!(matches!(
            writer.define_string(StringRef::new(1), "late"),
            Err(WriterError::DefinitionsClosed(_))
        ));

        writer
            .leave(LocationId::new(0), Timestamp::from_ticks(5), RegionId::new(0))
            .unwrap();
        writer.finish().unwrap();

        let root = dir.path().join("trace");
        assert!(root.join(ANCHOR_FILE_NAME).exists());
        assert!(event_file_path(&root, LocationId::new(0)).exists());
    }

    #[test]
    fn test_location_without_events_gets_empty_stream() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("trace");
        let mut writer = ArchiveWriter::create(&root).unwrap();
        writer.define_string(StringRef::new(0), "idle").unwrap();
        writer.define_location_group(&group()).unwrap();
        writer.define_location(&location()).unwrap();
        writer.finish().unwrap();

        let bytes = std::fs::read(event_file_path(&root, LocationId::new(0))).unwrap();
        let mut dec = Decoder::new(&bytes);
        dec.header(KIND_EVENTS).unwrap();
        assert_eq!(dec.u32().unwrap(), 0);
        assert!(dec.is_empty());
    }
}
