//! The trace writer capability consumed by the emitter.
//!
//! Concrete encodings live elsewhere (see `output::archive`); this module
//! defines the calls an archive must accept and an in-memory recorder.

use crate::definitions::{
    Location, LocationGroup, LocationId, Metric, MetricId, Region, RegionId, StringRef,
};
use crate::parser::Timestamp;
use crate::timeline::{Attribute, MetricValue};
use crate::utils::error::WriterError;

/// Sink for definitions and events
///
/// Callers must issue every `define_*` call before the first event call.
/// Implementations are expected to fail fast on I/O errors; callers do not
/// retry.
pub trait TraceWriter {
    fn define_string(&mut self, id: StringRef, value: &str) -> Result<(), WriterError>;

    fn define_location_group(&mut self, group: &LocationGroup) -> Result<(), WriterError>;

    fn define_location(&mut self, location: &Location) -> Result<(), WriterError>;

    fn define_region(&mut self, region: &Region) -> Result<(), WriterError>;

    fn define_metric(&mut self, metric: &Metric) -> Result<(), WriterError>;

    fn enter(
        &mut self,
        location: LocationId,
        timestamp: Timestamp,
        region: RegionId,
        attributes: &[Attribute],
    ) -> Result<(), WriterError>;

    fn leave(
        &mut self,
        location: LocationId,
        timestamp: Timestamp,
        region: RegionId,
    ) -> Result<(), WriterError>;

    fn metric(
        &mut self,
        location: LocationId,
        timestamp: Timestamp,
        metric: MetricId,
        value: MetricValue,
    ) -> Result<(), WriterError>;

    /// Flush and close the archive
    fn finish(&mut self) -> Result<(), WriterError>;
}

/// A call received by [`MemoryWriter`]
#[derive(Debug, Clone, PartialEq)]
pub enum WriterRecord {
    String { id: StringRef, value: String },
    LocationGroup(LocationGroup),
    Location(Location),
    Region(Region),
    Metric(Metric),
    Enter {
        location: LocationId,
        timestamp: Timestamp,
        region: RegionId,
        attributes: Vec<Attribute>,
    },
    Leave {
        location: LocationId,
        timestamp: Timestamp,
        region: RegionId,
    },
    Sample {
        location: LocationId,
        timestamp: Timestamp,
        metric: MetricId,
        value: MetricValue,
    },
}

impl WriterRecord {
    /// Location of an event record, `None` for definitions
    pub fn location(&self) -> Option<LocationId> {
        match self {
            WriterRecord::Enter { location, .. }
            | WriterRecord::Leave { location, .. }
            | WriterRecord::Sample { location, .. } => Some(*location),
            _ => None,
        }
    }

    pub fn is_definition(&self) -> bool {
        self.location().is_none()
    }
}

/// Records every call in order; used by tests and for dry runs
#[derive(Debug, Clone, Default)]
pub struct MemoryWriter {
    records: Vec<WriterRecord>,
    events_started: bool,
    finished: bool,
}

impl MemoryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[WriterRecord] {
        &self.records
    }

    /// Event records of one location, in write order
    pub fn events_for(&self, location: LocationId) -> Vec<&WriterRecord> {
        self.records
            .iter()
            .filter(|r| r.location() == Some(location))
            .collect()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn define(&mut self, record: WriterRecord) -> Result<(), WriterError> {
        if self.events_started {
            return Err(WriterError::DefinitionsClosed(format!("{:?}", record)));
        }
        self.records.push(record);
        Ok(())
    }

    fn event(&mut self, record: WriterRecord) -> Result<(), WriterError> {
        self.events_started = true;
        self.records.push(record);
        Ok(())
    }
}

impl TraceWriter for MemoryWriter {
    fn define_string(&mut self, id: StringRef, value: &str) -> Result<(), WriterError> {
        self.define(WriterRecord::String {
            id,
            value: value.to_string(),
        })
    }

    fn define_location_group(&mut self, group: &LocationGroup) -> Result<(), WriterError> {
        self.define(WriterRecord::LocationGroup(group.clone()))
    }

    fn define_location(&mut self, location: &Location) -> Result<(), WriterError> {
        self.define(WriterRecord::Location(location.clone()))
    }

    fn define_region(&mut self, region: &Region) -> Result<(), WriterError> {
        self.define(WriterRecord::Region(region.clone()))
    }

    fn define_metric(&mut self, metric: &Metric) -> Result<(), WriterError> {
        self.define(WriterRecord::Metric(metric.clone()))
    }

    fn enter(
        &mut self,
        location: LocationId,
        timestamp: Timestamp,
        region: RegionId,
        attributes: &[Attribute],
    ) -> Result<(), WriterError> {
        self.event(WriterRecord::Enter {
            location,
            timestamp,
            region,
            attributes: attributes.to_vec(),
        })
    }

    fn leave(
        &mut self,
        location: LocationId,
        timestamp: Timestamp,
        region: RegionId,
    ) -> Result<(), WriterError> {
        self.event(WriterRecord::Leave {
            location,
            timestamp,
            region,
        })
    }

    fn metric(
        &mut self,
        location: LocationId,
        timestamp: Timestamp,
        metric: MetricId,
        value: MetricValue,
    ) -> Result<(), WriterError> {
        self.event(WriterRecord::Sample {
            location,
            timestamp,
            metric,
            value,
        })
    }

    fn finish(&mut self) -> Result<(), WriterError> {
        self.finished = true;
        Ok(())
    }
}
