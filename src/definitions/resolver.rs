//! Global definition tables.
//!
//! One pass over the finished timeline assigns dense ids to location
//! groups, locations, regions and metrics. Ids follow first-seen order over
//! the timeline (locations in key order, spans by start time), so identical
//! inputs always get identical ids.

use super::symbols::{StringRef, SymbolTable};
use crate::timeline::{LocationKey, Timeline, Track};
use crate::utils::config::{MEMORY_ALLOCATORS_GROUP, MEMORY_PROFILE_PID};
use log::debug;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

macro_rules! definition_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
        #[serde(transparent)]
        pub struct $name(u32);

        impl $name {
            pub const fn new(id: u32) -> Self {
                Self(id)
            }

            pub const fn id(self) -> u32 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, "#{}"), self.0)
            }
        }
    };
}

definition_id!(
    /// Id of a [`Region`]
    RegionId,
    "region"
);
definition_id!(
    /// Id of a [`Location`]
    LocationId,
    "location"
);
definition_id!(
    /// Id of a [`LocationGroup`]
    LocationGroupId,
    "group"
);
definition_id!(
    /// Id of a [`Metric`]
    MetricId,
    "metric"
);

/// What kind of timeline a location is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationKind {
    CpuThread,
    AsyncTrack,
    /// Measurement location holding counter samples
    Metric,
}

/// A named, categorized code region shared by all its occurrences
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub id: RegionId,
    pub name: StringRef,
    pub category: StringRef,
}

/// One process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationGroup {
    pub id: LocationGroupId,
    pub name: StringRef,
    pub pid: i64,
}

/// One ordered timeline within a process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub id: LocationId,
    pub name: StringRef,
    pub kind: LocationKind,
    pub group: LocationGroupId,
    pub key: LocationKey,
}

/// One counter series
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metric {
    pub id: MetricId,
    pub name: StringRef,
    pub series: StringRef,
}

/// The finished definition tables
#[derive(Debug, Clone, Default)]
pub struct Definitions {
    pub location_groups: Vec<LocationGroup>,
    pub locations: Vec<Location>,
    pub regions: Vec<Region>,
    pub metrics: Vec<Metric>,
    group_index: HashMap<i64, LocationGroupId>,
    location_index: HashMap<LocationKey, LocationId>,
    region_index: HashMap<(StringRef, StringRef), RegionId>,
    metric_index: HashMap<(StringRef, StringRef), MetricId>,
}

impl Definitions {
    pub fn group_for(&self, pid: i64) -> Option<LocationGroupId> {
        self.group_index.get(&pid).copied()
    }

    pub fn location_for(&self, key: &LocationKey) -> Option<LocationId> {
        self.location_index.get(key).copied()
    }

    pub fn region_for(&self, name: StringRef, category: StringRef) -> Option<RegionId> {
        self.region_index.get(&(name, category)).copied()
    }

    pub fn metric_for(&self, name: StringRef, series: StringRef) -> Option<MetricId> {
        self.metric_index.get(&(name, series)).copied()
    }

    /// The measurement location of a process, if it has counters
    pub fn measurement_location(&self, pid: i64) -> Option<LocationId> {
        self.location_for(&LocationKey::counters(pid))
    }

    pub fn location(&self, id: LocationId) -> Option<&Location> {
        self.locations.get(id.0 as usize)
    }

    pub fn region(&self, id: RegionId) -> Option<&Region> {
        self.regions.get(id.0 as usize)
    }

    fn add_group(&mut self, pid: i64, name: StringRef) -> LocationGroupId {
        let id = LocationGroupId(self.location_groups.len() as u32);
        self.location_groups.push(LocationGroup { id, name, pid });
        self.group_index.insert(pid, id);
        id
    }

    fn add_location(
        &mut self,
        key: &LocationKey,
        name: StringRef,
        kind: LocationKind,
        group: LocationGroupId,
    ) -> LocationId {
        let id = LocationId(self.locations.len() as u32);
        self.locations.push(Location {
            id,
            name,
            kind,
            group,
            key: key.clone(),
        });
        self.location_index.insert(key.clone(), id);
        id
    }

    fn region_or_insert(&mut self, name: StringRef, category: StringRef) -> RegionId {
        if let Some(id) = self.region_index.get(&(name, category)) {
            return *id;
        }

        let id = RegionId(self.regions.len() as u32);
        self.regions.push(Region { id, name, category });
        self.region_index.insert((name, category), id);
        id
    }

    fn metric_or_insert(&mut self, name: StringRef, series: StringRef) -> MetricId {
        if let Some(id) = self.metric_index.get(&(name, series)) {
            return *id;
        }

        let id = MetricId(self.metrics.len() as u32);
        self.metrics.push(Metric { id, name, series });
        self.metric_index.insert((name, series), id);
        id
    }
}

/// Build all definition tables from a finished timeline
///
/// **Public** - pass 3 of the conversion; performs no writer I/O
///
/// # Arguments
/// * `timeline` - Sorted, stack-balanced timeline
/// * `symbols` - Symbol table used while building the timeline; location
///   and group names are added to it
pub fn resolve_definitions(timeline: &Timeline, symbols: &mut SymbolTable) -> Definitions {
    let mut defs = Definitions::default();

    for pid in timeline.processes() {
        let name = group_name(timeline, pid);
        let name = symbols.intern(&name);
        defs.add_group(pid, name);
    }

    for (key, spans) in timeline.locations() {
        let Some(group) = defs.group_for(key.pid) else {
            // Every location's process is registered by the builder
            debug!("Location {} has no process, skipping", key);
            continue;
        };

        let (name, kind) = location_name(timeline, key);
        let name = symbols.intern(&name);
        defs.add_location(key, name, kind, group);

        for span in spans {
            defs.region_or_insert(span.name, span.category);
        }
    }

    for sample in timeline.counters() {
        defs.metric_or_insert(sample.name, sample.series);
    }

    debug!(
        "Resolved {} groups, {} locations, {} regions, {} metrics",
        defs.location_groups.len(),
        defs.locations.len(),
        defs.regions.len(),
        defs.metrics.len()
    );

    defs
}

/// `"<process_name> <pid>"`, or the bare pid without a name
///
/// Memory allocators share one fixed group name.
///
/// **Private** - naming helper
fn group_name(timeline: &Timeline, pid: i64) -> String {
    if pid == MEMORY_PROFILE_PID {
        return MEMORY_ALLOCATORS_GROUP.to_string();
    }
    match timeline.process_name(pid) {
        Some(name) => format!("{} {}", name, pid),
        None => pid.to_string(),
    }
}

/// Display name and kind of a location
///
/// **Private** - naming helper
fn location_name(timeline: &Timeline, key: &LocationKey) -> (String, LocationKind) {
    let group = group_name(timeline, key.pid);
    match &key.track {
        Track::Thread(tid) => {
            let name = match timeline.thread_name(key.pid, *tid) {
                Some(thread) => format!("{} {}", thread, tid),
                None => format!("{} {}", group, tid),
            };
            (name, LocationKind::CpuThread)
        }
        Track::Async(id) => (format!("{} async {}", group, id), LocationKind::AsyncTrack),
        Track::Counters => (format!("{} counters", group), LocationKind::Metric),
        Track::Allocator(name) => (name.clone(), LocationKind::CpuThread),
    }
}
