//! String interning and global definition tables.

pub mod resolver;
pub mod symbols;

pub use resolver::{
    resolve_definitions, Definitions, Location, LocationGroup, LocationGroupId, LocationId,
    LocationKind, Metric, MetricId, Region, RegionId,
};
pub use symbols::{StringRef, SymbolTable};
