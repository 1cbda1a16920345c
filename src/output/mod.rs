//! Output side of the converter.
//!
//! - `codec`: little-endian record encoding shared by writer and reader
//! - `archive`: the on-disk `TraceWriter` (anchor, definitions, one event file per location)
//! - `reader`: decodes an archive back into memory
//! - `report`/`json`: the JSON conversion report

pub mod archive;
pub mod codec;
pub mod json;
pub mod reader;
pub mod report;

pub use archive::{event_file_path, ArchiveWriter};
pub use json::{read_report, write_report};
pub use reader::{
    read_archive, Anchor, ArchiveContents, DecodedValue, EventRecord, GroupRecord,
    LocationRecord, MetricRecord, RegionRecord,
};
pub use report::{to_report, ConversionReport};
