//! chrome2otf2
//!
//! Converts Chrome Trace Event Format JSON (as produced by browsers,
//! `chrome://tracing` and many profilers) into an OTF2-style binary trace
//! archive.
//!
//! The pipeline is strictly staged:
//! `parser` -> `timeline` -> `definitions` -> `emitter` -> `output`.
//! The `converter` module drives it, `commands` wraps it for the CLI.
//!
//! ```bash
//! chrome2otf2 convert trace.json out/ --summary
//! chrome2otf2 inspect out/ --events
//! ```

pub mod commands;
pub mod converter;
pub mod definitions;
pub mod emitter;
pub mod output;
pub mod parser;
pub mod timeline;
pub mod utils;

pub use converter::{
    convert, prepare, prepare_with_memory_profile, ConversionSummary, ConverterOptions,
    PreparedTrace,
};
