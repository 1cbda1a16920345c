//! Event emission.
//!
//! This module handles:
//! - The [`TraceWriter`] capability an archive must provide
//! - Writing definitions before any event
//! - Per-location enter/leave/metric streams in time order

pub mod emit;
pub mod writer;

pub use emit::{EmitStats, TraceEmitter};
pub use writer::{MemoryWriter, TraceWriter, WriterRecord};
