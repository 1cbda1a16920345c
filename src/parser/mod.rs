//! Chrome trace parsing.
//!
//! This module handles:
//! - Loading Chrome Trace Event Format documents (object or array form, gzip or plain)
//! - Normalizing each event into a [`RawEvent`]
//! - Exact microsecond timestamp arithmetic
//! - TensorFlow memory profiles (per-allocator snapshots)

pub mod chrome_trace;
pub mod event;
pub mod memory_profile;
pub mod timestamp;

// Re-export main types
pub use chrome_trace::{open_trace_file, parse_event, read_input_file, EventStream, TraceDocument};
pub use event::{ArgValue, ParsedEvent, Phase, RawEvent};
pub use memory_profile::{
    open_memory_profile, AllocatorProfile, MemoryProfile, MemorySnapshot,
};
pub use timestamp::Timestamp;
