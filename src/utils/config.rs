//! Configuration and constants for the converter.

/// Archive timer resolution in ticks per second.
///
/// Chrome traces use microseconds but carry nanosecond precision in
/// fractional timestamps, so the archive counts nanoseconds.
pub const TIMER_RESOLUTION: u64 = 1_000_000_000;

/// Ticks per source microsecond
pub const TICKS_PER_MICRO: i64 = 1_000;

/// Number of fractional microsecond digits kept when normalizing timestamps
pub const FRACTION_DIGITS: usize = 3;

/// Current JSON report schema version
pub const REPORT_SCHEMA_VERSION: &str = "1.0.0";

// Archive layout (OTF2-style directory)
pub const ANCHOR_FILE_NAME: &str = "traces.otf2";
pub const DEFINITIONS_FILE_NAME: &str = "traces.def";
pub const EVENTS_DIR_NAME: &str = "traces";
pub const EVENTS_FILE_EXTENSION: &str = "evt";

/// Magic bytes at the start of every archive file
pub const ARCHIVE_MAGIC: &[u8; 8] = b"C2OTF2\0\0";

/// Binary encoding version written to the anchor file
pub const ARCHIVE_FORMAT_VERSION: u16 = 1;

// Chrome metadata event names that carry naming information
pub const PROCESS_NAME_METADATA: &str = "process_name";
pub const THREAD_NAME_METADATA: &str = "thread_name";

// The system process/thread pair (e.g. swapper) whose thread name is ignored
pub const SYSTEM_PID: i64 = 0;
pub const SYSTEM_TID: i64 = 0;

// Field names for the top-level trace object
pub const TRACE_EVENTS_FIELD: &str = "traceEvents";

// Gzip magic bytes, used to detect compressed input
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

// TensorFlow memory profiles
/// Location group holding one location per memory allocator
pub const MEMORY_ALLOCATORS_GROUP: &str = "TF Memory Allocators";

/// Pseudo process id of the allocator group; sorts after every real process
pub const MEMORY_PROFILE_PID: i64 = i64::MAX;

/// Region category of memory activities
pub const MEMORY_ACTIVITY_CATEGORY: &str = "memory";

/// Picoseconds per archive tick
pub const PICOS_PER_TICK: i64 = 1_000;

/// Snapshot metadata that profiles store as strings but are unsigned integers
pub const MEMORY_UINT_FIELDS: &[&str] = &[
    "stackReservedBytes",
    "heapAllocatedBytes",
    "freeMemoryBytes",
    "peakBytesInUse",
    "requestedBytes",
    "allocationBytes",
    "address",
    "stepId",
];
