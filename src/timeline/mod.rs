//! Timeline reconstruction.
//!
//! This module transforms the parsed event stream into:
//! - Well-nested spans per location (thread, async track)
//! - Counter samples per process
//! - Process/thread names from metadata
//! - Warnings for every broken begin/end pair

pub mod builder;
pub mod span;

// Re-export main types and functions
pub use builder::{build_timeline, OpenSpan, ThreadStack, TimelineBuilder, TimelineOptions};
pub use span::{
    Attribute, AttributeValue, ConversionWarning, CounterSample, LocationKey, MetricValue, Span,
    Timeline, TimelineStats, Track,
};
