//! JSON conversion report schema.

use crate::converter::ConversionSummary;
use crate::timeline::ConversionWarning;
use crate::utils::config::REPORT_SCHEMA_VERSION;
use serde::{Deserialize, Serialize};

/// Report written next to (or instead of printing) the conversion summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionReport {
    /// Schema version for compatibility checking
    pub version: String,

    /// Input trace file
    pub input: String,

    /// Output archive directory
    pub output: String,

    pub summary: ConversionSummary,

    /// Human-readable recoverable warnings, in detection order
    pub warnings: Vec<String>,

    /// Timestamp when the report was generated
    pub generated_at: String,
}

/// Assemble a report from a finished conversion
///
/// **Public** - used by the convert command
pub fn to_report(
    input: &str,
    output: &str,
    summary: &ConversionSummary,
    warnings: &[ConversionWarning],
) -> ConversionReport {
    use chrono::Utc;

    ConversionReport {
        version: REPORT_SCHEMA_VERSION.to_string(),
        input: input.to_string(),
        output: output.to_string(),
        summary: summary.clone(),
        warnings: warnings.iter().map(ToString::to_string).collect(),
        generated_at: Utc::now().to_rfc3339(),
    }
}
