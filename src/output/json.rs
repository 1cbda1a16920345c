//! JSON report writer.
//!
//! Writes `ConversionReport` structs to disk with pretty formatting.

use crate::output::report::ConversionReport;
use crate::utils::error::OutputError;
use log::{debug, info};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Write a conversion report to a JSON file
///
/// **Public** - main entry point for report output
///
/// # Arguments
/// * `report` - Report to write
/// * `output_path` - Path to the JSON file
///
/// # Errors
/// * `OutputError::WriteFailed` - I/O error during write
/// * `OutputError::SerializationFailed` - JSON serialization error
/// * `OutputError::InvalidPath` - Path is empty or a directory
pub fn write_report(
    report: &ConversionReport,
    output_path: impl AsRef<Path>,
) -> Result<(), OutputError> {
    let output_path = output_path.as_ref();

    info!("Writing report to: {}", output_path.display());

    validate_output_path(output_path)?;

    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            debug!("Creating parent directories: {}", parent.display());
            std::fs::create_dir_all(parent).map_err(|e| {
                OutputError::InvalidPath(format!(
                    "Cannot create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
    }

    let file = File::create(output_path).map_err(OutputError::WriteFailed)?;
    serde_json::to_writer_pretty(BufWriter::new(file), report)
        .map_err(OutputError::SerializationFailed)?;

    info!(
        "Report written successfully ({} bytes)",
        calculate_file_size(output_path)
    );

    Ok(())
}

/// Read a report back
///
/// **Public** - used by tests and tooling that diff conversions
pub fn read_report(input_path: impl AsRef<Path>) -> Result<ConversionReport, OutputError> {
    let input_path = input_path.as_ref();

    debug!("Reading report from: {}", input_path.display());

    let file = File::open(input_path).map_err(OutputError::ReadFailed)?;
    let report: ConversionReport =
        serde_json::from_reader(file).map_err(OutputError::SerializationFailed)?;

    debug!(
        "Report loaded: version {}, {} warnings",
        report.version,
        report.warnings.len()
    );

    Ok(report)
}

/// **Private** - internal validation
fn validate_output_path(path: &Path) -> Result<(), OutputError> {
    if path.as_os_str().is_empty() {
        return Err(OutputError::InvalidPath("Path is empty".to_string()));
    }

    if path.is_dir() {
        return Err(OutputError::InvalidPath(format!(
            "Path is a directory: {}",
            path.display()
        )));
    }

    Ok(())
}

/// **Private** - internal utility
fn calculate_file_size(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::ConversionSummary;
    use crate::output::report::to_report;
    use crate::timeline::{ConversionWarning, LocationKey};
    use pretty_assertions::assert_eq;
    use tempfile::NamedTempFile;

    fn create_test_report() -> ConversionReport {
        let summary = ConversionSummary {
            events_read: 4,
            spans_resolved: 1,
            dangling_ends: 1,
            regions: 1,
            locations: 1,
            location_groups: 1,
            enters: 1,
            leaves: 1,
            ..Default::default()
        };
        let warnings = vec![ConversionWarning::DanglingEnd {
            index: 3,
            location: LocationKey::thread(1, 2),
        }];
        to_report("trace.json", "out", &summary, &warnings)
    }

    #[test]
    fn test_write_and_read_report() {
        let report = create_test_report();
        let temp_file = NamedTempFile::new().unwrap();

        write_report(&report, temp_file.path()).unwrap();
        let loaded = read_report(temp_file.path()).unwrap();

        assert_eq!(loaded.version, "1.0.0");
        assert_eq!(loaded.input, "trace.json");
        assert_eq!(loaded.summary, report.summary);
        assert_eq!(loaded.warnings, report.warnings);
        assert_eq!(loaded.warnings.len(), 1);
    }

    #[test]
    fn test_validate_output_path_empty() {
        assert!(validate_output_path(Path::new("")).is_err());
    }

    #[test]
    fn test_validate_output_path_directory() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert!(validate_output_path(temp_dir.path()).is_err());
    }

    #[test]
    fn test_write_creates_parent_dirs() {
        let temp_dir = tempfile::tempdir().unwrap();
        let nested_path = temp_dir.path().join("nested/dirs/report.json");

        write_report(&create_test_report(), &nested_path).unwrap();

        assert!(nested_path.exists());
    }
}
