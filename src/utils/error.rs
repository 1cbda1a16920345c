//! Error types for the entire application.
//!
//! We use `thiserror` for library-style errors with custom types,
//! and `anyhow` for application-level error propagation in main.rs and commands.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while parsing the input document.
///
/// All of these are fatal: the conversion stops before anything is written.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("I/O error while reading trace: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON deserialization failed: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid trace format: {0}")]
    InvalidFormat(String),

    #[error("Event {index}: missing required field '{field}'")]
    MissingField { index: usize, field: &'static str },

    #[error("Event {index}: invalid field '{field}': {reason}")]
    InvalidField {
        index: usize,
        field: &'static str,
        reason: String,
    },
}

/// Errors raised by a trace writer or while reading an archive back
#[derive(Error, Debug)]
pub enum WriterError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Output directory already exists and is not empty: {}", .0.display())]
    OutputExists(PathBuf),

    #[error("Definition written after the first event: {0}")]
    DefinitionsClosed(String),

    #[error("Reference to undefined {kind} {id}")]
    UndefinedReference { kind: &'static str, id: u32 },

    #[error("Invalid archive: {0}")]
    InvalidArchive(String),
}

/// Errors that abort a whole conversion
#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("Malformed input: {0}")]
    Parse(#[from] ParseError),

    #[error("Writing the archive failed at location {location}: {source}")]
    Write {
        location: u32,
        #[source]
        source: WriterError,
    },

    #[error("Writing definitions failed: {0}")]
    Definitions(#[source] WriterError),
}

/// Errors that can occur while writing or reading the JSON report
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("Failed to write report: {0}")]
    WriteFailed(#[source] std::io::Error),

    #[error("Failed to read report: {0}")]
    ReadFailed(#[source] std::io::Error),

    #[error("Failed to serialize report: {0}")]
    SerializationFailed(#[source] serde_json::Error),

    #[error("Invalid output path: {0}")]
    InvalidPath(String),
}
