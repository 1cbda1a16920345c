//! CLI command implementations.
//!
//! Each command is implemented in its own module.
//! Commands orchestrate the various library components to perform user tasks.

pub mod convert;
pub mod inspect;

// Re-export main command functions
pub use convert::{execute_convert, validate_args, ConvertArgs};
pub use inspect::{display_version, execute_inspect};
