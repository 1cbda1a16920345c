//! Convert command implementation.
//!
//! The convert command:
//! 1. Reads the trace file and optional memory profile (plain or gzip JSON)
//! 2. Builds the timeline and resolves definitions
//! 3. Creates the archive directory
//! 4. Emits definitions and event streams
//! 5. Writes the optional JSON report

use crate::converter::{prepare_with_memory_profile, ConversionSummary, ConverterOptions};
use crate::output::{to_report, write_report, ArchiveWriter};
use crate::parser::{open_memory_profile, open_trace_file};
use crate::timeline::TimelineOptions;
use anyhow::{Context, Result};
use log::{debug, info};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Arguments for the convert command
///
/// **Public** - used by main.rs to construct from CLI args
#[derive(Debug, Clone)]
pub struct ConvertArgs {
    /// Chrome trace JSON file
    pub input: PathBuf,

    /// Archive directory to create
    pub output_dir: PathBuf,

    /// TensorFlow memory profile to merge (optional)
    pub memory_profile: Option<PathBuf>,

    /// Delete `output_dir` before writing
    pub clean: bool,

    /// Output path for the JSON report (optional)
    pub report: Option<PathBuf>,

    /// Print the summary to stdout
    pub print_summary: bool,

    /// Drop the thread name of the (0, 0) system pair
    pub ignore_system_thread: bool,
}

impl Default for ConvertArgs {
    fn default() -> Self {
        Self {
            input: PathBuf::from("trace.json"),
            output_dir: PathBuf::from("trace_otf2"),
            memory_profile: None,
            clean: false,
            report: None,
            print_summary: false,
            ignore_system_thread: true,
        }
    }
}

/// Execute the convert command
///
/// **Public** - main entry point called from main.rs
///
/// # Errors
/// * Input file missing or malformed (nothing is written)
/// * Output directory exists and is not empty without `clean`
/// * File write errors
pub fn execute_convert(args: ConvertArgs) -> Result<ConversionSummary> {
    let start_time = Instant::now();

    info!("Converting {} -> {}", args.input.display(), args.output_dir.display());

    info!("Step 1/5: Reading trace...");
    let document = open_trace_file(&args.input)
        .with_context(|| format!("Failed to read trace {}", args.input.display()))?;
    debug!("Trace holds {} events", document.len());

    let memory_profile = match &args.memory_profile {
        Some(path) => {
            let profile = open_memory_profile(path).with_context(|| {
                format!("Failed to read memory profile {}", path.display())
            })?;
            debug!(
                "Memory profile holds {} allocators, {} snapshots",
                profile.allocators.len(),
                profile.snapshot_count()
            );
            Some(profile)
        }
        None => None,
    };

    info!("Step 2/5: Building timeline and definitions...");
    let options = ConverterOptions {
        timeline: TimelineOptions {
            ignore_system_thread: args.ignore_system_thread,
        },
    };
    let prepared = prepare_with_memory_profile(&document, memory_profile.as_ref(), &options)
        .context("Failed to convert trace events")?;

    info!("Step 3/5: Creating archive...");
    if args.clean {
        clean_output_dir(&args.output_dir)?;
    }
    let mut writer = ArchiveWriter::create(&args.output_dir)
        .with_context(|| format!("Failed to create archive {}", args.output_dir.display()))?;

    info!("Step 4/5: Writing events...");
    let summary = prepared
        .emit(&mut writer)
        .context("Failed to write archive")?;
    summary.log();

    match &args.report {
        Some(path) => {
            info!("Step 5/5: Writing report...");
            let report = to_report(
                &args.input.display().to_string(),
                &args.output_dir.display().to_string(),
                &summary,
                prepared.timeline().warnings(),
            );
            write_report(&report, path).context("Failed to write conversion report")?;
            info!("✓ Report written to: {}", path.display());
        }
        None => info!("Step 5/5: Skipping report (not requested)"),
    }

    if args.print_summary {
        println!("\n{}", "=".repeat(60));
        println!("CONVERSION SUMMARY");
        println!("{}", "=".repeat(60));
        println!("Input:  {}", args.input.display());
        println!("Output: {}", args.output_dir.display());
        println!("{}", summary);
        println!("{}", "=".repeat(60));
    }

    info!(
        "✓ Archive written to {} in {:.2}s",
        args.output_dir.display(),
        start_time.elapsed().as_secs_f64()
    );

    Ok(summary)
}

/// Validate convert arguments
///
/// **Public** - can be called before execute_convert for early validation
pub fn validate_args(args: &ConvertArgs) -> Result<()> {
    if args.input.as_os_str().is_empty() {
        anyhow::bail!("Input path cannot be empty");
    }

    if !args.input.is_file() {
        anyhow::bail!("Input file does not exist: {}", args.input.display());
    }

    if let Some(profile) = &args.memory_profile {
        if !profile.is_file() {
            anyhow::bail!("Memory profile does not exist: {}", profile.display());
        }
    }

    if args.output_dir.as_os_str().is_empty() {
        anyhow::bail!("Output directory cannot be empty");
    }

    if args.output_dir.is_file() {
        anyhow::bail!(
            "Output path is a file, not a directory: {}",
            args.output_dir.display()
        );
    }

    if let Some(report) = &args.report {
        if report.is_dir() {
            anyhow::bail!("Report path is a directory: {}", report.display());
        }
    }

    Ok(())
}

/// **Private** - removes a previous archive for `--clean`
fn clean_output_dir(path: &Path) -> Result<()> {
    if path.exists() {
        debug!("Removing existing output directory: {}", path.display());
        std::fs::remove_dir_all(path)
            .with_context(|| format!("Failed to remove {}", path.display()))?;
    }
    Ok(())
}
