//! chrome2otf2 CLI
//!
//! Converts Chrome trace JSON into OTF2-style trace archives.

use anyhow::Result;
use chrome2otf2::commands::{
    display_version, execute_convert, execute_inspect, validate_args, ConvertArgs,
};
use clap::{Parser, Subcommand};
use env_logger::Env;
use std::path::PathBuf;

/// chrome2otf2 - Chrome trace to OTF2 converter
#[derive(Parser, Debug)]
#[command(name = "chrome2otf2")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Convert a Chrome trace into an archive
    Convert {
        /// Chrome trace JSON file (optionally gzip-compressed)
        input: PathBuf,

        /// Archive directory to create
        output_dir: PathBuf,

        /// TensorFlow memory profile (`*.memory_profile.json[.gz]`) to merge
        #[arg(long)]
        memory_profile: Option<PathBuf>,

        /// Delete the output directory first if it exists
        #[arg(long)]
        clean: bool,

        /// Write a JSON conversion report to this file
        #[arg(long)]
        report: Option<PathBuf>,

        /// Print the conversion summary to stdout
        #[arg(long)]
        summary: bool,

        /// Keep the thread name metadata of pid 0 / tid 0
        #[arg(long)]
        keep_system_thread: bool,
    },

    /// Print the contents of an archive
    Inspect {
        /// Archive directory
        archive: PathBuf,

        /// Also list every event record
        #[arg(long)]
        events: bool,
    },

    /// Display version information
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    match cli.command {
        Commands::Convert {
            input,
            output_dir,
            memory_profile,
            clean,
            report,
            summary,
            keep_system_thread,
        } => {
            let args = ConvertArgs {
                input,
                output_dir,
                memory_profile,
                clean,
                report,
                print_summary: summary,
                ignore_system_thread: !keep_system_thread,
            };

            validate_args(&args)?;
            execute_convert(args)?;
        }

        Commands::Inspect { archive, events } => {
            execute_inspect(archive, events)?;
        }

        Commands::Version => {
            display_version();
        }
    }

    Ok(())
}
