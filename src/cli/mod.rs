//! CLI argument parsing for rlink.
//!
//! Uses clap derive macros for declarative argument definitions.
//! This module defines the command structure; actual implementations
//! are in the `commands` module.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Rlink: remote evaluation bridge for out-of-process interpreter sessions.
///
/// The CLI operates on interpreter output capture files, the side-channel
/// the bridge tails during an evaluation:
/// - `filter` demultiplexes a captured file offline
/// - `tail` follows a growing file live, exactly as an evaluation would
#[derive(Parser, Debug)]
#[command(name = "rlink")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands for rlink.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Demultiplex a captured output file.
    ///
    /// Reads the whole file, strips the tag protocol, and prints the
    /// visible text to stdout. Exits with the script fault code if the
    /// capture contains an error report.
    Filter(FilterArgs),

    /// Follow a growing output file.
    ///
    /// Tails the file with the same machinery evaluations use: only lines
    /// appended after start are shown, until the end-of-output sentinel
    /// arrives or the timeout expires.
    Tail(TailArgs),
}

/// Arguments for the `filter` command.
#[derive(Parser, Debug)]
pub struct FilterArgs {
    /// Captured output file to read.
    pub file: PathBuf,

    /// Write progress updates to this file as they are encountered.
    #[arg(long)]
    pub progress_file: Option<PathBuf>,
}

/// Arguments for the `tail` command.
#[derive(Parser, Debug)]
pub struct TailArgs {
    /// Output file to follow.
    pub file: PathBuf,

    /// Write progress updates to this file as they are encountered.
    #[arg(long)]
    pub progress_file: Option<PathBuf>,

    /// Poll interval in milliseconds.
    #[arg(long, default_value_t = 100)]
    pub poll_ms: u64,

    /// Give up after this many milliseconds without the sentinel.
    #[arg(long, default_value_t = 60_000)]
    pub timeout_ms: u64,
}

impl Cli {
    /// Parse command line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
