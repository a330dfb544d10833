//! Implementation of the `rlink filter` command.
//!
//! Offline demultiplexing of a captured interpreter output file: the tag
//! protocol is stripped, visible text goes to stdout, progress updates go
//! to the optional progress file, and an error report captured anywhere in
//! the file surfaces as a script fault once the whole file was processed.

use crate::cli::FilterArgs;
use rlink::error::{Result, RlinkError};
use rlink::progress;
use rlink::protocol::TagFilter;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};

pub fn cmd_filter(args: FilterArgs) -> Result<()> {
    let file = File::open(&args.file).map_err(|e| {
        RlinkError::Config(format!(
            "failed to open output file '{}': {}",
            args.file.display(),
            e
        ))
    })?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let mut filter = TagFilter::new();

    for line in BufReader::new(file).lines() {
        let line = line.map_err(|e| {
            RlinkError::Resource(format!("failed to read '{}': {}", args.file.display(), e))
        })?;
        let filtered = filter
            .filter_line(line.trim_end_matches('\r'))
            .map_err(|e| RlinkError::Resource(e.to_string()))?;

        if let Some(value) = filtered.progress
            && let Some(path) = &args.progress_file
        {
            progress::set_progress(path, value)?;
        }
        if let Some(text) = filtered.visible {
            writeln!(out, "{}", text)
                .map_err(|e| RlinkError::Resource(format!("failed to write output: {}", e)))?;
        }
        if filtered.end_of_output {
            break;
        }
    }

    match filter.take_error_report() {
        Some(report) => Err(RlinkError::Script(report)),
        None => Ok(()),
    }
}
