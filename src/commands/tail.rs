//! Implementation of the `rlink tail` command.
//!
//! Follows a growing output file with the evaluation tailer: only lines
//! appended after start are demultiplexed and printed, until the
//! end-of-output sentinel arrives or the timeout expires.

use crate::cli::TailArgs;
use rlink::error::{Result, RlinkError};
use rlink::tailer;
use std::io;
use std::time::Duration;

pub fn cmd_tail(args: TailArgs) -> Result<()> {
    let handle = tailer::start(
        &args.file,
        Duration::from_millis(args.poll_ms.max(1)),
        Box::new(io::stdout()),
        args.progress_file.clone(),
    )
    .map_err(|e| {
        RlinkError::Config(format!("failed to tail '{}': {}", args.file.display(), e))
    })?;

    let outcome = handle
        .join(Duration::from_millis(args.timeout_ms))
        .ok_or_else(|| {
            RlinkError::Resource(format!(
                "no end-of-output sentinel within {}ms",
                args.timeout_ms
            ))
        })?;

    if let Some(failure) = outcome.failure {
        return Err(RlinkError::Resource(failure));
    }
    match outcome.error_report {
        Some(report) => Err(RlinkError::Script(report)),
        None => Ok(()),
    }
}
