//! Command implementations for rlink.
//!
//! This module provides the dispatcher that routes CLI commands to their
//! implementations.

mod filter;
mod tail;

use crate::cli::Command;
use rlink::error::Result;

/// Dispatch a command to its implementation.
pub fn dispatch(command: Command) -> Result<()> {
    match command {
        Command::Filter(args) => filter::cmd_filter(args),
        Command::Tail(args) => tail::cmd_tail(args),
    }
}
