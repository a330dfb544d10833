//! Error types for rlink.
//!
//! Uses thiserror for derive macros. Every fault class maps to a distinct
//! exit code so callers embedding the CLI can distinguish them.

use crate::exit_codes;
use crate::session::SessionError;
use thiserror::Error;

/// Main error type for rlink operations.
///
/// The variants mirror the fault classes of an evaluation:
/// configuration problems surface before submission, syntax faults
/// short-circuit evaluation, evaluation faults come from the remote call
/// itself, and script faults are raised by the script through the tag
/// protocol after teardown has completed.
#[derive(Error, Debug)]
pub enum RlinkError {
    /// Missing or invalid execution context, unusable output file location,
    /// or a session that could not be established.
    #[error("{0}")]
    Config(String),

    /// The script failed the pre-submission syntax check.
    #[error("syntax check failed: {0}")]
    Syntax(String),

    /// The remote evaluation call raised.
    #[error("evaluation failed: {0}")]
    Eval(String),

    /// The script explicitly signaled an error through the tag protocol.
    /// The message is the report text exactly as the interpreter emitted it.
    #[error("{0}")]
    Script(String),

    /// Tailer read failure, thread join timeout, or file cleanup failure.
    #[error("{0}")]
    Resource(String),
}

impl RlinkError {
    /// Returns the appropriate exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            RlinkError::Config(_) => exit_codes::CONFIG_FAILURE,
            RlinkError::Syntax(_) => exit_codes::SYNTAX_FAILURE,
            RlinkError::Eval(_) => exit_codes::EVAL_FAILURE,
            RlinkError::Script(_) => exit_codes::SCRIPT_FAILURE,
            RlinkError::Resource(_) => exit_codes::RESOURCE_FAILURE,
        }
    }
}

impl From<SessionError> for RlinkError {
    /// A session-level syntax fault keeps its class; every other session
    /// failure surfaces as an evaluation fault.
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Syntax(msg) => RlinkError::Syntax(msg),
            other => RlinkError::Eval(other.to_string()),
        }
    }
}

/// Result type alias for rlink operations.
pub type Result<T> = std::result::Result<T, RlinkError>;
