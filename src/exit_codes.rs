//! Exit code constants for the rlink CLI.
//!
//! One code per fault class:
//! - 0: Success
//! - 1: Configuration fault (bad context, unusable output location, connection)
//! - 2: Syntax fault (script failed the pre-submission parse check)
//! - 3: Evaluation fault (the remote call itself raised)
//! - 4: Script fault (the script signaled an error through the tag protocol)
//! - 5: Resource fault (tailer, join timeout, or cleanup failure)

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// Configuration fault: invalid context, config file, or output file location.
pub const CONFIG_FAILURE: i32 = 1;

/// Syntax fault: the script is unparsable.
pub const SYNTAX_FAILURE: i32 = 2;

/// Evaluation fault: the remote evaluation call raised.
pub const EVAL_FAILURE: i32 = 3;

/// Script fault: the script itself signaled an error.
pub const SCRIPT_FAILURE: i32 = 4;

/// Resource fault: tailer read failure, join timeout, or cleanup failure.
pub const RESOURCE_FAILURE: i32 = 5;
