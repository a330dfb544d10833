//! Execution request and context types.
//!
//! An [`ExecutionRequest`] carries the per-run inputs: the script, its
//! positional arguments, and results of prior tasks. The mutable
//! [`ExecutionContext`] is the scheduler-owned named-value store the bridge
//! reads before an evaluation and writes back into afterwards: job
//! variables, result metadata, the result map, data space paths, and the
//! output bindings of the run.

use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

// ============================================================================
// Reserved keys of the context variables map
// ============================================================================

/// Variable selecting server-side evaluation for the next run (one-shot).
pub const SERVER_EVAL_VARIABLE: &str = "rlink.servereval";

/// Variable holding the path of the task progress file.
pub const PROGRESS_FILE_VARIABLE: &str = "task.progress.file";

/// Variable holding the identifier of the task being evaluated.
pub const TASK_ID_VARIABLE: &str = "task.id";

// ============================================================================
// Binding names inside the remote session
// ============================================================================

/// Remote variable whose value, when set by the script, becomes the result.
pub const RESULT_VARIABLE: &str = "result";

/// Remote variable carrying a selection script's verdict.
pub const SELECTION_VARIABLE: &str = "selected";

/// Remote variable carrying a loop-control decision.
pub const LOOP_VARIABLE: &str = "loop";

/// Remote variable carrying a branch selection.
pub const BRANCH_VARIABLE: &str = "branch";

/// Remote variable carrying a replication count.
pub const REPLICATE_RUNS_VARIABLE: &str = "runs";

/// Remote variable receiving the script's positional arguments.
pub const ARGUMENTS_VARIABLE: &str = "args";

/// Remote variable receiving the named results of prior tasks.
pub const RESULTS_VARIABLE: &str = "results";

/// Remote variable mirroring the job variables map.
pub const VARIABLES_BINDING: &str = "variables";

/// Remote variable mirroring the result metadata map.
pub const RESULT_METADATA_BINDING: &str = "resultMetadata";

/// Remote variable mirroring the result map.
pub const RESULT_MAP_BINDING: &str = "resultMap";

/// Remote variable receiving the scratch space path.
pub const LOCAL_SPACE_VARIABLE: &str = "localspace";

/// Remote variable receiving the user space path.
pub const USER_SPACE_VARIABLE: &str = "userspace";

/// Remote variable receiving the global space path.
pub const GLOBAL_SPACE_VARIABLE: &str = "globalspace";

/// Remote variable receiving the input space path.
pub const INPUT_SPACE_VARIABLE: &str = "inputspace";

/// Remote variable receiving the output space path.
pub const OUTPUT_SPACE_VARIABLE: &str = "outputspace";

/// One evaluation to submit.
#[derive(Debug, Clone, Default)]
pub struct ExecutionRequest {
    /// The script text to evaluate.
    pub script: String,
    /// Positional arguments exposed to the script.
    pub arguments: Vec<String>,
    /// Results of prior tasks, in scheduling order.
    pub prior_results: Vec<TaskResult>,
}

/// The result of a previously completed task.
///
/// Retrieval can fail on the scheduler side; the failure is carried here and
/// mapped to an absent value when the results are transferred into the
/// session, never propagated as a fault of the current run.
#[derive(Debug, Clone)]
pub struct TaskResult {
    /// The task's readable name.
    pub name: String,
    /// The value, or the retrieval failure message.
    pub value: std::result::Result<Value, String>,
}

/// Data space locations supplied by the scheduler.
#[derive(Debug, Clone, Default)]
pub struct DataSpaces {
    /// Node-local scratch directory; also hosts the output capture file.
    pub scratch: Option<PathBuf>,
    /// User space path.
    pub user: Option<String>,
    /// Global space path.
    pub global: Option<String>,
    /// Input space path.
    pub input: Option<String>,
    /// Output space path.
    pub output: Option<String>,
}

/// The scheduler's mutable named-value store for one task.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    /// Job variables, shared across the tasks of a job.
    pub variables: BTreeMap<String, Value>,
    /// Metadata attached to the task result.
    pub result_metadata: BTreeMap<String, String>,
    /// The job-level result map.
    pub result_map: BTreeMap<String, Value>,
    /// Data space locations.
    pub spaces: DataSpaces,
    /// Output bindings written back by the bridge after evaluation
    /// (result, selection, flow-control variables).
    pub bindings: BTreeMap<String, Value>,
}

impl ExecutionContext {
    /// Whether the next run was flagged for server-side evaluation.
    ///
    /// The flag is a reserved job variable; both the boolean `true` and the
    /// string `"true"` select server evaluation.
    pub fn server_eval(&self) -> bool {
        match self.variables.get(SERVER_EVAL_VARIABLE) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s == "true",
            _ => false,
        }
    }

    /// Clear the one-shot server evaluation flag.
    ///
    /// Server evaluation is for one task only; later resumed executions
    /// default back to session evaluation.
    pub fn clear_server_eval(&mut self) {
        self.variables
            .insert(SERVER_EVAL_VARIABLE.to_string(), Value::String("false".to_string()));
    }

    /// Path of the task progress file, if the scheduler configured one.
    pub fn progress_file(&self) -> Option<PathBuf> {
        match self.variables.get(PROGRESS_FILE_VARIABLE) {
            Some(Value::String(s)) if !s.is_empty() => Some(PathBuf::from(s)),
            _ => None,
        }
    }

    /// Identifier of the task being evaluated, if known.
    pub fn task_id(&self) -> Option<String> {
        match self.variables.get(TASK_ID_VARIABLE) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            _ => None,
        }
    }
}

/// Normalize a path for the remote interpreter.
///
/// The interpreter's path parser treats backslashes as escape characters, so
/// every path crossing into the session uses forward slashes regardless of
/// the host platform.
pub fn to_remote_path<P: AsRef<Path>>(path: P) -> String {
    path.as_ref().to_string_lossy().replace('\\', "/")
}
