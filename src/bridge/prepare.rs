//! Context preparation: transfers named values into the session before the
//! script is submitted.
//!
//! The transfer order is fixed: verbose warnings, the tag-emitting error
//! hook, positional arguments, the progress function, prior task results,
//! the scratch directory (assigned and made the working directory), the
//! remaining data space paths, the job variables map, and the result
//! metadata map. Skipped entirely in server evaluation mode.

use crate::context::{self, ExecutionContext, ExecutionRequest, to_remote_path};
use crate::error::Result;
use crate::protocol::{ERROR_TAG_BEGIN, ERROR_TAG_END, TASK_PROGRESS_MSG};
use crate::session::RemoteSession;
use serde_json::{Map, Value};
use std::path::Path;

/// Placeholder entry substituted for an empty metadata map.
const METADATA_PLACEHOLDER_KEY: &str = "r.result";

pub(crate) fn prepare_execution<S: RemoteSession>(
    session: &mut S,
    request: &ExecutionRequest,
    ctx: &ExecutionContext,
) -> Result<()> {
    enable_warnings(session)?;
    install_error_hook(session)?;
    assign_arguments(session, request)?;
    install_progress_hook(session, ctx)?;
    assign_prior_results(session, request)?;
    assign_local_space(session, ctx)?;
    assign_space(session, context::USER_SPACE_VARIABLE, &ctx.spaces.user)?;
    assign_space(session, context::GLOBAL_SPACE_VARIABLE, &ctx.spaces.global)?;
    assign_space(session, context::INPUT_SPACE_VARIABLE, &ctx.spaces.input)?;
    assign_space(session, context::OUTPUT_SPACE_VARIABLE, &ctx.spaces.output)?;
    assign_variables(session, ctx)?;
    assign_result_metadata(session, ctx)?;
    Ok(())
}

/// Turn warnings on so they reach the output stream as they happen.
fn enable_warnings<S: RemoteSession>(session: &mut S) -> Result<()> {
    session.evaluate("options(warn=1)")?;
    Ok(())
}

/// Install the error hook that wraps interpreter errors in the protocol
/// tags, message first, then the call stack.
fn install_error_hook<S: RemoteSession>(session: &mut S) -> Result<()> {
    let hook = format!(
        "options(error = function() {{ calls <- sys.calls(); calls <- calls[1:length(calls)-1]; \
         cat('{}', geterrmessage(), 'Call Stack :', paste(rev(calls), collapse = '\\n'), '{}', sep = '\\n') }})",
        ERROR_TAG_BEGIN, ERROR_TAG_END
    );
    session.evaluate(&hook)?;
    Ok(())
}

/// Expose the script's positional arguments.
fn assign_arguments<S: RemoteSession>(session: &mut S, request: &ExecutionRequest) -> Result<()> {
    if request.arguments.is_empty() {
        return Ok(());
    }
    session.set(
        context::ARGUMENTS_VARIABLE,
        Value::from(request.arguments.clone()),
    )?;
    Ok(())
}

/// Define the progress function, which emits tagged progress lines into the
/// output stream. Only installed when the scheduler configured a progress
/// file for the task.
fn install_progress_hook<S: RemoteSession>(
    session: &mut S,
    ctx: &ExecutionContext,
) -> Result<()> {
    if ctx.progress_file().is_none() {
        return Ok(());
    }
    let hook = format!(
        ".set_progress <- function(x) {{ message('{}=', as.integer(x), appendLF = TRUE) }}",
        TASK_PROGRESS_MSG
    );
    session.evaluate(&hook)?;
    Ok(())
}

/// Expose prior task results as a named map, in scheduling order.
///
/// A result whose value could not be retrieved maps to an absent value;
/// retrieval failures of past tasks are not faults of this run.
fn assign_prior_results<S: RemoteSession>(
    session: &mut S,
    request: &ExecutionRequest,
) -> Result<()> {
    if request.prior_results.is_empty() {
        return Ok(());
    }
    let mut results = Map::new();
    for prior in &request.prior_results {
        let value = match &prior.value {
            Ok(v) => v.clone(),
            Err(_) => Value::Null,
        };
        results.insert(prior.name.clone(), value);
    }
    session.set(context::RESULTS_VARIABLE, Value::Object(results))?;
    Ok(())
}

/// Assign the scratch space and make it the session's working directory,
/// but only when it actually exists and is writable.
fn assign_local_space<S: RemoteSession>(session: &mut S, ctx: &ExecutionContext) -> Result<()> {
    let Some(scratch) = &ctx.spaces.scratch else {
        return Ok(());
    };
    if !is_writable_dir(scratch) {
        return Ok(());
    }
    let remote = to_remote_path(scratch);
    session.evaluate(&format!("setwd('{}')", remote))?;
    session.set(context::LOCAL_SPACE_VARIABLE, Value::String(remote))?;
    Ok(())
}

fn is_writable_dir(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.is_dir() && !m.permissions().readonly())
        .unwrap_or(false)
}

/// Expose one data space path, normalized for the remote path parser.
fn assign_space<S: RemoteSession>(
    session: &mut S,
    name: &str,
    space: &Option<String>,
) -> Result<()> {
    let Some(space) = space else {
        return Ok(());
    };
    session.set(name, Value::String(to_remote_path(space)))?;
    Ok(())
}

/// Mirror the job variables map into the session.
fn assign_variables<S: RemoteSession>(session: &mut S, ctx: &ExecutionContext) -> Result<()> {
    let variables: Map<String, Value> = ctx
        .variables
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    session.set(context::VARIABLES_BINDING, Value::Object(variables))?;
    Ok(())
}

/// Mirror the result metadata map into the session.
///
/// An empty map would cross the boundary as an absent value; a placeholder
/// entry keeps "empty" and "absent" distinguishable on the remote side.
fn assign_result_metadata<S: RemoteSession>(session: &mut S, ctx: &ExecutionContext) -> Result<()> {
    let mut metadata = Map::new();
    for (k, v) in &ctx.result_metadata {
        metadata.insert(k.clone(), Value::String(v.clone()));
    }
    if metadata.is_empty() {
        metadata.insert(
            METADATA_PLACEHOLDER_KEY.to_string(),
            Value::String("true".to_string()),
        );
    }
    session.set(context::RESULT_METADATA_BINDING, Value::Object(metadata))?;
    Ok(())
}
