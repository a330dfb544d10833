//! Evaluation orchestrator.
//!
//! [`EvalBridge`] owns one remote session and one output tailer for the
//! duration of an evaluation and sequences the run: create the output file,
//! start the tailer, prepare the session, syntax-check, submit, extract
//! results, tear down. Teardown is unconditional; every acquired resource
//! (session, tailer thread, output file) is released on every exit path.
//!
//! Two evaluation modes exist. Session evaluation is the normal path with
//! full binding transfer and output capture. Server evaluation delegates the
//! run to a separate asynchronous facility: no output file, no tailer, no
//! preparation, and the one-shot flag requesting it is cleared afterwards so
//! resumed executions default back to session evaluation.
//!
//! An error the script signaled through the tag protocol is never raised
//! mid-stream; it is converted into a fault only after teardown has
//! completed, so a failing script cannot leak the session or the tailer.

use crate::config::Config;
use crate::context::{self, DataSpaces, ExecutionContext, ExecutionRequest};
use crate::error::{Result, RlinkError};
use crate::events::{Event, EventAction, EventLog};
use crate::session::{CastTarget, RemoteSession, SessionProvider};
use crate::tailer::{self, OutputSink, TailerHandle};
use serde_json::{Value, json};
use std::env;
use std::fs::{self, File};
use std::path::PathBuf;

mod prepare;


/// Name of the output capture file inside the scratch space.
pub const OUTPUT_FILE_NAME: &str = ".rlink.out";

/// The output capture resources of one session evaluation.
struct Capture {
    tailer: TailerHandle,
    output_file: PathBuf,
}

/// Bridge between the scheduler and the remote interpreter.
///
/// Holds the session provider and configuration; each call to [`evaluate`]
/// obtains its own session, so concurrent evaluations are independent.
///
/// [`evaluate`]: EvalBridge::evaluate
#[derive(Debug)]
pub struct EvalBridge<P: SessionProvider> {
    provider: P,
    config: Config,
    events: EventLog,
}

impl<P: SessionProvider> EvalBridge<P> {
    /// Create a bridge over the given provider.
    ///
    /// Fails fast when the host runs tasks in forked per-task processes:
    /// session evaluation assumes a durable session shared by one
    /// long-lived host process, which fork-per-task execution violates.
    pub fn new(provider: P, config: Config) -> Result<Self> {
        if config.forked_executor {
            return Err(RlinkError::Config(
                "session evaluation cannot be used under a forked executor, \
                 check the host scheduler configuration"
                    .to_string(),
            ));
        }
        config.validate()?;
        let events = EventLog::new(config.event_log.clone());
        Ok(Self {
            provider,
            config,
            events,
        })
    }

    /// Evaluate one request against a fresh session.
    ///
    /// Blocks until the remote evaluation returns or raises; the session's
    /// textual output is concurrently filtered and forwarded to `sink` by
    /// the tailer thread. On return, whatever the outcome, the session is
    /// closed, the tailer joined, and the output file deleted.
    pub fn evaluate(
        &self,
        request: &ExecutionRequest,
        ctx: &mut ExecutionContext,
        sink: OutputSink,
    ) -> Result<Value> {
        let server_eval = ctx.server_eval();
        let task_id = ctx.task_id();

        let mut session = self
            .provider
            .connect()
            .map_err(|e| RlinkError::Config(format!("failed to connect session: {}", e)))?;

        self.events.append(
            &Event::new(EventAction::Submit)
                .with_task_opt(task_id.clone())
                .with_details(json!({
                    "mode": if server_eval { "server" } else { "session" },
                })),
        );

        let mut capture: Option<Capture> = None;
        let outcome = self.run(&mut session, request, ctx, server_eval, sink, &mut capture);

        if let Err(err) = &outcome {
            self.events.append(
                &Event::new(EventAction::EvalError)
                    .with_task_opt(task_id.clone())
                    .with_details(json!({"message": err.to_string()})),
            );
        }

        let report = self.teardown(&mut session, capture, server_eval, &task_id);

        // A tagged error report wins over the in-flight outcome: it carries
        // the interpreter's own message and call stack.
        match report {
            Some(message) => {
                self.events.append(
                    &Event::new(EventAction::ScriptError)
                        .with_task_opt(task_id)
                        .with_details(json!({"message": message})),
                );
                Err(RlinkError::Script(message))
            }
            None => {
                if outcome.is_ok() {
                    self.events
                        .append(&Event::new(EventAction::Complete).with_task_opt(task_id));
                }
                outcome
            }
        }
    }

    /// The fallible middle of an evaluation, between connect and teardown.
    fn run<S: RemoteSession>(
        &self,
        session: &mut S,
        request: &ExecutionRequest,
        ctx: &mut ExecutionContext,
        server_eval: bool,
        sink: OutputSink,
        capture: &mut Option<Capture>,
    ) -> Result<Value> {
        if !server_eval {
            let output_file = create_output_file(&ctx.spaces)?;
            let tailer = match tailer::start(
                &output_file,
                self.config.tailer_poll_interval(),
                sink,
                ctx.progress_file(),
            ) {
                Ok(handle) => handle,
                Err(e) => {
                    let _ = fs::remove_file(&output_file);
                    return Err(RlinkError::Config(format!(
                        "failed to start output tailer on '{}': {}",
                        output_file.display(),
                        e
                    )));
                }
            };
            *capture = Some(Capture {
                tailer,
                output_file: output_file.clone(),
            });

            session.open_output(&output_file)?;
            prepare::prepare_execution(session, request, ctx)?;
        }

        // A parse fault short-circuits; the script is never submitted.
        session.check_syntax(&request.script)?;

        let evaluated = session.evaluate(&request.script)?;

        let resolved = self.resolve_result(session, server_eval, evaluated)?;
        ctx.bindings
            .insert(context::RESULT_VARIABLE.to_string(), resolved.clone());

        if !server_eval {
            for name in [
                context::SELECTION_VARIABLE,
                context::LOOP_VARIABLE,
                context::BRANCH_VARIABLE,
                context::REPLICATE_RUNS_VARIABLE,
            ] {
                read_back_variable(session, ctx, name)?;
            }
            refresh_variables(session, ctx)?;
            refresh_result_metadata(session, ctx)?;
            refresh_result_map(session, ctx)?;
        } else {
            // Server evaluation is for one task only; it must not propagate
            // to later executions.
            ctx.clear_server_eval();
        }

        Ok(resolved)
    }

    /// Resolve the evaluation result.
    ///
    /// A `result` variable explicitly set inside the session wins over the
    /// value returned by the evaluation; when both are absent the run
    /// reports plain success. Server evaluation delegates the actual run
    /// elsewhere, so the submission itself always reports success.
    fn resolve_result<S: RemoteSession>(
        &self,
        session: &mut S,
        server_eval: bool,
        evaluated: Value,
    ) -> Result<Value> {
        if server_eval {
            return Ok(Value::Bool(true));
        }
        let resolved = match session.get(context::RESULT_VARIABLE)? {
            Some(explicit) => session.cast(explicit, CastTarget::Any)?,
            None => session.cast(evaluated, CastTarget::Any)?,
        };
        if resolved.is_null() {
            return Ok(Value::Bool(true));
        }
        Ok(resolved)
    }

    /// Release every resource of the evaluation, tolerating step failures.
    ///
    /// Returns the error report captured by the tailer, if any. Failures
    /// here are logged as anomalies and never abort the remaining steps.
    fn teardown<S: RemoteSession>(
        &self,
        session: &mut S,
        capture: Option<Capture>,
        server_eval: bool,
        task_id: &Option<String>,
    ) -> Option<String> {
        if let Err(e) = session.close_output() {
            self.cleanup_warning(task_id, "close_output", &e.to_string());
        }

        if !server_eval {
            // Leave the session in a neutral directory so the scratch space
            // can be reclaimed.
            let neutral = context::to_remote_path(env::temp_dir());
            if let Err(e) = session.evaluate(&format!("setwd('{}')", neutral)) {
                self.cleanup_warning(task_id, "reset_workdir", &e.to_string());
            }
        }

        if let Err(e) = session.close() {
            self.cleanup_warning(task_id, "close_session", &e.to_string());
        }

        let mut report = None;
        if let Some(Capture {
            tailer,
            output_file,
        }) = capture
        {
            match tailer.join(self.config.tailer_join_timeout()) {
                Some(outcome) => {
                    if let Some(failure) = outcome.failure {
                        self.events.append(
                            &Event::new(EventAction::TailerFailure)
                                .with_task_opt(task_id.clone())
                                .with_details(json!({"message": failure})),
                        );
                    }
                    report = outcome.error_report;
                }
                None => {
                    self.events.append(
                        &Event::new(EventAction::TailerTimeout)
                            .with_task_opt(task_id.clone())
                            .with_details(json!({
                                "timeout_ms": self.config.tailer_join_timeout_ms,
                            })),
                    );
                }
            }

            if output_file.exists() {
                if let Err(e) = fs::remove_file(&output_file) {
                    self.cleanup_warning(task_id, "delete_output_file", &e.to_string());
                }
            } else {
                self.events.append(
                    &Event::new(EventAction::MissingOutputFile)
                        .with_task_opt(task_id.clone())
                        .with_details(json!({
                            "path": output_file.display().to_string(),
                        })),
                );
            }
        }
        report
    }

    fn cleanup_warning(&self, task_id: &Option<String>, step: &str, message: &str) {
        self.events.append(
            &Event::new(EventAction::CleanupFailure)
                .with_task_opt(task_id.clone())
                .with_details(json!({"step": step, "message": message})),
        );
    }
}

/// Create the output capture file, fresh, in the scratch space.
///
/// Falls back to the system temp directory when no usable scratch space was
/// supplied.
fn create_output_file(spaces: &DataSpaces) -> Result<PathBuf> {
    let dir = spaces
        .scratch
        .clone()
        .filter(|p| p.is_dir())
        .unwrap_or_else(env::temp_dir);
    let path = dir.join(OUTPUT_FILE_NAME);

    if path.exists() {
        fs::remove_file(&path).map_err(|e| {
            RlinkError::Config(format!(
                "failed to remove stale output file '{}': {}",
                path.display(),
                e
            ))
        })?;
    }
    File::create(&path).map_err(|e| {
        RlinkError::Config(format!(
            "failed to create output file '{}': {}",
            path.display(),
            e
        ))
    })?;
    Ok(path)
}

/// Read one variable back from the session into the context bindings, if
/// the script assigned it.
fn read_back_variable<S: RemoteSession>(
    session: &mut S,
    ctx: &mut ExecutionContext,
    name: &str,
) -> Result<()> {
    if let Some(value) = session.get(name)? {
        let value = session.cast(value, CastTarget::Any)?;
        ctx.bindings.insert(name.to_string(), value);
    }
    Ok(())
}

/// Merge the session's job variables map back into the context.
fn refresh_variables<S: RemoteSession>(
    session: &mut S,
    ctx: &mut ExecutionContext,
) -> Result<()> {
    if let Some(value) = session.get(context::VARIABLES_BINDING)? {
        if let Value::Object(map) = session.cast(value, CastTarget::Map)? {
            for (k, v) in map {
                ctx.variables.insert(k, v);
            }
        }
    }
    Ok(())
}

/// Merge the session's result metadata map back into the context.
fn refresh_result_metadata<S: RemoteSession>(
    session: &mut S,
    ctx: &mut ExecutionContext,
) -> Result<()> {
    if let Some(value) = session.get(context::RESULT_METADATA_BINDING)? {
        if let Value::Object(map) = session.cast(value, CastTarget::Map)? {
            for (k, v) in map {
                let text = match v {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                ctx.result_metadata.insert(k, text);
            }
        }
    }
    Ok(())
}

/// Merge the session's result map back into the context.
fn refresh_result_map<S: RemoteSession>(
    session: &mut S,
    ctx: &mut ExecutionContext,
) -> Result<()> {
    if let Some(value) = session.get(context::RESULT_MAP_BINDING)? {
        if let Value::Object(map) = session.cast(value, CastTarget::Map)? {
            for (k, v) in map {
                ctx.result_map.insert(k, v);
            }
        }
    }
    Ok(())
}
