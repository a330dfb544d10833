//! Shared test fixtures: an in-memory session backend and a capturing sink.

use crate::protocol::OUTPUT_END;
use crate::session::{
    CastTarget, RemoteSession, SessionError, SessionProvider, SessionResult, coerce,
};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// An output sink tests can read back after the tailer thread wrote to it.
#[derive(Clone, Default)]
pub(crate) struct SharedSink(Arc<Mutex<Vec<u8>>>);

impl SharedSink {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).to_string()
    }
}

impl Write for SharedSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Observable state of a [`FakeSession`], shared with its provider so tests
/// can inspect it after the bridge has consumed the session.
#[derive(Debug, Clone, Default)]
pub(crate) struct FakeSessionState {
    /// Every call, in order, as `"<operation>: <detail>"`.
    pub journal: Vec<String>,
    /// Variables bound inside the session.
    pub remote_vars: BTreeMap<String, Value>,
    /// File the session mirrors its output into, once attached.
    pub output_path: Option<PathBuf>,
    /// Whether the output stream was terminated.
    pub output_closed: bool,
    /// Whether the session was disconnected.
    pub closed: bool,
}

/// Scripted behavior of a [`FakeSession`].
#[derive(Debug, Default)]
pub(crate) struct FakeBehavior {
    /// Fail `connect` with this transport error.
    pub connect_error: Option<String>,
    /// Fail `check_syntax` with this message.
    pub syntax_error: Option<String>,
    /// Fail evaluation of the submitted script with this message.
    pub eval_error: Option<String>,
    /// Value returned by evaluating the submitted script.
    pub eval_result: Value,
    /// Lines the script "prints": appended to the output file during
    /// evaluation, as the real interpreter would as a side effect.
    pub output_lines: Vec<String>,
    /// Variables the script assigns during evaluation.
    pub eval_sets: Vec<(String, Value)>,
    /// Delete the output file mid-evaluation, simulating external removal.
    pub delete_output_during_eval: bool,
}

/// Provider handing out fakes that all share one observable state.
#[derive(Debug)]
pub(crate) struct FakeProvider {
    pub state: Arc<Mutex<FakeSessionState>>,
    behavior: Arc<FakeBehavior>,
}

impl FakeProvider {
    pub(crate) fn new(behavior: FakeBehavior) -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeSessionState::default())),
            behavior: Arc::new(behavior),
        }
    }

    /// Pre-bind a variable inside the (future) session.
    pub(crate) fn with_remote_var(self, name: &str, value: Value) -> Self {
        self.state
            .lock()
            .unwrap()
            .remote_vars
            .insert(name.to_string(), value);
        self
    }

    pub(crate) fn snapshot(&self) -> FakeSessionState {
        self.state.lock().unwrap().clone()
    }
}

impl SessionProvider for FakeProvider {
    type Session = FakeSession;

    fn connect(&self) -> SessionResult<FakeSession> {
        if let Some(msg) = &self.behavior.connect_error {
            return Err(SessionError::Transport(msg.clone()));
        }
        Ok(FakeSession {
            state: Arc::clone(&self.state),
            behavior: Arc::clone(&self.behavior),
        })
    }
}

/// In-memory stand-in for a remote interpreter session.
pub(crate) struct FakeSession {
    state: Arc<Mutex<FakeSessionState>>,
    behavior: Arc<FakeBehavior>,
}

/// Code the bridge sends for its own housekeeping, as opposed to the
/// submitted script.
fn is_helper_code(code: &str) -> bool {
    code.starts_with("options(") || code.starts_with("setwd(") || code.starts_with(".set_progress")
}

fn append_lines(path: &Path, lines: &[String]) {
    if !path.exists() {
        return;
    }
    let mut file = OpenOptions::new().append(true).open(path).unwrap();
    for line in lines {
        writeln!(file, "{}", line).unwrap();
    }
    file.sync_all().unwrap();
}

impl RemoteSession for FakeSession {
    fn evaluate(&mut self, code: &str) -> SessionResult<Value> {
        let mut state = self.state.lock().unwrap();
        state.journal.push(format!("evaluate: {}", code));
        if is_helper_code(code) {
            return Ok(Value::Null);
        }

        // The submitted script: replay its side effects.
        if let Some(path) = state.output_path.clone() {
            append_lines(&path, &self.behavior.output_lines);
            if self.behavior.delete_output_during_eval {
                let _ = std::fs::remove_file(&path);
            }
        }
        for (name, value) in &self.behavior.eval_sets {
            state.remote_vars.insert(name.clone(), value.clone());
        }
        if let Some(msg) = &self.behavior.eval_error {
            return Err(SessionError::Eval(msg.clone()));
        }
        Ok(self.behavior.eval_result.clone())
    }

    fn check_syntax(&mut self, code: &str) -> SessionResult<()> {
        let mut state = self.state.lock().unwrap();
        state.journal.push(format!("check_syntax: {}", code));
        if let Some(msg) = &self.behavior.syntax_error {
            return Err(SessionError::Syntax(msg.clone()));
        }
        Ok(())
    }

    fn set(&mut self, name: &str, value: Value) -> SessionResult<()> {
        let mut state = self.state.lock().unwrap();
        state.journal.push(format!("set: {}={}", name, value));
        state.remote_vars.insert(name.to_string(), value);
        Ok(())
    }

    fn get(&mut self, name: &str) -> SessionResult<Option<Value>> {
        let mut state = self.state.lock().unwrap();
        state.journal.push(format!("get: {}", name));
        Ok(state.remote_vars.get(name).cloned())
    }

    fn cast(&mut self, value: Value, target: CastTarget) -> SessionResult<Value> {
        coerce(value, target)
    }

    fn open_output(&mut self, path: &Path) -> SessionResult<()> {
        let mut state = self.state.lock().unwrap();
        state.journal.push(format!("open_output: {}", path.display()));
        state.output_path = Some(path.to_path_buf());
        Ok(())
    }

    fn close_output(&mut self) -> SessionResult<()> {
        let mut state = self.state.lock().unwrap();
        state.journal.push("close_output".to_string());
        state.output_closed = true;
        if let Some(path) = state.output_path.clone() {
            append_lines(&path, &[OUTPUT_END.to_string()]);
        }
        Ok(())
    }

    fn close(&mut self) -> SessionResult<()> {
        let mut state = self.state.lock().unwrap();
        state.journal.push("close".to_string());
        state.closed = true;
        Ok(())
    }
}
