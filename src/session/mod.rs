//! Remote session capability traits.
//!
//! The bridge never talks to a concrete interpreter transport. It consumes
//! the narrow [`RemoteSession`] interface: evaluate a chunk of code, check
//! its syntax, exchange named values, and manage the output side-channel.
//! Backends (a TCP Rserve-style transport, an in-memory fake for tests)
//! implement these traits; the orchestrator stays testable against either.
//!
//! Sessions are handed out by a [`SessionProvider`], constructed once per
//! host process and passed in explicitly. Each evaluation obtains its own
//! session from the provider and owns it until teardown.

use serde_json::Value;
use std::path::Path;
use thiserror::Error;

/// Failure raised by a session backend.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The submitted code failed the interpreter's parse check.
    #[error("{0}")]
    Syntax(String),

    /// The interpreter raised during evaluation.
    #[error("{0}")]
    Eval(String),

    /// A value could not be converted to the requested shape.
    #[error("cannot represent value as {target}: {value}")]
    Mismatch { target: &'static str, value: String },

    /// The connection to the interpreter process failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// Local I/O failure while managing the session.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type alias for session operations.
pub type SessionResult<T> = std::result::Result<T, SessionError>;

/// Target shape for a cross-language value conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastTarget {
    /// Keep the natural shape, unwrapping length-1 vectors to scalars.
    Any,
    /// A single boolean.
    Bool,
    /// A single integer.
    Int,
    /// A named map.
    Map,
}

impl CastTarget {
    fn name(self) -> &'static str {
        match self {
            CastTarget::Any => "any",
            CastTarget::Bool => "bool",
            CastTarget::Int => "int",
            CastTarget::Map => "map",
        }
    }
}

/// A live connection to an out-of-process interpreter.
///
/// All calls are synchronous. `evaluate` blocks until the interpreter
/// returns or raises; the textual output produced meanwhile is written by
/// the interpreter into the file registered via `open_output` and observed
/// concurrently by the tailer.
pub trait RemoteSession {
    /// Evaluate a chunk of code and return its value.
    fn evaluate(&mut self, code: &str) -> SessionResult<Value>;

    /// Check that a chunk of code parses, without evaluating it.
    ///
    /// Returns `SessionError::Syntax` if the code is unparsable.
    fn check_syntax(&mut self, code: &str) -> SessionResult<()>;

    /// Bind a named value inside the session.
    fn set(&mut self, name: &str, value: Value) -> SessionResult<()>;

    /// Read a named binding from the session, or `None` if absent.
    fn get(&mut self, name: &str) -> SessionResult<Option<Value>>;

    /// Convert a session value to the requested shape.
    fn cast(&mut self, value: Value, target: CastTarget) -> SessionResult<Value>;

    /// Mirror the session's textual output into the given file.
    fn open_output(&mut self, path: &Path) -> SessionResult<()>;

    /// Terminate the output stream, writing the end-of-output sentinel.
    ///
    /// A no-op when no output file was ever attached.
    fn close_output(&mut self) -> SessionResult<()>;

    /// Disconnect from the interpreter.
    fn close(&mut self) -> SessionResult<()>;
}

/// Hands out sessions, one per evaluation.
///
/// The provider holds the process-wide connection parameters; its lifetime
/// is the host process, but it is an ordinary value owned by the caller,
/// not ambient state.
pub trait SessionProvider {
    type Session: RemoteSession;

    /// Establish a fresh session.
    fn connect(&self) -> SessionResult<Self::Session>;
}

/// Default conversion rules shared by backends.
///
/// Interpreter values arrive as JSON: vectors as arrays, named lists as
/// objects. A length-1 array unwraps to its scalar first, mirroring how the
/// interpreter treats length-1 vectors interchangeably with scalars.
pub fn coerce(value: Value, target: CastTarget) -> SessionResult<Value> {
    let value = match value {
        Value::Array(mut items) if items.len() == 1 => items.remove(0),
        other => other,
    };

    let mismatch = |value: &Value| SessionError::Mismatch {
        target: target.name(),
        value: value.to_string(),
    };

    match target {
        CastTarget::Any => Ok(value),
        CastTarget::Bool => match &value {
            Value::Bool(_) => Ok(value),
            Value::String(s) if s.eq_ignore_ascii_case("true") => Ok(Value::Bool(true)),
            Value::String(s) if s.eq_ignore_ascii_case("false") => Ok(Value::Bool(false)),
            _ => Err(mismatch(&value)),
        },
        CastTarget::Int => match &value {
            Value::Number(n) if n.is_i64() => Ok(value),
            Value::Number(n) => n
                .as_f64()
                .filter(|f| f.fract() == 0.0)
                .map(|f| Value::from(f as i64))
                .ok_or_else(|| mismatch(&value)),
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| mismatch(&value)),
            _ => Err(mismatch(&value)),
        },
        CastTarget::Map => match value {
            Value::Object(_) => Ok(value),
            other => Err(mismatch(&other)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn coerce_any_unwraps_singleton_vectors() {
        assert_eq!(coerce(json!(["ok"]), CastTarget::Any).unwrap(), json!("ok"));
        assert_eq!(
            coerce(json!([1, 2]), CastTarget::Any).unwrap(),
            json!([1, 2])
        );
        assert_eq!(coerce(json!(null), CastTarget::Any).unwrap(), json!(null));
    }

    #[test]
    fn coerce_bool_accepts_flag_strings() {
        assert_eq!(
            coerce(json!("TRUE"), CastTarget::Bool).unwrap(),
            json!(true)
        );
        assert_eq!(
            coerce(json!([false]), CastTarget::Bool).unwrap(),
            json!(false)
        );
        assert!(coerce(json!("yes"), CastTarget::Bool).is_err());
    }

    #[test]
    fn coerce_int_handles_numbers_and_strings() {
        assert_eq!(coerce(json!(7), CastTarget::Int).unwrap(), json!(7));
        assert_eq!(coerce(json!(7.0), CastTarget::Int).unwrap(), json!(7));
        assert_eq!(coerce(json!(" 42 "), CastTarget::Int).unwrap(), json!(42));
        assert!(coerce(json!(7.5), CastTarget::Int).is_err());
        assert!(coerce(json!("seven"), CastTarget::Int).is_err());
    }

    #[test]
    fn coerce_map_requires_an_object() {
        assert_eq!(
            coerce(json!({"a": 1}), CastTarget::Map).unwrap(),
            json!({"a": 1})
        );
        let err = coerce(json!([1, 2, 3]), CastTarget::Map).unwrap_err();
        assert!(matches!(err, SessionError::Mismatch { target: "map", .. }));
    }
}
