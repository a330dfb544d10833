//! Remote evaluation bridge between a host job scheduler and a long-lived
//! out-of-process interpreter session.
//!
//! The bridge prepares the remote environment, submits a script, and while
//! the evaluation runs, tails the interpreter's textual output through a
//! side-channel file. An embedded tag protocol multiplexed into that stream
//! is split back into ordinary output, a structured error report, and
//! progress events. Whatever the outcome, the session, the tailer thread,
//! and the output file are released before the evaluation returns.
//!
//! The crate is transport-agnostic: backends implement the
//! [`session::RemoteSession`] and [`session::SessionProvider`] traits, the
//! scheduler supplies an [`context::ExecutionContext`], and
//! [`bridge::EvalBridge`] sequences the run.

pub mod bridge;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod exit_codes;
pub mod progress;
pub mod protocol;
pub mod session;
pub mod tailer;

#[cfg(test)]
pub(crate) mod test_support;
