//! Execution Backend Capability
//!
//! The controller never reaches for an ambient interpreter handle: the
//! backend is injected at construction and reports its own readiness.
//! Out-of-band terminal text travels on a separate channel because the
//! backend may emit it at any time, independent of any `evaluate` call.

use std::future::Future;
use tokio::sync::mpsc;

/// Error from the execution backend
#[derive(Debug)]
pub enum BackendError {
    /// The backend has not finished initializing
    Unavailable,
    /// The backend rejected the code (the interpreter's own error text)
    Rejected(String),
    /// The backend replied with something the host cannot interpret
    Protocol(String),
    /// Transport failure talking to the backend
    Io(std::io::Error),
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::Unavailable => write!(f, "backend is not ready"),
            BackendError::Rejected(msg) => write!(f, "{}", msg),
            BackendError::Protocol(msg) => write!(f, "backend protocol error: {}", msg),
            BackendError::Io(e) => write!(f, "backend I/O error: {}", e),
        }
    }
}

impl std::error::Error for BackendError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BackendError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for BackendError {
    fn from(e: std::io::Error) -> Self {
        BackendError::Io(e)
    }
}

/// An asynchronous code evaluator
pub trait ExecutionBackend {
    /// Whether initialization has completed
    fn is_ready(&self) -> bool;

    /// Whether the backend has gone away for good. A backend that has
    /// exited is never ready again.
    fn has_exited(&self) -> bool {
        false
    }

    /// Evaluate `code`; `Ok(None)` when the code produced no value
    fn evaluate(
        &self,
        code: &str,
    ) -> impl Future<Output = Result<Option<String>, BackendError>> + Send;

    /// Member names reachable from `object_expr`, in the backend's order
    fn members(
        &self,
        object_expr: &str,
    ) -> impl Future<Output = Result<Vec<String>, BackendError>> + Send;

    /// Version string recorded once per session when the backend is ready
    fn version(&self) -> impl Future<Output = Result<String, BackendError>> + Send;
}

/// Which terminal stream a chunk came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalStream {
    Stdout,
    Stderr,
}

/// A piece of out-of-band terminal text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalChunk {
    pub stream: TerminalStream,
    pub text: String,
}

impl TerminalChunk {
    pub fn stdout(text: impl Into<String>) -> Self {
        Self {
            stream: TerminalStream::Stdout,
            text: text.into(),
        }
    }

    pub fn stderr(text: impl Into<String>) -> Self {
        Self {
            stream: TerminalStream::Stderr,
            text: text.into(),
        }
    }
}

/// Backend side of the terminal channel
pub type TerminalSender = mpsc::UnboundedSender<TerminalChunk>;

/// Controller side of the terminal channel
pub type TerminalReceiver = mpsc::UnboundedReceiver<TerminalChunk>;

/// Create the out-of-band terminal channel
pub fn terminal_channel() -> (TerminalSender, TerminalReceiver) {
    mpsc::unbounded_channel()
}
