//! Evalbox: the session layer of an interactive REPL console
//!
//! This crate is everything between a key press and a transcript entry. It
//! carries no rendering code: hosts feed it keys and backend results, and
//! draw the transcript it maintains.
//!
//! Key design principles:
//! - One execution at a time: a second submission while busy is rejected
//! - The transcript only grows; every entry is persisted as it is appended
//! - Terminal chatter never splits an input from its output
//!
//! # Modules
//!
//! - `entry`: Transcript entries and the output tags they carry
//! - `classify`: Output classification and display color
//! - `buffer`: Multi-line input buffer with a caret
//! - `keys`: Enter/Tab/arrow decisions and continuation prompts
//! - `history`: Transcript with a recall cursor
//! - `completion`: `object.member` tab completion
//! - `backend`: Execution backend capability and terminal channel
//! - `store`: Persistent history store
//! - `host`: Advisory and HTML sink callbacks
//! - `session`: The session state machine
//! - `config`: Session configuration
//! - `error`: Session error taxonomy

pub mod backend;
pub mod buffer;
pub mod classify;
pub mod completion;
pub mod config;
pub mod entry;
pub mod error;
pub mod history;
pub mod host;
pub mod keys;
pub mod session;
pub mod store;

#[cfg(test)]
mod test_support;

pub use backend::{
    BackendError, ExecutionBackend, TerminalChunk, TerminalReceiver, TerminalSender,
    TerminalStream, terminal_channel,
};
pub use buffer::InputBuffer;
pub use classify::{DisplayColor, OutputClass, classify};
pub use completion::{Completion, CompletionTarget};
pub use config::SessionConfig;
pub use entry::TranscriptEntry;
pub use error::SessionError;
pub use history::HistoryNavigator;
pub use host::{Advisory, HtmlSink};
pub use keys::{CONTINUATION_PROMPT, Key, KeyCode, KeyDecision, PRIMARY_PROMPT};
pub use session::{Dispatch, ExecutionState, SessionController};
pub use store::{HistoryStore, JsonlStore, MemoryStore, StoreError};
