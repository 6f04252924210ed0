//! UI components for the terminal host
//!
//! These modules handle rendering of the transcript and status bar.

pub mod layout;
pub mod repl_pane;
