//! Transcript Entries
//!
//! The unit of REPL history: what was submitted, what came back, and how
//! the result should be rendered. Entries are also the record format of the
//! persistent history store.

use crate::classify::{OutputClass, classify};
use serde::{Deserialize, Serialize};

/// Input recorded for the once-per-session version probe.
///
/// Chosen so it can never collide with text a user submits: the controller
/// trims and rejects blank input, and no keyboard produces `\u{1}`.
pub const VERSION_PROBE_INPUT: &str = "\u{1}version";

/// Output prefix for stringified execution errors
pub const ERROR_TAG: &str = "[!!] ";

/// Output prefix for out-of-band standard error text
pub const WARNING_TAG: &str = "[!] ";

/// Output prefix for out-of-band standard output text
pub const TERMINAL_TAG: &str = "[>] ";

/// A single entry in the REPL transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    /// Exact source text submitted (empty for out-of-band terminal output)
    pub input: String,
    /// Stringified result, error or terminal text (`None` for no value or
    /// for HTML payloads routed to the side channel)
    pub output: Option<String>,
    /// Rendering category of `output`
    pub classification: OutputClass,
}

impl TranscriptEntry {
    /// Create an entry, classifying its output
    pub fn new(input: impl Into<String>, output: Option<String>) -> Self {
        let classification = classify(output.as_deref());
        Self {
            input: input.into(),
            output,
            classification,
        }
    }

    /// Entry for a failed execution
    pub fn error(input: impl Into<String>, message: &str) -> Self {
        Self::new(input, Some(format!("{ERROR_TAG}{message}")))
    }

    /// Synthetic entry for out-of-band terminal text
    pub fn terminal(chunk: &str, stream_tag: &str) -> Self {
        Self::new("", Some(format!("{stream_tag}{chunk}")))
    }

    /// The version probe recorded at backend-ready time
    pub fn version_probe(version: impl Into<String>) -> Self {
        Self::new(VERSION_PROBE_INPUT, Some(version.into()))
    }

    /// Whether this is a version-probe entry
    pub fn is_version_probe(&self) -> bool {
        self.input == VERSION_PROBE_INPUT
    }

    /// Whether this entry was synthesized from out-of-band output
    pub fn is_synthetic(&self) -> bool {
        self.input.is_empty()
    }

    /// Whether directional history recall may land on this entry
    pub fn is_navigable(&self) -> bool {
        !self.is_version_probe() && !self.is_synthetic()
    }
}
