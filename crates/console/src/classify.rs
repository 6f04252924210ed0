//! Output Classifier
//!
//! Assigns each result string a rendering category. Rules are checked in a
//! fixed precedence order and the first match wins, so a string carrying the
//! error tag is an error even when it also begins with characters shared by
//! another tag.

use crate::entry::{ERROR_TAG, TERMINAL_TAG, WARNING_TAG};
use serde::{Deserialize, Serialize};

const HTML_OPEN: &str = "<html>";
const HTML_CLOSE: &str = "</html>";

/// Rendering category of a transcript output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputClass {
    /// No output to render
    None,
    /// Execution error
    Error,
    /// Standard error chatter
    Warning,
    /// Standard output chatter
    Terminal,
    /// HTML payload for the sandboxed side channel
    Html,
    /// Ordinary result
    Plain,
}

/// Display color for a rendered output class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayColor {
    Red,
    Yellow,
    Gray,
    Default,
}

/// Classify a result string
pub fn classify(output: Option<&str>) -> OutputClass {
    let Some(s) = output else {
        return OutputClass::None;
    };

    if s.starts_with(HTML_OPEN) && s.ends_with(HTML_CLOSE) {
        OutputClass::Html
    } else if s.starts_with(ERROR_TAG) {
        OutputClass::Error
    } else if s.starts_with(WARNING_TAG) {
        OutputClass::Warning
    } else if s.starts_with(TERMINAL_TAG) {
        OutputClass::Terminal
    } else {
        OutputClass::Plain
    }
}

impl OutputClass {
    /// Fixed display color; `None` for classes that are never drawn inline
    pub fn color(self) -> Option<DisplayColor> {
        match self {
            OutputClass::None | OutputClass::Html => None,
            OutputClass::Error => Some(DisplayColor::Red),
            OutputClass::Warning => Some(DisplayColor::Yellow),
            OutputClass::Terminal => Some(DisplayColor::Gray),
            OutputClass::Plain => Some(DisplayColor::Default),
        }
    }

    /// The tag this class was recognized by, if any
    fn tag(self) -> Option<&'static str> {
        match self {
            OutputClass::Error => Some(ERROR_TAG),
            OutputClass::Warning => Some(WARNING_TAG),
            OutputClass::Terminal => Some(TERMINAL_TAG),
            _ => None,
        }
    }

    /// Output text with the class tag removed, for display
    pub fn display_text(self, output: &str) -> &str {
        self.tag()
            .and_then(|tag| output.strip_prefix(tag))
            .unwrap_or(output)
    }
}
