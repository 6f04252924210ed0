//! Layout Manager
//!
//! Splits the terminal into the transcript pane and a status bar below it.

use ratatui::layout::{Constraint, Direction, Layout, Rect};

/// Layout configuration
#[derive(Debug, Clone)]
pub struct LayoutConfig {
    /// Height reserved for status bar
    pub status_bar_height: u16,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            status_bar_height: 1,
        }
    }
}

/// The computed layout areas
#[derive(Debug, Clone, Copy)]
pub struct ComputedLayout {
    /// Area for the transcript and input
    pub transcript: Rect,
    /// Area for the status bar
    pub status: Rect,
}

impl ComputedLayout {
    /// Compute the layout for a given terminal area
    pub fn compute(area: Rect, config: &LayoutConfig) -> Self {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(0),
                Constraint::Length(config.status_bar_height),
            ])
            .split(area);

        Self {
            transcript: chunks[0],
            status: chunks[1],
        }
    }
}

/// Status bar content
#[derive(Debug, Clone, Default)]
pub struct StatusContent {
    /// Interpreter name and version
    pub interpreter: String,
    /// Execution state label
    pub state: String,
    /// Recall position, if navigating history
    pub recall: Option<String>,
    /// Any additional status message
    pub message: Option<String>,
}

impl StatusContent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn interpreter(mut self, name: impl Into<String>) -> Self {
        self.interpreter = name.into();
        self
    }

    pub fn state(mut self, state: impl Into<String>) -> Self {
        self.state = state.into();
        self
    }

    /// Show the recall cursor; `-1` (live input) shows nothing
    pub fn recall(mut self, cursor: isize, total: usize) -> Self {
        self.recall = (cursor >= 0).then(|| format!("history {}/{}", cursor + 1, total));
        self
    }

    pub fn message(mut self, msg: Option<&str>) -> Self {
        self.message = msg.map(str::to_string);
        self
    }

    /// Format for display
    pub fn format(&self, width: u16) -> String {
        let left = format!(" {} ", self.interpreter);
        let middle = self.message.clone().unwrap_or_default();
        let right = match &self.recall {
            Some(recall) => format!(" {} | {} ", recall, self.state),
            None => format!(" {} ", self.state),
        };

        let padding_needed = (width as usize)
            .saturating_sub(left.chars().count())
            .saturating_sub(middle.chars().count())
            .saturating_sub(right.chars().count());

        let left_pad = padding_needed / 2;
        let right_pad = padding_needed - left_pad;

        format!(
            "{}{}{}{}{}",
            left,
            " ".repeat(left_pad),
            middle,
            " ".repeat(right_pad),
            right
        )
    }
}
