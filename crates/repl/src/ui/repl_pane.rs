//! REPL Pane Widget
//!
//! Displays the session:
//! - The interpreter version banner
//! - Transcript entries, each input followed by its classified output
//! - The input still executing, if any
//! - The live input buffer with cursor

use evalbox::keys::prompted_lines;
use evalbox::{
    CONTINUATION_PROMPT, DisplayColor, InputBuffer, OutputClass, PRIMARY_PROMPT,
    TranscriptEntry,
};
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Paragraph, Widget, Wrap},
};

/// Placeholder drawn where an HTML result was diverted to a file
const HTML_PLACEHOLDER: &str = "(HTML output written to file)";

fn palette(color: DisplayColor) -> Color {
    match color {
        DisplayColor::Red => Color::Red,
        DisplayColor::Yellow => Color::Yellow,
        DisplayColor::Gray => Color::DarkGray,
        DisplayColor::Default => Color::White,
    }
}

fn prompt_style() -> Style {
    Style::default().fg(Color::Green)
}

/// The REPL pane widget
pub struct ReplPane<'a> {
    entries: &'a [&'a TranscriptEntry],
    pending: Option<&'a str>,
    input: &'a InputBuffer,
}

impl<'a> ReplPane<'a> {
    pub fn new(entries: &'a [&'a TranscriptEntry], input: &'a InputBuffer) -> Self {
        Self {
            entries,
            pending: None,
            input,
        }
    }

    /// Show an input that is still executing
    pub fn pending(mut self, pending: Option<&'a str>) -> Self {
        self.pending = pending;
        self
    }

    fn push_input(lines: &mut Vec<Line<'a>>, input: &str) {
        for (prompt, body) in prompted_lines(input, PRIMARY_PROMPT) {
            lines.push(Line::from(vec![
                Span::styled(prompt, prompt_style()),
                Span::raw(body.to_string()),
            ]));
        }
    }

    fn push_output(lines: &mut Vec<Line<'a>>, entry: &TranscriptEntry) {
        if entry.classification == OutputClass::Html {
            lines.push(Line::from(Span::styled(
                HTML_PLACEHOLDER,
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::ITALIC),
            )));
            return;
        }
        let (Some(output), Some(color)) = (&entry.output, entry.classification.color()) else {
            return;
        };
        let style = Style::default().fg(palette(color));
        let text = entry.classification.display_text(output);
        for line in text.trim_end_matches('\n').split('\n') {
            lines.push(Line::from(Span::styled(line.to_string(), style)));
        }
    }

    /// Build the display lines
    fn build_lines(&self) -> Vec<Line<'a>> {
        let mut lines = Vec::new();

        for entry in self.entries {
            if entry.is_version_probe() {
                let banner = entry.output.as_deref().unwrap_or("interpreter");
                lines.push(Line::from(Span::styled(
                    banner.to_string(),
                    Style::default()
                        .fg(Color::DarkGray)
                        .add_modifier(Modifier::BOLD),
                )));
                continue;
            }
            if !entry.is_synthetic() {
                Self::push_input(&mut lines, &entry.input);
            }
            Self::push_output(&mut lines, entry);
        }

        if let Some(pending) = self.pending {
            Self::push_input(&mut lines, pending);
            lines.push(Line::from(Span::styled(
                "running...",
                Style::default().fg(Color::DarkGray),
            )));
            return lines;
        }

        self.push_live_input(&mut lines);
        lines
    }

    fn push_live_input(&self, lines: &mut Vec<Line<'a>>) {
        let text = self.input.text();
        let caret = self.input.caret();
        let input_lines: Vec<&str> = text.split('\n').collect();

        // Find which line the cursor is on and the column within that line
        let (cursor_line, cursor_col) = {
            let mut line_idx = 0;
            let mut col = caret;
            let mut pos = 0;
            for (i, line_text) in input_lines.iter().enumerate() {
                let line_end = pos + line_text.len();
                if caret <= line_end {
                    line_idx = i;
                    col = caret - pos;
                    break;
                }
                pos = line_end + 1;
            }
            (line_idx, col)
        };

        for (i, line_text) in input_lines.iter().enumerate() {
            let prompt = if i == 0 {
                PRIMARY_PROMPT
            } else {
                CONTINUATION_PROMPT
            };
            let mut spans = vec![Span::styled(prompt, prompt_style())];

            if i == cursor_line {
                let col = cursor_col.min(line_text.len());
                let (before, after) = line_text.split_at(col);

                if !before.is_empty() {
                    spans.push(Span::raw(before.to_string()));
                }

                // Block cursor
                let cursor_char = if after.is_empty() {
                    " "
                } else {
                    &after[..after.chars().next().map_or(0, |c| c.len_utf8())]
                };
                spans.push(Span::styled(
                    cursor_char.to_string(),
                    Style::default().bg(Color::White).fg(Color::Black),
                ));

                if !after.is_empty() && after.len() > cursor_char.len() {
                    spans.push(Span::raw(after[cursor_char.len()..].to_string()));
                }
            } else {
                spans.push(Span::raw(line_text.to_string()));
            }

            lines.push(Line::from(spans));
        }
    }
}

impl Widget for &ReplPane<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let lines = self.build_lines();

        // Keep the bottom in view: count wrapped rows and scroll past the rest
        let width = area.width.max(1) as usize;
        let wrapped_height: u16 = lines
            .iter()
            .map(|line| {
                let line_width: usize = line.spans.iter().map(|s| s.content.chars().count()).sum();
                line_width.max(1).div_ceil(width) as u16
            })
            .sum();

        let scroll = wrapped_height.saturating_sub(area.height);

        Paragraph::new(lines)
            .wrap(Wrap { trim: false })
            .scroll((scroll, 0))
            .render(area, buf);
    }
}
