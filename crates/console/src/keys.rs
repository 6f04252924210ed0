//! Line/Continuation Analyzer
//!
//! Decides what a key press means for the input buffer: insert a newline,
//! submit, complete, or walk history. Multi-line blocks are typed by letting
//! Enter continue while a block is open and submitting on a blank
//! terminator line.

use crate::buffer::InputBuffer;

/// Prompt shown before the first line of an input
pub const PRIMARY_PROMPT: &str = ">>> ";

/// Prompt shown before every following line of an input
pub const CONTINUATION_PROMPT: &str = "... ";

/// Trailing characters that open an indented block
const BLOCK_OPENERS: &[char] = &[':'];

/// Trailing character that continues a logical line
const LINE_CONTINUATION: char = '\\';

/// Key codes the analyzer distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCode {
    Char(char),
    Enter,
    Tab,
    Backspace,
    Delete,
    Left,
    Right,
    Up,
    Down,
    Home,
    End,
    Escape,
}

/// A key press with the modifiers the analyzer cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Key {
    pub code: KeyCode,
    pub shift: bool,
    pub ctrl: bool,
}

impl Key {
    /// Unmodified key
    pub fn code(code: KeyCode) -> Self {
        Self {
            code,
            shift: false,
            ctrl: false,
        }
    }

    /// Shift-modified key
    pub fn shift(code: KeyCode) -> Self {
        Self {
            code,
            shift: true,
            ctrl: false,
        }
    }
}

/// What a key press should do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDecision {
    InsertNewline,
    Submit,
    ArmTabCompletion,
    RecallOlder,
    RecallNewer,
    /// Ordinary editing key, handled by the buffer
    Passthrough,
}

impl KeyDecision {
    /// Whether the host must suppress its own default handling of the key
    pub fn prevents_default(self) -> bool {
        !matches!(self, KeyDecision::Passthrough)
    }
}

/// Decide what `key` means for `buffer`
pub fn decide(buffer: &InputBuffer, key: Key) -> KeyDecision {
    match key.code {
        KeyCode::Enter if key.shift => KeyDecision::InsertNewline,
        KeyCode::Enter if needs_continuation(buffer.text()) => KeyDecision::InsertNewline,
        KeyCode::Enter => KeyDecision::Submit,
        KeyCode::Tab if buffer.caret_on_last_line() => KeyDecision::ArmTabCompletion,
        KeyCode::Up if !key.shift => KeyDecision::RecallOlder,
        KeyCode::Down if !key.shift => KeyDecision::RecallNewer,
        _ => KeyDecision::Passthrough,
    }
}

/// Whether Enter on `text` should continue the input instead of submitting
pub fn needs_continuation(text: &str) -> bool {
    let last_line = text.rsplit('\n').next().unwrap_or("");
    let trimmed = last_line.trim_end();
    if trimmed.ends_with(BLOCK_OPENERS) || trimmed.ends_with(LINE_CONTINUATION) {
        return true;
    }
    // Inside a block, only a blank line terminates it
    text.contains('\n') && !last_line.trim().is_empty()
}

/// Each line of `input` with the prompt it is displayed behind: `first`
/// for the opening line, the continuation prompt for the rest.
pub fn prompted_lines<'a>(
    input: &'a str,
    first: &'static str,
) -> impl Iterator<Item = (&'static str, &'a str)> {
    input.split('\n').enumerate().map(move |(i, line)| {
        let prompt = if i == 0 { first } else { CONTINUATION_PROMPT };
        (prompt, line)
    })
}

/// Display lines for a stored input: the first line bare, every following
/// line behind the continuation prompt. The stored input is not modified.
pub fn continuation_lines(input: &str) -> Vec<String> {
    prompted_lines(input, "")
        .map(|(prompt, line)| format!("{prompt}{line}"))
        .collect()
}
