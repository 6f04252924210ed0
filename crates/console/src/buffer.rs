//! Input Buffer
//!
//! The live, possibly multi-line, input text and its caret. The caret is a
//! byte offset that is always kept on a char boundary.

/// Multi-line input text with a caret
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputBuffer {
    text: String,
    caret: usize,
}

/// Find the largest byte index <= pos that is a valid char boundary.
fn floor_char_boundary(s: &str, pos: usize) -> usize {
    if pos >= s.len() {
        return s.len();
    }
    let mut p = pos;
    while p > 0 && !s.is_char_boundary(p) {
        p -= 1;
    }
    p
}

impl InputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn caret(&self) -> usize {
        self.caret
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Replace the whole text, leaving the caret at the end
    pub fn set(&mut self, text: impl Into<String>) {
        self.text = text.into();
        self.caret = self.text.len();
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.caret = 0;
    }

    /// Move the caret, clamped to the text and snapped to a char boundary
    pub fn set_caret(&mut self, caret: usize) {
        self.caret = floor_char_boundary(&self.text, caret);
    }

    pub fn insert_char(&mut self, ch: char) {
        self.text.insert(self.caret, ch);
        self.caret += ch.len_utf8();
    }

    pub fn insert_str(&mut self, s: &str) {
        self.text.insert_str(self.caret, s);
        self.caret += s.len();
    }

    /// Delete the character before the caret
    pub fn backspace(&mut self) {
        if let Some(ch) = self.text[..self.caret].chars().next_back() {
            self.caret -= ch.len_utf8();
            self.text.remove(self.caret);
        }
    }

    /// Delete the character at the caret
    pub fn delete(&mut self) {
        if self.caret < self.text.len() {
            self.text.remove(self.caret);
        }
    }

    pub fn caret_left(&mut self) {
        if let Some(ch) = self.text[..self.caret].chars().next_back() {
            self.caret -= ch.len_utf8();
        }
    }

    pub fn caret_right(&mut self) {
        if let Some(ch) = self.text[self.caret..].chars().next() {
            self.caret += ch.len_utf8();
        }
    }

    /// Move to the start of the caret's line
    pub fn caret_home(&mut self) {
        self.caret = self.text[..self.caret].rfind('\n').map_or(0, |i| i + 1);
    }

    /// Move to the end of the caret's line
    pub fn caret_end(&mut self) {
        self.caret = self.text[self.caret..]
            .find('\n')
            .map_or(self.text.len(), |i| self.caret + i);
    }

    /// Whether the caret sits on the buffer's last line
    pub fn caret_on_last_line(&self) -> bool {
        !self.text[self.caret..].contains('\n')
    }

    /// The last line of the buffer
    pub fn last_line(&self) -> &str {
        self.text.rsplit('\n').next().unwrap_or("")
    }

    /// Replace the last line, leaving the caret at the end of the buffer
    pub fn replace_last_line(&mut self, line: &str) {
        let start = self.text.rfind('\n').map_or(0, |i| i + 1);
        self.text.replace_range(start.., line);
        self.caret = self.text.len();
    }
}
