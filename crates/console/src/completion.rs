//! Completion Engine
//!
//! Tab completion for `object.member` expressions on the last input line.
//! The backend is asked for the member names of the object, and the first
//! name (in backend order) that extends the typed fragment is written back
//! into the buffer. There is no cycling between several matches.

use crate::backend::ExecutionBackend;
use crate::buffer::InputBuffer;
use crate::error::SessionError;

/// Separator between an object expression and a member name
const MEMBER_DELIMITER: char = '.';

/// Characters that cannot be part of the expression being reflected on
const EXPRESSION_BREAKS: &[char] = &[
    ' ', '\t', '=', '+', '-', '*', '/', '%', ',', '(', '[', '{', '<', '>', '!', '&', '|', '^',
    '~', ':', ';',
];

/// The pieces of a completion request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionTarget<'a> {
    /// Everything before the last delimiter (the whole line if there is none)
    pub object_expr: &'a str,
    /// Everything after the last delimiter
    pub partial: &'a str,
}

impl<'a> CompletionTarget<'a> {
    /// Split a line at its last member delimiter
    pub fn parse(line: &'a str) -> Self {
        match line.rfind(MEMBER_DELIMITER) {
            Some(dot) => Self {
                object_expr: &line[..dot],
                partial: &line[dot + MEMBER_DELIMITER.len_utf8()..],
            },
            None => Self {
                object_expr: line,
                partial: "",
            },
        }
    }

    /// The trailing expression of `object_expr` that the backend reflects on
    /// (`x = os.pa` reflects on `os`)
    pub fn reflect_expr(&self) -> &'a str {
        let start = self
            .object_expr
            .rfind(EXPRESSION_BREAKS)
            .map_or(0, |i| i + 1);
        &self.object_expr[start..]
    }
}

/// Result of a completion request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Completion {
    /// Every member name the backend returned
    pub candidates: Vec<String>,
    /// The member written into the buffer, if any
    pub applied: Option<String>,
}

/// Complete the last line of `buffer` in place
pub async fn complete<B: ExecutionBackend>(
    backend: &B,
    buffer: &mut InputBuffer,
) -> Result<Completion, SessionError> {
    if !backend.is_ready() {
        return Err(SessionError::unavailable(backend.has_exited()));
    }

    let line = buffer.last_line().to_string();
    let target = CompletionTarget::parse(&line);
    let candidates = backend
        .members(target.reflect_expr())
        .await
        .map_err(SessionError::Completion)?;

    if target.partial.is_empty() {
        return Ok(Completion {
            candidates,
            applied: None,
        });
    }

    let applied = candidates
        .iter()
        .find(|name| name.starts_with(target.partial))
        .cloned();
    if let Some(name) = &applied {
        buffer.replace_last_line(&format!(
            "{}{}{}",
            target.object_expr, MEMBER_DELIMITER, name
        ));
    }

    Ok(Completion {
        candidates,
        applied,
    })
}
