//! History Navigator
//!
//! Owns the ordered transcript and a cursor into it for directional recall.
//!
//! The cursor counts genuine user submissions backwards from the most recent
//! one: `-1` is live typing, `0` the latest submission, `1` the one before,
//! and so on. Version probes and out-of-band terminal entries stay in the
//! transcript but are skipped while walking, so the cursor never rests on
//! them.

use crate::entry::TranscriptEntry;

/// Cursor position while navigating: the logical offset and the transcript
/// index it resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Position {
    offset: usize,
    index: usize,
}

/// Transcript plus recall cursor
#[derive(Debug, Clone, Default)]
pub struct HistoryNavigator {
    entries: Vec<TranscriptEntry>,
    /// First index rendered in this session (N0)
    baseline: usize,
    position: Option<Position>,
    /// Live input saved when recall started
    draft: String,
}

impl HistoryNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with entries loaded from storage; they become the baseline
    pub fn with_loaded(entries: Vec<TranscriptEntry>) -> Self {
        let baseline = entries.len();
        Self {
            entries,
            baseline,
            position: None,
            draft: String::new(),
        }
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Session baseline index N0
    pub fn baseline(&self) -> usize {
        self.baseline
    }

    /// Hide everything currently in the transcript from this session's view
    pub fn clear_view(&mut self) {
        self.baseline = self.entries.len();
    }

    /// Append an entry; the transcript is never reordered or shrunk
    pub fn push(&mut self, entry: TranscriptEntry) {
        self.entries.push(entry);
    }

    /// Entries rendered this session (at or after the baseline)
    pub fn session_entries(&self) -> &[TranscriptEntry] {
        &self.entries[self.baseline.min(self.entries.len())..]
    }

    /// Current cursor: `-1` when not navigating
    pub fn cursor(&self) -> isize {
        self.position.map_or(-1, |p| p.offset as isize)
    }

    /// Number of entries recall can land on
    pub fn navigable_len(&self) -> usize {
        self.entries.iter().filter(|e| e.is_navigable()).count()
    }

    /// Step one submission into the past.
    ///
    /// `live` is the current buffer text, saved so returning to `-1` can
    /// restore it. Returns the text to show, or `None` when already at the
    /// oldest submission.
    pub fn recall_older(&mut self, live: &str) -> Option<String> {
        let end = self.position.map_or(self.entries.len(), |p| p.index);
        // Boundary check before moving: find the next older navigable entry
        let index = self.entries[..end].iter().rposition(|e| e.is_navigable())?;

        if self.position.is_none() {
            self.draft = live.to_string();
        }
        let offset = self.position.map_or(0, |p| p.offset + 1);
        self.position = Some(Position { offset, index });
        Some(self.entries[index].input.clone())
    }

    /// Step one submission towards the present.
    ///
    /// Returns the text to show, or `None` when not navigating. Leaving the
    /// most recent submission returns to live typing with the saved draft.
    pub fn recall_newer(&mut self) -> Option<String> {
        let current = self.position?;
        if current.offset == 0 {
            self.position = None;
            return Some(std::mem::take(&mut self.draft));
        }

        let start = current.index + 1;
        match self.entries[start..].iter().position(|e| e.is_navigable()) {
            Some(found) => {
                let index = start + found;
                self.position = Some(Position {
                    offset: current.offset - 1,
                    index,
                });
                Some(self.entries[index].input.clone())
            }
            // Unreachable while offsets stay consistent, but never run off the end
            None => {
                self.position = None;
                Some(std::mem::take(&mut self.draft))
            }
        }
    }

    /// Stop navigating and forget the saved draft
    pub fn reset(&mut self) {
        self.position = None;
        self.draft.clear();
    }
}
