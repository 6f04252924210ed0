//! Persistent History Store
//!
//! A key-ordered durable sequence of transcript entries. The controller
//! loads everything once at startup, appends one entry per execution, and
//! bulk-rewrites only while reconciling at startup.
//!
//! `JsonlStore` keeps one JSON record per line; the key of an entry is its
//! line number. `MemoryStore` is the non-durable variant.

use crate::entry::TranscriptEntry;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Error reading or writing the history store
#[derive(Debug)]
pub enum StoreError {
    /// Filesystem failure
    Io(std::io::Error),
    /// A stored record could not be decoded
    Corrupt {
        line: usize,
        source: serde_json::Error,
    },
    /// An entry could not be encoded
    Encode(serde_json::Error),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Io(e) => write!(f, "history store I/O error: {}", e),
            StoreError::Corrupt { line, source } => {
                write!(f, "history store record {} is corrupt: {}", line, source)
            }
            StoreError::Encode(e) => write!(f, "could not encode history entry: {}", e),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Io(e) => Some(e),
            StoreError::Corrupt { source, .. } => Some(source),
            StoreError::Encode(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e)
    }
}

/// A key-ordered store of transcript entries
pub trait HistoryStore {
    /// Every stored entry, in key order; empty on first run
    fn load_all(&mut self) -> Result<Vec<TranscriptEntry>, StoreError>;

    /// Append one entry and return its key
    fn append_one(&mut self, entry: &TranscriptEntry) -> Result<u64, StoreError>;

    /// Replace the whole contents
    fn save_all(&mut self, entries: &[TranscriptEntry]) -> Result<(), StoreError>;

    /// A recovery the store made on its own, to be shown once
    fn take_notice(&mut self) -> Option<String> {
        None
    }
}

impl<S: HistoryStore + ?Sized> HistoryStore for Box<S> {
    fn load_all(&mut self) -> Result<Vec<TranscriptEntry>, StoreError> {
        (**self).load_all()
    }

    fn append_one(&mut self, entry: &TranscriptEntry) -> Result<u64, StoreError> {
        (**self).append_one(entry)
    }

    fn save_all(&mut self, entries: &[TranscriptEntry]) -> Result<(), StoreError> {
        (**self).save_all(entries)
    }

    fn take_notice(&mut self) -> Option<String> {
        (**self).take_notice()
    }
}

/// In-memory store
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: BTreeMap<u64, TranscriptEntry>,
    next_key: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl HistoryStore for MemoryStore {
    fn load_all(&mut self) -> Result<Vec<TranscriptEntry>, StoreError> {
        Ok(self.records.values().cloned().collect())
    }

    fn append_one(&mut self, entry: &TranscriptEntry) -> Result<u64, StoreError> {
        let key = self.next_key;
        self.records.insert(key, entry.clone());
        self.next_key += 1;
        Ok(key)
    }

    fn save_all(&mut self, entries: &[TranscriptEntry]) -> Result<(), StoreError> {
        self.records = entries
            .iter()
            .cloned()
            .enumerate()
            .map(|(i, e)| (i as u64, e))
            .collect();
        self.next_key = entries.len() as u64;
        Ok(())
    }
}

/// JSON-lines file store
#[derive(Debug)]
pub struct JsonlStore {
    path: PathBuf,
    /// Record count, known after the first load
    count: Option<u64>,
    notice: Option<String>,
}

impl JsonlStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            count: None,
            notice: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Count records without decoding them, and whether the file ends
    /// with a newline
    fn scan(&self) -> Result<(u64, bool), StoreError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((0, true)),
            Err(e) => return Err(e.into()),
        };
        let count = bytes
            .split(|b| *b == b'\n')
            .filter(|line| !line.trim_ascii().is_empty())
            .count();
        Ok((count as u64, bytes.is_empty() || bytes.ends_with(b"\n")))
    }

    fn ensure_parent(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

impl HistoryStore for JsonlStore {
    fn load_all(&mut self) -> Result<Vec<TranscriptEntry>, StoreError> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.count = Some(0);
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for (i, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if !line.trim().is_empty() {
                records.push((i + 1, line));
            }
        }

        let last = records.len();
        let mut entries = Vec::with_capacity(last);
        let mut torn = None;
        for (n, (line, record)) in records.iter().enumerate() {
            match serde_json::from_str(record) {
                Ok(entry) => entries.push(entry),
                // A write cut short by a crash
                Err(source) if n + 1 == last => torn = Some((*line, source)),
                Err(source) => return Err(StoreError::Corrupt { line: *line, source }),
            }
        }

        self.count = Some(entries.len() as u64);
        if let Some((line, source)) = torn {
            warn!("Dropping torn history record {}: {}", line, source);
            self.notice = Some(format!(
                "History record {} was incomplete and has been dropped",
                line
            ));
            // Rewrite without it; until that succeeds, appends count raw lines
            if let Err(e) = self.save_all(&entries) {
                warn!("Could not repair history file: {}", e);
                self.count = None;
            }
        }
        Ok(entries)
    }

    fn append_one(&mut self, entry: &TranscriptEntry) -> Result<u64, StoreError> {
        let record = serde_json::to_string(entry).map_err(StoreError::Encode)?;
        self.ensure_parent()?;

        let (count, terminated) = match self.count {
            Some(c) => (c, true),
            None => self.scan()?,
        };
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        if !terminated {
            writeln!(file)?;
        }
        writeln!(file, "{}", record)?;

        self.count = Some(count + 1);
        Ok(count)
    }

    fn save_all(&mut self, entries: &[TranscriptEntry]) -> Result<(), StoreError> {
        self.ensure_parent()?;
        // Write beside the target and rename, so a crash never truncates history
        let tmp = self.path.with_extension("jsonl.tmp");
        {
            let mut out = BufWriter::new(File::create(&tmp)?);
            for entry in entries {
                let record = serde_json::to_string(entry).map_err(StoreError::Encode)?;
                writeln!(out, "{}", record)?;
            }
            out.flush()?;
        }
        fs::rename(&tmp, &self.path)?;
        self.count = Some(entries.len() as u64);
        Ok(())
    }

    fn take_notice(&mut self) -> Option<String> {
        self.notice.take()
    }
}
