//! HTML output files
//!
//! The terminal never interprets HTML. Each payload is written to its own
//! file in a temp directory that lives as long as the session, and the path
//! is reported on the notice channel for the status bar.

use evalbox::HtmlSink;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

pub struct HtmlFiles {
    dir: TempDir,
    written: AtomicUsize,
    notices: UnboundedSender<String>,
}

impl HtmlFiles {
    pub fn new(notices: UnboundedSender<String>) -> Result<Self, String> {
        let dir = tempfile::Builder::new()
            .prefix("evalbox-html-")
            .tempdir()
            .map_err(|e| format!("Failed to create HTML output directory: {}", e))?;
        Ok(Self {
            dir,
            written: AtomicUsize::new(0),
            notices,
        })
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    fn next_path(&self) -> PathBuf {
        let n = self.written.fetch_add(1, Ordering::SeqCst) + 1;
        self.dir.path().join(format!("output-{:04}.html", n))
    }
}

impl HtmlSink for HtmlFiles {
    fn inject(&self, html: &str) {
        let path = self.next_path();
        let notice = match fs::write(&path, html) {
            Ok(()) => {
                info!("HTML output written to {}", path.display());
                format!("HTML output: {}", path.display())
            }
            Err(e) => {
                warn!("Could not write HTML output {}: {}", path.display(), e);
                format!("HTML output not saved: {}", e)
            }
        };
        let _ = self.notices.send(notice);
    }
}
