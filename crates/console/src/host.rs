//! Host Callbacks
//!
//! The two channels the controller pushes to: operator-visible advisory
//! notices, and raw HTML payloads that the host must render in an isolated
//! context (never in its own scripting context).

/// Receives non-fatal operator-visible notices
pub trait Advisory {
    fn notify(&self, message: &str);
}

impl<F: Fn(&str)> Advisory for F {
    fn notify(&self, message: &str) {
        self(message)
    }
}

/// Receives HTML payloads for sandboxed rendering
pub trait HtmlSink {
    fn inject(&self, html: &str);
}

impl<F: Fn(&str)> HtmlSink for F {
    fn inject(&self, html: &str) {
        self(html)
    }
}
