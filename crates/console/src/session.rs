//! Execution Coordinator
//!
//! `SessionController` is the REPL state machine. It owns the input buffer,
//! the transcript and its recall cursor, and serializes submissions to the
//! execution backend.
//!
//! # States
//!
//! ```text
//!            begin (non-blank, backend ready)
//!   Idle ─────────────────────────────────────▶ Busy
//!    ▲                                            │
//!    └──────────── finish (result or error) ◀─────┘
//! ```
//!
//! A submission while `Busy` is rejected with an advisory, never queued.
//! Out-of-band terminal text that arrives while `Busy` waits in a single
//! pending slot (last write wins) and is flushed as its own entry right
//! after the submission's entry, so terminal chatter never lands between an
//! input and its output. While `Idle` it is appended immediately.
//!
//! Hosts that keep handling keys during an execution drive the explicit
//! `begin`/`finish` events themselves; `submit` runs the whole cycle inline.

use crate::backend::{
    BackendError, ExecutionBackend, TerminalChunk, TerminalReceiver, TerminalStream,
};
use crate::buffer::InputBuffer;
use crate::classify::{OutputClass, classify};
use crate::completion;
use crate::config::SessionConfig;
use crate::entry::{TERMINAL_TAG, TranscriptEntry, WARNING_TAG};
use crate::error::SessionError;
use crate::history::HistoryNavigator;
use crate::host::{Advisory, HtmlSink};
use crate::keys::{Key, KeyCode, KeyDecision, decide};
use crate::store::HistoryStore;
use tracing::{debug, info, warn};

/// Indentation inserted by Tab away from the last line
const INDENT: &str = "    ";

/// Whether an execution is in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionState {
    #[default]
    Idle,
    Busy,
}

/// Handle for the execution in flight, returned by `begin` and consumed by
/// `finish`
#[derive(Debug, PartialEq, Eq)]
pub struct Dispatch {
    id: u64,
    code: String,
}

impl Dispatch {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn code(&self) -> &str {
        &self.code
    }
}

/// The REPL session state machine
pub struct SessionController<B, S> {
    backend: B,
    store: S,
    config: SessionConfig,
    advisory: Box<dyn Advisory + Send>,
    html_sink: Box<dyn HtmlSink + Send>,
    history: HistoryNavigator,
    buffer: InputBuffer,
    state: ExecutionState,
    in_flight: Option<(u64, String)>,
    next_dispatch: u64,
    terminal_rx: TerminalReceiver,
    pending_terminal: Option<TerminalChunk>,
    probe_recorded: bool,
    candidates: Vec<String>,
}

impl<B: ExecutionBackend, S: HistoryStore> SessionController<B, S> {
    /// Create a controller; call `start` before accepting input
    pub fn new(backend: B, store: S, terminal_rx: TerminalReceiver) -> Self {
        Self {
            backend,
            store,
            config: SessionConfig::default(),
            advisory: Box::new(|message: &str| warn!("unhandled advisory: {}", message)),
            html_sink: Box::new(|_html: &str| warn!("HTML output dropped: no sink installed")),
            history: HistoryNavigator::new(),
            buffer: InputBuffer::new(),
            state: ExecutionState::Idle,
            in_flight: None,
            next_dispatch: 1,
            terminal_rx,
            pending_terminal: None,
            probe_recorded: false,
            candidates: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_advisory(mut self, advisory: impl Advisory + Send + 'static) -> Self {
        self.advisory = Box::new(advisory);
        self
    }

    pub fn with_html_sink(mut self, sink: impl HtmlSink + Send + 'static) -> Self {
        self.html_sink = Box::new(sink);
        self
    }

    /// Load history and, if the backend is already up, record the version probe
    pub async fn start(&mut self) {
        let loaded = match self.store.load_all() {
            Ok(entries) => entries,
            Err(e) => {
                self.advise(SessionError::Persistence(e));
                Vec::new()
            }
        };
        if let Some(notice) = self.store.take_notice() {
            warn!("{}", notice);
            self.advisory.notify(&notice);
        }
        let stored = loaded.len();

        // Probes from earlier sessions are not part of this transcript
        let mut entries: Vec<TranscriptEntry> = loaded
            .into_iter()
            .filter(|e| !e.is_version_probe())
            .collect();

        if stored > self.config.max_history {
            let excess = entries.len().saturating_sub(self.config.max_history);
            entries.drain(..excess);
            match self.store.save_all(&entries) {
                Ok(()) => info!(
                    "Trimmed history store from {} to {} entries",
                    stored,
                    entries.len()
                ),
                Err(e) => self.advise(SessionError::Persistence(e)),
            }
        }

        self.history = HistoryNavigator::with_loaded(entries);
        info!(
            "Session started: {} stored entries, baseline {}",
            stored,
            self.history.baseline()
        );

        self.backend_ready().await;
    }

    /// Record the version probe once the backend reports ready.
    ///
    /// Safe to call repeatedly; the probe is created once per session.
    pub async fn backend_ready(&mut self) {
        if self.probe_recorded || !self.backend.is_ready() {
            return;
        }
        match self.backend.version().await {
            Ok(version) => {
                info!("Backend ready: {}", version);
                self.probe_recorded = true;
                self.append(TranscriptEntry::version_probe(version));
            }
            Err(e) => self.advise(SessionError::Execution(format!(
                "Could not read interpreter version: {}",
                e
            ))),
        }
    }

    /// Apply a key press. Newlines, recall and ordinary edits take effect
    /// immediately; `Submit` and `ArmTabCompletion` are returned for the
    /// host to drive (`begin`/`submit` and `complete`).
    pub fn press(&mut self, key: Key) -> KeyDecision {
        let decision = decide(&self.buffer, key);
        match decision {
            KeyDecision::InsertNewline => self.buffer.insert_char('\n'),
            KeyDecision::RecallOlder => self.recall_older(),
            KeyDecision::RecallNewer => self.recall_newer(),
            KeyDecision::Passthrough => self.edit(key),
            KeyDecision::Submit | KeyDecision::ArmTabCompletion => {}
        }
        decision
    }

    fn edit(&mut self, key: Key) {
        match key.code {
            KeyCode::Char(ch) if !key.ctrl => self.buffer.insert_char(ch),
            KeyCode::Tab => self.buffer.insert_str(INDENT),
            KeyCode::Backspace => self.buffer.backspace(),
            KeyCode::Delete => self.buffer.delete(),
            KeyCode::Left => self.buffer.caret_left(),
            KeyCode::Right => self.buffer.caret_right(),
            KeyCode::Home => self.buffer.caret_home(),
            KeyCode::End => self.buffer.caret_end(),
            _ => {}
        }
    }

    /// Show the next older submission in the input buffer
    pub fn recall_older(&mut self) {
        if let Some(text) = self.history.recall_older(self.buffer.text()) {
            self.buffer.set(text);
        }
    }

    /// Show the next newer submission, or return to live typing
    pub fn recall_newer(&mut self) {
        if let Some(text) = self.history.recall_newer() {
            self.buffer.set(text);
        }
    }

    /// Stop navigating history and clear the input
    pub fn reset_input(&mut self) {
        self.history.reset();
        self.buffer.clear();
    }

    /// Start executing `code`.
    ///
    /// Blank input is ignored. If the backend is not ready (or has exited)
    /// or another execution is in flight, an advisory is raised and nothing
    /// happens.
    pub fn begin(&mut self, code: &str) -> Option<Dispatch> {
        if code.trim().is_empty() {
            return None;
        }
        if !self.backend.is_ready() {
            self.advise(SessionError::unavailable(self.backend.has_exited()));
            return None;
        }
        if self.state == ExecutionState::Busy {
            self.advise(SessionError::Busy);
            return None;
        }

        let id = self.next_dispatch;
        self.next_dispatch += 1;
        self.state = ExecutionState::Busy;
        self.in_flight = Some((id, code.to_string()));
        debug!("Idle -> Busy (dispatch {})", id);

        Some(Dispatch {
            id,
            code: code.to_string(),
        })
    }

    /// Start executing the current input buffer
    pub fn begin_input(&mut self) -> Option<Dispatch> {
        let code = self.buffer.text().to_string();
        self.begin(&code)
    }

    /// Complete the execution started by `begin` with the backend's outcome
    pub fn finish(&mut self, dispatch: Dispatch, outcome: Result<Option<String>, BackendError>) {
        match &self.in_flight {
            Some((id, _)) if *id == dispatch.id => {}
            _ => {
                warn!("Ignoring completion for stale dispatch {}", dispatch.id);
                return;
            }
        }
        self.in_flight = None;

        let entry = match outcome {
            Ok(Some(value)) if classify(Some(value.as_str())) == OutputClass::Html => {
                self.html_sink.inject(&value);
                TranscriptEntry {
                    input: dispatch.code,
                    output: None,
                    classification: OutputClass::Html,
                }
            }
            Ok(value) => TranscriptEntry::new(dispatch.code, value),
            Err(e) => {
                debug!("Execution failed: {}", e);
                TranscriptEntry::error(dispatch.code, &e.to_string())
            }
        };
        self.append(entry);

        // Chatter emitted up to now belongs before the transition to Idle
        self.buffer_terminal();
        self.state = ExecutionState::Idle;
        debug!("Busy -> Idle (dispatch {})", dispatch.id);
        self.buffer.clear();
        self.history.reset();

        if let Some(chunk) = self.pending_terminal.take() {
            self.append(terminal_entry(&chunk));
        }
    }

    /// Execute `code` to completion, buffering terminal output meanwhile
    pub async fn submit(&mut self, code: &str) {
        let Some(dispatch) = self.begin(code) else {
            return;
        };

        let outcome = {
            let evaluation = self.backend.evaluate(dispatch.code());
            tokio::pin!(evaluation);
            loop {
                tokio::select! {
                    outcome = &mut evaluation => break outcome,
                    Some(chunk) = self.terminal_rx.recv() => {
                        self.pending_terminal = Some(chunk);
                    }
                }
            }
        };

        self.finish(dispatch, outcome);
    }

    /// Execute the current input buffer
    pub async fn submit_input(&mut self) {
        let code = self.buffer.text().to_string();
        self.submit(&code).await;
    }

    /// Drain out-of-band terminal output that arrived since the last call
    pub fn pump_terminal(&mut self) {
        while let Ok(chunk) = self.terminal_rx.try_recv() {
            self.accept_terminal(chunk);
        }
    }

    fn buffer_terminal(&mut self) {
        while let Ok(chunk) = self.terminal_rx.try_recv() {
            self.pending_terminal = Some(chunk);
        }
    }

    fn accept_terminal(&mut self, chunk: TerminalChunk) {
        match self.state {
            ExecutionState::Busy => {
                if self.pending_terminal.replace(chunk).is_some() {
                    debug!("Terminal output superseded while busy");
                }
            }
            ExecutionState::Idle => self.append(terminal_entry(&chunk)),
        }
    }

    /// Tab completion on the input buffer. Returns the candidate set.
    pub async fn complete(&mut self) -> Vec<String> {
        match completion::complete(&self.backend, &mut self.buffer).await {
            Ok(completion) => {
                self.candidates = completion.candidates;
            }
            Err(e) => {
                self.advise(e);
                self.candidates.clear();
            }
        }
        self.candidates.clone()
    }

    /// Hide the current transcript from view without touching storage
    pub fn clear_view(&mut self) {
        self.history.clear_view();
    }

    fn append(&mut self, entry: TranscriptEntry) {
        match self.store.append_one(&entry) {
            Ok(key) => debug!("Persisted entry {}", key),
            Err(e) => self.advise(SessionError::Persistence(e)),
        }
        self.history.push(entry);
    }

    fn advise(&self, error: SessionError) {
        warn!("{}", error);
        self.advisory.notify(&error.to_string());
    }

    pub fn state(&self) -> ExecutionState {
        self.state
    }

    pub fn is_busy(&self) -> bool {
        self.state == ExecutionState::Busy
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn buffer(&self) -> &InputBuffer {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut InputBuffer {
        &mut self.buffer
    }

    pub fn history(&self) -> &HistoryNavigator {
        &self.history
    }

    /// Every entry in memory, including earlier sessions
    pub fn transcript(&self) -> &[TranscriptEntry] {
        self.history.entries()
    }

    /// The input of the execution in flight
    pub fn pending_input(&self) -> Option<&str> {
        self.in_flight.as_ref().map(|(_, code)| code.as_str())
    }

    /// Candidates from the last completion request
    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    /// Interpreter version recorded by this session's probe
    pub fn version(&self) -> Option<&str> {
        self.history
            .session_entries()
            .iter()
            .find(|e| e.is_version_probe())
            .and_then(|e| e.output.as_deref())
    }

    /// Entries to render: this session's version probe first, then this
    /// session's entries in order
    pub fn visible_entries(&self) -> Vec<&TranscriptEntry> {
        let session = self.history.session_entries();
        session
            .iter()
            .filter(|e| e.is_version_probe())
            .take(1)
            .chain(session.iter().filter(|e| !e.is_version_probe()))
            .collect()
    }
}

fn terminal_entry(chunk: &TerminalChunk) -> TranscriptEntry {
    let tag = match chunk.stream {
        TerminalStream::Stdout => TERMINAL_TAG,
        TerminalStream::Stderr => WARNING_TAG,
    };
    TranscriptEntry::terminal(&chunk.text, tag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::terminal_channel;
    use crate::store::{JsonlStore, MemoryStore, StoreError};
    use crate::test_support::{Recorder, ScriptedBackend};

    type Controller = SessionController<ScriptedBackend, MemoryStore>;

    struct Harness {
        controller: Controller,
        advisories: Recorder,
        html: Recorder,
    }

    async fn harness(backend: ScriptedBackend) -> Harness {
        harness_with_store(backend, MemoryStore::new()).await
    }

    async fn harness_with_store(backend: ScriptedBackend, store: MemoryStore) -> Harness {
        let (_tx, rx) = terminal_channel();
        let advisories = Recorder::default();
        let html = Recorder::default();
        let mut controller = SessionController::new(backend, store, rx)
            .with_advisory(advisories.callback())
            .with_html_sink(html.callback());
        controller.start().await;
        Harness {
            controller,
            advisories,
            html,
        }
    }

    /// Harness whose backend can emit terminal output
    async fn chatty_harness(
        build: impl FnOnce(ScriptedBackend) -> ScriptedBackend,
    ) -> (Harness, crate::backend::TerminalSender) {
        let (tx, rx) = terminal_channel();
        let backend = build(ScriptedBackend::ready().with_terminal(tx.clone()));
        let advisories = Recorder::default();
        let html = Recorder::default();
        let mut controller = SessionController::new(backend, MemoryStore::new(), rx)
            .with_advisory(advisories.callback())
            .with_html_sink(html.callback());
        controller.start().await;
        (
            Harness {
                controller,
                advisories,
                html,
            },
            tx,
        )
    }

    fn type_text(controller: &mut Controller, text: &str) {
        for ch in text.chars() {
            controller.press(Key::code(KeyCode::Char(ch)));
        }
    }

    #[tokio::test]
    async fn test_submit_plain_result_and_recall() {
        let mut h = harness(ScriptedBackend::ready().with_result("1+1", Some("2"))).await;
        let before = h.controller.transcript().len();

        h.controller.submit("1+1").await;

        let transcript = h.controller.transcript();
        assert_eq!(transcript.len(), before + 1);
        assert_eq!(
            transcript.last(),
            Some(&TranscriptEntry {
                input: "1+1".to_string(),
                output: Some("2".to_string()),
                classification: OutputClass::Plain,
            })
        );
        assert_eq!(h.controller.state(), ExecutionState::Idle);

        h.controller.recall_older();
        assert_eq!(h.controller.buffer().text(), "1+1");
        assert_eq!(h.controller.history().cursor(), 0);
    }

    #[tokio::test]
    async fn test_blank_submit_is_noop() {
        let mut h = harness(ScriptedBackend::ready()).await;
        let entries = h.controller.transcript().len();
        let stored = h.controller.store().len();

        for blank in ["", "   ", "\n\t\n"] {
            h.controller.submit(blank).await;
        }

        assert_eq!(h.controller.transcript().len(), entries);
        assert_eq!(h.controller.store().len(), stored);
        assert!(h.controller.backend().evaluated().is_empty());
        assert!(h.advisories.messages().is_empty());
    }

    #[tokio::test]
    async fn test_submit_before_ready_is_dropped_with_advisory() {
        let mut h = harness(ScriptedBackend::not_ready()).await;

        h.controller.submit("1+1").await;

        assert!(h.controller.transcript().is_empty());
        assert!(h.controller.store().is_empty());
        assert_eq!(h.advisories.messages().len(), 1);
        assert!(h.advisories.messages()[0].contains("still loading"));
    }

    #[tokio::test]
    async fn test_submit_after_backend_exit_reports_exit() {
        let mut h = harness(ScriptedBackend::ready()).await;
        let entries = h.controller.transcript().len();
        h.controller.backend().exit();

        h.controller.submit("1+1").await;
        type_text(&mut h.controller, "os.pa");
        h.controller.complete().await;

        assert_eq!(h.controller.transcript().len(), entries);
        let messages = h.advisories.messages();
        assert_eq!(messages.len(), 2);
        assert!(messages.iter().all(|m| m.contains("has exited")), "got {:?}", messages);
    }

    #[tokio::test]
    async fn test_second_begin_while_busy_is_rejected() {
        let mut h = harness(ScriptedBackend::ready()).await;

        let first = h.controller.begin("slow()").unwrap();
        assert!(h.controller.is_busy());
        assert_eq!(h.controller.pending_input(), Some("slow()"));

        assert_eq!(h.controller.begin("fast()"), None);
        assert_eq!(h.advisories.messages().len(), 1);
        assert!(h.advisories.messages()[0].contains("previous input"));

        h.controller.finish(first, Ok(Some("done".to_string())));
        assert!(!h.controller.is_busy());
        assert_eq!(h.controller.pending_input(), None);
        let inputs: Vec<&str> = h
            .controller
            .transcript()
            .iter()
            .map(|e| e.input.as_str())
            .collect();
        assert!(!inputs.contains(&"fast()"));
    }

    #[tokio::test]
    async fn test_stale_dispatch_is_ignored() {
        let mut h = harness(ScriptedBackend::ready()).await;
        let first = h.controller.begin("a").unwrap();
        let forged = Dispatch {
            id: first.id() + 100,
            code: "b".to_string(),
        };
        let len = h.controller.transcript().len();

        h.controller.finish(forged, Ok(None));
        assert!(h.controller.is_busy());
        assert_eq!(h.controller.transcript().len(), len);

        h.controller.finish(first, Ok(None));
        assert_eq!(h.controller.transcript().len(), len + 1);
    }

    #[tokio::test]
    async fn test_html_result_goes_to_sink() {
        let mut h = harness(
            ScriptedBackend::ready().with_result("show()", Some("<html>hi</html>")),
        )
        .await;

        h.controller.submit("show()").await;

        let last = h.controller.transcript().last().unwrap();
        assert_eq!(last.input, "show()");
        assert_eq!(last.output, None);
        assert_eq!(last.classification, OutputClass::Html);
        assert_eq!(h.html.messages(), vec!["<html>hi</html>".to_string()]);
    }

    #[tokio::test]
    async fn test_execution_error_becomes_persisted_entry() {
        let mut h = harness(
            ScriptedBackend::ready().with_error("1/0", "ZeroDivisionError: division by zero"),
        )
        .await;

        h.controller.submit("1/0").await;

        let last = h.controller.transcript().last().unwrap();
        assert_eq!(last.classification, OutputClass::Error);
        assert_eq!(
            last.output.as_deref(),
            Some("[!!] ZeroDivisionError: division by zero")
        );
        assert_eq!(h.controller.store().len(), h.controller.transcript().len());
        assert!(h.advisories.messages().is_empty());
    }

    #[tokio::test]
    async fn test_terminal_output_while_busy_follows_user_entry() {
        let (mut h, _tx) = chatty_harness(|b| {
            b.with_result("print('x')", None)
                .with_chatter("print('x')", vec![TerminalChunk::stdout("x\n")])
        })
        .await;
        let before = h.controller.transcript().len();

        h.controller.submit("print('x')").await;

        let new = &h.controller.transcript()[before..];
        assert_eq!(new.len(), 2);
        assert_eq!(new[0].input, "print('x')");
        assert_eq!(new[0].output, None);
        assert_eq!(new[1].input, "");
        assert_eq!(new[1].output.as_deref(), Some("[>] x\n"));
        assert_eq!(new[1].classification, OutputClass::Terminal);
    }

    #[tokio::test]
    async fn test_terminal_slot_is_last_write_wins() {
        let (mut h, tx) = chatty_harness(|b| b).await;
        let dispatch = h.controller.begin("work()").unwrap();

        tx.send(TerminalChunk::stdout("first")).unwrap();
        tx.send(TerminalChunk::stderr("second")).unwrap();
        h.controller.pump_terminal();
        let before = h.controller.transcript().len();

        h.controller.finish(dispatch, Ok(Some("1".to_string())));

        let new = &h.controller.transcript()[before..];
        assert_eq!(new.len(), 2);
        assert_eq!(new[1].output.as_deref(), Some("[!] second"));
        assert_eq!(new[1].classification, OutputClass::Warning);
    }

    #[tokio::test]
    async fn test_terminal_output_while_idle_appends_immediately() {
        let (mut h, tx) = chatty_harness(|b| b).await;
        let before = h.controller.transcript().len();

        tx.send(TerminalChunk::stdout("tick")).unwrap();
        h.controller.pump_terminal();

        assert_eq!(h.controller.transcript().len(), before + 1);
        assert!(h.controller.transcript()[before].is_synthetic());
    }

    #[tokio::test]
    async fn test_recall_with_only_probe_and_chatter_is_noop() {
        let (mut h, tx) = chatty_harness(|b| b).await;
        tx.send(TerminalChunk::stdout("boot")).unwrap();
        h.controller.pump_terminal();
        assert_eq!(h.controller.transcript().len(), 2);

        h.controller.press(Key::code(KeyCode::Up));

        assert_eq!(h.controller.history().cursor(), -1);
        assert_eq!(h.controller.buffer().text(), "");
    }

    #[tokio::test]
    async fn test_press_enter_continues_block() {
        let mut h = harness(ScriptedBackend::ready()).await;
        type_text(&mut h.controller, "for i in range(3):");

        let decision = h.controller.press(Key::code(KeyCode::Enter));

        assert_eq!(decision, KeyDecision::InsertNewline);
        assert_eq!(h.controller.buffer().text(), "for i in range(3):\n");
        assert!(h.controller.backend().evaluated().is_empty());
    }

    #[tokio::test]
    async fn test_press_enter_in_unterminated_block_does_not_submit() {
        let mut h = harness(ScriptedBackend::ready()).await;
        h.controller.buffer_mut().set("x = 1\ny = 2");

        let decision = h.controller.press(Key::code(KeyCode::Enter));

        assert_eq!(decision, KeyDecision::InsertNewline);
        assert_eq!(h.controller.buffer().text(), "x = 1\ny = 2\n");
    }

    #[tokio::test]
    async fn test_press_enter_submits_and_clears_input() {
        let mut h = harness(ScriptedBackend::ready().with_result("2*3", Some("6"))).await;
        type_text(&mut h.controller, "2*3");

        let decision = h.controller.press(Key::code(KeyCode::Enter));
        assert_eq!(decision, KeyDecision::Submit);
        h.controller.submit_input().await;

        assert_eq!(h.controller.buffer().text(), "");
        assert_eq!(
            h.controller.transcript().last().unwrap().output.as_deref(),
            Some("6")
        );
    }

    #[tokio::test]
    async fn test_recall_round_trip_restores_live_input() {
        let mut h = harness(ScriptedBackend::ready()).await;
        for code in ["a", "b", "c"] {
            h.controller.submit(code).await;
        }
        type_text(&mut h.controller, "dra");

        for _ in 0..3 {
            h.controller.press(Key::code(KeyCode::Up));
        }
        assert_eq!(h.controller.buffer().text(), "a");
        for _ in 0..3 {
            h.controller.press(Key::code(KeyCode::Down));
        }

        assert_eq!(h.controller.history().cursor(), -1);
        assert_eq!(h.controller.buffer().text(), "dra");
    }

    #[tokio::test]
    async fn test_version_probe_recorded_once() {
        let backend = ScriptedBackend::not_ready();
        let mut h = harness(backend).await;
        assert!(h.controller.transcript().is_empty());

        h.controller.backend().set_ready(true);
        h.controller.backend_ready().await;
        h.controller.backend_ready().await;

        let probes = h
            .controller
            .transcript()
            .iter()
            .filter(|e| e.is_version_probe())
            .count();
        assert_eq!(probes, 1);
        assert_eq!(h.controller.store().len(), 1);
    }

    #[tokio::test]
    async fn test_visible_entries_start_at_baseline_with_probe_first() {
        let mut store = MemoryStore::new();
        store
            .append_one(&TranscriptEntry::version_probe("old"))
            .unwrap();
        store
            .append_one(&TranscriptEntry::new("old()", Some("1".to_string())))
            .unwrap();
        let mut h = harness_with_store(ScriptedBackend::ready(), store).await;

        // Earlier probe filtered, earlier submission kept but not rendered
        assert_eq!(h.controller.history().baseline(), 1);
        h.controller.submit("new()").await;

        let visible = h.controller.visible_entries();
        assert_eq!(visible.len(), 2);
        assert!(visible[0].is_version_probe());
        assert_eq!(visible[0].output.as_deref(), Some("3.12.1 (scripted)"));
        assert_eq!(h.controller.version(), Some("3.12.1 (scripted)"));
        assert_eq!(visible[1].input, "new()");

        // Earlier sessions are still recallable
        h.controller.recall_older();
        h.controller.recall_older();
        assert_eq!(h.controller.buffer().text(), "old()");
    }

    #[tokio::test]
    async fn test_start_trims_store_to_max_history() {
        let mut store = MemoryStore::new();
        for i in 0..15 {
            store
                .append_one(&TranscriptEntry::new(format!("x{i}"), None))
                .unwrap();
        }
        let (_tx, rx) = terminal_channel();
        let mut controller = SessionController::new(ScriptedBackend::not_ready(), store, rx)
            .with_config(SessionConfig::default().with_max_history(10));
        controller.start().await;

        assert_eq!(controller.store().len(), 10);
        assert_eq!(controller.transcript().len(), 10);
        assert_eq!(controller.transcript()[0].input, "x5");
        assert_eq!(controller.history().baseline(), 10);
    }

    #[tokio::test]
    async fn test_clear_view_hides_transcript() {
        let mut h = harness(ScriptedBackend::ready()).await;
        h.controller.submit("1").await;
        assert!(!h.controller.visible_entries().is_empty());

        h.controller.clear_view();

        assert!(h.controller.visible_entries().is_empty());
        h.controller.recall_older();
        assert_eq!(h.controller.buffer().text(), "1");
    }

    #[tokio::test]
    async fn test_completion_failure_advises_and_returns_nothing() {
        let mut h = harness(ScriptedBackend::ready().with_members("os", &["path"])).await;
        h.controller.buffer_mut().set("os.pa");
        assert_eq!(h.controller.complete().await, vec!["path".to_string()]);
        assert_eq!(h.controller.buffer().text(), "os.path");

        h.controller.buffer_mut().set("missing.x");
        assert!(h.controller.complete().await.is_empty());
        assert!(h.controller.candidates().is_empty());
        assert_eq!(h.advisories.messages().len(), 1);
        assert!(h.advisories.messages()[0].starts_with("Completion unavailable"));
    }

    /// Store whose every operation fails
    struct BrokenStore;

    impl HistoryStore for BrokenStore {
        fn load_all(&mut self) -> Result<Vec<TranscriptEntry>, StoreError> {
            Err(StoreError::Io(std::io::Error::other("disk gone")))
        }

        fn append_one(&mut self, _entry: &TranscriptEntry) -> Result<u64, StoreError> {
            Err(StoreError::Io(std::io::Error::other("disk gone")))
        }

        fn save_all(&mut self, _entries: &[TranscriptEntry]) -> Result<(), StoreError> {
            Err(StoreError::Io(std::io::Error::other("disk gone")))
        }
    }

    #[tokio::test]
    async fn test_persistence_failures_degrade_without_blocking() {
        let (_tx, rx) = terminal_channel();
        let advisories = Recorder::default();
        let mut controller = SessionController::new(
            ScriptedBackend::ready().with_result("1+1", Some("2")),
            BrokenStore,
            rx,
        )
        .with_advisory(advisories.callback());

        controller.start().await;
        controller.submit("1+1").await;

        // load failure, probe write failure, submission write failure
        assert_eq!(advisories.messages().len(), 3);
        assert!(advisories.messages()[0].contains("disk gone"));
        assert_eq!(controller.transcript().len(), 2);
        assert_eq!(controller.transcript()[1].output.as_deref(), Some("2"));
        assert_eq!(controller.state(), ExecutionState::Idle);
    }

    #[tokio::test]
    async fn test_torn_history_file_is_repaired_and_keeps_persisting()
    -> Result<(), StoreError> {
        let dir = tempfile::TempDir::new()?;
        let path = dir.path().join("history.jsonl");
        let mut seed = JsonlStore::new(&path);
        seed.append_one(&TranscriptEntry::new("x = 1", None))?;
        let mut contents = std::fs::read_to_string(&path)?;
        contents.push_str("{\"input\":\"y = 2\",\"outp");
        std::fs::write(&path, contents)?;

        let (_tx, rx) = terminal_channel();
        let advisories = Recorder::default();
        let mut controller = SessionController::new(
            ScriptedBackend::ready().with_result("1+1", Some("2")),
            JsonlStore::new(&path),
            rx,
        )
        .with_advisory(advisories.callback());
        controller.start().await;
        controller.submit("1+1").await;

        assert_eq!(advisories.messages().len(), 1);
        assert!(advisories.messages()[0].contains("incomplete"));

        let stored = JsonlStore::new(&path).load_all()?;
        let inputs: Vec<&str> = stored.iter().map(|e| e.input.as_str()).collect();
        assert_eq!(inputs[0], "x = 1");
        assert_eq!(inputs.last().copied(), Some("1+1"));
        assert_eq!(stored.len(), 3);
        Ok(())
    }
}
