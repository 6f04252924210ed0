//! TUI Application
//!
//! Session state, key handling and rendering on top of the session
//! controller.
//!
//! Executions run on spawned tasks so the screen keeps redrawing while the
//! interpreter works. Their outcomes come back on a channel and are applied
//! on the next tick, together with terminal output and advisory notices.

use crate::keys::convert_key;
use crate::ui::layout::{ComputedLayout, LayoutConfig, StatusContent};
use crate::ui::repl_pane::ReplPane;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use evalbox::{
    BackendError, Dispatch, ExecutionBackend, ExecutionState, HistoryStore, KeyDecision,
    SessionController,
};
use ratatui::{
    Frame,
    layout::Rect,
    style::{Color, Style},
    text::{Line, Span},
    widgets::Paragraph,
};
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::debug;

/// How long Tab waits for the interpreter before giving up
const COMPLETION_TIMEOUT: Duration = Duration::from_millis(750);

/// Candidates listed in the status bar when Tab finds no single match
const MAX_CANDIDATES_SHOWN: usize = 8;

/// History store chosen at startup
pub type Store = Box<dyn HistoryStore + Send>;

type Outcome = (Dispatch, Result<Option<String>, BackendError>);

/// Advisory callback that forwards notices to the status bar
pub fn notice_callback(tx: UnboundedSender<String>) -> impl Fn(&str) + Send + 'static {
    move |message: &str| {
        let _ = tx.send(message.to_string());
    }
}

/// Main application state
pub struct App<B> {
    controller: SessionController<B, Store>,
    outcomes_tx: UnboundedSender<Outcome>,
    outcomes_rx: UnboundedReceiver<Outcome>,
    notices: UnboundedReceiver<String>,
    /// Status message (clears after next key)
    pub status_message: Option<String>,
    layout_config: LayoutConfig,
    /// Interpreter command, shown until the version is known
    interpreter: String,
    /// Whether the app should quit
    pub should_quit: bool,
}

impl<B> App<B>
where
    B: ExecutionBackend + Clone + Send + Sync + 'static,
{
    pub fn new(
        controller: SessionController<B, Store>,
        notices: UnboundedReceiver<String>,
        interpreter: impl Into<String>,
    ) -> Self {
        let (outcomes_tx, outcomes_rx) = mpsc::unbounded_channel();
        Self {
            controller,
            outcomes_tx,
            outcomes_rx,
            notices,
            status_message: None,
            layout_config: LayoutConfig::default(),
            interpreter: interpreter.into(),
            should_quit: false,
        }
    }

    pub async fn start(&mut self) {
        self.controller.start().await;
    }

    pub fn controller(&self) -> &SessionController<B, Store> {
        &self.controller
    }

    /// Apply everything that arrived since the last tick
    pub async fn tick(&mut self) {
        self.controller.backend_ready().await;

        while let Ok((dispatch, outcome)) = self.outcomes_rx.try_recv() {
            self.controller.finish(dispatch, outcome);
        }
        self.controller.pump_terminal();

        while let Ok(notice) = self.notices.try_recv() {
            self.status_message = Some(notice);
        }
    }

    /// Handle a key event
    pub async fn handle_key(&mut self, key: KeyEvent) {
        self.status_message = None;

        if key.modifiers.contains(KeyModifiers::CONTROL) {
            match key.code {
                KeyCode::Char('c') | KeyCode::Char('d') => {
                    self.should_quit = true;
                    return;
                }
                KeyCode::Char('l') => {
                    self.controller.clear_view();
                    return;
                }
                KeyCode::Char('u') => {
                    self.controller.reset_input();
                    return;
                }
                _ => {}
            }
        }

        if key.code == KeyCode::Esc {
            self.controller.reset_input();
            return;
        }

        let Some(key) = convert_key(key) else {
            return;
        };
        match self.controller.press(key) {
            KeyDecision::Submit => self.submit(),
            KeyDecision::ArmTabCompletion => self.complete().await,
            _ => {}
        }
    }

    fn submit(&mut self) {
        let Some(dispatch) = self.controller.begin_input() else {
            return;
        };
        let backend = self.controller.backend().clone();
        let tx = self.outcomes_tx.clone();
        tokio::spawn(async move {
            let outcome = backend.evaluate(dispatch.code()).await;
            let _ = tx.send((dispatch, outcome));
        });
    }

    async fn complete(&mut self) {
        // The interpreter answers one request at a time
        if self.controller.is_busy() {
            self.status_message = Some("Completion unavailable while code is running".to_string());
            return;
        }

        let before = self.controller.buffer().text().to_string();
        match tokio::time::timeout(COMPLETION_TIMEOUT, self.controller.complete()).await {
            Ok(candidates) => {
                if self.controller.buffer().text() == before && !candidates.is_empty() {
                    self.status_message = Some(format_candidates(&candidates));
                }
            }
            Err(_) => {
                debug!("Completion timed out");
                self.status_message = Some("Completion timed out".to_string());
            }
        }
    }

    /// Render the application to a frame
    pub fn render(&self, frame: &mut Frame) {
        let layout = ComputedLayout::compute(frame.area(), &self.layout_config);

        let entries = self.controller.visible_entries();
        let pane = ReplPane::new(&entries, self.controller.buffer())
            .pending(self.controller.pending_input());
        frame.render_widget(&pane, layout.transcript);

        self.render_status_bar(frame, layout.status);
    }

    fn state_label(&self) -> &'static str {
        let backend = self.controller.backend();
        if backend.has_exited() {
            return "exited";
        }
        if !backend.is_ready() {
            return "loading";
        }
        match self.controller.state() {
            ExecutionState::Idle => "idle",
            ExecutionState::Busy => "busy",
        }
    }

    /// Render the status bar
    fn render_status_bar(&self, frame: &mut Frame, area: Rect) {
        let history = self.controller.history();
        let status = StatusContent::new()
            .interpreter(self.controller.version().unwrap_or(&self.interpreter))
            .state(self.state_label())
            .recall(history.cursor(), history.navigable_len())
            .message(self.status_message.as_deref());

        let style = Style::default().bg(Color::DarkGray).fg(Color::White);
        let paragraph = Paragraph::new(Line::from(Span::styled(status.format(area.width), style)));
        frame.render_widget(paragraph, area);
    }
}

fn format_candidates(candidates: &[String]) -> String {
    let shown = candidates
        .iter()
        .take(MAX_CANDIDATES_SHOWN)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("  ");
    match candidates.len().saturating_sub(MAX_CANDIDATES_SHOWN) {
        0 => shown,
        more => format!("{}  (+{} more)", shown, more),
    }
}
