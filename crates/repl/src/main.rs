//! evalbox - terminal REPL console
//!
//! Drives a long-lived interpreter process from a full-screen terminal UI.
//!
//! Usage:
//!   evalbox                          # python3, history in the data dir
//!   evalbox --interpreter pypy3      # another interpreter
//!   evalbox --no-history             # nothing written to disk
//!
//! Keys:
//!   Enter                            # submit, or continue an open block
//!   Shift+Enter                      # always insert a newline
//!   Tab                              # complete `object.member`
//!   Up / Down                        # walk earlier submissions
//!   Esc, Ctrl+U                      # discard the input
//!   Ctrl+L                           # clear the screen
//!   Ctrl+C, Ctrl+D                   # quit

mod app;
mod backend;
mod html;
mod keys;
mod ui;

use app::{App, Store, notice_callback};
use backend::ProcessBackend;
use clap::Parser as ClapParser;
use crossterm::{
    event::{
        self, Event, KeyEventKind, KeyboardEnhancementFlags, PopKeyboardEnhancementFlags,
        PushKeyboardEnhancementFlags,
    },
    execute,
    terminal::{
        EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
        supports_keyboard_enhancement,
    },
};
use evalbox::{JsonlStore, MemoryStore, SessionConfig, SessionController, terminal_channel};
use html::HtmlFiles;
use ratatui::{Terminal, backend::CrosstermBackend};
use std::fs::{self, OpenOptions};
use std::io::{self, Stdout, stdout};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// How long to wait for a key before redrawing
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(ClapParser)]
#[command(name = "evalbox")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Terminal REPL console for an interpreter subprocess", long_about = None)]
struct Args {
    /// Interpreter command line
    #[arg(long, env = "EVALBOX_INTERPRETER", default_value = "python3")]
    interpreter: String,

    /// History file (defaults to the user data directory)
    #[arg(long, conflicts_with = "no_history")]
    history: Option<PathBuf>,

    /// Keep history in memory only
    #[arg(long)]
    no_history: bool,

    /// Log file (defaults to the user data directory)
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Entries kept in the history file across sessions
    #[arg(long)]
    max_history: Option<usize>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    if let Err(e) = run(args).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), String> {
    let data_dir = dirs::data_local_dir().map(|d| d.join("evalbox"));

    let log_file = args
        .log_file
        .clone()
        .or_else(|| data_dir.as_ref().map(|d| d.join("evalbox.log")));
    if let Some(path) = &log_file {
        init_logging(path)?;
    }

    let mut config = SessionConfig::from_env();
    if let Some(max) = args.max_history {
        config = config.with_max_history(max);
    }

    let store: Store = if args.no_history {
        Box::new(MemoryStore::new())
    } else {
        match args
            .history
            .clone()
            .or_else(|| data_dir.as_ref().map(|d| d.join("history.jsonl")))
        {
            Some(path) => {
                info!("History file: {}", path.display());
                Box::new(JsonlStore::new(path))
            }
            None => {
                warn!("No data directory; history will not be saved");
                Box::new(MemoryStore::new())
            }
        }
    };

    let (terminal_tx, terminal_rx) = terminal_channel();
    let backend = ProcessBackend::spawn(&args.interpreter, terminal_tx)
        .map_err(|e| format!("Failed to start interpreter '{}': {}", args.interpreter, e))?;

    let (notice_tx, notice_rx) = mpsc::unbounded_channel();
    let html = HtmlFiles::new(notice_tx.clone())?;
    let controller = SessionController::new(backend.clone(), store, terminal_rx)
        .with_config(config)
        .with_advisory(notice_callback(notice_tx))
        .with_html_sink(html);

    let mut app = App::new(controller, notice_rx, &args.interpreter);
    app.start().await;

    let result = run_tui(&mut app).await;
    backend.shutdown().await;
    result
}

/// Send logs to a file; the terminal belongs to the UI
fn init_logging(path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create log directory: {}", e))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| format!("Failed to open log file {}: {}", path.display(), e))?;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("evalbox=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

/// Set up the terminal, run the UI, and restore the terminal
async fn run_tui(app: &mut App<ProcessBackend>) -> Result<(), String> {
    enable_raw_mode().map_err(|e| format!("Failed to enable raw mode: {}", e))?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)
        .map_err(|e| format!("Failed to enter alternate screen: {}", e))?;

    // Needed for the terminal to report Shift+Enter
    let enhanced = matches!(supports_keyboard_enhancement(), Ok(true));
    if enhanced {
        let _ = execute!(
            stdout,
            PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES)
        );
    }

    let backend = CrosstermBackend::new(stdout);
    let mut terminal =
        Terminal::new(backend).map_err(|e| format!("Failed to create terminal: {}", e))?;

    let result = run_app(&mut terminal, app).await;

    if enhanced {
        let _ = execute!(terminal.backend_mut(), PopKeyboardEnhancementFlags);
    }
    let _ = disable_raw_mode();
    let _ = execute!(terminal.backend_mut(), LeaveAlternateScreen);
    let _ = terminal.show_cursor();

    result.map_err(|e| format!("Application error: {}", e))
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    app: &mut App<ProcessBackend>,
) -> io::Result<()> {
    loop {
        app.tick().await;
        terminal.draw(|frame| app.render(frame))?;

        if event::poll(POLL_INTERVAL)?
            && let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
        {
            app.handle_key(key).await;
        }

        if app.should_quit {
            break;
        }
    }

    info!("Session ended");
    Ok(())
}
