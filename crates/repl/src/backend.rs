//! Interpreter Subprocess Backend
//!
//! Runs a long-lived interpreter child process and talks to it with
//! newline-delimited JSON over stdin/stdout.
//!
//! Requests: `{"id":1,"op":"eval"|"members","code":"..."}`
//!
//! Replies:
//! - `{"kind":"ready","version":"..."}` once the driver is up
//! - `{"kind":"result","id":1,"value":"..."|null}`
//! - `{"kind":"members","id":1,"names":[...]}`
//! - `{"kind":"error","id":1,"message":"..."}`
//! - `{"kind":"stdout"|"stderr","text":"..."}` at any time
//!
//! Replies carrying an id complete the matching request; stream replies go
//! to the terminal channel.

use evalbox::{BackendError, ExecutionBackend, TerminalChunk, TerminalSender};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::{Mutex, oneshot};
use tracing::{debug, info, warn};

/// Driver program handed to the interpreter
const DRIVER: &str = include_str!("driver.py");

#[derive(Serialize)]
struct Request<'a> {
    id: u64,
    op: &'static str,
    code: &'a str,
}

#[derive(Deserialize, Debug, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum Reply {
    Ready { version: String },
    Result { id: u64, value: Option<String> },
    Members { id: u64, names: Vec<String> },
    Error { id: u64, message: String },
    Stdout { text: String },
    Stderr { text: String },
}

/// Payload that completes a request
#[derive(Debug)]
enum Answer {
    Value(Option<String>),
    Members(Vec<String>),
    Failed(String),
}

struct Shared {
    stdin: Mutex<ChildStdin>,
    pending: Mutex<HashMap<u64, oneshot::Sender<Answer>>>,
    next_id: AtomicU64,
    ready: AtomicBool,
    exited: AtomicBool,
    version: OnceLock<String>,
    child: Mutex<Child>,
}

/// Handle to the interpreter process; clones share the process
#[derive(Clone)]
pub struct ProcessBackend {
    shared: Arc<Shared>,
}

impl ProcessBackend {
    /// Start `interpreter` (a shell-style command line) with the driver.
    ///
    /// Must be called within a tokio runtime. The backend reports ready
    /// once the driver's handshake arrives.
    pub fn spawn(interpreter: &str, terminal: TerminalSender) -> Result<Self, BackendError> {
        let argv = shlex::split(interpreter).unwrap_or_default();
        let Some((program, args)) = argv.split_first() else {
            return Err(BackendError::Protocol(format!(
                "cannot parse interpreter command '{}'",
                interpreter
            )));
        };

        let mut child = Command::new(program)
            .args(args)
            .arg("-u")
            .arg("-c")
            .arg(DRIVER)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child.stdin.take().ok_or_else(|| missing_pipe("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing_pipe("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing_pipe("stderr"))?;

        let shared = Arc::new(Shared {
            stdin: Mutex::new(stdin),
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            ready: AtomicBool::new(false),
            exited: AtomicBool::new(false),
            version: OnceLock::new(),
            child: Mutex::new(child),
        });

        tokio::spawn(read_replies(
            Arc::downgrade(&shared),
            stdout,
            terminal.clone(),
        ));
        tokio::spawn(relay_stderr(stderr, terminal));
        info!("Spawned interpreter '{}'", interpreter);

        Ok(Self { shared })
    }

    /// Stop the interpreter process
    pub async fn shutdown(&self) {
        self.shared.ready.store(false, Ordering::SeqCst);
        if let Err(e) = self.shared.child.lock().await.kill().await {
            debug!("Interpreter already gone: {}", e);
        }
    }
}

fn missing_pipe(name: &str) -> BackendError {
    BackendError::Protocol(format!("interpreter {} unavailable", name))
}

impl Shared {
    async fn request(&self, op: &'static str, code: &str) -> Result<Answer, BackendError> {
        if !self.ready.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut line = serde_json::to_string(&Request { id, op, code })
            .map_err(|e| BackendError::Protocol(e.to_string()))?;
        line.push('\n');

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let written = {
            let mut stdin = self.stdin.lock().await;
            match stdin.write_all(line.as_bytes()).await {
                Ok(()) => stdin.flush().await,
                Err(e) => Err(e),
            }
        };
        if let Err(e) = written {
            self.pending.lock().await.remove(&id);
            return Err(e.into());
        }

        rx.await.map_err(|_| {
            BackendError::Protocol("interpreter exited before replying".to_string())
        })
    }

    async fn dispatch(&self, reply: Reply, terminal: &TerminalSender) {
        match reply {
            Reply::Ready { version } => {
                info!("Interpreter ready: {}", version);
                let _ = self.version.set(version);
                self.ready.store(true, Ordering::SeqCst);
            }
            Reply::Result { id, value } => self.answer(id, Answer::Value(value)).await,
            Reply::Members { id, names } => self.answer(id, Answer::Members(names)).await,
            Reply::Error { id, message } => self.answer(id, Answer::Failed(message)).await,
            Reply::Stdout { text } => {
                let _ = terminal.send(TerminalChunk::stdout(text));
            }
            Reply::Stderr { text } => {
                let _ = terminal.send(TerminalChunk::stderr(text));
            }
        }
    }

    async fn answer(&self, id: u64, answer: Answer) {
        match self.pending.lock().await.remove(&id) {
            Some(tx) => {
                let _ = tx.send(answer);
            }
            None => debug!("Dropping reply to abandoned request {}", id),
        }
    }
}

async fn read_replies(weak: Weak<Shared>, stdout: ChildStdout, terminal: TerminalSender) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!("Reading from interpreter failed: {}", e);
                break;
            }
        };
        let Some(shared) = weak.upgrade() else {
            return;
        };
        match serde_json::from_str::<Reply>(&line) {
            Ok(reply) => shared.dispatch(reply, &terminal).await,
            Err(e) => {
                // Bytes written straight to the process's stdout
                debug!("Non-protocol interpreter output ({}): {}", e, line);
                let _ = terminal.send(TerminalChunk::stdout(line));
            }
        }
    }

    if let Some(shared) = weak.upgrade() {
        shared.ready.store(false, Ordering::SeqCst);
        shared.exited.store(true, Ordering::SeqCst);
        // Dropping the senders fails every waiting request
        shared.pending.lock().await.clear();

        let status = match shared.child.lock().await.try_wait() {
            Ok(Some(status)) => format!(" ({})", status),
            _ => String::new(),
        };
        warn!("Interpreter exited{}", status);
        let _ = terminal.send(TerminalChunk::stderr(format!(
            "Interpreter exited{}\n",
            status
        )));
    }
}

async fn relay_stderr(stderr: ChildStderr, terminal: TerminalSender) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let _ = terminal.send(TerminalChunk::stderr(format!("{}\n", line)));
    }
}

impl ExecutionBackend for ProcessBackend {
    fn is_ready(&self) -> bool {
        self.shared.ready.load(Ordering::SeqCst)
    }

    fn has_exited(&self) -> bool {
        self.shared.exited.load(Ordering::SeqCst)
    }

    fn evaluate(
        &self,
        code: &str,
    ) -> impl Future<Output = Result<Option<String>, BackendError>> + Send {
        let shared = Arc::clone(&self.shared);
        let code = code.to_string();
        async move {
            match shared.request("eval", &code).await? {
                Answer::Value(value) => Ok(value),
                Answer::Failed(message) => Err(BackendError::Rejected(message)),
                Answer::Members(_) => Err(BackendError::Protocol(
                    "members reply to an eval request".to_string(),
                )),
            }
        }
    }

    fn members(
        &self,
        object_expr: &str,
    ) -> impl Future<Output = Result<Vec<String>, BackendError>> + Send {
        let shared = Arc::clone(&self.shared);
        let expr = object_expr.to_string();
        async move {
            match shared.request("members", &expr).await? {
                Answer::Members(names) => Ok(names),
                Answer::Failed(message) => Err(BackendError::Rejected(message)),
                Answer::Value(_) => Err(BackendError::Protocol(
                    "value reply to a members request".to_string(),
                )),
            }
        }
    }

    fn version(&self) -> impl Future<Output = Result<String, BackendError>> + Send {
        let version = self
            .shared
            .version
            .get()
            .cloned()
            .ok_or(BackendError::Unavailable);
        async move { version }
    }
}
