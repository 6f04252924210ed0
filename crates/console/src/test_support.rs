//! Scripted collaborators for controller tests.

use crate::backend::{BackendError, ExecutionBackend, TerminalChunk, TerminalSender};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Script {
    results: HashMap<String, Result<Option<String>, String>>,
    chatter: HashMap<String, Vec<TerminalChunk>>,
    members: HashMap<String, Vec<String>>,
    evaluated: Vec<String>,
    member_queries: Vec<String>,
}

/// Backend answering from a fixed script.
///
/// Unscripted code evaluates to itself; unscripted reflection fails.
pub struct ScriptedBackend {
    ready: AtomicBool,
    exited: AtomicBool,
    version: String,
    terminal: Option<TerminalSender>,
    script: Mutex<Script>,
}

impl ScriptedBackend {
    pub fn ready() -> Self {
        Self {
            ready: AtomicBool::new(true),
            exited: AtomicBool::new(false),
            version: "3.12.1 (scripted)".to_string(),
            terminal: None,
            script: Mutex::new(Script::default()),
        }
    }

    pub fn not_ready() -> Self {
        let backend = Self::ready();
        backend.ready.store(false, Ordering::SeqCst);
        backend
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Simulate the interpreter going away
    pub fn exit(&self) {
        self.ready.store(false, Ordering::SeqCst);
        self.exited.store(true, Ordering::SeqCst);
    }

    pub fn with_terminal(mut self, tx: TerminalSender) -> Self {
        self.terminal = Some(tx);
        self
    }

    pub fn with_result(self, code: &str, value: Option<&str>) -> Self {
        self.script
            .lock()
            .unwrap()
            .results
            .insert(code.to_string(), Ok(value.map(str::to_string)));
        self
    }

    pub fn with_error(self, code: &str, message: &str) -> Self {
        self.script
            .lock()
            .unwrap()
            .results
            .insert(code.to_string(), Err(message.to_string()));
        self
    }

    /// Emit `chunks` on the terminal channel while `code` is evaluating
    pub fn with_chatter(self, code: &str, chunks: Vec<TerminalChunk>) -> Self {
        self.script
            .lock()
            .unwrap()
            .chatter
            .insert(code.to_string(), chunks);
        self
    }

    pub fn with_members(self, expr: &str, names: &[&str]) -> Self {
        self.script.lock().unwrap().members.insert(
            expr.to_string(),
            names.iter().map(|s| s.to_string()).collect(),
        );
        self
    }

    pub fn evaluated(&self) -> Vec<String> {
        self.script.lock().unwrap().evaluated.clone()
    }

    pub fn member_queries(&self) -> Vec<String> {
        self.script.lock().unwrap().member_queries.clone()
    }
}

impl ExecutionBackend for ScriptedBackend {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn has_exited(&self) -> bool {
        self.exited.load(Ordering::SeqCst)
    }

    fn evaluate(
        &self,
        code: &str,
    ) -> impl Future<Output = Result<Option<String>, BackendError>> + Send {
        let mut script = self.script.lock().unwrap();
        script.evaluated.push(code.to_string());
        if let (Some(tx), Some(chunks)) = (&self.terminal, script.chatter.get(code)) {
            for chunk in chunks {
                let _ = tx.send(chunk.clone());
            }
        }
        let outcome = match script.results.get(code) {
            Some(Ok(value)) => Ok(value.clone()),
            Some(Err(message)) => Err(BackendError::Rejected(message.clone())),
            None => Ok(Some(code.to_string())),
        };
        async move {
            tokio::task::yield_now().await;
            outcome
        }
    }

    fn members(
        &self,
        object_expr: &str,
    ) -> impl Future<Output = Result<Vec<String>, BackendError>> + Send {
        let mut script = self.script.lock().unwrap();
        script.member_queries.push(object_expr.to_string());
        let outcome = script.members.get(object_expr).cloned().ok_or_else(|| {
            BackendError::Rejected(format!("NameError: name '{}' is not defined", object_expr))
        });
        async move { outcome }
    }

    fn version(&self) -> impl Future<Output = Result<String, BackendError>> + Send {
        let version = self.version.clone();
        async move { Ok(version) }
    }
}

/// Collects everything pushed to a host callback
#[derive(Clone, Default)]
pub struct Recorder(Arc<Mutex<Vec<String>>>);

impl Recorder {
    pub fn messages(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    /// A callback appending to this recorder
    pub fn callback(&self) -> impl Fn(&str) + Send + 'static {
        let inner = Arc::clone(&self.0);
        move |message: &str| inner.lock().unwrap().push(message.to_string())
    }
}
