//! Session configuration.

/// Default number of entries kept in the history store
pub const DEFAULT_MAX_HISTORY: usize = 1000;

/// Environment variable overriding `max_history`
pub const MAX_HISTORY_ENV: &str = "EVALBOX_MAX_HISTORY";

const MIN_HISTORY: usize = 10;
const MAX_HISTORY: usize = 100_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Store entries kept across sessions; older ones are dropped when a
    /// session starts
    pub max_history: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_history: DEFAULT_MAX_HISTORY,
        }
    }
}

impl SessionConfig {
    /// Defaults overridden by the environment
    pub fn from_env() -> Self {
        let max_history = std::env::var(MAX_HISTORY_ENV)
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .map(|v| v.clamp(MIN_HISTORY, MAX_HISTORY))
            .unwrap_or(DEFAULT_MAX_HISTORY);
        Self { max_history }
    }

    pub fn with_max_history(mut self, max_history: usize) -> Self {
        self.max_history = max_history.clamp(MIN_HISTORY, MAX_HISTORY);
        self
    }
}
