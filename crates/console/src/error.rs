//! Session error taxonomy.
//!
//! None of these are fatal to a session. Execution errors become transcript
//! entries; everything else is reported on the advisory channel using the
//! `Display` text.

use crate::backend::BackendError;
use crate::store::StoreError;

#[derive(Debug)]
pub enum SessionError {
    /// Backend not yet initialized; the submission is dropped
    BackendUnavailable,
    /// The backend stopped and will not come back; the submission is dropped
    BackendExited,
    /// An execution is already in flight; the submission is dropped
    Busy,
    /// The backend rejected the submitted code
    Execution(String),
    /// The reflection query behind completion failed
    Completion(BackendError),
    /// The history store could not be read or written
    Persistence(StoreError),
}

impl SessionError {
    /// The error for a backend that is not ready, depending on whether it
    /// can still become ready
    pub(crate) fn unavailable(exited: bool) -> Self {
        if exited {
            SessionError::BackendExited
        } else {
            SessionError::BackendUnavailable
        }
    }
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::BackendUnavailable => {
                write!(f, "The interpreter is still loading; try again shortly.")
            }
            SessionError::BackendExited => {
                write!(f, "The interpreter has exited; restart to continue.")
            }
            SessionError::Busy => {
                write!(f, "Still running the previous input; wait for it to finish.")
            }
            SessionError::Execution(msg) => write!(f, "{}", msg),
            SessionError::Completion(e) => write!(f, "Completion unavailable: {}", e),
            SessionError::Persistence(e) => write!(f, "History unavailable: {}", e),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::Completion(e) => Some(e),
            SessionError::Persistence(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for SessionError {
    fn from(e: StoreError) -> Self {
        SessionError::Persistence(e)
    }
}
