use std::{error::Error as StdError, fmt, time::Duration};

use tunegrab_common::types::SessionKey;

/// Which deadline-bound phase an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for the user to press a button.
    Choice,
    /// Running the download/convert operation.
    Task,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Choice => write!(f, "choice wait"),
            Self::Task => write!(f, "task"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A second choice wait was attempted while one is outstanding.
    #[error("session {session} is already waiting for a choice")]
    SessionBusy { session: SessionKey },

    #[error("{phase} timed out after {after:?}")]
    Timeout { phase: Phase, after: Duration },

    #[error("{phase} canceled")]
    Canceled { phase: Phase },

    /// The operation itself reported a failure.
    #[error("task failed: {source}")]
    Task {
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    /// The operation ended without reporting a result (it panicked).
    #[error("task ended without a result")]
    TaskAborted,
}

impl Error {
    #[must_use]
    pub fn task(source: anyhow::Error) -> Self {
        Self::Task {
            source: source.into(),
        }
    }

    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    #[must_use]
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled { .. })
    }
}

impl From<tunegrab_sessions::Error> for Error {
    fn from(err: tunegrab_sessions::Error) -> Self {
        match err {
            tunegrab_sessions::Error::Busy { session } => Self::SessionBusy { session },
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
