use std::{error::Error as StdError, time::Duration};

use tunegrab_common::FromMessage;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
    #[error("{message}")]
    InvalidInput { message: String },
    #[error("video is too long: {duration:?} exceeds {limit:?}")]
    TooLong { duration: Duration, limit: Duration },
    #[error("no audio stream with itag {itag}")]
    FormatUnavailable { itag: u32 },
    #[error("{binary} exited with {status}: {stderr}")]
    Process {
        binary: String,
        status: String,
        stderr: String,
    },
    #[error("download canceled")]
    Canceled,
    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn external<E>(context: impl Into<String>, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::External {
            context: context.into(),
            source: Box::new(source),
        }
    }

    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }
}

impl FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message { message }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

tunegrab_common::impl_context!();
