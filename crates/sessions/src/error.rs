use {thiserror::Error, tunegrab_common::types::SessionKey};

#[derive(Debug, Error)]
pub enum Error {
    /// The session already has an outstanding choice wait.
    #[error("session {session} is already waiting for a choice")]
    Busy { session: SessionKey },
}

pub type Result<T> = std::result::Result<T, Error>;
