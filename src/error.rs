use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The store could not be reached or the session was lost.
    #[error("connection error: {0}")]
    Connection(String),

    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("malformed snapshot at `{key}`: {reason}")]
    MalformedSnapshot { key: String, reason: String },

    #[error("key `{0}` vanished before it could be read")]
    KeyVanished(String),

    #[error("failed to restore `{key}`: {reason}")]
    PerKeyWrite { key: String, reason: String },

    #[error("key `{key}` has unsupported type `{type_name}`")]
    UnsupportedType { key: String, type_name: String },

    /// Invalid frame or a reply of an unexpected shape.
    #[error("protocol error; {0}")]
    Protocol(String),

    /// Error reply sent by the store.
    #[error("server error: {0}")]
    Server(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn malformed(key: impl ToString, reason: impl ToString) -> Error {
        Error::MalformedSnapshot {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Errors that leave the session unusable. A run stops on these instead
    /// of recording them against a single key.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Connection(_) | Error::Timeout(_) | Error::Io(_))
    }
}

impl From<crate::resp::Error> for Error {
    fn from(src: crate::resp::Error) -> Error {
        match src {
            crate::resp::Error::Incomplete => Error::Protocol("stream ended early".into()),
            crate::resp::Error::Invalid(msg) => Error::Protocol(msg),
        }
    }
}
