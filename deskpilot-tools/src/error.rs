use crate::platform::OsError;
use thiserror::Error;

/// Failure raised inside a capability handler.
///
/// The dispatcher turns every variant into an `ok: false` result; nothing of
/// this type escapes past it.
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Missing parameter: {0}")]
    MissingParameter(&'static str),

    #[error("{0}")]
    Failed(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Os(#[from] OsError),

    #[error("Operation timed out after {0}ms")]
    Timeout(u64),

    #[error("Handler panicked")]
    Panicked,

    #[error("Handler task cancelled")]
    Cancelled,

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),
}

impl HandlerError {
    /// Wrap an IO error with what was being attempted.
    pub fn io(context: impl Into<String>) -> impl FnOnce(std::io::Error) -> Self {
        let context = context.into();
        move |source| HandlerError::Io { context, source }
    }
}
