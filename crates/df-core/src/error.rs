use crate::ast::NodeId;
use std::result;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The fragment contains a node that has no translation (parse error placeholder and similar).
    /// Callers treat it as "skip analysis", never as a crash.
    #[error("unsupported construct at {node}: {reason}")]
    Unsupported { node: NodeId, reason: String },
    /// A flow listener refused a notification; passed through as is.
    #[error("listener failure: {0}")]
    Listener(String),
    #[error("deferred offset #{placeholder} was never resolved")]
    UnresolvedOffset { placeholder: usize },
    #[error("Generic error: {0}")]
    Generic(String),
}

impl Error {
    pub fn listener(message: impl Into<String>) -> Self {
        Error::Listener(message.into())
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, Error::Unsupported { .. })
    }
}

pub type Result<T> = result::Result<T, Error>;

// Convert from eyre::Report to our Error type
impl From<eyre::Report> for Error {
    fn from(err: eyre::Report) -> Self {
        Error::Generic(err.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Generic(s)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Generic(e.to_string())
    }
}
