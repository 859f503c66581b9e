use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::types::ReasonCode;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Embedding failed: {0}")]
    EmbeddingFailure(String),

    #[error("Index unavailable: no snapshot has been published")]
    IndexUnavailable,

    #[error("Invalid filter: {0}")]
    FilterSyntax(String),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Invalid chunk batch: {0}")]
    InvalidBatch(String),

    #[error("Retrieval deadline of {0:?} exceeded")]
    Timeout(Duration),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed record at {path}:{line}: {source}")]
    Parse {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

impl Error {
    /// Refusal reason for failures that end a request with a REFUSE decision.
    /// `None` means the error is a caller or deployment bug and must be surfaced.
    pub fn refusal_reason(&self) -> Option<ReasonCode> {
        match self {
            Error::EmbeddingFailure(_) => Some(ReasonCode::EmbeddingFailure),
            Error::IndexUnavailable => Some(ReasonCode::IndexUnavailable),
            Error::Timeout(_) => Some(ReasonCode::RetrievalTimeout),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
