use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RetrievalError>;

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("document not found: {0}")]
    DocumentNotFound(String),
    #[error("document already indexed: {0}")]
    DuplicateDocument(String),
    #[error(transparent)]
    Embedding(#[from] EmbedError),
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Failures of an embedding procedure. Never surfaced from a query; the
/// query path falls back to hashed bag-of-words vectors instead.
#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("embedding request failed: {0}")]
    Http(String),
    #[error("embedding request timed out")]
    Timeout,
    #[error("unexpected embedding response: {0}")]
    BadResponse(String),
    #[error("embedder unavailable: {0}")]
    Unavailable(String),
}

impl From<reqwest::Error> for EmbedError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            EmbedError::Timeout
        } else {
            EmbedError::Http(e.to_string())
        }
    }
}
