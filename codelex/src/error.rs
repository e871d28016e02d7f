use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the inverted index and the BM25 scorer.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("document {0:?} is already indexed")]
    DuplicateDocument(String),
    #[error("unknown document {0:?}")]
    UnknownDocument(String),
    #[error("non-finite BM25 score for term {term:?} in document {doc_id:?}")]
    NonFiniteScore { doc_id: String, term: String },
}

/// Errors from a token cache backend.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache store: {0}")]
    Store(#[from] sled::Error),
    #[error("cache codec: {0}")]
    Codec(#[from] bincode::Error),
}

/// Errors raised while reading corpus content.
#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("source file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("failed to read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode snippets in {}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl CorpusError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            CorpusError::NotFound(path)
        } else {
            CorpusError::Io { path, source }
        }
    }
}
