use thiserror::Error;

/// Errors raised while building or mutating documents and arrays.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    #[error("duplicate key: {0}")]
    DuplicateKey(String),
    #[error("index {index} out of range for array of length {len}")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Errors raised by the binary document codec.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("malformed document: {0}")]
    MalformedDocument(String),
    #[error("{0} trailing bytes after document")]
    TrailingData(usize),
    #[error("invalid key {0:?}: keys must not contain NUL bytes")]
    InvalidKey(String),
    #[error("encoded document exceeds {limit} bytes")]
    DocumentTooLarge { limit: usize },
}

impl CodecError {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        CodecError::MalformedDocument(msg.into())
    }
}
