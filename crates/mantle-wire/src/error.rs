use std::io;

use mantle_document::CodecError;
use thiserror::Error;

/// Errors raised while framing or parsing messages.
///
/// Any of these leaves the stream position untrustworthy; the caller is
/// expected to close the connection rather than reply in-band.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("connection closed")]
    ConnectionClosed,
    #[error("stream ended after {read} of {expected} bytes")]
    UnexpectedEof { read: usize, expected: usize },
    #[error("malformed message: {0}")]
    MalformedMessage(String),
    #[error("{0} trailing bytes in message body")]
    TrailingData(usize),
    #[error("unsupported opcode {0}")]
    UnsupportedOpCode(i32),
    #[error("invalid document in message: {0}")]
    Document(#[from] CodecError),
}

impl WireError {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        WireError::MalformedMessage(msg.into())
    }
}
