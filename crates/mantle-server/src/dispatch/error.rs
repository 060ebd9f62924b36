use std::fmt;

use mantle_document::{Document, DocumentError, doc};
use mantle_query::FilterError;
use mantle_store::StoreError;
use thiserror::Error;

/// Protocol error codes surfaced in error replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InternalError,
    BadValue,
    HostUnreachable,
    FailedToParse,
    TypeMismatch,
    NamespaceNotFound,
    LockBusy,
    NamespaceExists,
    CommandNotFound,
    NotImplemented,
    DuplicateKey,
}

impl ErrorCode {
    pub fn code(self) -> i32 {
        match self {
            ErrorCode::InternalError => 1,
            ErrorCode::BadValue => 2,
            ErrorCode::HostUnreachable => 6,
            ErrorCode::FailedToParse => 9,
            ErrorCode::TypeMismatch => 14,
            ErrorCode::NamespaceNotFound => 26,
            ErrorCode::LockBusy => 46,
            ErrorCode::NamespaceExists => 48,
            ErrorCode::CommandNotFound => 59,
            ErrorCode::NotImplemented => 238,
            ErrorCode::DuplicateKey => 11000,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ErrorCode::InternalError => "InternalError",
            ErrorCode::BadValue => "BadValue",
            ErrorCode::HostUnreachable => "HostUnreachable",
            ErrorCode::FailedToParse => "FailedToParse",
            ErrorCode::TypeMismatch => "TypeMismatch",
            ErrorCode::NamespaceNotFound => "NamespaceNotFound",
            ErrorCode::LockBusy => "LockBusy",
            ErrorCode::NamespaceExists => "NamespaceExists",
            ErrorCode::CommandNotFound => "CommandNotFound",
            ErrorCode::NotImplemented => "NotImplemented",
            ErrorCode::DuplicateKey => "DuplicateKey",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.code())
    }
}

/// A recoverable command failure, answered in-band with an error reply.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct CommandError {
    pub code: ErrorCode,
    pub message: String,
}

impl CommandError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// `{ok: 0.0, errmsg, code, codeName}`, in that order.
    pub fn to_document(&self) -> Document {
        doc! {
            "ok" => 0.0,
            "errmsg" => self.message.as_str(),
            "code" => self.code.code(),
            "codeName" => self.code.name(),
        }
    }
}

impl From<StoreError> for CommandError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NamespaceExists(ns) => Self::new(
                ErrorCode::NamespaceExists,
                format!("Collection already exists. NS: {ns}"),
            ),
            StoreError::NamespaceNotFound(_) => Self::new(ErrorCode::NamespaceNotFound, "ns not found"),
            StoreError::DuplicateKey { ns, id } => Self::new(
                ErrorCode::DuplicateKey,
                format!("E11000 duplicate key error collection: {ns} index: _id_ dup key: {{ _id: {id} }}"),
            ),
            StoreError::Busy(_) => Self::new(ErrorCode::LockBusy, e.to_string()),
            StoreError::Codec(_) => Self::new(ErrorCode::BadValue, e.to_string()),
            StoreError::Unavailable(_) | StoreError::Corrupt { .. } | StoreError::UnsupportedUrl(_) => {
                Self::internal(e.to_string())
            }
        }
    }
}

impl From<FilterError> for CommandError {
    fn from(e: FilterError) -> Self {
        Self::new(ErrorCode::BadValue, e.0)
    }
}

impl From<DocumentError> for CommandError {
    fn from(e: DocumentError) -> Self {
        Self::new(ErrorCode::BadValue, e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_document_shape() {
        let doc = CommandError::new(ErrorCode::CommandNotFound, "no such command: 'frobnicate'").to_document();
        assert_eq!(doc.keys().collect::<Vec<_>>(), vec!["ok", "errmsg", "code", "codeName"]);
        assert_eq!(doc.get("ok"), Some(&0.0.into()));
        assert_eq!(doc.get("code"), Some(&59.into()));
        assert_eq!(doc.get_str("codeName"), Some("CommandNotFound"));
    }

    #[test]
    fn store_errors_map_to_codes() {
        let exists: CommandError = StoreError::NamespaceExists("db.c".into()).into();
        assert_eq!(exists.code, ErrorCode::NamespaceExists);
        assert_eq!(exists.message, "Collection already exists. NS: db.c");

        let missing: CommandError = StoreError::NamespaceNotFound("db.c".into()).into();
        assert_eq!((missing.code.code(), missing.message.as_str()), (26, "ns not found"));

        let busy: CommandError = StoreError::Busy(4).into();
        assert_eq!(busy.code.code(), 46);

        let dup: CommandError = StoreError::DuplicateKey {
            ns: "db.c".into(),
            id: "Int32(1)".into(),
        }
        .into();
        assert_eq!((dup.code.code(), dup.code.name()), (11000, "DuplicateKey"));
        assert!(dup.message.starts_with("E11000 duplicate key error collection: db.c"));
    }
}
