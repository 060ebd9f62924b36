use mantle_document::CodecError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("namespace already exists: {0}")]
    NamespaceExists(String),
    #[error("namespace not found: {0}")]
    NamespaceNotFound(String),
    #[error("duplicate _id {id} in {ns}")]
    DuplicateKey { ns: String, id: String },
    #[error("storage busy: all {0} connections in use")]
    Busy(usize),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("corrupt row in {ns}: {source}")]
    Corrupt {
        ns: String,
        #[source]
        source: CodecError,
    },
    #[error("cannot encode document: {0}")]
    Codec(#[from] CodecError),
    #[error("unsupported storage url: {0}")]
    UnsupportedUrl(String),
}
