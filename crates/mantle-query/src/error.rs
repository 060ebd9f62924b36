use thiserror::Error;

/// A filter, sort, or projection document that cannot be interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct FilterError(pub String);

impl FilterError {
    pub(crate) fn new(msg: impl Into<String>) -> Self {
        FilterError(msg.into())
    }
}
