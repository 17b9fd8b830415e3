//! Error taxonomy for the embedded database boundary.

use std::io;

/// All public operations return this alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced at the embedded programmatic boundary.
///
/// Variants map 1:1 onto the `ErrorKind` taxonomy; the boundary itself
/// does not know about HTTP statuses, those belong to a façade layer
/// that is out of scope here.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Operation attempted outside `[start, shutdown)`.
    #[error("not running: {0}")]
    NotRunning(String),

    /// Unknown URI, collection, document, or object id.
    #[error("not found: {0}")]
    NotFound(String),

    /// Duplicate name in a parent, or duplicate index name in the
    /// inheritance chain.
    #[error("name in use: {0}")]
    NameInUse(String),

    /// Null/empty keys array, invalid URI, unknown media type at strict
    /// parse, mark/reset called on a retrieve stream.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Invalid validation mode on root, delete of a non-empty collection
    /// without `recursive`.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Underlying filesystem or content-file error, cause chain preserved.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Release of a lock not held by the caller.
    #[error("lock state error: {0}")]
    LockStateError(String),

    /// Schema validation rejected a body; diagnostics carried as text.
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    /// Upstream query engine error (message only, no structured cause).
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// A blocking lock acquisition exceeded its deadline.
    #[error("timed out acquiring lock: {0}")]
    Timeout(String),
}

impl Error {
    pub(crate) fn not_found<S: Into<String>>(s: S) -> Error {
        Error::NotFound(s.into())
    }

    pub(crate) fn name_in_use<S: Into<String>>(s: S) -> Error {
        Error::NameInUse(s.into())
    }

    pub(crate) fn invalid_argument<S: Into<String>>(s: S) -> Error {
        Error::InvalidArgument(s.into())
    }

    pub(crate) fn invalid_state<S: Into<String>>(s: S) -> Error {
        Error::InvalidState(s.into())
    }
}
