//! Error kinds for document operations.
//!
//! Every public operation on [`crate::document::Document`] returns
//! `Result<_, DocError>`. There is no "fallthrough" variant here: fallthrough
//! is a dispatch concept for layered collaborators external to this crate;
//! within the core, an operation either succeeds or fails with one of these
//! kinds.

use std::fmt;
use std::io;

/// Why a mutation was rejected, or why a query could not be answered.
#[derive(Debug)]
pub enum DocError {
    /// A required mark, path, or callback was not supplied.
    MissingArgument(&'static str),
    /// An argument was supplied but is not valid for this operation.
    InvalidArgument(InvalidArgument),
    /// The document is readonly; no mutation was applied.
    ReadOnly,
    /// Load/save I/O failed.
    Io(io::Error),
    /// The on-disk file no longer matches the last-stat snapshot.
    OutOfSync(OutOfSync),
}

/// Detail for [`DocError::InvalidArgument`].
#[derive(Debug)]
pub enum InvalidArgument {
    /// A view slot index that does not name a live view.
    ViewIndexOutOfRange(usize),
    /// A mark belongs to a different document than the one it was passed to.
    MarkWrongDocument,
    /// A range's endpoints are reversed and the operation does not auto-swap.
    RangeReversed,
    /// A view was deleted by an observer other than its owner.
    NotViewOwner,
    /// A named flag setter (`doc:set:<name>`) does not exist.
    UnknownFlag(String),
}

/// Detail for [`DocError::OutOfSync`].
#[derive(Debug)]
pub struct OutOfSync {
    /// What the stat snapshot looked like when the document was last
    /// revisited (load or save).
    pub expected: Option<(u64, u64, i64)>,
    /// What stat currently reports (dev, ino, mtime), if the file is
    /// still reachable.
    pub found: Option<(u64, u64, i64)>,
}

impl fmt::Display for DocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocError::MissingArgument(name) => write!(f, "missing required argument: {name}"),
            DocError::InvalidArgument(detail) => write!(f, "invalid argument: {detail}"),
            DocError::ReadOnly => write!(f, "document is readonly"),
            DocError::Io(e) => write!(f, "I/O failure: {e}"),
            DocError::OutOfSync(detail) => {
                write!(
                    f,
                    "file changed on disk since it was last read (expected {:?}, found {:?})",
                    detail.expected, detail.found
                )
            }
        }
    }
}

impl fmt::Display for InvalidArgument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidArgument::ViewIndexOutOfRange(i) => write!(f, "view index {i} out of range"),
            InvalidArgument::MarkWrongDocument => write!(f, "mark belongs to another document"),
            InvalidArgument::RangeReversed => write!(f, "range endpoints are reversed"),
            InvalidArgument::NotViewOwner => {
                write!(f, "view can only be deleted by its owner")
            }
            InvalidArgument::UnknownFlag(name) => write!(f, "unknown document flag: {name}"),
        }
    }
}

impl std::error::Error for DocError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DocError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for DocError {
    fn from(e: io::Error) -> Self {
        DocError::Io(e)
    }
}

/// Converts an internal `anyhow::Result` (used by I/O helpers that stream
/// file content) into the public, typed `DocError` boundary.
pub(crate) fn io_err(e: anyhow::Error) -> DocError {
    match e.downcast::<io::Error>() {
        Ok(io_e) => DocError::Io(io_e),
        Err(e) => DocError::Io(io::Error::other(e.to_string())),
    }
}

pub type DocResult<T> = Result<T, DocError>;
