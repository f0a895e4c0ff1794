//! Walker error type (spec.md §4.3, §7).

/// A traversal failure on a specific path. Unlike a blanket I/O error, this
/// always carries the path that caused it, so a permission-denied on one
/// file never silently drops from the result.
#[derive(Debug, thiserror::Error)]
#[error("walk failed at {path}: {cause}")]
pub struct WalkError {
    pub path: std::path::PathBuf,
    #[source]
    pub cause: std::io::Error,
}

impl WalkError {
    pub fn new(path: impl Into<std::path::PathBuf>, cause: std::io::Error) -> Self {
        Self {
            path: path.into(),
            cause,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Walk(#[from] WalkError),
    #[error("walk cancelled")]
    Cancelled,
}

impl From<mtree_core::Cancelled> for Error {
    fn from(_: mtree_core::Cancelled) -> Self {
        Error::Cancelled
    }
}
