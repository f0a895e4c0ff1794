//! Checker error type (spec.md §4.5, §7).

#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error(transparent)]
    Walk(#[from] mtree_fs::Error),
    #[error("unknown keyword requested: {0}")]
    UnknownKeyword(String),
    #[error("check cancelled")]
    Cancelled,
}

impl From<mtree_core::Cancelled> for CheckError {
    fn from(_: mtree_core::Cancelled) -> Self {
        CheckError::Cancelled
    }
}
