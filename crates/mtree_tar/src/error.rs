//! Tar streamer error type (spec.md §4.4, §7).

#[derive(Debug, thiserror::Error)]
pub enum TarError {
    #[error("io error reading tar stream: {0}")]
    Io(#[from] std::io::Error),
    #[error("hierarchy() called before close()")]
    StreamIncomplete,
    #[error(transparent)]
    Codec(#[from] mtree_core::CodecError),
    #[error("tar stream close cancelled")]
    Cancelled,
}

impl From<mtree_core::Cancelled> for TarError {
    fn from(_: mtree_core::Cancelled) -> Self {
        TarError::Cancelled
    }
}
