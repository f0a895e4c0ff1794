//! Error kinds shared by the manifest codec and the rest of the engine.

/// Errors that can occur while parsing or emitting the `.mtree` text
/// grammar.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("I/O error reading or writing manifest text")]
    Io(#[from] std::io::Error),

    #[error("malformed entry on line {line}: {reason}")]
    MalformedEntry { line: usize, reason: String },

    #[error("invalid vis-encoding on line {line}: {reason}")]
    InvalidEncoding { line: usize, reason: String },

    #[error("unknown directive {directive:?} on line {line}")]
    UnknownDirective { line: usize, directive: String },
}

/// Cooperative cancellation, shared by every long-running operation
/// (walk, tar stream, check).
#[derive(Debug, thiserror::Error)]
#[error("operation cancelled")]
pub struct Cancelled;

/// A probe checked between entries by long-running operations. Returning
/// `true` aborts the operation with [`Cancelled`].
pub trait CancellationToken {
    fn is_cancelled(&self) -> bool;
}

impl CancellationToken for () {
    fn is_cancelled(&self) -> bool {
        false
    }
}

impl<F> CancellationToken for F
where
    F: Fn() -> bool,
{
    fn is_cancelled(&self) -> bool {
        self()
    }
}
