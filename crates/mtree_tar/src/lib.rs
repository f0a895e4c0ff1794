//! Tar archive streaming, producing mtree-style manifests from an archive's
//! headers (spec.md §4.4).

pub mod error;
pub mod stream;

pub use error::TarError;
pub use stream::TarStreamConfig;
pub use stream::TarStreamConfigBuilder;
pub use stream::TarStreamer;
