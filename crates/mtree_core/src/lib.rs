//! Keyword registry, manifest data model, and text codec for mtree-style
//! directory hierarchy manifests.
//!
//! This crate is the leaves-first foundation the rest of the engine
//! (`mtree_fs`, `mtree_tar`, `mtree_check`) is built on: everything else
//! consumes [`Manifest`], [`keyword::Registry`], and the [`digest`] module
//! by name rather than reimplementing any of it.

pub mod codec;
pub mod compress;
pub mod digest;
pub mod error;
pub mod introspect;
pub mod keyword;
pub mod model;
pub mod vis;

pub use compress::delta_encode;
pub use error::Cancelled;
pub use error::CancellationToken;
pub use error::CodecError;
pub use introspect::collect_used_keywords;
pub use keyword::EvalContext;
pub use keyword::FileType;
pub use keyword::KeywordDescriptor;
pub use keyword::KeywordKind;
pub use keyword::Registry;
pub use model::Directive;
pub use model::Entry;
pub use model::KeyVal;
pub use model::KeywordSet;
pub use model::Manifest;
pub use model::ResolvedEntry;
