//! Cross-crate integration tests only (spec.md §8); no public API of its
//! own. See `tests/` for the walk/tar equivalence check.
