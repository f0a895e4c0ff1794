//! The manifest data model: [`Entry`] variants, [`KeywordSet`], and
//! [`Manifest`] itself.
//!
//! Entry kinds are a tagged sum rather than an inheritance hierarchy, per
//! the design note: every operation (emit, parse, diff) pattern-matches on
//! the variant. Parent/`/set` relationships are not stored as owning
//! back-pointers (which would make the type self-referential); instead
//! [`Manifest::resolve`] walks the entry sequence once, maintaining a `cwd`
//! stack and an accumulating active keyword set exactly as a parser
//! consuming the text format would, and hands back fully resolved paths.

use crate::error::CodecError;
use compact_str::CompactString;
use std::path::PathBuf;

/// A single `keyword=value` pair. The value is kept as raw bytes so that
/// byte-exact fields (`link`, xattr payloads) never lose fidelity; numeric
/// and identifier keywords just happen to always be ASCII.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyVal {
    pub keyword: CompactString,
    pub value: Vec<u8>,
}

impl KeyVal {
    pub fn new(keyword: impl Into<CompactString>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            keyword: keyword.into(),
            value: value.into(),
        }
    }

    pub fn value_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.value).ok()
    }
}

/// An ordered, duplicate-free-by-keyword collection of [`KeyVal`] pairs.
///
/// Kept as a `Vec` rather than a `HashMap`: entries carry a handful of
/// keywords at most, insertion order matters for emission, and a linear
/// scan is both simpler and faster at this size than hashing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeywordSet(Vec<KeyVal>);

impl KeywordSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs(pairs: Vec<KeyVal>) -> Self {
        Self(pairs)
    }

    pub fn get(&self, keyword: &str) -> Option<&[u8]> {
        self.0.iter().find(|kv| kv.keyword == keyword).map(|kv| kv.value.as_slice())
    }

    pub fn contains(&self, keyword: &str) -> bool {
        self.0.iter().any(|kv| kv.keyword == keyword)
    }

    /// Set (insert or overwrite) a single keyword's value, preserving the
    /// position of an existing entry.
    pub fn set(&mut self, keyword: impl Into<CompactString>, value: impl Into<Vec<u8>>) {
        let keyword = keyword.into();
        let value = value.into();
        if let Some(existing) = self.0.iter_mut().find(|kv| kv.keyword == keyword) {
            existing.value = value;
        } else {
            self.0.push(KeyVal { keyword, value });
        }
    }

    pub fn remove(&mut self, keyword: &str) {
        self.0.retain(|kv| kv.keyword != keyword);
    }

    pub fn iter(&self) -> impl Iterator<Item = &KeyVal> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|kv| kv.keyword.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Merge `overrides` on top of `self`, per-keyword: a keyword present in
    /// `overrides` replaces `self`'s value; keywords absent from
    /// `overrides` retain `self`'s value. This is the rule spec.md §3
    /// describes for how an entry's local `Keywords` override the active
    /// `/set` baseline.
    pub fn merged_over(&self, overrides: &KeywordSet) -> KeywordSet {
        let mut merged = self.clone();
        for kv in &overrides.0 {
            merged.set(kv.keyword.clone(), kv.value.clone());
        }
        merged
    }
}

/// One line of manifest text, as a tagged sum (spec.md §3's Entry table).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    /// Preserves an empty source line.
    Blank,
    /// A `# …` line, verbatim (without the leading `#`).
    Comment(Vec<u8>),
    /// A `/set …` or `/unset …` directive.
    Special(Directive),
    /// A path containing `/`.
    Full { name: Vec<u8>, keywords: KeywordSet },
    /// A bare name, resolved against the active directory.
    Relative { name: Vec<u8>, keywords: KeywordSet },
    /// The literal line `..`, closing the current directory scope.
    DotDot,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    Set(KeywordSet),
    Unset(Vec<CompactString>),
}

/// An ordered sequence of [`Entry`] values.
///
/// Immutable once built by the parser, walker, or tar streamer (spec.md
/// §3's Lifecycles); callers that need to keep constructing one hold a
/// `Vec<Entry>` themselves (see `mtree_fs`/`mtree_tar`) and call
/// [`Manifest::from_entries`] once traversal completes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    entries: Vec<Entry>,
}

/// A fully resolved entry: path relative to the manifest root, plus its
/// complete effective keyword set (active `/set` baseline merged with any
/// entry-local overrides).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEntry {
    pub path: PathBuf,
    pub keywords: KeywordSet,
}

impl Manifest {
    pub fn from_entries(entries: Vec<Entry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn push(&mut self, entry: Entry) {
        self.entries.push(entry);
    }

    /// Resolve every `Full`/`Relative` entry to a full path and a fully
    /// merged keyword set, replaying the `/set`/`/unset`/`DotDot` state
    /// machine a parser would.
    ///
    /// `/set` state is tracked as one flat, manifest-wide accumulator
    /// rather than a per-directory-scope stack: spec.md §3 states "at most
    /// one `/set` directive is active at any point", which this takes
    /// literally (see DESIGN.md's Open Question resolution).
    pub fn resolve(&self) -> Vec<ResolvedEntry> {
        use std::os::unix::ffi::OsStrExt as _;
        use std::os::unix::ffi::OsStringExt as _;

        let mut cwd = PathBuf::from(".");
        let mut active = KeywordSet::new();
        let mut out = Vec::new();

        for entry in &self.entries {
            match entry {
                Entry::Blank | Entry::Comment(_) => {}
                Entry::Special(Directive::Set(pairs)) => {
                    for kv in pairs.iter() {
                        active.set(kv.keyword.clone(), kv.value.clone());
                    }
                }
                Entry::Special(Directive::Unset(names)) => {
                    for name in names {
                        active.remove(name);
                    }
                }
                Entry::DotDot => {
                    if cwd.parent().is_some() {
                        cwd.pop();
                    }
                }
                Entry::Relative { name, keywords } => {
                    let os_name = std::ffi::OsString::from_vec(name.clone());
                    let path = cwd.join(&os_name);
                    let merged = active.merged_over(keywords);
                    if merged.get("type") == Some(b"dir") {
                        cwd = path.clone();
                    }
                    out.push(ResolvedEntry { path, keywords: merged });
                }
                Entry::Full { name, keywords } => {
                    let os_name = std::ffi::OsStr::from_bytes(name);
                    let path = PathBuf::from(os_name);
                    let merged = active.merged_over(keywords);
                    if merged.get("type") == Some(b"dir") {
                        cwd = path.clone();
                    }
                    out.push(ResolvedEntry { path, keywords: merged });
                }
            }
        }
        out
    }

    /// Parse manifest text from `reader` (spec.md §4.2).
    pub fn parse(reader: impl std::io::Read) -> Result<Manifest, CodecError> {
        crate::codec::parse(reader)
    }

    /// Emit this manifest's entries in their preserved order (spec.md §4.2,
    /// the round-trip invariant).
    pub fn write_to(&self, writer: impl std::io::Write) -> std::io::Result<()> {
        crate::codec::write_to(self, writer)
    }
}
