//! The keyword registry: a process-wide mapping from keyword name to
//! evaluator plus metadata (default-set membership, BSD-compatible flag).
//!
//! Dispatch uses a plain `fn` pointer table rather than trait objects:
//! every evaluator is a pure, stateless computation over an [`EvalContext`],
//! so there is nothing to capture and no need to box anything, matching the
//! "uniform signature so they can be stored and iterated uniformly" design
//! note. A static [`phf::Map`] gives allocation-free name lookup, the same
//! technique `paketkoll_core`'s Arch Linux backend uses for its
//! `SPECIAL_FILES` set.

use crate::digest::DigestAlgo;
use compact_str::CompactString;
use smallvec::SmallVec;

/// The file type an entry's `type` keyword resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Dir,
    File,
    Link,
    Char,
    Block,
    Fifo,
    Socket,
}

impl FileType {
    pub const fn as_str(self) -> &'static str {
        match self {
            FileType::Dir => "dir",
            FileType::File => "file",
            FileType::Link => "link",
            FileType::Char => "char",
            FileType::Block => "block",
            FileType::Fifo => "fifo",
            FileType::Socket => "socket",
        }
    }

    pub fn is_dir(self) -> bool {
        matches!(self, FileType::Dir)
    }
}

/// Everything a non-digest evaluator needs. Content digests are computed
/// separately by a streaming tee (see [`crate::digest`]) since they require
/// a single combined pass over the payload rather than a pure function of
/// already-known metadata.
pub struct EvalContext<'a> {
    pub file_type: FileType,
    pub size: u64,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub uname: Option<&'a str>,
    pub gname: Option<&'a str>,
    pub nlink: u64,
    pub mtime_secs: u64,
    pub mtime_nanos: u32,
    pub link_target: Option<&'a [u8]>,
    /// Extended attribute (name, raw value) pairs, already sorted by name.
    pub xattrs: &'a [(String, Vec<u8>)],
}

/// One `(keyword, value)` pair as produced by an evaluator.
pub type Pair = (CompactString, Vec<u8>);

pub type Evaluator = fn(&EvalContext<'_>) -> SmallVec<[Pair; 1]>;

/// What kind of computation a registry entry performs.
#[derive(Clone, Copy)]
pub enum KeywordKind {
    /// A pure function of metadata already in hand.
    Metadata(Evaluator),
    /// A content digest, computed via the streaming tee.
    Digest(DigestAlgo),
    /// The `xattr.<name>` family: one entry fans out to zero or more pairs.
    XattrFamily,
}

#[derive(Clone, Copy)]
pub struct KeywordDescriptor {
    pub name: &'static str,
    pub is_default: bool,
    pub is_default_tar: bool,
    pub is_bsd: bool,
    pub kind: KeywordKind,
}

fn eval_type(ctx: &EvalContext<'_>) -> SmallVec<[Pair; 1]> {
    SmallVec::from_buf([(
        CompactString::const_new("type"),
        ctx.file_type.as_str().as_bytes().to_vec(),
    )])
}

fn eval_size(ctx: &EvalContext<'_>) -> SmallVec<[Pair; 1]> {
    let size = if ctx.file_type == FileType::File {
        ctx.size
    } else {
        0
    };
    SmallVec::from_buf([(CompactString::const_new("size"), size.to_string().into_bytes())])
}

fn eval_mode(ctx: &EvalContext<'_>) -> SmallVec<[Pair; 1]> {
    SmallVec::from_buf([(
        CompactString::const_new("mode"),
        format!("{:04o}", ctx.mode & 0o7777).into_bytes(),
    )])
}

fn eval_uid(ctx: &EvalContext<'_>) -> SmallVec<[Pair; 1]> {
    SmallVec::from_buf([(CompactString::const_new("uid"), ctx.uid.to_string().into_bytes())])
}

fn eval_gid(ctx: &EvalContext<'_>) -> SmallVec<[Pair; 1]> {
    SmallVec::from_buf([(CompactString::const_new("gid"), ctx.gid.to_string().into_bytes())])
}

fn eval_uname(ctx: &EvalContext<'_>) -> SmallVec<[Pair; 1]> {
    match ctx.uname {
        Some(name) => SmallVec::from_buf([(
            CompactString::const_new("uname"),
            name.as_bytes().to_vec(),
        )]),
        None => SmallVec::new(),
    }
}

fn eval_gname(ctx: &EvalContext<'_>) -> SmallVec<[Pair; 1]> {
    match ctx.gname {
        Some(name) => SmallVec::from_buf([(
            CompactString::const_new("gname"),
            name.as_bytes().to_vec(),
        )]),
        None => SmallVec::new(),
    }
}

fn eval_nlink(ctx: &EvalContext<'_>) -> SmallVec<[Pair; 1]> {
    SmallVec::from_buf([(
        CompactString::const_new("nlink"),
        ctx.nlink.to_string().into_bytes(),
    )])
}

fn eval_time(ctx: &EvalContext<'_>) -> SmallVec<[Pair; 1]> {
    SmallVec::from_buf([(
        CompactString::const_new("time"),
        format!("{}.{:09}", ctx.mtime_secs, ctx.mtime_nanos).into_bytes(),
    )])
}

fn eval_tar_time(ctx: &EvalContext<'_>) -> SmallVec<[Pair; 1]> {
    SmallVec::from_buf([(
        CompactString::const_new("tar_time"),
        format!("{}.000000000", ctx.mtime_secs).into_bytes(),
    )])
}

fn eval_link(ctx: &EvalContext<'_>) -> SmallVec<[Pair; 1]> {
    match ctx.link_target {
        Some(target) if ctx.file_type == FileType::Link => {
            SmallVec::from_buf([(CompactString::const_new("link"), target.to_vec())])
        }
        _ => SmallVec::new(),
    }
}

macro_rules! metadata_entry {
    ($name:literal, $eval:expr, default: $default:expr, tar: $tar:expr, bsd: $bsd:expr) => {
        KeywordDescriptor {
            name: $name,
            is_default: $default,
            is_default_tar: $tar,
            is_bsd: $bsd,
            kind: KeywordKind::Metadata($eval),
        }
    };
}

macro_rules! digest_entry {
    ($algo:expr) => {
        KeywordDescriptor {
            name: $algo.keyword_name(),
            is_default: false,
            is_default_tar: false,
            is_bsd: false,
            kind: KeywordKind::Digest($algo),
        }
    };
}

static BUILTIN_DESCRIPTORS: &[KeywordDescriptor] = &[
    metadata_entry!("type", eval_type, default: true, tar: true, bsd: true),
    metadata_entry!("size", eval_size, default: true, tar: true, bsd: true),
    metadata_entry!("mode", eval_mode, default: true, tar: true, bsd: true),
    metadata_entry!("uid", eval_uid, default: true, tar: true, bsd: true),
    metadata_entry!("gid", eval_gid, default: true, tar: true, bsd: true),
    metadata_entry!("uname", eval_uname, default: false, tar: false, bsd: true),
    metadata_entry!("gname", eval_gname, default: false, tar: false, bsd: true),
    metadata_entry!("nlink", eval_nlink, default: true, tar: false, bsd: true),
    metadata_entry!("time", eval_time, default: true, tar: false, bsd: true),
    metadata_entry!("tar_time", eval_tar_time, default: false, tar: true, bsd: false),
    metadata_entry!("link", eval_link, default: true, tar: true, bsd: true),
    digest_entry!(DigestAlgo::Sha1),
    digest_entry!(DigestAlgo::Sha256),
    digest_entry!(DigestAlgo::Sha384),
    digest_entry!(DigestAlgo::Sha512),
    digest_entry!(DigestAlgo::Md5),
    digest_entry!(DigestAlgo::Rmd160),
    KeywordDescriptor {
        name: "xattr",
        is_default: false,
        is_default_tar: false,
        is_bsd: false,
        kind: KeywordKind::XattrFamily,
    },
];

/// Perfect-hash index from keyword name to its slot in
/// [`BUILTIN_DESCRIPTORS`], so exact-name lookups (everything but the
/// `xattr.*` family) avoid scanning the table.
static BUILTIN_INDEX: phf::Map<&'static str, usize> = phf::phf_map! {
    "type" => 0,
    "size" => 1,
    "mode" => 2,
    "uid" => 3,
    "gid" => 4,
    "uname" => 5,
    "gname" => 6,
    "nlink" => 7,
    "time" => 8,
    "tar_time" => 9,
    "link" => 10,
    "sha1digest" => 11,
    "sha256digest" => 12,
    "sha384digest" => 13,
    "sha512digest" => 14,
    "md5digest" => 15,
    "rmd160digest" => 16,
    "xattr" => 17,
};

/// Registry of keyword descriptors. The built-in table is static and
/// immutable; [`Registry::with_extra`] layers additional descriptors on top
/// without mutating anything global, which is how tests exercise synthetic
/// keywords without leaving state behind for later tests.
#[derive(Clone, Default)]
pub struct Registry {
    extra: Vec<KeywordDescriptor>,
}

impl Registry {
    /// The built-in registry, populated once from the static table above.
    pub fn builtin() -> Registry {
        Registry { extra: Vec::new() }
    }

    /// A registry overlaying one additional descriptor. Used by tests that
    /// need a synthetic keyword; the overlay disappears when the returned
    /// value is dropped, leaving the built-in table untouched.
    #[must_use]
    pub fn with_extra(&self, descriptor: KeywordDescriptor) -> Registry {
        let mut extra = self.extra.clone();
        extra.push(descriptor);
        Registry { extra }
    }

    pub fn lookup(&self, name: &str) -> Option<KeywordDescriptor> {
        if let Some(attr) = name.strip_prefix("xattr.") {
            if !attr.is_empty() {
                return Some(KeywordDescriptor {
                    name: "xattr",
                    is_default: false,
                    is_default_tar: false,
                    is_bsd: false,
                    kind: KeywordKind::XattrFamily,
                });
            }
        }
        self.extra
            .iter()
            .rev()
            .find(|d| d.name == name)
            .copied()
            .or_else(|| BUILTIN_INDEX.get(name).map(|&idx| BUILTIN_DESCRIPTORS[idx]))
    }

    pub fn is_default(&self, name: &str) -> bool {
        self.lookup(name).map(|d| d.is_default).unwrap_or(false)
    }

    pub fn is_bsd(&self, name: &str) -> bool {
        self.lookup(name).map(|d| d.is_bsd).unwrap_or(false)
    }

    pub fn enumerate(&self) -> impl Iterator<Item = KeywordDescriptor> + '_ {
        BUILTIN_DESCRIPTORS.iter().copied().chain(self.extra.iter().copied())
    }

    pub fn default_keyword_set() -> Vec<&'static str> {
        BUILTIN_DESCRIPTORS
            .iter()
            .filter(|d| d.is_default)
            .map(|d| d.name)
            .collect()
    }

    pub fn default_tar_keyword_set() -> Vec<&'static str> {
        BUILTIN_DESCRIPTORS
            .iter()
            .filter(|d| d.is_default_tar)
            .map(|d| d.name)
            .collect()
    }
}

/// Base64-encode an extended attribute value for the `xattr.<name>` family.
pub fn encode_xattr_value(raw: &[u8]) -> String {
    base64_simd::STANDARD.encode_to_string(raw)
}

pub fn decode_xattr_value(encoded: &str) -> Option<Vec<u8>> {
    base64_simd::STANDARD.decode_to_vec(encoded).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn looks_up_builtin_keywords() {
        let registry = Registry::builtin();
        assert!(registry.lookup("type").is_some());
        assert!(registry.lookup("sha256digest").is_some());
        assert!(registry.lookup("no-such-keyword").is_none());
    }

    #[test]
    fn xattr_family_matches_any_suffix() {
        let registry = Registry::builtin();
        assert!(matches!(
            registry.lookup("xattr.user.comment").unwrap().kind,
            KeywordKind::XattrFamily
        ));
        assert!(registry.lookup("xattr.").is_none());
    }

    #[test]
    fn default_set_matches_spec() {
        let defaults = Registry::default_keyword_set();
        for kw in ["size", "type", "uid", "gid", "mode", "link", "nlink", "time"] {
            assert!(defaults.contains(&kw), "{kw} missing from default set");
        }
        assert!(!defaults.contains(&"tar_time"));
    }

    #[test]
    fn default_tar_set_substitutes_tar_time() {
        let defaults = Registry::default_tar_keyword_set();
        assert!(defaults.contains(&"tar_time"));
        assert!(!defaults.contains(&"time"));
        assert!(!defaults.contains(&"nlink"));
    }

    #[test]
    fn scoped_extension_does_not_leak() {
        let base = Registry::builtin();
        assert!(base.lookup("custom").is_none());
        let extended = base.with_extra(KeywordDescriptor {
            name: "custom",
            is_default: false,
            is_default_tar: false,
            is_bsd: false,
            kind: KeywordKind::Metadata(eval_type),
        });
        assert!(extended.lookup("custom").is_some());
        assert!(base.lookup("custom").is_none());
    }

    #[test]
    fn xattr_value_round_trips_through_base64() {
        let raw = b"\x00\x01binary\xff";
        let encoded = encode_xattr_value(raw);
        assert_eq!(decode_xattr_value(&encoded).unwrap(), raw);
    }
}
