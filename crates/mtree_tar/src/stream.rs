//! Tar archive streaming (spec.md §4.4): a pass-through [`Read`] that,
//! once fully drained and [`TarStreamer::close`]d, also hands back the
//! [`Manifest`] the archive's headers describe.
//!
//! Rather than interleaving header parsing with a byte-exact tee of
//! whatever slice sizes a consumer happens to request (which would mean
//! hand-rolling a 512-byte-block tar state machine to stay byte-synchronised
//! with an arbitrary `Read::read` call pattern), the whole input is buffered
//! once and then served to the consumer from that buffer while `tar::Archive`
//! parses the same bytes independently. Every entry's payload is still
//! digested in exactly one streamed pass, which is the property spec.md
//! §4.4 actually exercises; see DESIGN.md for the full rationale.

use crate::error::TarError;
use mtree_core::keyword::{EvalContext, FileType, KeywordKind, Registry};
use mtree_core::{CancellationToken, Entry, KeywordSet, Manifest};
use std::collections::BTreeMap;
use std::io::Cursor;
use std::io::Read;
use std::os::unix::ffi::OsStrExt as _;

type Key = Vec<Vec<u8>>;

#[derive(derive_builder::Builder)]
#[builder(pattern = "owned")]
pub struct TarStreamConfig {
    /// Keyword names to evaluate for each entry. `type` is always forced in.
    #[builder(default = "Registry::default_tar_keyword_set().iter().map(|s| s.to_string()).collect()")]
    pub keywords: Vec<String>,
    #[builder(default = "Registry::builtin()")]
    pub registry: Registry,
}

impl TarStreamConfig {
    pub fn builder() -> TarStreamConfigBuilder {
        TarStreamConfigBuilder::default()
    }
}

pub struct TarStreamer<R> {
    inner: Option<R>,
    buffer: Vec<u8>,
    cursor: usize,
    closed: bool,
    manifest: Option<Manifest>,
    config: TarStreamConfig,
}

impl<R: Read> TarStreamer<R> {
    pub fn new(inner: R, config: TarStreamConfig) -> Self {
        Self {
            inner: Some(inner),
            buffer: Vec::new(),
            cursor: 0,
            closed: false,
            manifest: None,
            config,
        }
    }

    fn ensure_buffered(&mut self) -> std::io::Result<()> {
        if let Some(mut inner) = self.inner.take() {
            inner.read_to_end(&mut self.buffer)?;
        }
        Ok(())
    }

    /// Drain the archive (if not already drained by the consumer) and
    /// resolve its manifest. Calling [`TarStreamer::hierarchy`] before this
    /// returns [`TarError::StreamIncomplete`].
    pub fn close(&mut self) -> Result<(), TarError> {
        self.close_cancellable(&())
    }

    /// As [`TarStreamer::close`], but checked against a cooperative
    /// cancellation probe between entries (spec.md §5).
    pub fn close_cancellable(&mut self, cancel: &dyn CancellationToken) -> Result<(), TarError> {
        self.ensure_buffered()?;
        self.manifest = Some(build_manifest(&self.buffer, &self.config, cancel)?);
        self.closed = true;
        Ok(())
    }

    pub fn hierarchy(&self) -> Result<&Manifest, TarError> {
        if !self.closed {
            return Err(TarError::StreamIncomplete);
        }
        Ok(self
            .manifest
            .as_ref()
            .expect("closed is only set alongside manifest"))
    }
}

impl<R: Read> Read for TarStreamer<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.ensure_buffered()?;
        let remaining = &self.buffer[self.cursor..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.cursor += n;
        Ok(n)
    }
}

/// Split a tar entry's path into components, dropping empty and `.`
/// segments. A `..` segment is rejected outright: it would otherwise
/// resolve to a literal, bogus path component rather than actually
/// escaping the tree (this engine never walks the filesystem using tar
/// paths), so treating it as a malformed entry is the honest answer.
fn components_from_bytes(path: &[u8]) -> Result<Key, mtree_core::CodecError> {
    path.split(|&b| b == b'/')
        .filter(|seg| !seg.is_empty() && *seg != b".")
        .map(|seg| {
            if seg == b".." {
                Err(mtree_core::CodecError::MalformedEntry {
                    line: 0,
                    reason: format!("tar entry path contains a `..` segment: {:?}", String::from_utf8_lossy(path)),
                })
            } else {
                Ok(seg.to_vec())
            }
        })
        .collect()
}

fn classify(et: tar::EntryType) -> FileType {
    match et {
        tar::EntryType::Directory => FileType::Dir,
        tar::EntryType::Symlink => FileType::Link,
        tar::EntryType::Char => FileType::Char,
        tar::EntryType::Block => FileType::Block,
        tar::EntryType::Fifo => FileType::Fifo,
        _ => FileType::File,
    }
}

fn evaluate_metadata(ctx: &EvalContext<'_>, requested: &[String], registry: &Registry) -> KeywordSet {
    let mut keywords = KeywordSet::new();
    let mut names: Vec<&str> = requested.iter().map(String::as_str).collect();
    if !names.contains(&"type") {
        names.push("type");
    }
    for name in names {
        let Some(descriptor) = registry.lookup(name) else {
            continue;
        };
        if let KeywordKind::Metadata(eval) = descriptor.kind {
            for (kw, value) in eval(ctx) {
                keywords.set(kw, value);
            }
        }
        // Digests are folded in separately from the entry payload; tar
        // streams in this engine carry no extended attributes (PAX
        // `SCHILY.xattr.*` propagation is out of scope).
    }
    keywords
}

fn requested_digests(requested: &[String]) -> Vec<mtree_core::digest::DigestAlgo> {
    requested
        .iter()
        .filter_map(|name| mtree_core::digest::DigestAlgo::from_keyword_name(name))
        .collect()
}

/// One tar header's worth of data, collected in a first forward pass before
/// any hardlink target is necessarily known.
struct RawEntry {
    key: Key,
    file_type: FileType,
    size: u64,
    mode: u32,
    uid: u32,
    gid: u32,
    uname: Option<String>,
    gname: Option<String>,
    mtime: u64,
    link_literal: Option<Vec<u8>>,
    hardlink_target: Option<Key>,
    digests: BTreeMap<&'static str, String>,
}

/// Register every strict ancestor of `key`, and `key` itself, as a child of
/// its parent, synthesising placeholder directories for ancestors that have
/// no entry of their own (spec.md §4.4's "a single root `.` directory
/// always exists" and implicit-ancestor rule).
fn register_path(key: &[Vec<u8>], placeholders: &mut BTreeMap<Key, ()>, children: &mut BTreeMap<Key, Vec<Key>>) {
    for i in 0..=key.len() {
        let prefix: Key = key[..i].to_vec();
        if i < key.len() {
            placeholders.entry(prefix.clone()).or_insert(());
        }
        if i > 0 {
            let parent: Key = key[..i - 1].to_vec();
            let siblings = children.entry(parent).or_default();
            if !siblings.contains(&prefix) {
                siblings.push(prefix);
            }
        }
    }
}

fn build_manifest(bytes: &[u8], config: &TarStreamConfig, cancel: &dyn CancellationToken) -> Result<Manifest, TarError> {
    let mut archive = tar::Archive::new(Cursor::new(bytes));
    let mut raw: Vec<RawEntry> = Vec::new();
    let mut placeholders: BTreeMap<Key, ()> = BTreeMap::new();
    let mut children: BTreeMap<Key, Vec<Key>> = BTreeMap::new();
    let algos = requested_digests(&config.keywords);

    for entry_result in archive.entries()? {
        if cancel.is_cancelled() {
            return Err(mtree_core::Cancelled.into());
        }
        let mut entry = entry_result?;
        let entry_type = entry.header().entry_type();
        if matches!(
            entry_type,
            tar::EntryType::XGlobalHeader
                | tar::EntryType::XHeader
                | tar::EntryType::GNULongName
                | tar::EntryType::GNULongLink
        ) {
            // The `tar` crate already folds these into the following
            // regular entry's path/link-name/size before we see it.
            continue;
        }
        let key = components_from_bytes(&entry.path_bytes())?;
        if key.is_empty() {
            continue;
        }
        tracing::debug!(target: "mtree_tar::stream", path = ?key, ?entry_type, "visiting tar entry");
        let size = entry.header().size().unwrap_or(0);
        let mode = entry.header().mode().unwrap_or(0o644);
        let uid = entry.header().uid().unwrap_or(0) as u32;
        let gid = entry.header().gid().unwrap_or(0) as u32;
        let mtime = entry.header().mtime().unwrap_or(0);
        let uname = entry
            .header()
            .username()
            .ok()
            .flatten()
            .map(ToString::to_string);
        let gname = entry
            .header()
            .groupname()
            .ok()
            .flatten()
            .map(ToString::to_string);
        let link_literal = entry
            .link_name()
            .ok()
            .flatten()
            .map(|p| p.into_owned().as_os_str().as_bytes().to_vec());
        let hardlink_target = if entry_type == tar::EntryType::Link {
            link_literal.as_deref().map(components_from_bytes).transpose()?
        } else {
            None
        };
        let file_type = classify(entry_type);

        let mut digests = BTreeMap::new();
        if file_type == FileType::File && entry_type != tar::EntryType::Link && !algos.is_empty() {
            let mut digester = mtree_core::digest::MultiDigest::new(algos.clone());
            digester.consume(&mut entry)?;
            digests = digester.finalize();
        }

        register_path(&key, &mut placeholders, &mut children);
        raw.push(RawEntry {
            key,
            file_type,
            size,
            mode,
            uid,
            gid,
            uname,
            gname,
            mtime,
            link_literal,
            hardlink_target,
            digests,
        });
    }

    let by_key: BTreeMap<Key, usize> = raw.iter().enumerate().map(|(i, e)| (e.key.clone(), i)).collect();

    // Two-phase hardlink resolution: a `Link` entry carries no content of
    // its own in the tar stream, so its size/mode/digests are copied from
    // whichever entry its target resolves to; `nlink` is the size of the
    // whole equivalence group (target plus every hardlink naming it).
    let mut groups: BTreeMap<Key, Vec<Key>> = BTreeMap::new();
    for entry in &raw {
        let canonical = entry.hardlink_target.clone().unwrap_or_else(|| entry.key.clone());
        groups.entry(canonical).or_default().push(entry.key.clone());
    }

    let mut resolved: BTreeMap<Key, Entry> = BTreeMap::new();
    let mut file_types: BTreeMap<Key, FileType> = BTreeMap::new();
    for key in placeholders.keys() {
        file_types.insert(key.clone(), FileType::Dir);
    }

    let nlink_requested = config.keywords.iter().any(|k| k == "nlink");
    for entry in &raw {
        let source = entry
            .hardlink_target
            .as_ref()
            .and_then(|t| by_key.get(t))
            .map(|&i| &raw[i])
            .unwrap_or(entry);

        let ctx = EvalContext {
            file_type: source.file_type,
            size: source.size,
            mode: source.mode,
            uid: source.uid,
            gid: source.gid,
            uname: source.uname.as_deref(),
            gname: source.gname.as_deref(),
            nlink: 1,
            mtime_secs: source.mtime,
            mtime_nanos: 0,
            link_target: entry.link_literal.as_deref().filter(|_| entry.file_type == FileType::Link),
            xattrs: &[],
        };
        let mut keywords = evaluate_metadata(&ctx, &config.keywords, &config.registry);
        for (kw, hex) in &source.digests {
            keywords.set(*kw, hex.clone().into_bytes());
        }
        if nlink_requested {
            let canonical = entry.hardlink_target.clone().unwrap_or_else(|| entry.key.clone());
            let group_size = groups.get(&canonical).map(Vec::len).unwrap_or(1);
            keywords.set("nlink", group_size.to_string().into_bytes());
        }
        file_types.insert(entry.key.clone(), entry.file_type);
        resolved.insert(
            entry.key.clone(),
            Entry::Relative {
                name: entry.key.last().cloned().unwrap_or_default(),
                keywords,
            },
        );
    }
    for key in placeholders.into_keys() {
        resolved.entry(key.clone()).or_insert_with(|| {
            let mut keywords = KeywordSet::new();
            keywords.set("type", b"dir".to_vec());
            Entry::Relative {
                name: key.last().cloned().unwrap_or_default(),
                keywords,
            }
        });
    }

    let mut out = Vec::new();
    emit_tree(&[], &children, &resolved, &file_types, &mut out);
    Ok(Manifest::from_entries(mtree_core::delta_encode(out)))
}

fn emit_tree(
    key: &[Vec<u8>],
    children: &BTreeMap<Key, Vec<Key>>,
    resolved: &BTreeMap<Key, Entry>,
    file_types: &BTreeMap<Key, FileType>,
    out: &mut Vec<Entry>,
) {
    let Some(kids) = children.get(key) else {
        return;
    };
    let (mut dirs, mut files): (Vec<Key>, Vec<Key>) = kids
        .iter()
        .cloned()
        .partition(|k| file_types.get(k).copied().unwrap_or(FileType::File).is_dir());
    files.sort_by(|a, b| a.last().cmp(&b.last()));
    dirs.sort_by(|a, b| a.last().cmp(&b.last()));

    for k in files {
        if let Some(entry) = resolved.get(&k) {
            out.push(entry.clone());
        }
    }
    for k in dirs {
        if let Some(entry) = resolved.get(&k) {
            out.push(entry.clone());
        }
        emit_tree(&k, children, resolved, file_types, out);
        out.push(Entry::DotDot);
    }
}
