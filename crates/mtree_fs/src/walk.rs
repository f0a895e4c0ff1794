//! Deterministic sorted depth-first filesystem traversal (spec.md §4.3).

use crate::error::{Error, WalkError};
use mtree_core::keyword::{EvalContext, FileType, KeywordKind, Registry};
use mtree_core::{CancellationToken, Entry, KeywordSet, Manifest};
use std::collections::HashMap;
use std::fs;
use std::os::unix::ffi::OsStrExt as _;
use std::os::unix::fs::FileTypeExt as _;
use std::os::unix::fs::MetadataExt as _;
use std::path::Path;

/// A predicate deciding whether a path (and, for directories, its entire
/// subtree) is skipped during the walk.
pub type ExcludePredicate = Box<dyn Fn(&Path, &fs::Metadata) -> bool + Send + Sync>;

#[derive(derive_builder::Builder)]
#[builder(pattern = "owned")]
pub struct WalkConfig {
    /// Keyword names to evaluate for each entry. `type` is always forced
    /// in regardless of whether it is listed here (spec.md §3).
    #[builder(default = "Registry::default_keyword_set().iter().map(|s| s.to_string()).collect()")]
    pub keywords: Vec<String>,
    /// Predicates matching paths (and their subtrees, for directories) to
    /// skip entirely.
    #[builder(default)]
    pub excludes: Vec<ExcludePredicate>,
    #[builder(default = "Registry::builtin()")]
    pub registry: Registry,
}

impl WalkConfig {
    pub fn builder() -> WalkConfigBuilder {
        WalkConfigBuilder::default()
    }

    fn is_excluded(&self, path: &Path, meta: &fs::Metadata) -> bool {
        self.excludes.iter().any(|pred| pred(path, meta))
    }
}

struct OwnerCache {
    users: HashMap<u32, Option<String>>,
    groups: HashMap<u32, Option<String>>,
}

impl OwnerCache {
    fn new() -> Self {
        Self {
            users: HashMap::new(),
            groups: HashMap::new(),
        }
    }

    fn uname(&mut self, uid: u32) -> Option<String> {
        self.users
            .entry(uid)
            .or_insert_with(|| {
                nix::unistd::User::from_uid(nix::unistd::Uid::from_raw(uid))
                    .ok()
                    .flatten()
                    .map(|u| u.name)
            })
            .clone()
    }

    fn gname(&mut self, gid: u32) -> Option<String> {
        self.groups
            .entry(gid)
            .or_insert_with(|| {
                nix::unistd::Group::from_gid(nix::unistd::Gid::from_raw(gid))
                    .ok()
                    .flatten()
                    .map(|g| g.name)
            })
            .clone()
    }
}

fn classify(meta: &fs::Metadata) -> FileType {
    let ft = meta.file_type();
    if ft.is_dir() {
        FileType::Dir
    } else if ft.is_symlink() {
        FileType::Link
    } else if ft.is_block_device() {
        FileType::Block
    } else if ft.is_char_device() {
        FileType::Char
    } else if ft.is_fifo() {
        FileType::Fifo
    } else if ft.is_socket() {
        FileType::Socket
    } else {
        FileType::File
    }
}

fn read_xattrs(path: &Path) -> Vec<(String, Vec<u8>)> {
    let Ok(names) = xattr::list(path) else {
        return Vec::new();
    };
    let mut out: Vec<(String, Vec<u8>)> = names
        .filter_map(|name| {
            let name_str = name.to_string_lossy().into_owned();
            let value = xattr::get(path, &name).ok().flatten()?;
            Some((name_str, value))
        })
        .collect();
    out.sort_by(|a, b| a.0.cmp(&b.0));
    out
}

/// Evaluate the non-digest keywords requested for one filesystem node,
/// pulling the `type` keyword in unconditionally.
fn evaluate_metadata(
    ctx: &EvalContext<'_>,
    requested: &[String],
    registry: &Registry,
) -> KeywordSet {
    let mut keywords = KeywordSet::new();
    let mut names: Vec<&str> = requested.iter().map(String::as_str).collect();
    if !names.contains(&"type") {
        names.push("type");
    }
    for name in names {
        let Some(descriptor) = registry.lookup(name) else {
            continue;
        };
        match descriptor.kind {
            KeywordKind::Metadata(eval) => {
                for (kw, value) in eval(ctx) {
                    keywords.set(kw, value);
                }
            }
            KeywordKind::XattrFamily => {
                for (attr_name, raw) in ctx.xattrs {
                    if name != "xattr" && name != format!("xattr.{attr_name}") {
                        continue;
                    }
                    let encoded = mtree_core::keyword::encode_xattr_value(raw);
                    keywords.set(format!("xattr.{attr_name}"), encoded.into_bytes());
                }
            }
            KeywordKind::Digest(_) => {
                // Handled separately by the caller, which has the payload.
            }
        }
    }
    keywords
}

fn requested_digests(requested: &[String]) -> Vec<mtree_core::digest::DigestAlgo> {
    requested
        .iter()
        .filter_map(|name| mtree_core::digest::DigestAlgo::from_keyword_name(name))
        .collect()
}

struct NodeInfo {
    name: Vec<u8>,
    path: std::path::PathBuf,
    meta: fs::Metadata,
    is_dir: bool,
}

fn list_sorted(dir: &Path, config: &WalkConfig) -> Result<Vec<NodeInfo>, WalkError> {
    let read_dir = fs::read_dir(dir).map_err(|e| WalkError::new(dir, e))?;
    let mut nodes = Vec::new();
    for entry in read_dir {
        let entry = entry.map_err(|e| WalkError::new(dir, e))?;
        let path = entry.path();
        let meta = fs::symlink_metadata(&path).map_err(|e| WalkError::new(&path, e))?;
        if config.is_excluded(&path, &meta) {
            continue;
        }
        nodes.push(NodeInfo {
            name: entry.file_name().as_bytes().to_vec(),
            path,
            is_dir: meta.is_dir(),
            meta,
        });
    }
    nodes.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(nodes)
}

fn build_entry(
    node: &NodeInfo,
    config: &WalkConfig,
    owners: &mut OwnerCache,
) -> Result<Entry, WalkError> {
    let file_type = classify(&node.meta);
    let link_target = if file_type == FileType::Link {
        Some(
            fs::read_link(&node.path)
                .map_err(|e| WalkError::new(&node.path, e))?
                .as_os_str()
                .as_bytes()
                .to_vec(),
        )
    } else {
        None
    };
    let xattrs = read_xattrs(&node.path);
    let uname = owners.uname(node.meta.uid());
    let gname = owners.gname(node.meta.gid());

    let ctx = EvalContext {
        file_type,
        size: node.meta.size(),
        mode: node.meta.mode(),
        uid: node.meta.uid(),
        gid: node.meta.gid(),
        uname: uname.as_deref(),
        gname: gname.as_deref(),
        nlink: node.meta.nlink(),
        mtime_secs: node.meta.mtime().max(0) as u64,
        mtime_nanos: node.meta.mtime_nsec() as u32,
        link_target: link_target.as_deref(),
        xattrs: &xattrs,
    };

    let mut keywords = evaluate_metadata(&ctx, &config.keywords, &config.registry);

    if file_type == FileType::File {
        let algos = requested_digests(&config.keywords);
        if !algos.is_empty() {
            let file = fs::File::open(&node.path).map_err(|e| WalkError::new(&node.path, e))?;
            let mut digester = mtree_core::digest::MultiDigest::new(algos);
            digester.consume(file).map_err(|e| WalkError::new(&node.path, e))?;
            for (kw, hex) in digester.finalize() {
                keywords.set(kw, hex.into_bytes());
            }
        }
    }

    Ok(Entry::Relative {
        name: node.name.clone(),
        keywords,
    })
}

fn walk_dir(
    dir: &Path,
    config: &WalkConfig,
    owners: &mut OwnerCache,
    cancel: &dyn CancellationToken,
    out: &mut Vec<Entry>,
) -> Result<(), Error> {
    let nodes = list_sorted(dir, config)?;
    let (dirs, files): (Vec<_>, Vec<_>) = nodes.into_iter().partition(|n| n.is_dir);

    for node in files {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        tracing::debug!(target: "mtree_fs::walk", path = %node.path.display(), "visiting file");
        out.push(build_entry(&node, config, owners)?);
    }
    for node in dirs {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        tracing::debug!(target: "mtree_fs::walk", path = %node.path.display(), "visiting directory");
        out.push(build_entry(&node, config, owners)?);
        walk_dir(&node.path, config, owners, cancel, out)?;
        out.push(Entry::DotDot);
    }
    Ok(())
}

/// Walk `root`, producing a manifest of its contents (spec.md §4.3).
///
/// Traversal is deterministic: each directory's children are sorted
/// byte-wise by name, non-directory children are emitted before directory
/// children (which then recurse), matching BSD `mtree`'s own emission
/// order.
pub fn walk(root: &Path, config: &WalkConfig) -> Result<Manifest, Error> {
    walk_cancellable(root, config, &())
}

/// As [`walk`], but checked against a cooperative cancellation probe
/// between entries (spec.md §5).
pub fn walk_cancellable(
    root: &Path,
    config: &WalkConfig,
    cancel: &dyn CancellationToken,
) -> Result<Manifest, Error> {
    let mut entries = header_comments(root);
    let mut owners = OwnerCache::new();
    walk_dir(root, config, &mut owners, cancel, &mut entries)?;
    Ok(Manifest::from_entries(mtree_core::delta_encode(entries)))
}

/// Standard header comments (spec.md §6: "a leading `# .` comment and
/// subsequent `# user:` / `# machine:` / `# tree:` / `# date:` lines").
/// Best-effort: a header field that cannot be determined falls back to
/// `unknown` rather than failing the walk.
fn header_comments(root: &Path) -> Vec<Entry> {
    let user = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    let host = nix::unistd::gethostname()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());
    let date = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    vec![
        Entry::Comment(b" .".to_vec()),
        Entry::Comment(format!(" user: {user}").into_bytes()),
        Entry::Comment(format!(" machine: {host}").into_bytes()),
        Entry::Comment(format!(" tree: {}", root.display()).into_bytes()),
        Entry::Comment(format!(" date: {date}").into_bytes()),
    ]
}
