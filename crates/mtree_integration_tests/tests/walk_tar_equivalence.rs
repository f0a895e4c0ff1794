//! Walk vs tar-stream equivalence (spec.md §8, Testable Property 4; BSD
//! mtree's own README also exercises `mtree -c` output against `mtree -C`
//! re-derived from the same tree).
//!
//! The two producers default to different keyword sets
//! (`Registry::default_keyword_set` vs `default_tar_keyword_set`), so this
//! restricts both to a keyword subset present in both: `uid`/`gid` are left
//! out too, since tar archives commonly normalise ownership on extraction
//! and a sandbox's build user need not match.

use mtree_check::CheckConfig;
use mtree_fs::WalkConfig;
use mtree_tar::TarStreamConfig;
use mtree_tar::TarStreamer;
use std::fs;
use std::io::Cursor;
use std::io::Read as _;
use std::os::unix::fs::PermissionsExt as _;

const SHARED_KEYWORDS: &[&str] = &["type", "size", "mode", "link"];

fn keyword_list() -> Vec<String> {
    SHARED_KEYWORDS.iter().map(|s| (*s).to_string()).collect()
}

fn build_fixture() -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("create tempdir");
    fs::write(dir.path().join("hello.txt"), b"hello world\n").expect("write hello.txt");
    fs::set_permissions(dir.path().join("hello.txt"), fs::Permissions::from_mode(0o644)).expect("chmod hello.txt");
    fs::create_dir(dir.path().join("sub")).expect("mkdir sub");
    fs::set_permissions(dir.path().join("sub"), fs::Permissions::from_mode(0o755)).expect("chmod sub");
    fs::write(dir.path().join("sub/nested.txt"), b"nested\n").expect("write nested.txt");
    fs::set_permissions(dir.path().join("sub/nested.txt"), fs::Permissions::from_mode(0o644)).expect("chmod nested.txt");
    std::os::unix::fs::symlink("hello.txt", dir.path().join("link_to_hello")).expect("symlink");
    dir
}

fn build_tar_archive(root: &std::path::Path) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    builder.append_dir_all(".", root).expect("append_dir_all");
    builder.into_inner().expect("finish tar")
}

#[test]
fn walk_and_tar_streamer_agree_on_shared_keywords() {
    let dir = build_fixture();

    let walk_config = WalkConfig::builder().keywords(keyword_list()).build().expect("build WalkConfig");
    let walked = mtree_fs::walk(dir.path(), &walk_config).expect("walk fixture");

    let archive_bytes = build_tar_archive(dir.path());
    let tar_config = TarStreamConfig::builder().keywords(keyword_list()).build().expect("build TarStreamConfig");
    let mut streamer = TarStreamer::new(Cursor::new(archive_bytes), tar_config);
    let mut sink = Vec::new();
    streamer.read_to_end(&mut sink).expect("drain tar stream");
    streamer.close().expect("close tar streamer");
    let streamed = streamer.hierarchy().expect("hierarchy after close").clone();

    let check_config = CheckConfig::builder().keywords(keyword_list()).build().expect("build CheckConfig");
    let result = mtree_check::check_manifests(&walked, &streamed, &check_config).expect("check_manifests");
    assert!(result.is_clean(), "expected no discrepancies, got {:?}", result.discrepancies);
}
