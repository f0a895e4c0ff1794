use mtree_fs::WalkConfig;
use pretty_assertions::assert_eq;
use std::fs;
use std::os::unix::fs::PermissionsExt as _;

/// Scenario S1 from spec.md §8: a directory containing one regular file
/// with known content, checked for size/mode/digest.
#[test]
fn walk_reports_size_mode_and_digest() {
    let dir = tempfile::tempdir().unwrap();
    let sub = dir.path().join("x");
    fs::create_dir(&sub).unwrap();
    fs::set_permissions(&sub, fs::Permissions::from_mode(0o755)).unwrap();
    let file_path = sub.join("files");
    fs::write(&file_path, b"howdy\n").unwrap();
    fs::set_permissions(&file_path, fs::Permissions::from_mode(0o644)).unwrap();

    let config = WalkConfig::builder()
        .keywords(vec![
            "type".to_string(),
            "size".to_string(),
            "mode".to_string(),
            "sha1digest".to_string(),
        ])
        .build()
        .unwrap();
    let manifest = mtree_fs::walk(dir.path(), &config).unwrap();
    let resolved = manifest.resolve();

    let file_entry = resolved
        .iter()
        .find(|e| e.path.ends_with("x/files"))
        .expect("x/files entry present");
    assert_eq!(file_entry.keywords.get("size"), Some(&b"6"[..]));
    assert_eq!(file_entry.keywords.get("mode"), Some(&b"0644"[..]));
    assert_eq!(
        file_entry.keywords.get("sha1digest"),
        Some(&b"20a1d1f92fbf56cf35ba9bf7e21b25ab5b35c2d0"[..])
    );

    let dir_entry = resolved.iter().find(|e| e.path.ends_with("x")).unwrap();
    assert_eq!(dir_entry.keywords.get("mode"), Some(&b"0755"[..]));
    assert_eq!(dir_entry.keywords.get("type"), Some(&b"dir"[..]));
}

/// Determinism invariant (spec.md §8.5): two independent walks of an
/// unchanged tree produce byte-identical emitted manifests.
#[test]
fn two_walks_are_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("b"), b"second").unwrap();
    fs::write(dir.path().join("a"), b"first").unwrap();
    fs::create_dir(dir.path().join("sub")).unwrap();
    fs::write(dir.path().join("sub/c"), b"nested").unwrap();

    let config = WalkConfig::builder().build().unwrap();
    let first = mtree_fs::walk(dir.path(), &config).unwrap();
    let second = mtree_fs::walk(dir.path(), &config).unwrap();

    let mut first_bytes = Vec::new();
    let mut second_bytes = Vec::new();
    first.write_to(&mut first_bytes).unwrap();
    second.write_to(&mut second_bytes).unwrap();
    assert_eq!(first_bytes, second_bytes);
}

/// Non-directory children are emitted before directory children, both
/// byte-sorted (spec.md §4.3 step 2).
#[test]
fn files_before_directories_in_sorted_order() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("a_dir")).unwrap();
    fs::write(dir.path().join("z_file"), b"z").unwrap();
    fs::write(dir.path().join("m_file"), b"m").unwrap();

    let config = WalkConfig::builder().build().unwrap();
    let manifest = mtree_fs::walk(dir.path(), &config).unwrap();
    let names: Vec<String> = manifest
        .entries()
        .iter()
        .filter_map(|e| match e {
            mtree_core::Entry::Relative { name, .. } => Some(String::from_utf8_lossy(name).into_owned()),
            _ => None,
        })
        .collect();
    assert_eq!(names, vec!["m_file", "z_file", "a_dir"]);
}

#[test]
fn excludes_skip_matched_paths() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("keep"), b"x").unwrap();
    fs::write(dir.path().join("skip"), b"y").unwrap();

    let config = WalkConfig::builder()
        .excludes(vec![Box::new(|path: &std::path::Path, _: &fs::Metadata| {
            path.file_name().and_then(|n| n.to_str()) == Some("skip")
        })])
        .build()
        .unwrap();
    let manifest = mtree_fs::walk(dir.path(), &config).unwrap();
    let names: Vec<String> = manifest
        .entries()
        .iter()
        .filter_map(|e| match e {
            mtree_core::Entry::Relative { name, .. } => Some(String::from_utf8_lossy(name).into_owned()),
            _ => None,
        })
        .collect();
    assert_eq!(names, vec!["keep"]);
}
