use mtree_check::{check, CheckConfig, Discrepancy};
use mtree_core::{Entry, KeywordSet, Manifest};
use pretty_assertions::assert_eq;
use std::fs;

fn spec_with(entries: Vec<(&str, &[(&str, &[u8])])>) -> Manifest {
    let mut out = Vec::new();
    for (name, kws) in entries {
        let mut keywords = KeywordSet::new();
        for (k, v) in kws {
            keywords.set(*k, v.to_vec());
        }
        out.push(Entry::Relative {
            name: name.as_bytes().to_vec(),
            keywords,
        });
    }
    Manifest::from_entries(out)
}

#[test]
fn clean_tree_has_no_discrepancies() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a"), b"hi").unwrap();

    let spec = spec_with(vec![("a", &[("type", b"file"), ("size", b"2")])]);
    let config = CheckConfig::builder()
        .keywords(vec!["type".to_string(), "size".to_string()])
        .build()
        .unwrap();
    let result = check(dir.path(), &spec, &config).unwrap();
    assert!(result.is_clean(), "{:?}", result.discrepancies);
}

#[test]
fn mode_mismatch_is_normalized_before_comparison() {
    use std::os::unix::fs::PermissionsExt as _;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a");
    fs::write(&path, b"hi").unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

    // "0644" vs "644" differ textually but are the same octal value.
    let spec = spec_with(vec![("a", &[("mode", b"644")])]);
    let config = CheckConfig::builder().keywords(vec!["mode".to_string()]).build().unwrap();
    let result = check(dir.path(), &spec, &config).unwrap();
    assert!(result.is_clean());
}

#[test]
fn digest_mismatch_is_case_insensitive() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a"), b"howdy\n").unwrap();

    let spec = spec_with(vec![(
        "a",
        &[("sha1digest", b"20A1D1F92FBF56CF35BA9BF7E21B25AB5B35C2D0")],
    )]);
    let config = CheckConfig::builder()
        .keywords(vec!["sha1digest".to_string()])
        .build()
        .unwrap();
    let result = check(dir.path(), &spec, &config).unwrap();
    assert!(result.is_clean());
}

#[test]
fn missing_and_extra_paths_are_reported() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("present"), b"x").unwrap();

    let spec = spec_with(vec![("absent", &[("type", b"file")])]);
    let config = CheckConfig::builder().build().unwrap();
    let result = check(dir.path(), &spec, &config).unwrap();

    assert!(result
        .discrepancies
        .iter()
        .any(|d| matches!(d, Discrepancy::Missing { path } if path.ends_with("absent"))));
    assert!(result
        .discrepancies
        .iter()
        .any(|d| matches!(d, Discrepancy::Extra { path } if path.ends_with("present"))));
}

#[test]
fn value_mismatch_reports_expected_and_observed() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a"), b"hi").unwrap();

    let spec = spec_with(vec![("a", &[("size", b"999")])]);
    let config = CheckConfig::builder().keywords(vec!["size".to_string()]).build().unwrap();
    let result = check(dir.path(), &spec, &config).unwrap();

    let failure = result
        .discrepancies
        .iter()
        .find(|d| matches!(d, Discrepancy::Failure { keyword, .. } if keyword == "size"))
        .expect("size failure present");
    match failure {
        Discrepancy::Failure { expected, observed, .. } => {
            assert_eq!(expected, b"999");
            assert_eq!(observed, b"2");
        }
        _ => unreachable!(),
    }
}

#[test]
fn unknown_requested_keyword_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let spec = Manifest::from_entries(vec![]);
    let config = CheckConfig::builder()
        .keywords(vec!["no-such-keyword".to_string()])
        .build()
        .unwrap();
    assert!(check(dir.path(), &spec, &config).is_err());
}
