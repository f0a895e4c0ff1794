use mtree_core::Manifest;
use pretty_assertions::assert_eq;

#[test]
fn parse_emit_parse_is_stable() {
    let text = b"# user: root\n\
                 # machine: build-host\n\
                 /set type=dir mode=0755 uid=0 gid=0\n\
                 bin type=dir\n\
                 file.txt type=file mode=0644 size=6 sha1digest=20a1d1f92fbf56cf35ba9bf7e21b25ab5b35c2d0\n\
                 ..\n\
                 ..\n";
    let manifest = Manifest::parse(&text[..]).unwrap();
    let mut emitted = Vec::new();
    manifest.write_to(&mut emitted).unwrap();
    let reparsed = Manifest::parse(&emitted[..]).unwrap();
    assert_eq!(manifest, reparsed);
}

#[test]
fn resolves_nested_paths_and_active_set() {
    let text = b"/set type=dir mode=0755\n\
                 bin\n\
                 tool type=file mode=0644\n\
                 ..\n\
                 ..\n";
    let manifest = Manifest::parse(&text[..]).unwrap();
    let resolved = manifest.resolve();
    let paths: Vec<_> = resolved.iter().map(|r| r.path.to_string_lossy().into_owned()).collect();
    assert_eq!(paths, vec!["./bin", "./bin/tool"]);
    let tool = &resolved[1];
    assert_eq!(tool.keywords.get("mode"), Some(&b"0644"[..]));
    // inherited from the active /set, not overridden locally
    assert_eq!(resolved[0].keywords.get("mode"), Some(&b"0755"[..]));
}
