//! Manifest introspection (spec.md §4.6).

use crate::model::{Directive, Entry, Manifest};
use std::collections::BTreeSet;

/// The sorted union of every keyword name appearing in any [`Entry`] or
/// `/set`/`/unset` directive of `manifest`.
pub fn collect_used_keywords(manifest: &Manifest) -> Vec<String> {
    let mut used = BTreeSet::new();
    for entry in manifest.entries() {
        match entry {
            Entry::Blank | Entry::Comment(_) | Entry::DotDot => {}
            Entry::Special(Directive::Set(pairs)) => {
                used.extend(pairs.keys().map(str::to_owned));
            }
            Entry::Special(Directive::Unset(names)) => {
                used.extend(names.iter().map(|n| n.to_string()));
            }
            Entry::Full { keywords, .. } | Entry::Relative { keywords, .. } => {
                used.extend(keywords.keys().map(str::to_owned));
            }
        }
    }
    used.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn collects_keywords_from_sets_and_entries() {
        let manifest = Manifest::parse(
            &b"/set type=dir mode=0755\n\
               bin type=file size=6 sha1digest=abc\n\
               /unset size\n"[..],
        )
        .unwrap();
        assert_eq!(
            collect_used_keywords(&manifest),
            vec![
                "mode".to_string(),
                "sha1digest".to_string(),
                "size".to_string(),
                "type".to_string(),
            ]
        );
    }
}
