//! Majority-common-value `/set` delta encoding (spec.md §4.2: "A `/set` is
//! emitted whenever the majority-common keyword values within a directory
//! differ from the currently active `/set`; subsequent entries within that
//! scope only emit keywords whose value differs from the active set").
//!
//! Producers ([`crate::Entry`] sequences from the walker and tar streamer)
//! build every entry with its complete, locally-resolved keyword set first;
//! [`delta_encode`] is the final pass that factors the common values back
//! out into synthesized [`crate::model::Directive::Set`] entries.

use crate::model::Directive;
use crate::model::Entry;
use crate::model::KeywordSet;
use compact_str::CompactString;
use std::collections::BTreeMap;

enum Group {
    Passthrough(usize),
    Leaf(usize),
    Dir(usize, Vec<Group>),
}

/// Partition a flat entry sequence into nested directory scopes, using each
/// entry's own `type` keyword (always present on producer-built entries) to
/// tell directories from everything else, and `..` to close a scope.
fn group(entries: &[Entry], pos: &mut usize) -> Vec<Group> {
    let mut items = Vec::new();
    while *pos < entries.len() {
        match &entries[*pos] {
            Entry::DotDot => {
                *pos += 1;
                break;
            }
            Entry::Relative { keywords, .. } | Entry::Full { keywords, .. } => {
                let is_dir = keywords.get("type") == Some(b"dir");
                let idx = *pos;
                *pos += 1;
                if is_dir {
                    items.push(Group::Dir(idx, group(entries, pos)));
                } else {
                    items.push(Group::Leaf(idx));
                }
            }
            _ => {
                items.push(Group::Passthrough(*pos));
                *pos += 1;
            }
        }
    }
    items
}

/// The keyword/value pairs that appear on a strict majority of `indices`.
fn majority(entries: &[Entry], indices: &[usize]) -> Vec<(CompactString, Vec<u8>)> {
    let mut counts: BTreeMap<CompactString, BTreeMap<Vec<u8>, usize>> = BTreeMap::new();
    for &i in indices {
        let keywords = match &entries[i] {
            Entry::Relative { keywords, .. } | Entry::Full { keywords, .. } => keywords,
            _ => continue,
        };
        for kv in keywords.iter() {
            *counts.entry(kv.keyword.clone()).or_default().entry(kv.value.clone()).or_insert(0) += 1;
        }
    }
    let total = indices.len();
    counts
        .into_iter()
        .filter_map(|(keyword, values)| {
            let (value, count) = values.into_iter().max_by_key(|(_, count)| *count)?;
            (count * 2 > total).then_some((keyword, value))
        })
        .collect()
}

fn diff_against(local: &KeywordSet, active: &KeywordSet) -> KeywordSet {
    let mut out = KeywordSet::new();
    for kv in local.iter() {
        if active.get(&kv.keyword) != Some(kv.value.as_slice()) {
            out.set(kv.keyword.clone(), kv.value.clone());
        }
    }
    out
}

fn delta_entry(entry: &Entry, active: &KeywordSet) -> Entry {
    match entry {
        Entry::Relative { name, keywords } => Entry::Relative {
            name: name.clone(),
            keywords: diff_against(keywords, active),
        },
        Entry::Full { name, keywords } => Entry::Full {
            name: name.clone(),
            keywords: diff_against(keywords, active),
        },
        other => other.clone(),
    }
}

fn emit_set_once(common: &[(CompactString, Vec<u8>)], active: &mut KeywordSet, out: &mut Vec<Entry>, done: &mut bool) {
    if *done {
        return;
    }
    *done = true;
    let mut changed = KeywordSet::new();
    for (keyword, value) in common {
        if active.get(keyword) != Some(value.as_slice()) {
            changed.set(keyword.clone(), value.clone());
        }
    }
    if !changed.is_empty() {
        for kv in changed.iter() {
            active.set(kv.keyword.clone(), kv.value.clone());
        }
        out.push(Entry::Special(Directive::Set(changed)));
    }
}

/// `active` is the flat `/set` accumulator carried across the whole
/// manifest (see [`crate::Manifest::resolve`]'s Open Question note: there is
/// no per-scope reset, so a `/set` emitted here stays active after the
/// scope's closing `..` too).
fn emit(entries: &[Entry], items: &[Group], active: &mut KeywordSet, out: &mut Vec<Entry>) {
    let direct: Vec<usize> = items
        .iter()
        .filter_map(|group| match group {
            Group::Leaf(i) | Group::Dir(i, _) => Some(*i),
            Group::Passthrough(_) => None,
        })
        .collect();
    let common = if direct.is_empty() { Vec::new() } else { majority(entries, &direct) };
    let mut set_emitted = false;

    for item in items {
        match item {
            Group::Passthrough(i) => out.push(entries[*i].clone()),
            Group::Leaf(i) => {
                emit_set_once(&common, active, out, &mut set_emitted);
                out.push(delta_entry(&entries[*i], active));
            }
            Group::Dir(i, children) => {
                emit_set_once(&common, active, out, &mut set_emitted);
                out.push(delta_entry(&entries[*i], active));
                emit(entries, children, active, out);
                out.push(Entry::DotDot);
            }
        }
    }
}

/// Rewrite a producer's fully-specified entry sequence into the
/// delta-encoded form spec.md §4.2 requires: one synthesized `/set` per
/// directory scope covering whatever keyword values are common to a
/// majority of its direct children, with each entry then only carrying the
/// keywords that diverge from the active set.
pub fn delta_encode(entries: Vec<Entry>) -> Vec<Entry> {
    let mut pos = 0;
    let items = group(&entries, &mut pos);
    let mut active = KeywordSet::new();
    let mut out = Vec::new();
    emit(&entries, &items, &mut active, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn relative(name: &str, pairs: &[(&str, &[u8])]) -> Entry {
        let mut keywords = KeywordSet::new();
        for (k, v) in pairs {
            keywords.set(*k, v.to_vec());
        }
        Entry::Relative {
            name: name.as_bytes().to_vec(),
            keywords,
        }
    }

    #[test]
    fn factors_out_majority_common_values() {
        let entries = vec![
            relative("a", &[("type", b"file"), ("mode", b"0644")]),
            relative("b", &[("type", b"file"), ("mode", b"0644")]),
            relative("c", &[("type", b"file"), ("mode", b"0600")]),
        ];
        let out = delta_encode(entries);
        match &out[0] {
            Entry::Special(Directive::Set(set)) => {
                assert_eq!(set.get("type"), Some(&b"file"[..]));
                assert_eq!(set.get("mode"), Some(&b"0644"[..]));
            }
            other => panic!("expected a /set, got {other:?}"),
        }
        match &out[1] {
            Entry::Relative { keywords, .. } => assert!(keywords.is_empty()),
            other => panic!("expected a fully delta-encoded entry, got {other:?}"),
        }
        match &out[3] {
            Entry::Relative { keywords, .. } => assert_eq!(keywords.get("mode"), Some(&b"0600"[..])),
            other => panic!("expected a mode override, got {other:?}"),
        }
    }

    #[test]
    fn no_set_emitted_without_a_majority() {
        let entries = vec![
            relative("a", &[("type", b"file"), ("mode", b"0644")]),
            relative("b", &[("type", b"file"), ("mode", b"0600")]),
        ];
        let out = delta_encode(entries);
        assert!(!matches!(out[0], Entry::Special(_)));
    }

    #[test]
    fn nested_scope_set_persists_after_closing_scope() {
        let entries = vec![
            relative("bin", &[("type", b"dir"), ("mode", b"0755")]),
            relative("sh", &[("type", b"file"), ("mode", b"0755")]),
            Entry::DotDot,
            relative("next", &[("type", b"file"), ("mode", b"0755")]),
        ];
        let out = delta_encode(entries);
        // `next` is a sibling of `bin`, not one of its children, but the
        // flat accumulator keeps `mode=0755` active past the `..`, so it
        // should not need to repeat it.
        match out.last().unwrap() {
            Entry::Relative { keywords, .. } => assert!(keywords.is_empty()),
            other => panic!("expected delta-encoded entry, got {other:?}"),
        }
    }
}
