//! The bidirectional `.mtree` text grammar (spec.md §4.2).

use crate::error::CodecError;
use crate::model::{Directive, Entry, KeyVal, KeywordSet, Manifest};
use crate::vis;
use compact_str::CompactString;
use std::io::Read;
use std::io::Write;

fn split_tokens(line: &[u8]) -> Vec<&[u8]> {
    line.split(|b| *b == b' ' || *b == b'\t')
        .filter(|tok| !tok.is_empty())
        .collect()
}

fn parse_keyval(token: &[u8], line_no: usize) -> Result<KeyVal, CodecError> {
    let eq = memchr::memchr(b'=', token).ok_or_else(|| CodecError::MalformedEntry {
        line: line_no,
        reason: format!(
            "expected key=value, got {:?}",
            String::from_utf8_lossy(token)
        ),
    })?;
    let (key, value) = (&token[..eq], &token[eq + 1..]);
    let value = vis::decode(value).ok_or_else(|| CodecError::InvalidEncoding {
        line: line_no,
        reason: format!("bad escape in value of {:?}", String::from_utf8_lossy(key)),
    })?;
    Ok(KeyVal::new(CompactString::from_utf8_lossy(key), value))
}

/// Parse manifest text into a [`Manifest`].
pub fn parse(mut reader: impl Read) -> Result<Manifest, CodecError> {
    let mut text = Vec::new();
    reader.read_to_end(&mut text)?;

    let mut lines: Vec<&[u8]> = text.split(|b| *b == b'\n').collect();
    // A trailing newline produces one empty trailing "line"; drop it rather
    // than emitting a spurious Blank entry for it.
    if text.last() == Some(&b'\n') {
        lines.pop();
    }

    let mut entries = Vec::new();
    for (idx, line) in lines.into_iter().enumerate() {
        let line_no = idx + 1;
        if line.is_empty() {
            entries.push(Entry::Blank);
            continue;
        }
        if line[0] == b'#' {
            entries.push(Entry::Comment(line[1..].to_vec()));
            continue;
        }
        if line == b".." {
            entries.push(Entry::DotDot);
            continue;
        }

        let tokens = split_tokens(line);
        if tokens.is_empty() {
            entries.push(Entry::Blank);
            continue;
        }

        match tokens[0] {
            b"/set" => {
                let mut set = KeywordSet::new();
                for tok in &tokens[1..] {
                    let kv = parse_keyval(tok, line_no)?;
                    set.set(kv.keyword, kv.value);
                }
                entries.push(Entry::Special(Directive::Set(set)));
            }
            b"/unset" => {
                let names = tokens[1..]
                    .iter()
                    .map(|tok| CompactString::from_utf8_lossy(tok))
                    .collect();
                entries.push(Entry::Special(Directive::Unset(names)));
            }
            name_token => {
                let name = vis::decode(name_token).ok_or_else(|| CodecError::InvalidEncoding {
                    line: line_no,
                    reason: format!("bad escape in name {:?}", String::from_utf8_lossy(name_token)),
                })?;
                let mut keywords = KeywordSet::new();
                for tok in &tokens[1..] {
                    let kv = parse_keyval(tok, line_no)?;
                    keywords.set(kv.keyword, kv.value);
                }
                if name.contains(&b'/') {
                    entries.push(Entry::Full { name, keywords });
                } else {
                    entries.push(Entry::Relative { name, keywords });
                }
            }
        }
    }

    Ok(Manifest::from_entries(entries))
}

fn write_keyval(out: &mut impl Write, kv: &KeyVal) -> std::io::Result<()> {
    write!(out, " {}={}", kv.keyword, vis::encode(&kv.value))
}

/// Emit a manifest's entries in their preserved order, reproducing exactly
/// what [`parse`] would recover (the round-trip invariant, spec.md §8.1).
pub fn write_to(manifest: &Manifest, mut writer: impl Write) -> std::io::Result<()> {
    for entry in manifest.entries() {
        match entry {
            Entry::Blank => writeln!(writer)?,
            Entry::Comment(text) => {
                writer.write_all(b"#")?;
                writer.write_all(text)?;
                writeln!(writer)?;
            }
            Entry::DotDot => writeln!(writer, "..")?,
            Entry::Special(Directive::Set(pairs)) => {
                write!(writer, "/set")?;
                for kv in pairs.iter() {
                    write_keyval(&mut writer, kv)?;
                }
                writeln!(writer)?;
            }
            Entry::Special(Directive::Unset(names)) => {
                write!(writer, "/unset")?;
                for name in names {
                    write!(writer, " {name}")?;
                }
                writeln!(writer)?;
            }
            Entry::Full { name, keywords } | Entry::Relative { name, keywords } => {
                write!(writer, "{}", vis::encode(name))?;
                for kv in keywords.iter() {
                    write_keyval(&mut writer, kv)?;
                }
                writeln!(writer)?;
            }
        }
    }
    Ok(())
}
