//! Streaming multi-digest computation.
//!
//! A single pass over a payload can feed several content digests at once,
//! matching `paketkoll_utils::checksum::sha256_readable`'s streaming-buffer
//! approach but generalized to the full family of digests `mtree(8)`
//! supports. Unlike `paketkoll_utils` (which hardcodes `ring`'s SHA-256 and
//! `md-5`'s MD5), this uses the RustCrypto `Digest` trait uniformly across
//! md5/sha1/sha256/sha384/sha512/rmd160 so one tee loop can drive any subset
//! of them with identical code.

use md5::Digest as _;
use sha1::Digest as _;
use sha2::Digest as _;
use std::collections::BTreeMap;
use std::io::Read;

/// The digest families a keyword registry entry (`sha1digest`, …) can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DigestAlgo {
    Md5,
    Sha1,
    Sha256,
    Sha384,
    Sha512,
    Rmd160,
}

impl DigestAlgo {
    pub const ALL: [DigestAlgo; 6] = [
        DigestAlgo::Md5,
        DigestAlgo::Sha1,
        DigestAlgo::Sha256,
        DigestAlgo::Sha384,
        DigestAlgo::Sha512,
        DigestAlgo::Rmd160,
    ];

    /// Keyword name this digest family is exposed as, e.g. `sha256digest`.
    pub const fn keyword_name(self) -> &'static str {
        match self {
            DigestAlgo::Md5 => "md5digest",
            DigestAlgo::Sha1 => "sha1digest",
            DigestAlgo::Sha256 => "sha256digest",
            DigestAlgo::Sha384 => "sha384digest",
            DigestAlgo::Sha512 => "sha512digest",
            DigestAlgo::Rmd160 => "rmd160digest",
        }
    }

    pub fn from_keyword_name(name: &str) -> Option<DigestAlgo> {
        Self::ALL.into_iter().find(|a| a.keyword_name() == name)
    }
}

/// Accumulates any subset of the supported digests over one streamed pass.
#[derive(Default)]
pub struct MultiDigest {
    md5: Option<md5::Md5>,
    sha1: Option<sha1::Sha1>,
    sha256: Option<sha2::Sha256>,
    sha384: Option<sha2::Sha384>,
    sha512: Option<sha2::Sha512>,
    rmd160: Option<ripemd::Ripemd160>,
}

impl MultiDigest {
    pub fn new(requested: impl IntoIterator<Item = DigestAlgo>) -> Self {
        let mut this = Self::default();
        for algo in requested {
            match algo {
                DigestAlgo::Md5 => this.md5 = Some(md5::Md5::new()),
                DigestAlgo::Sha1 => this.sha1 = Some(sha1::Sha1::new()),
                DigestAlgo::Sha256 => this.sha256 = Some(sha2::Sha256::new()),
                DigestAlgo::Sha384 => this.sha384 = Some(sha2::Sha384::new()),
                DigestAlgo::Sha512 => this.sha512 = Some(sha2::Sha512::new()),
                DigestAlgo::Rmd160 => this.rmd160 = Some(ripemd::Ripemd160::new()),
            }
        }
        this
    }

    pub fn is_empty(&self) -> bool {
        self.md5.is_none()
            && self.sha1.is_none()
            && self.sha256.is_none()
            && self.sha384.is_none()
            && self.sha512.is_none()
            && self.rmd160.is_none()
    }

    pub fn update(&mut self, chunk: &[u8]) {
        if let Some(h) = &mut self.md5 {
            h.update(chunk);
        }
        if let Some(h) = &mut self.sha1 {
            h.update(chunk);
        }
        if let Some(h) = &mut self.sha256 {
            h.update(chunk);
        }
        if let Some(h) = &mut self.sha384 {
            h.update(chunk);
        }
        if let Some(h) = &mut self.sha512 {
            h.update(chunk);
        }
        if let Some(h) = &mut self.rmd160 {
            h.update(chunk);
        }
    }

    /// Read `reader` to EOF, updating every requested digest one buffer at a
    /// time, in O(1) memory regardless of payload size.
    pub fn consume(&mut self, mut reader: impl Read) -> std::io::Result<u64> {
        let mut buf = [0u8; 64 * 1024];
        let mut total = 0u64;
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    self.update(&buf[..n]);
                    total += n as u64;
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(total)
    }

    /// Finalize every digest that was requested, keyed by keyword name.
    pub fn finalize(self) -> BTreeMap<&'static str, String> {
        let mut out = BTreeMap::new();
        if let Some(h) = self.md5 {
            out.insert(DigestAlgo::Md5.keyword_name(), hex(&h.finalize()));
        }
        if let Some(h) = self.sha1 {
            out.insert(DigestAlgo::Sha1.keyword_name(), hex(&h.finalize()));
        }
        if let Some(h) = self.sha256 {
            out.insert(DigestAlgo::Sha256.keyword_name(), hex(&h.finalize()));
        }
        if let Some(h) = self.sha384 {
            out.insert(DigestAlgo::Sha384.keyword_name(), hex(&h.finalize()));
        }
        if let Some(h) = self.sha512 {
            out.insert(DigestAlgo::Sha512.keyword_name(), hex(&h.finalize()));
        }
        if let Some(h) = self.rmd160 {
            out.insert(DigestAlgo::Rmd160.keyword_name(), hex(&h.finalize()));
        }
        out
    }
}

fn hex(bytes: &[u8]) -> String {
    faster_hex::hex_string(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn single_pass_computes_all_requested_digests() {
        let mut md = MultiDigest::new([DigestAlgo::Sha1, DigestAlgo::Sha256]);
        md.consume(&b"howdy\n"[..]).unwrap();
        let result = md.finalize();
        assert_eq!(
            result.get("sha1digest").unwrap(),
            "20a1d1f92fbf56cf35ba9bf7e21b25ab5b35c2d0"
        );
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn unrequested_digests_are_absent() {
        let mut md = MultiDigest::new([DigestAlgo::Md5]);
        md.consume(&b"x"[..]).unwrap();
        let result = md.finalize();
        assert_eq!(result.len(), 1);
        assert!(result.contains_key("md5digest"));
    }
}
