//! Checksums for dataset archives and manifest entries.
//!
//! Manifest lines only ever carry md5 digests, but the dataset archive is
//! published with sha256, so the type covers the whole family. Digests are
//! compared as lowercase hex.

use crate::util::{FpMatchError, FpMatchResult};
use sha2::Digest;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

const BLOCK_SIZE: usize = 1 << 20;

/// Supported digest algorithms.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChecksumKind {
    Md5,
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

impl ChecksumKind {
    /// Every supported kind, in canonical order.
    pub const ALL: [ChecksumKind; 6] = [
        ChecksumKind::Md5,
        ChecksumKind::Sha1,
        ChecksumKind::Sha224,
        ChecksumKind::Sha256,
        ChecksumKind::Sha384,
        ChecksumKind::Sha512,
    ];

    /// Lowercase algorithm name as it appears in manifests.
    pub fn as_str(self) -> &'static str {
        match self {
            ChecksumKind::Md5 => "md5",
            ChecksumKind::Sha1 => "sha1",
            ChecksumKind::Sha224 => "sha224",
            ChecksumKind::Sha256 => "sha256",
            ChecksumKind::Sha384 => "sha384",
            ChecksumKind::Sha512 => "sha512",
        }
    }
}

impl fmt::Display for ChecksumKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChecksumKind {
    type Err = FpMatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ChecksumKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| FpMatchError::InvalidChecksumKind {
                kind: s.to_string(),
            })
    }
}

/// Expected digest value paired with its algorithm.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Checksum {
    value: String,
    kind: ChecksumKind,
}

impl Checksum {
    /// Creates a checksum from a typed kind.
    pub fn new(value: impl Into<String>, kind: ChecksumKind) -> Self {
        Self {
            value: value.into(),
            kind,
        }
    }

    /// Creates a checksum from a textual kind, rejecting unknown algorithms.
    pub fn parse(value: impl Into<String>, kind: &str) -> FpMatchResult<Self> {
        Ok(Self::new(value, kind.parse()?))
    }

    /// Shorthand for manifest entries.
    pub fn md5(value: impl Into<String>) -> Self {
        Self::new(value, ChecksumKind::Md5)
    }

    /// Returns the digest value as given.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Returns the digest algorithm.
    pub fn kind(&self) -> ChecksumKind {
        self.kind
    }

    /// Streams `reader` through the digest for `kind`.
    pub fn compute<R: Read>(kind: ChecksumKind, reader: R) -> std::io::Result<Self> {
        let value = match kind {
            ChecksumKind::Md5 => digest_hex::<md5::Md5, _>(reader)?,
            ChecksumKind::Sha1 => digest_hex::<sha1::Sha1, _>(reader)?,
            ChecksumKind::Sha224 => digest_hex::<sha2::Sha224, _>(reader)?,
            ChecksumKind::Sha256 => digest_hex::<sha2::Sha256, _>(reader)?,
            ChecksumKind::Sha384 => digest_hex::<sha2::Sha384, _>(reader)?,
            ChecksumKind::Sha512 => digest_hex::<sha2::Sha512, _>(reader)?,
        };
        Ok(Self { value, kind })
    }

    /// Computes the digest of `path` with this checksum's algorithm.
    pub fn compute_file(kind: ChecksumKind, path: &Path) -> FpMatchResult<Self> {
        let context = || format!("reading {}", path.display());
        let file = File::open(path).map_err(|err| FpMatchError::io(context(), err))?;
        Self::compute(kind, file).map_err(|err| FpMatchError::io(context(), err))
    }

    /// Fails with `ChecksumMismatch` unless `path` hashes to this value.
    pub fn verify_file(&self, path: &Path) -> FpMatchResult<()> {
        let actual = Self::compute_file(self.kind, path)?;
        if actual.value.eq_ignore_ascii_case(&self.value) {
            return Ok(());
        }
        Err(FpMatchError::ChecksumMismatch {
            path: path.to_path_buf(),
            expected: self.value.clone(),
            actual: actual.value,
        })
    }
}

fn digest_hex<D: Digest, R: Read>(mut reader: R) -> std::io::Result<String> {
    let mut hasher = D::new();
    let mut buf = vec![0u8; BLOCK_SIZE];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
