//! Checksum manifest parsing.
//!
//! A manifest line reads `<md5> <relative-path>`. Lines with any other token
//! count are skipped rather than reported, so headers, comments and blank
//! lines in vendor manifests are harmless.

use crate::checksum::Checksum;
use crate::trace::trace_debug;
use crate::util::{FpMatchError, FpMatchResult};
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};

/// File path resolved against the dataset root, with its expected digest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathRecord {
    checksum: Checksum,
    filepath: PathBuf,
}

impl PathRecord {
    /// Pairs a checksum with a resolved path.
    pub fn new(checksum: Checksum, filepath: impl Into<PathBuf>) -> Self {
        Self {
            checksum,
            filepath: filepath.into(),
        }
    }

    /// Returns the expected digest.
    pub fn checksum(&self) -> &Checksum {
        &self.checksum
    }

    /// Returns the resolved file path.
    pub fn filepath(&self) -> &Path {
        &self.filepath
    }

    /// Recomputes the file digest and compares it with the manifest value.
    pub fn verify(&self) -> FpMatchResult<()> {
        self.checksum.verify_file(&self.filepath)
    }
}

/// Parses a single manifest line, returning `None` for malformed lines.
pub fn parse_line(line: &str, root: &Path) -> Option<PathRecord> {
    let mut tokens = line.split_whitespace();
    let (Some(digest), Some(rel), None) = (tokens.next(), tokens.next(), tokens.next()) else {
        return None;
    };
    Some(PathRecord::new(Checksum::md5(digest), root.join(rel)))
}

/// Reads a manifest file relative to a dataset root.
///
/// Each call to [`ManifestReader::records`] reopens the file, so the sequence
/// can be replayed.
#[derive(Clone, Debug)]
pub struct ManifestReader {
    manifest: PathBuf,
    root: PathBuf,
}

impl ManifestReader {
    /// Creates a reader for `manifest`, resolving entries against `root`.
    pub fn new(manifest: impl Into<PathBuf>, root: impl Into<PathBuf>) -> Self {
        Self {
            manifest: manifest.into(),
            root: root.into(),
        }
    }

    /// Returns the manifest path.
    pub fn manifest(&self) -> &Path {
        &self.manifest
    }

    /// Opens the manifest and returns a lazy record iterator.
    pub fn records(&self) -> FpMatchResult<ManifestRecords> {
        let file = File::open(&self.manifest).map_err(|err| {
            FpMatchError::io(format!("opening manifest {}", self.manifest.display()), err)
        })?;
        Ok(ManifestRecords {
            lines: BufReader::new(file).lines(),
            root: self.root.clone(),
            manifest: self.manifest.clone(),
        })
    }
}

/// Lazy iterator over the well-formed records of a manifest.
pub struct ManifestRecords {
    lines: Lines<BufReader<File>>,
    root: PathBuf,
    manifest: PathBuf,
}

impl Iterator for ManifestRecords {
    type Item = FpMatchResult<PathRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(err) => {
                    let context = format!("reading manifest {}", self.manifest.display());
                    return Some(Err(FpMatchError::io(context, err)));
                }
            };
            match parse_line(&line, &self.root) {
                Some(record) => return Some(Ok(record)),
                None => {
                    trace_debug!("manifest_line_skipped", line = line.as_str());
                }
            }
        }
    }
}
