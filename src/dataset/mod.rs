//! Dataset acquisition and indexing.
//!
//! A provider hands back a local directory whose integrity was checked; the
//! manifest reader and image locator then turn its checksum index into
//! [`Image`] records without touching the image files themselves.

pub mod locate;
pub mod manifest;

pub use locate::{Image, ImageLocator};
pub use manifest::{ManifestReader, ManifestRecords, PathRecord};

use crate::checksum::Checksum;
use crate::trace::trace_event;
use crate::util::{FpMatchError, FpMatchResult};
use std::path::{Path, PathBuf};

/// NIST Special Database 4 (8-bit grayscale images of rolled fingerprints).
pub const NIST_SD4_URL: &str =
    "https://s3.amazonaws.com/nist-srd/SD4/NISTSpecialDatabase4GrayScaleImagesofFIGS.zip";

/// Published sha256 of [`NIST_SD4_URL`].
pub const NIST_SD4_SHA256: &str =
    "4db6a8f3f9dc14c504180cbf67cdf35167a109280f121c901be37a80ac13c449";

/// Supplies a verified local copy of a dataset.
pub trait DatasetProvider {
    /// Returns the local dataset directory for `url`.
    ///
    /// Fails with `ChecksumMismatch` when the local artifact disagrees with
    /// `expected`.
    fn acquire(&self, url: &str, expected: &Checksum) -> FpMatchResult<PathBuf>;
}

/// Provider backed by an archive that was already fetched into `prefix`.
///
/// The archive lives at `prefix/<basename(url)>` and is expected to be
/// extracted next to itself, in a directory named after the archive stem.
#[derive(Clone, Debug)]
pub struct LocalArchive {
    prefix: PathBuf,
    verify: bool,
}

impl LocalArchive {
    /// Creates a provider rooted at `prefix` that verifies archives it finds.
    pub fn new(prefix: impl Into<PathBuf>) -> Self {
        Self {
            prefix: prefix.into(),
            verify: true,
        }
    }

    /// Enables or disables archive digest verification.
    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// Returns the archive path for `url`.
    pub fn archive_path(&self, url: &str) -> PathBuf {
        let name = url.rsplit('/').next().unwrap_or(url);
        self.prefix.join(name)
    }
}

fn dataset_dir(archive: &Path) -> PathBuf {
    archive.with_extension("")
}

impl DatasetProvider for LocalArchive {
    fn acquire(&self, url: &str, expected: &Checksum) -> FpMatchResult<PathBuf> {
        let archive = self.archive_path(url);
        let dir = dataset_dir(&archive);

        if archive.is_file() {
            if self.verify {
                expected.verify_file(&archive)?;
                trace_event!("archive_verified", kind = expected.kind().as_str());
            }
        } else if !dir.is_dir() {
            return Err(FpMatchError::DatasetMissing { path: archive });
        }
        Ok(dir)
    }
}
