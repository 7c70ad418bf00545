//! Error types for fpmatch.

use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;
use thiserror::Error;

/// Result alias for fpmatch operations.
pub type Result<T> = std::result::Result<T, FpMatchError>;

/// Errors that can occur while running the matching pipeline.
#[derive(Debug, Error)]
pub enum FpMatchError {
    /// The input data or parameters are invalid.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    /// Checksum kind outside the supported digest family.
    #[error("unsupported checksum kind: {kind:?}")]
    InvalidChecksumKind { kind: String },
    /// File contents disagree with the expected digest.
    #[error("checksum mismatch for {}: expected {expected}, got {actual}", path.display())]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },
    /// Neither the dataset archive nor its extracted directory exist.
    #[error("dataset not found at {}", path.display())]
    DatasetMissing { path: PathBuf },
    /// Sampling fraction outside `[0, 1]`.
    #[error("{name} fraction must be within [0, 1], got {value}")]
    InvalidFraction { name: &'static str, value: f64 },
    /// The feature extractor exited unsuccessfully for an image.
    #[error("feature extraction failed for image {image_id}: {status}")]
    ExtractionFailure { image_id: String, status: ExitStatus },
    /// A match request whose shape the scorer cannot run.
    #[error("invalid {kind} match request: {reason}")]
    InvalidMatchRequest {
        kind: &'static str,
        reason: &'static str,
    },
    /// Scorer output could not be read as the expected integers.
    #[error("unparseable scorer output {output:?}: {reason}")]
    ScoreParse { output: String, reason: String },
    /// An external tool exited unsuccessfully.
    #[error("{program} exited with {status}")]
    ToolFailure { program: String, status: ExitStatus },
    /// An external tool ran past its deadline and was killed.
    #[error("{program} timed out after {timeout:?}")]
    ToolTimeout { program: String, timeout: Duration },
    /// Filesystem or process I/O failure.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
    /// Result store query failure.
    #[error("result store: {0}")]
    Database(#[from] diesel::result::Error),
    /// Result store could not be opened.
    #[error("result store connection: {0}")]
    Connection(#[from] diesel::ConnectionError),
}

impl FpMatchError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}
