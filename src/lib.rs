//! fpmatch drives a fingerprint matching experiment over a labeled image set.
//!
//! Minutiae extraction and scoring are delegated to external executables
//! (NBIS `mindtct` and `bozorth3` by default). This crate owns what surrounds
//! them: manifest indexing, parallel invocation with scoped scratch files,
//! probe/gallery sampling, and crash-consistent score persistence. Parallelism
//! comes from the `rayon` feature (on by default); `tracing` enables spans.

pub mod checksum;
pub mod dataset;
pub mod extract;
pub mod matcher;
pub mod pipeline;
pub mod pool;
pub mod sample;
pub mod store;
pub mod tool;
mod trace;
pub mod util;

pub use checksum::{Checksum, ChecksumKind};
pub use dataset::{
    DatasetProvider, Image, ImageLocator, LocalArchive, ManifestReader, PathRecord,
    NIST_SD4_SHA256, NIST_SD4_URL,
};
pub use extract::{Extractor, Template};
pub use matcher::{MatchRequest, MatchResult, Scorer};
pub use pipeline::{Pipeline, PipelineConfig, RunSummary};
pub use pool::WorkerPool;
pub use sample::{Sample, Sampler};
pub use store::{GroupTransaction, ResultStore};
pub use tool::{ScratchDir, Tool, ToolSpec};
pub use util::{FpMatchError, FpMatchResult};
