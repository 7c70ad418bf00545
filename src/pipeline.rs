//! End-to-end matching run.
//!
//! Stages, in order: parallel extraction, probe/gallery sampling, parallel
//! one-to-many scoring (one request per probe), then sequential persistence
//! with one committed transaction per probe group.

use crate::dataset::{Image, ImageLocator};
use crate::extract::{Extractor, Template};
use crate::matcher::{MatchRequest, MatchResult, Scorer};
use crate::pool::WorkerPool;
use crate::sample::{sample_size, Sampler};
use crate::store::ResultStore;
use crate::tool::{Tool, ToolSpec};
use crate::trace::{trace_event, trace_span};
use crate::util::FpMatchResult;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for a pipeline run.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Feature extractor (`mindtct` by default).
    pub extractor: ToolSpec,
    /// Scorer (`bozorth3` by default).
    pub scorer: ToolSpec,
    /// Template file extension written by the extractor.
    pub template_ext: String,
    /// Image extensions picked from the manifest.
    pub accepted_extensions: Vec<String>,
    /// Parent directory for scratch directories (system temp dir if unset).
    pub scratch_root: Option<PathBuf>,
    /// Wall-clock limit per external tool call (`None` waits forever).
    pub timeout: Option<Duration>,
    /// Worker count (available parallelism if unset).
    pub workers: Option<usize>,
    /// Run extraction and scoring on the worker pool.
    pub parallel: bool,
    /// Check image digests against the manifest before extraction.
    pub verify_images: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            extractor: ToolSpec::new("mindtct"),
            scorer: ToolSpec::new("bozorth3"),
            template_ext: "xyt".to_string(),
            accepted_extensions: vec![".png".to_string()],
            scratch_root: None,
            timeout: Some(Duration::from_secs(300)),
            workers: None,
            parallel: true,
            verify_images: false,
        }
    }
}

/// Counts reported by a completed run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Images handed to the run.
    pub images: usize,
    /// Templates extracted from those images.
    pub templates: usize,
    /// Templates drawn as probes.
    pub probes: usize,
    /// Templates drawn into the gallery.
    pub gallery: usize,
    /// One-to-many groups scored and committed.
    pub groups: usize,
    /// Score rows written to the store.
    pub rows: usize,
}

/// Matching pipeline wired from a [`PipelineConfig`].
pub struct Pipeline {
    extractor: Extractor,
    scorer: Scorer,
    pool: WorkerPool,
    locator: ImageLocator,
}

impl Pipeline {
    /// Builds the extractor, scorer and worker pool once.
    pub fn new(config: PipelineConfig) -> FpMatchResult<Self> {
        let extractor = Extractor::new(
            Tool::new(config.extractor, config.timeout),
            config.template_ext.clone(),
        )
        .with_scratch_root(config.scratch_root.clone())
        .with_verify_images(config.verify_images);
        let scorer = Scorer::new(Tool::new(config.scorer, config.timeout), config.template_ext)
            .with_scratch_root(config.scratch_root);
        let pool = WorkerPool::new(config.workers, config.parallel)?;
        let locator = ImageLocator::new(config.accepted_extensions);
        Ok(Self {
            extractor,
            scorer,
            pool,
            locator,
        })
    }

    /// Image filter matching the configured extensions.
    pub fn locator(&self) -> &ImageLocator {
        &self.locator
    }

    /// Worker pool shared by extraction and scoring.
    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Runs extraction, sampling, scoring and persistence.
    pub fn run(
        &self,
        images: &[Image],
        sampler: &mut Sampler,
        probe_fraction: f64,
        gallery_fraction: f64,
        store: &mut ResultStore,
    ) -> FpMatchResult<RunSummary> {
        self.run_with(
            images,
            sampler,
            probe_fraction,
            gallery_fraction,
            store,
            |_| {},
        )
    }

    /// Like [`Pipeline::run`], calling `on_group` after each group commits.
    pub fn run_with(
        &self,
        images: &[Image],
        sampler: &mut Sampler,
        probe_fraction: f64,
        gallery_fraction: f64,
        store: &mut ResultStore,
        mut on_group: impl FnMut(&[MatchResult]),
    ) -> FpMatchResult<RunSummary> {
        let _span = trace_span!("pipeline_run", images = images.len()).entered();

        // fractions are checked before any tool runs
        sample_size(images.len(), probe_fraction, "probe")?;
        sample_size(images.len(), gallery_fraction, "gallery")?;

        let templates = self.extractor.extract_all(&self.pool, images)?;
        let sample = sampler.sample(&templates, probe_fraction, gallery_fraction)?;
        let requests = one_to_many_requests(&sample.probes, &sample.gallery);
        let groups = self.scorer.score_all(&self.pool, &requests)?;

        let mut rows = 0usize;
        for group in &groups {
            rows += store.insert_group(group)?;
            on_group(group);
        }

        let summary = RunSummary {
            images: images.len(),
            templates: templates.len(),
            probes: sample.probes.len(),
            gallery: sample.gallery.len(),
            groups: groups.len(),
            rows,
        };
        trace_event!("run_complete", groups = summary.groups, rows = summary.rows);
        Ok(summary)
    }
}

/// Builds one one-to-many request per probe; empty inputs yield no requests.
pub fn one_to_many_requests<'a>(
    probes: &'a [Template],
    gallery: &'a [Template],
) -> Vec<MatchRequest<'a>> {
    if gallery.is_empty() {
        return Vec::new();
    }
    probes
        .iter()
        .map(|probe| MatchRequest::OneToMany { probe, gallery })
        .collect()
}
