//! Minutiae template extraction through an external feature extractor.
//!
//! The extractor contract is `extractor <image> <output-prefix>`; on success
//! the template is read from `<output-prefix>.<template_ext>`. Every call gets
//! its own scratch directory, which is gone once the call returns.

use crate::dataset::Image;
use crate::pool::WorkerPool;
use crate::tool::{ScratchDir, Tool};
use crate::trace::{trace_event, trace_span};
use crate::util::{FpMatchError, FpMatchResult};
use std::path::{Path, PathBuf};

/// Output prefix handed to the extractor inside its scratch directory.
const OUTPUT_STEM: &str = "result";

/// Minutiae template produced for one image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Template {
    /// Identity of the source image.
    pub image_id: String,
    /// Raw extractor output.
    pub data: Vec<u8>,
}

impl Template {
    /// Creates a template for `image_id`.
    pub fn new(image_id: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            image_id: image_id.into(),
            data: data.into(),
        }
    }
}

/// Runs the feature extractor for individual images.
#[derive(Clone, Debug)]
pub struct Extractor {
    tool: Tool,
    template_ext: String,
    scratch_root: Option<PathBuf>,
    verify_images: bool,
}

impl Extractor {
    /// Creates an extractor reading `<prefix>.<template_ext>` results.
    pub fn new(tool: Tool, template_ext: impl Into<String>) -> Self {
        Self {
            tool,
            template_ext: template_ext.into(),
            scratch_root: None,
            verify_images: false,
        }
    }

    /// Places scratch directories under `root` instead of the system temp dir.
    pub fn with_scratch_root(mut self, root: Option<PathBuf>) -> Self {
        self.scratch_root = root;
        self
    }

    /// Checks each image against its manifest digest before extracting.
    pub fn with_verify_images(mut self, verify: bool) -> Self {
        self.verify_images = verify;
        self
    }

    /// Extracts the template of a single image.
    pub fn extract(&self, image: &Image) -> FpMatchResult<Template> {
        if self.verify_images {
            image.path.verify()?;
        }
        let image_path = absolute(image.path.filepath())?;

        ScratchDir::scoped(self.scratch_root.as_deref(), |scratch| {
            let prefix = scratch.join(OUTPUT_STEM);
            self.tool
                .output([image_path.as_os_str(), prefix.as_os_str()])
                .map_err(|err| match err {
                    FpMatchError::ToolFailure { status, .. } => FpMatchError::ExtractionFailure {
                        image_id: image.id.clone(),
                        status,
                    },
                    other => other,
                })?;
            let data = scratch.read(&scratch.join(&format!("{OUTPUT_STEM}.{}", self.template_ext)))?;
            Ok(Template::new(image.id.clone(), data))
        })
    }

    /// Extracts templates for all images on the pool, in input order.
    pub fn extract_all(&self, pool: &WorkerPool, images: &[Image]) -> FpMatchResult<Vec<Template>> {
        let _span = trace_span!("extract_all", images = images.len()).entered();
        let templates = pool.map(images, |image| self.extract(image))?;
        trace_event!("templates_extracted", count = templates.len());
        Ok(templates)
    }
}

fn absolute(path: &Path) -> FpMatchResult<PathBuf> {
    std::path::absolute(path)
        .map_err(|err| FpMatchError::io(format!("resolving {}", path.display()), err))
}
