use clap::Parser;
use fpmatch::{
    Checksum, ChecksumKind, DatasetProvider, Image, LocalArchive, ManifestReader, MatchResult,
    Pipeline, PipelineConfig, ResultStore, RunSummary, Sampler, ToolSpec,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const EXAMPLE_JSON: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config.example.json"));

#[derive(Parser, Debug)]
#[command(author, version, about = "Fingerprint matching experiment runner")]
struct Cli {
    /// Directory holding the downloaded dataset archive.
    #[arg(required_unless_present = "print_example")]
    dataset_prefix: Option<PathBuf>,
    /// Checksum manifest, one `<md5> <relative-path>` per line.
    #[arg(required_unless_present = "print_example")]
    manifest: Option<PathBuf>,
    /// Fraction of templates drawn as probes, in [0, 1].
    #[arg(required_unless_present = "print_example")]
    probe_fraction: Option<f64>,
    /// Fraction of templates drawn as the gallery, in [0, 1].
    #[arg(required_unless_present = "print_example")]
    gallery_fraction: Option<f64>,
    /// Optional JSON configuration file.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// SQLite file receiving the scores.
    #[arg(long, value_name = "FILE", default_value = "scores.db")]
    database: PathBuf,
    /// Seed for probe/gallery sampling (random if omitted).
    #[arg(long)]
    seed: Option<u64>,
    /// Print an example config and exit.
    #[arg(long)]
    print_example: bool,
    /// Enable tracing output.
    #[arg(long)]
    trace: bool,
}

#[derive(Debug, Deserialize)]
struct ToolConfig {
    program: String,
    #[serde(default)]
    args: Vec<String>,
}

impl From<ToolSpec> for ToolConfig {
    fn from(value: ToolSpec) -> Self {
        Self {
            program: value.program,
            args: value.args,
        }
    }
}

impl From<ToolConfig> for ToolSpec {
    fn from(value: ToolConfig) -> Self {
        ToolSpec::new(value.program).with_args(value.args)
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct Config {
    extractor: ToolConfig,
    scorer: ToolConfig,
    template_ext: String,
    accepted_extensions: Vec<String>,
    scratch_root: Option<PathBuf>,
    timeout_secs: Option<u64>,
    workers: Option<usize>,
    parallel: bool,
    verify_images: bool,
    verify_archive: bool,
    dataset_url: String,
    dataset_sha256: String,
}

impl Default for Config {
    fn default() -> Self {
        let cfg = PipelineConfig::default();
        Self {
            extractor: cfg.extractor.into(),
            scorer: cfg.scorer.into(),
            template_ext: cfg.template_ext,
            accepted_extensions: cfg.accepted_extensions,
            scratch_root: cfg.scratch_root,
            timeout_secs: cfg.timeout.map(|t| t.as_secs()),
            workers: cfg.workers,
            parallel: cfg.parallel,
            verify_images: cfg.verify_images,
            verify_archive: true,
            dataset_url: fpmatch::NIST_SD4_URL.to_string(),
            dataset_sha256: fpmatch::NIST_SD4_SHA256.to_string(),
        }
    }
}

impl From<Config> for PipelineConfig {
    fn from(value: Config) -> Self {
        PipelineConfig {
            extractor: value.extractor.into(),
            scorer: value.scorer.into(),
            template_ext: value.template_ext,
            accepted_extensions: value.accepted_extensions,
            scratch_root: value.scratch_root,
            timeout: value
                .timeout_secs
                .filter(|&secs| secs > 0)
                .map(Duration::from_secs),
            workers: value.workers,
            parallel: value.parallel,
            verify_images: value.verify_images,
        }
    }
}

#[derive(Debug, Serialize)]
struct MatchRecord<'a> {
    probe: &'a str,
    gallery: &'a str,
    score: i64,
}

impl<'a> From<&'a MatchResult> for MatchRecord<'a> {
    fn from(value: &'a MatchResult) -> Self {
        Self {
            probe: &value.probe_id,
            gallery: &value.gallery_id,
            score: value.score,
        }
    }
}

#[derive(Debug, Serialize)]
struct Output {
    database: String,
    images: usize,
    templates: usize,
    probes: usize,
    gallery: usize,
    groups: usize,
    rows: usize,
}

impl Output {
    fn new(database: &std::path::Path, summary: RunSummary) -> Self {
        Self {
            database: database.display().to_string(),
            images: summary.images,
            templates: summary.templates,
            probes: summary.probes,
            gallery: summary.gallery,
            groups: summary.groups,
            rows: summary.rows,
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.trace {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env().add_directive("fpmatch=info".parse()?))
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    if cli.print_example {
        println!("{EXAMPLE_JSON}");
        return Ok(());
    }

    let (Some(prefix), Some(manifest), Some(probe_fraction), Some(gallery_fraction)) = (
        cli.dataset_prefix,
        cli.manifest,
        cli.probe_fraction,
        cli.gallery_fraction,
    ) else {
        return Err("dataset prefix, manifest and both fractions are required".into());
    };

    let config: Config = match &cli.config {
        Some(path) => serde_json::from_str(&fs::read_to_string(path)?)?,
        None => Config::default(),
    };

    let expected = Checksum::new(config.dataset_sha256.clone(), ChecksumKind::Sha256);
    let root = LocalArchive::new(prefix)
        .with_verify(config.verify_archive)
        .acquire(&config.dataset_url, &expected)?;

    let pipeline = Pipeline::new(config.into())?;
    let mut sampler = match cli.seed {
        Some(seed) => Sampler::seeded(seed),
        None => Sampler::from_os_rng(),
    };

    tracing::info!("loading images from {}", root.display());
    let records = ManifestReader::new(manifest, &root)
        .records()?
        .collect::<Result<Vec<_>, _>>()?;
    let images: Vec<Image> = pipeline.locator().locate(records).collect();
    tracing::info!(
        images = images.len(),
        workers = pipeline.pool().workers(),
        "matching"
    );
    let mut store = ResultStore::open(&cli.database)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let mut write_err = None;
    let summary = pipeline.run_with(
        &images,
        &mut sampler,
        probe_fraction,
        gallery_fraction,
        &mut store,
        |group| {
            for result in group {
                let line = serde_json::to_string(&MatchRecord::from(result));
                let written = line
                    .map_err(std::io::Error::from)
                    .and_then(|line| writeln!(out, "{line}"));
                if let Err(err) = written {
                    write_err.get_or_insert(err);
                }
            }
        },
    )?;
    if let Some(err) = write_err {
        return Err(err.into());
    }

    let json = serde_json::to_string_pretty(&Output::new(&cli.database, summary))?;
    writeln!(out, "{json}")?;
    Ok(())
}
