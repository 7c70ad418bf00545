#![cfg(unix)]

use fpmatch::{
    Checksum, ChecksumKind, FpMatchError, Image, ManifestReader, Pipeline, PipelineConfig,
    ResultStore, Sampler, ToolSpec,
};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

const EXTRACTOR: &str = r#"
cp "$1" "$2.xyt"
"#;

const FAILING_EXTRACTOR: &str = r#"
case "$1" in
    *s0002*) exit 1 ;;
esac
cp "$1" "$2.xyt"
"#;

/// One-to-many scorer: score is the gallery file size.
const COUNTING_EXTRACTOR: &str = r#"
echo call >> "$(dirname "$0")/calls"
cp "$1" "$2.xyt"
"#;

const SCORER: &str = r#"
[ "$1" = "-p" ] || exit 64
shift 2
for f in "$@"; do
    wc -c < "$f"
done
"#;

const IMAGES: [(&str, &str); 4] = [
    ("figs_0/f0001_01.png", "ridge-1"),
    ("figs_0/s0001_01.png", "ridge-22"),
    ("figs_1/f0002_05.png", "ridge-333"),
    ("figs_1/s0002_05.png", "ridge-4444"),
];

struct Dataset {
    _td: TempDir,
    root: PathBuf,
    manifest: PathBuf,
    scripts: PathBuf,
    scratch: PathBuf,
    db: PathBuf,
}

fn dataset() -> Dataset {
    let td = TempDir::new().unwrap();
    let root = td.path().join("sd4");
    let scripts = td.path().join("scripts");
    let scratch = td.path().join("scratch");
    for dir in [&root, &scripts, &scratch] {
        std::fs::create_dir_all(dir).unwrap();
    }

    let mut manifest = String::from("garbage line with many tokens\n\n");
    for (rel, contents) in IMAGES {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, contents).unwrap();
        let sum = Checksum::compute(ChecksumKind::Md5, contents.as_bytes()).unwrap();
        manifest.push_str(&format!("{}  {rel}\n", sum.value()));
    }
    std::fs::write(root.join("README.txt"), "readme").unwrap();
    manifest.push_str("0123456789abcdef  README.txt\n");

    let manifest_path = td.path().join("md5.txt");
    std::fs::write(&manifest_path, manifest).unwrap();

    Dataset {
        db: td.path().join("scores.db"),
        _td: td,
        root,
        manifest: manifest_path,
        scripts,
        scratch,
    }
}

fn script(dir: &Path, name: &str, body: &str) -> ToolSpec {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    ToolSpec::new("/bin/sh").with_args([path.to_string_lossy().into_owned()])
}

fn config(ds: &Dataset, extractor: &str) -> PipelineConfig {
    PipelineConfig {
        extractor: script(&ds.scripts, "extract.sh", extractor),
        scorer: script(&ds.scripts, "score.sh", SCORER),
        scratch_root: Some(ds.scratch.clone()),
        timeout: Some(Duration::from_secs(30)),
        workers: Some(3),
        ..PipelineConfig::default()
    }
}

fn load_images(pipeline: &Pipeline, ds: &Dataset) -> Vec<Image> {
    let records = ManifestReader::new(&ds.manifest, &ds.root)
        .records()
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    pipeline.locator().locate(records).collect()
}

fn is_empty_dir(path: &Path) -> bool {
    std::fs::read_dir(path).unwrap().next().is_none()
}

#[test]
fn four_images_half_and_half_yield_four_rows() {
    let ds = dataset();
    let pipeline = Pipeline::new(config(&ds, EXTRACTOR)).unwrap();
    let images = load_images(&pipeline, &ds);
    assert_eq!(images.len(), 4);

    let mut store = ResultStore::open(&ds.db).unwrap();
    let mut observed = Vec::new();
    let summary = pipeline
        .run_with(
            &images,
            &mut Sampler::seeded(11),
            0.5,
            0.5,
            &mut store,
            |group| observed.push(group.to_vec()),
        )
        .unwrap();

    assert_eq!(summary.images, 4);
    assert_eq!(summary.templates, 4);
    assert_eq!(summary.probes, 2);
    assert_eq!(summary.gallery, 2);
    assert_eq!(summary.groups, 2);
    assert_eq!(summary.rows, 4);

    let rows = store.results().unwrap();
    assert_eq!(rows.len(), 4);
    assert_eq!(rows, observed.concat());

    // each group is one probe against the same two-element gallery, in order
    let ids: HashSet<&str> = images.iter().map(|img| img.id.as_str()).collect();
    let gallery: Vec<&str> = observed[0].iter().map(|r| r.gallery_id.as_str()).collect();
    for group in &observed {
        assert_eq!(group.len(), 2);
        assert!(group.iter().all(|r| r.probe_id == group[0].probe_id));
        let ordered: Vec<&str> = group.iter().map(|r| r.gallery_id.as_str()).collect();
        assert_eq!(ordered, gallery);
        for r in group {
            assert!(ids.contains(r.probe_id.as_str()));
            let image = images.iter().find(|img| img.id == r.gallery_id).unwrap();
            let size = std::fs::metadata(image.path.filepath()).unwrap().len();
            assert_eq!(r.score, size as i64);
        }
    }
    assert_ne!(observed[0][0].probe_id, observed[1][0].probe_id);
    assert!(is_empty_dir(&ds.scratch));
}

#[test]
fn zero_fractions_produce_no_rows() {
    let ds = dataset();
    let pipeline = Pipeline::new(config(&ds, EXTRACTOR)).unwrap();
    let images = load_images(&pipeline, &ds);
    let mut store = ResultStore::open_in_memory().unwrap();

    for (probe, gallery) in [(0.0, 0.5), (0.5, 0.0), (0.0, 0.0)] {
        let summary = pipeline
            .run(&images, &mut Sampler::seeded(1), probe, gallery, &mut store)
            .unwrap();
        assert_eq!(summary.groups, 0);
        assert_eq!(summary.rows, 0);
    }
    assert_eq!(store.count().unwrap(), 0);
}

#[test]
fn extraction_failure_aborts_before_persisting() {
    let ds = dataset();
    let pipeline = Pipeline::new(config(&ds, FAILING_EXTRACTOR)).unwrap();
    let images = load_images(&pipeline, &ds);
    let mut store = ResultStore::open(&ds.db).unwrap();

    let err = pipeline
        .run(&images, &mut Sampler::seeded(5), 1.0, 1.0, &mut store)
        .unwrap_err();
    assert!(matches!(err, FpMatchError::ExtractionFailure { .. }));
    assert_eq!(store.count().unwrap(), 0);
    assert!(is_empty_dir(&ds.scratch));
}

#[test]
fn bad_fractions_are_rejected_before_extraction() {
    let ds = dataset();
    let pipeline = Pipeline::new(config(&ds, COUNTING_EXTRACTOR)).unwrap();
    let images = load_images(&pipeline, &ds);
    let mut store = ResultStore::open_in_memory().unwrap();

    let cases = [
        (1.5, 0.5, "probe"),
        (0.5, -0.1, "gallery"),
        (f64::NAN, 0.5, "probe"),
    ];
    for (probe, gallery, name) in cases {
        let err = pipeline
            .run(&images, &mut Sampler::seeded(2), probe, gallery, &mut store)
            .unwrap_err();
        assert!(
            matches!(err, FpMatchError::InvalidFraction { name: n, .. } if n == name),
            "{err:?}"
        );
    }
    assert!(!ds.scripts.join("calls").exists());
    assert_eq!(store.count().unwrap(), 0);

    // the same extractor does run once the fractions are valid
    pipeline
        .run(&images, &mut Sampler::seeded(2), 0.5, 0.5, &mut store)
        .unwrap();
    let calls = std::fs::read_to_string(ds.scripts.join("calls")).unwrap();
    assert_eq!(calls.lines().count(), images.len());
}

#[test]
fn image_verification_rejects_modified_files() {
    let ds = dataset();
    let pipeline = Pipeline::new(PipelineConfig {
        verify_images: true,
        ..config(&ds, EXTRACTOR)
    })
    .unwrap();
    let images = load_images(&pipeline, &ds);
    let mut store = ResultStore::open_in_memory().unwrap();

    let summary = pipeline
        .run(&images, &mut Sampler::seeded(2), 0.25, 1.0, &mut store)
        .unwrap();
    assert_eq!(summary.rows, 4);

    std::fs::write(images[2].path.filepath(), "tampered").unwrap();
    let err = pipeline
        .run(&images, &mut Sampler::seeded(2), 0.25, 1.0, &mut store)
        .unwrap_err();
    assert!(matches!(err, FpMatchError::ChecksumMismatch { .. }));
}

#[test]
fn sequential_pool_matches_parallel_results() {
    let ds = dataset();
    let images = {
        let pipeline = Pipeline::new(config(&ds, EXTRACTOR)).unwrap();
        load_images(&pipeline, &ds)
    };

    let mut rows = Vec::new();
    for parallel in [true, false] {
        let pipeline = Pipeline::new(PipelineConfig {
            parallel,
            ..config(&ds, EXTRACTOR)
        })
        .unwrap();
        let mut store = ResultStore::open_in_memory().unwrap();
        pipeline
            .run(&images, &mut Sampler::seeded(9), 0.75, 0.5, &mut store)
            .unwrap();
        rows.push(store.results().unwrap());
    }
    assert_eq!(rows[0].len(), 6);
    assert_eq!(rows[0], rows[1]);
}
