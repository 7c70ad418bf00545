use fpmatch::dataset::manifest::parse_line;
use fpmatch::{ChecksumKind, FpMatchError, Image, ImageLocator, ManifestReader};
use std::path::Path;
use tempfile::TempDir;

const MANIFEST: &str = "\
0a1b2c3d  png_txt/figs_0/f0001_01.png
0a1b2c3d  png_txt/figs_0/f0001_01.txt

# a comment line with several tokens
deadbeef png_txt/figs_0/s0001_01.png
justonetoken
cafebabe png_txt/figs_1/f0002_05.png trailing
feedface\tpng_txt/figs_1/s0002_05.png
";

fn write_manifest(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("md5.txt");
    std::fs::write(&path, MANIFEST).unwrap();
    path
}

#[test]
fn reader_skips_lines_without_exactly_two_tokens() {
    let td = TempDir::new().unwrap();
    let manifest = write_manifest(td.path());
    let reader = ManifestReader::new(&manifest, "/data/sd4");

    let records: Vec<_> = reader
        .records()
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    let sums: Vec<&str> = records.iter().map(|r| r.checksum().value()).collect();
    assert_eq!(sums, vec!["0a1b2c3d", "0a1b2c3d", "deadbeef", "feedface"]);
    assert!(records
        .iter()
        .all(|r| r.checksum().kind() == ChecksumKind::Md5));
    assert_eq!(
        records[3].filepath(),
        Path::new("/data/sd4/png_txt/figs_1/s0002_05.png")
    );

    for line in MANIFEST.lines() {
        let tokens = line.split_whitespace().count();
        assert_eq!(parse_line(line, Path::new("/")).is_some(), tokens == 2, "{line:?}");
    }
}

#[test]
fn reader_is_restartable() {
    let td = TempDir::new().unwrap();
    let manifest = write_manifest(td.path());
    let reader = ManifestReader::new(&manifest, td.path());

    let first: Vec<_> = reader.records().unwrap().map(Result::unwrap).collect();
    let second: Vec<_> = reader.records().unwrap().map(Result::unwrap).collect();
    assert_eq!(first, second);
    assert_eq!(first.len(), 4);
}

#[test]
fn missing_manifest_is_an_io_error() {
    let td = TempDir::new().unwrap();
    let reader = ManifestReader::new(td.path().join("absent.txt"), td.path());
    assert!(matches!(reader.records(), Err(FpMatchError::Io { .. })));
}

#[test]
fn locator_preserves_identity_and_filters_soundly() {
    let td = TempDir::new().unwrap();
    let manifest = write_manifest(td.path());
    let reader = ManifestReader::new(&manifest, td.path());
    let records: Vec<_> = reader.records().unwrap().map(Result::unwrap).collect();

    for extensions in [vec![".png"], vec![".txt"], vec![".png", ".txt"], vec![]] {
        let locator = ImageLocator::new(extensions.clone());
        let images: Vec<Image> = locator.locate(records.clone()).collect();
        for image in &images {
            assert_eq!(image.id, image.path.checksum().value());
            let ext = image.path.filepath().extension().unwrap().to_str().unwrap();
            assert!(extensions.contains(&format!(".{ext}").as_str()));
        }
        let expected = records
            .iter()
            .filter(|r| locator.accepts(r.filepath()))
            .count();
        assert_eq!(images.len(), expected);
    }

    let pngs: Vec<Image> = ImageLocator::default().locate(records).collect();
    let ids: Vec<&str> = pngs.iter().map(|img| img.id.as_str()).collect();
    assert_eq!(ids, vec!["0a1b2c3d", "deadbeef", "feedface"]);
}
