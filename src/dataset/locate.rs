//! Image selection over manifest records.

use crate::dataset::manifest::PathRecord;
use std::path::Path;

/// Dataset image keyed by its manifest checksum.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Image {
    /// Stable identity across the pipeline (the checksum value).
    pub id: String,
    /// Originating manifest record.
    pub path: PathRecord,
}

impl Image {
    /// Wraps a record, taking the checksum value as identity.
    pub fn from_record(path: PathRecord) -> Self {
        Self {
            id: path.checksum().value().to_string(),
            path,
        }
    }
}

/// Filters manifest records down to image files by extension.
///
/// Extensions are matched exactly, including the leading dot.
#[derive(Clone, Debug)]
pub struct ImageLocator {
    extensions: Vec<String>,
}

impl Default for ImageLocator {
    fn default() -> Self {
        Self::new([".png"])
    }
}

impl ImageLocator {
    /// Creates a locator accepting the given extensions (`".png"` style).
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let extensions = extensions
            .into_iter()
            .map(|ext| {
                let ext = ext.into();
                if ext.starts_with('.') {
                    ext
                } else {
                    format!(".{ext}")
                }
            })
            .collect();
        Self { extensions }
    }

    /// Returns the accepted extensions.
    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// Returns true when `path` carries an accepted extension.
    pub fn accepts(&self, path: &Path) -> bool {
        let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
            return false;
        };
        self.extensions
            .iter()
            .any(|accepted| accepted.strip_prefix('.') == Some(ext))
    }

    /// Maps accepted records to images, preserving input order.
    pub fn locate<'a, I>(&'a self, records: I) -> impl Iterator<Item = Image> + 'a
    where
        I: IntoIterator<Item = PathRecord>,
        I::IntoIter: 'a,
    {
        records
            .into_iter()
            .filter(move |record| self.accepts(record.filepath()))
            .map(Image::from_record)
    }
}
