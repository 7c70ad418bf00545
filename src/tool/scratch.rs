//! Scoped scratch directories for external tool exchanges.

use crate::util::{FpMatchError, FpMatchResult};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const PREFIX: &str = "fpmatch-";

/// Exclusively owned temporary directory, removed with everything inside
/// when dropped (including during unwinding) or when closed.
#[derive(Debug)]
pub struct ScratchDir {
    dir: TempDir,
}

impl ScratchDir {
    /// Creates a fresh directory under `root`, or the system temp dir.
    pub fn new_in(root: Option<&Path>) -> FpMatchResult<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(PREFIX);
        let dir = match root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(|err| FpMatchError::io("creating scratch directory", err))?;
        Ok(Self { dir })
    }

    /// Returns the directory path.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Returns `name` resolved inside the directory.
    pub fn join(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Writes `bytes` to `name` inside the directory and returns its path.
    pub fn write(&self, name: &str, bytes: &[u8]) -> FpMatchResult<PathBuf> {
        let path = self.join(name);
        std::fs::write(&path, bytes)
            .map_err(|err| FpMatchError::io(format!("writing {}", path.display()), err))?;
        Ok(path)
    }

    /// Reads `path` fully, attributing failures to the scratch exchange.
    pub fn read(&self, path: &Path) -> FpMatchResult<Vec<u8>> {
        std::fs::read(path)
            .map_err(|err| FpMatchError::io(format!("reading {}", path.display()), err))
    }

    /// Removes the directory, reporting removal failures.
    pub fn close(self) -> FpMatchResult<()> {
        let path = self.dir.path().to_path_buf();
        self.dir
            .close()
            .map_err(|err| FpMatchError::io(format!("removing {}", path.display()), err))
    }

    /// Runs `f` inside a fresh scratch directory and removes it afterwards.
    ///
    /// The error from `f` wins over a removal error.
    pub fn scoped<T>(
        root: Option<&Path>,
        f: impl FnOnce(&ScratchDir) -> FpMatchResult<T>,
    ) -> FpMatchResult<T> {
        let scratch = Self::new_in(root)?;
        let out = f(&scratch);
        let closed = scratch.close();
        let value = out?;
        closed?;
        Ok(value)
    }
}
