//! Scratch directory backing one server instance.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, error};

use crate::error::{Error, Result};

const PREFIX: &str = "tmppg";

/// Exclusively owned temporary directory, removed exactly once.
///
/// Removal happens on [`ScratchDir::remove`] or, failing that, on drop.
/// Removal errors are logged and never propagated.
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
    dir: Option<TempDir>,
}

impl ScratchDir {
    /// Creates a uniquely named `0700` directory under `root`, or under the
    /// system temp directory when `root` is `None`.
    pub fn create(root: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(PREFIX);
        let dir = match root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(|source| Error::Setup { source })?;

        let path = dir.path().to_path_buf();
        debug!(path = %path.display(), "created scratch directory");
        Ok(Self {
            path,
            dir: Some(dir),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Recursively removes the directory. Later calls are no-ops.
    pub fn remove(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };
        match dir.close() {
            Ok(()) => {
                debug!(path = %self.path.display(), "removed scratch directory")
            }
            Err(err) => error!(
                path = %self.path.display(),
                error = %err,
                "failed to remove temporary directory"
            ),
        }
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        self.remove();
    }
}
