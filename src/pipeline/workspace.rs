//! Run-scoped scratch directory for files the orchestrator writes for steps.
//!
//! The directory is created when a run starts and removed when it ends.
//! [`ScratchWorkspace::close`] removes it and reports failures; if the
//! workspace is dropped instead (early return, panic) the underlying
//! [`TempDir`] still removes it.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;

use crate::error::WorkspaceError;

const SCRATCH_PREFIX: &str = "mlforge-scratch-";

/// Temporary directory owned by one pipeline run.
#[derive(Debug)]
pub struct ScratchWorkspace {
    dir: TempDir,
    path: PathBuf,
    files: Vec<PathBuf>,
}

impl ScratchWorkspace {
    /// Creates a workspace under the system temporary directory.
    pub fn create() -> Result<Self, WorkspaceError> {
        let dir = tempfile::Builder::new()
            .prefix(SCRATCH_PREFIX)
            .tempdir()
            .map_err(WorkspaceError::Create)?;
        Ok(Self::from_dir(dir))
    }

    /// Creates a workspace under `parent`, creating `parent` if needed.
    pub fn create_in(parent: impl AsRef<Path>) -> Result<Self, WorkspaceError> {
        let parent = parent.as_ref();
        std::fs::create_dir_all(parent).map_err(WorkspaceError::Create)?;
        let dir = tempfile::Builder::new()
            .prefix(SCRATCH_PREFIX)
            .tempdir_in(parent)
            .map_err(WorkspaceError::Create)?;
        Ok(Self::from_dir(dir))
    }

    fn from_dir(dir: TempDir) -> Self {
        let path = dir.path().to_path_buf();
        debug!("Created scratch workspace {}", path.display());
        Self {
            dir,
            path,
            files: Vec::new(),
        }
    }

    /// Absolute path of the workspace directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Files written so far, in write order.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Writes `document` as pretty-printed JSON to `file_name` inside the
    /// workspace and returns the file's absolute path.
    ///
    /// # Errors
    ///
    /// `file_name` must be a plain file name; anything containing a path
    /// separator or `..` is rejected with `WorkspaceError::InvalidFileName`.
    pub fn write_json(
        &mut self,
        file_name: &str,
        document: &serde_json::Value,
    ) -> Result<PathBuf, WorkspaceError> {
        if Path::new(file_name).file_name() != Some(OsStr::new(file_name)) {
            return Err(WorkspaceError::InvalidFileName(file_name.to_string()));
        }

        let path = self.path.join(file_name);
        let bytes = serde_json::to_vec_pretty(document)?;
        std::fs::write(&path, bytes).map_err(|source| WorkspaceError::Write {
            path: path.clone(),
            source,
        })?;

        debug!("Wrote scratch file {}", path.display());
        if !self.files.contains(&path) {
            self.files.push(path.clone());
        }
        Ok(path)
    }

    /// Removes the workspace directory and everything in it.
    pub fn close(self) -> Result<(), WorkspaceError> {
        self.dir.close().map_err(|source| WorkspaceError::Remove {
            path: self.path.clone(),
            source,
        })?;
        debug!("Removed scratch workspace {}", self.path.display());
        Ok(())
    }
}
