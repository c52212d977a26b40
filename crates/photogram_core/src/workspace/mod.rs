//! On-disk working directory lifecycle.
//!
//! Reconstruction tools are not built for incremental reruns: a sparse
//! model left over from an earlier attempt can sit next to freshly written
//! files and be picked up by the validator. Before a stage runs, its output
//! location is reset so it only ever holds artifacts from the current
//! invocation.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Filesystem failure with the operation and path that caused it.
#[derive(Error, Debug)]
#[error("Workspace error while {operation} '{}': {source}", .path.display())]
pub struct WorkspaceError {
    pub operation: String,
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

impl WorkspaceError {
    fn new(operation: impl Into<String>, path: &Path, source: io::Error) -> Self {
        Self {
            operation: operation.into(),
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Result type for workspace operations.
pub type WorkspaceResult<T> = Result<T, WorkspaceError>;

/// Creates and clears the directories stages write into.
///
/// Holds no state besides the workspace root, which is only used to refuse
/// deleting anything outside of it.
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
}

impl WorkspaceManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create every directory (and its parents) that does not exist yet.
    ///
    /// Idempotent: existing directories are left untouched.
    pub fn ensure_directories<I, P>(&self, paths: I) -> WorkspaceResult<()>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        for path in paths {
            let path = path.as_ref();
            fs::create_dir_all(path)
                .map_err(|e| WorkspaceError::new("creating directory", path, e))?;
        }
        Ok(())
    }

    /// Delete a stage's previous output tree, plus any extra files tied to
    /// it, then recreate the directory empty.
    ///
    /// Targets that do not exist are not an error.
    pub fn reset_stage(&self, output_dir: &Path, extra_files: &[PathBuf]) -> WorkspaceResult<()> {
        self.remove_path(output_dir)?;
        self.reset_files(extra_files)?;
        fs::create_dir_all(output_dir)
            .map_err(|e| WorkspaceError::new("recreating directory", output_dir, e))?;
        tracing::debug!("Reset stage output {}", output_dir.display());
        Ok(())
    }

    /// Delete individual stale artifacts from a directory shared with other data.
    pub fn reset_files(&self, files: &[PathBuf]) -> WorkspaceResult<()> {
        for file in files {
            self.remove_path(file)?;
        }
        Ok(())
    }

    /// Remove intermediate data once a run has produced its final asset.
    ///
    /// Only paths inside the workspace root are removed; anything else is
    /// skipped with a warning.
    pub fn remove_intermediates(&self, paths: &[PathBuf]) -> WorkspaceResult<u64> {
        let mut freed = 0;
        for path in paths {
            if !path.starts_with(&self.root) {
                tracing::warn!(
                    "Not removing {}: outside workspace {}",
                    path.display(),
                    self.root.display()
                );
                continue;
            }
            freed += disk_usage(path);
            self.remove_path(path)?;
        }
        Ok(freed)
    }

    fn remove_path(&self, path: &Path) -> WorkspaceResult<()> {
        let result = match fs::symlink_metadata(path) {
            Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
            Ok(_) => fs::remove_file(path),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => Err(e),
        };
        result.map_err(|e| WorkspaceError::new("removing", path, e))
    }
}

/// Total size in bytes of a file or directory tree (best effort).
fn disk_usage(path: &Path) -> u64 {
    let Ok(meta) = fs::symlink_metadata(path) else {
        return 0;
    };
    if !meta.is_dir() {
        return meta.len();
    }
    fs::read_dir(path)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .map(|entry| disk_usage(&entry.path()))
                .sum()
        })
        .unwrap_or(0)
}
