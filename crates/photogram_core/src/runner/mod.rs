//! External process execution.
//!
//! Every tool the pipeline drives (ffmpeg, colmap, the OpenMVS suite,
//! blender) goes through the [`CommandRunner`] trait. Stages never spawn
//! processes directly, which keeps them testable with a recording double.
//!
//! Execution is synchronous: `execute` blocks until the child exits or its
//! deadline passes. Failures are classified, never retried.

mod system;
mod types;

use std::env;
use std::path::{Path, PathBuf};

pub use system::SystemRunner;
pub use types::{CommandSpec, ProcessResult, RunnerError, RunnerResult};

/// Executes one external command to completion.
pub trait CommandRunner: Send + Sync {
    /// Run the command and wait for it.
    ///
    /// Returns `Ok` only for a zero exit status. A missing executable,
    /// a failing exit status and an expired deadline are each reported as
    /// their own [`RunnerError`] variant.
    fn execute(&self, spec: &CommandSpec) -> RunnerResult<ProcessResult>;
}

/// Resolve a program the way the OS would when spawning it.
///
/// Programs given with a directory component are checked directly; bare
/// names are searched for in `PATH`.
pub fn locate_executable(program: &Path) -> Option<PathBuf> {
    if program.components().count() > 1 {
        if program.is_file() {
            return Some(program.to_path_buf());
        }
        #[cfg(windows)]
        {
            let exe = program.with_extension("exe");
            if exe.is_file() {
                return Some(exe);
            }
        }
        return None;
    }

    let path_var = env::var_os("PATH")?;
    for dir in env::split_paths(&path_var) {
        let full = dir.join(program);
        if full.is_file() {
            return Some(full);
        }
        #[cfg(windows)]
        {
            let exe = full.with_extension("exe");
            if exe.is_file() {
                return Some(exe);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn locates_explicit_path() {
        let dir = tempdir().unwrap();
        let tool = dir.path().join("InterfaceColmap");
        fs::write(&tool, b"").unwrap();

        assert_eq!(locate_executable(&tool), Some(tool.clone()));
        assert_eq!(locate_executable(&dir.path().join("ReconstructMesh")), None);
    }

    #[cfg(windows)]
    #[test]
    fn explicit_path_gains_exe_suffix() {
        let dir = tempdir().unwrap();
        let tool = dir.path().join("InterfaceColmap.exe");
        fs::write(&tool, b"").unwrap();

        assert_eq!(
            locate_executable(&dir.path().join("InterfaceColmap")),
            Some(tool)
        );
        assert_eq!(locate_executable(&dir.path().join("DensifyPointCloud")), None);
    }

    #[cfg(unix)]
    #[test]
    fn locates_bare_name_on_path() {
        assert!(locate_executable(Path::new("sh")).is_some());
        assert!(locate_executable(Path::new("no-such-tool-91c2")).is_none());
    }
}
