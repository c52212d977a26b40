//! Core types for the orchestrator pipeline.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::Settings;
use crate::logging::RunLogger;
use crate::runner::{CommandRunner, CommandSpec, ProcessResult, RunnerError};
use crate::validation::ValidationReport;
use crate::workspace::WorkspaceManager;

/// Name of the run summary written into the output directory.
pub const SUMMARY_FILE: &str = "pipeline_summary.json";

/// Absolute locations every stage reads from or writes to.
///
/// Resolved once before the run starts and never changed afterwards.
/// Stages only communicate through these paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelinePaths {
    pub workspace: PathBuf,
    pub video_input: PathBuf,
    pub output_dir: PathBuf,
    pub openmvs_bin: PathBuf,
    pub conversion_script: PathBuf,
    pub logs_dir: PathBuf,
}

impl PipelinePaths {
    /// Extracted frames.
    pub fn images_dir(&self) -> PathBuf {
        self.workspace.join("images")
    }

    /// Feature database written by structure-from-motion.
    pub fn database(&self) -> PathBuf {
        self.workspace.join("database.db")
    }

    pub fn sparse_dir(&self) -> PathBuf {
        self.workspace.join("sparse")
    }

    /// First (and only used) sparse model.
    pub fn sparse_model_dir(&self) -> PathBuf {
        self.sparse_dir().join("0")
    }

    pub fn undistorted_dir(&self) -> PathBuf {
        self.workspace.join("undistorted_output")
    }

    pub fn undistorted_images_dir(&self) -> PathBuf {
        self.undistorted_dir().join("images")
    }

    pub fn scene_mvs(&self) -> PathBuf {
        self.output_dir.join("scene.mvs")
    }

    pub fn dense_mvs(&self) -> PathBuf {
        self.output_dir.join("scene_dense.mvs")
    }

    pub fn mesh_mvs(&self) -> PathBuf {
        self.output_dir.join("scene_dense_mesh.mvs")
    }

    pub fn refined_mesh_mvs(&self) -> PathBuf {
        self.output_dir.join("scene_dense_mesh_refine.mvs")
    }

    pub fn textured_mesh(&self) -> PathBuf {
        self.output_dir.join("scene_textured_mesh.obj")
    }

    /// The transmission-ready asset produced by the last stage.
    pub fn final_asset(&self) -> PathBuf {
        self.output_dir.join("scene_textured_mesh.glb")
    }

    pub fn summary_file(&self) -> PathBuf {
        self.output_dir.join(SUMMARY_FILE)
    }

    /// Scene files the dense stage writes into the shared output directory.
    pub fn dense_scene_files(&self) -> Vec<PathBuf> {
        [
            "scene.mvs",
            "scene_dense.mvs",
            "scene_dense.ply",
            "scene_dense_mesh.mvs",
            "scene_dense_mesh.ply",
            "scene_dense_mesh_refine.mvs",
            "scene_dense_mesh_refine.ply",
            "scene_textured_mesh.obj",
            "scene_textured_mesh.mtl",
        ]
        .iter()
        .map(|name| self.output_dir.join(name))
        .collect()
    }

    /// Every directory the pipeline creates before the first stage.
    pub fn directories(&self) -> Vec<PathBuf> {
        vec![
            self.workspace.clone(),
            self.images_dir(),
            self.undistorted_dir(),
            self.output_dir.clone(),
            self.logs_dir.clone(),
        ]
    }

    /// Workspace data that is only needed while the run is in progress.
    pub fn intermediates(&self) -> Vec<PathBuf> {
        vec![
            self.images_dir(),
            self.sparse_dir(),
            self.database(),
            self.undistorted_dir(),
        ]
    }
}

/// Read-only context passed to pipeline steps.
///
/// Contains resolved paths and shared resources that steps can read
/// but not modify. Mutable state goes in `RunState`.
pub struct Context {
    pub paths: PipelinePaths,
    pub settings: Settings,
    /// Executes every external tool.
    pub runner: Arc<dyn CommandRunner>,
    pub workspace: WorkspaceManager,
    /// Per-run operator log.
    pub logger: Arc<RunLogger>,
    pub run_name: String,
}

impl Context {
    pub fn new(
        paths: PipelinePaths,
        settings: Settings,
        runner: Arc<dyn CommandRunner>,
        logger: Arc<RunLogger>,
        run_name: impl Into<String>,
    ) -> Self {
        let workspace = WorkspaceManager::new(paths.workspace.clone());
        Self {
            paths,
            settings,
            runner,
            workspace,
            logger,
            run_name: run_name.into(),
        }
    }
}

/// Pipeline stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    ExtractFrames,
    StructureFromMotion,
    Validate,
    DenseReconstructAndMesh,
    ConvertFormat,
}

impl StageId {
    pub const ALL: [StageId; 5] = [
        StageId::ExtractFrames,
        StageId::StructureFromMotion,
        StageId::Validate,
        StageId::DenseReconstructAndMesh,
        StageId::ConvertFormat,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            StageId::ExtractFrames => "ExtractFrames",
            StageId::StructureFromMotion => "StructureFromMotion",
            StageId::Validate => "Validate",
            StageId::DenseReconstructAndMesh => "DenseReconstructAndMesh",
            StageId::ConvertFormat => "ConvertFormat",
        }
    }

    /// 1-based position in the pipeline.
    pub fn ordinal(&self) -> u8 {
        match self {
            StageId::ExtractFrames => 1,
            StageId::StructureFromMotion => 2,
            StageId::Validate => 3,
            StageId::DenseReconstructAndMesh => 4,
            StageId::ConvertFormat => 5,
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A filesystem path a stage consumes or produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    /// A regular file.
    File(PathBuf),
    /// A directory, possibly empty.
    Dir(PathBuf),
    /// A directory holding at least one regular file.
    NonEmptyDir(PathBuf),
}

impl Artifact {
    pub fn path(&self) -> &Path {
        match self {
            Artifact::File(p) | Artifact::Dir(p) | Artifact::NonEmptyDir(p) => p,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Artifact::File(_) => "file",
            Artifact::Dir(_) => "directory",
            Artifact::NonEmptyDir(_) => "non-empty directory",
        }
    }

    pub fn is_present(&self) -> bool {
        match self {
            Artifact::File(p) => p.is_file(),
            Artifact::Dir(p) => p.is_dir(),
            Artifact::NonEmptyDir(p) => count_files(p) > 0,
        }
    }
}

/// Number of regular files directly inside `dir` (0 if unreadable).
pub fn count_files(dir: &Path) -> usize {
    fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .filter(|entry| entry.path().is_file())
                .count()
        })
        .unwrap_or(0)
}

/// One external command a stage issues, with the artifact proving it worked.
#[derive(Debug, Clone)]
pub struct PlannedCommand {
    pub spec: CommandSpec,
    /// Checked right after a zero exit; `None` leaves it to the stage's
    /// own output validation.
    pub produces: Option<Artifact>,
}

impl PlannedCommand {
    pub fn new(spec: CommandSpec, produces: Artifact) -> Self {
        Self {
            spec,
            produces: Some(produces),
        }
    }

    pub fn unchecked(spec: CommandSpec) -> Self {
        Self {
            spec,
            produces: None,
        }
    }
}

/// Mutable run state that accumulates results from pipeline steps.
///
/// Serialized as the run summary after every run, successful or not.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunState {
    pub run_id: String,
    pub started_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
    pub paths: Option<PipelinePaths>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
    pub stages: Vec<StageRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_asset: Option<AssetRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureRecord>,
    /// Bytes freed by intermediate cleanup, if it ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleaned_bytes: Option<u64>,
}

impl RunState {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            started_at: chrono::Local::now().to_rfc3339(),
            ..Default::default()
        }
    }

    pub fn begin_stage(&mut self, stage: StageId) {
        self.stages.push(StageRecord {
            stage,
            status: StageStatus::Running,
            started_at: chrono::Local::now().to_rfc3339(),
            duration_ms: 0,
            commands: Vec::new(),
        });
    }

    pub fn finish_stage(&mut self, status: StageStatus, duration: Duration) {
        if let Some(record) = self.stages.last_mut() {
            record.status = status;
            record.duration_ms = duration.as_millis() as u64;
        }
    }

    /// Attach a command record to the stage currently running.
    pub fn record_command(&mut self, command: CommandRecord) {
        if let Some(record) = self.stages.last_mut() {
            record.commands.push(command);
        }
    }

    pub fn stage(&self, stage: StageId) -> Option<&StageRecord> {
        self.stages.iter().find(|r| r.stage == stage)
    }

    pub fn has_completed(&self, stage: StageId) -> bool {
        self.stage(stage)
            .is_some_and(|r| r.status == StageStatus::Completed)
    }

    pub fn completed_stages(&self) -> Vec<StageId> {
        self.stages
            .iter()
            .filter(|r| r.status == StageStatus::Completed)
            .map(|r| r.stage)
            .collect()
    }

    /// Total commands issued across all stages.
    pub fn command_count(&self) -> usize {
        self.stages.iter().map(|r| r.commands.len()).sum()
    }

    pub fn succeeded(&self) -> bool {
        self.failure.is_none() && self.final_asset.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: StageId,
    pub status: StageStatus,
    pub started_at: String,
    pub duration_ms: u64,
    pub commands: Vec<CommandRecord>,
}

/// One executed command, successful or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRecord {
    pub program: String,
    pub command_line: String,
    /// `None` when the process never ran to completion.
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandRecord {
    pub fn finished(spec: &CommandSpec, result: &ProcessResult) -> Self {
        Self {
            program: spec.program_name(),
            command_line: spec.display(),
            exit_code: Some(result.exit_code),
            duration_ms: result.duration.as_millis() as u64,
            error: None,
        }
    }

    pub fn failed(spec: &CommandSpec, error: &RunnerError, elapsed: Duration) -> Self {
        Self {
            program: spec.program_name(),
            command_line: spec.display(),
            exit_code: error.exit_code(),
            duration_ms: elapsed.as_millis() as u64,
            error: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetRecord {
    pub path: PathBuf,
    pub bytes: u64,
}

/// Where and why the run stopped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<StageId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<super::errors::ErrorKind>,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_paths() -> PipelinePaths {
        PipelinePaths {
            workspace: PathBuf::from("/data/ws"),
            video_input: PathBuf::from("/data/chair.mp4"),
            output_dir: PathBuf::from("/data/out"),
            openmvs_bin: PathBuf::from("/opt/openmvs/bin"),
            conversion_script: PathBuf::from("/opt/scripts/obj_to_glb_cleanup.py"),
            logs_dir: PathBuf::from("/data/ws/logs"),
        }
    }

    #[test]
    fn derived_layout() {
        let paths = sample_paths();
        assert_eq!(paths.sparse_model_dir(), PathBuf::from("/data/ws/sparse/0"));
        assert_eq!(
            paths.undistorted_dir(),
            PathBuf::from("/data/ws/undistorted_output")
        );
        assert_eq!(
            paths.final_asset(),
            PathBuf::from("/data/out/scene_textured_mesh.glb")
        );
        assert!(paths
            .intermediates()
            .iter()
            .all(|p| p.starts_with(&paths.workspace)));
    }

    #[test]
    fn stage_ordinals_follow_order() {
        let ordinals: Vec<u8> = StageId::ALL.iter().map(|s| s.ordinal()).collect();
        assert_eq!(ordinals, vec![1, 2, 3, 4, 5]);
        assert_eq!(StageId::Validate.to_string(), "Validate");
    }

    #[test]
    fn non_empty_dir_requires_a_file() {
        let dir = tempdir().unwrap();
        let artifact = Artifact::NonEmptyDir(dir.path().to_path_buf());
        assert!(!artifact.is_present());

        fs::create_dir(dir.path().join("nested")).unwrap();
        assert!(!artifact.is_present());

        fs::write(dir.path().join("frame_0001.jpg"), b"jpg").unwrap();
        assert!(artifact.is_present());
        assert!(Artifact::Dir(dir.path().to_path_buf()).is_present());
        assert!(!Artifact::File(dir.path().to_path_buf()).is_present());
    }

    #[test]
    fn run_state_tracks_stages() {
        let mut state = RunState::new("run-1");
        state.begin_stage(StageId::ExtractFrames);
        state.finish_stage(StageStatus::Completed, Duration::from_millis(1500));
        state.begin_stage(StageId::StructureFromMotion);
        state.finish_stage(StageStatus::Failed, Duration::from_secs(3));

        assert!(state.has_completed(StageId::ExtractFrames));
        assert!(!state.has_completed(StageId::StructureFromMotion));
        assert_eq!(state.completed_stages(), vec![StageId::ExtractFrames]);
        assert_eq!(state.stages[0].duration_ms, 1500);
        assert!(!state.succeeded());
    }

    #[test]
    fn run_state_serializes() {
        let state = RunState::new("run-456");
        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains("\"run_id\":\"run-456\""));
        assert!(!json.contains("final_asset"));
    }
}
