//! Structure-from-motion step - sparse reconstruction and undistortion with colmap.

use crate::commands::ToolCommands;
use crate::config::Settings;
use crate::orchestrator::errors::StageResult;
use crate::orchestrator::step::PipelineStep;
use crate::orchestrator::types::{
    Artifact, Context, PipelinePaths, PlannedCommand, RunState, StageId,
};

use super::run_all;

/// Builds the sparse model in `<workspace>/sparse/0` and the undistorted
/// images the dense stage works from.
///
/// colmap does not support incremental reruns, so the previous sparse tree,
/// feature database and undistorted output are always deleted first.
pub struct StructureFromMotionStep;

impl StructureFromMotionStep {
    pub fn new() -> Self {
        Self
    }
}

impl Default for StructureFromMotionStep {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStep for StructureFromMotionStep {
    fn id(&self) -> StageId {
        StageId::StructureFromMotion
    }

    fn description(&self) -> &str {
        "Sparse reconstruction and undistortion with colmap"
    }

    fn required_inputs(&self, paths: &PipelinePaths) -> Vec<Artifact> {
        vec![Artifact::NonEmptyDir(paths.images_dir())]
    }

    fn declared_outputs(&self, paths: &PipelinePaths) -> Vec<Artifact> {
        vec![
            Artifact::Dir(paths.sparse_model_dir()),
            Artifact::NonEmptyDir(paths.undistorted_images_dir()),
        ]
    }

    fn planned_commands(&self, paths: &PipelinePaths, settings: &Settings) -> Vec<PlannedCommand> {
        let commands = ToolCommands::new(paths, settings);
        vec![
            PlannedCommand::new(
                commands.sparse_reconstruction(),
                Artifact::Dir(paths.sparse_model_dir()),
            ),
            PlannedCommand::new(
                commands.undistort_images(),
                Artifact::NonEmptyDir(paths.undistorted_images_dir()),
            ),
        ]
    }

    fn execute(&self, ctx: &Context, state: &mut RunState) -> StageResult<()> {
        let paths = &ctx.paths;
        ctx.logger.section("Clearing previous reconstruction");
        ctx.workspace
            .reset_stage(&paths.sparse_dir(), &[paths.database()])?;
        ctx.workspace.reset_stage(&paths.undistorted_dir(), &[])?;

        run_all(ctx, state, &self.planned_commands(paths, &ctx.settings))
    }
}
