//! Dense reconstruction step - OpenMVS densify, mesh, refine and texture chain.

use crate::commands::{OpenMvsTool, ToolCommands};
use crate::config::Settings;
use crate::orchestrator::errors::StageResult;
use crate::orchestrator::step::PipelineStep;
use crate::orchestrator::types::{
    Artifact, Context, PipelinePaths, PlannedCommand, RunState, StageId,
};

use super::run_all;

/// Turns the undistorted sparse scene into a textured OBJ mesh.
///
/// Five OpenMVS programs run in a fixed chain, each reading the scene file
/// the previous one wrote. Every program is started from the OpenMVS bin
/// directory; the chain stops at the first program that fails or leaves
/// its scene file missing.
pub struct DenseReconstructStep;

impl DenseReconstructStep {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DenseReconstructStep {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStep for DenseReconstructStep {
    fn id(&self) -> StageId {
        StageId::DenseReconstructAndMesh
    }

    fn description(&self) -> &str {
        "Densify, mesh, refine and texture with OpenMVS"
    }

    fn required_inputs(&self, paths: &PipelinePaths) -> Vec<Artifact> {
        vec![
            Artifact::NonEmptyDir(paths.undistorted_images_dir()),
            Artifact::Dir(paths.openmvs_bin.clone()),
        ]
    }

    fn declared_outputs(&self, paths: &PipelinePaths) -> Vec<Artifact> {
        vec![Artifact::File(paths.textured_mesh())]
    }

    fn planned_commands(&self, paths: &PipelinePaths, settings: &Settings) -> Vec<PlannedCommand> {
        let commands = ToolCommands::new(paths, settings);
        OpenMvsTool::CHAIN
            .iter()
            .map(|&tool| PlannedCommand::new(commands.openmvs(tool), Artifact::File(tool.output(paths))))
            .collect()
    }

    fn execute(&self, ctx: &Context, state: &mut RunState) -> StageResult<()> {
        let paths = &ctx.paths;
        ctx.workspace.ensure_directories([&paths.output_dir])?;
        ctx.workspace.reset_files(&paths.dense_scene_files())?;

        run_all(ctx, state, &self.planned_commands(paths, &ctx.settings))
    }
}
