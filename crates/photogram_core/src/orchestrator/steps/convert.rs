//! Convert format step - textured OBJ to GLB through a blender script.

use std::fs;

use crate::commands::ToolCommands;
use crate::config::Settings;
use crate::orchestrator::errors::{StageError, StageResult};
use crate::orchestrator::step::PipelineStep;
use crate::orchestrator::types::{
    Artifact, AssetRecord, Context, PipelinePaths, PlannedCommand, RunState, StageId,
};

use super::run_all;

/// Cleans the mesh and exports the transmission-ready GLB asset.
///
/// blender is treated as an opaque converter: only its exit status and the
/// presence of the GLB file matter. A zero exit without the file is a
/// `ConversionFailed`.
pub struct ConvertFormatStep;

impl ConvertFormatStep {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ConvertFormatStep {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStep for ConvertFormatStep {
    fn id(&self) -> StageId {
        StageId::ConvertFormat
    }

    fn description(&self) -> &str {
        "Convert the textured mesh to GLB with blender"
    }

    fn required_inputs(&self, paths: &PipelinePaths) -> Vec<Artifact> {
        vec![
            Artifact::File(paths.textured_mesh()),
            Artifact::File(paths.conversion_script.clone()),
        ]
    }

    fn declared_outputs(&self, paths: &PipelinePaths) -> Vec<Artifact> {
        vec![Artifact::File(paths.final_asset())]
    }

    fn planned_commands(&self, paths: &PipelinePaths, settings: &Settings) -> Vec<PlannedCommand> {
        let commands = ToolCommands::new(paths, settings);
        vec![PlannedCommand::unchecked(commands.convert_to_glb())]
    }

    fn execute(&self, ctx: &Context, state: &mut RunState) -> StageResult<()> {
        let asset = ctx.paths.final_asset();
        ctx.workspace.reset_files(std::slice::from_ref(&asset))?;

        run_all(ctx, state, &self.planned_commands(&ctx.paths, &ctx.settings))?;

        if let Ok(meta) = fs::metadata(&asset) {
            ctx.logger.info(&format!(
                "Wrote {} ({} bytes)",
                asset.display(),
                meta.len()
            ));
            state.final_asset = Some(AssetRecord {
                path: asset,
                bytes: meta.len(),
            });
        }
        Ok(())
    }

    fn validate_output(&self, ctx: &Context, _state: &RunState) -> StageResult<()> {
        let asset = ctx.paths.final_asset();
        if !asset.is_file() {
            return Err(StageError::conversion_failed(asset));
        }
        Ok(())
    }
}
