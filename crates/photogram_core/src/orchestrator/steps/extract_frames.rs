//! Extract frames step - samples still images from the input video with ffmpeg.

use crate::commands::ToolCommands;
use crate::config::Settings;
use crate::orchestrator::errors::StageResult;
use crate::orchestrator::step::PipelineStep;
use crate::orchestrator::types::{
    count_files, Artifact, Context, PipelinePaths, PlannedCommand, RunState, StageId,
};

use super::run_all;

/// Fills `<workspace>/images` with sequentially numbered frames.
///
/// The images directory is emptied first so frames from an earlier video
/// never mix with this run's. An empty result is not an error here; the
/// next stage refuses to start on an empty directory.
pub struct ExtractFramesStep;

impl ExtractFramesStep {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ExtractFramesStep {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStep for ExtractFramesStep {
    fn id(&self) -> StageId {
        StageId::ExtractFrames
    }

    fn description(&self) -> &str {
        "Extract frames from video with ffmpeg"
    }

    fn required_inputs(&self, paths: &PipelinePaths) -> Vec<Artifact> {
        vec![Artifact::File(paths.video_input.clone())]
    }

    fn declared_outputs(&self, paths: &PipelinePaths) -> Vec<Artifact> {
        vec![Artifact::Dir(paths.images_dir())]
    }

    fn planned_commands(&self, paths: &PipelinePaths, settings: &Settings) -> Vec<PlannedCommand> {
        let commands = ToolCommands::new(paths, settings);
        vec![PlannedCommand::new(
            commands.extract_frames(),
            Artifact::Dir(paths.images_dir()),
        )]
    }

    fn execute(&self, ctx: &Context, state: &mut RunState) -> StageResult<()> {
        let images = ctx.paths.images_dir();
        ctx.workspace.reset_stage(&images, &[])?;

        run_all(ctx, state, &self.planned_commands(&ctx.paths, &ctx.settings))?;

        let frames = count_files(&images);
        state.frame_count = Some(frames);
        if frames == 0 {
            ctx.logger
                .warn(&format!("No frames were written to {}", images.display()));
        } else {
            ctx.logger.info(&format!(
                "Extracted {} frames at {} fps",
                frames, ctx.settings.extraction.fps
            ));
        }
        Ok(())
    }
}
