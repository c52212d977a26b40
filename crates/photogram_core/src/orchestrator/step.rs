//! Pipeline step trait definition.
//!
//! All pipeline stages implement this trait, providing a consistent
//! interface for planning, validation and execution.

use super::errors::{StageError, StageResult};
use super::types::{Artifact, Context, PipelinePaths, PlannedCommand, RunState, StageId};
use crate::config::Settings;

/// Trait for pipeline stages.
///
/// The pipeline runner calls these methods in order:
///
/// 1. `validate_input` - Check every declared input exists
/// 2. `execute` - Reset the stage's outputs and run its tools
/// 3. `validate_output` - Verify the declared outputs now exist
///
/// The planning methods take only paths and settings, so a run can be
/// described (dry run, tool preflight) without creating anything on disk.
///
/// # Example
///
/// ```ignore
/// struct ThumbnailStep;
///
/// impl PipelineStep for ThumbnailStep {
///     fn id(&self) -> StageId { StageId::ConvertFormat }
///
///     fn required_inputs(&self, paths: &PipelinePaths) -> Vec<Artifact> {
///         vec![Artifact::File(paths.textured_mesh())]
///     }
///
///     fn declared_outputs(&self, paths: &PipelinePaths) -> Vec<Artifact> {
///         vec![Artifact::File(paths.output_dir.join("thumb.png"))]
///     }
///
///     fn planned_commands(&self, paths: &PipelinePaths, settings: &Settings) -> Vec<PlannedCommand> {
///         vec![PlannedCommand::unchecked(render_thumbnail(paths, settings))]
///     }
///
///     fn execute(&self, ctx: &Context, state: &mut RunState) -> StageResult<()> {
///         for planned in self.planned_commands(&ctx.paths, &ctx.settings) {
///             run_planned(ctx, state, &planned)?;
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait PipelineStep: Send + Sync {
    fn id(&self) -> StageId;

    /// Get the stage name (for logging and error context).
    fn name(&self) -> &str {
        self.id().name()
    }

    /// Human-readable description of what this stage does.
    fn description(&self) -> &str {
        self.name()
    }

    /// Paths that must exist before the stage may start.
    fn required_inputs(&self, paths: &PipelinePaths) -> Vec<Artifact>;

    /// Paths the stage promises to leave behind.
    fn declared_outputs(&self, paths: &PipelinePaths) -> Vec<Artifact>;

    /// Commands the stage will issue, in order.
    fn planned_commands(&self, paths: &PipelinePaths, settings: &Settings) -> Vec<PlannedCommand>;

    /// Validate inputs before execution.
    ///
    /// Fails with `InputMissing` on the first absent input; no tool is
    /// started in that case.
    fn validate_input(&self, ctx: &Context) -> StageResult<()> {
        for input in self.required_inputs(&ctx.paths) {
            if !input.is_present() {
                return Err(StageError::input_missing(&input));
            }
        }
        Ok(())
    }

    /// Execute the stage's main work and record results in `state`.
    fn execute(&self, ctx: &Context, state: &mut RunState) -> StageResult<()>;

    /// Validate outputs after execution.
    ///
    /// A tool that exits zero without writing its output still fails here.
    fn validate_output(&self, ctx: &Context, _state: &RunState) -> StageResult<()> {
        for output in self.declared_outputs(&ctx.paths) {
            if !output.is_present() {
                return Err(StageError::output_missing(self.name(), &output));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopStep;

    impl PipelineStep for NoopStep {
        fn id(&self) -> StageId {
            StageId::Validate
        }

        fn required_inputs(&self, paths: &PipelinePaths) -> Vec<Artifact> {
            vec![Artifact::Dir(paths.sparse_model_dir())]
        }

        fn declared_outputs(&self, _paths: &PipelinePaths) -> Vec<Artifact> {
            Vec::new()
        }

        fn planned_commands(&self, _paths: &PipelinePaths, _settings: &Settings) -> Vec<PlannedCommand> {
            Vec::new()
        }

        fn execute(&self, _ctx: &Context, _state: &mut RunState) -> StageResult<()> {
            Ok(())
        }
    }

    #[test]
    fn step_trait_object_works() {
        let step: Box<dyn PipelineStep> = Box::new(NoopStep);

        assert_eq!(step.name(), "Validate");
        assert_eq!(step.description(), "Validate");
        assert_eq!(step.id().ordinal(), 3);
    }
}
