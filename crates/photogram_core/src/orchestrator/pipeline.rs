//! Pipeline runner that executes stages in sequence.

use std::time::Instant;

use super::errors::{PipelineError, PipelineResult, StageResult};
use super::step::PipelineStep;
use super::types::{Context, RunState, StageId, StageStatus};

/// Pipeline that runs a fixed sequence of stages.
///
/// Stages run strictly one after another. The first failure stops the
/// run: later stages are never started and nothing is retried. Rerunning
/// always starts over from the first stage.
pub struct Pipeline {
    steps: Vec<Box<dyn PipelineStep>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    /// Add a step to the pipeline.
    pub fn add_step<S: PipelineStep + 'static>(&mut self, step: S) -> &mut Self {
        self.steps.push(Box::new(step));
        self
    }

    /// Add a step (builder pattern).
    pub fn with_step<S: PipelineStep + 'static>(mut self, step: S) -> Self {
        self.add_step(step);
        self
    }

    /// Run every stage with the given context, recording into `state`.
    ///
    /// For each stage:
    /// 1. Run `validate_input`
    /// 2. Run `execute`
    /// 3. Run `validate_output`
    ///
    /// The failing stage's error is returned wrapped with the stage identity.
    pub fn run(&self, ctx: &Context, state: &mut RunState) -> PipelineResult<PipelineRunResult> {
        let mut result = PipelineRunResult {
            stages_completed: Vec::new(),
        };

        for step in &self.steps {
            let id = step.id();
            ctx.logger
                .stage(&format!("Stage {}: {}", id.ordinal(), step.description()));
            tracing::info!(stage = id.name(), "Starting stage");

            state.begin_stage(id);
            let started = Instant::now();

            match run_step(step.as_ref(), ctx, state) {
                Ok(()) => {
                    let elapsed = started.elapsed();
                    state.finish_stage(StageStatus::Completed, elapsed);
                    ctx.logger.success(&format!(
                        "{} completed in {:.1}s",
                        step.name(),
                        elapsed.as_secs_f64()
                    ));
                    result.stages_completed.push(id);
                }
                Err(e) => {
                    state.finish_stage(StageStatus::Failed, started.elapsed());
                    ctx.logger.error(&format!("{} failed: {}", step.name(), e));
                    tracing::error!(stage = id.name(), kind = ?e.kind(), "Stage failed");
                    return Err(PipelineError::stage_failed(&ctx.run_name, id, e));
                }
            }
        }

        ctx.logger.success("Pipeline completed successfully");
        Ok(result)
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Get step names in order.
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    pub fn steps(&self) -> impl Iterator<Item = &dyn PipelineStep> {
        self.steps.iter().map(|s| s.as_ref())
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

fn run_step(step: &dyn PipelineStep, ctx: &Context, state: &mut RunState) -> StageResult<()> {
    ctx.logger
        .debug(&format!("Validating input for '{}'", step.name()));
    step.validate_input(ctx)?;

    ctx.logger.debug(&format!("Executing '{}'", step.name()));
    step.execute(ctx, state)?;

    ctx.logger
        .debug(&format!("Validating output for '{}'", step.name()));
    step.validate_output(ctx, state)
}

/// Result of a successful pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineRunResult {
    pub stages_completed: Vec<StageId>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::orchestrator::errors::{ErrorKind, StageError};
    use crate::orchestrator::testing::{test_context, RecordingRunner};
    use crate::orchestrator::types::{Artifact, PipelinePaths, PlannedCommand};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::tempdir;

    struct CountingStep {
        id: StageId,
        execute_count: Arc<AtomicUsize>,
        fail: bool,
    }

    impl CountingStep {
        fn new(id: StageId, execute_count: &Arc<AtomicUsize>) -> Self {
            Self {
                id,
                execute_count: Arc::clone(execute_count),
                fail: false,
            }
        }

        fn failing(mut self) -> Self {
            self.fail = true;
            self
        }
    }

    impl PipelineStep for CountingStep {
        fn id(&self) -> StageId {
            self.id
        }

        fn required_inputs(&self, _paths: &PipelinePaths) -> Vec<Artifact> {
            Vec::new()
        }

        fn declared_outputs(&self, _paths: &PipelinePaths) -> Vec<Artifact> {
            Vec::new()
        }

        fn planned_commands(&self, _paths: &PipelinePaths, _settings: &Settings) -> Vec<PlannedCommand> {
            Vec::new()
        }

        fn execute(&self, ctx: &Context, _state: &mut RunState) -> StageResult<()> {
            self.execute_count.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(StageError::conversion_failed(ctx.paths.final_asset()));
            }
            Ok(())
        }
    }

    #[test]
    fn pipeline_builds_correctly() {
        let count = Arc::new(AtomicUsize::new(0));
        let pipeline = Pipeline::new()
            .with_step(CountingStep::new(StageId::ExtractFrames, &count))
            .with_step(CountingStep::new(StageId::StructureFromMotion, &count));

        assert_eq!(pipeline.step_count(), 2);
        assert_eq!(
            pipeline.step_names(),
            vec!["ExtractFrames", "StructureFromMotion"]
        );
    }

    #[test]
    fn runs_all_stages_in_order() {
        let dir = tempdir().unwrap();
        let ctx = test_context(dir.path(), Arc::new(RecordingRunner::fabricating()));
        let count = Arc::new(AtomicUsize::new(0));
        let pipeline = Pipeline::new()
            .with_step(CountingStep::new(StageId::ExtractFrames, &count))
            .with_step(CountingStep::new(StageId::StructureFromMotion, &count))
            .with_step(CountingStep::new(StageId::Validate, &count));

        let mut state = RunState::new("run");
        let result = pipeline.run(&ctx, &mut state).unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert_eq!(
            result.stages_completed,
            vec![
                StageId::ExtractFrames,
                StageId::StructureFromMotion,
                StageId::Validate
            ]
        );
        assert_eq!(state.completed_stages(), result.stages_completed);
    }

    #[test]
    fn stops_at_first_failure() {
        let dir = tempdir().unwrap();
        let ctx = test_context(dir.path(), Arc::new(RecordingRunner::fabricating()));
        let before = Arc::new(AtomicUsize::new(0));
        let after = Arc::new(AtomicUsize::new(0));
        let pipeline = Pipeline::new()
            .with_step(CountingStep::new(StageId::ExtractFrames, &before))
            .with_step(CountingStep::new(StageId::StructureFromMotion, &before).failing())
            .with_step(CountingStep::new(StageId::Validate, &after))
            .with_step(CountingStep::new(StageId::DenseReconstructAndMesh, &after));

        let mut state = RunState::new("run");
        let err = pipeline.run(&ctx, &mut state).unwrap_err();

        assert_eq!(before.load(Ordering::SeqCst), 2);
        assert_eq!(after.load(Ordering::SeqCst), 0);
        assert_eq!(err.stage(), Some(StageId::StructureFromMotion));
        assert_eq!(err.kind(), Some(ErrorKind::ConversionFailed));
        assert_eq!(state.stages.len(), 2);
        assert_eq!(state.stages[1].status, StageStatus::Failed);
    }
}
