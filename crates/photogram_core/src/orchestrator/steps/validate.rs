//! Validate step - quality gate between sparse and dense reconstruction.

use crate::config::Settings;
use crate::orchestrator::errors::StageResult;
use crate::orchestrator::step::PipelineStep;
use crate::orchestrator::types::{
    Artifact, Context, PipelinePaths, PlannedCommand, RunState, StageId,
};
use crate::validation::{ReconstructionValidator, Rejection};

/// Rejects a degenerate sparse model before hours of dense work start.
///
/// The report is stored in the run state whatever the verdict, so the run
/// summary shows the measured values next to the thresholds.
pub struct ValidateStep;

impl ValidateStep {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ValidateStep {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStep for ValidateStep {
    fn id(&self) -> StageId {
        StageId::Validate
    }

    fn description(&self) -> &str {
        "Check the sparse model before dense reconstruction"
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

    fn execute(&self, ctx: &Context, state: &mut RunState) -> StageResult<()> {
        let validator = ReconstructionValidator::new(ctx.settings.validation.thresholds());
        let (report, verdict) = match validator.validate(&ctx.paths.sparse_model_dir()) {
            Ok(report) => (Some(report), Ok(())),
            Err(Rejection { report, error }) => (report, Err(error)),
        };

        if let Some(report) = &report {
            ctx.logger.validation(&report.to_string());
        }
        state.validation = report;
        verdict?;
        Ok(())
    }
}
