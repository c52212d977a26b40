//! Pipeline stage implementations.
//!
//! Each stage wraps one external tool (or a fixed chain of them) and
//! declares the paths it reads and writes.

mod convert;
mod dense;
mod extract_frames;
mod sfm;
mod validate;

pub use convert::ConvertFormatStep;
pub use dense::DenseReconstructStep;
pub use extract_frames::ExtractFramesStep;
pub use sfm::StructureFromMotionStep;
pub use validate::ValidateStep;

use std::time::Instant;

use crate::orchestrator::errors::{StageError, StageResult};
use crate::orchestrator::types::{CommandRecord, Context, PlannedCommand, RunState};
use crate::runner::ProcessResult;

/// Run one planned command and check the artifact it should have produced.
///
/// The command and its outcome are recorded in `state` either way. Tool
/// output goes through the run logger; on failure its tail is replayed.
pub(crate) fn run_planned(
    ctx: &Context,
    state: &mut RunState,
    planned: &PlannedCommand,
) -> StageResult<ProcessResult> {
    let spec = &planned.spec;
    let program = spec.program_name();

    ctx.logger.command(&spec.display());
    if let Some(dir) = spec.working_dir_path() {
        ctx.logger
            .debug(&format!("(working directory: {})", dir.display()));
    }

    let started = Instant::now();
    let result = match ctx.runner.execute(spec) {
        Ok(result) => result,
        Err(e) => {
            if let Some((stdout, stderr)) = e.captured_output() {
                for line in stdout.lines() {
                    ctx.logger.output_line(line, false);
                }
                for line in stderr.lines() {
                    ctx.logger.output_line(line, true);
                }
            }
            state.record_command(CommandRecord::failed(spec, &e, started.elapsed()));
            ctx.logger.show_tail(&program);
            ctx.logger.clear_tail();
            return Err(e.into());
        }
    };

    for (line, is_stderr) in result.output_lines() {
        ctx.logger.output_line(line, is_stderr);
    }
    state.record_command(CommandRecord::finished(spec, &result));

    if let Some(artifact) = &planned.produces {
        if !artifact.is_present() {
            ctx.logger.show_tail(&program);
            ctx.logger.clear_tail();
            return Err(StageError::output_missing(program, artifact));
        }
    }

    ctx.logger.clear_tail();
    ctx.logger.debug(&format!(
        "{} finished in {:.1}s",
        program,
        result.duration.as_secs_f64()
    ));
    Ok(result)
}

/// Run every planned command of a stage in order, stopping at the first failure.
pub(crate) fn run_all(
    ctx: &Context,
    state: &mut RunState,
    planned: &[PlannedCommand],
) -> StageResult<()> {
    for command in planned {
        run_planned(ctx, state, command)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::errors::ErrorKind;
    use crate::orchestrator::testing::{ok_result, test_context, RecordingRunner};
    use crate::orchestrator::types::{Artifact, StageId};
    use crate::runner::{CommandSpec, RunnerError};
    use std::fs;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn records_successful_command() {
        let dir = tempdir().unwrap();
        let ctx = test_context(dir.path(), Arc::new(RecordingRunner::silent()));
        let marker = dir.path().join("marker");
        fs::write(&marker, b"x").unwrap();

        let mut state = RunState::new("run");
        state.begin_stage(StageId::ExtractFrames);
        let planned = PlannedCommand::new(CommandSpec::new("true"), Artifact::File(marker));

        let result = run_planned(&ctx, &mut state, &planned).unwrap();
        assert_eq!(result.exit_code, 0);
        assert_eq!(state.stages[0].commands.len(), 1);
        assert_eq!(state.stages[0].commands[0].exit_code, Some(0));
    }

    #[test]
    fn zero_exit_without_output_fails() {
        let dir = tempdir().unwrap();
        let ctx = test_context(dir.path(), Arc::new(RecordingRunner::silent()));
        let mut state = RunState::new("run");
        state.begin_stage(StageId::DenseReconstructAndMesh);

        let planned = PlannedCommand::new(
            CommandSpec::new("/opt/openmvs/bin/DensifyPointCloud"),
            Artifact::File(dir.path().join("out").join("scene_dense.mvs")),
        );
        let err = run_planned(&ctx, &mut state, &planned).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::OutputMissing);
        assert!(err.to_string().contains("DensifyPointCloud"));
        assert!(err.to_string().contains("scene_dense.mvs"));
    }

    #[test]
    fn failure_is_recorded_and_tail_replayed() {
        let dir = tempdir().unwrap();
        let runner = RecordingRunner::new(|spec| {
            Err(RunnerError::non_zero_exit(
                spec.program_name(),
                3,
                "progress 10%\n",
                "fatal: cannot open video\n",
            ))
        });
        let ctx = test_context(dir.path(), Arc::new(runner));
        let mut state = RunState::new("run");
        state.begin_stage(StageId::ExtractFrames);

        let planned = PlannedCommand::unchecked(CommandSpec::new("ffmpeg").arg("-i"));
        let err = run_planned(&ctx, &mut state, &planned).unwrap_err();
        ctx.logger.flush();

        assert_eq!(err.kind(), ErrorKind::NonZeroExit);
        let record = &state.stages[0].commands[0];
        assert_eq!(record.exit_code, Some(3));
        assert!(record.error.as_deref().unwrap().contains("cannot open video"));

        let log = fs::read_to_string(ctx.logger.log_path()).unwrap();
        assert!(log.contains("[ffmpeg/tail]"));
        assert!(log.contains("fatal: cannot open video"));
    }

    #[test]
    fn run_all_stops_after_failure() {
        let dir = tempdir().unwrap();
        let runner = Arc::new(RecordingRunner::new(|spec| {
            if spec.program_name() == "second" {
                Err(RunnerError::executable_not_found("second"))
            } else {
                Ok(ok_result())
            }
        }));
        let ctx = test_context(dir.path(), runner.clone());
        let mut state = RunState::new("run");
        state.begin_stage(StageId::StructureFromMotion);

        let planned = vec![
            PlannedCommand::unchecked(CommandSpec::new("first")),
            PlannedCommand::unchecked(CommandSpec::new("second")),
            PlannedCommand::unchecked(CommandSpec::new("third")),
        ];
        let err = run_all(&ctx, &mut state, &planned).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ExecutableNotFound);
        assert_eq!(runner.programs(), vec!["first", "second"]);
    }
}
