//! Pipeline driver for running one reconstruction end to end.
//!
//! The `PipelineDriver` turns settings into resolved paths, prepares the
//! working tree and run log, runs the standard pipeline and converts the
//! result into an exit code and a diagnostic message.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Settings;
use crate::logging::{LogConfig, RunLogger};
use crate::runner::{locate_executable, CommandRunner, CommandSpec, RunnerError};
use crate::workspace::WorkspaceManager;

use super::errors::{ErrorKind, PipelineError, PipelineResult, StageError};
use super::pipeline::Pipeline;
use super::types::{Context, FailureRecord, PipelinePaths, RunState, StageId};
use super::create_standard_pipeline;

type SharedConsole = Arc<dyn Fn(&str) + Send + Sync>;

/// What one stage would do, as reported by a dry run.
#[derive(Debug, Clone)]
pub struct StagePlan {
    pub stage: StageId,
    pub description: String,
    pub commands: Vec<CommandSpec>,
}

/// Final result of a driver run, ready to hand back to the shell.
#[derive(Debug, Clone)]
pub struct DriverOutcome {
    /// 0 on success, 1 on any failure.
    pub exit_code: i32,
    /// One-line diagnostic naming the failing stage and its cause.
    pub message: String,
    /// Where the run summary was written, if it was.
    pub summary_path: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
    pub failed_stage: Option<StageId>,
    pub error_kind: Option<ErrorKind>,
    pub final_asset: Option<PathBuf>,
}

impl DriverOutcome {
    fn success(state: &RunState, summary_path: Option<PathBuf>) -> Self {
        let final_asset = state.final_asset.as_ref().map(|a| a.path.clone());
        let message = match &state.final_asset {
            Some(asset) => format!(
                "Pipeline completed: {} ({} bytes)",
                asset.path.display(),
                asset.bytes
            ),
            None => "Pipeline completed".to_string(),
        };
        Self {
            exit_code: 0,
            message,
            summary_path,
            log_file: state.log_file.clone(),
            failed_stage: None,
            error_kind: None,
            final_asset,
        }
    }

    fn failure(error: &PipelineError, state: &RunState, summary_path: Option<PathBuf>) -> Self {
        Self {
            exit_code: 1,
            message: error.to_string(),
            summary_path,
            log_file: state.log_file.clone(),
            failed_stage: error.stage(),
            error_kind: error.kind(),
            final_asset: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs the photogrammetry pipeline for one input video.
///
/// # Example
///
/// ```ignore
/// let runner = Arc::new(SystemRunner::new());
/// let driver = PipelineDriver::new(settings, runner)
///     .with_console(|line| println!("{}", line));
/// let outcome = driver.run();
/// std::process::exit(outcome.exit_code);
/// ```
pub struct PipelineDriver {
    settings: Settings,
    runner: Arc<dyn CommandRunner>,
    pipeline: Pipeline,
    console: Option<SharedConsole>,
}

impl PipelineDriver {
    /// Create a driver running the standard five-stage pipeline.
    pub fn new(settings: Settings, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            settings,
            runner,
            pipeline: create_standard_pipeline(),
            console: None,
        }
    }

    /// Replace the stage sequence.
    pub fn with_pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    /// Mirror every run log line to the given callback.
    pub fn with_console(mut self, console: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.console = Some(Arc::new(console));
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Resolve the configured locations into absolute paths.
    ///
    /// Nothing is created or checked on disk here.
    pub fn resolve_paths(&self) -> PipelineResult<PipelinePaths> {
        self.settings
            .validate()
            .map_err(|msg| PipelineError::setup_failed("photogram", msg))?;

        let paths = &self.settings.paths;
        let workspace = required_path(&paths.workspace, "--workspace", "paths.workspace")?;
        let video_input = required_path(&paths.video_input, "--video-input", "paths.video_input")?;
        let output_dir = required_path(&paths.output_dir, "--output-dir", "paths.output_dir")?;
        let openmvs_bin = required_path(&paths.openmvs_bin, "--openmvs", "paths.openmvs_bin")?;
        let conversion_script = required_path(
            &paths.conversion_script,
            "--conversion-script",
            "paths.conversion_script",
        )?;
        let logs_dir = if paths.logs_folder.trim().is_empty() {
            workspace.join("logs")
        } else {
            absolute(&paths.logs_folder, "paths.logs_folder")?
        };

        Ok(PipelinePaths {
            workspace,
            video_input,
            output_dir,
            openmvs_bin,
            conversion_script,
            logs_dir,
        })
    }

    /// Describe every stage and the commands it would issue.
    pub fn plan(&self) -> PipelineResult<Vec<StagePlan>> {
        let paths = self.resolve_paths()?;
        Ok(self
            .pipeline
            .steps()
            .map(|step| StagePlan {
                stage: step.id(),
                description: step.description().to_string(),
                commands: step
                    .planned_commands(&paths, &self.settings)
                    .into_iter()
                    .map(|planned| planned.spec)
                    .collect(),
            })
            .collect())
    }

    /// Check that every program the run will start can be found.
    ///
    /// Each program is looked up once; the first missing one fails the
    /// stage that needs it, before any stage has started.
    pub fn preflight(&self, paths: &PipelinePaths, run_name: &str) -> PipelineResult<()> {
        let mut checked = HashSet::new();
        for step in self.pipeline.steps() {
            for planned in step.planned_commands(paths, &self.settings) {
                let program = planned.spec.program();
                if !checked.insert(program.to_path_buf()) {
                    continue;
                }
                match locate_executable(program) {
                    Some(found) => tracing::debug!("Found {} at {}", program.display(), found.display()),
                    None => {
                        let error = RunnerError::executable_not_found(program.display().to_string());
                        return Err(PipelineError::stage_failed(
                            run_name,
                            step.id(),
                            StageError::from(error),
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    /// Run the whole pipeline once.
    ///
    /// A run summary is written to the output directory whatever the
    /// outcome, unless disabled in the logging settings.
    pub fn run(&self) -> DriverOutcome {
        let paths = match self.resolve_paths() {
            Ok(paths) => paths,
            Err(e) => {
                tracing::error!("{}", e);
                return DriverOutcome::failure(&e, &RunState::default(), None);
            }
        };

        let run_name = run_name_for(&paths.video_input);
        let mut state = RunState::new(&run_name);
        state.paths = Some(paths.clone());

        let result = self
            .prepare(paths.clone(), &run_name)
            .and_then(|ctx| {
                state.log_file = Some(ctx.logger.log_path().to_path_buf());
                let result = self.execute(&ctx, &mut state);
                match &result {
                    Ok(()) => ctx.logger.success(&format!("Run '{}' finished", run_name)),
                    Err(e) => ctx.logger.error(&e.to_string()),
                }
                ctx.logger.flush();
                result
            });

        state.finished_at = Some(chrono::Local::now().to_rfc3339());
        if let Err(e) = &result {
            state.failure = Some(FailureRecord {
                stage: e.stage(),
                kind: e.kind(),
                message: e.to_string(),
            });
        }

        let summary_path = if self.settings.logging.write_summary {
            write_summary(&paths, &state)
        } else {
            None
        };

        match result {
            Ok(()) => {
                tracing::info!("Run '{}' completed", run_name);
                DriverOutcome::success(&state, summary_path)
            }
            Err(e) => {
                tracing::error!("{}", e);
                DriverOutcome::failure(&e, &state, summary_path)
            }
        }
    }

    /// Create the working tree and the run log, then build the context.
    fn prepare(&self, paths: PipelinePaths, run_name: &str) -> PipelineResult<Context> {
        WorkspaceManager::new(paths.workspace.clone())
            .ensure_directories(paths.directories())
            .map_err(|e| PipelineError::setup_failed(run_name, e.to_string()))?;

        let console = self.console.clone().map(|console| {
            Box::new(move |line: &str| console(line)) as Box<dyn Fn(&str) + Send + Sync>
        });
        let logger = RunLogger::new(
            run_name,
            &paths.logs_dir,
            LogConfig::from(&self.settings.logging),
            console,
        )
        .map_err(|e| {
            PipelineError::setup_failed(run_name, format!("Failed to create run log: {}", e))
        })?;

        Ok(Context::new(
            paths,
            self.settings.clone(),
            Arc::clone(&self.runner),
            Arc::new(logger),
            run_name,
        ))
    }

    fn execute(&self, ctx: &Context, state: &mut RunState) -> PipelineResult<()> {
        let paths = &ctx.paths;
        ctx.logger.info(&format!("Starting run: {}", ctx.run_name));
        ctx.logger
            .info(&format!("Video: {}", paths.video_input.display()));
        ctx.logger
            .info(&format!("Workspace: {}", paths.workspace.display()));
        ctx.logger
            .info(&format!("Output: {}", paths.output_dir.display()));

        if self.settings.tools.preflight {
            ctx.logger.section("Checking external tools");
            self.preflight(paths, &ctx.run_name)?;
        }

        let run_result = self.pipeline.run(ctx, state)?;
        ctx.logger.info(&format!(
            "{} stages completed, {} commands run",
            run_result.stages_completed.len(),
            state.command_count()
        ));

        if self.settings.workspace.cleanup_intermediates {
            match ctx.workspace.remove_intermediates(&paths.intermediates()) {
                Ok(freed) => {
                    ctx.logger
                        .info(&format!("Removed intermediates ({} bytes freed)", freed));
                    state.cleaned_bytes = Some(freed);
                }
                Err(e) => ctx
                    .logger
                    .warn(&format!("Failed to remove intermediates: {}", e)),
            }
        }
        Ok(())
    }
}

fn required_path(value: &str, flag: &str, key: &str) -> PipelineResult<PathBuf> {
    if value.trim().is_empty() {
        return Err(PipelineError::setup_failed(
            "photogram",
            format!("{} is required (or set {} in the config file)", flag, key),
        ));
    }
    absolute(value, key)
}

fn absolute(value: &str, key: &str) -> PipelineResult<PathBuf> {
    std::path::absolute(value.trim()).map_err(|e| {
        PipelineError::setup_failed("photogram", format!("Cannot resolve {} '{}': {}", key, value, e))
    })
}

/// `<video stem>_<timestamp>`, unique per second.
fn run_name_for(video: &Path) -> String {
    let stem = video
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "run".to_string());
    format!("{}_{}", stem, chrono::Local::now().format("%Y%m%d_%H%M%S"))
}

fn write_summary(paths: &PipelinePaths, state: &RunState) -> Option<PathBuf> {
    let path = paths.summary_file();
    let result = fs::create_dir_all(&paths.output_dir)
        .map_err(|e| e.to_string())
        .and_then(|()| serde_json::to_string_pretty(state).map_err(|e| e.to_string()))
        .and_then(|json| fs::write(&path, json).map_err(|e| e.to_string()));

    match result {
        Ok(()) => {
            tracing::debug!("Wrote run summary to {}", path.display());
            Some(path)
        }
        Err(e) => {
            tracing::warn!("Failed to write run summary {}: {}", path.display(), e);
            None
        }
    }
}
