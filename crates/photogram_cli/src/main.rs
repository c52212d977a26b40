//! photogram - turn a walk-around video into a textured GLB model.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context as _};
use clap::Parser;
use photogram_core::config::{ConfigManager, ConfigSection, Settings};
use photogram_core::logging::{init_tracing, LogLevel};
use photogram_core::orchestrator::{PipelineDriver, StagePlan};
use photogram_core::runner::SystemRunner;

/// Photogrammetry pipeline: frames, sparse model, quality gate, dense mesh, GLB.
#[derive(Debug, Parser)]
#[command(author, version, about = "Video to textured 3D asset pipeline")]
struct Args {
    /// Working directory for frames, the sparse model and undistorted data.
    #[arg(long)]
    workspace: Option<PathBuf>,

    /// Input video file.
    #[arg(long)]
    video_input: Option<PathBuf>,

    /// Directory for scene files, the mesh and the final GLB.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Directory holding the OpenMVS executables.
    #[arg(long = "openmvs")]
    openmvs_bin: Option<PathBuf>,

    /// TOML settings file; created with defaults if it does not exist.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Blender script that cleans the mesh and exports GLB.
    #[arg(long)]
    conversion_script: Option<PathBuf>,

    /// Frames sampled per second of video.
    #[arg(long)]
    fps: Option<u32>,

    /// Minimum 3D points the sparse model needs.
    #[arg(long)]
    min_points: Option<u64>,

    /// Minimum registered images the sparse model needs.
    #[arg(long)]
    min_images: Option<u64>,

    /// Delete frames and the sparse model after a successful run.
    #[arg(long)]
    cleanup: bool,

    /// Skip checking that every tool can be found before starting.
    #[arg(long)]
    no_preflight: bool,

    /// Print the planned commands and exit without touching the filesystem.
    #[arg(long)]
    dry_run: bool,

    /// Store the given paths in the config file for later runs.
    #[arg(long, requires = "config")]
    remember: bool,

    /// Only print errors.
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// More output (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() {
    match try_main() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn try_main() -> anyhow::Result<i32> {
    let args = Args::parse();
    let settings = load_settings(&args)?;

    let level = if args.quiet {
        LogLevel::Error
    } else {
        settings.logging.level.raised_by(args.verbose)
    };

    let driver = PipelineDriver::new(
        settings,
        Arc::new(SystemRunner::new().with_echo(args.verbose > 0)),
    );

    if args.dry_run {
        let _guard = init_tracing(level, None);
        let plan = driver.plan()?;
        print_plan(&plan);
        return Ok(0);
    }

    let paths = driver.resolve_paths()?;
    let _guard = init_tracing(level, Some(&paths.logs_dir));
    tracing::debug!("photogram {}", photogram_core::version());

    let driver = if args.quiet {
        driver
    } else {
        driver.with_console(|line| println!("{}", line))
    };

    let outcome = driver.run();
    if outcome.is_success() {
        if !args.quiet {
            println!("{}", outcome.message);
        }
    } else {
        eprintln!("{}", outcome.message);
        if let Some(log) = &outcome.log_file {
            eprintln!("Run log: {}", log.display());
        }
    }
    if let Some(summary) = &outcome.summary_path {
        tracing::info!("Summary: {}", summary.display());
    }
    Ok(outcome.exit_code)
}

/// Config file values first, then command-line overrides.
fn load_settings(args: &Args) -> anyhow::Result<Settings> {
    let Some(config_path) = &args.config else {
        let mut settings = Settings::default();
        apply_overrides(&mut settings, args);
        return Ok(settings);
    };

    let mut manager = ConfigManager::new(config_path);
    manager
        .load_or_create()
        .with_context(|| format!("loading {}", config_path.display()))?;
    apply_overrides(manager.settings_mut(), args);

    if args.remember {
        manager
            .update_section(ConfigSection::Paths)
            .with_context(|| format!("saving paths to {}", config_path.display()))?;
    }

    let settings = manager.into_settings();
    if let Err(msg) = settings.validate() {
        bail!("invalid settings: {}", msg);
    }
    Ok(settings)
}

fn apply_overrides(settings: &mut Settings, args: &Args) {
    let paths = &mut settings.paths;
    set_path(&mut paths.workspace, args.workspace.as_deref());
    set_path(&mut paths.video_input, args.video_input.as_deref());
    set_path(&mut paths.output_dir, args.output_dir.as_deref());
    set_path(&mut paths.openmvs_bin, args.openmvs_bin.as_deref());
    set_path(&mut paths.conversion_script, args.conversion_script.as_deref());

    if let Some(fps) = args.fps {
        settings.extraction.fps = fps;
    }
    if let Some(min_points) = args.min_points {
        settings.validation.min_points = min_points;
    }
    if let Some(min_images) = args.min_images {
        settings.validation.min_images = min_images;
    }
    if args.cleanup {
        settings.workspace.cleanup_intermediates = true;
    }
    if args.no_preflight {
        settings.tools.preflight = false;
    }
}

fn set_path(target: &mut String, value: Option<&Path>) {
    if let Some(value) = value {
        *target = value.display().to_string();
    }
}

fn print_plan(plan: &[StagePlan]) {
    for stage in plan {
        println!(
            "Stage {}: {} - {}",
            stage.stage.ordinal(),
            stage.stage,
            stage.description
        );
        if stage.commands.is_empty() {
            println!("  (no external commands)");
        }
        for command in &stage.commands {
            println!("  $ {}", command.display());
            if let Some(dir) = command.working_dir_path() {
                println!("    (in {})", dir.display());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("photogram").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn command_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn flags_override_defaults() {
        let args = parse(&[
            "--workspace",
            "/data/ws",
            "--video-input",
            "/data/chair.mp4",
            "--output-dir",
            "/data/out",
            "--openmvs",
            "/opt/openmvs/bin",
            "--min-points",
            "250",
            "--cleanup",
            "--no-preflight",
        ]);
        let settings = load_settings(&args).unwrap();

        assert_eq!(settings.paths.workspace, "/data/ws");
        assert_eq!(settings.paths.openmvs_bin, "/opt/openmvs/bin");
        assert_eq!(settings.validation.min_points, 250);
        assert_eq!(settings.validation.min_images, 2);
        assert!(settings.workspace.cleanup_intermediates);
        assert!(!settings.tools.preflight);
    }

    #[test]
    fn remember_requires_config() {
        let result = Args::try_parse_from(["photogram", "--remember"]);
        assert!(result.is_err());
    }

    #[test]
    fn verbose_counts() {
        let args = parse(&["-vv"]);
        assert_eq!(args.verbose, 2);
        assert!(Args::try_parse_from(["photogram", "-q", "-v"]).is_err());
    }
}
