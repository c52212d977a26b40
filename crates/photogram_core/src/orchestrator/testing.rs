//! Test doubles shared by the orchestrator unit tests.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::types::{Context, PipelinePaths};
use crate::commands::OpenMvsTool;
use crate::config::Settings;
use crate::logging::{LogConfig, RunLogger};
use crate::runner::{CommandRunner, CommandSpec, ProcessResult, RunnerResult};

type Handler = Box<dyn Fn(&CommandSpec) -> RunnerResult<ProcessResult> + Send + Sync>;

/// Records every command instead of spawning it.
pub(crate) struct RecordingRunner {
    calls: Mutex<Vec<CommandSpec>>,
    handler: Handler,
}

impl RecordingRunner {
    pub(crate) fn new(
        handler: impl Fn(&CommandSpec) -> RunnerResult<ProcessResult> + Send + Sync + 'static,
    ) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            handler: Box::new(handler),
        }
    }

    /// Succeeds without writing anything.
    pub(crate) fn silent() -> Self {
        Self::new(|_| Ok(ok_result()))
    }

    /// Writes each tool's expected outputs, as a real tool would.
    ///
    /// Paths are read back from the command tokens, so this works with any
    /// workspace layout built by `ToolCommands`.
    pub(crate) fn fabricating() -> Self {
        Self::new(|spec| {
            fabricate_outputs(spec, 150, 12);
            Ok(ok_result())
        })
    }

    pub(crate) fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().clone()
    }

    /// Program name of every call, with the colmap subcommand appended.
    pub(crate) fn programs(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .map(|spec| match spec.program_name().as_str() {
                "colmap" => format!("colmap {}", spec.arg_tokens()[0]),
                name => name.to_string(),
            })
            .collect()
    }
}

impl CommandRunner for RecordingRunner {
    fn execute(&self, spec: &CommandSpec) -> RunnerResult<ProcessResult> {
        self.calls.lock().push(spec.clone());
        (self.handler)(spec)
    }
}

pub(crate) fn ok_result() -> ProcessResult {
    ProcessResult {
        exit_code: 0,
        stdout: "done\n".to_string(),
        stderr: String::new(),
        duration: Duration::from_millis(5),
    }
}

/// Token following `flag` in the command's arguments.
fn value_after<'a>(spec: &'a CommandSpec, flag: &str) -> Option<&'a str> {
    let tokens = spec.arg_tokens();
    tokens
        .iter()
        .position(|t| t == flag)
        .and_then(|i| tokens.get(i + 1))
        .map(String::as_str)
}

/// Write what the real tool would have written for `spec`.
pub(crate) fn fabricate_outputs(spec: &CommandSpec, points: usize, images: usize) {
    let tokens = spec.arg_tokens();
    match spec.program_name().as_str() {
        "ffmpeg" => {
            if let Some(pattern) = tokens.last() {
                let dir = Path::new(pattern).parent().unwrap();
                fs::create_dir_all(dir).unwrap();
                for i in 1..=3 {
                    fs::write(dir.join(format!("frame_{:04}.jpg", i)), b"jpeg").unwrap();
                }
            }
        }
        "colmap" if tokens[0] == "automatic_reconstructor" => {
            let workspace = Path::new(value_after(spec, "--workspace_path").unwrap());
            let model = workspace.join("sparse").join("0");
            write_text_model(&model, points, images);
            fs::write(workspace.join("database.db"), b"db").unwrap();
        }
        "colmap" if tokens[0] == "image_undistorter" => {
            let out = Path::new(value_after(spec, "--output_path").unwrap());
            fs::create_dir_all(out.join("images")).unwrap();
            fs::write(out.join("images").join("frame_0001.jpg"), b"jpeg").unwrap();
        }
        "blender" => {
            let glb = Path::new(tokens.last().unwrap());
            fs::write(glb, b"glTF").unwrap();
        }
        name => {
            let Some(tool) = OpenMvsTool::CHAIN.iter().find(|t| t.executable() == name) else {
                return;
            };
            let target = match tool {
                OpenMvsTool::InterfaceColmap => value_after(spec, "-o"),
                OpenMvsTool::TextureMesh => value_after(spec, "--output-file"),
                _ => None,
            };
            let target = match target {
                Some(path) => Path::new(path).to_path_buf(),
                None => {
                    // DensifyPointCloud etc. derive their output from the input name
                    let input = Path::new(&tokens[0]);
                    let stem = input.file_stem().unwrap().to_string_lossy();
                    let suffix = match tool {
                        OpenMvsTool::DensifyPointCloud => "_dense",
                        OpenMvsTool::ReconstructMesh => "_mesh",
                        _ => "_refine",
                    };
                    input.with_file_name(format!("{stem}{suffix}.mvs"))
                }
            };
            fs::write(target, b"mvs").unwrap();
        }
    }
}

pub(crate) fn write_text_model(dir: &Path, points: usize, images: usize) {
    fs::create_dir_all(dir).unwrap();
    let mut pts = String::from("# 3D point list\n");
    for i in 0..points {
        writeln!(pts, "{} 0.1 0.2 0.3 128 128 128 0.5", i + 1).unwrap();
    }
    fs::write(dir.join("points3D.txt"), pts).unwrap();

    let mut imgs = String::from("# Image list\n");
    for i in 0..images {
        writeln!(imgs, "{} 1 0 0 0 0 0 0 1 frame_{:04}.jpg", i + 1, i + 1).unwrap();
    }
    fs::write(dir.join("images.txt"), imgs).unwrap();
    fs::write(dir.join("cameras.txt"), "1 SIMPLE_RADIAL 1920 1080 1500 960 540 0\n").unwrap();
}

pub(crate) fn test_paths(root: &Path) -> PipelinePaths {
    let video = root.join("input").join("chair.mp4");
    fs::create_dir_all(video.parent().unwrap()).unwrap();
    fs::write(&video, b"video").unwrap();

    let bin = root.join("openmvs");
    fs::create_dir_all(&bin).unwrap();

    let script = root.join("obj_to_glb_cleanup.py");
    fs::write(&script, b"import bpy\n").unwrap();

    let paths = PipelinePaths {
        workspace: root.join("ws"),
        video_input: video,
        output_dir: root.join("out"),
        openmvs_bin: bin,
        conversion_script: script,
        logs_dir: root.join("ws").join("logs"),
    };
    for dir in paths.directories() {
        fs::create_dir_all(dir).unwrap();
    }
    paths
}

pub(crate) fn test_context(root: &Path, runner: Arc<dyn CommandRunner>) -> Context {
    test_context_with(root, runner, Settings::default())
}

pub(crate) fn test_context_with(
    root: &Path,
    runner: Arc<dyn CommandRunner>,
    settings: Settings,
) -> Context {
    let paths = test_paths(root);
    let config = LogConfig {
        show_timestamps: false,
        ..LogConfig::default()
    };
    let logger = Arc::new(RunLogger::new("test_run", &paths.logs_dir, config, None).unwrap());
    Context::new(paths, settings, runner, logger, "test_run")
}
