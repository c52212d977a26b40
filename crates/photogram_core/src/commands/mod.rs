//! Command lines for the external tools.
//!
//! Every tool invocation the pipeline makes is built here from the resolved
//! [`PipelinePaths`] and [`Settings`], as discrete argument tokens. Nothing
//! here touches the filesystem or spawns a process.
//!
//! ```text
//! ExtractFrames            ffmpeg
//! StructureFromMotion      colmap automatic_reconstructor, colmap image_undistorter
//! DenseReconstructAndMesh  InterfaceColmap, DensifyPointCloud, ReconstructMesh,
//!                          RefineMesh, TextureMesh   (cwd = OpenMVS bin dir)
//! ConvertFormat            blender --background --python <script>
//! ```

use std::path::{Path, PathBuf};

use crate::config::Settings;
use crate::orchestrator::PipelinePaths;
use crate::runner::CommandSpec;

/// The OpenMVS programs, in the order the dense stage runs them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMvsTool {
    InterfaceColmap,
    DensifyPointCloud,
    ReconstructMesh,
    RefineMesh,
    TextureMesh,
}

impl OpenMvsTool {
    pub const CHAIN: [OpenMvsTool; 5] = [
        OpenMvsTool::InterfaceColmap,
        OpenMvsTool::DensifyPointCloud,
        OpenMvsTool::ReconstructMesh,
        OpenMvsTool::RefineMesh,
        OpenMvsTool::TextureMesh,
    ];

    /// Executable file name inside the OpenMVS bin directory.
    pub fn executable(&self) -> &'static str {
        match self {
            OpenMvsTool::InterfaceColmap => "InterfaceColmap",
            OpenMvsTool::DensifyPointCloud => "DensifyPointCloud",
            OpenMvsTool::ReconstructMesh => "ReconstructMesh",
            OpenMvsTool::RefineMesh => "RefineMesh",
            OpenMvsTool::TextureMesh => "TextureMesh",
        }
    }

    /// Scene file this tool leaves behind for the next one.
    pub fn output(&self, paths: &PipelinePaths) -> PathBuf {
        match self {
            OpenMvsTool::InterfaceColmap => paths.scene_mvs(),
            OpenMvsTool::DensifyPointCloud => paths.dense_mvs(),
            OpenMvsTool::ReconstructMesh => paths.mesh_mvs(),
            OpenMvsTool::RefineMesh => paths.refined_mesh_mvs(),
            OpenMvsTool::TextureMesh => paths.textured_mesh(),
        }
    }
}

/// Builds tool command lines for one run.
pub struct ToolCommands<'a> {
    paths: &'a PipelinePaths,
    settings: &'a Settings,
}

impl<'a> ToolCommands<'a> {
    pub fn new(paths: &'a PipelinePaths, settings: &'a Settings) -> Self {
        Self { paths, settings }
    }

    /// `ffmpeg -i <video> -vf fps=<n> <images>/<pattern>`
    pub fn extract_frames(&self) -> CommandSpec {
        let extraction = &self.settings.extraction;
        CommandSpec::new(&self.settings.tools.ffmpeg)
            .arg("-i")
            .path_arg(&self.paths.video_input)
            .arg("-vf")
            .arg(format!("fps={}", extraction.fps))
            .path_arg(&self.paths.images_dir().join(&extraction.frame_pattern))
            .timeout(self.settings.timeouts.extract_frames())
    }

    /// Feature extraction, matching and mapping in one colmap call.
    pub fn sparse_reconstruction(&self) -> CommandSpec {
        CommandSpec::new(&self.settings.tools.colmap)
            .arg("automatic_reconstructor")
            .arg("--workspace_path")
            .path_arg(&self.paths.workspace)
            .arg("--image_path")
            .path_arg(&self.paths.images_dir())
            .arg("--single_camera")
            .arg(self.settings.sfm.single_camera.to_string())
            .timeout(self.settings.timeouts.structure_from_motion())
    }

    /// Undistort the frames against the first sparse model.
    pub fn undistort_images(&self) -> CommandSpec {
        CommandSpec::new(&self.settings.tools.colmap)
            .arg("image_undistorter")
            .arg("--image_path")
            .path_arg(&self.paths.images_dir())
            .arg("--input_path")
            .path_arg(&self.paths.sparse_model_dir())
            .arg("--output_path")
            .path_arg(&self.paths.undistorted_dir())
            .timeout(self.settings.timeouts.structure_from_motion())
    }

    /// One step of the OpenMVS chain.
    ///
    /// The program is addressed by its full path in the bin directory and
    /// runs with that directory as its working directory.
    pub fn openmvs(&self, tool: OpenMvsTool) -> CommandSpec {
        let paths = self.paths;
        let out = &paths.output_dir;
        let spec = self.openmvs_program(tool);

        let spec = match tool {
            OpenMvsTool::InterfaceColmap => spec
                .arg("-i")
                .path_arg(&paths.undistorted_dir())
                .arg("-o")
                .path_arg(&paths.scene_mvs())
                .arg("-w")
                .path_arg(&paths.undistorted_dir()),
            OpenMvsTool::DensifyPointCloud => spec.path_arg(&paths.scene_mvs()).arg("-w").path_arg(out),
            OpenMvsTool::ReconstructMesh => spec.path_arg(&paths.dense_mvs()).arg("-w").path_arg(out),
            OpenMvsTool::RefineMesh => spec.path_arg(&paths.mesh_mvs()).arg("-w").path_arg(out),
            OpenMvsTool::TextureMesh => spec
                .path_arg(&paths.refined_mesh_mvs())
                .arg("--working-folder")
                .path_arg(out)
                .arg("--output-file")
                .path_arg(&paths.textured_mesh())
                .arg("--export-type")
                .arg("obj"),
        };

        spec.timeout(self.settings.timeouts.dense_reconstruction())
    }

    /// `blender --background --python <script> -- <obj> <glb>`
    pub fn convert_to_glb(&self) -> CommandSpec {
        CommandSpec::new(&self.settings.tools.blender)
            .arg("--background")
            .arg("--python")
            .path_arg(&self.paths.conversion_script)
            .arg("--")
            .path_arg(&self.paths.textured_mesh())
            .path_arg(&self.paths.final_asset())
            .timeout(self.settings.timeouts.convert_format())
    }

    fn openmvs_program(&self, tool: OpenMvsTool) -> CommandSpec {
        let bin: &Path = &self.paths.openmvs_bin;
        CommandSpec::new(bin.join(tool.executable())).working_dir(bin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn paths() -> PipelinePaths {
        PipelinePaths {
            workspace: PathBuf::from("/data/ws"),
            video_input: PathBuf::from("/data/in/chair scan.mp4"),
            output_dir: PathBuf::from("/data/out"),
            openmvs_bin: PathBuf::from("/opt/openmvs/bin"),
            conversion_script: PathBuf::from("/opt/scripts/obj_to_glb_cleanup.py"),
            logs_dir: PathBuf::from("/data/ws/logs"),
        }
    }

    #[test]
    fn ffmpeg_samples_at_configured_rate() {
        let paths = paths();
        let mut settings = Settings::default();
        settings.extraction.fps = 2;

        let spec = ToolCommands::new(&paths, &settings).extract_frames();
        assert_eq!(spec.program_name(), "ffmpeg");
        assert_eq!(
            spec.arg_tokens(),
            [
                "-i",
                "/data/in/chair scan.mp4",
                "-vf",
                "fps=2",
                "/data/ws/images/frame_%04d.jpg"
            ]
        );
        // The path with a space stays one token
        assert!(spec.display().contains("\"/data/in/chair scan.mp4\""));
        assert_eq!(spec.timeout_limit(), None);
    }

    #[test]
    fn colmap_commands_use_workspace_layout() {
        let paths = paths();
        let settings = Settings::default();
        let commands = ToolCommands::new(&paths, &settings);

        let sfm = commands.sparse_reconstruction();
        assert_eq!(
            sfm.arg_tokens(),
            [
                "automatic_reconstructor",
                "--workspace_path",
                "/data/ws",
                "--image_path",
                "/data/ws/images",
                "--single_camera",
                "true"
            ]
        );

        let undistort = commands.undistort_images();
        assert_eq!(undistort.arg_tokens()[0], "image_undistorter");
        assert!(undistort
            .arg_tokens()
            .windows(2)
            .any(|w| w == ["--input_path", "/data/ws/sparse/0"]));
        assert!(undistort
            .arg_tokens()
            .windows(2)
            .any(|w| w == ["--output_path", "/data/ws/undistorted_output"]));
    }

    #[test]
    fn openmvs_runs_from_bin_dir() {
        let paths = paths();
        let settings = Settings::default();
        let commands = ToolCommands::new(&paths, &settings);

        for tool in OpenMvsTool::CHAIN {
            let spec = commands.openmvs(tool);
            assert_eq!(spec.program(), Path::new("/opt/openmvs/bin").join(tool.executable()));
            assert_eq!(spec.working_dir_path(), Some(Path::new("/opt/openmvs/bin")));
        }

        let densify = commands.openmvs(OpenMvsTool::DensifyPointCloud);
        assert_eq!(densify.arg_tokens(), ["/data/out/scene.mvs", "-w", "/data/out"]);

        let texture = commands.openmvs(OpenMvsTool::TextureMesh);
        assert_eq!(
            texture.arg_tokens(),
            [
                "/data/out/scene_dense_mesh_refine.mvs",
                "--working-folder",
                "/data/out",
                "--output-file",
                "/data/out/scene_textured_mesh.obj",
                "--export-type",
                "obj"
            ]
        );
    }

    #[test]
    fn chain_outputs_feed_next_input() {
        let paths = paths();
        let settings = Settings::default();
        let commands = ToolCommands::new(&paths, &settings);

        for pair in OpenMvsTool::CHAIN.windows(2) {
            let produced = pair[0].output(&paths);
            let next = commands.openmvs(pair[1]);
            assert!(
                next.arg_tokens()
                    .iter()
                    .any(|t| Path::new(t) == produced),
                "{:?} does not consume {}",
                pair[1],
                produced.display()
            );
        }
    }

    #[test]
    fn blender_converts_textured_mesh() {
        let paths = paths();
        let mut settings = Settings::default();
        settings.timeouts.convert_format_secs = Some(600);

        let spec = ToolCommands::new(&paths, &settings).convert_to_glb();
        assert_eq!(
            spec.arg_tokens(),
            [
                "--background",
                "--python",
                "/opt/scripts/obj_to_glb_cleanup.py",
                "--",
                "/data/out/scene_textured_mesh.obj",
                "/data/out/scene_textured_mesh.glb"
            ]
        );
        assert_eq!(spec.timeout_limit(), Some(Duration::from_secs(600)));
    }
}
