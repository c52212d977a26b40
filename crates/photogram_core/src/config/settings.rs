//! Settings struct with TOML-based sections.
//!
//! Settings are organized into logical sections that map to TOML tables.
//! Each section can be updated independently for atomic section-level updates.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::logging::LogLevel;
use crate::validation::Thresholds;

/// Root settings structure containing all configuration sections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Input, output and working locations.
    #[serde(default)]
    pub paths: PathSettings,

    /// External tool locations.
    #[serde(default)]
    pub tools: ToolSettings,

    /// Frame extraction.
    #[serde(default)]
    pub extraction: ExtractionSettings,

    /// Structure-from-motion.
    #[serde(default)]
    pub sfm: SfmSettings,

    /// Sparse model quality gate.
    #[serde(default)]
    pub validation: ValidationSettings,

    /// Per-command deadlines.
    #[serde(default)]
    pub timeouts: TimeoutSettings,

    /// Working directory housekeeping.
    #[serde(default)]
    pub workspace: WorkspaceSettings,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingSettings,
}

impl Settings {
    /// Check values that deserialize fine but make no sense.
    pub fn validate(&self) -> Result<(), String> {
        if self.extraction.fps == 0 {
            return Err("extraction.fps must be at least 1".to_string());
        }
        if !self.extraction.frame_pattern.contains('%') {
            return Err(format!(
                "extraction.frame_pattern '{}' has no frame number placeholder",
                self.extraction.frame_pattern
            ));
        }
        if self.validation.min_images == 0 {
            return Err("validation.min_images must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Path configuration.
///
/// Empty strings mean "not configured"; the command line fills them in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathSettings {
    /// Root directory for frames, the sparse model and undistorted data.
    #[serde(default)]
    pub workspace: String,

    /// Input video file.
    #[serde(default)]
    pub video_input: String,

    /// Directory for scene files, the mesh, and the final asset.
    #[serde(default)]
    pub output_dir: String,

    /// Directory holding the OpenMVS executables.
    #[serde(default)]
    pub openmvs_bin: String,

    /// Blender script that cleans the mesh and exports GLB.
    #[serde(default = "default_conversion_script")]
    pub conversion_script: String,

    /// Folder for run logs (defaults to `<workspace>/logs`).
    #[serde(default)]
    pub logs_folder: String,
}

fn default_conversion_script() -> String {
    "obj_to_glb_cleanup.py".to_string()
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            workspace: String::new(),
            video_input: String::new(),
            output_dir: String::new(),
            openmvs_bin: String::new(),
            conversion_script: default_conversion_script(),
            logs_folder: String::new(),
        }
    }
}

/// External tool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSettings {
    /// ffmpeg executable (name on PATH or full path).
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: String,

    /// colmap executable.
    #[serde(default = "default_colmap")]
    pub colmap: String,

    /// blender executable.
    #[serde(default = "default_blender")]
    pub blender: String,

    /// Check every tool can be found before the first stage starts.
    #[serde(default = "default_true")]
    pub preflight: bool,
}

fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}

fn default_colmap() -> String {
    "colmap".to_string()
}

fn default_blender() -> String {
    "blender".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            ffmpeg: default_ffmpeg(),
            colmap: default_colmap(),
            blender: default_blender(),
            preflight: true,
        }
    }
}

/// Frame extraction configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionSettings {
    /// Frames sampled per second of video.
    #[serde(default = "default_fps")]
    pub fps: u32,

    /// ffmpeg output filename pattern inside the images directory.
    #[serde(default = "default_frame_pattern")]
    pub frame_pattern: String,
}

fn default_fps() -> u32 {
    1
}

fn default_frame_pattern() -> String {
    "frame_%04d.jpg".to_string()
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            fps: default_fps(),
            frame_pattern: default_frame_pattern(),
        }
    }
}

/// Structure-from-motion configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SfmSettings {
    /// All frames come from one camera with shared intrinsics.
    #[serde(default = "default_true")]
    pub single_camera: bool,
}

impl Default for SfmSettings {
    fn default() -> Self {
        Self {
            single_camera: true,
        }
    }
}

/// Sparse model thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationSettings {
    /// Minimum 3D points in a text model.
    #[serde(default = "default_min_points")]
    pub min_points: u64,

    /// Minimum registered images in a text model.
    #[serde(default = "default_min_images")]
    pub min_images: u64,
}

fn default_min_points() -> u64 {
    100
}

fn default_min_images() -> u64 {
    2
}

impl ValidationSettings {
    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            min_points: self.min_points,
            min_images: self.min_images,
        }
    }
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            min_points: default_min_points(),
            min_images: default_min_images(),
        }
    }
}

/// Deadlines in seconds, applied to each command a stage runs.
///
/// Absent means no limit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimeoutSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extract_frames_secs: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structure_from_motion_secs: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dense_reconstruction_secs: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub convert_format_secs: Option<u64>,
}

impl TimeoutSettings {
    pub fn extract_frames(&self) -> Option<Duration> {
        self.extract_frames_secs.map(Duration::from_secs)
    }

    pub fn structure_from_motion(&self) -> Option<Duration> {
        self.structure_from_motion_secs.map(Duration::from_secs)
    }

    pub fn dense_reconstruction(&self) -> Option<Duration> {
        self.dense_reconstruction_secs.map(Duration::from_secs)
    }

    pub fn convert_format(&self) -> Option<Duration> {
        self.convert_format_secs.map(Duration::from_secs)
    }
}

/// Working directory housekeeping.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkspaceSettings {
    /// Delete frames, the sparse model and undistorted data after a successful run.
    #[serde(default)]
    pub cleanup_intermediates: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Minimum level written to the run log.
    #[serde(default)]
    pub level: LogLevel,

    /// Keep tool output out of the log unless a stage fails.
    #[serde(default = "default_true")]
    pub compact: bool,

    /// Number of tool output lines replayed on failure.
    #[serde(default = "default_error_tail")]
    pub error_tail: u32,

    /// Prefix log lines with the wall clock time.
    #[serde(default = "default_true")]
    pub show_timestamps: bool,

    /// Write `pipeline_summary.json` into the output directory.
    #[serde(default = "default_true")]
    pub write_summary: bool,
}

fn default_error_tail() -> u32 {
    20
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            compact: true,
            error_tail: default_error_tail(),
            show_timestamps: true,
            write_summary: true,
        }
    }
}

/// Names of config sections for targeted updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigSection {
    Paths,
    Tools,
    Extraction,
    Sfm,
    Validation,
    Timeouts,
    Workspace,
    Logging,
}

impl ConfigSection {
    pub const ALL: [ConfigSection; 8] = [
        ConfigSection::Paths,
        ConfigSection::Tools,
        ConfigSection::Extraction,
        ConfigSection::Sfm,
        ConfigSection::Validation,
        ConfigSection::Timeouts,
        ConfigSection::Workspace,
        ConfigSection::Logging,
    ];

    /// Get the TOML table name for this section.
    pub fn table_name(&self) -> &'static str {
        match self {
            ConfigSection::Paths => "paths",
            ConfigSection::Tools => "tools",
            ConfigSection::Extraction => "extraction",
            ConfigSection::Sfm => "sfm",
            ConfigSection::Validation => "validation",
            ConfigSection::Timeouts => "timeouts",
            ConfigSection::Workspace => "workspace",
            ConfigSection::Logging => "logging",
        }
    }

    /// One-line description written above the table.
    pub fn comment(&self) -> &'static str {
        match self {
            ConfigSection::Paths => "Input, output and working directories",
            ConfigSection::Tools => "External tools (name on PATH or full path)",
            ConfigSection::Extraction => "Frame extraction from the input video",
            ConfigSection::Sfm => "Structure-from-motion",
            ConfigSection::Validation => "Sparse model quality gate",
            ConfigSection::Timeouts => {
                "Per-command deadlines in seconds (omit for no limit)"
            }
            ConfigSection::Workspace => "Working directory housekeeping",
            ConfigSection::Logging => "Logging configuration",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_serializes() {
        let settings = Settings::default();
        let toml = toml::to_string_pretty(&settings).unwrap();
        assert!(toml.contains("[paths]"));
        assert!(toml.contains("[extraction]"));
        assert!(toml.contains("frame_pattern"));
    }

    #[test]
    fn missing_fields_use_defaults() {
        let minimal = "[paths]\nworkspace = \"/data/chair\"\n[validation]\nmin_points = 500\n";
        let parsed: Settings = toml::from_str(minimal).unwrap();
        assert_eq!(parsed.paths.workspace, "/data/chair");
        assert_eq!(parsed.paths.conversion_script, "obj_to_glb_cleanup.py");
        assert_eq!(parsed.validation.min_points, 500);
        assert_eq!(parsed.validation.min_images, 2);
        assert_eq!(parsed.extraction.fps, 1);
        assert!(parsed.tools.preflight);
    }

    #[test]
    fn timeouts_are_optional() {
        let parsed: Settings =
            toml::from_str("[timeouts]\ndense_reconstruction_secs = 7200\n").unwrap();
        assert_eq!(
            parsed.timeouts.dense_reconstruction(),
            Some(Duration::from_secs(7200))
        );
        assert_eq!(parsed.timeouts.extract_frames(), None);
    }

    #[test]
    fn validate_rejects_zero_fps() {
        let mut settings = Settings::default();
        assert!(settings.validate().is_ok());
        settings.extraction.fps = 0;
        assert!(settings.validate().unwrap_err().contains("fps"));
    }

    #[test]
    fn thresholds_come_from_validation_section() {
        let settings = Settings::default();
        assert_eq!(settings.validation.thresholds(), Thresholds::default());
    }
}
