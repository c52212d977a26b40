//! Report, verdict, and error types for reconstruction validation.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// `points3D.bin` must be strictly larger than this many bytes.
pub const MIN_BINARY_POINTS_BYTES: u64 = 100;

/// `images.bin` must be strictly larger than this many bytes.
pub const MIN_BINARY_IMAGES_BYTES: u64 = 50;

/// On-disk encoding of a sparse model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFormat {
    Binary,
    Text,
}

impl ModelFormat {
    fn extension(&self) -> &'static str {
        match self {
            ModelFormat::Binary => "bin",
            ModelFormat::Text => "txt",
        }
    }

    pub fn points_file(&self) -> String {
        format!("points3D.{}", self.extension())
    }

    pub fn images_file(&self) -> String {
        format!("images.{}", self.extension())
    }

    pub fn cameras_file(&self) -> String {
        format!("cameras.{}", self.extension())
    }

    /// The three files that make up a complete model in this format.
    pub fn triple(&self) -> [String; 3] {
        [self.points_file(), self.images_file(), self.cameras_file()]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelFormat::Binary => "binary",
            ModelFormat::Text => "text",
        }
    }
}

/// Minimum counts a text model must reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    pub min_points: u64,
    pub min_images: u64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            min_points: 100,
            min_images: 2,
        }
    }
}

/// Pass/fail decision with the measured and required values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    InsufficientPoints { measured: u64, required: u64 },
    InsufficientImages { measured: u64, required: u64 },
    ModelFileTooSmall { file: String, size: u64, minimum: u64 },
}

impl Verdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass)
    }
}

/// What was measured in a sparse model.
///
/// Counts are `None` for binary models, whose contents are not parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ModelMetrics {
    pub point_count: Option<u64>,
    pub image_count: Option<u64>,
    pub points_file_bytes: u64,
    pub images_file_bytes: u64,
}

/// Summary of one sparse model inspection.
///
/// Built once per structure-from-motion completion and never modified.
/// Binary models only carry file sizes: the point and image counts are
/// `None` because the binary format is not parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    directory: PathBuf,
    format: ModelFormat,
    #[serde(flatten)]
    metrics: ModelMetrics,
    thresholds: Thresholds,
    verdict: Verdict,
    reason: String,
}

impl ValidationReport {
    pub(crate) fn new(
        directory: &Path,
        format: ModelFormat,
        metrics: ModelMetrics,
        thresholds: Thresholds,
        verdict: Verdict,
    ) -> Self {
        let reason = describe(format, &metrics, &thresholds, &verdict);
        Self {
            directory: directory.to_path_buf(),
            format,
            metrics,
            thresholds,
            verdict,
            reason,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn format(&self) -> ModelFormat {
        self.format
    }

    pub fn metrics(&self) -> ModelMetrics {
        self.metrics
    }

    pub fn point_count(&self) -> Option<u64> {
        self.metrics.point_count
    }

    pub fn image_count(&self) -> Option<u64> {
        self.metrics.image_count
    }

    pub fn points_file_bytes(&self) -> u64 {
        self.metrics.points_file_bytes
    }

    pub fn images_file_bytes(&self) -> u64 {
        self.metrics.images_file_bytes
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    pub fn verdict(&self) -> &Verdict {
        &self.verdict
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn passed(&self) -> bool {
        self.verdict.is_pass()
    }

    /// Turn a failing verdict into the matching error.
    pub fn check(&self) -> ValidationResult<()> {
        match &self.verdict {
            Verdict::Pass => Ok(()),
            Verdict::InsufficientPoints { measured, required } => {
                Err(ValidationError::InsufficientPoints {
                    measured: *measured,
                    required: *required,
                })
            }
            Verdict::InsufficientImages { measured, required } => {
                Err(ValidationError::InsufficientImages {
                    measured: *measured,
                    required: *required,
                })
            }
            Verdict::ModelFileTooSmall {
                file,
                size,
                minimum,
            } => Err(ValidationError::ModelFileTooSmall {
                file: self.directory.join(file),
                size: *size,
                minimum: *minimum,
            }),
        }
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.passed() { "PASS" } else { "FAIL" };
        write!(f, "[{}] {}", status, self.reason)
    }
}

fn describe(
    format: ModelFormat,
    metrics: &ModelMetrics,
    thresholds: &Thresholds,
    verdict: &Verdict,
) -> String {
    let metrics = match format {
        ModelFormat::Text => format!(
            "text model: {} points (min {}), {} images (min {})",
            metrics.point_count.unwrap_or(0),
            thresholds.min_points,
            metrics.image_count.unwrap_or(0),
            thresholds.min_images
        ),
        ModelFormat::Binary => format!(
            "binary model: points3D.bin {} bytes (must exceed {}), images.bin {} bytes (must exceed {}); size heuristic, counts not parsed",
            metrics.points_file_bytes,
            MIN_BINARY_POINTS_BYTES,
            metrics.images_file_bytes,
            MIN_BINARY_IMAGES_BYTES
        ),
    };

    match verdict {
        Verdict::Pass => metrics,
        Verdict::InsufficientPoints { measured, required } => {
            format!("{metrics}; only {measured} points, {required} required")
        }
        Verdict::InsufficientImages { measured, required } => {
            format!("{metrics}; only {measured} registered images, {required} required")
        }
        Verdict::ModelFileTooSmall {
            file,
            size,
            minimum,
        } => format!("{metrics}; {file} is {size} bytes, must exceed {minimum}"),
    }
}

/// Errors from reconstruction validation.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Neither a complete binary nor a complete text triple was found.
    #[error("No complete sparse model in '{}' (found: {})", .directory.display(), found_list(.found))]
    MissingReconstructionFiles {
        directory: PathBuf,
        found: Vec<String>,
    },

    #[error("Insufficient 3D points: measured {measured}, required {required}")]
    InsufficientPoints { measured: u64, required: u64 },

    #[error("Insufficient registered images: measured {measured}, required {required}")]
    InsufficientImages { measured: u64, required: u64 },

    /// A binary model file is too small to hold a usable reconstruction.
    #[error("Sparse model file '{}' is {size} bytes, must exceed {minimum} bytes", .file.display())]
    ModelFileTooSmall {
        file: PathBuf,
        size: u64,
        minimum: u64,
    },

    #[error("I/O error reading '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ValidationError {
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

fn found_list(found: &[String]) -> String {
    if found.is_empty() {
        "nothing".to_string()
    } else {
        found.join(", ")
    }
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// A sparse model the gate refused.
///
/// `report` is `None` when the model could not be measured at all.
#[derive(Debug)]
pub struct Rejection {
    pub report: Option<ValidationReport>,
    pub error: ValidationError,
}

impl From<ValidationError> for Rejection {
    fn from(error: ValidationError) -> Self {
        Self {
            report: None,
            error,
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}
