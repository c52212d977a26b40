//! Sparse model inspection.

use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::Path;

use super::types::{
    ModelFormat, ModelMetrics, Rejection, Thresholds, ValidationError, ValidationReport,
    ValidationResult, Verdict, MIN_BINARY_IMAGES_BYTES, MIN_BINARY_POINTS_BYTES,
};

/// Decides whether a sparse reconstruction is good enough to densify.
///
/// Text models are counted exactly. Binary models are only size-checked:
/// an empty or near-empty reconstruction serializes to a near-zero-length
/// file, so a points file above 100 bytes and an images file above 50 bytes
/// is taken as "something was reconstructed". This is a heuristic gate, not
/// a count, and the binary format is deliberately left unparsed.
#[derive(Debug, Clone, Default)]
pub struct ReconstructionValidator {
    thresholds: Thresholds,
}

impl ReconstructionValidator {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    /// Work out which model triple is present in `model_dir`.
    ///
    /// A complete binary triple wins over a complete text triple.
    pub fn detect_format(&self, model_dir: &Path) -> ValidationResult<ModelFormat> {
        for format in [ModelFormat::Binary, ModelFormat::Text] {
            if format.triple().iter().all(|f| model_dir.join(f).is_file()) {
                return Ok(format);
            }
        }

        let found = [ModelFormat::Binary, ModelFormat::Text]
            .iter()
            .flat_map(|f| f.triple())
            .filter(|f| model_dir.join(f).is_file())
            .collect();

        Err(ValidationError::MissingReconstructionFiles {
            directory: model_dir.to_path_buf(),
            found,
        })
    }

    /// Measure the model and build a report, whatever the verdict.
    ///
    /// Only a missing model or an unreadable file is an error here; failing
    /// thresholds are expressed in the report's verdict.
    pub fn inspect(&self, model_dir: &Path) -> ValidationResult<ValidationReport> {
        let format = self.detect_format(model_dir)?;
        let points_path = model_dir.join(format.points_file());
        let images_path = model_dir.join(format.images_file());

        let mut metrics = ModelMetrics {
            points_file_bytes: file_size(&points_path)?,
            images_file_bytes: file_size(&images_path)?,
            ..ModelMetrics::default()
        };

        let verdict = match format {
            ModelFormat::Binary => {
                binary_verdict(metrics.points_file_bytes, metrics.images_file_bytes)
            }
            ModelFormat::Text => {
                let points = count_records(&points_path)?;
                let images = count_records(&images_path)?;
                metrics.point_count = Some(points);
                metrics.image_count = Some(images);
                self.text_verdict(points, images)
            }
        };

        Ok(ValidationReport::new(
            model_dir,
            format,
            metrics,
            self.thresholds,
            verdict,
        ))
    }

    /// Inspect the model and enforce the thresholds.
    ///
    /// The verdict is logged either way. A rejection still carries the
    /// report whenever the model could be measured.
    pub fn validate(&self, model_dir: &Path) -> Result<ValidationReport, Rejection> {
        let report = self.inspect(model_dir)?;
        if report.passed() {
            tracing::info!("Sparse model accepted: {}", report.reason());
        } else {
            tracing::warn!("Sparse model rejected: {}", report.reason());
        }

        match report.check() {
            Ok(()) => Ok(report),
            Err(error) => Err(Rejection {
                report: Some(report),
                error,
            }),
        }
    }

    fn text_verdict(&self, points: u64, images: u64) -> Verdict {
        if points < self.thresholds.min_points {
            Verdict::InsufficientPoints {
                measured: points,
                required: self.thresholds.min_points,
            }
        } else if images < self.thresholds.min_images {
            Verdict::InsufficientImages {
                measured: images,
                required: self.thresholds.min_images,
            }
        } else {
            Verdict::Pass
        }
    }
}

fn binary_verdict(points_bytes: u64, images_bytes: u64) -> Verdict {
    if points_bytes <= MIN_BINARY_POINTS_BYTES {
        Verdict::ModelFileTooSmall {
            file: ModelFormat::Binary.points_file(),
            size: points_bytes,
            minimum: MIN_BINARY_POINTS_BYTES,
        }
    } else if images_bytes <= MIN_BINARY_IMAGES_BYTES {
        Verdict::ModelFileTooSmall {
            file: ModelFormat::Binary.images_file(),
            size: images_bytes,
            minimum: MIN_BINARY_IMAGES_BYTES,
        }
    } else {
        Verdict::Pass
    }
}

fn file_size(path: &Path) -> ValidationResult<u64> {
    fs::metadata(path)
        .map(|m| m.len())
        .map_err(|e| ValidationError::io(path, e))
}

/// Count data records in a line-oriented model file.
///
/// Blank lines and `#` comment lines are skipped.
fn count_records(path: &Path) -> ValidationResult<u64> {
    let file = File::open(path).map_err(|e| ValidationError::io(path, e))?;
    let mut count = 0;
    for line in BufReader::new(file).split(b'\n') {
        let line = line.map_err(|e| ValidationError::io(path, e))?;
        let trimmed = line.trim_ascii();
        if trimmed.is_empty() || trimmed.starts_with(b"#") {
            continue;
        }
        count += 1;
    }
    Ok(count)
}
