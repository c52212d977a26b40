//! Pipeline orchestrator for turning one video into a textured 3D asset.
//!
//! A run is a fixed sequence of stages. Each stage declares the paths it
//! reads and writes, drives its external tools through the
//! [`CommandRunner`](crate::runner::CommandRunner) and only succeeds once
//! its outputs exist on disk.
//!
//! # Architecture
//!
//! ```text
//! PipelineDriver
//!     └── Pipeline
//!         ├── Stage 1: ExtractFrames            (ffmpeg)
//!         ├── Stage 2: StructureFromMotion      (colmap)
//!         ├── Stage 3: Validate                 (quality gate)
//!         ├── Stage 4: DenseReconstructAndMesh  (OpenMVS)
//!         └── Stage 5: ConvertFormat            (blender)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use photogram_core::orchestrator::PipelineDriver;
//! use photogram_core::runner::SystemRunner;
//!
//! let driver = PipelineDriver::new(settings, Arc::new(SystemRunner::new()));
//! let outcome = driver.run();
//! if !outcome.is_success() {
//!     eprintln!("{}", outcome.message);
//! }
//! std::process::exit(outcome.exit_code);
//! ```

mod driver;
mod errors;
mod pipeline;
mod step;
pub mod steps;
#[cfg(test)]
mod testing;
mod types;

pub use driver::{DriverOutcome, PipelineDriver, StagePlan};
pub use errors::{ErrorKind, PipelineError, PipelineResult, StageError, StageResult};
pub use pipeline::{Pipeline, PipelineRunResult};
pub use step::PipelineStep;
pub use steps::{
    ConvertFormatStep, DenseReconstructStep, ExtractFramesStep, StructureFromMotionStep,
    ValidateStep,
};
pub use types::{
    count_files, Artifact, AssetRecord, CommandRecord, Context, FailureRecord, PipelinePaths,
    PlannedCommand, RunState, StageId, StageRecord, StageStatus, SUMMARY_FILE,
};

/// Create the standard pipeline with all stages in order.
///
/// 1. ExtractFrames - sample the video into still frames
/// 2. StructureFromMotion - sparse model and undistorted images
/// 3. Validate - reject degenerate sparse models
/// 4. DenseReconstructAndMesh - dense cloud, mesh, refinement, texture
/// 5. ConvertFormat - textured OBJ to GLB
pub fn create_standard_pipeline() -> Pipeline {
    Pipeline::new()
        .with_step(ExtractFramesStep::new())
        .with_step(StructureFromMotionStep::new())
        .with_step(ValidateStep::new())
        .with_step(DenseReconstructStep::new())
        .with_step(ConvertFormatStep::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_pipeline_order() {
        let pipeline = create_standard_pipeline();
        assert_eq!(pipeline.step_count(), 5);
        let ids: Vec<StageId> = pipeline.steps().map(|s| s.id()).collect();
        assert_eq!(ids, StageId::ALL.to_vec());
    }
}
