//! Reconstruction quality gate.
//!
//! Runs right after structure-from-motion, the cheapest stage to retry,
//! and before dense reconstruction, meshing and texturing, which can take
//! hours. A degenerate sparse model is rejected here instead of being
//! discovered at the end of the expensive stages.
//!
//! ```text
//! sparse/0/
//!     points3D.bin  images.bin  cameras.bin   -> size heuristic
//!     points3D.txt  images.txt  cameras.txt   -> exact record count
//! ```

mod reconstruction;
mod types;

pub use reconstruction::ReconstructionValidator;
pub use types::{
    ModelFormat, ModelMetrics, Rejection, Thresholds, ValidationError, ValidationReport,
    ValidationResult, Verdict, MIN_BINARY_IMAGES_BYTES, MIN_BINARY_POINTS_BYTES,
};
