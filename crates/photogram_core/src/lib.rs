//! Photogram Core - video to textured 3D asset pipeline
//!
//! Drives ffmpeg, colmap, OpenMVS and blender as external processes,
//! one stage after another, with a quality gate on the sparse model
//! before the expensive dense stages. The crate has no UI dependencies;
//! the `photogram` binary is a thin command-line front end.

pub mod commands;
pub mod config;
pub mod logging;
pub mod orchestrator;
pub mod runner;
pub mod validation;
pub mod workspace;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_returns_value() {
        assert!(!version().is_empty());
    }
}
