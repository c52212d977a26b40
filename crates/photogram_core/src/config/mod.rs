//! Configuration management.
//!
//! This module provides:
//! - TOML-based configuration with logical sections
//! - Atomic file writes (write to temp, then rename)
//! - Section-level updates (only changed section is modified)
//! - Validation on load with automatic defaults
//!
//! # Example
//!
//! ```no_run
//! use photogram_core::config::{ConfigManager, ConfigSection};
//!
//! // Create manager and load (or create default) config
//! let mut config = ConfigManager::new("photogram.toml");
//! config.load_or_create().unwrap();
//!
//! println!("Frames per second: {}", config.settings().extraction.fps);
//!
//! // Remember the workspace for the next run
//! config.settings_mut().paths.workspace = "/data/chair".to_string();
//! config.update_section(ConfigSection::Paths).unwrap();
//! ```

mod manager;
mod settings;

pub use manager::{ConfigError, ConfigManager, ConfigResult};
pub use settings::{
    ConfigSection, ExtractionSettings, LoggingSettings, PathSettings, Settings, SfmSettings,
    TimeoutSettings, ToolSettings, ValidationSettings, WorkspaceSettings,
};
