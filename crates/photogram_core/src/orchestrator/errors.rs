//! Error types for the orchestrator pipeline.
//!
//! Errors carry context that chains through layers:
//! Run → Stage → Operation → Detail

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::types::{Artifact, StageId};
use crate::runner::RunnerError;
use crate::validation::ValidationError;
use crate::workspace::WorkspaceError;

/// Top-level pipeline error with run context.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A stage failed; later stages were not started.
    #[error("Run '{run_name}' failed at stage {} ({stage}): {source}", .stage.ordinal())]
    StageFailed {
        run_name: String,
        stage: StageId,
        #[source]
        source: StageError,
    },

    /// The run could not be set up (logs, directories, configuration).
    #[error("Run '{run_name}' setup failed: {message}")]
    SetupFailed { run_name: String, message: String },
}

impl PipelineError {
    pub fn stage_failed(run_name: impl Into<String>, stage: StageId, source: StageError) -> Self {
        Self::StageFailed {
            run_name: run_name.into(),
            stage,
            source,
        }
    }

    pub fn setup_failed(run_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SetupFailed {
            run_name: run_name.into(),
            message: message.into(),
        }
    }

    /// Stage that failed, if the run got that far.
    pub fn stage(&self) -> Option<StageId> {
        match self {
            Self::StageFailed { stage, .. } => Some(*stage),
            Self::SetupFailed { .. } => None,
        }
    }

    /// Classified cause of a stage failure.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::StageFailed { source, .. } => Some(source.kind()),
            Self::SetupFailed { .. } => None,
        }
    }
}

/// Error from a pipeline stage.
#[derive(Error, Debug)]
pub enum StageError {
    /// A declared input was absent when the stage was about to start.
    #[error("Required input missing: expected {expected} '{}'", .path.display())]
    InputMissing { path: PathBuf, expected: String },

    /// An external command failed.
    #[error(transparent)]
    Command(#[from] RunnerError),

    /// The sparse model did not pass the quality gate.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A tool exited successfully but its output is not on disk.
    #[error("{producer} exited successfully but did not produce {expected} '{}'", .path.display())]
    OutputMissing {
        producer: String,
        path: PathBuf,
        expected: String,
    },

    /// The format conversion exited successfully but wrote no asset.
    #[error("Conversion reported success but '{}' was not written", .path.display())]
    ConversionFailed { path: PathBuf },

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
}

impl StageError {
    pub fn input_missing(artifact: &Artifact) -> Self {
        Self::InputMissing {
            path: artifact.path().to_path_buf(),
            expected: artifact.kind().to_string(),
        }
    }

    pub fn output_missing(producer: impl Into<String>, artifact: &Artifact) -> Self {
        Self::OutputMissing {
            producer: producer.into(),
            path: artifact.path().to_path_buf(),
            expected: artifact.kind().to_string(),
        }
    }

    pub fn conversion_failed(path: impl Into<PathBuf>) -> Self {
        Self::ConversionFailed { path: path.into() }
    }

    /// Flatten into a single tag callers can match on.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InputMissing { .. } => ErrorKind::InputMissing,
            Self::Command(err) => match err {
                RunnerError::ExecutableNotFound { .. } => ErrorKind::ExecutableNotFound,
                RunnerError::NonZeroExit { .. } => ErrorKind::NonZeroExit,
                RunnerError::TimedOut { .. } => ErrorKind::TimedOut,
                RunnerError::Spawn { .. } => ErrorKind::SpawnFailed,
                RunnerError::Io { .. } => ErrorKind::Io,
            },
            Self::Validation(err) => match err {
                ValidationError::MissingReconstructionFiles { .. } => {
                    ErrorKind::MissingReconstructionFiles
                }
                ValidationError::InsufficientPoints { .. } => ErrorKind::InsufficientPoints,
                ValidationError::InsufficientImages { .. } => ErrorKind::InsufficientImages,
                ValidationError::ModelFileTooSmall { .. } => ErrorKind::ModelFileTooSmall,
                ValidationError::Io { .. } => ErrorKind::Io,
            },
            Self::OutputMissing { .. } => ErrorKind::OutputMissing,
            Self::ConversionFailed { .. } => ErrorKind::ConversionFailed,
            Self::Workspace(_) => ErrorKind::Io,
        }
    }
}

/// Flat classification of everything that can stop a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InputMissing,
    ExecutableNotFound,
    NonZeroExit,
    TimedOut,
    SpawnFailed,
    MissingReconstructionFiles,
    InsufficientPoints,
    InsufficientImages,
    ModelFileTooSmall,
    OutputMissing,
    ConversionFailed,
    Io,
}

/// Result type for stage operations.
pub type StageResult<T> = Result<T, StageError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;
