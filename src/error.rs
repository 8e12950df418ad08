//! Step errors of the training-run orchestration.
//!
//! Each variant names the step that failed and carries the path or command
//! involved, so a failed contribution reads as a chain like
//! `unable to contribute spring-cds layer: error extracting Boot jar at ...`.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::process::ExecError;
use crate::walk::WalkError;

/// Failure of one orchestration step. No step is retried.
#[derive(Debug, Error)]
pub enum PerformanceError {
    #[error("error creating directory {}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("error recreating jar from {}", .path.display())]
    Repackage {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("error copying jar {} to {}", .from.display(), .to.display())]
    CopyArchive {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("error saving contents of application {}", .path.display())]
    Backup {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("error extracting Boot jar at {}", .path.display())]
    Extract {
        path: PathBuf,
        #[source]
        source: ExecError,
    },

    #[error("error parsing date-time {value:?}")]
    ParseTimestamp {
        value: String,
        #[source]
        source: time::error::Parse,
    },

    #[error("error walking {}", .path.display())]
    WalkTree {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("error resetting file times on {}", .path.display())]
    ResetTimes {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("error running build: {command}")]
    TrainingRun {
        command: String,
        #[source]
        source: ExecError,
    },
}

/// Orchestration step a [`PerformanceError`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Repackage,
    Extract,
    NormalizeTimestamps,
    TrainingRun,
}

impl PerformanceError {
    pub fn step(&self) -> Step {
        match self {
            Self::CreateDir { .. }
            | Self::Repackage { .. }
            | Self::CopyArchive { .. }
            | Self::Backup { .. } => Step::Repackage,
            Self::Extract { .. } => Step::Extract,
            Self::ParseTimestamp { .. } | Self::WalkTree { .. } | Self::ResetTimes { .. } => {
                Step::NormalizeTimestamps
            }
            Self::TrainingRun { .. } => Step::TrainingRun,
        }
    }
}

impl From<WalkError<io::Error>> for PerformanceError {
    fn from(err: WalkError<io::Error>) -> Self {
        match err {
            WalkError::Walk { path, source } => Self::WalkTree { path, source },
            WalkError::Apply { path, source } => Self::ResetTimes { path, source },
        }
    }
}
