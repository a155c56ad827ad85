use std::path::PathBuf;
use thiserror::Error;

use crate::types::RunStage;

#[derive(Error, Debug)]
pub enum TranscodeError {
    #[error("Invalid time range [{start}, {end}]: {reason}")]
    InvalidRange {
        start: f64,
        end: f64,
        reason: &'static str,
    },

    #[error("Probe failed for {path}: {reason}")]
    Probe { path: PathBuf, reason: String },

    #[error("Can't remove stale output at {path}: {source}")]
    CleanupFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Encode failed: {message}")]
    EncodeFailed { message: String },

    #[error("Transcode cancelled")]
    Cancelled,
}

#[derive(Error, Debug)]
pub enum TargetError {
    #[error("Upload target unavailable: {reason}")]
    Unavailable { reason: String },
}

impl TargetError {
    pub(crate) fn unavailable(reason: impl Into<String>) -> Self {
        TargetError::Unavailable {
            reason: reason.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Transfer failed: {cause}")]
    TransferFailed { cause: String },

    #[error("Upload rejected with HTTP {status}")]
    Rejected { status: u16 },

    #[error("Upload incomplete: sent {sent} of {expected} bytes")]
    Incomplete { sent: u64, expected: u64 },
}

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("Media library access not authorized")]
    Unauthorized,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of a whole run, keeping the stage error that ended it.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Transcode(#[from] TranscodeError),

    #[error(transparent)]
    Target(#[from] TargetError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error("Run cancelled while {stage}")]
    Cancelled { stage: RunStage },
}

impl RunError {
    pub fn stage(&self) -> RunStage {
        match self {
            RunError::Transcode(_) => RunStage::Transcoding,
            RunError::Target(_) => RunStage::RequestingTarget,
            RunError::Upload(_) => RunStage::Uploading,
            RunError::Cancelled { stage } => *stage,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            RunError::Cancelled { .. } | RunError::Transcode(TranscodeError::Cancelled)
        )
    }
}

/// Failure of a transcode-and-save export, where saving is the point.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error(transparent)]
    Transcode(#[from] TranscodeError),

    #[error("Saving to media library failed: {0}")]
    Library(#[from] LibraryError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing configuration: {var} environment variable is not set")]
    Missing { var: &'static str },

    #[error("Invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },

    #[error("HTTP client setup failed: {0}")]
    Client(#[from] reqwest::Error),
}

pub type Result<T, E = RunError> = std::result::Result<T, E>;
