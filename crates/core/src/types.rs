use std::{fmt, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TranscodeError;

/// A local source video as handed over by the media source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaAsset {
    pub path: PathBuf,
    /// Total duration in seconds.
    pub duration: f64,
}

impl MediaAsset {
    pub fn new(path: impl Into<PathBuf>, duration: f64) -> Self {
        Self {
            path: path.into(),
            duration,
        }
    }
}

/// In/out points of a trim, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    start: f64,
    end: f64,
}

impl TimeRange {
    pub fn new(start: f64, end: f64) -> Result<Self, TranscodeError> {
        let invalid = |reason| TranscodeError::InvalidRange { start, end, reason };

        if !start.is_finite() || !end.is_finite() {
            return Err(invalid("bounds must be finite"));
        }
        if start < 0.0 {
            return Err(invalid("start must not be negative"));
        }
        if end <= start {
            return Err(invalid("end must be after start"));
        }

        Ok(Self { start, end })
    }

    pub fn full(duration: f64) -> Result<Self, TranscodeError> {
        Self::new(0.0, duration)
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn end(&self) -> f64 {
        self.end
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Effective range for `duration`: the full asset when `range` is `None`,
    /// otherwise `range` with its end clamped to the asset and, when given,
    /// to `max_len` seconds after start.
    pub fn resolve(
        range: Option<TimeRange>,
        duration: f64,
        max_len: Option<f64>,
    ) -> Result<TimeRange, TranscodeError> {
        let requested = match range {
            Some(range) => range,
            None => Self::full(duration)?,
        };

        if requested.start >= duration {
            return Err(TranscodeError::InvalidRange {
                start: requested.start,
                end: requested.end,
                reason: "range starts past the end of the asset",
            });
        }

        let mut end = requested.end.min(duration);
        if let Some(max_len) = max_len.filter(|m| *m > 0.0) {
            end = end.min(requested.start + max_len);
        }

        Self::new(requested.start, end)
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}s..{:.3}s", self.start, self.end)
    }
}

/// Output of a successful transcode.
#[derive(Debug, Clone)]
pub struct TranscodedFile {
    pub path: PathBuf,
    pub range: TimeRange,
    pub size_bytes: u64,
}

/// Where the transcoded bytes have to be pushed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    pub upload_url: String,
    pub asset_id: Option<String>,
}

/// Basic-auth pair for the upload API.
#[derive(Clone)]
pub struct UploadCredentials {
    pub token_id: String,
    pub token_secret: String,
}

impl UploadCredentials {
    pub fn new(token_id: impl Into<String>, token_secret: impl Into<String>) -> Self {
        Self {
            token_id: token_id.into(),
            token_secret: token_secret.into(),
        }
    }
}

impl fmt::Debug for UploadCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadCredentials")
            .field("token_id", &self.token_id)
            .field("token_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStage {
    Transcoding,
    RequestingTarget,
    Uploading,
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunStage::Transcoding => "transcoding",
            RunStage::RequestingTarget => "requesting upload target",
            RunStage::Uploading => "uploading",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Transcoding,
    RequestingTarget,
    Uploading,
    Succeeded,
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Succeeded | RunState::Failed)
    }

    /// Legal transitions of a single run. `Idle -> RequestingTarget` is the
    /// self-test path, which has nothing to transcode.
    pub fn can_advance_to(&self, next: RunState) -> bool {
        use RunState::*;

        matches!(
            (self, next),
            (Idle, Transcoding)
                | (Idle, RequestingTarget)
                | (Transcoding, RequestingTarget)
                | (Transcoding, Failed)
                | (RequestingTarget, Uploading)
                | (RequestingTarget, Succeeded)
                | (RequestingTarget, Failed)
                | (Uploading, Succeeded)
                | (Uploading, Failed)
        )
    }
}

impl From<RunStage> for RunState {
    fn from(stage: RunStage) -> Self {
        match stage {
            RunStage::Transcoding => RunState::Transcoding,
            RunStage::RequestingTarget => RunState::RequestingTarget,
            RunStage::Uploading => RunState::Uploading,
        }
    }
}

/// What a run works on.
#[derive(Debug, Clone)]
pub enum RunSource {
    Asset {
        asset: MediaAsset,
        range: Option<TimeRange>,
    },
    /// Connectivity check: the API ingests a remote sample clip, nothing is
    /// transcoded locally.
    SelfTest,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub target: Option<UploadTarget>,
    /// Asset id assigned by the API, when it reported one.
    pub asset_id: Option<String>,
    pub bytes_uploaded: u64,
    pub range: Option<TimeRange>,
    /// Transcoded file left on disk when artifacts are kept.
    pub artifact: Option<PathBuf>,
    pub elapsed: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_ranges() {
        assert!(TimeRange::new(-1.0, 2.0).is_err());
        assert!(TimeRange::new(3.0, 3.0).is_err());
        assert!(TimeRange::new(4.0, 1.0).is_err());
        assert!(TimeRange::new(0.0, f64::INFINITY).is_err());
        assert!(TimeRange::new(f64::NAN, 1.0).is_err());
    }

    #[test]
    fn missing_range_defaults_to_whole_asset() {
        let range = TimeRange::resolve(None, 10.0, None).unwrap();
        assert_eq!(range.start(), 0.0);
        assert_eq!(range.end(), 10.0);
    }

    #[test]
    fn end_is_clamped_to_duration() {
        let requested = TimeRange::new(2.0, 15.0).unwrap();
        let range = TimeRange::resolve(Some(requested), 10.0, None).unwrap();
        assert_eq!(range, TimeRange::new(2.0, 10.0).unwrap());
    }

    #[test]
    fn range_past_the_asset_is_rejected() {
        let requested = TimeRange::new(12.0, 15.0).unwrap();
        let err = TimeRange::resolve(Some(requested), 10.0, None).unwrap_err();
        assert!(matches!(err, TranscodeError::InvalidRange { .. }));
    }

    #[test]
    fn zero_length_asset_has_no_range() {
        assert!(TimeRange::resolve(None, 0.0, None).is_err());
    }

    #[test]
    fn max_len_limits_the_clip() {
        let requested = TimeRange::new(2.0, 9.0).unwrap();
        let range = TimeRange::resolve(Some(requested), 10.0, Some(5.0)).unwrap();
        assert_eq!(range.end(), 7.0);
        assert_eq!(range.duration(), 5.0);
    }

    #[test]
    fn state_machine_transitions() {
        assert!(RunState::Idle.can_advance_to(RunState::Transcoding));
        assert!(RunState::Transcoding.can_advance_to(RunState::RequestingTarget));
        assert!(RunState::RequestingTarget.can_advance_to(RunState::Uploading));
        assert!(RunState::Uploading.can_advance_to(RunState::Succeeded));
        assert!(RunState::Uploading.can_advance_to(RunState::Failed));

        assert!(!RunState::Idle.can_advance_to(RunState::Uploading));
        assert!(!RunState::Transcoding.can_advance_to(RunState::Succeeded));
        assert!(!RunState::Succeeded.can_advance_to(RunState::Transcoding));
        assert!(!RunState::Failed.can_advance_to(RunState::Idle));
    }

    #[test]
    fn credentials_debug_hides_secret() {
        let creds = UploadCredentials::new("id", "very-secret");
        let printed = format!("{:?}", creds);
        assert!(printed.contains("id"));
        assert!(!printed.contains("very-secret"));
    }
}
