use std::{
    ffi::OsString,
    io::ErrorKind,
    path::{Path, PathBuf},
    process::Stdio,
};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::{fs, process::Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    error::TranscodeError,
    types::{MediaAsset, TimeRange, TranscodedFile},
};

const STDERR_TAIL_LINES: usize = 12;

/// Delivery encodings. Both produce H.264/AAC in an MP4 container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EncodePreset {
    #[default]
    HighestQuality,
    Medium,
}

impl EncodePreset {
    fn codec_args(&self) -> &'static [&'static str] {
        match self {
            EncodePreset::HighestQuality => &[
                "-c:v", "libx264", "-preset", "slow", "-crf", "18", "-c:a", "aac", "-b:a", "192k",
            ],
            EncodePreset::Medium => &[
                "-c:v", "libx264", "-preset", "medium", "-crf", "23", "-c:a", "aac", "-b:a",
                "128k",
            ],
        }
    }
}

#[async_trait]
pub trait MediaTranscoder: Send + Sync {
    /// Re-encode `range` of `asset` into `output`, replacing whatever is there.
    async fn transcode(
        &self,
        asset: &MediaAsset,
        range: TimeRange,
        output: &Path,
        cancel: &CancellationToken,
    ) -> Result<TranscodedFile, TranscodeError>;
}

/// Reads a source file and reports it as a [`MediaAsset`].
#[async_trait]
pub trait MediaProbe: Send + Sync {
    async fn probe(&self, path: &Path) -> Result<MediaAsset, TranscodeError>;
}

/// Remove a stale file at `path`. A missing file is not an error.
pub async fn remove_stale_output(path: &Path) -> Result<(), TranscodeError> {
    match fs::remove_file(path).await {
        Ok(()) => {
            debug!(path = %path.display(), "removed stale output");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(source) => Err(TranscodeError::CleanupFailed {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[derive(Debug, Clone, Default)]
pub struct FfmpegTranscoder {
    preset: EncodePreset,
}

impl FfmpegTranscoder {
    pub fn new(preset: EncodePreset) -> Self {
        Self { preset }
    }

    fn build_args(&self, source: &Path, range: TimeRange, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-hide_banner".into(),
            "-nostdin".into(),
            "-y".into(),
            "-ss".into(),
            format!("{:.3}", range.start()).into(),
            "-i".into(),
            source.as_os_str().to_owned(),
            "-t".into(),
            format!("{:.3}", range.duration()).into(),
        ];
        args.extend(self.preset.codec_args().iter().map(OsString::from));
        args.extend(
            ["-movflags", "+faststart", "-f", "mp4"]
                .iter()
                .map(OsString::from),
        );
        args.push(output.as_os_str().to_owned());
        args
    }
}

#[async_trait]
impl MediaTranscoder for FfmpegTranscoder {
    async fn transcode(
        &self,
        asset: &MediaAsset,
        range: TimeRange,
        output: &Path,
        cancel: &CancellationToken,
    ) -> Result<TranscodedFile, TranscodeError> {
        let range = TimeRange::resolve(Some(range), asset.duration, None)?;

        remove_stale_output(output).await?;
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| TranscodeError::EncodeFailed {
                    message: format!("can't create {}: {}", parent.display(), e),
                })?;
        }

        info!(
            source = %asset.path.display(),
            output = %output.display(),
            %range,
            preset = ?self.preset,
            "transcoding"
        );

        let child = Command::new("ffmpeg")
            .args(self.build_args(&asset.path, range, output))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TranscodeError::EncodeFailed {
                message: format!("can't start ffmpeg: {}", e),
            })?;

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                // the child is killed on drop together with the wait future
                if let Err(e) = remove_stale_output(output).await {
                    warn!(error = %e, "can't remove partial output");
                }
                return Err(TranscodeError::Cancelled);
            }
            out = child.wait_with_output() => out,
        };

        let output_status = result.map_err(|e| TranscodeError::EncodeFailed {
            message: e.to_string(),
        })?;

        if !output_status.status.success() {
            let stderr = String::from_utf8_lossy(&output_status.stderr);
            return Err(TranscodeError::EncodeFailed {
                message: format!("{}: {}", output_status.status, stderr_tail(&stderr)),
            });
        }

        let size_bytes = fs::metadata(output)
            .await
            .map_err(|e| TranscodeError::EncodeFailed {
                message: format!("output missing after encode: {}", e),
            })?
            .len();

        info!(output = %output.display(), size_bytes, "transcode completed");

        Ok(TranscodedFile {
            path: output.to_path_buf(),
            range,
            size_bytes,
        })
    }
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.trim().lines().collect();
    let skip = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[skip..].join("\n")
}

#[derive(Deserialize)]
struct ProbeOutput {
    format: ProbeFormat,
}

#[derive(Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

fn parse_probe_duration(json: &str) -> Result<f64, String> {
    let parsed: ProbeOutput = serde_json::from_str(json).map_err(|e| e.to_string())?;
    let raw = parsed
        .format
        .duration
        .ok_or_else(|| "no duration reported".to_string())?;
    let duration = raw
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("bad duration {:?}: {}", raw, e))?;

    if !duration.is_finite() || duration <= 0.0 {
        return Err(format!("unusable duration {}", duration));
    }
    Ok(duration)
}

#[derive(Debug, Clone, Default)]
pub struct FfprobeProbe;

#[async_trait]
impl MediaProbe for FfprobeProbe {
    async fn probe(&self, path: &Path) -> Result<MediaAsset, TranscodeError> {
        let probe_err = |reason: String| TranscodeError::Probe {
            path: path.to_path_buf(),
            reason,
        };

        let output = Command::new("ffprobe")
            .arg("-v")
            .arg("error")
            .arg("-show_entries")
            .arg("format=duration")
            .arg("-of")
            .arg("json")
            .arg(path)
            .output()
            .await
            .map_err(|e| probe_err(format!("can't start ffprobe: {}", e)))?;

        if !output.status.success() {
            return Err(probe_err(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let duration = parse_probe_duration(&String::from_utf8_lossy(&output.stdout))
            .map_err(probe_err)?;

        Ok(MediaAsset::new(PathBuf::from(path), duration))
    }
}
