//! clipup core library
//!
//! Trim and transcode a local video with ffmpeg, ask a hosted video API for a
//! direct upload URL, and stream the clip to it.

pub mod cache;
pub mod config;
pub mod error;
pub mod library;
pub mod pipeline;
pub mod target;
pub mod transcode;
pub mod types;
pub mod upload;

pub use cache::{get_library_dir, get_root_work_dir, get_run_output_path};
pub use config::{Config, EnvKey, LocalDirs};
pub use error::{
    ConfigError, ExportError, LibraryError, Result, RunError, TargetError, TranscodeError,
    UploadError,
};
pub use library::{DirectoryLibrary, MediaLibrary};
pub use pipeline::{RunControl, RunOptions, RunOutcome, UploadOrchestrator, export_clip};
pub use target::UploadTargetClient;
pub use transcode::{EncodePreset, FfmpegTranscoder, FfprobeProbe, MediaProbe, MediaTranscoder};
pub use types::{
    MediaAsset, RunReport, RunSource, RunStage, RunState, TimeRange, TranscodedFile,
    UploadCredentials, UploadTarget,
};
pub use upload::{ChunkedUploader, UploadReceipt};
