use std::{
    future::Future,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Instant,
};

use serde_json::Value;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::{
    cache::get_run_output_path,
    config::Config,
    error::{ConfigError, ExportError, Result, RunError},
    library::MediaLibrary,
    target::UploadTargetClient,
    transcode::{MediaTranscoder, remove_stale_output},
    types::{
        MediaAsset, RunReport, RunSource, RunStage, RunState, TimeRange, TranscodedFile,
        UploadCredentials, UploadTarget,
    },
    upload::ChunkedUploader,
};

pub type RunOutcome = Result<RunReport>;

/// Per-run handle: observe the state machine and cancel the stage in flight.
/// A fresh control starts at [`RunState::Idle`]. A finished one is put back
/// to `Idle` with a new token when it is handed to the next run, so tokens
/// taken from it earlier no longer reach that run.
#[derive(Debug)]
pub struct RunControl {
    cancel: Mutex<CancellationToken>,
    state: watch::Sender<RunState>,
}

impl Default for RunControl {
    fn default() -> Self {
        Self::new()
    }
}

impl RunControl {
    pub fn new() -> Self {
        let (state, _) = watch::channel(RunState::Idle);
        Self {
            cancel: Mutex::new(CancellationToken::new()),
            state,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> RunState {
        *self.state.borrow()
    }

    pub fn cancel(&self) {
        self.lock_token().cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.lock_token().clone()
    }

    /// Token for the run about to start. Only a control in a terminal state
    /// is reset; a pre-run cancel on an idle control still applies.
    fn begin(&self) -> CancellationToken {
        if self.state().is_terminal() {
            let fresh = CancellationToken::new();
            *self.lock_token() = fresh.clone();
            self.state.send_replace(RunState::Idle);
            return fresh;
        }
        self.cancellation_token()
    }

    fn lock_token(&self) -> std::sync::MutexGuard<'_, CancellationToken> {
        self.cancel
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn advance(&self, next: RunState) {
        let current = self.state();
        if current.can_advance_to(next) {
            self.state.send_replace(next);
        } else {
            warn!(?current, ?next, "ignoring illegal run state transition");
        }
    }
}

/// Runs `stage` unless the run gets cancelled first.
async fn cancellable<T, E>(
    cancel: &CancellationToken,
    stage: RunStage,
    fut: impl Future<Output = Result<T, E>>,
) -> Result<T, RunError>
where
    RunError: From<E>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(RunError::Cancelled { stage }),
        res = fut => res.map_err(RunError::from),
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub work_dir: PathBuf,
    /// Leave the transcoded file on disk after the run. It is removed when
    /// the next run of the same orchestrator starts.
    pub keep_artifacts: bool,
    pub max_clip_seconds: Option<f64>,
    pub self_test_input: String,
}

impl RunOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            work_dir: config.work_dir.clone(),
            keep_artifacts: false,
            max_clip_seconds: None,
            self_test_input: config.self_test_input.clone(),
        }
    }
}

/// Transcode, request a target, upload: one run at a time per [`RunControl`],
/// any number of runs concurrently since each writes to its own file.
pub struct UploadOrchestrator {
    transcoder: Arc<dyn MediaTranscoder>,
    targets: UploadTargetClient,
    uploader: ChunkedUploader,
    credentials: Arc<UploadCredentials>,
    library: Option<Arc<dyn MediaLibrary>>,
    options: RunOptions,
    kept_artifacts: Mutex<Vec<PathBuf>>,
}

impl UploadOrchestrator {
    pub fn new(config: &Config, transcoder: Arc<dyn MediaTranscoder>) -> Result<Self, ConfigError> {
        Ok(Self::from_parts(
            transcoder,
            UploadTargetClient::new(&config.api_url, config.request_timeout)?,
            ChunkedUploader::new(config.upload_timeout)?,
            config.credentials.clone(),
            RunOptions::from_config(config),
        ))
    }

    pub fn from_parts(
        transcoder: Arc<dyn MediaTranscoder>,
        targets: UploadTargetClient,
        uploader: ChunkedUploader,
        credentials: UploadCredentials,
        options: RunOptions,
    ) -> Self {
        Self {
            transcoder,
            targets,
            uploader,
            credentials: Arc::new(credentials),
            library: None,
            options,
            kept_artifacts: Mutex::new(Vec::new()),
        }
    }

    /// Also offer every transcoded clip to `library`. Best-effort.
    pub fn with_library(mut self, library: Arc<dyn MediaLibrary>) -> Self {
        self.library = Some(library);
        self
    }

    pub fn keep_artifacts(mut self, keep: bool) -> Self {
        self.options.keep_artifacts = keep;
        self
    }

    pub fn max_clip_seconds(mut self, seconds: Option<f64>) -> Self {
        self.options.max_clip_seconds = seconds;
        self
    }

    pub async fn run(&self, source: RunSource, control: &RunControl) -> RunOutcome {
        let run_id = Uuid::new_v4();
        let started = Instant::now();
        let cancel = control.begin();

        let result = async {
            match source {
                RunSource::Asset { asset, range } => {
                    self.run_asset(run_id, asset, range, control, &cancel).await
                }
                RunSource::SelfTest => self.run_self_test(run_id, control, &cancel).await,
            }
        }
        .instrument(info_span!("run", %run_id))
        .await;

        match result {
            Ok(mut report) => {
                control.advance(RunState::Succeeded);
                report.elapsed = started.elapsed();
                info!(%run_id, elapsed_ms = report.elapsed.as_millis() as u64, "run succeeded");
                Ok(report)
            }
            Err(e) => {
                control.advance(RunState::Failed);
                warn!(%run_id, stage = %e.stage(), error = %e, "run failed");
                Err(e)
            }
        }
    }

    async fn run_asset(
        &self,
        run_id: Uuid,
        asset: MediaAsset,
        range: Option<TimeRange>,
        control: &RunControl,
        cancel: &CancellationToken,
    ) -> RunOutcome {
        self.discard_kept_artifacts().await;
        control.advance(RunState::Transcoding);

        let range = TimeRange::resolve(range, asset.duration, self.options.max_clip_seconds)?;
        let output = get_run_output_path(&self.options.work_dir, run_id);

        let file = match self
            .transcoder
            .transcode(&asset, range, &output, cancel)
            .await
        {
            Ok(file) => file,
            Err(e) => {
                discard(&output).await;
                return Err(e.into());
            }
        };

        if let Some(library) = &self.library {
            offer_to_library(library.as_ref(), &file.path).await;
        }

        let delivered = self.deliver(&file, control, cancel).await;

        let artifact = if self.options.keep_artifacts {
            self.lock_kept().push(file.path.clone());
            Some(file.path.clone())
        } else {
            discard(&file.path).await;
            None
        };

        let (target, bytes_uploaded) = delivered?;
        Ok(RunReport {
            run_id,
            asset_id: target.asset_id.clone(),
            target: Some(target),
            bytes_uploaded,
            range: Some(file.range),
            artifact,
            elapsed: Default::default(),
        })
    }

    async fn deliver(
        &self,
        file: &TranscodedFile,
        control: &RunControl,
        cancel: &CancellationToken,
    ) -> Result<(UploadTarget, u64), RunError> {
        control.advance(RunState::RequestingTarget);
        let target = cancellable(
            cancel,
            RunStage::RequestingTarget,
            self.targets.create_target(&self.credentials),
        )
        .await?;

        control.advance(RunState::Uploading);
        let receipt = cancellable(
            cancel,
            RunStage::Uploading,
            self.uploader.push(file, &target),
        )
        .await?;

        Ok((target, receipt.bytes_sent))
    }

    async fn run_self_test(
        &self,
        run_id: Uuid,
        control: &RunControl,
        cancel: &CancellationToken,
    ) -> RunOutcome {
        control.advance(RunState::RequestingTarget);
        info!(input = %self.options.self_test_input, "self-test");

        let data = cancellable(
            cancel,
            RunStage::RequestingTarget,
            self.targets
                .create_asset_from_url(&self.credentials, &self.options.self_test_input),
        )
        .await?;

        Ok(RunReport {
            run_id,
            target: None,
            asset_id: data.get("id").and_then(Value::as_str).map(str::to_string),
            bytes_uploaded: 0,
            range: None,
            artifact: None,
            elapsed: Default::default(),
        })
    }

    /// Remove what earlier runs kept. Overlapping runs each add their own
    /// path, so every kept file is picked up by some later run.
    async fn discard_kept_artifacts(&self) {
        let previous = std::mem::take(&mut *self.lock_kept());
        for path in previous {
            discard(&path).await;
        }
    }

    fn lock_kept(&self) -> std::sync::MutexGuard<'_, Vec<PathBuf>> {
        self.kept_artifacts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

async fn discard(path: &Path) {
    if let Err(e) = remove_stale_output(path).await {
        warn!(path = %path.display(), error = %e, "can't remove run artifact");
    }
}

async fn offer_to_library(library: &dyn MediaLibrary, clip: &Path) {
    if !library.authorize().await {
        debug!("media library not authorized, skipping save");
        return;
    }
    match library.save(clip).await {
        Ok(saved) => info!(saved = %saved.display(), "clip saved to media library"),
        Err(e) => warn!(error = %e, "saving clip to media library failed"),
    }
}

/// Transcode `range` of `asset` and keep the result in `library` only,
/// without uploading. The intermediate file in `work_dir` is always removed.
pub async fn export_clip(
    transcoder: &dyn MediaTranscoder,
    library: &dyn MediaLibrary,
    asset: &MediaAsset,
    range: Option<TimeRange>,
    max_clip_seconds: Option<f64>,
    work_dir: &Path,
    cancel: &CancellationToken,
) -> Result<PathBuf, ExportError> {
    let range = TimeRange::resolve(range, asset.duration, max_clip_seconds)?;
    let output = get_run_output_path(work_dir, Uuid::new_v4());

    let saved = async {
        let file = transcoder.transcode(asset, range, &output, cancel).await?;
        Ok::<_, ExportError>(library.save(&file.path).await?)
    }
    .await;

    discard(&output).await;
    saved
}
