use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use clipup_core::{
    Config, DirectoryLibrary, EncodePreset, FfmpegTranscoder, FfprobeProbe, LocalDirs,
    MediaAsset, MediaProbe, RunControl, RunOutcome, RunSource, TimeRange, TranscodeError,
    UploadOrchestrator, export_clip,
};
use console::style;
use tracing_subscriber::EnvFilter;

use crate::ui::{
    create_spinner, fail, format_bytes, format_duration, ok, print_banner, print_error,
    state_message,
};

mod ui;

/// CLI wrapper for EncodePreset (needed for clap ValueEnum)
#[derive(Clone, Copy, Default, ValueEnum)]
enum CliPreset {
    #[default]
    Highest,
    Medium,
}

impl From<CliPreset> for EncodePreset {
    fn from(cli: CliPreset) -> Self {
        match cli {
            CliPreset::Highest => EncodePreset::HighestQuality,
            CliPreset::Medium => EncodePreset::Medium,
        }
    }
}

#[derive(Parser)]
#[command(name = "clipup")]
#[command(about = "Trim and transcode a video with ffmpeg, then upload it to a hosted video API")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Transcode a clip and upload it
    Upload {
        #[command(flatten)]
        clip: ClipArgs,

        /// Also keep a copy of the clip in the local media library
        #[arg(long)]
        save: bool,

        /// Leave the transcoded file in the work dir after the run
        #[arg(long)]
        keep: bool,
    },

    /// Transcode a clip into the local media library without uploading
    Save {
        #[command(flatten)]
        clip: ClipArgs,
    },

    /// Ask the API to ingest a sample video from a URL
    SelfTest,

    /// Print the duration of a media file
    Probe {
        file: PathBuf,
    },
}

#[derive(Args)]
struct ClipArgs {
    /// Source video file
    file: PathBuf,

    /// Clip start in seconds
    #[arg(short, long)]
    start: Option<f64>,

    /// Clip end in seconds. Defaults to the end of the video.
    #[arg(short, long)]
    end: Option<f64>,

    /// Upper bound on the clip length in seconds
    #[arg(long)]
    max_duration: Option<f64>,

    /// Encoding preset
    #[arg(short, long, default_value = "highest")]
    preset: CliPreset,
}

/// Range asked for on the command line. `None` means the whole video.
fn requested_range(
    start: Option<f64>,
    end: Option<f64>,
    duration: f64,
) -> Result<Option<TimeRange>, TranscodeError> {
    match (start, end) {
        (None, None) => Ok(None),
        (start, end) => TimeRange::new(start.unwrap_or(0.0), end.unwrap_or(duration)).map(Some),
    }
}

fn init_tracing() {
    // Default to warnings only so log lines don't tear through the spinner
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config() -> Config {
    match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            print_error(e);
            std::process::exit(1);
        }
    }
}

async fn probe_asset(file: &Path) -> Result<MediaAsset> {
    let spinner = create_spinner("Probing source...");
    match FfprobeProbe.probe(file).await {
        Ok(asset) => {
            spinner.finish_with_message(ok(format!(
                "Source: {} {}",
                style(file.display()).dim(),
                style(format!("[{:.1}s]", asset.duration)).dim()
            )));
            Ok(asset)
        }
        Err(e) => {
            spinner.finish_with_message(fail("Probe failed"));
            Err(e.into())
        }
    }
}

/// Drive one run with a spinner that follows the run state. Ctrl-C cancels.
async fn drive(
    orchestrator: &UploadOrchestrator,
    source: RunSource,
    control: &RunControl,
) -> RunOutcome {
    let spinner = create_spinner("Starting...");

    let mut states = control.subscribe();
    let watcher = {
        let spinner = spinner.clone();
        tokio::spawn(async move {
            while states.changed().await.is_ok() {
                let state = *states.borrow_and_update();
                if let Some(msg) = state_message(state) {
                    spinner.set_message(msg);
                }
            }
        })
    };

    let cancel = control.cancellation_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let outcome = orchestrator.run(source, control).await;

    interrupt.abort();
    watcher.abort();

    match &outcome {
        Ok(report) => spinner.finish_with_message(ok(format!(
            "Done {}",
            style(format!("[{}]", format_duration(report.elapsed))).dim()
        ))),
        Err(e) if e.is_cancelled() => {
            spinner.finish_with_message(fail(format!("Cancelled while {}", e.stage())))
        }
        Err(e) => spinner.finish_with_message(fail(format!("Failed while {}", e.stage()))),
    }

    outcome
}

async fn upload(clip: ClipArgs, save: bool, keep: bool) -> Result<()> {
    let config = load_config();
    print_banner("Upload");

    let asset = probe_asset(&clip.file).await?;
    let range = requested_range(clip.start, clip.end, asset.duration)?;

    let transcoder = Arc::new(FfmpegTranscoder::new(clip.preset.into()));
    let mut orchestrator = UploadOrchestrator::new(&config, transcoder)?
        .keep_artifacts(keep)
        .max_clip_seconds(clip.max_duration);
    if save {
        orchestrator =
            orchestrator.with_library(Arc::new(DirectoryLibrary::new(&config.library_dir)));
    }

    let control = RunControl::new();
    let report = drive(&orchestrator, RunSource::Asset { asset, range }, &control).await?;

    println!("{}", style("─".repeat(60)).dim());
    if let Some(range) = report.range {
        println!("  {} {}", style("Clip:").bold(), range);
    }
    println!(
        "  {} {}",
        style("Uploaded:").bold(),
        format_bytes(report.bytes_uploaded)
    );
    if let Some(asset_id) = &report.asset_id {
        println!("  {} {}", style("Upload id:").bold(), asset_id);
    }
    if let Some(artifact) = &report.artifact {
        println!("  {} {}", style("Kept:").bold(), artifact.display());
    }
    if save {
        println!(
            "  {} {}",
            style("Library:").bold(),
            config.library_dir.display()
        );
    }

    Ok(())
}

async fn save(clip: ClipArgs) -> Result<()> {
    let LocalDirs {
        work_dir,
        library_dir,
    } = LocalDirs::from_env();
    print_banner("Save");

    let asset = probe_asset(&clip.file).await?;
    let range = requested_range(clip.start, clip.end, asset.duration)?;

    let transcoder = FfmpegTranscoder::new(clip.preset.into());
    let library = DirectoryLibrary::new(library_dir);
    let control = RunControl::new();
    let cancel = control.cancellation_token();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let started = Instant::now();
    let spinner = create_spinner("Transcoding clip...");
    let saved = export_clip(
        &transcoder,
        &library,
        &asset,
        range,
        clip.max_duration,
        &work_dir,
        &cancel,
    )
    .await;
    interrupt.abort();

    match saved {
        Ok(path) => {
            spinner.finish_with_message(ok(format!(
                "Saved: {} {}",
                style(path.display()).dim(),
                style(format!("[{}]", format_duration(started.elapsed()))).dim()
            )));
            Ok(())
        }
        Err(e) => {
            spinner.finish_with_message(fail("Save failed"));
            Err(e.into())
        }
    }
}

async fn self_test() -> Result<()> {
    let config = load_config();
    print_banner("Self-test");
    println!(
        "{} Input: {}",
        style("•").cyan(),
        style(&config.self_test_input).dim()
    );

    let transcoder = Arc::new(FfmpegTranscoder::default());
    let orchestrator = UploadOrchestrator::new(&config, transcoder)?;
    let control = RunControl::new();
    let report = drive(&orchestrator, RunSource::SelfTest, &control).await?;

    if let Some(asset_id) = &report.asset_id {
        println!("  {} {}", style("Asset:").bold(), asset_id);
    }
    Ok(())
}

async fn probe(file: PathBuf) -> Result<()> {
    let asset = FfprobeProbe.probe(&file).await?;
    println!("{}\t{:.3}", asset.path.display(), asset.duration);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    let result = match cli.command {
        Command::Upload { clip, save: keep_copy, keep } => upload(clip, keep_copy, keep).await,
        Command::Save { clip } => save(clip).await,
        Command::SelfTest => self_test().await,
        Command::Probe { file } => probe(file).await,
    };

    if let Err(e) = result {
        print_error(format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn no_bounds_means_whole_video() {
        assert!(requested_range(None, None, 10.0).unwrap().is_none());
    }

    #[test]
    fn open_ended_ranges_fill_in_from_the_video() {
        let from = requested_range(Some(2.0), None, 10.0).unwrap().unwrap();
        assert_eq!((from.start(), from.end()), (2.0, 10.0));

        let until = requested_range(None, Some(4.0), 10.0).unwrap().unwrap();
        assert_eq!((until.start(), until.end()), (0.0, 4.0));
    }

    #[test]
    fn reversed_range_is_rejected() {
        assert!(matches!(
            requested_range(Some(6.0), Some(2.0), 10.0),
            Err(TranscodeError::InvalidRange { .. })
        ));
    }

    #[test]
    fn parses_upload_flags() {
        let cli = Cli::try_parse_from([
            "clipup", "upload", "in.mov", "--start", "1.5", "--end", "4", "--preset", "medium",
            "--save", "--keep",
        ])
        .unwrap();
        let Command::Upload { clip, save, keep } = cli.command else {
            panic!("expected upload");
        };
        assert_eq!(clip.file, PathBuf::from("in.mov"));
        assert_eq!(clip.start, Some(1.5));
        assert_eq!(clip.end, Some(4.0));
        assert!(matches!(clip.preset, CliPreset::Medium));
        assert!(save && keep);
    }
}
