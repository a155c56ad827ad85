use std::time::Duration;

use clipup_core::RunState;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 59.95 {
        return format!("{:.1}s", secs);
    }
    let whole = secs.round() as u64;
    format!("{}m {}s", whole / 60, whole % 60)
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

pub fn create_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(template) = ProgressStyle::default_spinner()
        .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
        .template("{spinner:.cyan} {msg}")
    {
        pb.set_style(template);
    }
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn state_message(state: RunState) -> Option<&'static str> {
    match state {
        RunState::Idle => Some("Starting..."),
        RunState::Transcoding => Some("Transcoding clip..."),
        RunState::RequestingTarget => Some("Requesting upload URL..."),
        RunState::Uploading => Some("Uploading..."),
        RunState::Succeeded | RunState::Failed => None,
    }
}

pub fn print_banner(subtitle: &str) {
    println!(
        "\n{}  {}\n",
        style("clipup").cyan().bold(),
        style(subtitle).dim()
    );
}

pub fn ok(msg: impl AsRef<str>) -> String {
    format!("{} {}", style("✓").green().bold(), msg.as_ref())
}

pub fn fail(msg: impl AsRef<str>) -> String {
    format!("{} {}", style("✗").red().bold(), msg.as_ref())
}

pub fn print_error(err: impl std::fmt::Display) {
    eprintln!("{} {}", style("Error:").red().bold(), err);
}
