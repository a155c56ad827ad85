use std::path::{Path, PathBuf};

use uuid::Uuid;

/// Default directory for per-run transcode artifacts
pub fn get_root_work_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("clipup")
}

/// Default directory the media library saves clips into
pub fn get_library_dir() -> PathBuf {
    dirs::video_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("clipup")
}

/// Output path owned by a single run
pub fn get_run_output_path(work_dir: &Path, run_id: Uuid) -> PathBuf {
    work_dir.join(format!("clip-{}.mp4", run_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_paths_are_unique_per_run() {
        let dir = Path::new("/tmp/clipup");
        let a = get_run_output_path(dir, Uuid::new_v4());
        let b = get_run_output_path(dir, Uuid::new_v4());
        assert_ne!(a, b);
        assert_eq!(a.parent(), Some(dir));
        assert_eq!(a.extension().and_then(|e| e.to_str()), Some("mp4"));
    }
}
