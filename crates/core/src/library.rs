use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::{fs, sync::OnceCell};
use tracing::{debug, warn};

use crate::error::LibraryError;

/// Local place finished clips can be kept in, outside the temp work dir.
#[async_trait]
pub trait MediaLibrary: Send + Sync {
    /// Whether saving is allowed. Asked once, the answer is cached.
    async fn authorize(&self) -> bool;

    async fn save(&self, clip: &Path) -> Result<PathBuf, LibraryError>;
}

/// Library backed by a plain directory
#[derive(Debug)]
pub struct DirectoryLibrary {
    root: PathBuf,
    authorized: OnceCell<bool>,
}

impl DirectoryLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            authorized: OnceCell::new(),
        }
    }

    async fn free_path(&self, file_name: &str) -> PathBuf {
        let candidate = self.root.join(file_name);
        if !fs::try_exists(&candidate).await.unwrap_or(false) {
            return candidate;
        }

        let stem = Path::new(file_name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "clip".to_string());
        let mut n = 1;
        loop {
            let candidate = self.root.join(format!("{}-{}.mp4", stem, n));
            if !fs::try_exists(&candidate).await.unwrap_or(false) {
                return candidate;
            }
            n += 1;
        }
    }
}

#[async_trait]
impl MediaLibrary for DirectoryLibrary {
    async fn authorize(&self) -> bool {
        *self
            .authorized
            .get_or_init(|| async {
                match fs::create_dir_all(&self.root).await {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(root = %self.root.display(), error = %e, "media library not writable");
                        false
                    }
                }
            })
            .await
    }

    async fn save(&self, clip: &Path) -> Result<PathBuf, LibraryError> {
        if !self.authorize().await {
            return Err(LibraryError::Unauthorized);
        }

        let file_name = clip
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "clip.mp4".to_string());
        let dest = self.free_path(&file_name).await;

        fs::copy(clip, &dest).await?;
        debug!(dest = %dest.display(), "clip saved to library");
        Ok(dest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn saves_copies_without_overwriting() {
        let dir = tempfile::tempdir().unwrap();
        let clip = dir.path().join("clip-1.mp4");
        fs::write(&clip, b"one").await.unwrap();

        let library = DirectoryLibrary::new(dir.path().join("library"));
        assert!(library.authorize().await);

        let first = library.save(&clip).await.unwrap();
        let second = library.save(&clip).await.unwrap();

        assert_ne!(first, second);
        assert_eq!(fs::read(&first).await.unwrap(), b"one");
        assert_eq!(second.file_name().unwrap(), "clip-1-1.mp4");
        assert!(clip.exists());
    }

    #[tokio::test]
    async fn unwritable_root_is_unauthorized() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, b"x").await.unwrap();

        let library = DirectoryLibrary::new(blocker.join("library"));
        assert!(!library.authorize().await);

        let err = library.save(&blocker).await.unwrap_err();
        assert!(matches!(err, LibraryError::Unauthorized));
    }
}
