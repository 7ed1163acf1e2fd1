//! Temp-artifact area.
//!
//! Files produced around run results (downloaded images, generated
//! documents) are staged on disk under a per-tag subdirectory, attached
//! to the outbound message, then cleaned up on session teardown.

use std::path::{Path, PathBuf};
use tokio::fs;

/// Process-wide staging area for transient files, keyed by interaction tag.
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn tag_dir(&self, tag: &str) -> PathBuf {
        self.root.join(tag)
    }

    /// Write one artifact. The name is reduced to its final path
    /// component so a provider-supplied filename cannot escape the tag
    /// directory.
    pub async fn store(&self, tag: &str, name: &str, bytes: &[u8]) -> anyhow::Result<PathBuf> {
        let dir = self.tag_dir(tag);
        fs::create_dir_all(&dir).await?;

        let file_name = Path::new(name)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "artifact".to_string());

        let path = dir.join(file_name);
        fs::write(&path, bytes).await?;
        tracing::debug!(tag = %tag, path = %path.display(), "Stored artifact");
        Ok(path)
    }

    /// All artifacts staged under a tag, sorted by name.
    pub async fn collect(&self, tag: &str) -> anyhow::Result<Vec<PathBuf>> {
        let dir = self.tag_dir(tag);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                paths.push(entry.path());
            }
        }
        paths.sort();
        Ok(paths)
    }

    /// Remove everything staged under a tag. Idempotent: an absent
    /// directory is not an error.
    pub async fn cleanup(&self, tag: &str) -> anyhow::Result<()> {
        match fs::remove_dir_all(self.tag_dir(tag)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
