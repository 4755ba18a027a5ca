//! JSON file persistence for the offline post queue.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use perch_core::QueueStore;
use perch_domain::{PerchError, QueuedPost, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Queue file format version.
const QUEUE_FORMAT_VERSION: u32 = 1;

/// On-disk envelope for the persisted queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct QueueFile {
    version: u32,
    saved_at: DateTime<Utc>,
    posts: Vec<QueuedPost>,
}

/// Queue persistence backed by a JSON file.
///
/// Writes go to a sibling temp file and are swapped in with an atomic
/// rename, so a crash mid-write leaves the previous file intact.
#[derive(Debug, Clone)]
pub struct JsonQueueStore {
    path: PathBuf,
}

impl JsonQueueStore {
    /// Create a store persisting to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn file_error(action: &str, path: &Path, err: std::io::Error) -> PerchError {
    PerchError::Store(format!("{action} {} failed: {err}", path.display()))
}

#[async_trait]
impl QueueStore for JsonQueueStore {
    async fn load(&self) -> Result<Vec<QueuedPost>> {
        let raw = match fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no queue file, starting empty");
                return Ok(Vec::new());
            }
            Err(err) => return Err(file_error("reading", &self.path, err)),
        };

        let file: QueueFile = match serde_json::from_slice(&raw) {
            Ok(file) => file,
            Err(err) => {
                warn!(
                    path = %self.path.display(),
                    error = %err,
                    "queue file is malformed, starting empty"
                );
                return Ok(Vec::new());
            }
        };

        if file.version != QUEUE_FORMAT_VERSION {
            warn!(
                expected = QUEUE_FORMAT_VERSION,
                found = file.version,
                "queue file version mismatch"
            );
        }

        debug!(count = file.posts.len(), "loaded persisted queue");
        Ok(file.posts)
    }

    async fn save(&self, posts: &[QueuedPost]) -> Result<()> {
        let file = QueueFile {
            version: QUEUE_FORMAT_VERSION,
            saved_at: Utc::now(),
            posts: posts.to_vec(),
        };
        let data = serde_json::to_vec_pretty(&file)
            .map_err(|err| PerchError::Store(format!("serializing queue failed: {err}")))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|err| file_error("creating directory", parent, err))?;
            }
        }

        let temp_path = self.path.with_extension("tmp");
        let mut handle = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .await
            .map_err(|err| file_error("opening", &temp_path, err))?;
        handle
            .write_all(&data)
            .await
            .map_err(|err| file_error("writing", &temp_path, err))?;
        handle
            .sync_all()
            .await
            .map_err(|err| file_error("flushing", &temp_path, err))?;
        drop(handle);

        fs::rename(&temp_path, &self.path)
            .await
            .map_err(|err| file_error("replacing", &self.path, err))?;

        debug!(count = file.posts.len(), "persisted queue");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_post(text: &str) -> QueuedPost {
        QueuedPost::new(text, Utc::now())
    }

    #[tokio::test]
    async fn round_trips_posts_through_disk() {
        let dir = TempDir::new().unwrap();
        let store = JsonQueueStore::new(dir.path().join("queue.json"));

        let posts = vec![sample_post("first"), sample_post("second")];
        store.save(&posts).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].text, "first");
        assert_eq!(loaded[1].text, "second");
        assert_eq!(loaded[0].id, posts[0].id);
    }

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let store = JsonQueueStore::new(dir.path().join("absent.json"));

        let loaded = store.load().await.unwrap();
        assert!(loaded.is_empty());
    }

    #[tokio::test]
    async fn malformed_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("queue.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = JsonQueueStore::new(&path);
        let loaded = store.load().await.unwrap();
        assert!(loaded.is_empty());
    }

    #[tokio::test]
    async fn save_replaces_previous_contents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("queue.json");
        let store = JsonQueueStore::new(&path);

        store.save(&[sample_post("old")]).await.unwrap();
        store.save(&[sample_post("new")]).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].text, "new");
        assert!(!path.with_extension("tmp").exists());
    }

    #[tokio::test]
    async fn save_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("deep").join("queue.json");
        let store = JsonQueueStore::new(&path);

        store.save(&[sample_post("hello")]).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.len(), 1);
    }

    #[tokio::test]
    async fn future_version_still_loads_posts() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("queue.json");
        let store = JsonQueueStore::new(&path);

        store.save(&[sample_post("kept")]).await.unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        let bumped = raw.replace("\"version\": 1", "\"version\": 2");
        std::fs::write(&path, bumped).unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.len(), 1);
    }
}
