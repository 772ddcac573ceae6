//! Bounded post archive
//!
//! Keeps the most recent posts, newest first, in a single JSON array file.
//! Every mutation rewrites the whole file; the bound keeps that cheap.

mod format;
mod post;

pub use post::{MediaType, Post, SourceMessage};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::error::{Result, StorageError};
use crate::events::{ArchiveEvent, EventBus};
use crate::fsutil;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageStats {
    pub total_posts: usize,
    pub file_size: u64,
    pub last_modified: Option<DateTime<Utc>>,
    pub file_path: String,
}

pub struct PostArchive {
    path: PathBuf,
    max_posts: usize,
    event_bus: EventBus,
    /// Held across every load, modify and save cycle within this process
    write_lock: Mutex<()>,
}

impl PostArchive {
    pub fn new(path: impl Into<PathBuf>, max_posts: usize, event_bus: EventBus) -> Self {
        Self {
            path: path.into(),
            max_posts,
            event_bus,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the storage directory and an empty archive if they are missing.
    pub async fn init_storage(&self) -> Result<()> {
        self.ensure_storage().await.map_err(|e| {
            error!("Failed to initialize post storage: {}", e);
            e
        })
    }

    async fn ensure_storage(&self) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            if !fs::try_exists(dir).await.unwrap_or(false) {
                fs::create_dir_all(dir)
                    .await
                    .map_err(|e| StorageError::io(dir, e))?;
                info!("Data directory created: {}", dir.display());
            }
        }

        let created = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
            .await;
        match created {
            Ok(mut file) => {
                file.write_all(b"[]")
                    .await
                    .map_err(|e| StorageError::io(&self.path, e))?;
                info!("Posts file created: {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
            Err(e) => Err(StorageError::io(&self.path, e)),
        }
    }

    /// Read the archive, surfacing any failure.
    pub async fn try_load_posts(&self) -> Result<Vec<Post>> {
        self.init_storage().await?;

        let contents = fs::read_to_string(&self.path)
            .await
            .map_err(|e| StorageError::io(&self.path, e))?;

        serde_json::from_str(&contents).map_err(|e| StorageError::Corrupt {
            path: self.path.clone(),
            reason: e.to_string(),
        })
    }

    /// Read the archive. Failures are logged and read as an empty archive.
    pub async fn load_posts(&self) -> Vec<Post> {
        match self.try_load_posts().await {
            Ok(posts) => {
                info!("Posts loaded from storage ({})", posts.len());
                posts
            }
            Err(e) => {
                error!("Failed to load posts: {}", e);
                Vec::new()
            }
        }
    }

    /// Replace the archive with the first `max_posts` of `posts`.
    pub async fn save_posts(&self, posts: &[Post]) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.write_posts(posts).await
    }

    /// Insert `post` at the front, evicting the oldest beyond the bound.
    ///
    /// An archive that cannot be read is left untouched and the error returned.
    pub async fn add_post(&self, post: Post) -> Result<Vec<Post>> {
        let posts = {
            let _guard = self.write_lock.lock().await;

            let mut posts = self.try_load_posts().await.map_err(|e| {
                error!("Failed to add post, archive unreadable: {}", e);
                e
            })?;
            posts.insert(0, post.clone());
            posts.truncate(self.max_posts);

            self.write_posts(&posts).await?;
            posts
        };

        info!(
            "Post added to storage (total={}, has_media={})",
            posts.len(),
            post.has_media()
        );
        self.event_bus.publish(ArchiveEvent::PostAdded { post });

        Ok(posts)
    }

    /// Post count, size and modification time of the archive.
    ///
    /// An unreadable archive counts as zero posts. Zero-valued when the file
    /// itself cannot be inspected.
    pub async fn storage_stats(&self) -> StorageStats {
        let file_path = self.path.display().to_string();
        let total_posts = self.load_posts().await.len();

        match fs::metadata(&self.path).await {
            Ok(meta) => StorageStats {
                total_posts,
                file_size: meta.len(),
                last_modified: meta.modified().ok().map(DateTime::<Utc>::from),
                file_path,
            },
            Err(e) => {
                error!("Failed to get storage stats: {}", StorageError::io(&self.path, e));
                StorageStats {
                    total_posts: 0,
                    file_size: 0,
                    last_modified: None,
                    file_path,
                }
            }
        }
    }

    async fn write_posts(&self, posts: &[Post]) -> Result<()> {
        self.init_storage().await?;

        let to_save = &posts[..posts.len().min(self.max_posts)];
        if let Err(e) = fsutil::write_json(&self.path, to_save).await {
            error!("Failed to save {} posts: {}", posts.len(), e);
            return Err(e);
        }

        info!("Posts saved to storage ({})", to_save.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::sync::Arc;
    use tokio::sync::broadcast;

    fn archive_in(dir: &Path) -> PostArchive {
        let (tx, _) = broadcast::channel(16);
        PostArchive::new(dir.join("data/telegram-posts.json"), 50, EventBus::new(tx))
    }

    fn post(n: i64) -> Post {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Post::new(format!("post {}", n), base + Duration::minutes(n)).with_message_id(n)
    }

    #[tokio::test]
    async fn init_storage_creates_an_empty_archive_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let archive = archive_in(dir.path());

        archive.init_storage().await.unwrap();
        assert_eq!(std::fs::read_to_string(archive.path()).unwrap(), "[]");

        archive.save_posts(&[post(1)]).await.unwrap();
        archive.init_storage().await.unwrap();
        assert_eq!(archive.load_posts().await, vec![post(1)]);
    }

    #[tokio::test]
    async fn archive_keeps_the_newest_posts_first() {
        let dir = tempfile::tempdir().unwrap();
        let archive = archive_in(dir.path());

        let mut last = Vec::new();
        for n in 0..60 {
            last = archive.add_post(post(n)).await.unwrap();
        }

        let expected: Vec<Post> = (10..60).rev().map(post).collect();
        assert_eq!(last, expected);
        assert_eq!(archive.load_posts().await, expected);
    }

    #[tokio::test]
    async fn save_then_load_is_lossless_under_the_bound() {
        let dir = tempfile::tempdir().unwrap();
        let archive = archive_in(dir.path());
        let posts: Vec<Post> = (0..50)
            .map(|n| {
                let p = post(n);
                if n % 2 == 0 {
                    p.with_media(format!("/media/photos/{}.jpg", n), MediaType::Photo)
                } else {
                    p
                }
            })
            .collect();

        archive.save_posts(&posts).await.unwrap();
        let loaded = archive.load_posts().await;
        archive.save_posts(&loaded).await.unwrap();

        assert_eq!(archive.load_posts().await, posts);
    }

    #[tokio::test]
    async fn save_truncates_to_the_bound() {
        let dir = tempfile::tempdir().unwrap();
        let archive = archive_in(dir.path());
        let posts: Vec<Post> = (0..70).map(post).collect();

        archive.save_posts(&posts).await.unwrap();

        assert_eq!(archive.load_posts().await, posts[..50].to_vec());
    }

    #[tokio::test]
    async fn unreadable_archive_loads_empty_but_is_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let archive = archive_in(dir.path());
        archive.init_storage().await.unwrap();
        std::fs::write(archive.path(), "{ broken").unwrap();

        assert!(archive.load_posts().await.is_empty());
        let err = archive.add_post(post(1)).await.unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { .. }));
        assert_eq!(std::fs::read_to_string(archive.path()).unwrap(), "{ broken");
    }

    #[tokio::test]
    async fn concurrent_adds_lose_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let archive = Arc::new(archive_in(dir.path()));

        let handles: Vec<_> = (0..20)
            .map(|n| {
                let archive = archive.clone();
                tokio::spawn(async move { archive.add_post(post(n)).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let mut ids: Vec<i64> = archive
            .load_posts()
            .await
            .into_iter()
            .filter_map(|p| p.message_id)
            .collect();
        ids.sort();
        assert_eq!(ids, (0..20).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn added_posts_are_broadcast() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, mut rx) = broadcast::channel(16);
        let archive = PostArchive::new(dir.path().join("posts.json"), 50, EventBus::new(tx));

        archive.add_post(post(3)).await.unwrap();

        let event = rx.recv().await.unwrap();
        match &*event {
            ArchiveEvent::PostAdded { post: added } => assert_eq!(added, &post(3)),
        }
    }

    #[tokio::test]
    async fn storage_stats_reports_file_details() {
        let dir = tempfile::tempdir().unwrap();
        let archive = archive_in(dir.path());
        archive.add_post(post(1)).await.unwrap();
        archive.add_post(post(2)).await.unwrap();

        let stats = archive.storage_stats().await;
        assert_eq!(stats.total_posts, 2);
        assert!(stats.file_size > 0);
        assert!(stats.last_modified.is_some());
        assert_eq!(stats.file_path, archive.path().display().to_string());
    }

    #[tokio::test]
    async fn storage_stats_of_an_unreadable_archive_keeps_file_details() {
        let dir = tempfile::tempdir().unwrap();
        let archive = archive_in(dir.path());
        archive.init_storage().await.unwrap();
        std::fs::write(archive.path(), "not json").unwrap();

        let stats = archive.storage_stats().await;
        assert_eq!(stats.total_posts, 0);
        assert_eq!(stats.file_size, 8);
        assert!(stats.last_modified.is_some());
    }

    #[tokio::test]
    async fn storage_stats_falls_back_to_zero_when_the_file_is_unreachable() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the data directory should be
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "x").unwrap();
        let (tx, _) = broadcast::channel(16);
        let archive = PostArchive::new(blocker.join("posts.json"), 50, EventBus::new(tx));

        let stats = archive.storage_stats().await;
        assert_eq!(stats.total_posts, 0);
        assert_eq!(stats.file_size, 0);
        assert_eq!(stats.last_modified, None);
        assert_eq!(stats.file_path, archive.path().display().to_string());
    }
}
