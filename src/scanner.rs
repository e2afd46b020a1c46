//! Recursive directory scanner.
//!
//! Walks a subtree of the effective root, classifies entries against a
//! fixed extension allow-list, fingerprints each video file, and merges
//! in metadata from the configured provider. Partial results always win
//! over total failure: an unreadable directory contributes nothing and a
//! failed lookup produces an unenriched record.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, join_all};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::media::{self, VideoDetails, VideoRecord};
use crate::providers::MetadataProvider;

/// Video files are recognized strictly by extension.
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "avi", "mov"];

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("directory does not exist: {0}")]
    RootNotFound(PathBuf),

    #[error("path is not a directory: {0}")]
    NotADirectory(PathBuf),
}

#[derive(Clone)]
pub struct VideoScanner {
    extensions: Vec<String>,
    provider: Option<Arc<dyn MetadataProvider>>,
    lookup_timeout: Duration,
    /// Bounds concurrent directory listings and metadata lookups so deep
    /// trees cannot fan out into unbounded file descriptors or requests.
    workers: Arc<Semaphore>,
}

impl VideoScanner {
    pub fn new(
        provider: Option<Arc<dyn MetadataProvider>>,
        concurrency: usize,
        lookup_timeout: Duration,
    ) -> Self {
        Self {
            extensions: VIDEO_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            provider,
            lookup_timeout,
            workers: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions;
        self
    }

    pub fn is_video_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                let ext = ext.to_lowercase();
                self.extensions.contains(&ext)
            })
            .unwrap_or(false)
    }

    /// Scan `root/subpath` recursively, returning one flat record list.
    ///
    /// Relative paths in the result are always rooted at `root` (they
    /// include the `subpath` prefix), so callers can resolve any record
    /// against the effective root directly.
    pub async fn scan(&self, root: &Path, subpath: &str) -> Result<Vec<VideoRecord>, ScanError> {
        let subpath = subpath.trim_matches('/');
        let base = if subpath.is_empty() {
            root.to_path_buf()
        } else {
            root.join(subpath)
        };

        let metadata = tokio::fs::metadata(&base)
            .await
            .map_err(|_| ScanError::RootNotFound(base.clone()))?;
        if !metadata.is_dir() {
            return Err(ScanError::NotADirectory(base));
        }

        info!(path = %base.display(), "starting media scan");
        let records = self.scan_dir(base, subpath.to_string()).await;
        info!(videos = records.len(), "scan complete");
        Ok(records)
    }

    /// Recurse into one directory. Sibling subtrees and per-file work are
    /// joined concurrently; results merge into a single flat sequence.
    fn scan_dir(&self, dir: PathBuf, rel: String) -> BoxFuture<'_, Vec<VideoRecord>> {
        async move {
            // Hold a worker permit only while listing, never across the
            // recursion, otherwise nested directories would deadlock on
            // the semaphore.
            let entries = {
                let _permit = self.workers.acquire().await.ok();
                let mut reader = match tokio::fs::read_dir(&dir).await {
                    Ok(reader) => reader,
                    Err(e) => {
                        warn!(
                            path = %dir.display(),
                            error = %e,
                            "directory not accessible, skipping subtree"
                        );
                        return Vec::new();
                    }
                };

                let mut entries = Vec::new();
                loop {
                    match reader.next_entry().await {
                        Ok(Some(entry)) => entries.push(entry),
                        Ok(None) => break,
                        Err(e) => {
                            warn!(path = %dir.display(), error = %e, "error reading directory entry");
                            break;
                        }
                    }
                }
                entries
            };

            let mut subtree_futures = Vec::new();
            let mut file_futures = Vec::new();

            for entry in entries {
                let name = entry.file_name().to_string_lossy().into_owned();
                let file_type = match entry.file_type().await {
                    Ok(file_type) => file_type,
                    Err(e) => {
                        warn!(path = %entry.path().display(), error = %e, "unreadable entry, skipping");
                        continue;
                    }
                };

                let child_rel = if rel.is_empty() {
                    name.clone()
                } else {
                    format!("{rel}/{name}")
                };

                if file_type.is_dir() {
                    subtree_futures.push(self.scan_dir(entry.path(), child_rel));
                } else if self.is_video_file(Path::new(&name)) {
                    file_futures.push(self.process_file(entry.path(), child_rel));
                } else {
                    debug!(path = %entry.path().display(), "skipping non-video entry");
                }
            }

            let (subtrees, files) =
                futures::join!(join_all(subtree_futures), join_all(file_futures));

            let mut records: Vec<VideoRecord> = files.into_iter().flatten().collect();
            for subtree in subtrees {
                records.extend(subtree);
            }
            records
        }
        .boxed()
    }

    /// Build the record for one video file. Any stat failure excludes the
    /// file; an enrichment failure only drops the details.
    async fn process_file(&self, path: PathBuf, relative_path: String) -> Option<VideoRecord> {
        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unreadable video file, excluding");
                return None;
            }
        };
        let modified: DateTime<Utc> = match metadata.modified() {
            Ok(modified) => modified.into(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "modification time unavailable, excluding");
                return None;
            }
        };

        let size = metadata.len();
        let file_name = relative_path.rsplit('/').next().unwrap_or(&relative_path);
        let title = media::title_from_file_name(file_name);
        let fingerprint = media::fingerprint(&relative_path, size, modified);
        let details = self.enrich(&title).await;

        debug!(
            path = %relative_path,
            size,
            enriched = details.is_some(),
            "found video file"
        );

        Some(VideoRecord {
            relative_path,
            title,
            size_label: media::format_size(size),
            last_modified: modified,
            fingerprint,
            details,
            scanned_at: Utc::now(),
        })
    }

    async fn enrich(&self, title: &str) -> Option<VideoDetails> {
        let provider = self.provider.as_ref()?;
        let _permit = self.workers.acquire().await.ok();

        match tokio::time::timeout(self.lookup_timeout, provider.lookup(title)).await {
            Ok(Ok(details)) => Some(details),
            Ok(Err(e)) => {
                debug!(title, provider = provider.name(), error = %e, "metadata lookup failed, continuing unenriched");
                None
            }
            Err(_) => {
                warn!(title, provider = provider.name(), timeout = ?self.lookup_timeout, "metadata lookup timed out");
                None
            }
        }
    }
}

impl std::fmt::Debug for VideoScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoScanner")
            .field("extensions", &self.extensions)
            .field("lookup_timeout", &self.lookup_timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProviderError;
    use async_trait::async_trait;
    use std::fs;
    use tempfile::TempDir;

    struct StubProvider;

    #[async_trait]
    impl MetadataProvider for StubProvider {
        async fn lookup(&self, _title: &str) -> Result<VideoDetails, ProviderError> {
            Ok(VideoDetails {
                year: Some("2010".to_string()),
                ..VideoDetails::default()
            })
        }

        fn name(&self) -> &'static str {
            "stub"
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl MetadataProvider for FailingProvider {
        async fn lookup(&self, _title: &str) -> Result<VideoDetails, ProviderError> {
            Err(ProviderError::NotFound)
        }

        fn name(&self) -> &'static str {
            "failing"
        }
    }

    struct SlowProvider;

    #[async_trait]
    impl MetadataProvider for SlowProvider {
        async fn lookup(&self, _title: &str) -> Result<VideoDetails, ProviderError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(VideoDetails::default())
        }

        fn name(&self) -> &'static str {
            "slow"
        }
    }

    fn scanner() -> VideoScanner {
        VideoScanner::new(None, 4, Duration::from_secs(1))
    }

    fn sorted_paths(records: &[VideoRecord]) -> Vec<String> {
        let mut paths: Vec<String> = records.iter().map(|r| r.relative_path.clone()).collect();
        paths.sort();
        paths
    }

    #[test]
    fn test_is_video_file() {
        let scanner = scanner();
        assert!(scanner.is_video_file(Path::new("movie.mp4")));
        assert!(scanner.is_video_file(Path::new("MOVIE.MKV")));
        assert!(scanner.is_video_file(Path::new("clip.avi")));
        assert!(scanner.is_video_file(Path::new("clip.mov")));
        assert!(!scanner.is_video_file(Path::new("poster.jpg")));
        assert!(!scanner.is_video_file(Path::new("clip.webm")));
        assert!(!scanner.is_video_file(Path::new("no_extension")));
    }

    #[tokio::test]
    async fn test_scan_finds_nested_videos_and_skips_others() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.mp4"), b"a").unwrap();
        fs::write(temp.path().join("notes.txt"), b"n").unwrap();
        fs::create_dir_all(temp.path().join("shows/season1")).unwrap();
        fs::write(temp.path().join("shows/season1/ep1.MKV"), b"e").unwrap();
        fs::write(temp.path().join("shows/cover.png"), b"p").unwrap();

        let records = scanner().scan(temp.path(), "").await.unwrap();
        assert_eq!(
            sorted_paths(&records),
            vec!["a.mp4".to_string(), "shows/season1/ep1.MKV".to_string()]
        );

        let ep = records
            .iter()
            .find(|r| r.relative_path == "shows/season1/ep1.MKV")
            .unwrap();
        assert_eq!(ep.title, "ep1");
        assert_eq!(ep.size_label, "1 B");
        assert!(ep.details.is_none());
    }

    #[tokio::test]
    async fn test_scan_subpath_keeps_prefix_in_relative_paths() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("movies")).unwrap();
        fs::write(temp.path().join("movies/inception.mp4"), b"i").unwrap();
        fs::write(temp.path().join("root.mp4"), b"r").unwrap();

        let records = scanner().scan(temp.path(), "movies").await.unwrap();
        assert_eq!(sorted_paths(&records), vec!["movies/inception.mp4"]);
    }

    #[tokio::test]
    async fn test_scan_missing_root_is_an_error() {
        let temp = TempDir::new().unwrap();
        let result = scanner().scan(&temp.path().join("absent"), "").await;
        assert!(matches!(result, Err(ScanError::RootNotFound(_))));
    }

    #[tokio::test]
    async fn test_scan_file_as_root_is_an_error() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.mp4"), b"a").unwrap();
        let result = scanner().scan(&temp.path().join("a.mp4"), "").await;
        assert!(matches!(result, Err(ScanError::NotADirectory(_))));
    }

    #[tokio::test]
    async fn test_scan_is_deterministic_for_unchanged_tree() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.mp4"), b"aaaa").unwrap();

        let first = scanner().scan(temp.path(), "").await.unwrap();
        let second = scanner().scan(temp.path(), "").await.unwrap();
        assert_eq!(first[0].fingerprint, second[0].fingerprint);
        assert_eq!(first[0].relative_path, second[0].relative_path);
    }

    #[tokio::test]
    async fn test_enrichment_success_merges_details() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("inception.mp4"), b"i").unwrap();

        let scanner = VideoScanner::new(Some(Arc::new(StubProvider)), 4, Duration::from_secs(1));
        let records = scanner.scan(temp.path(), "").await.unwrap();
        let details = records[0].details.as_ref().unwrap();
        assert_eq!(details.year.as_deref(), Some("2010"));
    }

    #[tokio::test]
    async fn test_enrichment_failure_degrades_to_unenriched() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("obscure.mp4"), b"o").unwrap();

        let scanner = VideoScanner::new(Some(Arc::new(FailingProvider)), 4, Duration::from_secs(1));
        let records = scanner.scan(temp.path(), "").await.unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].details.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_enrichment_timeout_degrades_to_unenriched() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("stall.mp4"), b"s").unwrap();

        let scanner = VideoScanner::new(Some(Arc::new(SlowProvider)), 4, Duration::from_secs(2));
        let records = scanner.scan(temp.path(), "").await.unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].details.is_none());
    }
}
