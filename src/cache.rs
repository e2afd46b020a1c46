//! In-memory index cache.
//!
//! Holds at most one generation of scan results at a time. A generation
//! is adopted atomically and served unchanged until the freshness window
//! lapses or [`VideoIndex::invalidate`] is called. The scan-then-swap
//! sequence is guarded by a refresh mutex so concurrent callers on an
//! expired cache trigger exactly one scan; the others wait and reuse it.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::media::IndexedVideo;
use crate::mount::EffectiveRoot;
use crate::scanner::VideoScanner;

#[derive(Debug)]
struct Generation {
    videos: Arc<Vec<IndexedVideo>>,
    adopted_at: Instant,
    stale: bool,
}

/// TTL'd cache of the most recent full scan, with generation-scoped ids.
pub struct VideoIndex {
    scanner: VideoScanner,
    root: EffectiveRoot,
    ttl: Duration,
    current: RwLock<Option<Generation>>,
    /// Serializes the check-freshness/rescan/swap critical section.
    refresh: Mutex<()>,
    /// Monotonic for the process lifetime; never reused while an id is
    /// still cached.
    next_id: AtomicU64,
}

impl VideoIndex {
    pub fn new(scanner: VideoScanner, root: EffectiveRoot, ttl: Duration) -> Self {
        Self {
            scanner,
            root,
            ttl,
            current: RwLock::new(None),
            refresh: Mutex::new(()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Return the current generation, rescanning first if it is missing,
    /// stale, or expired. Never fails: a scan error falls back to the
    /// previous generation, or an empty list when none exists yet.
    pub async fn get_all(&self) -> Arc<Vec<IndexedVideo>> {
        if let Some(videos) = self.fresh_snapshot() {
            return videos;
        }

        let _guard = self.refresh.lock().await;
        // Another caller may have refreshed while we waited on the lock.
        if let Some(videos) = self.fresh_snapshot() {
            return videos;
        }

        let root: PathBuf = self.root.get();
        match self.scanner.scan(&root, "").await {
            Ok(records) => {
                let videos: Vec<IndexedVideo> = records
                    .into_iter()
                    .map(|record| IndexedVideo {
                        id: self.next_id.fetch_add(1, Ordering::Relaxed),
                        record,
                    })
                    .collect();
                let videos = Arc::new(videos);
                info!(videos = videos.len(), "adopted new index generation");

                *self.current.write() = Some(Generation {
                    videos: Arc::clone(&videos),
                    adopted_at: Instant::now(),
                    stale: false,
                });
                videos
            }
            Err(e) => {
                warn!(root = %root.display(), error = %e, "scan failed, serving previous generation");
                self.current
                    .read()
                    .as_ref()
                    .map(|generation| Arc::clone(&generation.videos))
                    .unwrap_or_else(|| Arc::new(Vec::new()))
            }
        }
    }

    /// Point lookup against the current generation only. Never triggers
    /// a rescan; callers needing freshness call [`Self::get_all`] first.
    pub fn get_by_id(&self, id: u64) -> Option<IndexedVideo> {
        self.current
            .read()
            .as_ref()
            .and_then(|generation| generation.videos.iter().find(|video| video.id == id))
            .cloned()
    }

    /// Force the next [`Self::get_all`] to rescan regardless of age.
    /// Used when a credential change remounts the effective root.
    pub fn invalidate(&self) {
        if let Some(generation) = self.current.write().as_mut() {
            generation.stale = true;
            info!("index cache invalidated");
        }
    }

    fn fresh_snapshot(&self) -> Option<Arc<Vec<IndexedVideo>>> {
        self.current.read().as_ref().and_then(|generation| {
            if !generation.stale && generation.adopted_at.elapsed() < self.ttl {
                Some(Arc::clone(&generation.videos))
            } else {
                None
            }
        })
    }
}

impl std::fmt::Debug for VideoIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoIndex")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}
