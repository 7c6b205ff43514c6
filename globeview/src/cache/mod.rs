//! In-memory tile cache with load deduplication and fallback lookup.
//!
//! Each normalized [`TileAddress`] maps to at most one cache entry:
//!
//! ```text
//!   request_tile ──► absent ──► Pending(load) ──ok──► Ready(image)
//!                                   │
//!                                   └──err──► removed (next request retries)
//! ```
//!
//! The `Pending` entry holds a shared future, so concurrent requests for the
//! same key all await the one fetch. Insert-if-absent is atomic through the
//! map's entry API; no other locking is involved.
//!
//! Nothing is ever evicted. Failed loads are retried on the next request
//! with no backoff.

mod handle;
mod stats;

pub use handle::TileHandle;
pub use stats::CacheStats;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::FutureExt;
use image::RgbaImage;
use thiserror::Error;
use tokio::runtime::Handle;
use tracing::{debug, instrument, warn};

use crate::coord::TileAddress;
use crate::provider::{ProviderError, TileFetcher};
use crate::raster::{
    ancestor_crop, compose_children, crop_and_scale, decode_tile, resample_mercator_rows,
};
use handle::{LoadResult, SharedLoad};
use stats::CacheCounters;

/// Errors from a single tile load.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LoadError {
    #[error("Fetch failed: {0}")]
    Fetch(#[from] ProviderError),

    #[error("Decode failed: {0}")]
    Decode(String),

    #[error("Background task failed: {0}")]
    Task(String),
}

/// Cache behaviour settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheConfig {
    /// Resample Mercator rows to equirectangular spacing before caching
    pub resample: bool,
    /// Probe the four children when no ancestor is ready
    pub probe_children: bool,
    /// Edge length of placeholder images in pixels
    pub tile_size: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            resample: true,
            probe_children: true,
            tile_size: crate::viewport::DEFAULT_TILE_SIZE,
        }
    }
}

/// State of one cache key.
#[derive(Clone)]
pub(crate) enum CacheEntry {
    /// A load is in flight. `id` identifies the load that owns the entry.
    Pending { id: u64, load: SharedLoad },
    Ready(Arc<RgbaImage>),
}

/// Where a best-available image came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackSource {
    /// The requested tile itself
    Exact,
    /// Cropped and scaled from this ready ancestor
    Ancestor(TileAddress),
    /// Composited from this many ready children
    Children(u8),
}

/// Result of [`TileCache::get_best_available`].
#[derive(Debug, Clone)]
pub struct BestAvailable {
    pub image: Arc<RgbaImage>,
    pub exact: bool,
    pub source: FallbackSource,
}

struct CacheInner {
    entries: DashMap<TileAddress, CacheEntry>,
    fetcher: Arc<dyn TileFetcher>,
    config: CacheConfig,
    counters: CacheCounters,
    next_load_id: AtomicU64,
    runtime: Handle,
}

/// Shared tile cache. Cloning yields another handle to the same cache.
#[derive(Clone)]
pub struct TileCache {
    inner: Arc<CacheInner>,
}

impl TileCache {
    /// Creates an empty cache.
    ///
    /// # Arguments
    ///
    /// * `fetcher` - Source of encoded tile images
    /// * `config` - Resample and fallback settings
    /// * `runtime` - Runtime that background loads are spawned on
    pub fn new(fetcher: Arc<dyn TileFetcher>, config: CacheConfig, runtime: Handle) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                entries: DashMap::new(),
                fetcher,
                config,
                counters: CacheCounters::default(),
                next_load_id: AtomicU64::new(0),
                runtime,
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Runtime that background loads run on.
    pub fn runtime(&self) -> &Handle {
        &self.inner.runtime
    }

    /// Requests a tile, starting a background load if none exists.
    ///
    /// Never blocks. A ready tile is returned immediately; a pending one
    /// returns a handle joined to the existing load.
    pub fn request_tile(&self, address: TileAddress) -> TileHandle {
        let key = address.normalized();
        let (handle, spawn) = match self.inner.entries.entry(key) {
            Entry::Occupied(occupied) => match occupied.get() {
                CacheEntry::Ready(image) => {
                    self.inner.counters.record_ready_hit();
                    (TileHandle::ready(key, Arc::clone(image)), None)
                }
                CacheEntry::Pending { load, .. } => {
                    self.inner.counters.record_pending_join();
                    (TileHandle::pending(key, load.clone()), None)
                }
            },
            Entry::Vacant(vacant) => {
                let id = self.inner.next_load_id.fetch_add(1, Ordering::Relaxed);
                let load = self.load_future(key, id);
                vacant.insert(CacheEntry::Pending {
                    id,
                    load: load.clone(),
                });
                self.inner.counters.record_fetch_started();
                debug!(tile_x = key.x, tile_y = key.y, zoom = key.zoom, load_id = id, "Starting tile load");
                (TileHandle::pending(key, load.clone()), Some(load))
            }
        };

        // Spawned after the entry guard is released so the load can update
        // its own entry.
        if let Some(load) = spawn {
            self.inner.runtime.spawn(async move {
                let _ = load.await;
            });
        }
        handle
    }

    fn load_future(&self, key: TileAddress, id: u64) -> SharedLoad {
        let inner = Arc::clone(&self.inner);
        async move {
            let result = inner.load(key).await;
            inner.complete(key, id, &result);
            result
        }
        .boxed()
        .shared()
    }

    /// The ready image for a tile, if any.
    pub fn get(&self, address: &TileAddress) -> Option<Arc<RgbaImage>> {
        match self.inner.entries.get(&address.normalized())?.value() {
            CacheEntry::Ready(image) => Some(Arc::clone(image)),
            CacheEntry::Pending { .. } => None,
        }
    }

    pub fn contains(&self, address: &TileAddress) -> bool {
        self.inner.entries.contains_key(&address.normalized())
    }

    pub fn is_pending(&self, address: &TileAddress) -> bool {
        matches!(
            self.inner.entries.get(&address.normalized()).as_deref(),
            Some(CacheEntry::Pending { .. })
        )
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let pending = self
            .inner
            .entries
            .iter()
            .filter(|e| matches!(e.value(), CacheEntry::Pending { .. }))
            .count();
        self.inner.counters.snapshot(self.len(), pending)
    }

    /// Best image available right now for `address`.
    ///
    /// Tries, in order: the tile itself; the nearest ready ancestor, cropped
    /// to the tile's sub-rectangle and scaled to the tile size; the ready
    /// children composited into their quadrants (if enabled). Returns `None`
    /// when nothing is available and the caller should draw a solid fill.
    pub fn get_best_available(&self, address: &TileAddress) -> Option<BestAvailable> {
        let key = address.normalized();
        let size = self.inner.config.tile_size;

        if let Some(image) = self.get(&key) {
            self.inner.counters.record_ready_hit();
            return Some(BestAvailable {
                image,
                exact: true,
                source: FallbackSource::Exact,
            });
        }

        for levels in 1..=key.zoom {
            let Some(ancestor) = key.ancestor(levels) else {
                break;
            };
            let Some(image) = self.get(&ancestor) else {
                continue;
            };
            let Some(rect) = ancestor_crop(&key, &ancestor, image.width()) else {
                continue;
            };
            self.inner.counters.record_fallback_hit();
            return Some(BestAvailable {
                image: Arc::new(crop_and_scale(&image, rect, size)),
                exact: false,
                source: FallbackSource::Ancestor(ancestor),
            });
        }

        if self.inner.config.probe_children {
            if let Some(children) = key.children() {
                let ready: Vec<Option<Arc<RgbaImage>>> =
                    children.iter().map(|child| self.get(child)).collect();
                let count = ready.iter().filter(|c| c.is_some()).count() as u8;
                if count > 0 {
                    let quadrants = [
                        ready[0].as_deref(),
                        ready[1].as_deref(),
                        ready[2].as_deref(),
                        ready[3].as_deref(),
                    ];
                    self.inner.counters.record_fallback_hit();
                    return Some(BestAvailable {
                        image: Arc::new(compose_children(quadrants, size)),
                        exact: false,
                        source: FallbackSource::Children(count),
                    });
                }
            }
        }

        self.inner.counters.record_miss();
        None
    }
}

impl CacheInner {
    /// Fetch, decode and (optionally) resample one tile.
    #[instrument(level = "debug", skip(self, tile), fields(tile = %tile))]
    async fn load(&self, tile: TileAddress) -> LoadResult {
        let bytes = self.fetcher.fetch(tile).await?;
        let resample = self.config.resample;

        let image = tokio::task::spawn_blocking(move || {
            let image = decode_tile(&bytes).map_err(|e| LoadError::Decode(e.to_string()))?;
            Ok::<_, LoadError>(if resample {
                resample_mercator_rows(&image, &tile)
            } else {
                image
            })
        })
        .await
        .map_err(|e| LoadError::Task(e.to_string()))??;

        Ok(Arc::new(image))
    }

    /// Moves the entry owned by load `id` to its final state.
    fn complete(&self, key: TileAddress, id: u64, result: &LoadResult) {
        match result {
            Ok(image) => {
                if let Some(mut entry) = self.entries.get_mut(&key) {
                    if matches!(*entry, CacheEntry::Pending { id: owner, .. } if owner == id) {
                        *entry = CacheEntry::Ready(Arc::clone(image));
                    }
                }
                debug!(tile_x = key.x, tile_y = key.y, zoom = key.zoom, "Tile ready");
            }
            Err(error) => {
                self.entries.remove_if(&key, |_, entry| {
                    matches!(entry, CacheEntry::Pending { id: owner, .. } if *owner == id)
                });
                self.counters.record_fetch_failure();
                warn!(
                    tile_x = key.x,
                    tile_y = key.y,
                    zoom = key.zoom,
                    error = %error,
                    "Tile load failed, entry removed"
                );
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::provider::BoxFuture;
    use image::{ImageBuffer, ImageFormat, Rgba};
    use std::io::Cursor;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    pub const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    pub const GREEN: Rgba<u8> = Rgba([0, 255, 0, 255]);
    pub const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);
    pub const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

    /// PNG whose quadrants are red, green, blue, white (row-major).
    pub fn quadrant_png(size: u32) -> Vec<u8> {
        let img: RgbaImage = ImageBuffer::from_fn(size, size, |x, y| {
            match (x < size / 2, y < size / 2) {
                (true, true) => RED,
                (false, true) => GREEN,
                (true, false) => BLUE,
                (false, false) => WHITE,
            }
        });
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    /// Fetcher that counts calls, sleeps, and fails the first `fail_first`
    /// calls.
    pub struct CountingFetcher {
        pub calls: AtomicUsize,
        pub fail_first: usize,
        pub delay: Duration,
        pub body: Vec<u8>,
    }

    impl CountingFetcher {
        pub fn new(body: Vec<u8>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_first: 0,
                delay: Duration::from_millis(20),
                body,
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl TileFetcher for CountingFetcher {
        fn fetch(&self, _tile: TileAddress) -> BoxFuture<'_, Result<Vec<u8>, ProviderError>> {
            Box::pin(async move {
                let call = self.calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(self.delay).await;
                if call < self.fail_first {
                    Err(ProviderError::HttpError("simulated failure".into()))
                } else {
                    Ok(self.body.clone())
                }
            })
        }

        fn name(&self) -> &str {
            "counting"
        }

        fn max_zoom(&self) -> u8 {
            22
        }
    }

    fn cache_with(fetcher: Arc<CountingFetcher>, tile_size: u32) -> TileCache {
        let config = CacheConfig {
            resample: false,
            probe_children: true,
            tile_size,
        };
        TileCache::new(fetcher, config, Handle::current())
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_one_fetch() {
        let fetcher = Arc::new(CountingFetcher::new(quadrant_png(8)));
        let cache = cache_with(Arc::clone(&fetcher), 8);
        let tile = TileAddress::unchecked(1, 1, 2);

        let a = cache.request_tile(tile);
        let b = cache.request_tile(tile);
        assert!(a.shares_load_with(&b));
        assert!(cache.is_pending(&tile));

        let (ra, rb) = tokio::join!(a.wait(), b.wait());
        assert!(Arc::ptr_eq(&ra.unwrap(), &rb.unwrap()));
        assert_eq!(fetcher.calls(), 1);

        let stats = cache.stats();
        assert_eq!(stats.fetches_started, 1);
        assert_eq!(stats.pending_joins, 1);
        assert_eq!(stats.entry_count, 1);
        assert_eq!(stats.pending_count, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_requests_from_many_tasks_fetch_once() {
        let fetcher = Arc::new(CountingFetcher::new(quadrant_png(8)));
        let cache = cache_with(Arc::clone(&fetcher), 8);
        let tile = TileAddress::unchecked(5, 3, 4);

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.request_tile(tile).wait().await })
            })
            .collect();
        for task in tasks {
            assert!(task.await.unwrap().is_ok());
        }
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_wrapped_address_shares_key() {
        let fetcher = Arc::new(CountingFetcher::new(quadrant_png(8)));
        let cache = cache_with(Arc::clone(&fetcher), 8);
        let a = cache.request_tile(TileAddress::unchecked(-1, 0, 2));
        let b = cache.request_tile(TileAddress::unchecked(3, 0, 2));
        assert!(a.shares_load_with(&b));
        assert_eq!(a.address(), TileAddress::unchecked(3, 0, 2));
    }

    #[tokio::test]
    async fn test_ready_entry_returns_immediately() {
        let fetcher = Arc::new(CountingFetcher::new(quadrant_png(8)));
        let cache = cache_with(Arc::clone(&fetcher), 8);
        let tile = TileAddress::unchecked(0, 0, 1);
        cache.request_tile(tile).wait().await.unwrap();

        let handle = cache.request_tile(tile);
        assert!(handle.is_ready());
        assert_eq!(fetcher.calls(), 1);
        assert_eq!(cache.stats().ready_hits, 1);
    }

    #[tokio::test]
    async fn test_failure_removes_entry_and_retry_refetches() {
        let fetcher = Arc::new(CountingFetcher {
            fail_first: 1,
            ..CountingFetcher::new(quadrant_png(8))
        });
        let cache = cache_with(Arc::clone(&fetcher), 8);
        let tile = TileAddress::unchecked(2, 1, 3);

        let result = cache.request_tile(tile).wait().await;
        assert!(matches!(result, Err(LoadError::Fetch(_))));
        assert!(!cache.contains(&tile));
        assert_eq!(cache.stats().fetch_failures, 1);

        let retry = cache.request_tile(tile).wait().await;
        assert!(retry.is_ok());
        assert_eq!(fetcher.calls(), 2);
        assert!(cache.get(&tile).is_some());
    }

    #[tokio::test]
    async fn test_decode_failure_removes_entry() {
        let fetcher = Arc::new(CountingFetcher::new(b"garbage".to_vec()));
        let cache = cache_with(Arc::clone(&fetcher), 8);
        let tile = TileAddress::unchecked(0, 0, 0);
        let result = cache.request_tile(tile).wait().await;
        assert!(matches!(result, Err(LoadError::Decode(_))));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_best_available_exact() {
        let fetcher = Arc::new(CountingFetcher::new(quadrant_png(8)));
        let cache = cache_with(fetcher, 8);
        let tile = TileAddress::unchecked(1, 0, 1);
        cache.request_tile(tile).wait().await.unwrap();

        let best = cache.get_best_available(&tile).unwrap();
        assert!(best.exact);
        assert_eq!(best.source, FallbackSource::Exact);
    }

    #[tokio::test]
    async fn test_best_available_crops_parent_quadrant() {
        let fetcher = Arc::new(CountingFetcher::new(quadrant_png(8)));
        let cache = cache_with(fetcher, 8);
        let parent = TileAddress::unchecked(2, 1, 2);
        cache.request_tile(parent).wait().await.unwrap();

        let expected = [
            (TileAddress::unchecked(4, 2, 3), RED),
            (TileAddress::unchecked(5, 2, 3), GREEN),
            (TileAddress::unchecked(4, 3, 3), BLUE),
            (TileAddress::unchecked(5, 3, 3), WHITE),
        ];
        for (child, color) in expected {
            let best = cache.get_best_available(&child).unwrap();
            assert!(!best.exact);
            assert_eq!(best.source, FallbackSource::Ancestor(parent));
            assert_eq!(best.image.dimensions(), (8, 8));
            assert!(best.image.pixels().all(|p| *p == color), "{}", child);
        }
        assert_eq!(cache.stats().fallback_hits, 4);
    }

    #[tokio::test]
    async fn test_best_available_walks_to_distant_ancestor() {
        let fetcher = Arc::new(CountingFetcher::new(quadrant_png(8)));
        let cache = cache_with(fetcher, 8);
        cache
            .request_tile(TileAddress::unchecked(0, 0, 0))
            .wait()
            .await
            .unwrap();

        // Zoom 3 tile in the south-east quadrant of the root
        let best = cache
            .get_best_available(&TileAddress::unchecked(6, 7, 3))
            .unwrap();
        assert_eq!(
            best.source,
            FallbackSource::Ancestor(TileAddress::unchecked(0, 0, 0))
        );
        assert!(best.image.pixels().all(|p| *p == WHITE));
    }

    #[tokio::test]
    async fn test_best_available_composes_children() {
        let fetcher = Arc::new(CountingFetcher::new(quadrant_png(8)));
        let cache = cache_with(fetcher, 8);
        let child = TileAddress::unchecked(3, 2, 3);
        cache.request_tile(child).wait().await.unwrap();

        let parent = TileAddress::unchecked(1, 1, 2);
        let best = cache.get_best_available(&parent).unwrap();
        assert!(!best.exact);
        assert_eq!(best.source, FallbackSource::Children(1));
        // Child (3, 2) is the north-east quadrant of (1, 1)
        assert_eq!(best.image.get_pixel(5, 1)[3], 255);
        assert_eq!(best.image.get_pixel(1, 1)[3], 0);
        assert_eq!(best.image.get_pixel(5, 5)[3], 0);
    }

    #[tokio::test]
    async fn test_best_available_miss() {
        let fetcher = Arc::new(CountingFetcher::new(quadrant_png(8)));
        let cache = cache_with(fetcher, 8);
        assert!(cache
            .get_best_available(&TileAddress::unchecked(1, 1, 3))
            .is_none());
        assert_eq!(cache.stats().misses, 1);
    }

    #[tokio::test]
    async fn test_pending_tile_is_not_a_placeholder() {
        let fetcher = Arc::new(CountingFetcher::new(quadrant_png(8)));
        let cache = cache_with(fetcher, 8);
        let tile = TileAddress::unchecked(0, 0, 1);
        let handle = cache.request_tile(tile);
        assert!(cache.get_best_available(&tile).is_none());
        handle.wait().await.unwrap();
        assert!(cache.get_best_available(&tile).is_some());
    }
}
