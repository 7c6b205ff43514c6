//! Integration tests for the viewport → loader → cache → draw flow.
//!
//! These tests drive the public API the way a renderer would:
//! - a camera state becomes a tile box and a set of requested tiles
//! - completions arrive on the event channel
//! - each frame is drawn from whatever the cache holds at that moment
//!
//! Run with: `cargo test --test viewport_tiles_integration`

use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use image::{ImageFormat, Rgba, RgbaImage};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;

use globeview::cache::{CacheConfig, TileCache};
use globeview::coord::{Coordinate, Projection, TileAddress};
use globeview::loader::{DestRect, DrawSink, LoadEvent, LoaderConfig, TileLoader};
use globeview::provider::{BoxFuture, ProviderError, TileFetcher};
use globeview::viewport::{ViewportGeometry, ViewportState};

// ============================================================================
// Helper Functions
// ============================================================================

const IMAGE_SIZE: u32 = 16;

/// Solid PNG whose color encodes the zoom level.
fn zoom_png(zoom: u8) -> Vec<u8> {
    let img = RgbaImage::from_pixel(IMAGE_SIZE, IMAGE_SIZE, Rgba([zoom * 10, 0, 0, 255]));
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .expect("encode png");
    bytes
}

/// Serves solid tiles from memory, optionally slower at some zooms.
struct InMemoryFetcher {
    calls: AtomicUsize,
    delays: HashMap<u8, Duration>,
}

impl InMemoryFetcher {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delays: HashMap::new(),
        }
    }

    fn with_delay(mut self, zoom: u8, delay: Duration) -> Self {
        self.delays.insert(zoom, delay);
        self
    }
}

impl TileFetcher for InMemoryFetcher {
    fn fetch(&self, tile: TileAddress) -> BoxFuture<'_, Result<Vec<u8>, ProviderError>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let delay = self
                .delays
                .get(&tile.zoom)
                .copied()
                .unwrap_or(Duration::from_millis(5));
            tokio::time::sleep(delay).await;
            Ok(zoom_png(tile.zoom))
        })
    }

    fn name(&self) -> &str {
        "in-memory"
    }

    fn max_zoom(&self) -> u8 {
        19
    }
}

#[derive(Default)]
struct RecordingSink {
    draws: Vec<(DestRect, Rgba<u8>)>,
    fills: Vec<DestRect>,
}

impl DrawSink for RecordingSink {
    fn draw(&mut self, image: &RgbaImage, dest: DestRect) {
        self.draws.push((dest, *image.get_pixel(0, 0)));
    }

    fn fill(&mut self, dest: DestRect) {
        self.fills.push(dest);
    }
}

fn geometry() -> ViewportGeometry {
    ViewportGeometry {
        radius: 1.0,
        ..ViewportGeometry::default()
    }
}

fn setup(fetcher: InMemoryFetcher) -> (TileLoader, UnboundedReceiver<LoadEvent>, Arc<InMemoryFetcher>) {
    let fetcher = Arc::new(fetcher);
    let cache = TileCache::new(
        Arc::clone(&fetcher) as Arc<dyn TileFetcher>,
        CacheConfig {
            tile_size: IMAGE_SIZE,
            ..CacheConfig::default()
        },
        tokio::runtime::Handle::current(),
    );
    let (loader, rx) = TileLoader::new(
        cache,
        geometry(),
        Projection::Mercator,
        LoaderConfig::default(),
    );
    (loader, rx, fetcher)
}

async fn drain(rx: &mut UnboundedReceiver<LoadEvent>, count: usize) -> Vec<LoadEvent> {
    let mut events = Vec::with_capacity(count);
    while events.len() < count {
        let event = timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for load events")
            .expect("event channel closed");
        events.push(event);
    }
    events
}

// ============================================================================
// Integration Tests
// ============================================================================

/// One frame from a cold cache: fill first, exact imagery once loads land.
#[tokio::test]
async fn test_cold_frame_loads_and_draws() {
    let (mut loader, mut rx, fetcher) = setup(InMemoryFetcher::new());
    let state = ViewportState::new(geometry(), Coordinate::new(13.4, 52.5), 5.0).unwrap();

    let frame = loader.update(&state);
    let count = frame.displayed.len();
    assert!(count > 0);

    let mut sink = RecordingSink::default();
    let summary = loader.draw_frame(&frame, &mut sink);
    assert_eq!(summary.filled, count);

    let events = drain(&mut rx, count).await;
    let ready: HashSet<TileAddress> = events
        .iter()
        .filter_map(|e| match e {
            LoadEvent::Ready { address, .. } => Some(*address),
            _ => None,
        })
        .collect();
    assert_eq!(ready.len(), count);

    let mut sink = RecordingSink::default();
    let summary = loader.draw_frame(&frame, &mut sink);
    assert_eq!(summary.exact, count);
    assert!(sink.draws.iter().all(|(_, px)| px[0] == 50));

    let stats = loader.cache().stats();
    assert_eq!(stats.fetches_started as usize, count);
    assert_eq!(stats.pending_count, 0);
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), count);
}

/// Zooming in draws cropped parents while the finer tiles are in flight.
#[tokio::test]
async fn test_zoom_in_uses_ancestor_placeholders() {
    let fetcher = InMemoryFetcher::new().with_delay(6, Duration::from_millis(300));
    let (mut loader, mut rx, _fetcher) = setup(fetcher);
    let center = Coordinate::new(13.4, 52.5);

    let coarse = loader.update(&ViewportState::new(geometry(), center, 5.0).unwrap());
    drain(&mut rx, coarse.displayed.len()).await;

    let fine = loader.update(&ViewportState::new(geometry(), center, 6.0).unwrap());
    assert_eq!(fine.epoch, coarse.epoch + 1);

    let mut sink = RecordingSink::default();
    let summary = loader.draw_frame(&fine, &mut sink);
    assert_eq!(summary.placeholder, fine.displayed.len());
    assert_eq!(summary.filled, 0);
    // Placeholders carry the zoom-5 color
    assert!(sink.draws.iter().all(|(_, px)| px[0] == 50));

    drain(&mut rx, fine.displayed.len()).await;
    let mut sink = RecordingSink::default();
    let summary = loader.draw_frame(&fine, &mut sink);
    assert_eq!(summary.exact, fine.displayed.len());
    assert!(sink.draws.iter().all(|(_, px)| px[0] == 60));
}

/// A view straddling the antimeridian requests wrapped, normalized tiles.
#[tokio::test]
async fn test_antimeridian_view_requests_both_edges() {
    let (mut loader, mut rx, _fetcher) = setup(InMemoryFetcher::new());
    let state = ViewportState::new(geometry(), Coordinate::new(179.5, 0.0), 5.0).unwrap();

    let frame = loader.update(&state);
    assert!(frame.bbox.east > 180.0);

    let columns: HashSet<i64> = frame.displayed.iter().map(|p| p.address.x).collect();
    assert!(columns.contains(&0));
    assert!(columns.contains(&31));
    assert!(columns.iter().all(|x| (0..32).contains(x)));

    // Destinations stay contiguous across the seam
    let xs: HashSet<i64> = frame.displayed.iter().map(|p| p.dest.x).collect();
    let width = frame.tile_box.width();
    assert_eq!(xs.len() as i64, width);

    drain(&mut rx, frame.displayed.len()).await;
}

/// Two loaders sharing a cache never fetch the same tile twice.
#[tokio::test]
async fn test_shared_cache_dedups_across_loaders() {
    let (mut first, mut rx_first, fetcher) = setup(InMemoryFetcher::new());
    let (mut second, mut rx_second) = TileLoader::new(
        first.cache().clone(),
        geometry(),
        Projection::Mercator,
        LoaderConfig::default(),
    );
    let state = ViewportState::new(geometry(), Coordinate::new(-70.0, -30.0), 5.0).unwrap();

    let a = first.update(&state);
    let b = second.update(&state);
    assert_eq!(a.tile_box, b.tile_box);

    drain(&mut rx_first, a.displayed.len()).await;
    drain(&mut rx_second, b.displayed.len()).await;

    assert_eq!(fetcher.calls.load(Ordering::SeqCst), a.displayed.len());
    assert!(first.cache().stats().pending_joins as usize >= b.displayed.len());
}
