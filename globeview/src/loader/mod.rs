//! Per-frame tile loading driver.
//!
//! [`TileLoader::update`] runs once per displayed frame. It turns the
//! viewport into a tile index box, requests every displayed tile, and
//! returns immediately; completions arrive later on the event channel.
//!
//! # Epochs
//!
//! Every request is stamped with the loader's epoch. The epoch advances when
//! the tile zoom changes or the new displayed box no longer overlaps the
//! previous one. A load that completes under an older epoch is still cached,
//! but instead of a `Ready` event (which triggers a draw) it produces
//! `Superseded`, telling the renderer to re-evaluate with
//! [`TileCache::get_best_available`].
//!
//! # Priority
//!
//! Tiles inside the displayed box are requested eagerly. Tiles within the
//! prefetch margin around it are reported as deferred and only requested
//! once they enter the displayed box.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use image::RgbaImage;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info};

use crate::cache::{LoadError, TileCache};
use crate::coord::{tiles_per_axis, BoundingBox, Projection, TileAddress};
use crate::tilebox::{overlap, TileIndexBox};
use crate::viewport::{compute_viewport_bbox_and_tile_box, ViewportGeometry, ViewportState};

/// Default prefetch margin in tiles
pub const DEFAULT_PREFETCH_MARGIN: u32 = 1;

/// Loader settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderConfig {
    /// Ring of tiles around the displayed box tracked as deferred
    pub prefetch_margin: u32,
    /// Lowest tile zoom the provider serves
    pub min_zoom: u8,
    /// Highest tile zoom the provider serves
    pub max_zoom: u8,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            prefetch_margin: DEFAULT_PREFETCH_MARGIN,
            min_zoom: 0,
            max_zoom: 19,
        }
    }
}

/// Completion notice for a requested tile.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadEvent {
    /// Loaded under the current epoch; draw it.
    Ready { address: TileAddress, epoch: u64 },
    /// Loaded after the viewport moved on. The tile is cached but the draw
    /// is skipped; re-evaluate with best-available lookup.
    Superseded { address: TileAddress },
    /// The load failed and the cache entry was removed.
    Failed {
        address: TileAddress,
        error: LoadError,
    },
}

/// Destination of a tile in frame pixel space, relative to the top-left of
/// the displayed box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DestRect {
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
}

/// A displayed tile and where it goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlacedTile {
    pub address: TileAddress,
    pub dest: DestRect,
}

/// Result of one [`TileLoader::update`].
#[derive(Debug, Clone, PartialEq)]
pub struct FrameTiles {
    pub epoch: u64,
    pub bbox: BoundingBox,
    pub tile_box: TileIndexBox,
    /// Tiles to draw this frame, requested eagerly
    pub displayed: Vec<PlacedTile>,
    /// Tiles in the prefetch margin, not requested yet
    pub deferred: Vec<TileAddress>,
    /// Loads newly started or joined by this update
    pub requested: usize,
}

/// Receiver of draw calls (the renderer side).
pub trait DrawSink {
    /// Draws an image into the destination rectangle.
    fn draw(&mut self, image: &RgbaImage, dest: DestRect);

    /// Fills the destination rectangle with the background color.
    fn fill(&mut self, dest: DestRect);
}

/// Counts from one [`TileLoader::draw_frame`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrawSummary {
    pub exact: usize,
    pub placeholder: usize,
    pub filled: usize,
}

/// Drives the cache from viewport updates.
pub struct TileLoader {
    cache: TileCache,
    geometry: ViewportGeometry,
    scheme: Projection,
    config: LoaderConfig,
    epoch: Arc<AtomicU64>,
    previous: Option<TileIndexBox>,
    /// Tiles with a completion watcher, and the epoch it was stamped with
    watching: Arc<DashMap<TileAddress, u64>>,
    events: UnboundedSender<LoadEvent>,
}

impl TileLoader {
    /// Creates a loader and the channel its completion events arrive on.
    ///
    /// # Arguments
    ///
    /// * `cache` - Shared tile cache
    /// * `geometry` - Lens parameters; `tile_size` sets draw rectangles
    /// * `scheme` - Scheme of the provider's tile addresses
    /// * `config` - Prefetch margin and provider zoom range
    pub fn new(
        cache: TileCache,
        geometry: ViewportGeometry,
        scheme: Projection,
        config: LoaderConfig,
    ) -> (Self, UnboundedReceiver<LoadEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let loader = Self {
            cache,
            geometry,
            scheme,
            config,
            epoch: Arc::new(AtomicU64::new(0)),
            previous: None,
            watching: Arc::new(DashMap::new()),
            events,
        };
        (loader, rx)
    }

    pub fn cache(&self) -> &TileCache {
        &self.cache
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Tile box of the last update.
    pub fn previous_box(&self) -> Option<&TileIndexBox> {
        self.previous.as_ref()
    }

    /// Recomputes the displayed tiles for a new viewport state and requests
    /// the ones not yet cached. Never blocks.
    pub fn update(&mut self, state: &ViewportState) -> FrameTiles {
        let (bbox, tile_box) = compute_viewport_bbox_and_tile_box(
            state,
            &self.scheme,
            self.config.min_zoom..=self.config.max_zoom,
        );

        let invalidated = match &self.previous {
            None => true,
            Some(prev) => prev.zoom != tile_box.zoom || !overlap(prev, &tile_box),
        };
        let epoch = if invalidated {
            let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
            info!(epoch, zoom = tile_box.zoom, "Viewport epoch advanced");
            epoch
        } else {
            self.epoch.load(Ordering::SeqCst)
        };
        self.previous = Some(tile_box);

        let displayed = self.place_tiles(&tile_box);
        let mut requested = 0;
        for placed in &displayed {
            if self.watch(placed.address, epoch) {
                requested += 1;
            }
        }

        let shown: HashSet<TileAddress> = displayed.iter().map(|p| p.address).collect();
        let deferred: Vec<TileAddress> = tile_box
            .expand(self.config.prefetch_margin)
            .tiles()
            .filter(|t| !shown.contains(t) && !self.cache.contains(t))
            .collect();

        debug!(
            epoch,
            displayed = displayed.len(),
            deferred = deferred.len(),
            requested,
            "Frame tiles updated"
        );

        FrameTiles {
            epoch,
            bbox,
            tile_box,
            displayed,
            deferred,
            requested,
        }
    }

    /// Requests a tile and attaches a completion watcher stamped with
    /// `epoch`. Returns false if the tile is ready or already watched under
    /// this epoch.
    fn watch(&self, address: TileAddress, epoch: u64) -> bool {
        if self.cache.get(&address).is_some() {
            return false;
        }
        if self.watching.get(&address).map(|e| *e) == Some(epoch) {
            return false;
        }

        let handle = self.cache.request_tile(address);
        self.watching.insert(address, epoch);

        let current = Arc::clone(&self.epoch);
        let watching = Arc::clone(&self.watching);
        let events = self.events.clone();
        self.cache.runtime().spawn(async move {
            let result = handle.wait().await;
            watching.remove_if(&address, |_, stamped| *stamped == epoch);
            let event = match result {
                Ok(_) if current.load(Ordering::SeqCst) == epoch => {
                    LoadEvent::Ready { address, epoch }
                }
                Ok(_) => {
                    debug!(tile = %address, epoch, "Completion from stale epoch, draw skipped");
                    LoadEvent::Superseded { address }
                }
                Err(error) => LoadEvent::Failed { address, error },
            };
            // Receiver dropped means nobody is rendering any more.
            let _ = events.send(event);
        });
        true
    }

    /// Normalized displayed tiles with their frame destinations.
    fn place_tiles(&self, tile_box: &TileIndexBox) -> Vec<PlacedTile> {
        let size = self.geometry.tile_size;
        let n = tiles_per_axis(tile_box.zoom);
        tile_box
            .tiles()
            .map(|address| {
                let dx = (address.x - tile_box.start_x).rem_euclid(n);
                let dy = address.y - tile_box.start_y;
                PlacedTile {
                    address,
                    dest: DestRect {
                        x: dx * size as i64,
                        y: dy * size as i64,
                        width: size,
                        height: size,
                    },
                }
            })
            .collect()
    }

    /// Draws every displayed tile with the best imagery available now.
    pub fn draw_frame(&self, frame: &FrameTiles, sink: &mut dyn DrawSink) -> DrawSummary {
        let mut summary = DrawSummary::default();
        for placed in &frame.displayed {
            match self.cache.get_best_available(&placed.address) {
                Some(best) => {
                    sink.draw(&best.image, placed.dest);
                    if best.exact {
                        summary.exact += 1;
                    } else {
                        summary.placeholder += 1;
                    }
                }
                None => {
                    sink.fill(placed.dest);
                    summary.filled += 1;
                }
            }
        }
        summary
    }
}
