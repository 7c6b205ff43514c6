//! Globeview - tile streaming core for a 3D globe viewer
//!
//! Works out which raster map tiles a perspective camera above a sphere can
//! see, and keeps them loaded:
//!
//! - [`coord`]: tile addressing in Equirectangular and Web Mercator schemes
//! - [`tilebox`]: rectangular tile ranges with antimeridian wrap-around
//! - [`viewport`]: camera state, zoom/distance conversion and the visible
//!   region of the sphere
//! - [`provider`]: fetching encoded tiles over HTTP
//! - [`raster`]: decode, Mercator row resampling and placeholder composition
//! - [`cache`]: deduplicated async tile cache with fallback lookup
//! - [`loader`]: per-frame driver that ties the above together
//!
//! ```no_run
//! use globeview::cache::{CacheConfig, TileCache};
//! use globeview::coord::{Coordinate, Projection};
//! use globeview::loader::{LoaderConfig, TileLoader};
//! use globeview::provider::{ReqwestClient, TemplateConfig, TemplateProvider};
//! use globeview::viewport::{ViewportGeometry, ViewportState};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let provider = TemplateProvider::new(ReqwestClient::new()?, TemplateConfig::default())?;
//! let cache = TileCache::new(
//!     Arc::new(provider),
//!     CacheConfig::default(),
//!     tokio::runtime::Handle::current(),
//! );
//! let geometry = ViewportGeometry::default();
//! let (mut loader, mut events) =
//!     TileLoader::new(cache, geometry, Projection::Mercator, LoaderConfig::default());
//!
//! let state = ViewportState::new(geometry, Coordinate::new(13.4, 52.5), 6.0)?;
//! let frame = loader.update(&state);
//! while let Some(event) = events.recv().await {
//!     println!("{:?}", event);
//! }
//! # let _ = frame;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod coord;
pub mod loader;
pub mod logging;
pub mod provider;
pub mod raster;
pub mod tilebox;
pub mod viewport;

pub use cache::{BestAvailable, CacheStats, LoadError, TileCache, TileHandle};
pub use coord::{BoundingBox, Coordinate, Projection, TileAddress, TileScheme};
pub use loader::{FrameTiles, LoadEvent, TileLoader};
pub use tilebox::TileIndexBox;
pub use viewport::{ViewportError, ViewportGeometry, ViewportState};
