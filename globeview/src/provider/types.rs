//! Provider types and the fetch capability trait

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use crate::coord::TileAddress;

/// A boxed future, used to keep [`TileFetcher`] dyn-compatible.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors that can occur while fetching tile imagery.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    /// Transport-level failure (connect, timeout, body read)
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Server answered with a non-success status
    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    /// Provider has no imagery at this zoom
    #[error("Unsupported zoom level: {0}")]
    UnsupportedZoom(u8),

    /// URL template is unusable
    #[error("Invalid URL template: {0}")]
    InvalidTemplate(String),
}

/// Source of encoded tile images.
///
/// Addresses are Mercator XYZ tiles, already normalized into the grid.
pub trait TileFetcher: Send + Sync {
    /// Downloads the encoded image for one tile.
    fn fetch(&self, tile: TileAddress) -> BoxFuture<'_, Result<Vec<u8>, ProviderError>>;

    /// Human-readable provider name for logs.
    fn name(&self) -> &str;

    fn min_zoom(&self) -> u8 {
        0
    }

    fn max_zoom(&self) -> u8;

    fn supports_zoom(&self, zoom: u8) -> bool {
        zoom >= self.min_zoom() && zoom <= self.max_zoom()
    }
}
