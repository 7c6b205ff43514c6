//! Linear latitude → row scheme used by the sphere mesh.

use super::{round12, tiles_per_axis, TileScheme};

/// Equirectangular tiles: rows are evenly spaced in latitude.
///
/// `y = (90 - lat) / 180 * 2^z`. Exactly invertible, defined over the full
/// `[-90, 90]` range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Equirectangular;

impl TileScheme for Equirectangular {
    fn name(&self) -> &'static str {
        "equirectangular"
    }

    #[inline]
    fn lat_to_y(&self, lat: f64, zoom: u8) -> f64 {
        round12((90.0 - lat) / 180.0 * tiles_per_axis(zoom) as f64)
    }

    #[inline]
    fn y_to_lat(&self, y: f64, zoom: u8) -> f64 {
        round12(90.0 - y / tiles_per_axis(zoom) as f64 * 180.0)
    }
}
