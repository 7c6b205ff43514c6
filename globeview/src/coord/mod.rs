//! Coordinate conversion module
//!
//! Provides conversions between geographic coordinates (longitude/latitude)
//! and tile coordinates under two tile schemes:
//!
//! - [`Equirectangular`]: linear latitude → row mapping, used by the sphere
//!   mesh and its texture space.
//! - [`Mercator`]: Web Mercator rows, used by imagery providers.
//!
//! Both share the same longitude → column mapping. Float results are rounded
//! to 12 decimal digits so that "this longitude sits exactly on a tile edge"
//! decisions are stable.

mod equirectangular;
mod mercator;
mod types;

pub use equirectangular::Equirectangular;
pub use mercator::Mercator;
pub use types::{
    tiles_per_axis, BoundingBox, CoordError, Coordinate, TileAddress, MAX_LON, MAX_ZOOM,
    MERCATOR_MAX_LAT, MIN_LON, MIN_ZOOM,
};

use std::fmt;
use std::str::FromStr;

use crate::tilebox::TileIndexBox;

/// Rounds to 12 decimal digits.
#[inline]
pub fn round12(value: f64) -> f64 {
    (value * 1e12).round() / 1e12
}

/// Longitude → fractional column. Linear and unwrapped: longitudes beyond
/// ±180 produce columns outside `[0, 2^z]`.
#[inline]
pub fn lng_to_x(lng: f64, zoom: u8) -> f64 {
    round12((lng + 180.0) / 360.0 * tiles_per_axis(zoom) as f64)
}

/// Fractional column → longitude.
#[inline]
pub fn x_to_lng(x: f64, zoom: u8) -> f64 {
    round12(x / tiles_per_axis(zoom) as f64 * 360.0 - 180.0)
}

/// A tile addressing scheme.
///
/// Implementors provide the latitude ↔ row mapping; the column mapping and
/// the derived box conversions are shared.
pub trait TileScheme: Send + Sync {
    /// Scheme name for logs and CLI output.
    fn name(&self) -> &'static str;

    /// Latitude → fractional row, 0 at the north edge.
    fn lat_to_y(&self, lat: f64, zoom: u8) -> f64;

    /// Fractional row → latitude.
    fn y_to_lat(&self, y: f64, zoom: u8) -> f64;

    fn lng_to_x(&self, lng: f64, zoom: u8) -> f64 {
        lng_to_x(lng, zoom)
    }

    fn x_to_lng(&self, x: f64, zoom: u8) -> f64 {
        x_to_lng(x, zoom)
    }

    /// The tile containing a point. Columns wrap, rows clamp into the grid.
    fn point_to_tile(&self, lng: f64, lat: f64, zoom: u8) -> TileAddress {
        let x = self.lng_to_x(lng, zoom).floor() as i64;
        let y = self.lat_to_y(lat, zoom).floor() as i64;
        TileAddress::unchecked(x, y, zoom).normalized()
    }

    /// Geographic extent of a tile.
    fn tile_to_bbox(&self, tile: &TileAddress) -> BoundingBox {
        let (x, y, z) = (tile.x as f64, tile.y as f64, tile.zoom);
        BoundingBox::new(
            self.x_to_lng(x, z),
            self.y_to_lat(y + 1.0, z),
            self.x_to_lng(x + 1.0, z),
            self.y_to_lat(y, z),
        )
    }

    /// Half-open tile index range covering a bounding box.
    ///
    /// Edges that land exactly on a tile boundary count as contained, so a
    /// box ending on a boundary does not pull in the next tile. A box with
    /// `east < west` wraps: its end column is pushed one period east.
    /// `north > 90` (or `south < -90`) is mirrored across the pole and
    /// reported as a row range extending before row 0 (or past `2^z`).
    fn bbox_to_tile_index_box(&self, bbox: &BoundingBox, zoom: u8) -> TileIndexBox {
        let n = tiles_per_axis(zoom);
        let nf = n as f64;

        let start_x = self.lng_to_x(bbox.west, zoom).floor() as i64;
        let mut end_x = self.lng_to_x(bbox.east, zoom).ceil() as i64;
        if bbox.east < bbox.west {
            end_x += n;
        }
        let end_x = end_x.max(start_x + 1);

        let north_y = if bbox.north > 90.0 {
            -self.lat_to_y(180.0 - bbox.north, zoom)
        } else {
            self.lat_to_y(bbox.north, zoom)
        };
        let south_y = if bbox.south < -90.0 {
            2.0 * nf - self.lat_to_y(-180.0 - bbox.south, zoom)
        } else {
            self.lat_to_y(bbox.south, zoom)
        };
        let start_y = round12(north_y).floor() as i64;
        let end_y = (round12(south_y).ceil() as i64).max(start_y + 1);

        TileIndexBox::new(start_x, start_y, end_x, end_y, zoom)
    }
}

/// Runtime selection between the two schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Projection {
    Equirectangular,
    #[default]
    Mercator,
}

impl Projection {
    fn scheme(&self) -> &'static dyn TileScheme {
        match self {
            Projection::Equirectangular => &Equirectangular,
            Projection::Mercator => &Mercator,
        }
    }
}

impl TileScheme for Projection {
    fn name(&self) -> &'static str {
        self.scheme().name()
    }

    fn lat_to_y(&self, lat: f64, zoom: u8) -> f64 {
        self.scheme().lat_to_y(lat, zoom)
    }

    fn y_to_lat(&self, y: f64, zoom: u8) -> f64 {
        self.scheme().y_to_lat(y, zoom)
    }
}

impl fmt::Display for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Projection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "equirectangular" | "equirect" | "linear" => Ok(Projection::Equirectangular),
            "mercator" | "webmercator" => Ok(Projection::Mercator),
            other => Err(format!("unknown projection '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lng_to_x_edges() {
        assert_eq!(lng_to_x(-180.0, 3), 0.0);
        assert_eq!(lng_to_x(180.0, 3), 8.0);
        assert_eq!(lng_to_x(0.0, 1), 1.0);
        // Unwrapped beyond the antimeridian
        assert_eq!(lng_to_x(225.0, 2), 4.5);
        assert_eq!(lng_to_x(-225.0, 2), -0.5);
    }

    #[test]
    fn test_round12_stabilises_edges() {
        // 0.1 + 0.2 is not exactly 0.3 in binary floating point
        assert_eq!(round12(0.1 + 0.2), 0.3);
        assert_eq!(round12(1.0 - 1e-15), 1.0);
        assert_eq!(lng_to_x(-90.0 + 1e-14, 2), 1.0);
    }

    #[test]
    fn test_whole_world_bbox_at_zoom_zero() {
        let bbox = BoundingBox::new(-90.0, -90.0, 90.0, 90.0);
        for scheme in [Projection::Equirectangular, Projection::Mercator] {
            let b = scheme.bbox_to_tile_index_box(&bbox, 0);
            assert_eq!(b, TileIndexBox::new(0, 0, 1, 1, 0), "{}", scheme);
        }
    }

    #[test]
    fn test_exact_edge_is_contained_not_extended() {
        // East edge exactly on the boundary between columns 1 and 2
        let bbox = BoundingBox::new(-180.0, 0.0, -90.0, 45.0);
        let b = Equirectangular.bbox_to_tile_index_box(&bbox, 2);
        assert_eq!((b.start_x, b.end_x), (0, 1));
        assert_eq!((b.start_y, b.end_y), (1, 2));
    }

    #[test]
    fn test_wrapping_bbox_extends_past_period() {
        let bbox = BoundingBox::new(170.0, -10.0, -170.0, 10.0);
        let b = Equirectangular.bbox_to_tile_index_box(&bbox, 3);
        assert_eq!(b.start_x, 7);
        assert_eq!(b.end_x, 9);
    }

    #[test]
    fn test_shifted_longitudes_extend_past_period() {
        let bbox = BoundingBox::new(170.0, -10.0, 190.0, 10.0);
        let b = Equirectangular.bbox_to_tile_index_box(&bbox, 3);
        assert_eq!((b.start_x, b.end_x), (7, 9));
    }

    #[test]
    fn test_north_past_pole_mirrors_to_negative_rows() {
        // 100°N means 10° over the pole, i.e. down to 80° on the far side
        let bbox = BoundingBox::new(-180.0, 40.0, 180.0, 100.0);
        let b = Equirectangular.bbox_to_tile_index_box(&bbox, 3);
        // Equirectangular row of 80°N at zoom 3 is 10/180*8 = 0.444
        assert_eq!(b.start_y, -1);
        assert_eq!(b.end_y, 3);
    }

    #[test]
    fn test_south_past_pole_mirrors_beyond_grid() {
        let bbox = BoundingBox::new(-10.0, -120.0, 10.0, -60.0);
        let b = Equirectangular.bbox_to_tile_index_box(&bbox, 2);
        // Mirrored south is -60 → row 3.33; reported as 2*4 - 3.33 = 4.67
        assert_eq!(b.end_y, 5);
        assert_eq!(b.start_y, 3);
    }

    #[test]
    fn test_point_to_tile_wraps_and_clamps() {
        assert_eq!(
            Mercator.point_to_tile(180.0, 0.0, 2),
            TileAddress::unchecked(0, 2, 2)
        );
        assert_eq!(
            Mercator.point_to_tile(0.0, -90.0, 2),
            TileAddress::unchecked(2, 3, 2)
        );
        assert_eq!(
            Equirectangular.point_to_tile(-179.9, 89.9, 4),
            TileAddress::unchecked(0, 0, 4)
        );
    }

    #[test]
    fn test_tile_to_bbox_roundtrips_through_index_box() {
        for scheme in [Projection::Equirectangular, Projection::Mercator] {
            let tile = TileAddress::unchecked(5, 3, 4);
            let bbox = scheme.tile_to_bbox(&tile);
            let b = scheme.bbox_to_tile_index_box(&bbox, 4);
            assert_eq!(b, TileIndexBox::new(5, 3, 6, 4, 4), "{}", scheme);
        }
    }

    #[test]
    fn test_projection_from_str() {
        assert_eq!("Mercator".parse::<Projection>(), Ok(Projection::Mercator));
        assert_eq!(
            "equirect".parse::<Projection>(),
            Ok(Projection::Equirectangular)
        );
        assert!("lambert".parse::<Projection>().is_err());
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn test_lng_roundtrip(lng in -180.0..180.0_f64, zoom in 0u8..=20) {
                let back = x_to_lng(lng_to_x(lng, zoom), zoom);
                prop_assert!((back - lng).abs() < 1e-9, "{} -> {}", lng, back);
            }

            #[test]
            fn test_point_tile_contains_point(
                lng in -179.99..179.99_f64,
                lat in -85.0..85.0_f64,
                zoom in 0u8..=18
            ) {
                for scheme in [Projection::Equirectangular, Projection::Mercator] {
                    let tile = scheme.point_to_tile(lng, lat, zoom);
                    let bbox = scheme.tile_to_bbox(&tile);
                    prop_assert!(bbox.west <= lng + 1e-9 && lng <= bbox.east + 1e-9);
                    prop_assert!(bbox.south <= lat + 1e-9 && lat <= bbox.north + 1e-9);
                }
            }
        }
    }
}
