//! Coordinate type definitions

use std::fmt;

use thiserror::Error;

/// Latitude limit of the Web Mercator tile pyramid.
///
/// `atan(sinh(π))` in degrees. Providers have no imagery beyond it.
pub const MERCATOR_MAX_LAT: f64 = 85.051_128_779_806_59;

/// Valid longitude range
pub const MIN_LON: f64 = -180.0;
pub const MAX_LON: f64 = 180.0;

/// Supported zoom levels
pub const MIN_ZOOM: u8 = 0;
pub const MAX_ZOOM: u8 = 30;

/// A geographic position in degrees.
///
/// Longitude may transiently leave `[-180, 180]` while a visible polygon is
/// being assembled across the antimeridian.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    pub lng: f64,
    pub lat: f64,
}

impl Coordinate {
    pub const fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }

    /// True when both components are finite.
    pub fn is_finite(&self) -> bool {
        self.lng.is_finite() && self.lat.is_finite()
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.lng, self.lat)
    }
}

/// Geographic rectangle `(west, south, east, north)` in degrees.
///
/// A box that crosses the antimeridian is encoded either with `east < west`
/// or with `east` beyond 180. `north`/`south` may exceed ±90 when a region
/// reaches over a pole; the tile index conversion mirrors that excess.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl BoundingBox {
    pub const fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }

    /// The whole sphere.
    pub const fn full_sphere() -> Self {
        Self::new(MIN_LON, -90.0, MAX_LON, 90.0)
    }

    /// Axis-aligned hull of a set of coordinates.
    ///
    /// Returns `None` for an empty set or when any coordinate is non-finite.
    pub fn from_coordinates<'a, I>(coords: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a Coordinate>,
    {
        let mut iter = coords.into_iter();
        let first = iter.next()?;
        if !first.is_finite() {
            return None;
        }
        let mut bbox = Self::new(first.lng, first.lat, first.lng, first.lat);
        for c in iter {
            if !c.is_finite() {
                return None;
            }
            bbox.west = bbox.west.min(c.lng);
            bbox.east = bbox.east.max(c.lng);
            bbox.south = bbox.south.min(c.lat);
            bbox.north = bbox.north.max(c.lat);
        }
        Some(bbox)
    }

    /// True when the box spans the antimeridian.
    pub fn crosses_antimeridian(&self) -> bool {
        self.east < self.west || self.east > MAX_LON || self.west < MIN_LON
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[W {:.6}, S {:.6}, E {:.6}, N {:.6}]",
            self.west, self.south, self.east, self.north
        )
    }
}

/// Tile address `(x, y, zoom)`.
///
/// `x` and `y` may be negative or `>= 2^zoom` as intermediates of wraparound
/// arithmetic. Use [`TileAddress::normalized`] before using one as a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileAddress {
    /// Column, 0 at the antimeridian, increasing eastward
    pub x: i64,
    /// Row, 0 at the north edge
    pub y: i64,
    pub zoom: u8,
}

impl TileAddress {
    /// Creates a validated address inside the `2^zoom` grid.
    pub fn new(x: i64, y: i64, zoom: u8) -> Result<Self, CoordError> {
        if zoom > MAX_ZOOM {
            return Err(CoordError::InvalidZoom(zoom));
        }
        let n = tiles_per_axis(zoom);
        if !(0..n).contains(&x) || !(0..n).contains(&y) {
            return Err(CoordError::OutOfGrid { x, y, zoom });
        }
        Ok(Self { x, y, zoom })
    }

    /// Creates an address without range checks.
    pub const fn unchecked(x: i64, y: i64, zoom: u8) -> Self {
        Self { x, y, zoom }
    }

    /// Wraps the column into `[0, 2^zoom)` and clamps the row.
    #[inline]
    pub fn normalized(&self) -> Self {
        let n = tiles_per_axis(self.zoom);
        Self {
            x: self.x.rem_euclid(n),
            y: self.y.clamp(0, n - 1),
            zoom: self.zoom,
        }
    }

    /// The tile one level up, or `None` at zoom 0.
    pub fn parent(&self) -> Option<Self> {
        self.ancestor(1)
    }

    /// The tile `levels` zoom levels up.
    pub fn ancestor(&self, levels: u8) -> Option<Self> {
        if levels > self.zoom {
            return None;
        }
        Some(Self {
            x: self.x >> levels,
            y: self.y >> levels,
            zoom: self.zoom - levels,
        })
    }

    /// The four tiles one level down, in row-major order.
    pub fn children(&self) -> Option<[Self; 4]> {
        if self.zoom >= MAX_ZOOM {
            return None;
        }
        let (x, y, z) = (self.x * 2, self.y * 2, self.zoom + 1);
        Some([
            Self::unchecked(x, y, z),
            Self::unchecked(x + 1, y, z),
            Self::unchecked(x, y + 1, z),
            Self::unchecked(x + 1, y + 1, z),
        ])
    }
}

impl fmt::Display for TileAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.y)
    }
}

/// Number of tiles along one axis at `zoom`.
#[inline]
pub fn tiles_per_axis(zoom: u8) -> i64 {
    1_i64 << zoom
}

/// Errors that can occur during coordinate conversion.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoordError {
    /// Zoom level is outside the supported range
    #[error("Invalid zoom level: {0} (must be between {min} and {max})", min = MIN_ZOOM, max = MAX_ZOOM)]
    InvalidZoom(u8),

    /// Tile index lies outside the grid for its zoom
    #[error("Tile {x}/{y} is outside the grid at zoom {zoom}")]
    OutOfGrid { x: i64, y: i64, zoom: u8 },
}
