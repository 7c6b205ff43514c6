//! Viewport geometry
//!
//! Converts a camera orbiting the sphere into the geographic region it can
//! see and the tile index box covering that region.
//!
//! # Camera model
//!
//! The camera sits at `distance` from the sphere center, directly above the
//! view-center coordinate. With zero pitch it looks straight at the center;
//! pitch tilts the view direction toward the top of the screen. Bearing
//! rotates the screen clockwise from north.
//!
//! Zoom and distance are two views of the same quantity. [`ViewportState`]
//! only exposes setters that recompute one from the other, so they cannot
//! drift apart.

mod polygon;
mod zoom;

pub use polygon::{project, visible_polygon, Pole, ScreenPoint, VisiblePolygon};
pub use zoom::{distance_from_zoom, tangent_fov, zoom_from_distance, MAX_VIEW_ZOOM};

use std::ops::RangeInclusive;

use thiserror::Error;
use tracing::debug;

use crate::coord::{round12, BoundingBox, Coordinate, TileScheme};
use crate::tilebox::TileIndexBox;

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Default vertical field of view
pub const DEFAULT_FOV_DEGREES: f64 = 45.0;

/// Default tile edge length in pixels
pub const DEFAULT_TILE_SIZE: u32 = 256;

/// Default viewport height in pixels
pub const DEFAULT_VIEWPORT_HEIGHT_PX: u32 = 800;

/// Pitch must stay strictly below this many degrees.
pub const MAX_PITCH: f64 = 90.0;

/// Errors raised by viewport contract violations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ViewportError {
    #[error("Invalid viewport geometry: {field} = {value}")]
    InvalidGeometry { field: &'static str, value: f64 },

    #[error("Camera distance {distance} is inside the sphere (radius {radius})")]
    DistanceInsideSphere { distance: f64, radius: f64 },

    #[error("Non-finite value for {field}")]
    NonFinite { field: &'static str },

    #[error("Latitude {0} is outside [-90, 90]")]
    InvalidLatitude(f64),

    #[error("Pitch {0} is outside [0, 90)")]
    InvalidPitch(f64),

    #[error("Aspect ratio {0} must be positive")]
    InvalidAspect(f64),

    #[error("Zoom {zoom} is below the minimum {min:.3} for this viewport")]
    ZoomBelowMinimum { zoom: f64, min: f64 },

    #[error("Visible arc underflows to zero")]
    ZeroChord,
}

/// Lens and screen parameters shared by every frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportGeometry {
    /// Sphere radius, in the same unit as camera distance
    pub radius: f64,
    /// Vertical field of view in degrees, in `(0, 180)`
    pub fov_degrees: f64,
    /// Tile edge length in pixels
    pub tile_size: u32,
    /// Viewport height in pixels
    pub viewport_height_px: u32,
}

impl Default for ViewportGeometry {
    fn default() -> Self {
        Self {
            radius: EARTH_RADIUS_M,
            fov_degrees: DEFAULT_FOV_DEGREES,
            tile_size: DEFAULT_TILE_SIZE,
            viewport_height_px: DEFAULT_VIEWPORT_HEIGHT_PX,
        }
    }
}

impl ViewportGeometry {
    /// Checks every field for a usable value.
    pub fn validate(&self) -> Result<(), ViewportError> {
        if !self.radius.is_finite() || self.radius <= 0.0 {
            return Err(ViewportError::InvalidGeometry {
                field: "radius",
                value: self.radius,
            });
        }
        if !self.fov_degrees.is_finite() || self.fov_degrees <= 0.0 || self.fov_degrees >= 180.0
        {
            return Err(ViewportError::InvalidGeometry {
                field: "fov_degrees",
                value: self.fov_degrees,
            });
        }
        if self.tile_size == 0 {
            return Err(ViewportError::InvalidGeometry {
                field: "tile_size",
                value: 0.0,
            });
        }
        if self.viewport_height_px == 0 {
            return Err(ViewportError::InvalidGeometry {
                field: "viewport_height_px",
                value: 0.0,
            });
        }
        Ok(())
    }

    /// Smallest zoom whose visible arc stays under 180°.
    pub fn min_zoom(&self) -> f64 {
        (2.0 * self.viewport_height_px as f64 / self.tile_size as f64).log2()
    }
}

/// Per-frame camera state.
///
/// Fields are private so zoom and distance can only change together.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewportState {
    geometry: ViewportGeometry,
    center: Coordinate,
    distance: f64,
    zoom: f64,
    bearing: f64,
    pitch: f64,
    aspect: f64,
}

impl ViewportState {
    /// Creates a state looking straight down at `center` from `zoom`.
    pub fn new(
        geometry: ViewportGeometry,
        center: Coordinate,
        zoom: f64,
    ) -> Result<Self, ViewportError> {
        let distance = distance_from_zoom(zoom, &geometry)?;
        let mut state = Self {
            geometry,
            center: Coordinate::new(0.0, 0.0),
            distance,
            zoom,
            bearing: 0.0,
            pitch: 0.0,
            aspect: 1.0,
        };
        state.set_center(center)?;
        Ok(state)
    }

    /// Creates a state at a given camera distance.
    pub fn with_distance(
        geometry: ViewportGeometry,
        center: Coordinate,
        distance: f64,
    ) -> Result<Self, ViewportError> {
        let zoom = zoom_from_distance(distance, &geometry)?;
        let mut state = Self {
            geometry,
            center: Coordinate::new(0.0, 0.0),
            distance,
            zoom,
            bearing: 0.0,
            pitch: 0.0,
            aspect: 1.0,
        };
        state.set_center(center)?;
        Ok(state)
    }

    pub fn geometry(&self) -> &ViewportGeometry {
        &self.geometry
    }

    pub fn center(&self) -> Coordinate {
        self.center
    }

    pub fn distance(&self) -> f64 {
        self.distance
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn bearing(&self) -> f64 {
        self.bearing
    }

    pub fn pitch(&self) -> f64 {
        self.pitch
    }

    pub fn aspect(&self) -> f64 {
        self.aspect
    }

    /// Sets the zoom and recomputes the distance.
    pub fn set_zoom(&mut self, zoom: f64) -> Result<(), ViewportError> {
        let distance = distance_from_zoom(zoom, &self.geometry)?;
        self.zoom = zoom;
        self.distance = distance;
        Ok(())
    }

    /// Sets the distance and recomputes the zoom.
    pub fn set_distance(&mut self, distance: f64) -> Result<(), ViewportError> {
        let zoom = zoom_from_distance(distance, &self.geometry)?;
        self.distance = distance;
        self.zoom = zoom;
        Ok(())
    }

    /// Moves the view center. Longitude wraps into `[-180, 180)`.
    pub fn set_center(&mut self, center: Coordinate) -> Result<(), ViewportError> {
        if !center.is_finite() {
            return Err(ViewportError::NonFinite { field: "center" });
        }
        if !(-90.0..=90.0).contains(&center.lat) {
            return Err(ViewportError::InvalidLatitude(center.lat));
        }
        let lng = (center.lng + 180.0).rem_euclid(360.0) - 180.0;
        self.center = Coordinate::new(lng, center.lat);
        Ok(())
    }

    /// Sets the bearing in degrees, normalized to `[0, 360)`.
    pub fn set_bearing(&mut self, bearing: f64) -> Result<(), ViewportError> {
        if !bearing.is_finite() {
            return Err(ViewportError::NonFinite { field: "bearing" });
        }
        self.bearing = bearing.rem_euclid(360.0);
        Ok(())
    }

    pub fn set_pitch(&mut self, pitch: f64) -> Result<(), ViewportError> {
        if !pitch.is_finite() || !(0.0..MAX_PITCH).contains(&pitch) {
            return Err(ViewportError::InvalidPitch(pitch));
        }
        self.pitch = pitch;
        Ok(())
    }

    /// Sets the screen aspect ratio (width / height).
    pub fn set_aspect(&mut self, aspect: f64) -> Result<(), ViewportError> {
        if !aspect.is_finite() || aspect <= 0.0 {
            return Err(ViewportError::InvalidAspect(aspect));
        }
        self.aspect = aspect;
        Ok(())
    }
}

/// Integer tile zoom for a fractional view zoom: `ceil(zoom)` clamped to the
/// provider range.
pub fn tile_zoom(zoom: f64, range: RangeInclusive<u8>) -> u8 {
    let (min, max) = (*range.start(), *range.end());
    let z = round12(zoom).ceil();
    if !z.is_finite() {
        return max;
    }
    z.clamp(min as f64, max as f64) as u8
}

/// Computes the visible bounding box and the tile index box covering it.
///
/// # Arguments
///
/// * `state` - Current camera state
/// * `scheme` - Tile scheme the box is expressed in
/// * `zoom_range` - Tile zooms the provider can serve
///
/// # Returns
///
/// The bounding box of the visible polygon and the (possibly unnormalized)
/// tile index box covering it.
pub fn compute_viewport_bbox_and_tile_box(
    state: &ViewportState,
    scheme: &dyn TileScheme,
    zoom_range: RangeInclusive<u8>,
) -> (BoundingBox, TileIndexBox) {
    let polygon = visible_polygon(state);
    let bbox = polygon.bounding_box();
    let zoom = tile_zoom(state.zoom(), zoom_range);
    let tile_box = scheme.bbox_to_tile_index_box(&bbox, zoom);
    debug!(
        scheme = scheme.name(),
        zoom,
        west = bbox.west,
        south = bbox.south,
        east = bbox.east,
        north = bbox.north,
        tiles = tile_box.tile_count(),
        "Computed viewport tile box"
    );
    (bbox, tile_box)
}
