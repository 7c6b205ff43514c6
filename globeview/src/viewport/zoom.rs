//! Camera distance ↔ zoom conversion.
//!
//! Zoom is defined through the angular size of one screen pixel: at zoom `z`
//! a pixel covers `360 / (2^z · tile_size)` degrees of central angle, so the
//! viewport height covers `px_deg · viewport_height_px` degrees. The camera
//! distance is the one at which the vertical field of view spans exactly
//! that central angle on the sphere.
//!
//! Two regimes exist. While the edge rays of the field of view still hit the
//! sphere, the visible arc is where those rays land. Once the camera is far
//! enough that the field of view is wider than the tangent cone, the visible
//! arc is bounded by the horizon and has the closed form
//! `180° - tangent_fov`.

use super::{ViewportError, ViewportGeometry};

/// Zoom reported for a camera sitting on the surface.
pub const MAX_VIEW_ZOOM: f64 = 24.0;

/// Full apex angle (degrees) of the cone from the camera tangent to the
/// sphere: `2·asin(R / distance)`.
pub fn tangent_fov(distance: f64, radius: f64) -> f64 {
    2.0 * (radius / distance).min(1.0).asin().to_degrees()
}

/// Degrees of central angle covered by one pixel at `zoom`.
#[inline]
fn pixel_degrees(zoom: f64, tile_size: u32) -> f64 {
    360.0 / (zoom.exp2() * tile_size as f64)
}

/// Camera distance from the sphere center for a zoom level.
///
/// # Errors
///
/// Returns [`ViewportError::ZoomBelowMinimum`] when the zoom would need the
/// viewport to span 180° or more of the sphere (the camera would sit at
/// infinity), and [`ViewportError::ZeroChord`] when the zoom is so large the
/// visible arc underflows to zero.
pub fn distance_from_zoom(zoom: f64, geometry: &ViewportGeometry) -> Result<f64, ViewportError> {
    geometry.validate()?;
    if !zoom.is_finite() {
        return Err(ViewportError::NonFinite { field: "zoom" });
    }

    let radius = geometry.radius;
    let central_deg = pixel_degrees(zoom, geometry.tile_size) * geometry.viewport_height_px as f64;
    if central_deg >= 180.0 {
        return Err(ViewportError::ZoomBelowMinimum {
            zoom,
            min: geometry.min_zoom(),
        });
    }
    if central_deg <= 0.0 {
        return Err(ViewportError::ZeroChord);
    }

    let half_central = (central_deg / 2.0).to_radians();
    if central_deg >= 180.0 - geometry.fov_degrees {
        // Horizon-bounded: the visible half-arc is acos(R / d)
        return Ok(radius / half_central.cos());
    }

    let half_chord = radius * half_central.sin();
    let camera_to_chord = half_chord / (geometry.fov_degrees / 2.0).to_radians().tan();
    // Larger root of x² = R² - h²; the negative root lies behind the center.
    let chord_to_center = (radius * radius - half_chord * half_chord).sqrt();
    Ok(camera_to_chord + chord_to_center)
}

/// Zoom level for a camera at `distance` from the sphere center.
///
/// A camera exactly on the surface reports [`MAX_VIEW_ZOOM`]. Any camera
/// above it gets the exact zoom, however large, so that
/// [`distance_from_zoom`] maps it back to the same distance.
///
/// # Errors
///
/// Returns [`ViewportError::DistanceInsideSphere`] when `distance < radius`.
pub fn zoom_from_distance(distance: f64, geometry: &ViewportGeometry) -> Result<f64, ViewportError> {
    geometry.validate()?;
    if !distance.is_finite() {
        return Err(ViewportError::NonFinite { field: "distance" });
    }
    let radius = geometry.radius;
    if distance < radius {
        return Err(ViewportError::DistanceInsideSphere { distance, radius });
    }

    let tangent = tangent_fov(distance, radius);
    let central_deg = if geometry.fov_degrees >= tangent {
        180.0 - tangent
    } else {
        // First hit of the edge ray: smaller root of
        // (1 + tan²θ)x² - 2·d·x + (d² - R²) = 0, x measured along the view axis.
        let tan_half = (geometry.fov_degrees / 2.0).to_radians().tan();
        let a = 1.0 + tan_half * tan_half;
        let c = distance * distance - radius * radius;
        let disc = (distance * distance - a * c).max(0.0);
        let x = c / (distance + disc.sqrt());
        2.0 * (x * tan_half).atan2(distance - x).to_degrees()
    };

    let px_deg = central_deg / geometry.viewport_height_px as f64;
    let zoom = (360.0 / px_deg / geometry.tile_size as f64).log2();
    if zoom.is_finite() {
        Ok(zoom)
    } else {
        Ok(MAX_VIEW_ZOOM)
    }
}
