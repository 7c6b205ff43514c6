//! Visible polygon construction.
//!
//! Rays are cast through eight points on the screen boundary (edge midpoints
//! and corners) and unprojected onto the sphere. Rays that miss the sphere
//! land on the horizon circle instead. The resulting ring is then fixed up
//! for the two singular cases of longitude/latitude space:
//!
//! - a visible pole: the ring winds around it, so it is cut at the
//!   antimeridian and closed through the pole;
//! - the antimeridian inside the view: vertices on the far side are shifted
//!   by 360° so the ring stays simple.

use glam::{DQuat, DVec3};
use tracing::warn;

use super::ViewportState;
use crate::coord::{round12, BoundingBox, Coordinate};

/// Angles below this are treated as zero when solving triangles.
const ANGLE_EPSILON: f64 = 1e-12;

/// Which pole the visible ring was routed through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pole {
    North,
    South,
}

impl Pole {
    fn latitude(self) -> f64 {
        match self {
            Pole::North => 90.0,
            Pole::South => -90.0,
        }
    }
}

/// Normalized screen position. Both axes span `[-1, 1]` across the viewport,
/// `y` pointing up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

/// Geographic outline of the visible region.
#[derive(Debug, Clone, PartialEq)]
pub struct VisiblePolygon {
    pub vertices: Vec<Coordinate>,
    pub pole: Option<Pole>,
}

impl VisiblePolygon {
    /// The whole sphere, used when the outline degenerates.
    pub fn full_sphere() -> Self {
        Self {
            vertices: vec![
                Coordinate::new(-180.0, -90.0),
                Coordinate::new(180.0, -90.0),
                Coordinate::new(180.0, 90.0),
                Coordinate::new(-180.0, 90.0),
            ],
            pole: None,
        }
    }

    /// Axis-aligned bounds over the vertices.
    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::from_coordinates(&self.vertices).unwrap_or_else(BoundingBox::full_sphere)
    }
}

/// Camera basis in world space, sphere centered at the origin. World axes:
/// `x` toward (0°, 0°), `y` toward (90°E, 0°), `z` toward the north pole.
struct CameraFrame {
    position: DVec3,
    forward: DVec3,
    right: DVec3,
    up: DVec3,
    radius: f64,
    tan_half_fov: f64,
    aspect: f64,
}

impl CameraFrame {
    fn new(state: &ViewportState) -> Self {
        let center = state.center();
        let (lng, lat) = (center.lng.to_radians(), center.lat.to_radians());
        let nadir = DVec3::new(lat.cos() * lng.cos(), lat.cos() * lng.sin(), lat.sin());
        let east = DVec3::new(-lng.sin(), lng.cos(), 0.0);
        let north = nadir.cross(east);

        let (sin_b, cos_b) = state.bearing().to_radians().sin_cos();
        let ground_up = north * cos_b + east * sin_b;
        let right = east * cos_b - north * sin_b;

        let (sin_p, cos_p) = state.pitch().to_radians().sin_cos();
        let forward = -nadir * cos_p + ground_up * sin_p;
        let up = nadir * sin_p + ground_up * cos_p;

        Self {
            position: nadir * state.distance(),
            forward,
            right,
            up,
            radius: state.geometry().radius,
            tan_half_fov: (state.geometry().fov_degrees / 2.0).to_radians().tan(),
            aspect: state.aspect(),
        }
    }

    /// Ray through a point on the image plane, in units of the half-height.
    fn ray(&self, px: f64, py: f64) -> DVec3 {
        (self.forward + (self.right * px + self.up * py) * self.tan_half_fov).normalize()
    }

    /// Where a ray from the camera meets the sphere, or the horizon point in
    /// the ray's direction if it misses.
    fn unproject(&self, dir: DVec3) -> DVec3 {
        let distance = self.position.length();
        let to_center = -self.position / distance;
        let gamma = dir.dot(to_center).clamp(-1.0, 1.0).acos();
        let half_tangent = (self.radius / distance).min(1.0).asin();

        if gamma > half_tangent {
            // Miss: rotate the camera direction toward the ray by the
            // horizon's central angle.
            let axis = self.position.cross(dir).normalize();
            let horizon = (self.radius / distance).min(1.0).acos();
            let rotated = DQuat::from_axis_angle(axis, horizon) * (self.position / distance);
            return rotated * self.radius;
        }

        if gamma < ANGLE_EPSILON {
            return self.position + dir * (distance - self.radius);
        }

        // Law of sines in (center, camera, hit). The angle at the hit point
        // is obtuse for the near-side intersection.
        let sin_at_hit = (distance * gamma.sin() / self.radius).min(1.0);
        let central = sin_at_hit.asin() - gamma;
        let t = self.radius * central.sin() / gamma.sin();
        self.position + dir * t
    }

    fn project(&self, point: DVec3) -> Option<ScreenPoint> {
        // Behind the horizon
        if self.position.dot(point.normalize()) <= self.radius {
            return None;
        }
        let v = point - self.position;
        let depth = v.dot(self.forward);
        if depth <= 0.0 {
            return None;
        }
        let x = v.dot(self.right) / (depth * self.tan_half_fov * self.aspect);
        let y = v.dot(self.up) / (depth * self.tan_half_fov);
        if x.abs() > 1.0 || y.abs() > 1.0 {
            return None;
        }
        Some(ScreenPoint { x, y })
    }
}

fn to_world(coordinate: &Coordinate, radius: f64) -> DVec3 {
    let (lng, lat) = (coordinate.lng.to_radians(), coordinate.lat.to_radians());
    DVec3::new(lat.cos() * lng.cos(), lat.cos() * lng.sin(), lat.sin()) * radius
}

fn to_coordinate(point: DVec3) -> Coordinate {
    let lat = (point.z / point.length()).clamp(-1.0, 1.0).asin().to_degrees();
    let lng = point.y.atan2(point.x).to_degrees();
    Coordinate::new(lng, lat)
}

/// Forward-projects a geographic point into normalized screen coordinates.
///
/// Returns `None` when the point is behind the horizon or outside the
/// viewport.
pub fn project(coordinate: &Coordinate, state: &ViewportState) -> Option<ScreenPoint> {
    let frame = CameraFrame::new(state);
    frame.project(to_world(coordinate, frame.radius))
}

/// Screen-boundary sample angles, clockwise from screen-up.
///
/// Edge midpoints sit at multiples of 90°, corners at `±atan(aspect)` from
/// the vertical. Angles that round onto an earlier one are dropped.
fn boundary_angles(aspect: f64) -> Vec<f64> {
    let diagonal = aspect.atan().to_degrees();
    let mut angles: Vec<f64> = Vec::with_capacity(8);
    for base in [0.0, 180.0] {
        for a in [0.0, diagonal, 90.0, 180.0 - diagonal] {
            let angle = round12(base + a);
            if !angles.iter().any(|&seen| seen == angle) {
                angles.push(angle);
            }
        }
    }
    angles
}

/// Point on the screen rectangle boundary in the direction `angle`, in units
/// of the half-height.
fn boundary_point(angle_deg: f64, aspect: f64) -> (f64, f64) {
    let (s, c) = angle_deg.to_radians().sin_cos();
    let scale_x = if s.abs() > ANGLE_EPSILON { aspect / s.abs() } else { f64::INFINITY };
    let scale_y = if c.abs() > ANGLE_EPSILON { 1.0 / c.abs() } else { f64::INFINITY };
    let scale = scale_x.min(scale_y);
    (s * scale, c * scale)
}

/// Builds the geographic outline of everything the camera can see.
pub fn visible_polygon(state: &ViewportState) -> VisiblePolygon {
    let frame = CameraFrame::new(state);

    let ring: Vec<Coordinate> = boundary_angles(frame.aspect)
        .into_iter()
        .map(|angle| {
            let (px, py) = boundary_point(angle, frame.aspect);
            to_coordinate(frame.unproject(frame.ray(px, py)))
        })
        .collect();

    if ring.len() < 3 || ring.iter().any(|c| !c.is_finite()) {
        warn!(
            lng = state.center().lng,
            lat = state.center().lat,
            distance = state.distance(),
            "Degenerate visible polygon, falling back to full sphere"
        );
        return VisiblePolygon::full_sphere();
    }

    let north = Coordinate::new(0.0, 90.0);
    let south = Coordinate::new(0.0, -90.0);
    let pole = if frame.project(to_world(&north, frame.radius)).is_some() {
        Some(Pole::North)
    } else if frame.project(to_world(&south, frame.radius)).is_some() {
        Some(Pole::South)
    } else {
        None
    };

    match pole {
        Some(pole) => {
            let far_lat = match pole {
                Pole::North => ring.iter().map(|c| c.lat).fold(90.0, f64::min),
                Pole::South => ring.iter().map(|c| c.lat).fold(-90.0, f64::max),
            };
            match route_through_pole(ring, pole) {
                Some(vertices) => VisiblePolygon {
                    vertices,
                    pole: Some(pole),
                },
                None => {
                    warn!(?pole, "Could not cut visible ring at the antimeridian");
                    let cap = pole.latitude();
                    VisiblePolygon {
                        vertices: vec![
                            Coordinate::new(-180.0, far_lat),
                            Coordinate::new(180.0, far_lat),
                            Coordinate::new(180.0, cap),
                            Coordinate::new(-180.0, cap),
                        ],
                        pole: Some(pole),
                    }
                }
            }
        }
        None => match simple_ring(ring.clone(), state.center().lng) {
            Some(vertices) => VisiblePolygon {
                vertices,
                pole: None,
            },
            None => {
                warn!(
                    lng = state.center().lng,
                    lat = state.center().lat,
                    "Visible ring winds around a pole, using a full-longitude band"
                );
                VisiblePolygon {
                    vertices: longitude_band(&ring),
                    pole: None,
                }
            }
        },
    }
}

/// Unwraps a ring that does not enclose a pole so no edge jumps more than
/// 180° of longitude.
///
/// Vertices are first shifted relative to the view center. If the visible
/// region lies across the pole from the center, jumps remain; the ring is
/// then unwrapped vertex by vertex and recentered. Returns `None` when the
/// closing edge still jumps, meaning the ring winds around a pole.
fn simple_ring(ring: Vec<Coordinate>, center_lng: f64) -> Option<Vec<Coordinate>> {
    let mut ring = unwrap_antimeridian(ring, center_lng);
    if seam_jumps(&ring).is_empty() {
        return Some(ring);
    }

    for i in 1..ring.len() {
        let prev = ring[i - 1].lng;
        let v = &mut ring[i];
        v.lng -= 360.0 * ((v.lng - prev) / 360.0).round();
    }
    if !seam_jumps(&ring).is_empty() {
        return None;
    }

    let mean = ring.iter().map(|c| c.lng).sum::<f64>() / ring.len() as f64;
    let shift = 360.0 * (mean / 360.0).round();
    for v in &mut ring {
        v.lng -= shift;
    }
    Some(ring)
}

/// All longitudes between the ring's latitude extremes, extended to the pole
/// on the ring's side of the equator.
fn longitude_band(ring: &[Coordinate]) -> Vec<Coordinate> {
    let mut south = ring.iter().map(|c| c.lat).fold(f64::INFINITY, f64::min);
    let mut north = ring.iter().map(|c| c.lat).fold(f64::NEG_INFINITY, f64::max);
    if south + north >= 0.0 {
        north = 90.0;
    } else {
        south = -90.0;
    }
    vec![
        Coordinate::new(-180.0, south),
        Coordinate::new(180.0, south),
        Coordinate::new(180.0, north),
        Coordinate::new(-180.0, north),
    ]
}

/// Shifts vertices more than 180° from the view center by ∓360°.
fn unwrap_antimeridian(mut ring: Vec<Coordinate>, center_lng: f64) -> Vec<Coordinate> {
    for v in &mut ring {
        let delta = v.lng - center_lng;
        if delta > 180.0 {
            v.lng -= 360.0;
        } else if delta < -180.0 {
            v.lng += 360.0;
        }
    }
    ring
}

/// Indices of closed-ring edges whose longitude jumps more than 180°.
fn seam_jumps(ring: &[Coordinate]) -> Vec<usize> {
    let n = ring.len();
    (0..n)
        .filter(|&i| (ring[(i + 1) % n].lng - ring[i].lng).abs() > 180.0)
        .collect()
}

/// Index of the single ring edge that jumps across the antimeridian.
fn antimeridian_crossing(ring: &[Coordinate]) -> Option<usize> {
    match seam_jumps(ring).as_slice() {
        [i] => Some(*i),
        _ => None,
    }
}

/// Cuts a ring winding around `pole` at the antimeridian and closes it
/// through the pole.
///
/// The ring is first oriented eastward so the output always runs from
/// `(-180, lat)` to `(180, lat)`. Returns `None` if the ring does not cross
/// the antimeridian exactly once.
fn route_through_pole(mut ring: Vec<Coordinate>, pole: Pole) -> Option<Vec<Coordinate>> {
    let n = ring.len();
    let mut i = antimeridian_crossing(&ring)?;
    if ring[(i + 1) % n].lng > ring[i].lng {
        // Westward: jump goes from the -180 side up to the +180 side
        ring.reverse();
        i = antimeridian_crossing(&ring)?;
    }

    let a = ring[i];
    let b = ring[(i + 1) % n];
    let b_lng = b.lng + 360.0;
    let t = if (b_lng - a.lng).abs() > ANGLE_EPSILON {
        (180.0 - a.lng) / (b_lng - a.lng)
    } else {
        0.0
    };
    let lat_cross = a.lat + t * (b.lat - a.lat);
    let pole_lat = pole.latitude();

    let mut out = Vec::with_capacity(n + 4);
    out.push(Coordinate::new(-180.0, pole_lat));
    out.push(Coordinate::new(-180.0, lat_cross));
    out.extend((1..=n).map(|k| ring[(i + k) % n]));
    out.push(Coordinate::new(180.0, lat_cross));
    out.push(Coordinate::new(180.0, pole_lat));
    out.dedup_by(|b, a| {
        round12(a.lng) == round12(b.lng) && round12(a.lat) == round12(b.lat)
    });
    Some(out)
}
