//! Web Mercator row scheme used by imagery providers.

use std::f64::consts::PI;

use super::{round12, tiles_per_axis, TileScheme, MERCATOR_MAX_LAT};

/// Web Mercator tiles.
///
/// `y = 2^z * (0.5 - 0.25 * ln((1 + sin φ) / (1 - sin φ)) / π)`, clamped to
/// `[0, 2^z]`. Beyond [`MERCATOR_MAX_LAT`](super::MERCATOR_MAX_LAT) rows
/// saturate to the polar row since providers have no imagery there.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Mercator;

impl TileScheme for Mercator {
    fn name(&self) -> &'static str {
        "mercator"
    }

    #[inline]
    fn lat_to_y(&self, lat: f64, zoom: u8) -> f64 {
        let n = tiles_per_axis(zoom) as f64;
        if lat >= MERCATOR_MAX_LAT {
            return 0.0;
        }
        if lat <= -MERCATOR_MAX_LAT {
            return n;
        }
        let sin = lat.to_radians().sin();
        let y = n * (0.5 - 0.25 * ((1.0 + sin) / (1.0 - sin)).ln() / PI);
        round12(y.clamp(0.0, n))
    }

    #[inline]
    fn y_to_lat(&self, y: f64, zoom: u8) -> f64 {
        let n = tiles_per_axis(zoom) as f64;
        let lat_rad = (PI * (1.0 - 2.0 * y / n)).sinh().atan();
        round12(lat_rad.to_degrees())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equator_is_middle_row() {
        assert_eq!(Mercator.lat_to_y(0.0, 3), 4.0);
        assert_eq!(Mercator.y_to_lat(4.0, 3), 0.0);
    }

    #[test]
    fn test_max_lat_constant() {
        let derived = PI.sinh().atan().to_degrees();
        assert!((derived - MERCATOR_MAX_LAT).abs() < 1e-10);
        assert!((Mercator.y_to_lat(0.0, 5) - MERCATOR_MAX_LAT).abs() < 1e-9);
    }

    #[test]
    fn test_saturates_beyond_max_lat() {
        for zoom in [0u8, 1, 7, 15, 20] {
            let n = tiles_per_axis(zoom) as f64;
            assert_eq!(Mercator.lat_to_y(MERCATOR_MAX_LAT, zoom), 0.0);
            assert_eq!(Mercator.lat_to_y(-MERCATOR_MAX_LAT, zoom), n);
            assert_eq!(Mercator.lat_to_y(90.0, zoom), 0.0);
            assert_eq!(Mercator.lat_to_y(-90.0, zoom), n);
            assert_eq!(Mercator.lat_to_y(88.0, zoom), 0.0);
        }
    }

    #[test]
    fn test_new_york_row_at_zoom_16() {
        // Cross-checked against the common slippy-map formula
        let y = Mercator.lat_to_y(40.7128, 16).floor() as i64;
        assert_eq!(y, 24640);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn test_lat_roundtrip(lat in -85.05..85.05_f64, zoom in 0u8..=20) {
                let back = Mercator.y_to_lat(Mercator.lat_to_y(lat, zoom), zoom);
                prop_assert!((back - lat).abs() < 1e-6, "{} -> {}", lat, back);
            }

            #[test]
            fn test_rows_monotonic(a in -85.0..85.0_f64, b in -85.0..85.0_f64, zoom in 0u8..=18) {
                prop_assume!(a < b);
                prop_assert!(Mercator.lat_to_y(a, zoom) >= Mercator.lat_to_y(b, zoom));
            }
        }
    }
}
