//! 坐标转换
//!
//! WGS84 geodetic <-> ECEF <-> local East-North-Up.
//!
//! Everything is `f64`: ECEF coordinates are ~6.4e6 m and the ulp at that
//! magnitude is ~1e-9 m, which keeps sub-millimetre differences exact enough
//! for the ENU deltas dead reckoning produces.

use nalgebra::{Matrix3, Vector3};

use crate::global_types::GeodeticPosition;

/// WGS84 semi-major axis [m].
pub const WGS84_A: f64 = 6378137.0;
/// WGS84 flattening.
pub const WGS84_F: f64 = 1.0 / 298.257223563;
/// First eccentricity squared.
pub const WGS84_E2: f64 = 2.0 * WGS84_F - WGS84_F * WGS84_F;

const MAX_LATITUDE_ITERATIONS: usize = 5;
const LATITUDE_TOLERANCE_RAD: f64 = 1e-9;

/// Prime vertical radius of curvature.
#[inline]
fn prime_vertical_radius(lat_rad: f64) -> f64 {
    let s = lat_rad.sin();
    WGS84_A / (1.0 - WGS84_E2 * s * s).sqrt()
}

pub fn geodetic_to_ecef(latitude_deg: f64, longitude_deg: f64, altitude_m: f64) -> Vector3<f64> {
    let lat = latitude_deg.to_radians();
    let lon = longitude_deg.to_radians();
    let n = prime_vertical_radius(lat);
    Vector3::new(
        (n + altitude_m) * lat.cos() * lon.cos(),
        (n + altitude_m) * lat.cos() * lon.sin(),
        (n * (1.0 - WGS84_E2) + altitude_m) * lat.sin(),
    )
}

/// ECEF -> (latitude_deg, longitude_deg, altitude_m) by iterative latitude refinement.
pub fn ecef_to_geodetic(ecef: &Vector3<f64>) -> (f64, f64, f64) {
    let (x, y, z) = (ecef.x, ecef.y, ecef.z);
    let p = (x * x + y * y).sqrt();

    let mut lat = z.atan2(p * (1.0 - WGS84_E2));
    for _ in 0..MAX_LATITUDE_ITERATIONS {
        let n = prime_vertical_radius(lat);
        let h = p / lat.cos() - n;
        let lat_new = z.atan2(p * (1.0 - WGS84_E2 * n / (n + h)));
        let converged = (lat_new - lat).abs() < LATITUDE_TOLERANCE_RAD;
        lat = lat_new;
        if converged {
            break;
        }
    }

    let lon = y.atan2(x);
    let h = p / lat.cos() - prime_vertical_radius(lat);
    (lat.to_degrees(), lon.to_degrees(), h)
}

/// Rotation taking ECEF deltas into East-North-Up at the given origin.
pub fn ecef_to_enu_rotation(latitude_deg: f64, longitude_deg: f64) -> Matrix3<f64> {
    let (sin_lat, cos_lat) = latitude_deg.to_radians().sin_cos();
    let (sin_lon, cos_lon) = longitude_deg.to_radians().sin_cos();
    Matrix3::new(
        -sin_lon,
        cos_lon,
        0.0,
        -sin_lat * cos_lon,
        -sin_lat * sin_lon,
        cos_lat,
        cos_lat * cos_lon,
        cos_lat * sin_lon,
        sin_lat,
    )
}

impl GeodeticPosition {
    pub fn to_ecef(&self) -> Vector3<f64> {
        geodetic_to_ecef(self.latitude_deg, self.longitude_deg, self.altitude_m)
    }

    /// Position of `self` in the ENU frame centred at `origin`.
    pub fn to_enu(&self, origin: &GeodeticPosition) -> Vector3<f64> {
        let delta = self.to_ecef() - origin.to_ecef();
        ecef_to_enu_rotation(origin.latitude_deg, origin.longitude_deg) * delta
    }

    /// Geodetic position of an ENU offset from `origin`.
    ///
    /// The result carries no fix metadata: it is derived, not observed.
    pub fn from_enu(enu: &Vector3<f64>, origin: &GeodeticPosition) -> GeodeticPosition {
        let rotation = ecef_to_enu_rotation(origin.latitude_deg, origin.longitude_deg);
        let ecef = origin.to_ecef() + rotation.transpose() * enu;
        let (latitude_deg, longitude_deg, altitude_m) = ecef_to_geodetic(&ecef);
        GeodeticPosition::new(latitude_deg, longitude_deg, altitude_m)
    }

    /// Straight-line ECEF distance. A chord, not a great-circle arc, so only
    /// meaningful for short baselines.
    pub fn distance_to(&self, other: &GeodeticPosition) -> f64 {
        (other.to_ecef() - self.to_ecef()).norm()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    fn references() -> Vec<GeodeticPosition> {
        vec![
            GeodeticPosition::new(52.2297, 21.0122, 110.0),
            GeodeticPosition::new(-33.8688, 151.2093, 58.0),
            GeodeticPosition::new(64.1466, -21.9426, 0.0),
            GeodeticPosition::new(0.5, -78.4678, 2850.0),
        ]
    }

    #[test]
    fn ecef_of_equator_prime_meridian() {
        let ecef = geodetic_to_ecef(0.0, 0.0, 0.0);
        assert_relative_eq!(ecef.x, WGS84_A);
        assert_abs_diff_eq!(ecef.y, 0.0);
        assert_abs_diff_eq!(ecef.z, 0.0);
    }

    #[test]
    fn ecef_geodetic_round_trip() {
        for p in references() {
            let (lat, lon, alt) = ecef_to_geodetic(&p.to_ecef());
            assert_abs_diff_eq!(lat, p.latitude_deg, epsilon = 1e-9);
            assert_abs_diff_eq!(lon, p.longitude_deg, epsilon = 1e-9);
            assert_abs_diff_eq!(alt, p.altitude_m, epsilon = 1e-3);
        }
    }

    #[test]
    fn origin_maps_to_zero() {
        for origin in references() {
            let enu = origin.to_enu(&origin);
            assert_abs_diff_eq!(enu.norm(), 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn enu_axes_point_the_right_way() {
        let origin = GeodeticPosition::new(52.0, 21.0, 100.0);
        let north = GeodeticPosition::new(52.001, 21.0, 100.0).to_enu(&origin);
        assert!(north.y > 100.0);
        assert_abs_diff_eq!(north.x, 0.0, epsilon = 1e-6);

        let east = GeodeticPosition::new(52.0, 21.001, 100.0).to_enu(&origin);
        assert!(east.x > 60.0);
        assert_abs_diff_eq!(east.y, 0.0, epsilon = 1e-3);

        let up = GeodeticPosition::new(52.0, 21.0, 150.0).to_enu(&origin);
        assert_abs_diff_eq!(up.z, 50.0, epsilon = 1e-6);
    }

    #[test]
    fn geodetic_round_trip_through_enu() {
        let offsets = [
            (0.0, 0.0, 0.0),
            (1e-6, -2e-6, 0.3),
            (0.01, 0.02, -40.0),
            (0.3, -0.4, 350.0),
            (-0.2, 0.3, 1200.0),
        ];
        for origin in references() {
            for (dlat, dlon, dalt) in offsets {
                let p = GeodeticPosition::new(
                    origin.latitude_deg + dlat,
                    origin.longitude_deg + dlon,
                    origin.altitude_m + dalt,
                );
                let enu = p.to_enu(&origin);
                assert!(enu.norm() < 60_000.0);
                let back = GeodeticPosition::from_enu(&enu, &origin);
                assert_abs_diff_eq!(back.latitude_deg, p.latitude_deg, epsilon = 1e-6);
                assert_abs_diff_eq!(back.longitude_deg, p.longitude_deg, epsilon = 1e-6);
                assert_abs_diff_eq!(back.altitude_m, p.altitude_m, epsilon = 0.1);
            }
        }
    }

    #[test]
    fn enu_round_trip_through_geodetic() {
        let origin = GeodeticPosition::new(52.2297, 21.0122, 110.0);
        for enu in [
            Vector3::new(10.0, 0.0, 0.0),
            Vector3::new(-2500.0, 4000.0, 12.0),
            Vector3::new(35_000.0, -35_000.0, 0.0),
        ] {
            let p = GeodeticPosition::from_enu(&enu, &origin);
            let back = p.to_enu(&origin);
            assert_abs_diff_eq!((back - enu).norm(), 0.0, epsilon = 1e-3);
        }
    }

    #[test]
    fn chord_distance() {
        let a = GeodeticPosition::new(52.0, 21.0, 0.0);
        let b = GeodeticPosition::new(52.0, 21.0, 25.0);
        assert_relative_eq!(a.distance_to(&b), 25.0, epsilon = 1e-6);

        // one arc-minute of latitude is roughly one nautical mile
        let c = GeodeticPosition::new(52.0 + 1.0 / 60.0, 21.0, 0.0);
        let d = a.distance_to(&c);
        assert!((1850.0..1860.0).contains(&d), "d = {d}");
        assert_relative_eq!(d, c.distance_to(&a));
    }

    #[test]
    fn rotation_is_orthonormal() {
        let r = ecef_to_enu_rotation(47.3, 8.5);
        assert_abs_diff_eq!((r * r.transpose() - Matrix3::identity()).norm(), 0.0, epsilon = 1e-12);
    }
}
