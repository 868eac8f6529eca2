//! Datum shifts between the Bessel-based legacy frames and WGS84.
//!
//! Geodetic coordinates are lifted to geocentric XYZ, pushed through the
//! position-vector 7-parameter Helmert transform and dropped back to
//! geodetic on the target ellipsoid. Heights are not carried; the portal
//! data is two-dimensional.

use crate::gateway::coord::systems::{DatumShift, Ellipsoid};

const ARCSEC_TO_RAD: f64 = std::f64::consts::PI / (180.0 * 3600.0);

/// Geodetic (radians, h = 0) → geocentric XYZ in meters.
pub fn geodetic_to_geocentric(ell: Ellipsoid, lat: f64, lon: f64) -> [f64; 3] {
    let e2 = ell.e2();
    let sin_lat = lat.sin();
    let n = ell.a / (1.0 - e2 * sin_lat * sin_lat).sqrt();
    [
        n * lat.cos() * lon.cos(),
        n * lat.cos() * lon.sin(),
        n * (1.0 - e2) * sin_lat,
    ]
}

/// Geocentric XYZ → geodetic (radians) by fixed-point iteration on the
/// latitude. Converges to sub-millimeter in a handful of rounds at Korean
/// latitudes.
pub fn geocentric_to_geodetic(ell: Ellipsoid, xyz: [f64; 3]) -> (f64, f64) {
    let [x, y, z] = xyz;
    let e2 = ell.e2();
    let lon = y.atan2(x);
    let p = x.hypot(y);

    let mut lat = z.atan2(p * (1.0 - e2));
    for _ in 0..8 {
        let sin_lat = lat.sin();
        let n = ell.a / (1.0 - e2 * sin_lat * sin_lat).sqrt();
        lat = (z + e2 * n * sin_lat).atan2(p);
    }
    (lat, lon)
}

fn apply(shift: &DatumShift, xyz: [f64; 3], sign: f64) -> [f64; 3] {
    let rx = sign * shift.rx * ARCSEC_TO_RAD;
    let ry = sign * shift.ry * ARCSEC_TO_RAD;
    let rz = sign * shift.rz * ARCSEC_TO_RAD;
    let m = 1.0 + sign * shift.scale_ppm * 1e-6;
    let [x, y, z] = xyz;
    [
        sign * shift.dx + m * (x - rz * y + ry * z),
        sign * shift.dy + m * (rz * x + y - rx * z),
        sign * shift.dz + m * (-ry * x + rx * y + z),
    ]
}

/// Shift geocentric coordinates towards WGS84.
pub fn helmert_forward(shift: &DatumShift, xyz: [f64; 3]) -> [f64; 3] {
    apply(shift, xyz, 1.0)
}

/// Shift geocentric WGS84 coordinates back to the source datum. Uses the
/// negated parameters; the residual of this approximation is far below the
/// meter-level accuracy target.
pub fn helmert_inverse(shift: &DatumShift, xyz: [f64; 3]) -> [f64; 3] {
    apply(shift, xyz, -1.0)
}

/// Geodetic on a shifted datum → geodetic WGS84 (radians).
pub fn to_wgs84(
    ell: Ellipsoid,
    wgs84: Ellipsoid,
    shift: &DatumShift,
    lat: f64,
    lon: f64,
) -> (f64, f64) {
    let xyz = geodetic_to_geocentric(ell, lat, lon);
    geocentric_to_geodetic(wgs84, helmert_forward(shift, xyz))
}

/// Geodetic WGS84 → geodetic on a shifted datum (radians).
pub fn from_wgs84(
    ell: Ellipsoid,
    wgs84: Ellipsoid,
    shift: &DatumShift,
    lat: f64,
    lon: f64,
) -> (f64, f64) {
    let xyz = geodetic_to_geocentric(wgs84, lat, lon);
    geocentric_to_geodetic(ell, helmert_inverse(shift, xyz))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::coord::systems::{
        BESSEL_ELLIPSOID, KOREA_BESSEL_SHIFT, WGS84_ELLIPSOID,
    };

    #[test]
    fn test_geocentric_round_trip() {
        let lat = 37.5665_f64.to_radians();
        let lon = 126.978_f64.to_radians();
        let xyz = geodetic_to_geocentric(WGS84_ELLIPSOID, lat, lon);
        let (lat2, lon2) = geocentric_to_geodetic(WGS84_ELLIPSOID, xyz);
        assert!((lat - lat2).abs().to_degrees() < 1e-10);
        assert!((lon - lon2).abs().to_degrees() < 1e-10);
    }

    #[test]
    fn test_korea_shift_round_trip_within_centimeters() {
        let lat = 37.5665_f64.to_radians();
        let lon = 126.978_f64.to_radians();
        let (blat, blon) = from_wgs84(
            BESSEL_ELLIPSOID,
            WGS84_ELLIPSOID,
            &KOREA_BESSEL_SHIFT,
            lat,
            lon,
        );
        let (wlat, wlon) = to_wgs84(
            BESSEL_ELLIPSOID,
            WGS84_ELLIPSOID,
            &KOREA_BESSEL_SHIFT,
            blat,
            blon,
        );
        // ~1e-7 degrees is roughly a centimeter at these latitudes
        assert!((lat - wlat).abs().to_degrees() < 2e-7);
        assert!((lon - wlon).abs().to_degrees() < 2e-7);
    }

    #[test]
    fn test_korea_shift_moves_hundreds_of_meters() {
        let lat = 37.5665_f64.to_radians();
        let lon = 126.978_f64.to_radians();
        let (blat, blon) = from_wgs84(
            BESSEL_ELLIPSOID,
            WGS84_ELLIPSOID,
            &KOREA_BESSEL_SHIFT,
            lat,
            lon,
        );
        // the Korean datum shift is on the order of 300-400 m
        let dlat_m = (lat - blat).abs().to_degrees() * 111_000.0;
        let dlon_m = (lon - blon).abs().to_degrees() * 88_000.0;
        assert!(dlat_m + dlon_m > 100.0);
        assert!(dlat_m + dlon_m < 1_000.0);
    }
}
