//! Transverse-Mercator projection math.
//!
//! The standard meridian-arc series formulation, accurate to well under a
//! meter for the narrow belts used by the Korean systems.

use crate::gateway::coord::systems::{Ellipsoid, SystemDef};

/// Projection constants for one system, precomputed once per conversion.
#[derive(Debug, Clone, Copy)]
pub struct TmParams {
    pub lat0: f64,
    pub lon0: f64,
    pub k0: f64,
    pub false_easting: f64,
    pub false_northing: f64,
    pub ellipsoid: Ellipsoid,
}

impl TmParams {
    pub fn from_def(def: &SystemDef) -> Self {
        let (lat0, lon0) = def.origin.unwrap_or((0.0, 0.0));
        Self {
            lat0: lat0.to_radians(),
            lon0: lon0.to_radians(),
            k0: def.scale_factor,
            false_easting: def.false_easting,
            false_northing: def.false_northing,
            ellipsoid: def.ellipsoid,
        }
    }
}

/// Meridian arc length from the equator to `phi`.
fn meridian_arc(ell: Ellipsoid, phi: f64) -> f64 {
    let a = ell.a;
    let e2 = ell.e2();
    let e4 = e2 * e2;
    let e6 = e4 * e2;
    a * ((1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * phi
        - (3.0 * e2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * phi).sin()
        + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * phi).sin()
        - (35.0 * e6 / 3072.0) * (6.0 * phi).sin())
}

/// Geodetic (radians) → projected meters.
pub fn forward(p: &TmParams, lat: f64, lon: f64) -> (f64, f64) {
    let ell = p.ellipsoid;
    let e2 = ell.e2();
    let ep2 = ell.ep2();

    let sin_lat = lat.sin();
    let cos_lat = lat.cos();
    let n = ell.a / (1.0 - e2 * sin_lat * sin_lat).sqrt();
    let t = lat.tan().powi(2);
    let c = ep2 * cos_lat * cos_lat;
    let a = cos_lat * (lon - p.lon0);
    let a2 = a * a;
    let a3 = a2 * a;
    let a4 = a3 * a;
    let a5 = a4 * a;
    let a6 = a5 * a;

    let m = meridian_arc(ell, lat);
    let m0 = meridian_arc(ell, p.lat0);

    let x = p.k0
        * n
        * (a + (1.0 - t + c) * a3 / 6.0
            + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * ep2) * a5 / 120.0)
        + p.false_easting;
    let y = p.k0
        * (m - m0
            + n * lat.tan()
                * (a2 / 2.0
                    + (5.0 - t + 9.0 * c + 4.0 * c * c) * a4 / 24.0
                    + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * ep2) * a6 / 720.0))
        + p.false_northing;

    (x, y)
}

/// Projected meters → geodetic (radians).
pub fn inverse(p: &TmParams, x: f64, y: f64) -> (f64, f64) {
    let ell = p.ellipsoid;
    let a = ell.a;
    let e2 = ell.e2();
    let ep2 = ell.ep2();
    let e4 = e2 * e2;
    let e6 = e4 * e2;

    let m = (y - p.false_northing) / p.k0 + meridian_arc(ell, p.lat0);
    let mu = m / (a * (1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0));

    let e1 = (1.0 - (1.0 - e2).sqrt()) / (1.0 + (1.0 - e2).sqrt());
    let e1_2 = e1 * e1;
    let e1_3 = e1_2 * e1;
    let e1_4 = e1_3 * e1;

    // footprint latitude
    let phi1 = mu
        + (3.0 * e1 / 2.0 - 27.0 * e1_3 / 32.0) * (2.0 * mu).sin()
        + (21.0 * e1_2 / 16.0 - 55.0 * e1_4 / 32.0) * (4.0 * mu).sin()
        + (151.0 * e1_3 / 96.0) * (6.0 * mu).sin()
        + (1097.0 * e1_4 / 512.0) * (8.0 * mu).sin();

    let sin_phi1 = phi1.sin();
    let cos_phi1 = phi1.cos();
    let tan_phi1 = phi1.tan();

    let c1 = ep2 * cos_phi1 * cos_phi1;
    let t1 = tan_phi1 * tan_phi1;
    let n1 = a / (1.0 - e2 * sin_phi1 * sin_phi1).sqrt();
    let r1 = a * (1.0 - e2) / (1.0 - e2 * sin_phi1 * sin_phi1).powf(1.5);
    let d = (x - p.false_easting) / (n1 * p.k0);
    let d2 = d * d;
    let d3 = d2 * d;
    let d4 = d3 * d;
    let d5 = d4 * d;
    let d6 = d5 * d;

    let lat = phi1
        - (n1 * tan_phi1 / r1)
            * (d2 / 2.0
                - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * ep2) * d4 / 24.0
                + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1
                    - 252.0 * ep2
                    - 3.0 * c1 * c1)
                    * d6
                    / 720.0);
    let lon = p.lon0
        + (d - (1.0 + 2.0 * t1 + c1) * d3 / 6.0
            + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * ep2 + 24.0 * t1 * t1)
                * d5
                / 120.0)
            / cos_phi1;

    (lat, lon)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::coord::systems::{lookup, SystemCode};

    #[test]
    fn test_forward_matches_central_belt_fixture() {
        // Seoul City Hall into the GRS80 central belt
        let params = TmParams::from_def(lookup(SystemCode::Grs80Central));
        let (x, y) = forward(&params, 37.5665_f64.to_radians(), 126.9780_f64.to_radians());
        assert!((x - 198_056.37).abs() < 0.05, "x = {}", x);
        assert!((y - 551_885.03).abs() < 0.05, "y = {}", y);
    }

    #[test]
    fn test_round_trip_sub_millimeter() {
        for code in [
            SystemCode::Grs80Central,
            SystemCode::Grs80West,
            SystemCode::Grs80East,
            SystemCode::UtmK,
        ] {
            let params = TmParams::from_def(lookup(code));
            let lat = 36.35_f64.to_radians();
            let lon = 127.38_f64.to_radians();
            let (x, y) = forward(&params, lat, lon);
            let (lat2, lon2) = inverse(&params, x, y);
            assert!((lat - lat2).abs().to_degrees() < 1e-9, "{:?} lat", code);
            assert!((lon - lon2).abs().to_degrees() < 1e-9, "{:?} lon", code);
        }
    }

    #[test]
    fn test_origin_maps_to_false_offsets() {
        let def = lookup(SystemCode::Grs80Central);
        let params = TmParams::from_def(def);
        let (x, y) = forward(&params, 38.0_f64.to_radians(), 127.0_f64.to_radians());
        assert!((x - def.false_easting).abs() < 1e-6);
        assert!((y - def.false_northing).abs() < 1e-6);
    }
}
