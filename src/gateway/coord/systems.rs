//! The closed registry of supported coordinate systems.
//!
//! Seven systems, table-driven, no runtime mutation. Each carries its EPSG
//! identifier, the canonical PROJ parameterization, projection constants
//! and the numeric ranges used for validation and autodetection.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SystemCode {
    #[serde(rename = "WGS84")]
    Wgs84,
    #[serde(rename = "GRS80_CENTRAL")]
    Grs80Central,
    #[serde(rename = "GRS80_WEST")]
    Grs80West,
    #[serde(rename = "GRS80_EAST")]
    Grs80East,
    #[serde(rename = "BESSEL_CENTRAL")]
    BesselCentral,
    #[serde(rename = "KATEC")]
    Katec,
    #[serde(rename = "UTM_K")]
    UtmK,
}

impl SystemCode {
    pub const ALL: [SystemCode; 7] = [
        Self::Wgs84,
        Self::Grs80Central,
        Self::Grs80West,
        Self::Grs80East,
        Self::BesselCentral,
        Self::Katec,
        Self::UtmK,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wgs84 => "WGS84",
            Self::Grs80Central => "GRS80_CENTRAL",
            Self::Grs80West => "GRS80_WEST",
            Self::Grs80East => "GRS80_EAST",
            Self::BesselCentral => "BESSEL_CENTRAL",
            Self::Katec => "KATEC",
            Self::UtmK => "UTM_K",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "WGS84" => Some(Self::Wgs84),
            "GRS80_CENTRAL" => Some(Self::Grs80Central),
            "GRS80_WEST" => Some(Self::Grs80West),
            "GRS80_EAST" => Some(Self::Grs80East),
            "BESSEL_CENTRAL" => Some(Self::BesselCentral),
            "KATEC" => Some(Self::Katec),
            "UTM_K" => Some(Self::UtmK),
            _ => None,
        }
    }
}

impl std::fmt::Display for SystemCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    Degree,
    Meter,
}

/// Reference ellipsoid (semi-major axis, inverse flattening).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ellipsoid {
    pub a: f64,
    pub inv_f: f64,
}

impl Ellipsoid {
    /// First eccentricity squared.
    pub fn e2(&self) -> f64 {
        let f = 1.0 / self.inv_f;
        2.0 * f - f * f
    }

    /// Second eccentricity squared.
    pub fn ep2(&self) -> f64 {
        let e2 = self.e2();
        e2 / (1.0 - e2)
    }
}

pub const WGS84_ELLIPSOID: Ellipsoid = Ellipsoid { a: 6_378_137.0, inv_f: 298.257223563 };
pub const GRS80_ELLIPSOID: Ellipsoid = Ellipsoid { a: 6_378_137.0, inv_f: 298.257222101 };
pub const BESSEL_ELLIPSOID: Ellipsoid = Ellipsoid { a: 6_377_397.155, inv_f: 299.1528128 };

/// Seven-parameter datum shift (position-vector convention): translations
/// in meters, rotations in arc-seconds, scale in ppm. Applied towards
/// WGS84.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DatumShift {
    pub dx: f64,
    pub dy: f64,
    pub dz: f64,
    pub rx: f64,
    pub ry: f64,
    pub rz: f64,
    pub scale_ppm: f64,
}

/// The Korean Bessel → WGS84 shift used by the projected legacy systems.
pub const KOREA_BESSEL_SHIFT: DatumShift = DatumShift {
    dx: -115.80,
    dy: 474.99,
    dz: 674.11,
    rx: 1.16,
    ry: -2.31,
    rz: -1.63,
    scale_ppm: 6.43,
};

/// Longitude of the Bessel central meridian carries the historic
/// 10.405-arcsecond correction.
const BESSEL_CENTRAL_LON: f64 = 127.002_890_277_777_78;

#[derive(Debug, Clone, Copy)]
pub struct SystemDef {
    pub code: SystemCode,
    pub epsg: u32,
    pub proj: &'static str,
    pub unit: Unit,
    /// Projection origin (latitude, longitude) in degrees.
    pub origin: Option<(f64, f64)>,
    pub false_easting: f64,
    pub false_northing: f64,
    pub scale_factor: f64,
    pub ellipsoid: Ellipsoid,
    pub datum_shift: Option<DatumShift>,
    /// Expected x range (longitude for degree systems), inclusive.
    pub x_range: (f64, f64),
    /// Expected y range (latitude for degree systems), inclusive.
    pub y_range: (f64, f64),
}

impl SystemDef {
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x_range.0 && x <= self.x_range.1 && y >= self.y_range.0 && y <= self.y_range.1
    }
}

/// The full registry, in autodetection preference order: WGS84 first, then
/// each projected system by its bounding box.
pub static SYSTEMS: [SystemDef; 7] = [
    SystemDef {
        code: SystemCode::Wgs84,
        epsg: 4326,
        proj: "+proj=longlat +datum=WGS84 +no_defs",
        unit: Unit::Degree,
        origin: None,
        false_easting: 0.0,
        false_northing: 0.0,
        scale_factor: 1.0,
        ellipsoid: WGS84_ELLIPSOID,
        datum_shift: None,
        x_range: (-180.0, 180.0),
        y_range: (-90.0, 90.0),
    },
    SystemDef {
        code: SystemCode::Grs80Central,
        epsg: 5186,
        proj: "+proj=tmerc +lat_0=38 +lon_0=127 +k=1 +x_0=200000 +y_0=600000 +ellps=GRS80 +towgs84=0,0,0,0,0,0,0 +units=m +no_defs",
        unit: Unit::Meter,
        origin: Some((38.0, 127.0)),
        false_easting: 200_000.0,
        false_northing: 600_000.0,
        scale_factor: 1.0,
        ellipsoid: GRS80_ELLIPSOID,
        datum_shift: None,
        x_range: (100_000.0, 300_000.0),
        y_range: (400_000.0, 800_000.0),
    },
    SystemDef {
        code: SystemCode::Grs80West,
        epsg: 5185,
        proj: "+proj=tmerc +lat_0=38 +lon_0=125 +k=1 +x_0=200000 +y_0=600000 +ellps=GRS80 +towgs84=0,0,0,0,0,0,0 +units=m +no_defs",
        unit: Unit::Meter,
        origin: Some((38.0, 125.0)),
        false_easting: 200_000.0,
        false_northing: 600_000.0,
        scale_factor: 1.0,
        ellipsoid: GRS80_ELLIPSOID,
        datum_shift: None,
        x_range: (100_000.0, 300_000.0),
        y_range: (400_000.0, 800_000.0),
    },
    SystemDef {
        code: SystemCode::Grs80East,
        epsg: 5187,
        proj: "+proj=tmerc +lat_0=38 +lon_0=129 +k=1 +x_0=200000 +y_0=600000 +ellps=GRS80 +towgs84=0,0,0,0,0,0,0 +units=m +no_defs",
        unit: Unit::Meter,
        origin: Some((38.0, 129.0)),
        false_easting: 200_000.0,
        false_northing: 600_000.0,
        scale_factor: 1.0,
        ellipsoid: GRS80_ELLIPSOID,
        datum_shift: None,
        x_range: (100_000.0, 300_000.0),
        y_range: (400_000.0, 800_000.0),
    },
    SystemDef {
        code: SystemCode::BesselCentral,
        epsg: 5174,
        proj: "+proj=tmerc +lat_0=38 +lon_0=127.0028902777778 +k=1 +x_0=200000 +y_0=500000 +ellps=bessel +towgs84=-115.80,474.99,674.11,1.16,-2.31,-1.63,6.43 +units=m +no_defs",
        unit: Unit::Meter,
        origin: Some((38.0, BESSEL_CENTRAL_LON)),
        false_easting: 200_000.0,
        false_northing: 500_000.0,
        scale_factor: 1.0,
        ellipsoid: BESSEL_ELLIPSOID,
        datum_shift: Some(KOREA_BESSEL_SHIFT),
        x_range: (100_000.0, 300_000.0),
        y_range: (300_000.0, 700_000.0),
    },
    SystemDef {
        code: SystemCode::Katec,
        epsg: 102080,
        proj: "+proj=tmerc +lat_0=38 +lon_0=128 +k=0.9999 +x_0=200000 +y_0=500000 +ellps=bessel +towgs84=-115.80,474.99,674.11,1.16,-2.31,-1.63,6.43 +units=m +no_defs",
        unit: Unit::Meter,
        origin: Some((38.0, 128.0)),
        false_easting: 200_000.0,
        false_northing: 500_000.0,
        scale_factor: 0.9999,
        ellipsoid: BESSEL_ELLIPSOID,
        datum_shift: Some(KOREA_BESSEL_SHIFT),
        x_range: (100_000.0, 300_000.0),
        y_range: (300_000.0, 700_000.0),
    },
    SystemDef {
        code: SystemCode::UtmK,
        epsg: 5179,
        proj: "+proj=tmerc +lat_0=38 +lon_0=127.5 +k=0.9996 +x_0=1000000 +y_0=2000000 +ellps=GRS80 +towgs84=0,0,0,0,0,0,0 +units=m +no_defs",
        unit: Unit::Meter,
        origin: Some((38.0, 127.5)),
        false_easting: 1_000_000.0,
        false_northing: 2_000_000.0,
        scale_factor: 0.9996,
        ellipsoid: GRS80_ELLIPSOID,
        datum_shift: None,
        x_range: (900_000.0, 1_100_000.0),
        y_range: (1_800_000.0, 2_200_000.0),
    },
];

pub fn lookup(code: SystemCode) -> &'static SystemDef {
    // the table is total over the enum
    SYSTEMS
        .iter()
        .find(|def| def.code == code)
        .unwrap_or(&SYSTEMS[0])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_is_closed_and_total() {
        assert_eq!(SYSTEMS.len(), 7);
        for code in SystemCode::ALL {
            assert_eq!(lookup(code).code, code);
        }
    }

    #[test]
    fn test_parse_round_trips() {
        for code in SystemCode::ALL {
            assert_eq!(SystemCode::parse(code.as_str()), Some(code));
        }
        assert_eq!(SystemCode::parse("TM128"), None);
    }

    #[test]
    fn test_degree_system_is_only_wgs84() {
        for def in &SYSTEMS {
            if def.code == SystemCode::Wgs84 {
                assert_eq!(def.unit, Unit::Degree);
            } else {
                assert_eq!(def.unit, Unit::Meter);
            }
        }
    }

    #[test]
    fn test_bessel_systems_carry_datum_shift() {
        assert!(lookup(SystemCode::BesselCentral).datum_shift.is_some());
        assert!(lookup(SystemCode::Katec).datum_shift.is_some());
        assert!(lookup(SystemCode::Grs80Central).datum_shift.is_none());
        assert!(lookup(SystemCode::UtmK).datum_shift.is_none());
    }

    #[test]
    fn test_ranges_contain_seoul() {
        // Seoul City Hall in each projected frame stays inside its box
        assert!(lookup(SystemCode::Grs80Central).contains(198_056.0, 551_885.0));
        assert!(lookup(SystemCode::UtmK).contains(953_901.0, 1_952_032.0));
        assert!(lookup(SystemCode::Wgs84).contains(126.978, 37.5665));
    }

    #[test]
    fn test_serde_wire_names() {
        let json = serde_json::to_string(&SystemCode::Grs80Central).unwrap();
        assert_eq!(json, "\"GRS80_CENTRAL\"");
        let code: SystemCode = serde_json::from_str("\"UTM_K\"").unwrap();
        assert_eq!(code, SystemCode::UtmK);
    }
}
