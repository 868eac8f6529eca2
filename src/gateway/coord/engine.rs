//! The transformation engine: single and batch conversion, validation and
//! system autodetection over the closed registry.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::gateway::coord::datum;
use crate::gateway::coord::systems::{
    self, SystemCode, SystemDef, Unit, WGS84_ELLIPSOID,
};
use crate::gateway::coord::tmerc::{self, TmParams};
use crate::gateway::error::GatewayError;

/// Korean longitude/latitude window used for advisory range warnings.
const KOREA_LON: (f64, f64) = (124.0, 132.0);
const KOREA_LAT: (f64, f64) = (33.0, 39.0);

/// A point in normalized `{x, y}` form; `x` carries the longitude for
/// degree systems.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Wire-side point: either projected `{x, y}` or geographic
/// `{longitude, latitude}`.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
pub enum PointInput {
    Projected { x: f64, y: f64 },
    Geographic { longitude: f64, latitude: f64 },
}

impl From<PointInput> for Point {
    fn from(input: PointInput) -> Self {
        match input {
            PointInput::Projected { x, y } => Point { x, y },
            PointInput::Geographic { longitude, latitude } => Point { x: longitude, y: latitude },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub valid: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected_system: Option<SystemCode>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransformSide {
    pub point: Point,
    pub system: SystemCode,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransformRecord {
    pub input: TransformSide,
    pub output: TransformSide,
    pub accuracy: String,
}

/// Reusable converter for one (from, to) pair: the projection constants
/// are computed once and applied per point.
struct PreparedConverter {
    from: &'static SystemDef,
    to: &'static SystemDef,
    from_tm: Option<TmParams>,
    to_tm: Option<TmParams>,
}

impl PreparedConverter {
    fn new(from: &'static SystemDef, to: &'static SystemDef) -> Self {
        let from_tm = (from.unit == Unit::Meter).then(|| TmParams::from_def(from));
        let to_tm = (to.unit == Unit::Meter).then(|| TmParams::from_def(to));
        Self { from, to, from_tm, to_tm }
    }

    fn apply(&self, point: Point) -> Point {
        // 1. lift to geodetic radians on the source datum
        let (lat, lon) = match &self.from_tm {
            Some(params) => tmerc::inverse(params, point.x, point.y),
            None => (point.y.to_radians(), point.x.to_radians()),
        };

        // 2. source datum → WGS84 (identity for the GRS80 frames)
        let (lat, lon) = match &self.from.datum_shift {
            Some(shift) => {
                datum::to_wgs84(self.from.ellipsoid, WGS84_ELLIPSOID, shift, lat, lon)
            }
            None => (lat, lon),
        };

        // 3. WGS84 → target datum
        let (lat, lon) = match &self.to.datum_shift {
            Some(shift) => {
                datum::from_wgs84(self.to.ellipsoid, WGS84_ELLIPSOID, shift, lat, lon)
            }
            None => (lat, lon),
        };

        // 4. drop into the target frame
        match &self.to_tm {
            Some(params) => {
                let (x, y) = tmerc::forward(params, lat, lon);
                Point { x, y }
            }
            None => Point { x: lon.to_degrees(), y: lat.to_degrees() },
        }
    }
}

pub struct CoordEngine {
    strict_korea_bounds: bool,
}

impl CoordEngine {
    pub fn new(strict_korea_bounds: bool) -> Self {
        Self { strict_korea_bounds }
    }

    pub fn supported_systems(&self) -> Vec<&'static str> {
        SystemCode::ALL.iter().map(|code| code.as_str()).collect()
    }

    /// Return the `{x, y}` form of a wire-side point.
    pub fn normalize_point(&self, input: PointInput) -> Point {
        input.into()
    }

    /// Convert a point between two systems. A same-system transform is the
    /// normalized identity. Input domain violations are errors; range
    /// violations on either side are logged as warnings.
    pub fn transform(
        &self,
        point: Point,
        from: SystemCode,
        to: SystemCode,
    ) -> Result<Point, GatewayError> {
        if from == to {
            return Ok(point);
        }

        let report = self.validate_point(point, from);
        if !report.valid {
            return Err(GatewayError::coordinate_with(
                format!("point is not valid in {}", from),
                json!({ "errors": report.errors }),
            ));
        }
        for warning in &report.warnings {
            tracing::warn!("{}", warning);
        }

        let converter = PreparedConverter::new(systems::lookup(from), systems::lookup(to));
        let output = converter.apply(point);

        for warning in self.validate_point(output, to).warnings {
            tracing::warn!("transform result: {}", warning);
        }
        Ok(output)
    }

    /// Convert many points with one prepared converter, in a single pass.
    pub fn transform_batch(
        &self,
        points: &[Point],
        from: SystemCode,
        to: SystemCode,
    ) -> Result<Vec<Point>, GatewayError> {
        if from == to {
            return Ok(points.to_vec());
        }

        let converter = PreparedConverter::new(systems::lookup(from), systems::lookup(to));
        let mut output = Vec::with_capacity(points.len());
        for (index, point) in points.iter().enumerate() {
            let report = self.validate_point(*point, from);
            if !report.valid {
                return Err(GatewayError::coordinate_with(
                    format!("point {} is not valid in {}", index, from),
                    json!({ "index": index, "errors": report.errors }),
                ));
            }
            output.push(converter.apply(*point));
        }
        Ok(output)
    }

    pub fn transform_with_metadata(
        &self,
        point: Point,
        from: SystemCode,
        to: SystemCode,
    ) -> Result<TransformRecord, GatewayError> {
        let output = self.transform(point, from, to)?;
        Ok(TransformRecord {
            input: TransformSide { point, system: from },
            output: TransformSide { point: output, system: to },
            accuracy: "<1m".to_string(),
        })
    }

    /// First system whose numeric range covers the point, WGS84 first.
    /// Systems with identical bounding boxes are indistinguishable here.
    pub fn detect_system(&self, point: Point) -> Option<SystemCode> {
        if !point.x.is_finite() || !point.y.is_finite() {
            return None;
        }
        systems::SYSTEMS
            .iter()
            .find(|def| def.contains(point.x, point.y))
            .map(|def| def.code)
    }

    /// Domain check for a point under one system. Domain violations are
    /// errors; values outside the expected Korean range only warn (and only
    /// while strict bounds are on).
    pub fn validate_point(&self, point: Point, system: SystemCode) -> ValidationReport {
        let def = systems::lookup(system);
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if !point.x.is_finite() || !point.y.is_finite() {
            errors.push("coordinates must be finite numbers".to_string());
        } else {
            match def.unit {
                Unit::Degree => {
                    if point.x < -180.0 || point.x > 180.0 {
                        errors.push(format!(
                            "longitude {} is outside [-180, 180]",
                            point.x
                        ));
                    }
                    if point.y < -90.0 || point.y > 90.0 {
                        errors.push(format!("latitude {} is outside [-90, 90]", point.y));
                    }
                    if errors.is_empty() && self.strict_korea_bounds {
                        if point.x < KOREA_LON.0 || point.x > KOREA_LON.1 {
                            warnings.push(format!(
                                "longitude {} is outside the Korean range [{}, {}]",
                                point.x, KOREA_LON.0, KOREA_LON.1
                            ));
                        }
                        if point.y < KOREA_LAT.0 || point.y > KOREA_LAT.1 {
                            warnings.push(format!(
                                "latitude {} is outside the Korean range [{}, {}]",
                                point.y, KOREA_LAT.0, KOREA_LAT.1
                            ));
                        }
                    }
                }
                Unit::Meter => {
                    if !def.contains(point.x, point.y) {
                        warnings.push(format!(
                            "point ({}, {}) is outside the expected {} range x [{}, {}], y [{}, {}]",
                            point.x,
                            point.y,
                            def.code,
                            def.x_range.0,
                            def.x_range.1,
                            def.y_range.0,
                            def.y_range.1
                        ));
                    }
                }
            }
        }

        ValidationReport {
            valid: errors.is_empty(),
            errors,
            warnings,
            detected_system: self.detect_system(point),
        }
    }

    pub fn is_valid_point(&self, point: Point, system: SystemCode) -> bool {
        self.validate_point(point, system).valid
    }
}
