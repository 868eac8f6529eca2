// Coordinate engine - conversion between Korean geodetic/projected systems

pub mod datum;
pub mod engine;
pub mod systems;
pub mod tmerc;

pub use engine::{CoordEngine, Point, PointInput, TransformRecord, ValidationReport};
pub use systems::SystemCode;
