// gateway module - request-processing core for the public-data portal API

pub mod cache;
pub mod coord;
pub mod envelope;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod rate_limit;
pub mod server;
pub mod upstream;

pub use cache::LruCache;
pub use coord::CoordEngine;
pub use envelope::ApiEnvelope;
pub use error::GatewayError;
pub use rate_limit::RateLimiter;
pub use server::{AppState, GatewayServer};
pub use upstream::{ClientConfig, UpstreamClient};
