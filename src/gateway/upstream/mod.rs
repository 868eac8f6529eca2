// Upstream module - portal-facing HTTP client

pub mod client;

pub use client::{ClientConfig, UpstreamClient};
