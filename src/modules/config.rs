//! Service configuration loaded from the environment.

/// Gateway service configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Listen address (`GATEWAY_BIND`, default 127.0.0.1)
    pub bind_address: String,
    /// Listen port (`GATEWAY_PORT`, default 8080)
    pub port: u16,
    /// Upstream portal root (`UPSTREAM_BASE_URL`)
    pub upstream_base_url: String,
    /// Per-request upstream deadline in seconds (`UPSTREAM_TIMEOUT_SECS`)
    pub upstream_timeout_secs: u64,
    /// Warn on coordinates outside the Korean lon/lat window
    /// (`STRICT_KOREA_BOUNDS`, on unless set to "false")
    pub strict_korea_bounds: bool,
    /// Production mode masks internal error details (`NODE_ENV=production`)
    pub production: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 8080,
            upstream_base_url: "https://apis.data.go.kr".to_string(),
            upstream_timeout_secs: 30,
            strict_korea_bounds: true,
            production: false,
        }
    }
}

impl GatewayConfig {
    /// Build the configuration from recognized environment variables,
    /// falling back to defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let bind_address =
            std::env::var("GATEWAY_BIND").unwrap_or(defaults.bind_address);
        let port = std::env::var("GATEWAY_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.port);
        let upstream_base_url =
            std::env::var("UPSTREAM_BASE_URL").unwrap_or(defaults.upstream_base_url);
        let upstream_timeout_secs = std::env::var("UPSTREAM_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.upstream_timeout_secs);

        Self {
            bind_address,
            port,
            upstream_base_url,
            upstream_timeout_secs,
            strict_korea_bounds: strict_korea_bounds(),
            production: is_production(),
        }
    }
}

/// Whether internal error details should be masked in responses.
pub fn is_production() -> bool {
    std::env::var("NODE_ENV")
        .map(|v| v == "production")
        .unwrap_or(false)
}

/// Korean-bounds warnings are on unless explicitly disabled.
pub fn strict_korea_bounds() -> bool {
    std::env::var("STRICT_KOREA_BOUNDS")
        .map(|v| v != "false")
        .unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = GatewayConfig::default();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.upstream_timeout_secs, 30);
        assert!(cfg.strict_korea_bounds);
        assert!(!cfg.production);
    }
}
