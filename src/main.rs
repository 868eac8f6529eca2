use std::sync::Arc;
use std::time::Duration;

use kdata_gateway::gateway;
use kdata_gateway::modules;

#[tokio::main]
async fn main() -> Result<(), String> {
    modules::logger::init_logger();

    let config = modules::config::GatewayConfig::from_env();

    let keys = match modules::KeyRegistry::from_env() {
        Ok(registry) => Arc::new(registry),
        Err(err) => {
            tracing::error!("cannot start without credentials: {}", err);
            return Err(err.to_string());
        }
    };
    keys.check_expiry();

    let cache = Arc::new(gateway::LruCache::new());
    let limiter = Arc::new(gateway::RateLimiter::new());
    let engine = Arc::new(gateway::CoordEngine::new(config.strict_korea_bounds));

    let client_config = gateway::ClientConfig {
        base_url: config.upstream_base_url.clone(),
        timeout: Duration::from_secs(config.upstream_timeout_secs),
        ..Default::default()
    };
    let upstream = Arc::new(
        gateway::UpstreamClient::new(
            client_config,
            keys.clone(),
            limiter.clone(),
            cache.clone(),
        )
        .map_err(|e| e.to_string())?,
    );

    let (server, handle) = gateway::GatewayServer::start(
        config,
        keys,
        cache,
        limiter,
        upstream,
        engine,
    )
    .await
    .map_err(|e| format!("failed to start gateway server: {}", e))?;

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| format!("failed to listen for shutdown signal: {}", e))?;

    tracing::info!("shutdown requested, stopping server...");
    server.stop();
    let _ = handle.await;

    Ok(())
}
