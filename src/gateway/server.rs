use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::get,
    Router,
};
use tokio::sync::oneshot;
use tower_http::trace::TraceLayer;
use tracing::{debug, error};

use crate::gateway::cache::LruCache;
use crate::gateway::coord::CoordEngine;
use crate::gateway::handlers;
use crate::gateway::handlers::health::HealthThresholds;
use crate::gateway::middleware;
use crate::gateway::rate_limit::RateLimiter;
use crate::gateway::upstream::UpstreamClient;
use crate::modules::api_keys::KeyRegistry;
use crate::modules::config::GatewayConfig;

/// How often idle buckets are reclaimed and key expiry is re-checked.
const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(3_600);

/// Shared application state injected into every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: GatewayConfig,
    pub keys: Arc<KeyRegistry>,
    pub cache: Arc<LruCache>,
    pub limiter: Arc<RateLimiter>,
    pub upstream: Arc<UpstreamClient>,
    pub engine: Arc<CoordEngine>,
    pub thresholds: HealthThresholds,
}

/// The gateway HTTP server instance.
pub struct GatewayServer {
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl GatewayServer {
    /// Bind and start serving. Returns the server handle and the join
    /// handle of the accept loop.
    pub async fn start(
        config: GatewayConfig,
        keys: Arc<KeyRegistry>,
        cache: Arc<LruCache>,
        limiter: Arc<RateLimiter>,
        upstream: Arc<UpstreamClient>,
        engine: Arc<CoordEngine>,
    ) -> Result<(Self, tokio::task::JoinHandle<()>), String> {
        let state = AppState {
            config: config.clone(),
            keys: keys.clone(),
            cache,
            limiter: limiter.clone(),
            upstream,
            engine,
            thresholds: HealthThresholds::default(),
        };

        let app = Router::new()
            .route(
                "/api/coordinate/transform",
                get(handlers::coordinate::transform_get).post(handlers::coordinate::transform_post),
            )
            .route(
                "/api/coordinate/systems",
                get(handlers::coordinate::supported_systems),
            )
            .route("/api/address", get(handlers::address::search))
            .route("/api/health", get(handlers::health::health))
            .route("/api/stats", get(handlers::stats::snapshot))
            .layer(TraceLayer::new_for_http())
            .layer(axum::middleware::from_fn(middleware::request_logging))
            .layer(middleware::cors_layer())
            .with_state(state);

        let addr = format!("{}:{}", config.bind_address, config.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| format!("failed to bind {}: {}", addr, e))?;

        tracing::info!("gateway listening on http://{}", addr);

        // hourly housekeeping: idle bucket reclamation and key expiry sweep
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(HOUSEKEEPING_INTERVAL);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                limiter.cleanup_expired();
                keys.check_expiry();
            }
        });

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let server_instance = Self {
            shutdown_tx: Some(shutdown_tx),
        };

        let handle = tokio::spawn(async move {
            use hyper::server::conn::http1;
            use hyper_util::rt::TokioIo;
            use hyper_util::service::TowerToHyperService;

            loop {
                tokio::select! {
                    res = listener.accept() => {
                        match res {
                            Ok((stream, _)) => {
                                let io = TokioIo::new(stream);
                                let service = TowerToHyperService::new(app.clone());

                                tokio::task::spawn(async move {
                                    if let Err(err) = http1::Builder::new()
                                        .serve_connection(io, service)
                                        .await
                                    {
                                        debug!("connection closed with error: {:?}", err);
                                    }
                                });
                            }
                            Err(e) => {
                                error!("failed to accept connection: {:?}", e);
                            }
                        }
                    }
                    _ = &mut shutdown_rx => {
                        tracing::info!("gateway stopped listening");
                        break;
                    }
                }
            }
        });

        Ok((server_instance, handle))
    }

    /// Stop accepting connections.
    pub fn stop(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
