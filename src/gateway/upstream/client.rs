// Upstream client implementation
// Credential-injecting, rate-limit-aware HTTP client with bounded retries

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use reqwest::{header, Client, StatusCode};
use serde::Serialize;
use serde_json::Value;
use tokio::time::Duration;

use crate::gateway::cache::{CacheType, LruCache};
use crate::gateway::envelope::ApiEnvelope;
use crate::gateway::error::GatewayError;
use crate::gateway::rate_limit::{RateLimiter, Tier};
use crate::modules::api_keys::KeyRegistry;
use crate::modules::logger;

/// Upstream client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    /// Per-request deadline.
    pub timeout: Duration,
    /// Total attempts per call.
    pub max_retries: u32,
    /// Base delay; the wait before retry i is `i × retry_delay`.
    pub retry_delay: Duration,
    pub enable_cache: bool,
    pub enable_rate_limit: bool,
    /// Provider whose key is injected as `serviceKey`.
    pub api_key_provider: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://apis.data.go.kr".to_string(),
            timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            enable_cache: true,
            enable_rate_limit: true,
            api_key_provider: "primary".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub cached_requests: u64,
    pub rate_limited_requests: u64,
    pub cache_hit_rate: f64,
    pub success_rate: f64,
}

/// Outcome of a single send, with the internal retry decision. The
/// advertised `retryable` flag on the error is the caller-facing contract;
/// this flag is what the client's own loop obeys (4xx other than 429
/// short-circuits even though `EXTERNAL_API_ERROR` is advertised
/// retryable).
struct AttemptError {
    error: GatewayError,
    retry: bool,
}

pub struct UpstreamClient {
    http: Client,
    config: ClientConfig,
    keys: Arc<KeyRegistry>,
    limiter: Arc<RateLimiter>,
    cache: Arc<LruCache>,
    total_requests: AtomicU64,
    successful_requests: AtomicU64,
    failed_requests: AtomicU64,
    cached_requests: AtomicU64,
    rate_limited_requests: AtomicU64,
}

impl UpstreamClient {
    pub fn new(
        config: ClientConfig,
        keys: Arc<KeyRegistry>,
        limiter: Arc<RateLimiter>,
        cache: Arc<LruCache>,
    ) -> Result<Self, GatewayError> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(20))
            .pool_max_idle_per_host(16)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::configuration(format!("http client build failed: {}", e)))?;

        Ok(Self {
            http,
            config,
            keys,
            limiter,
            cache,
            total_requests: AtomicU64::new(0),
            successful_requests: AtomicU64::new(0),
            failed_requests: AtomicU64::new(0),
            cached_requests: AtomicU64::new(0),
            rate_limited_requests: AtomicU64::new(0),
        })
    }

    /// Dispatch a GET to the portal and wrap the payload in an envelope.
    pub async fn get(
        &self,
        endpoint: &str,
        params: &[(String, String)],
    ) -> Result<ApiEnvelope<Value>, GatewayError> {
        let started = std::time::Instant::now();
        self.total_requests.fetch_add(1, Ordering::Relaxed);

        match self.dispatch(endpoint, params).await {
            Ok(payload) => {
                self.successful_requests.fetch_add(1, Ordering::Relaxed);
                Ok(ApiEnvelope::success_with(
                    payload,
                    false,
                    started.elapsed().as_millis() as u64,
                ))
            }
            Err(error) => {
                if matches!(error, GatewayError::RateLimit { .. }) {
                    self.rate_limited_requests.fetch_add(1, Ordering::Relaxed);
                }
                self.failed_requests.fetch_add(1, Ordering::Relaxed);
                Err(error)
            }
        }
    }

    /// Cache-through variant. The cache key is the endpoint plus the
    /// lexicographically sorted caller parameters; the credential is never
    /// part of the key. Only successful envelopes are stored.
    pub async fn get_cached(
        &self,
        kind: CacheType,
        endpoint: &str,
        params: &[(String, String)],
    ) -> Result<ApiEnvelope<Value>, GatewayError> {
        if !self.config.enable_cache {
            return self.get(endpoint, params).await;
        }

        let cache_key = Self::build_cache_key(endpoint, params);
        let lookup = self.cache.get(kind, &cache_key);
        if lookup.hit {
            if let Some(stored) = lookup.value {
                match serde_json::from_value::<ApiEnvelope<Value>>(stored) {
                    Ok(mut envelope) => {
                        self.total_requests.fetch_add(1, Ordering::Relaxed);
                        self.cached_requests.fetch_add(1, Ordering::Relaxed);
                        envelope.metadata.cached = Some(true);
                        return Ok(envelope);
                    }
                    Err(e) => {
                        // unreadable entry: drop it and fall through to the network
                        tracing::warn!("discarding undecodable cache entry {}: {}", cache_key, e);
                        self.cache.delete(kind, &cache_key);
                    }
                }
            }
        }

        let envelope = self.get(endpoint, params).await?;
        match serde_json::to_value(&envelope) {
            Ok(value) => self.cache.set(kind, &cache_key, value, None),
            Err(e) => tracing::warn!("failed to serialize envelope for cache: {}", e),
        }
        Ok(envelope)
    }

    /// Clear one cache bucket by type, or the whole cache.
    pub fn invalidate_cache(&self, kind: Option<CacheType>) -> usize {
        match kind {
            Some(kind) => self.cache.delete_by_type(kind),
            None => {
                let size = self.cache.stats().size;
                self.cache.clear();
                size
            }
        }
    }

    pub fn stats(&self) -> ClientStats {
        let total = self.total_requests.load(Ordering::Relaxed);
        let successful = self.successful_requests.load(Ordering::Relaxed);
        let failed = self.failed_requests.load(Ordering::Relaxed);
        let cached = self.cached_requests.load(Ordering::Relaxed);
        let settled = successful + failed;
        ClientStats {
            total_requests: total,
            successful_requests: successful,
            failed_requests: failed,
            cached_requests: cached,
            rate_limited_requests: self.rate_limited_requests.load(Ordering::Relaxed),
            cache_hit_rate: if total == 0 {
                0.0
            } else {
                cached as f64 / total as f64 * 100.0
            },
            success_rate: if settled == 0 {
                0.0
            } else {
                successful as f64 / settled as f64 * 100.0
            },
        }
    }

    pub fn reset_stats(&self) {
        self.total_requests.store(0, Ordering::Relaxed);
        self.successful_requests.store(0, Ordering::Relaxed);
        self.failed_requests.store(0, Ordering::Relaxed);
        self.cached_requests.store(0, Ordering::Relaxed);
        self.rate_limited_requests.store(0, Ordering::Relaxed);
    }

    /// The full request pipeline: credential, admission, sanitized log,
    /// send with bounded retries.
    async fn dispatch(
        &self,
        endpoint: &str,
        params: &[(String, String)],
    ) -> Result<Value, GatewayError> {
        let secret = self.keys.get(&self.config.api_key_provider)?;

        if self.config.enable_rate_limit {
            // admission is keyed by a non-secret surrogate of the key
            let identifier = self.keys.identifier(&self.config.api_key_provider);
            let decision = self.limiter.check_limit(&identifier, Tier::Authenticated);
            if !decision.allowed {
                return Err(GatewayError::RateLimit {
                    message: "upstream admission denied".to_string(),
                    limit: decision.limit,
                    reset: decision.reset,
                    retry_after_secs: decision.retry_after.unwrap_or(1),
                });
            }
        }

        let url = format!("{}{}", self.config.base_url, endpoint);
        let mut query: Vec<(String, String)> = Vec::with_capacity(params.len() + 1);
        query.push(("serviceKey".to_string(), secret));
        query.extend(params.iter().cloned());

        tracing::info!("GET {} [{}]", url, logger::mask_query(&query));

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.send_once(&url, &query).await {
                Ok(payload) => {
                    if attempt > 1 {
                        tracing::info!("upstream recovered on attempt {}", attempt);
                    }
                    return Ok(payload);
                }
                Err(AttemptError { error, retry })
                    if retry && attempt < self.config.max_retries =>
                {
                    let delay = Self::retry_delay(self.config.retry_delay, attempt);
                    tracing::warn!(
                        "upstream attempt {}/{} failed ({}), retrying in {:?}",
                        attempt,
                        self.config.max_retries,
                        error,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(AttemptError { error, .. }) => return Err(error),
            }
        }
    }

    async fn send_once(&self, url: &str, query: &[(String, String)]) -> Result<Value, AttemptError> {
        let response = self
            .http
            .get(url)
            .query(query)
            .header(header::ACCEPT, "application/json, application/xml")
            .send()
            .await;

        let response = match response {
            Ok(resp) => resp,
            Err(e) => {
                // network-class failures (timeout, refused, unresolved) all retry
                return Err(AttemptError {
                    error: GatewayError::from_reqwest(&e),
                    retry: true,
                });
            }
        };

        let status = response.status();
        if status.is_success() {
            return response.json::<Value>().await.map_err(|e| AttemptError {
                error: GatewayError::external(format!("upstream body was not valid JSON: {}", e)),
                retry: false,
            });
        }

        let retry_after_header = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let body = response.text().await.unwrap_or_default();
        Err(Self::classify_status(status, &body, retry_after_header))
    }

    /// Map an upstream error status into the taxonomy and decide whether
    /// the retry loop may try again.
    fn classify_status(
        status: StatusCode,
        body: &str,
        retry_after: Option<u64>,
    ) -> AttemptError {
        let snippet: String = body.chars().take(200).collect();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = retry_after.unwrap_or(30);
            return AttemptError {
                error: GatewayError::RateLimit {
                    message: "upstream rate limit exceeded".to_string(),
                    limit: 0,
                    reset: Utc::now().timestamp() + retry_after_secs as i64,
                    retry_after_secs,
                },
                retry: true,
            };
        }
        if status.is_server_error() {
            return AttemptError {
                error: GatewayError::external_with(
                    format!("upstream returned {}", status),
                    serde_json::json!({ "status": status.as_u16(), "body": snippet }),
                ),
                retry: true,
            };
        }
        AttemptError {
            error: GatewayError::external_with(
                format!("upstream rejected the request with {}", status),
                serde_json::json!({ "status": status.as_u16(), "body": snippet }),
            ),
            retry: false,
        }
    }

    /// Delay before retry `attempt` (1-based): a linear, monotonically
    /// non-decreasing sequence off the configured base.
    fn retry_delay(base: Duration, attempt: u32) -> Duration {
        base * attempt
    }

    /// `"{endpoint}?{k1=v1&k2=v2…}"` with keys sorted; bare endpoint when
    /// there are no parameters.
    fn build_cache_key(endpoint: &str, params: &[(String, String)]) -> String {
        if params.is_empty() {
            return endpoint.to_string();
        }
        let mut sorted: Vec<&(String, String)> = params.iter().collect();
        sorted.sort();
        let query = sorted
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}?{}", endpoint, query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_cache_key_sorts_params() {
        let params = vec![
            ("pageNo".to_string(), "1".to_string()),
            ("keyword".to_string(), "seoul".to_string()),
        ];
        assert_eq!(
            UpstreamClient::build_cache_key("/api/address", &params),
            "/api/address?keyword=seoul&pageNo=1"
        );
    }

    #[test]
    fn test_build_cache_key_without_params() {
        assert_eq!(UpstreamClient::build_cache_key("/api/health", &[]), "/api/health");
    }

    #[test]
    fn test_retry_delay_is_linear() {
        let base = Duration::from_secs(1);
        assert_eq!(UpstreamClient::retry_delay(base, 1), Duration::from_secs(1));
        assert_eq!(UpstreamClient::retry_delay(base, 2), Duration::from_secs(2));
        assert_eq!(UpstreamClient::retry_delay(base, 3), Duration::from_secs(3));
    }

    #[test]
    fn test_classify_429() {
        let outcome =
            UpstreamClient::classify_status(StatusCode::TOO_MANY_REQUESTS, "", Some(12));
        assert!(outcome.retry);
        assert_eq!(outcome.error.code(), "RATE_LIMIT_EXCEEDED");
        assert_eq!(outcome.error.retry_after(), Some(12));
    }

    #[test]
    fn test_classify_5xx_retries() {
        let outcome = UpstreamClient::classify_status(StatusCode::BAD_GATEWAY, "oops", None);
        assert!(outcome.retry);
        assert_eq!(outcome.error.code(), "EXTERNAL_API_ERROR");
    }

    #[test]
    fn test_classify_4xx_short_circuits() {
        let outcome = UpstreamClient::classify_status(StatusCode::FORBIDDEN, "denied", None);
        assert!(!outcome.retry);
        assert_eq!(outcome.error.code(), "EXTERNAL_API_ERROR");
        // still advertised retryable to callers per the taxonomy
        assert!(outcome.error.retryable());
    }

    #[test]
    fn test_default_config() {
        let cfg = ClientConfig::default();
        assert_eq!(cfg.timeout, Duration::from_secs(30));
        assert_eq!(cfg.max_retries, 3);
        assert_eq!(cfg.retry_delay, Duration::from_secs(1));
        assert_eq!(cfg.api_key_provider, "primary");
    }
}
