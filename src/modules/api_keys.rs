//! API key registry for upstream portal credentials.
//!
//! Keys are loaded once at process start from the environment, tagged by
//! provider, and dispensed to the upstream client. The registry is
//! read-mostly; only `last_used_at` and the monotonic status transition
//! active → expired/suspended are ever mutated.

use chrono::{DateTime, TimeZone, Utc};
use dashmap::DashMap;
use regex::Regex;
use serde::Serialize;

use crate::gateway::error::GatewayError;
use crate::modules::logger;

/// Accepted secret format for portal service keys.
const KEY_FORMAT: &str = r"^[A-Za-z0-9%+/=]{20,}$";

/// Provider tag of the default key.
pub const PRIMARY_PROVIDER: &str = "primary";

/// Services that may carry a dedicated key override
/// (`PUBLIC_DATA_<SERVICE>_API_KEY`).
const KNOWN_SERVICES: &[&str] = &[
    "address",
    "business",
    "apartment",
    "realestate",
    "building",
    "subway",
];

/// Days-until-expiry band that counts as "expiring soon".
const EXPIRY_WARNING_DAYS: i64 = 30;
const EXPIRY_URGENT_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyStatus {
    Active,
    Expired,
    Suspended,
}

/// One credential record. The secret itself never leaves this module
/// unmasked except through [`KeyRegistry::get`].
#[derive(Debug, Clone)]
pub struct KeyRecord {
    pub secret: String,
    pub provider: String,
    pub expires_at: DateTime<Utc>,
    pub status: KeyStatus,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl KeyRecord {
    fn days_until_expiry(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_days()
    }
}

/// Masked inspection view of a record (the full secret is never serialized).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyInfo {
    pub provider: String,
    pub key_preview: String,
    pub status: KeyStatus,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub days_until_expiry: i64,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyStats {
    pub total_keys: usize,
    pub active_keys: usize,
    pub expired_keys: usize,
    pub expiring_soon: usize,
}

#[derive(Debug)]
pub struct KeyRegistry {
    keys: DashMap<String, KeyRecord>,
}

impl KeyRegistry {
    /// Build a registry from explicit parameters. The primary secret is
    /// required and must match the portal key format; per-service secrets
    /// that fail the format check are skipped with a warning.
    pub fn new(
        primary_secret: &str,
        primary_expiry: Option<DateTime<Utc>>,
        service_secrets: &[(String, String)],
    ) -> Result<Self, GatewayError> {
        let format = Regex::new(KEY_FORMAT)
            .map_err(|e| GatewayError::configuration(format!("key format regex: {}", e)))?;

        if primary_secret.is_empty() {
            return Err(GatewayError::configuration(
                "primary API key is not configured (PUBLIC_DATA_API_KEY)",
            ));
        }
        if !format.is_match(primary_secret) {
            return Err(GatewayError::configuration(
                "primary API key does not match the portal key format",
            ));
        }

        let now = Utc::now();
        let keys = DashMap::new();
        keys.insert(
            PRIMARY_PROVIDER.to_string(),
            KeyRecord {
                secret: primary_secret.to_string(),
                provider: PRIMARY_PROVIDER.to_string(),
                expires_at: primary_expiry.unwrap_or_else(far_future),
                status: KeyStatus::Active,
                created_at: now,
                last_used_at: None,
            },
        );

        for (provider, secret) in service_secrets {
            if !format.is_match(secret) {
                tracing::warn!(
                    "skipping malformed service key for provider {} ({})",
                    provider,
                    logger::mask_secret(secret)
                );
                continue;
            }
            keys.insert(
                provider.clone(),
                KeyRecord {
                    secret: secret.clone(),
                    provider: provider.clone(),
                    expires_at: primary_expiry.unwrap_or_else(far_future),
                    status: KeyStatus::Active,
                    created_at: now,
                    last_used_at: None,
                },
            );
        }

        tracing::info!("key registry loaded with {} provider(s)", keys.len());
        Ok(Self { keys })
    }

    /// Load the registry from the environment (process start).
    pub fn from_env() -> Result<Self, GatewayError> {
        let primary = std::env::var("PUBLIC_DATA_API_KEY").unwrap_or_default();

        let expiry = match std::env::var("API_KEY_EXPIRY") {
            Ok(raw) => Some(parse_expiry(&raw)?),
            Err(_) => None,
        };

        let mut services = Vec::new();
        for service in KNOWN_SERVICES {
            let var = format!("PUBLIC_DATA_{}_API_KEY", service.to_uppercase());
            if let Ok(secret) = std::env::var(&var) {
                services.push((service.to_string(), secret));
            }
        }

        Self::new(&primary, expiry, &services)
    }

    /// Return the secret for a provider, falling back to the primary key for
    /// unknown providers. Updates `last_used_at` on success.
    pub fn get(&self, provider: &str) -> Result<String, GatewayError> {
        let key = if self.keys.contains_key(provider) {
            provider
        } else {
            PRIMARY_PROVIDER
        };

        let mut record = self.keys.get_mut(key).ok_or_else(|| {
            GatewayError::api_key("no primary API key is configured")
        })?;

        let now = Utc::now();
        if record.expires_at <= now {
            // active → expired is the only automatic transition
            if record.status == KeyStatus::Active {
                record.status = KeyStatus::Expired;
            }
            return Err(GatewayError::api_key(format!(
                "API key for provider {} expired at {}",
                record.provider,
                record.expires_at.to_rfc3339()
            )));
        }
        if record.status != KeyStatus::Active {
            return Err(GatewayError::api_key(format!(
                "API key for provider {} is not active",
                record.provider
            )));
        }

        record.last_used_at = Some(now);
        Ok(record.secret.clone())
    }

    /// Masked inspection view of one provider's record.
    pub fn key_info(&self, provider: &str) -> Option<KeyInfo> {
        let record = self.keys.get(provider)?;
        let now = Utc::now();
        Some(KeyInfo {
            provider: record.provider.clone(),
            key_preview: logger::mask_secret(&record.secret),
            status: record.status,
            expires_at: record.expires_at,
            created_at: record.created_at,
            last_used_at: record.last_used_at,
            days_until_expiry: record.days_until_expiry(now),
        })
    }

    pub fn stats(&self) -> KeyStats {
        let now = Utc::now();
        let mut stats = KeyStats {
            total_keys: 0,
            active_keys: 0,
            expired_keys: 0,
            expiring_soon: 0,
        };

        for record in self.keys.iter() {
            stats.total_keys += 1;
            if record.status == KeyStatus::Active && record.expires_at > now {
                stats.active_keys += 1;
                let days = record.days_until_expiry(now);
                if days > 0 && days <= EXPIRY_WARNING_DAYS {
                    stats.expiring_soon += 1;
                }
            } else {
                stats.expired_keys += 1;
            }
        }

        stats
    }

    /// Advisory expiry sweep: logs one record per key in the EXPIRED /
    /// URGENT (≤7 d) / WARNING (≤30 d) bands. Does not mutate state.
    pub fn check_expiry(&self) {
        let now = Utc::now();
        for record in self.keys.iter() {
            let days = record.days_until_expiry(now);
            let preview = logger::mask_secret(&record.secret);
            if record.expires_at <= now {
                tracing::error!(
                    "EXPIRED: key for provider {} ({}) expired at {}",
                    record.provider,
                    preview,
                    record.expires_at.to_rfc3339()
                );
            } else if days <= EXPIRY_URGENT_DAYS {
                tracing::warn!(
                    "URGENT: key for provider {} ({}) expires in {} day(s)",
                    record.provider,
                    preview,
                    days
                );
            } else if days <= EXPIRY_WARNING_DAYS {
                tracing::warn!(
                    "WARNING: key for provider {} ({}) expires in {} day(s)",
                    record.provider,
                    preview,
                    days
                );
            }
        }
    }

    /// Mask a secret for display. First four characters stay visible.
    pub fn mask_key(secret: &str) -> String {
        logger::mask_secret(secret)
    }

    /// Stable non-secret surrogate for a provider's key, usable as a
    /// rate-limit identifier. Never contains credential material.
    pub fn identifier(&self, provider: &str) -> String {
        let key = if self.keys.contains_key(provider) {
            provider
        } else {
            PRIMARY_PROVIDER
        };
        match self.keys.get(key) {
            Some(record) => format!("key:{}:{:016x}", record.provider, fnv1a64(&record.secret)),
            None => format!("key:{}", provider),
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Far-future sentinel used when no expiry is configured.
fn far_future() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2099, 12, 31, 0, 0, 0).unwrap()
}

/// Parse `API_KEY_EXPIRY`: an ISO-8601 date or datetime.
fn parse_expiry(raw: &str) -> Result<DateTime<Utc>, GatewayError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(date) = chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(dt) = date.and_hms_opt(0, 0, 0) {
            return Ok(Utc.from_utc_datetime(&dt));
        }
    }
    Err(GatewayError::configuration(format!(
        "API_KEY_EXPIRY is not an ISO-8601 date: {}",
        raw
    )))
}

fn fnv1a64(input: &str) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in input.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    const VALID_KEY: &str = "abcd1234efgh5678ijkl9012";

    #[test]
    fn test_requires_primary() {
        let err = KeyRegistry::new("", None, &[]).unwrap_err();
        assert_eq!(err.code(), "CONFIGURATION_ERROR");
    }

    #[test]
    fn test_rejects_malformed_primary() {
        let err = KeyRegistry::new("too-short!", None, &[]).unwrap_err();
        assert_eq!(err.code(), "CONFIGURATION_ERROR");
    }

    #[test]
    fn test_get_primary() {
        let registry = KeyRegistry::new(VALID_KEY, None, &[]).unwrap();
        assert_eq!(registry.get("primary").unwrap(), VALID_KEY);
    }

    #[test]
    fn test_unknown_provider_falls_back_to_primary() {
        let registry = KeyRegistry::new(VALID_KEY, None, &[]).unwrap();
        assert_eq!(registry.get("no-such-service").unwrap(), VALID_KEY);
    }

    #[test]
    fn test_service_override() {
        let service_key = "zzzz9999yyyy8888xxxx7777".to_string();
        let registry = KeyRegistry::new(
            VALID_KEY,
            None,
            &[("address".to_string(), service_key.clone())],
        )
        .unwrap();
        assert_eq!(registry.get("address").unwrap(), service_key);
        assert_eq!(registry.get("primary").unwrap(), VALID_KEY);
    }

    #[test]
    fn test_malformed_service_key_skipped() {
        let registry = KeyRegistry::new(
            VALID_KEY,
            None,
            &[("address".to_string(), "bad".to_string())],
        )
        .unwrap();
        // falls back to primary
        assert_eq!(registry.get("address").unwrap(), VALID_KEY);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_expired_key_rejected() {
        let past = Utc::now() - Duration::days(1);
        let registry = KeyRegistry::new(VALID_KEY, Some(past), &[]).unwrap();
        let err = registry.get("primary").unwrap_err();
        assert_eq!(err.code(), "API_KEY_ERROR");
        // status transitioned monotonically
        assert_eq!(
            registry.key_info("primary").unwrap().status,
            KeyStatus::Expired
        );
    }

    #[test]
    fn test_last_used_updated() {
        let registry = KeyRegistry::new(VALID_KEY, None, &[]).unwrap();
        assert!(registry.key_info("primary").unwrap().last_used_at.is_none());
        registry.get("primary").unwrap();
        assert!(registry.key_info("primary").unwrap().last_used_at.is_some());
    }

    #[test]
    fn test_stats_expiring_soon() {
        let soon = Utc::now() + Duration::days(10);
        let registry = KeyRegistry::new(VALID_KEY, Some(soon), &[]).unwrap();
        let stats = registry.stats();
        assert_eq!(stats.total_keys, 1);
        assert_eq!(stats.active_keys, 1);
        assert_eq!(stats.expiring_soon, 1);
    }

    #[test]
    fn test_key_info_masks_secret() {
        let registry = KeyRegistry::new(VALID_KEY, None, &[]).unwrap();
        let info = registry.key_info("primary").unwrap();
        assert!(info.key_preview.starts_with("abcd"));
        assert!(!info.key_preview.contains("efgh"));
    }

    #[test]
    fn test_identifier_is_not_secret() {
        let registry = KeyRegistry::new(VALID_KEY, None, &[]).unwrap();
        let id = registry.identifier("primary");
        assert!(id.starts_with("key:primary:"));
        assert!(!id.contains(VALID_KEY));
        // stable across calls
        assert_eq!(id, registry.identifier("primary"));
    }

    #[test]
    fn test_parse_expiry_formats() {
        assert!(parse_expiry("2026-12-31").is_ok());
        assert!(parse_expiry("2026-12-31T00:00:00Z").is_ok());
        assert!(parse_expiry("next year").is_err());
    }
}
