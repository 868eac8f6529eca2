//! Logging setup and secret-masking helpers.
//!
//! Every sink that touches a credential goes through [`mask_secret`] /
//! [`mask_query`]; the raw key must never reach a log record.

use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// RFC-3339 local-time formatter for log records
struct LocalTimer;

impl tracing_subscriber::fmt::time::FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        let now = chrono::Local::now();
        write!(w, "{}", now.to_rfc3339())
    }
}

/// Initialize the logging system.
///
/// The level filter comes from `LOG_LEVEL` (debug|info|warn|error), falling
/// back to `RUST_LOG` and then `info`. `log` macro records are bridged into
/// tracing.
pub fn init_logger() {
    let _ = tracing_log::LogTracer::init();

    let filter_layer = match std::env::var("LOG_LEVEL") {
        Ok(level) if matches!(level.as_str(), "debug" | "info" | "warn" | "error") => {
            EnvFilter::new(level)
        }
        _ => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    let console_layer = fmt::Layer::new()
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true)
        .with_timer(LocalTimer);

    let _ = tracing_subscriber::registry()
        .with(filter_layer)
        .with(console_layer)
        .try_init();

    info!("logging initialized (console)");
}

/// How many leading characters of a secret stay visible.
const MASK_VISIBLE_PREFIX: usize = 4;
/// Upper bound on the number of asterisks in a masked secret.
const MASK_MAX_STARS: usize = 12;

/// Mask a secret for log output: keep the first four characters, replace the
/// remainder with asterisks up to a bounded length.
pub fn mask_secret(secret: &str) -> String {
    let visible: String = secret.chars().take(MASK_VISIBLE_PREFIX).collect();
    let hidden = secret.chars().count().saturating_sub(MASK_VISIBLE_PREFIX);
    format!("{}{}", visible, "*".repeat(hidden.min(MASK_MAX_STARS)))
}

/// Render a query parameter list for logging, masking the `serviceKey` value.
pub fn mask_query(params: &[(String, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| {
            if k == "serviceKey" {
                format!("{}={}", k, mask_secret(v))
            } else {
                format!("{}={}", k, v)
            }
        })
        .collect::<Vec<_>>()
        .join("&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_keeps_four_chars() {
        let masked = mask_secret("abcdSECRETSECRETSECRET");
        assert!(masked.starts_with("abcd"));
        assert!(!masked.contains("SECRET"));
        assert!(masked[4..].chars().all(|c| c == '*'));
    }

    #[test]
    fn test_mask_bounded_length() {
        let masked = mask_secret(&"x".repeat(200));
        assert!(masked.len() <= MASK_VISIBLE_PREFIX + MASK_MAX_STARS);
    }

    #[test]
    fn test_mask_short_secret() {
        assert_eq!(mask_secret("abc"), "abc");
        assert_eq!(mask_secret(""), "");
    }

    #[test]
    fn test_mask_query_hides_service_key() {
        let params = vec![
            ("keyword".to_string(), "seoul".to_string()),
            ("serviceKey".to_string(), "abcdTOPSECRETVALUE123".to_string()),
        ];
        let rendered = mask_query(&params);
        assert!(rendered.contains("keyword=seoul"));
        assert!(rendered.contains("serviceKey=abcd"));
        assert!(!rendered.contains("TOPSECRET"));
    }
}
