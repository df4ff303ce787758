/// Preset configurations for the collaborators the feed service talks to
use crate::retry::RetryConfig;
use crate::timeout::TimeoutConfig;
use std::time::Duration;

/// Configuration bundle for a call site
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub timeout: TimeoutConfig,
    pub retry: RetryConfig,
}

/// Database atomic units
///
/// - Timeout: 10s per unit attempt
/// - Retry: 5 attempts, short backoff (serialization conflicts clear quickly)
pub fn transaction_config() -> ServiceConfig {
    ServiceConfig {
        timeout: TimeoutConfig {
            duration: Duration::from_secs(10),
        },
        retry: RetryConfig {
            max_retries: 5,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(500),
            backoff_multiplier: 2.0,
            jitter: true,
        },
    }
}

/// Object storage (S3 uploads and deletes)
///
/// - Timeout: 60s (uploads can be large)
/// - Retry: 2 attempts
pub fn object_storage_config() -> ServiceConfig {
    ServiceConfig {
        timeout: TimeoutConfig {
            duration: Duration::from_secs(60),
        },
        retry: RetryConfig {
            max_retries: 2,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(2),
            backoff_multiplier: 2.0,
            jitter: true,
        },
    }
}

/// Outbound SMTP
///
/// - Timeout: 15s
/// - Retry: 3 attempts, slow backoff
pub fn mail_config() -> ServiceConfig {
    ServiceConfig {
        timeout: TimeoutConfig {
            duration: Duration::from_secs(15),
        },
        retry: RetryConfig {
            max_retries: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            backoff_multiplier: 3.0,
            jitter: true,
        },
    }
}
