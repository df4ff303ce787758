/// Resilience patterns shared by the backend crates
///
/// - **Retry**: exponential backoff with jitter, gated by a caller supplied
///   predicate so that only transient failures are re-attempted
/// - **Timeout**: time limits on calls to external collaborators
/// - **Presets**: tuned settings for transactions, object storage and mail
///
/// # Example: retry only transient errors
///
/// ```rust,no_run
/// use resilience::{presets, retry::with_retry_if};
///
/// #[tokio::main]
/// async fn main() {
///     let config = presets::transaction_config();
///
///     let result = with_retry_if(
///         &config.retry,
///         |err: &String| err.contains("serialization"),
///         || async { Ok::<_, String>(()) },
///     )
///     .await;
///     assert!(result.is_ok());
/// }
/// ```

pub mod presets;
pub mod retry;
pub mod timeout;

pub use presets::{mail_config, object_storage_config, transaction_config, ServiceConfig};
pub use retry::{with_retry_if, RetryConfig};
pub use timeout::{with_timeout, with_timeout_result, TimeoutConfig, TimeoutError};
