/// Configuration management for the social feed service
///
/// Everything is read from environment variables (a `.env` file is loaded first
/// by `main`). Database pool settings are read separately by `db_pool::DbConfig`.
use anyhow::{bail, Context};
use db_pool::env_utils::{env_flag, env_opt, env_or};
use resilience::{transaction_config, ServiceConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub cors: CorsConfig,
    pub store: StoreBackend,
    pub auth: AuthConfig,
    pub media: MediaBackend,
    pub email: EmailConfig,
    pub coordinator: CoordinatorConfig,
    pub uploads: UploadConfig,
    pub content: ContentPolicy,
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application environment (development, staging, production)
    pub env: String,
    pub host: String,
    pub port: u16,
    /// Include underlying causes in 5xx response bodies
    pub expose_error_details: bool,
    /// `json` for structured logs, anything else for human-readable output
    pub log_format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Comma-separated list of allowed origins, `*` for any
    pub allowed_origins: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaBackend {
    S3,
    Memory,
}

/// Bearer token verification and admin designation
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// RS256 public key (PEM) used to verify bearer tokens
    pub jwt_public_key_pem: Option<String>,
    pub jwt_issuer: Option<String>,
    pub jwt_audience: Option<String>,
    /// Users synced with this email are created as administrators
    pub admin_email: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_public_key_pem", &self.jwt_public_key_pem.as_ref().map(|_| "<set>"))
            .field("jwt_issuer", &self.jwt_issuer)
            .field("jwt_audience", &self.jwt_audience)
            .field("admin_email", &self.admin_email)
            .finish()
    }
}

/// Outbound mail. An empty `smtp_host` disables delivery.
#[derive(Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
    pub use_starttls: bool,
    pub from_address: String,
    pub app_name: String,
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_username", &self.smtp_username)
            .field("smtp_password", &"<redacted>")
            .field("use_starttls", &self.use_starttls)
            .field("from_address", &self.from_address)
            .field("app_name", &self.app_name)
            .finish()
    }
}

/// Retry and timeout policy for atomic units
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub unit_timeout_ms: u64,
}

impl CoordinatorConfig {
    pub fn service_config(&self) -> ServiceConfig {
        let mut config = transaction_config();
        config.retry.max_retries = self.max_retries;
        config.retry.initial_backoff = Duration::from_millis(self.initial_backoff_ms);
        config.retry.max_backoff = Duration::from_millis(self.max_backoff_ms);
        config.timeout.duration = Duration::from_millis(self.unit_timeout_ms);
        config
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        let preset = transaction_config();
        Self {
            max_retries: preset.retry.max_retries,
            initial_backoff_ms: preset.retry.initial_backoff.as_millis() as u64,
            max_backoff_ms: preset.retry.max_backoff.as_millis() as u64,
            unit_timeout_ms: preset.timeout.duration.as_millis() as u64,
        }
    }
}

/// Local staging of multipart uploads
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    pub dir: PathBuf,
    pub max_file_bytes: usize,
    pub max_files: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            dir: std::env::temp_dir().join("social-feed-uploads"),
            max_file_bytes: 10 * 1024 * 1024,
            max_files: 3,
        }
    }
}

/// Content rules that are policy rather than invariant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentPolicy {
    /// Whether a user may like their own post (never notified either way)
    pub allow_self_like: bool,
    pub page_size: usize,
}

impl Default for ContentPolicy {
    fn default() -> Self {
        Self {
            allow_self_like: true,
            page_size: 10,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        let app_env: String = env_or("APP_ENV", "development".to_string());
        let production = app_env.eq_ignore_ascii_case("production");

        let allowed_origins = match env_opt::<String>("CORS_ALLOWED_ORIGINS") {
            Some(value) => value,
            None if production => bail!("CORS_ALLOWED_ORIGINS must be set in production"),
            None => "*".to_string(),
        };
        if production && allowed_origins.trim() == "*" {
            bail!("CORS_ALLOWED_ORIGINS cannot be '*' in production");
        }

        let store = match env_or("STORE_BACKEND", "postgres".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "postgres" => StoreBackend::Postgres,
            "memory" => StoreBackend::Memory,
            other => bail!("unsupported STORE_BACKEND: {other}"),
        };
        if production && store == StoreBackend::Memory {
            bail!("STORE_BACKEND=memory is for development and tests, not production");
        }

        let media = match env_or("MEDIA_BACKEND", "s3".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "s3" => MediaBackend::S3,
            "memory" => MediaBackend::Memory,
            other => bail!("unsupported MEDIA_BACKEND: {other}"),
        };

        let jwt_public_key_pem = match env_opt::<String>("JWT_PUBLIC_KEY_PEM") {
            Some(pem) => Some(pem.replace("\\n", "\n")),
            None => match env_opt::<PathBuf>("JWT_PUBLIC_KEY_FILE") {
                Some(path) => Some(std::fs::read_to_string(&path).with_context(|| {
                    format!("failed to read JWT_PUBLIC_KEY_FILE {}", path.display())
                })?),
                None => None,
            },
        };

        let coordinator_defaults = CoordinatorConfig::default();
        let upload_defaults = UploadConfig::default();
        let content_defaults = ContentPolicy::default();

        let page_size: usize = env_or("FEED_PAGE_SIZE", content_defaults.page_size);
        if page_size == 0 {
            bail!("FEED_PAGE_SIZE must be positive");
        }

        Ok(Config {
            app: AppConfig {
                env: app_env,
                host: env_or("SOCIAL_FEED_HOST", "0.0.0.0".to_string()),
                port: env_or("SOCIAL_FEED_PORT", 5000),
                expose_error_details: env_flag("EXPOSE_ERROR_DETAILS", false),
                log_format: env_or("LOG_FORMAT", "text".to_string()),
            },
            cors: CorsConfig { allowed_origins },
            store,
            auth: AuthConfig {
                jwt_public_key_pem,
                jwt_issuer: env_opt("JWT_ISSUER"),
                jwt_audience: env_opt("JWT_AUDIENCE"),
                admin_email: env_opt::<String>("ADMIN_EMAIL")
                    .map(|email| email.trim().to_ascii_lowercase()),
            },
            media,
            email: EmailConfig {
                smtp_host: env_or("SMTP_HOST", String::new()),
                smtp_port: env_or("SMTP_PORT", 587),
                smtp_username: env_or("SMTP_USERNAME", String::new()),
                smtp_password: env_or("SMTP_PASSWORD", String::new()),
                use_starttls: env_flag("SMTP_USE_STARTTLS", true),
                from_address: env_or("SMTP_FROM", "noreply@social-feed.local".to_string()),
                app_name: env_or("APP_NAME", "Social Feed".to_string()),
            },
            coordinator: CoordinatorConfig {
                max_retries: env_or("UNIT_MAX_RETRIES", coordinator_defaults.max_retries),
                initial_backoff_ms: env_or(
                    "UNIT_INITIAL_BACKOFF_MS",
                    coordinator_defaults.initial_backoff_ms,
                ),
                max_backoff_ms: env_or("UNIT_MAX_BACKOFF_MS", coordinator_defaults.max_backoff_ms),
                unit_timeout_ms: env_or("UNIT_TIMEOUT_MS", coordinator_defaults.unit_timeout_ms),
            },
            uploads: UploadConfig {
                dir: env_or("UPLOAD_DIR", upload_defaults.dir),
                max_file_bytes: env_or("UPLOAD_MAX_FILE_BYTES", upload_defaults.max_file_bytes),
                max_files: env_or("UPLOAD_MAX_FILES", upload_defaults.max_files),
            },
            content: ContentPolicy {
                allow_self_like: env_flag("ALLOW_SELF_LIKE", content_defaults.allow_self_like),
                page_size,
            },
        })
    }
}
