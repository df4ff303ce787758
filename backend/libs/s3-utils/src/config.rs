/// S3 configuration for the media store
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    /// S3 bucket name
    pub bucket: String,
    /// AWS region
    pub region: String,
    /// Base URL for public access (CDN domain)
    pub base_url: String,
    /// Custom endpoint for S3-compatible stores
    pub endpoint: Option<String>,
    /// Whether to use path-style URLs (false = virtual-hosted-style)
    pub path_style: bool,
    /// Prefix prepended to every object key
    pub key_prefix: String,
}

impl S3Config {
    /// Load S3 configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            bucket: std::env::var("S3_BUCKET").unwrap_or_else(|_| "social-feed-media".to_string()),
            region: std::env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            base_url: std::env::var("S3_BASE_URL")
                .unwrap_or_else(|_| "https://s3.amazonaws.com".to_string()),
            endpoint: std::env::var("S3_ENDPOINT").ok().filter(|v| !v.is_empty()),
            path_style: std::env::var("S3_PATH_STYLE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
            key_prefix: std::env::var("S3_KEY_PREFIX").unwrap_or_else(|_| "uploads".to_string()),
        }
    }

    /// Public URL for an object key
    pub fn public_url(&self, key: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        if self.path_style {
            format!("{}/{}/{}", base, self.bucket, key)
        } else {
            format!("{}/{}", base, key)
        }
    }

    /// Inverse of [`S3Config::public_url`]; `None` for foreign URLs
    pub fn key_from_url<'a>(&self, url: &'a str) -> Option<&'a str> {
        let base = self.base_url.trim_end_matches('/');
        let rest = url.strip_prefix(base)?.strip_prefix('/')?;
        if self.path_style {
            rest.strip_prefix(self.bucket.as_str())?.strip_prefix('/')
        } else {
            Some(rest)
        }
    }
}
