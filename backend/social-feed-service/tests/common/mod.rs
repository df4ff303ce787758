//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use actix_web::http::header::HeaderMap;
use async_trait::async_trait;
use parking_lot::Mutex;
use social_feed_service::config::{
    AppConfig, AuthConfig, Config, ContentPolicy, CoordinatorConfig, CorsConfig, EmailConfig,
    MediaBackend, StoreBackend, UploadConfig,
};
use social_feed_service::coordinator::Coordinator;
use social_feed_service::domain::{Post, User};
use social_feed_service::error::{AppError, Result};
use social_feed_service::handlers::AppState;
use social_feed_service::mail::{MailNotifier, WelcomeMail};
use social_feed_service::media::{InMemoryMediaStore, StagedUpload};
use social_feed_service::middleware::{Identity, IdentityResolver};
use social_feed_service::store::MemoryStore;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

pub const ADMIN_EMAIL: &str = "admin@example.com";
pub const SUBJECT_HEADER: &str = "x-test-subject";
pub const EMAIL_HEADER: &str = "x-test-email";

/// Records welcome mails instead of sending them.
#[derive(Default)]
pub struct RecordingMail {
    sent: Mutex<Vec<WelcomeMail>>,
}

impl RecordingMail {
    pub fn sent(&self) -> Vec<WelcomeMail> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl MailNotifier for RecordingMail {
    async fn send_welcome(&self, mail: &WelcomeMail) -> Result<()> {
        self.sent.lock().push(mail.clone());
        Ok(())
    }
}

/// Always fails, to show mail never affects user creation.
pub struct FailingMail;

#[async_trait]
impl MailNotifier for FailingMail {
    async fn send_welcome(&self, _mail: &WelcomeMail) -> Result<()> {
        Err(AppError::ExternalService {
            service: "mail",
            message: "smtp down".into(),
        })
    }
}

/// Trusts plain headers instead of verifying tokens.
pub struct HeaderIdentityResolver;

impl IdentityResolver for HeaderIdentityResolver {
    fn resolve(&self, headers: &HeaderMap) -> std::result::Result<Identity, AppError> {
        let subject = headers
            .get(SUBJECT_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized("Missing test subject".into()))?;
        let mut identity = Identity::new(subject);
        identity.email = headers
            .get(EMAIL_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        identity.first_name = Some(subject.to_string());
        identity.last_name = Some("Tester".into());
        Ok(identity)
    }
}

pub fn identity(name: &str) -> Identity {
    let mut identity = Identity::new(format!("auth0|{name}"));
    identity.email = Some(format!("{name}@example.com"));
    identity.first_name = Some(name.to_string());
    identity.last_name = Some("Tester".into());
    identity
}

pub fn test_config(upload_dir: &Path) -> Config {
    Config {
        app: AppConfig {
            env: "test".into(),
            host: "127.0.0.1".into(),
            port: 0,
            expose_error_details: false,
            log_format: "text".into(),
        },
        cors: CorsConfig {
            allowed_origins: "*".into(),
        },
        store: StoreBackend::Memory,
        auth: AuthConfig {
            jwt_public_key_pem: None,
            jwt_issuer: None,
            jwt_audience: None,
            admin_email: Some(ADMIN_EMAIL.into()),
        },
        media: MediaBackend::Memory,
        email: EmailConfig {
            smtp_host: String::new(),
            smtp_port: 587,
            smtp_username: String::new(),
            smtp_password: String::new(),
            use_starttls: true,
            from_address: "noreply@example.com".into(),
            app_name: "Social Feed".into(),
        },
        coordinator: CoordinatorConfig {
            max_retries: 8,
            initial_backoff_ms: 1,
            max_backoff_ms: 10,
            unit_timeout_ms: 5_000,
        },
        uploads: UploadConfig {
            dir: upload_dir.to_path_buf(),
            ..UploadConfig::default()
        },
        content: ContentPolicy::default(),
    }
}

pub struct Harness {
    pub store: MemoryStore,
    pub media: Arc<InMemoryMediaStore>,
    pub mail: Arc<RecordingMail>,
    pub state: AppState,
    pub config: Config,
    pub upload_dir: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(adjust: impl FnOnce(&mut Config)) -> Self {
        let upload_dir = tempfile::tempdir().expect("temp dir");
        let mut config = test_config(upload_dir.path());
        adjust(&mut config);

        let store = MemoryStore::new();
        let media = Arc::new(InMemoryMediaStore::new());
        let mail = Arc::new(RecordingMail::default());
        let coordinator = Coordinator::new(
            Arc::new(store.clone()),
            config.coordinator.service_config(),
        );
        let state = AppState::new(coordinator, media.clone(), mail.clone(), &config);

        Self {
            store,
            media,
            mail,
            state,
            config,
            upload_dir,
        }
    }

    pub async fn user(&self, name: &str) -> User {
        self.state
            .users
            .sync(&identity(name))
            .await
            .expect("sync user")
            .user
    }

    pub async fn admin(&self) -> User {
        let mut admin = identity("admin");
        admin.email = Some(ADMIN_EMAIL.into());
        self.state.users.sync(&admin).await.expect("sync admin").user
    }

    pub async fn text_post(&self, author: &User, text: &str) -> Post {
        self.state
            .posts
            .create_post(author.id, Some(text.to_string()), None)
            .await
            .expect("create post")
    }

    /// Write a file into the upload directory and wrap it as a staged upload.
    pub fn stage(&self, name: &str, content_type: &str, bytes: &[u8]) -> StagedUpload {
        let path = self.upload_dir.path().join(format!("{}-{name}", uuid::Uuid::new_v4()));
        std::fs::write(&path, bytes).expect("write staged file");
        StagedUpload::new(path, content_type, Some(name.to_string()), bytes.len())
    }

    pub fn staged_files(&self) -> usize {
        std::fs::read_dir(self.upload_dir.path())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}
