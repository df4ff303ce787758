use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::Context;
use db_pool::{create_pool, run_migrations, DbConfig};
use s3_utils::{S3Client, S3Config};
use social_feed_service::config::{MediaBackend, StoreBackend};
use social_feed_service::coordinator::Coordinator;
use social_feed_service::handlers::{self, AppState};
use social_feed_service::mail::{MailNotifier, SmtpMailNotifier};
use social_feed_service::media::{InMemoryMediaStore, MediaStore, S3MediaStore};
use social_feed_service::middleware::{IdentityResolver, JwtIdentityResolver};
use social_feed_service::store::{EntityStore, MemoryStore, PgEntityStore};
use social_feed_service::{error, metrics, Config, MIGRATOR};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SERVICE_NAME: &str = "social-feed-service";

fn init_tracing(format: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,actix_web=info,sqlx=warn".into());
    let registry = tracing_subscriber::registry().with(filter);
    if format.eq_ignore_ascii_case("json") {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn build_store(config: &Config) -> anyhow::Result<Arc<dyn EntityStore>> {
    match config.store {
        StoreBackend::Postgres => {
            let db_config = DbConfig::from_env(SERVICE_NAME).map_err(anyhow::Error::msg)?;
            db_config.log_config();
            let pool = create_pool(db_config)
                .await
                .context("failed to create database pool")?;
            run_migrations(&pool, &MIGRATOR)
                .await
                .context("failed to run database migrations")?;
            Ok(Arc::new(PgEntityStore::new(pool)))
        }
        StoreBackend::Memory => {
            warn!("using the in-memory entity store; for development only, every unit copies the whole store and data is lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

async fn build_media(config: &Config) -> Arc<dyn MediaStore> {
    match config.media {
        MediaBackend::S3 => {
            let client = S3Client::with_config(S3Config::from_env()).await;
            info!(bucket = %client.config().bucket, "media store backed by S3");
            Arc::new(S3MediaStore::new(client))
        }
        MediaBackend::Memory => {
            warn!("using the in-memory media store; uploads are lost on restart");
            Arc::new(InMemoryMediaStore::new())
        }
    }
}

fn cors_for(allowed_origins: &str) -> Cors {
    let mut cors = Cors::default();
    for origin in allowed_origins.split(',') {
        let origin = origin.trim();
        if origin == "*" {
            cors = cors.allow_any_origin();
        } else if !origin.is_empty() {
            cors = cors.allowed_origin(origin);
        }
    }
    cors.allow_any_method().allow_any_header().max_age(3600)
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let config = Config::from_env().context("failed to load configuration")?;
    init_tracing(&config.app.log_format);
    error::expose_error_details(config.app.expose_error_details);
    info!(env = %config.app.env, store = ?config.store, media = ?config.media, "starting {SERVICE_NAME}");

    let store = build_store(&config).await?;
    let media = build_media(&config).await;
    let mail: Arc<dyn MailNotifier> = Arc::new(
        SmtpMailNotifier::new(&config.email).context("failed to configure mail notifier")?,
    );
    let resolver: Arc<dyn IdentityResolver> = Arc::new(
        JwtIdentityResolver::from_config(&config.auth)
            .context("failed to configure identity resolver")?,
    );
    tokio::fs::create_dir_all(&config.uploads.dir)
        .await
        .with_context(|| format!("failed to create {}", config.uploads.dir.display()))?;

    let coordinator = Coordinator::new(store, config.coordinator.service_config());
    let state = web::Data::new(AppState::new(coordinator, media, mail, &config));

    let bind_address = format!("{}:{}", config.app.host, config.app.port);
    info!(address = %bind_address, "HTTP server listening");

    let allowed_origins = config.cors.allowed_origins.clone();
    HttpServer::new(move || {
        let resolver = Arc::clone(&resolver);
        App::new()
            .app_data(state.clone())
            .wrap(cors_for(&allowed_origins))
            .wrap(tracing_actix_web::TracingLogger::default())
            .route("/metrics", web::get().to(metrics::serve_metrics))
            .configure(|cfg| handlers::configure(cfg, resolver))
    })
    .bind(&bind_address)
    .with_context(|| format!("failed to bind {bind_address}"))?
    .run()
    .await
    .context("HTTP server failed")?;

    info!("{SERVICE_NAME} stopped");
    Ok(())
}
