/// HTTP handlers for the social feed API
///
/// Every route under `/api` except the health checks requires an identity.
/// Writes are driven on a detached task (see `coordinator::detach`) so a client
/// that disconnects cannot interrupt a unit halfway.
pub mod comments;
pub mod health;
pub mod likes;
pub mod news;
pub mod notifications;
pub mod posts;
pub mod uploads;
pub mod users;

use crate::config::UploadConfig;
use crate::coordinator::Coordinator;
use crate::domain::User;
use crate::error::{AppError, Result};
use crate::mail::MailNotifier;
use crate::media::MediaStore;
use crate::middleware::{Identity, IdentityMiddleware, IdentityResolver};
use crate::services::{
    CommentService, FeedService, NewsService, NotificationService, PostService,
    SocialGraphService, UserService,
};
use crate::store::EntityStore;
use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, ResponseError};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Shared application state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn EntityStore>,
    pub media: Arc<dyn MediaStore>,
    pub uploads: UploadConfig,
    pub users: UserService,
    pub graph: SocialGraphService,
    pub posts: PostService,
    pub comments: CommentService,
    pub news: NewsService,
    pub notifications: NotificationService,
    pub feed: FeedService,
}

impl AppState {
    pub fn new(
        coordinator: Coordinator,
        media: Arc<dyn MediaStore>,
        mail: Arc<dyn MailNotifier>,
        config: &crate::config::Config,
    ) -> Self {
        let store = Arc::clone(coordinator.store());
        Self {
            users: UserService::new(
                coordinator.clone(),
                Arc::clone(&media),
                mail,
                config.auth.admin_email.clone(),
            ),
            graph: SocialGraphService::new(coordinator.clone(), config.content.allow_self_like),
            posts: PostService::new(coordinator.clone(), Arc::clone(&media)),
            comments: CommentService::new(coordinator.clone()),
            news: NewsService::new(
                coordinator.clone(),
                Arc::clone(&media),
                config.uploads.max_files,
            ),
            notifications: NotificationService::new(coordinator),
            feed: FeedService::new(Arc::clone(&store), config.content.page_size),
            uploads: config.uploads.clone(),
            store,
            media,
        }
    }

    /// The stored user behind an authenticated identity.
    pub async fn current_user(&self, identity: &Identity) -> Result<User> {
        self.users.resolve(identity).await
    }
}

/// Build the `{success, message, ...data}` envelope.
pub fn envelope<T: Serialize>(status: StatusCode, message: &str, data: T) -> HttpResponse {
    let mut body = Map::new();
    body.insert("success".into(), Value::Bool(true));
    body.insert("message".into(), Value::String(message.to_string()));
    match serde_json::to_value(data) {
        Ok(Value::Object(fields)) => body.extend(fields),
        Ok(Value::Null) => {}
        Ok(other) => {
            body.insert("data".into(), other);
        }
        Err(err) => {
            return AppError::Internal(format!("response encoding failed: {err}")).error_response();
        }
    }
    HttpResponse::build(status).json(Value::Object(body))
}

pub fn ok<T: Serialize>(message: &str, data: T) -> HttpResponse {
    envelope(StatusCode::OK, message, data)
}

pub fn created<T: Serialize>(message: &str, data: T) -> HttpResponse {
    envelope(StatusCode::CREATED, message, data)
}

/// Register every route. Health checks are public; everything else under
/// `/api` passes through the identity middleware.
pub fn configure(cfg: &mut web::ServiceConfig, resolver: Arc<dyn IdentityResolver>) {
    cfg.service(
        web::scope("/api/health")
            .route("", web::get().to(health::liveness))
            .route("/ready", web::get().to(health::readiness)),
    )
    .service(
        web::scope("/api")
            .wrap(IdentityMiddleware::new(resolver))
            .service(
                web::scope("/users")
                    .route("/sync", web::post().to(users::sync_user))
                    .route("/me", web::get().to(users::get_current_user))
                    .route("", web::put().to(users::update_profile))
                    .route("/", web::put().to(users::update_profile))
                    .route("/{username}", web::get().to(users::get_user))
                    .route("/{username}/follow", web::put().to(users::toggle_follow)),
            )
            .service(
                web::scope("/posts")
                    .route("", web::post().to(posts::create_post))
                    .route("/", web::post().to(posts::create_post))
                    .route("", web::get().to(posts::list_posts))
                    .route("/", web::get().to(posts::list_posts))
                    .route("/{id}", web::get().to(posts::get_post))
                    .route("/{id}", web::delete().to(posts::delete_post)),
            )
            .service(
                web::scope("/likes")
                    .route("/{post_id}", web::post().to(likes::toggle_like))
                    .route("/{post_id}", web::get().to(likes::list_likes)),
            )
            .service(
                web::scope("/comments")
                    .route("/{post_id}", web::post().to(comments::create_comment))
                    .route("/{post_id}", web::get().to(comments::list_comments))
                    .route("/{comment_id}", web::delete().to(comments::delete_comment)),
            )
            .service(
                web::scope("/notifications")
                    .route("", web::get().to(notifications::list_notifications))
                    .route("/", web::get().to(notifications::list_notifications))
                    .route("", web::delete().to(notifications::clear_notifications))
                    .route("/", web::delete().to(notifications::clear_notifications))
                    .route("/{id}", web::delete().to(notifications::delete_notification)),
            )
            .service(
                web::scope("/news")
                    .route("", web::post().to(news::create_news))
                    .route("/", web::post().to(news::create_news))
                    .route("", web::get().to(news::list_news))
                    .route("/", web::get().to(news::list_news))
                    .route("/{id}", web::delete().to(news::delete_news)),
            ),
    );
}
