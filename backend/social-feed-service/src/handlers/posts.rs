/// Post handlers - HTTP endpoints for post operations
use super::uploads::stage_multipart;
use super::{created, ok, AppState};
use crate::coordinator::detach;
use crate::domain::PostId;
use crate::error::Result;
use crate::middleware::Identity;
use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    #[serde(rename = "nextPost")]
    pub next_post: Option<PostId>,
}

/// POST /api/posts (multipart: `content`, `file`)
pub async fn create_post(
    state: web::Data<AppState>,
    identity: Identity,
    payload: Multipart,
) -> Result<HttpResponse> {
    let actor = state.current_user(&identity).await?;
    let mut form = stage_multipart(payload, &state.uploads).await?;
    let content = form.text("content");
    let attachment = form.single_file()?;

    let posts = state.posts.clone();
    let post = detach(async move { posts.create_post(actor.id, content, attachment).await }).await?;
    Ok(created("Post created", json!({ "post": post })))
}

/// GET /api/posts?nextPost={id}
pub async fn list_posts(
    state: web::Data<AppState>,
    query: web::Query<FeedQuery>,
    _identity: Identity,
) -> Result<HttpResponse> {
    let page = state.feed.list_posts(query.next_post).await?;
    Ok(ok("Posts fetched", page))
}

/// GET /api/posts/{id}
pub async fn get_post(
    state: web::Data<AppState>,
    path: web::Path<PostId>,
    _identity: Identity,
) -> Result<HttpResponse> {
    let post = state.posts.get_post(path.into_inner()).await?;
    Ok(ok("Post found", json!({ "post": post })))
}

/// DELETE /api/posts/{id}
pub async fn delete_post(
    state: web::Data<AppState>,
    path: web::Path<PostId>,
    identity: Identity,
) -> Result<HttpResponse> {
    let actor = state.current_user(&identity).await?;
    let post_id = path.into_inner();

    let posts = state.posts.clone();
    let deletion = detach(async move { posts.delete_post(actor.id, post_id).await }).await?;
    Ok(ok("Post deleted", deletion))
}
