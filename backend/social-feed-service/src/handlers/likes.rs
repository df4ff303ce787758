use super::{ok, AppState};
use crate::coordinator::detach;
use crate::domain::PostId;
use crate::error::Result;
use crate::middleware::Identity;
use crate::services::LikeToggle;
use actix_web::{web, HttpResponse};
use serde_json::json;

/// POST /api/likes/{post_id}
pub async fn toggle_like(
    state: web::Data<AppState>,
    path: web::Path<PostId>,
    identity: Identity,
) -> Result<HttpResponse> {
    let actor = state.current_user(&identity).await?;
    let post_id = path.into_inner();

    let graph = state.graph.clone();
    let outcome = detach(async move { graph.toggle_like(actor.id, post_id).await }).await?;
    let message = match outcome {
        LikeToggle::Liked => "Post liked",
        LikeToggle::Unliked => "Post unliked",
    };
    Ok(ok(message, json!({ "state": outcome, "postId": post_id })))
}

/// GET /api/likes/{post_id}
pub async fn list_likes(
    state: web::Data<AppState>,
    path: web::Path<PostId>,
    _identity: Identity,
) -> Result<HttpResponse> {
    let listing = state.posts.list_likes(path.into_inner()).await?;
    Ok(ok("Likes fetched", listing))
}
