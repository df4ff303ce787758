/// Comment handlers
use super::{created, ok, AppState};
use crate::coordinator::detach;
use crate::domain::{CommentId, PostId};
use crate::error::Result;
use crate::middleware::Identity;
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
pub struct CreateCommentRequest {
    pub content: Option<String>,
}

/// POST /api/comments/{post_id}
pub async fn create_comment(
    state: web::Data<AppState>,
    path: web::Path<PostId>,
    identity: Identity,
    req: web::Json<CreateCommentRequest>,
) -> Result<HttpResponse> {
    let actor = state.current_user(&identity).await?;
    let post_id = path.into_inner();
    let content = req.into_inner().content;

    let comments = state.comments.clone();
    let comment =
        detach(async move { comments.create_comment(actor.id, post_id, content).await }).await?;
    Ok(created("Comment created", json!({ "comment": comment })))
}

/// GET /api/comments/{post_id}
pub async fn list_comments(
    state: web::Data<AppState>,
    path: web::Path<PostId>,
    _identity: Identity,
) -> Result<HttpResponse> {
    let listing = state.comments.list_comments(path.into_inner()).await?;
    Ok(ok("Comments fetched", listing))
}

/// DELETE /api/comments/{comment_id}
pub async fn delete_comment(
    state: web::Data<AppState>,
    path: web::Path<CommentId>,
    identity: Identity,
) -> Result<HttpResponse> {
    let actor = state.current_user(&identity).await?;
    let comment_id = path.into_inner();

    let comments = state.comments.clone();
    let removed = detach(async move { comments.delete_comment(actor.id, comment_id).await }).await?;
    Ok(ok("Comment deleted", json!({ "comment": removed })))
}
