/// News handlers - administrator announcements with attachments
use super::uploads::stage_multipart;
use super::{created, ok, AppState};
use crate::coordinator::detach;
use crate::domain::NewsId;
use crate::error::Result;
use crate::middleware::Identity;
use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use serde_json::json;

/// POST /api/news (multipart: `content`, up to three files)
pub async fn create_news(
    state: web::Data<AppState>,
    identity: Identity,
    payload: Multipart,
) -> Result<HttpResponse> {
    let actor = state.current_user(&identity).await?;
    let mut form = stage_multipart(payload, &state.uploads).await?;
    let content = form.text("content");
    let files = std::mem::take(&mut form.files);

    let news = state.news.clone();
    let created_news = detach(async move { news.create_news(actor.id, content, files).await }).await?;
    Ok(created("News created", json!({ "news": created_news })))
}

/// GET /api/news
pub async fn list_news(state: web::Data<AppState>, _identity: Identity) -> Result<HttpResponse> {
    let news = state.news.list_news().await?;
    Ok(ok("News fetched", json!({ "news": news })))
}

/// DELETE /api/news/{id}
pub async fn delete_news(
    state: web::Data<AppState>,
    path: web::Path<NewsId>,
    identity: Identity,
) -> Result<HttpResponse> {
    let actor = state.current_user(&identity).await?;
    let news_id = path.into_inner();

    let news = state.news.clone();
    let deletion = detach(async move { news.delete_news(actor.id, news_id).await }).await?;
    Ok(ok("News deleted", deletion))
}
