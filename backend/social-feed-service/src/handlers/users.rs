/// User handlers - sync, profile lookup, profile update and follow toggling
use super::uploads::stage_multipart;
use super::{created, ok, AppState};
use crate::coordinator::detach;
use crate::error::Result;
use crate::middleware::Identity;
use crate::services::FollowToggle;
use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use serde_json::json;

/// POST /api/users/sync
pub async fn sync_user(state: web::Data<AppState>, identity: Identity) -> Result<HttpResponse> {
    let users = state.users.clone();
    let outcome = detach(async move { users.sync(&identity).await }).await?;
    if outcome.created {
        Ok(created("User created", json!({ "user": outcome.user.summary() })))
    } else {
        Ok(ok("User already exists", json!({ "user": outcome.user.summary() })))
    }
}

/// GET /api/users/me
pub async fn get_current_user(
    state: web::Data<AppState>,
    identity: Identity,
) -> Result<HttpResponse> {
    let profile = state.users.current(&identity).await?;
    Ok(ok("User found", json!({ "user": profile })))
}

/// GET /api/users/{username}
pub async fn get_user(
    state: web::Data<AppState>,
    path: web::Path<String>,
    _identity: Identity,
) -> Result<HttpResponse> {
    let profile = state.users.by_username(&path.into_inner()).await?;
    Ok(ok("User found", json!({ "user": profile })))
}

/// PUT /api/users (multipart: `username`, `image`)
pub async fn update_profile(
    state: web::Data<AppState>,
    identity: Identity,
    payload: Multipart,
) -> Result<HttpResponse> {
    let actor = state.current_user(&identity).await?;
    let mut form = stage_multipart(payload, &state.uploads).await?;
    let username = form.text("username");
    let image = form.single_file()?;

    let users = state.users.clone();
    let user = detach(async move { users.update_profile(actor.id, username, image).await }).await?;
    Ok(ok("Profile updated", json!({ "user": user.summary() })))
}

/// PUT /api/users/{username}/follow
pub async fn toggle_follow(
    state: web::Data<AppState>,
    path: web::Path<String>,
    identity: Identity,
) -> Result<HttpResponse> {
    let actor = state.current_user(&identity).await?;
    let target = state.users.lookup(&path.into_inner()).await?;

    let graph = state.graph.clone();
    let outcome = detach(async move { graph.toggle_follow(actor.id, target.id).await }).await?;
    let message = match outcome {
        FollowToggle::Followed => "User followed",
        FollowToggle::Unfollowed => "User unfollowed",
    };
    Ok(ok(message, json!({ "state": outcome, "userId": target.id })))
}
