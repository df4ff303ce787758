//! HTTP surface tests: routing, envelopes, status codes and multipart staging.

mod common;

use actix_web::http::{header, StatusCode};
use actix_web::{test, web, App};
use common::{Harness, HeaderIdentityResolver, EMAIL_HEADER, SUBJECT_HEADER};
use serde_json::Value;
use social_feed_service::handlers;
use std::sync::Arc;

const BOUNDARY: &str = "----social-feed-test-boundary";

enum Part<'a> {
    Text(&'a str, &'a str),
    File {
        name: &'a str,
        file_name: &'a str,
        content_type: &'a str,
        bytes: &'a [u8],
    },
}

fn multipart(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                        .as_bytes(),
                );
            }
            Part::File {
                name,
                file_name,
                content_type,
                bytes,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n\
                         Content-Type: {content_type}\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
                body.extend_from_slice(b"\r\n");
            }
        }
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn as_user(req: test::TestRequest, name: &str) -> test::TestRequest {
    req.insert_header((SUBJECT_HEADER, format!("auth0|{name}")))
        .insert_header((EMAIL_HEADER, format!("{name}@example.com")))
}

fn multipart_request(req: test::TestRequest, parts: &[Part<'_>]) -> test::TestRequest {
    req.insert_header((
        header::CONTENT_TYPE,
        format!("multipart/form-data; boundary={BOUNDARY}"),
    ))
    .set_payload(multipart(parts))
}

macro_rules! app {
    ($h:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($h.state.clone()))
                .configure(|cfg| handlers::configure(cfg, Arc::new(HeaderIdentityResolver))),
        )
        .await
    };
}

#[actix_web::test]
async fn health_is_public_and_api_requires_identity() {
    let h = Harness::new();
    let app = app!(h);

    let resp = test::call_service(&app, test::TestRequest::get().uri("/api/health").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/api/health/ready").to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["ready"], true);

    let resp = test::call_service(&app, test::TestRequest::get().uri("/api/posts").to_request()).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], false);
}

#[actix_web::test]
async fn sync_creates_once_then_reports_existing() {
    let h = Harness::new();
    let app = app!(h);

    let req = as_user(test::TestRequest::post().uri("/api/users/sync"), "alice").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["user"]["username"], "alice");

    let req = as_user(test::TestRequest::post().uri("/api/users/sync"), "alice").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let req = as_user(test::TestRequest::get().uri("/api/users/me"), "alice").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["user"]["email"], "alice@example.com");
}

#[actix_web::test]
async fn unsynced_identity_is_not_found() {
    let h = Harness::new();
    let app = app!(h);
    let req = as_user(test::TestRequest::get().uri("/api/users/me"), "nobody").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn post_like_comment_flow() {
    let h = Harness::new();
    h.user("alice").await;
    h.user("bob").await;
    let app = app!(h);

    let req = multipart_request(
        as_user(test::TestRequest::post().uri("/api/posts"), "alice"),
        &[
            Part::Text("content", "first post"),
            Part::File {
                name: "file",
                file_name: "pic.png",
                content_type: "image/png",
                bytes: b"\x89PNG fake",
            },
        ],
    )
    .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body: Value = test::read_body_json(resp).await;
    let post_id = body["post"]["id"].as_i64().unwrap();
    assert_eq!(body["post"]["content"], "first post");
    assert_eq!(h.media.len(), 1);
    assert_eq!(h.staged_files(), 0);

    let req = as_user(
        test::TestRequest::post().uri(&format!("/api/likes/{post_id}")),
        "bob",
    )
    .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["state"], "liked");

    let req = as_user(
        test::TestRequest::post().uri(&format!("/api/comments/{post_id}")),
        "bob",
    )
    .set_json(serde_json::json!({ "content": "nice" }))
    .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let req = as_user(test::TestRequest::get().uri("/api/notifications"), "alice").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["notifications"].as_array().unwrap().len(), 2);

    let req = as_user(
        test::TestRequest::get().uri(&format!("/api/likes/{post_id}")),
        "alice",
    )
    .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["count"], 1);

    let req = as_user(
        test::TestRequest::delete().uri(&format!("/api/posts/{post_id}")),
        "bob",
    )
    .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let req = as_user(
        test::TestRequest::delete().uri(&format!("/api/posts/{post_id}")),
        "alice",
    )
    .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["comments_removed"], 1);
    assert_eq!(body["likes_removed"], 1);
    assert!(h.media.is_empty());
}

#[actix_web::test]
async fn empty_post_is_a_validation_error() {
    let h = Harness::new();
    h.user("alice").await;
    let app = app!(h);

    let req = multipart_request(
        as_user(test::TestRequest::post().uri("/api/posts"), "alice"),
        &[Part::Text("content", "   ")],
    )
    .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], false);
    assert!(body["message"].as_str().unwrap().contains("Provide a file"));
}

#[actix_web::test]
async fn unsupported_upload_type_is_rejected_and_not_staged() {
    let h = Harness::new();
    h.user("alice").await;
    let app = app!(h);

    let req = multipart_request(
        as_user(test::TestRequest::post().uri("/api/posts"), "alice"),
        &[Part::File {
            name: "file",
            file_name: "clip.mp4",
            content_type: "video/mp4",
            bytes: b"video",
        }],
    )
    .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(h.staged_files(), 0);
    assert_eq!(h.store.counts().posts, 0);
}

#[actix_web::test]
async fn feed_pages_with_next_post_cursor() {
    let h = Harness::new();
    let alice = h.user("alice").await;
    for i in 0..12 {
        h.text_post(&alice, &format!("p{i}")).await;
    }
    let app = app!(h);

    let req = as_user(test::TestRequest::get().uri("/api/posts"), "alice").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["posts"].as_array().unwrap().len(), 10);
    assert_eq!(body["has_next"], true);
    let cursor = body["next_cursor"].as_i64().unwrap();

    let req = as_user(
        test::TestRequest::get().uri(&format!("/api/posts?nextPost={cursor}")),
        "alice",
    )
    .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["posts"].as_array().unwrap().len(), 2);
    assert_eq!(body["has_next"], false);
    assert!(body["next_cursor"].is_null());
}

#[actix_web::test]
async fn follow_by_username_and_self_follow() {
    let h = Harness::new();
    h.user("alice").await;
    h.user("bob").await;
    let app = app!(h);

    let req = as_user(test::TestRequest::put().uri("/api/users/bob/follow"), "alice").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["state"], "followed");

    let req = as_user(test::TestRequest::get().uri("/api/users/bob"), "alice").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["user"]["followers"][0]["username"], "alice");
    assert!(body["user"].get("email").is_none());

    let req = as_user(test::TestRequest::put().uri("/api/users/alice/follow"), "alice").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn news_requires_admin_over_http() {
    let h = Harness::new();
    h.user("alice").await;
    h.admin().await;
    let app = app!(h);

    let req = multipart_request(
        as_user(test::TestRequest::post().uri("/api/news"), "alice"),
        &[Part::Text("content", "announcement")],
    )
    .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let req = multipart_request(
        as_user(test::TestRequest::post().uri("/api/news"), "admin"),
        &[
            Part::Text("content", "announcement"),
            Part::File {
                name: "files",
                file_name: "notes.pdf",
                content_type: "application/pdf",
                bytes: b"%PDF-1.4",
            },
        ],
    )
    .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let req = as_user(test::TestRequest::get().uri("/api/news"), "alice").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let news = body["news"].as_array().unwrap();
    assert_eq!(news.len(), 1);
    assert_eq!(news[0]["files"].as_array().unwrap().len(), 1);
}

#[actix_web::test]
async fn notification_deletion_endpoints_are_idempotent() {
    let h = Harness::new();
    let alice = h.user("alice").await;
    let bob = h.user("bob").await;
    h.state.graph.toggle_follow(bob.id, alice.id).await.unwrap();
    let app = app!(h);

    let req = as_user(test::TestRequest::delete().uri("/api/notifications"), "alice").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["removed"], 1);

    let req = as_user(test::TestRequest::delete().uri("/api/notifications"), "alice").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["removed"], 0);

    let req = as_user(test::TestRequest::delete().uri("/api/notifications/42"), "alice").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn server_errors_hide_internal_details() {
    let h = Harness::new();
    let alice = h.user("alice").await;
    let post = h.text_post(&alice, "p").await;
    h.store
        .fail_on(social_feed_service::store::MutationKind::DeleteCommentsByPost);
    let app = app!(h);

    let req = as_user(
        test::TestRequest::delete().uri(&format!("/api/posts/{}", post.id)),
        "alice",
    )
    .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], false);
    assert!(body["error"].is_null());
    assert_eq!(body["message"], "Unable to complete delete_post");
}
