//! Users, posts, comments, news and notifications through the service layer.

mod common;

use common::{identity, Harness};
use social_feed_service::domain::{NotificationKind, UserId};
use social_feed_service::error::AppError;
use social_feed_service::store::{EntityStore, MutationKind};
use std::time::Duration;

async fn wait_for_mail(h: &Harness, expected: usize) {
    for _ in 0..100 {
        if h.mail.sent().len() >= expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn sync_is_idempotent_and_sends_one_welcome_mail() {
    let h = Harness::new();
    let first = h.state.users.sync(&identity("alice")).await.unwrap();
    let second = h.state.users.sync(&identity("alice")).await.unwrap();

    assert!(first.created);
    assert!(!second.created);
    assert_eq!(first.user.id, second.user.id);
    assert_eq!(first.user.username, "alice");
    assert_eq!(h.store.counts().users, 1);

    wait_for_mail(&h, 1).await;
    let sent = h.mail.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipient, "alice@example.com");
}

#[tokio::test]
async fn sync_requires_an_email() {
    let h = Harness::new();
    let mut anonymous = identity("ghost");
    anonymous.email = None;
    let err = h.state.users.sync(&anonymous).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert_eq!(h.store.counts().users, 0);
}

#[tokio::test]
async fn colliding_usernames_get_a_suffix() {
    let h = Harness::new();
    let first = h.user("sam").await;
    let mut other = identity("sam");
    other.subject = "google|sam".into();
    let second = h.state.users.sync(&other).await.unwrap().user;

    assert_eq!(first.username, "sam");
    assert_ne!(second.username, "sam");
    assert!(second.username.starts_with("sam"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_syncs_sharing_a_local_part_both_succeed() {
    let h = Harness::new();
    for round in 0..30 {
        let mut first = identity("jane");
        first.subject = format!("auth0|jane-a-{round}");
        first.email = Some(format!("jane{round}@a.com"));
        let mut second = identity("jane");
        second.subject = format!("google|jane-b-{round}");
        second.email = Some(format!("jane{round}@b.com"));

        let users_a = h.state.users.clone();
        let users_b = h.state.users.clone();
        let (a, b) = tokio::join!(
            tokio::spawn(async move { users_a.sync(&first).await }),
            tokio::spawn(async move { users_b.sync(&second).await }),
        );
        let a = a.unwrap().unwrap_or_else(|err| panic!("round {round}: {err}"));
        let b = b.unwrap().unwrap_or_else(|err| panic!("round {round}: {err}"));

        assert!(a.created && b.created);
        assert_ne!(a.user.username, b.user.username);
        assert!(a.user.username.starts_with(&format!("jane{round}")));
        assert!(b.user.username.starts_with(&format!("jane{round}")));
    }
    assert_eq!(h.store.counts().users, 60);
}

#[tokio::test]
async fn admin_email_grants_admin_flag() {
    let h = Harness::new();
    let admin = h.admin().await;
    let alice = h.user("alice").await;
    assert!(admin.is_admin);
    assert!(!alice.is_admin);
}

#[tokio::test]
async fn profile_lists_follow_summaries() {
    let h = Harness::new();
    let alice = h.user("alice").await;
    let bob = h.user("bob").await;
    h.state.graph.toggle_follow(bob.id, alice.id).await.unwrap();

    let profile = h.state.users.by_username("Alice").await.unwrap();
    assert_eq!(profile.followers.len(), 1);
    assert_eq!(profile.followers[0].username, "bob");
    assert!(profile.email.is_none());

    let me = h.state.users.current(&identity("bob")).await.unwrap();
    assert_eq!(me.following[0].id, alice.id);
    assert_eq!(me.email.as_deref(), Some("bob@example.com"));
}

#[tokio::test]
async fn profile_update_replaces_the_previous_picture() {
    let h = Harness::new();
    let alice = h.user("alice").await;

    let first = h.stage("one.png", "image/png", b"one");
    let updated = h
        .state
        .users
        .update_profile(alice.id, None, Some(first))
        .await
        .unwrap();
    let first_id = updated.profile_media_id.clone().unwrap();

    let second = h.stage("two.png", "image/png", b"two");
    let updated = h
        .state
        .users
        .update_profile(alice.id, Some("Alice_2".into()), Some(second))
        .await
        .unwrap();
    assert_eq!(updated.username, "alice_2");
    assert!(!h.media.contains(&first_id));
    assert!(h.media.contains(updated.profile_media_id.as_deref().unwrap()));
    assert_eq!(h.staged_files(), 0);
}

#[tokio::test]
async fn taken_username_is_a_conflict_and_discards_the_upload() {
    let h = Harness::new();
    let alice = h.user("alice").await;
    h.user("bob").await;

    let staged = h.stage("pic.png", "image/png", b"pic");
    let err = h
        .state
        .users
        .update_profile(alice.id, Some("bob".into()), Some(staged))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    assert!(h.media.is_empty());
    assert_eq!(h.staged_files(), 0);
}

#[tokio::test]
async fn failed_upload_creates_no_post_and_removes_the_staged_file() {
    let h = Harness::new();
    let alice = h.user("alice").await;
    h.media.set_fail_uploads(true);

    let staged = h.stage("photo.png", "image/png", b"png");
    let err = h
        .state
        .posts
        .create_post(alice.id, Some("caption".into()), Some(staged))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ExternalService { .. }));
    assert_eq!(h.store.counts().posts, 0);
    assert_eq!(h.staged_files(), 0);
}

#[tokio::test]
async fn aborted_post_unit_removes_the_uploaded_media() {
    let h = Harness::new();
    let alice = h.user("alice").await;
    h.store.fail_on(MutationKind::InsertPost);

    let staged = h.stage("photo.png", "image/png", b"png");
    let err = h
        .state
        .posts
        .create_post(alice.id, None, Some(staged))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::CoordinatorAbort { operation: "create_post", .. }));
    assert!(h.media.is_empty());
    assert_eq!(h.staged_files(), 0);
}

#[tokio::test]
async fn lost_commit_ack_keeps_the_uploaded_media() {
    let h = Harness::new();
    let alice = h.user("alice").await;
    h.store.inject_lost_commit_acks(1);

    let staged = h.stage("photo.png", "image/png", b"png");
    let err = h
        .state
        .posts
        .create_post(alice.id, None, Some(staged))
        .await
        .unwrap_err();
    assert!(err.commit_outcome_unknown());
    assert_eq!(h.store.counts().posts, 1);
    assert_eq!(h.media.len(), 1);
    assert_eq!(h.staged_files(), 0);
}

#[tokio::test]
async fn only_owner_or_admin_may_delete_a_post() {
    let h = Harness::new();
    let alice = h.user("alice").await;
    let bob = h.user("bob").await;
    let admin = h.admin().await;
    let first = h.text_post(&alice, "one").await;
    let second = h.text_post(&alice, "two").await;

    let err = h.state.posts.delete_post(bob.id, first.id).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
    h.state.posts.delete_post(alice.id, first.id).await.unwrap();
    h.state.posts.delete_post(admin.id, second.id).await.unwrap();

    let err = h.state.posts.delete_post(alice.id, first.id).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn comments_notify_the_post_owner_only() {
    let h = Harness::new();
    let alice = h.user("alice").await;
    let bob = h.user("bob").await;
    let post = h.text_post(&alice, "post").await;

    h.state
        .comments
        .create_comment(alice.id, post.id, Some("my own".into()))
        .await
        .unwrap();
    assert!(h.store.list_notifications(alice.id).await.unwrap().is_empty());

    let comment = h
        .state
        .comments
        .create_comment(bob.id, post.id, Some("  nice  ".into()))
        .await
        .unwrap();
    assert_eq!(comment.content, "nice");
    let inbox = h.store.list_notifications(alice.id).await.unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].kind, NotificationKind::Comment);

    let listing = h.state.comments.list_comments(post.id).await.unwrap();
    assert_eq!(listing.count, 2);
    assert_eq!(listing.comments[0].comment.id, comment.id);
    assert_eq!(listing.comments[0].author.as_ref().unwrap().username, "bob");
}

#[tokio::test]
async fn blank_comment_is_rejected() {
    let h = Harness::new();
    let alice = h.user("alice").await;
    let post = h.text_post(&alice, "post").await;
    let err = h
        .state
        .comments
        .create_comment(alice.id, post.id, Some("   ".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert_eq!(h.store.counts().comments, 0);
}

#[tokio::test]
async fn comment_deletion_rules_and_notification_cleanup() {
    let h = Harness::new();
    let alice = h.user("alice").await;
    let bob = h.user("bob").await;
    let carol = h.user("carol").await;
    let post = h.text_post(&alice, "post").await;

    let by_bob = h
        .state
        .comments
        .create_comment(bob.id, post.id, Some("first".into()))
        .await
        .unwrap();
    let by_carol = h
        .state
        .comments
        .create_comment(carol.id, post.id, Some("second".into()))
        .await
        .unwrap();

    let err = h
        .state
        .comments
        .delete_comment(carol.id, by_bob.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    h.state.comments.delete_comment(bob.id, by_bob.id).await.unwrap();
    let inbox = h.store.list_notifications(alice.id).await.unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].from, carol.id);

    h.state.comments.delete_comment(alice.id, by_carol.id).await.unwrap();
    assert!(h.store.list_notifications(alice.id).await.unwrap().is_empty());
    assert_eq!(h.store.count_comments(post.id).await.unwrap(), 0);
}

#[tokio::test]
async fn likes_listing_carries_likers_and_count() {
    let h = Harness::new();
    let alice = h.user("alice").await;
    let bob = h.user("bob").await;
    let carol = h.user("carol").await;
    let post = h.text_post(&alice, "post").await;
    h.state.graph.toggle_like(bob.id, post.id).await.unwrap();
    h.state.graph.toggle_like(carol.id, post.id).await.unwrap();

    let listing = h.state.posts.list_likes(post.id).await.unwrap();
    assert_eq!(listing.count, 2);
    assert_eq!(listing.likes[0].user.as_ref().unwrap().id, carol.id);
    assert_eq!(listing.likes[1].user.as_ref().unwrap().id, bob.id);
}

#[tokio::test]
async fn news_is_admin_only() {
    let h = Harness::new();
    let alice = h.user("alice").await;
    let err = h
        .state
        .news
        .create_news(alice.id, Some("hello".into()), Vec::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
    assert_eq!(h.store.counts().news, 0);
}

#[tokio::test]
async fn news_needs_content_or_files_and_at_most_three_files() {
    let h = Harness::new();
    let admin = h.admin().await;

    let err = h
        .state
        .news
        .create_news(admin.id, Some("  ".into()), Vec::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let files = (0..4)
        .map(|i| h.stage(&format!("f{i}.png"), "image/png", b"x"))
        .collect();
    let err = h
        .state
        .news
        .create_news(admin.id, None, files)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert!(h.media.is_empty());
    assert_eq!(h.staged_files(), 0);
}

#[tokio::test]
async fn news_lifecycle_with_files() {
    let h = Harness::new();
    let admin = h.admin().await;
    let files = vec![
        h.stage("a.png", "image/png", b"a"),
        h.stage("b.pdf", "application/pdf", b"%PDF"),
    ];

    let news = h
        .state
        .news
        .create_news(admin.id, None, files)
        .await
        .unwrap();
    assert_eq!(news.files.len(), 2);
    assert!(news.content.is_none());
    assert_eq!(h.media.len(), 2);
    assert_eq!(h.staged_files(), 0);

    let listed = h.state.news.list_news().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert!(listed[0].author.as_ref().unwrap().is_admin);

    let deletion = h.state.news.delete_news(admin.id, news.id).await.unwrap();
    assert!(deletion.orphaned_media.is_empty());
    assert!(h.media.is_empty());
    assert_eq!(h.store.counts().news, 0);
}

#[tokio::test]
async fn aborted_news_unit_removes_every_uploaded_file() {
    let h = Harness::new();
    let admin = h.admin().await;
    h.store.fail_on(MutationKind::InsertNews);
    let files = vec![
        h.stage("a.png", "image/png", b"a"),
        h.stage("b.png", "image/png", b"b"),
    ];

    let err = h
        .state
        .news
        .create_news(admin.id, Some("update".into()), files)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::CoordinatorAbort { .. }));
    assert!(h.media.is_empty());
    assert_eq!(h.staged_files(), 0);
}

#[tokio::test]
async fn notifications_can_be_deleted_by_their_target_only() {
    let h = Harness::new();
    let alice = h.user("alice").await;
    let bob = h.user("bob").await;
    h.state.graph.toggle_follow(bob.id, alice.id).await.unwrap();
    h.state.graph.toggle_follow(alice.id, bob.id).await.unwrap();

    let alice_inbox = h.state.notifications.list(alice.id).await.unwrap();
    assert_eq!(alice_inbox.len(), 1);
    assert_eq!(alice_inbox[0].sender.as_ref().unwrap().id, bob.id);
    let id = alice_inbox[0].notification.id;

    assert_eq!(h.state.notifications.delete_one(bob.id, id).await.unwrap(), 0);
    assert_eq!(h.state.notifications.delete_one(alice.id, id).await.unwrap(), 1);
    assert_eq!(h.state.notifications.delete_one(alice.id, id).await.unwrap(), 0);
    assert_eq!(h.store.list_notifications(bob.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn clearing_notifications_is_idempotent() {
    let h = Harness::new();
    let alice = h.user("alice").await;
    let bob = h.user("bob").await;
    let carol = h.user("carol").await;
    h.state.graph.toggle_follow(bob.id, alice.id).await.unwrap();
    h.state.graph.toggle_follow(carol.id, alice.id).await.unwrap();

    assert_eq!(h.state.notifications.clear_all(alice.id).await.unwrap(), 2);
    assert_eq!(h.state.notifications.clear_all(alice.id).await.unwrap(), 0);
    assert_eq!(h.state.notifications.clear_all(UserId(999)).await.unwrap(), 0);
}
