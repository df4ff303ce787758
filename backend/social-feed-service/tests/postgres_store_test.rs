//! Store behaviour against a real PostgreSQL database.
//!
//! Run with `TEST_DATABASE_URL=postgres://... cargo test -- --ignored`.

use db_pool::{create_pool, run_migrations, DbConfig};
use social_feed_service::coordinator::Coordinator;
use social_feed_service::domain::{NewPost, NewUser, NotificationKind};
use social_feed_service::error::AppError;
use social_feed_service::services::{LikeToggle, SocialGraphService};
use social_feed_service::store::{EntityStore, Mutation, PgEntityStore, StoreError, UnitOfWork};
use social_feed_service::MIGRATOR;
use std::sync::Arc;
use uuid::Uuid;

async fn store() -> Option<PgEntityStore> {
    let url = std::env::var("TEST_DATABASE_URL").ok()?;
    let config = DbConfig {
        service_name: "social-feed-service-test".into(),
        database_url: url,
        max_connections: 5,
        min_connections: 1,
        ..DbConfig::default()
    };
    let pool = create_pool(config).await.expect("connect to test database");
    run_migrations(&pool, &MIGRATOR).await.expect("migrate");
    Some(PgEntityStore::new(pool))
}

fn coordinator(store: &PgEntityStore) -> Coordinator {
    let mut service = resilience::presets::transaction_config();
    service.retry.max_retries = 8;
    Coordinator::new(Arc::new(store.clone()), service)
}

fn new_user(tag: &str) -> NewUser {
    let unique = Uuid::new_v4().simple().to_string();
    NewUser {
        subject: format!("auth0|{tag}-{unique}"),
        email: format!("{tag}-{unique}@example.com"),
        username: format!("{tag}{}", &unique[..12]),
        first_name: tag.to_string(),
        last_name: "Tester".into(),
        profile_url: None,
        is_admin: false,
    }
}

async fn seed(store: &PgEntityStore) -> (i64, i64, i64) {
    let mut unit = store.begin().await.expect("begin");
    let alice = unit
        .apply(Mutation::InsertUser(new_user("alice")))
        .await
        .expect("insert alice")
        .inserted_id()
        .expect("alice id");
    let bob = unit
        .apply(Mutation::InsertUser(new_user("bob")))
        .await
        .expect("insert bob")
        .inserted_id()
        .expect("bob id");
    let post = unit
        .apply(Mutation::InsertPost(NewPost {
            user_id: alice.into(),
            content: Some("hello from postgres".into()),
            media: None,
        }))
        .await
        .expect("insert post")
        .inserted_id()
        .expect("post id");
    unit.commit().await.expect("commit");
    (alice, bob, post)
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn like_toggle_round_trips_on_postgres() {
    let Some(store) = store().await else { return };
    let (alice, bob, post) = seed(&store).await;
    let graph = SocialGraphService::new(coordinator(&store), true);

    let outcome = graph.toggle_like(bob.into(), post.into()).await.unwrap();
    assert_eq!(outcome, LikeToggle::Liked);
    assert_eq!(store.count_likes(post.into()).await.unwrap(), 1);
    let inbox = store.list_notifications(alice.into()).await.unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].kind, NotificationKind::Like);

    let outcome = graph.toggle_like(bob.into(), post.into()).await.unwrap();
    assert_eq!(outcome, LikeToggle::Unliked);
    assert_eq!(store.count_likes(post.into()).await.unwrap(), 0);
    assert!(store.list_notifications(alice.into()).await.unwrap().is_empty());
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn concurrent_likes_are_serialized_by_postgres() {
    let Some(store) = store().await else { return };
    let (_alice, bob, post) = seed(&store).await;
    let graph = SocialGraphService::new(coordinator(&store), true);

    let mut tasks = Vec::new();
    for _ in 0..6 {
        let graph = graph.clone();
        tasks.push(tokio::spawn(async move {
            graph.toggle_like(bob.into(), post.into()).await
        }));
    }
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) | Err(AppError::Conflict(_)) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert!(store.count_likes(post.into()).await.unwrap() <= 1);
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn rolled_back_unit_leaves_nothing_behind() {
    let Some(store) = store().await else { return };
    let (_alice, bob, post) = seed(&store).await;

    let mut unit = store.begin().await.unwrap();
    unit.apply(Mutation::InsertLike {
        user_id: bob.into(),
        post_id: post.into(),
    })
    .await
    .unwrap();
    unit.rollback().await.unwrap();

    assert_eq!(store.count_likes(post.into()).await.unwrap(), 0);
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn unique_username_is_enforced() {
    let Some(store) = store().await else { return };
    let first = new_user("carol");
    let mut clash = new_user("carol");
    clash.username = first.username.clone();

    let mut unit = store.begin().await.unwrap();
    unit.apply(Mutation::InsertUser(first)).await.unwrap();
    unit.commit().await.unwrap();

    let mut unit = store.begin().await.unwrap();
    let err = unit.apply(Mutation::InsertUser(clash)).await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::UniqueViolation(ref name) if name == "users_username_key"
    ));
    unit.rollback().await.unwrap();
}
