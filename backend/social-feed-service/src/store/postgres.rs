//! PostgreSQL entity store.
//!
//! Units run as REPEATABLE READ transactions. `lock_user` takes a row lock with
//! `SELECT ... FOR UPDATE`. Referential integrity is enforced by RESTRICT foreign
//! keys, so deleting a post while children remain fails instead of orphaning them.

use super::{
    EntityStore, Mutation, MutationKind, MutationOutcome, StoreError, StoreResult, UnitOfWork,
};
use crate::domain::{
    Comment, CommentId, Like, LikeId, MediaRef, News, NewsId, Notification, NotificationId,
    NotificationKind, Post, PostId, User, UserId, UserSummary,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{FromRow, PgConnection, PgPool, Postgres, Row, Transaction};
use tracing::debug;

const SAVEPOINT: &str = "best_effort";

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) => {
                let constraint = db.constraint().unwrap_or("unknown").to_string();
                match db.code().as_deref() {
                    Some("40001") | Some("40P01") => {
                        StoreError::SerializationFailure(db.message().to_string())
                    }
                    Some("23505") => StoreError::UniqueViolation(constraint),
                    Some("23503") => StoreError::ForeignKeyViolation(constraint),
                    Some("23514") => StoreError::CheckViolation(constraint),
                    _ => StoreError::Backend(err.to_string()),
                }
            }
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_) => StoreError::Unavailable(err.to_string()),
            _ => StoreError::Backend(err.to_string()),
        }
    }
}

macro_rules! user_columns {
    () => {
        "id, subject, email, username, first_name, last_name, profile_url, profile_media_id, \
         is_admin, following, followers, created_at, updated_at"
    };
}

macro_rules! post_columns {
    () => {
        "id, user_id, content, media_id, media_url, created_at"
    };
}

#[derive(Debug, FromRow)]
struct UserRow {
    id: i64,
    subject: String,
    email: String,
    username: String,
    first_name: String,
    last_name: String,
    profile_url: Option<String>,
    profile_media_id: Option<String>,
    is_admin: bool,
    following: Vec<i64>,
    followers: Vec<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: UserId(row.id),
            subject: row.subject,
            email: row.email,
            username: row.username,
            first_name: row.first_name,
            last_name: row.last_name,
            profile_url: row.profile_url,
            profile_media_id: row.profile_media_id,
            is_admin: row.is_admin,
            following: row.following.into_iter().map(UserId).collect(),
            followers: row.followers.into_iter().map(UserId).collect(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct PostRow {
    id: i64,
    user_id: i64,
    content: Option<String>,
    media_id: Option<String>,
    media_url: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<PostRow> for Post {
    fn from(row: PostRow) -> Self {
        let media = match (row.media_id, row.media_url) {
            (Some(id), Some(url)) => Some(MediaRef { id, url }),
            _ => None,
        };
        Post {
            id: PostId(row.id),
            user_id: UserId(row.user_id),
            content: row.content,
            media,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct CommentRow {
    id: i64,
    user_id: i64,
    post_id: i64,
    content: String,
    created_at: DateTime<Utc>,
}

impl From<CommentRow> for Comment {
    fn from(row: CommentRow) -> Self {
        Comment {
            id: CommentId(row.id),
            user_id: UserId(row.user_id),
            post_id: PostId(row.post_id),
            content: row.content,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct LikeRow {
    id: i64,
    user_id: i64,
    post_id: i64,
    created_at: DateTime<Utc>,
}

impl From<LikeRow> for Like {
    fn from(row: LikeRow) -> Self {
        Like {
            id: LikeId(row.id),
            user_id: UserId(row.user_id),
            post_id: PostId(row.post_id),
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct NotificationRow {
    id: i64,
    from_user: i64,
    to_user: i64,
    kind: String,
    post_id: Option<i64>,
    created_at: DateTime<Utc>,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = StoreError;

    fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
        let kind = row
            .kind
            .parse::<NotificationKind>()
            .map_err(StoreError::Backend)?;
        Ok(Notification {
            id: NotificationId(row.id),
            from: UserId(row.from_user),
            to: UserId(row.to_user),
            kind,
            post_id: row.post_id.map(PostId),
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct NewsRow {
    id: i64,
    user_id: i64,
    content: Option<String>,
    files: Json<Vec<MediaRef>>,
    created_at: DateTime<Utc>,
}

impl From<NewsRow> for News {
    fn from(row: NewsRow) -> Self {
        News {
            id: NewsId(row.id),
            user_id: UserId(row.user_id),
            content: row.content,
            files: row.files.0,
            created_at: row.created_at,
        }
    }
}

fn returned_id(row: PgRow) -> StoreResult<MutationOutcome> {
    let id: i64 = row.try_get("id")?;
    Ok(MutationOutcome::Inserted(id))
}

fn ids(users: &[UserId]) -> Vec<i64> {
    users.iter().map(|id| id.0).collect()
}

async fn fetch_user_by_id(conn: &mut PgConnection, id: UserId) -> StoreResult<Option<User>> {
    let row = sqlx::query_as::<_, UserRow>(concat!(
        "SELECT ",
        user_columns!(),
        " FROM users WHERE id = $1"
    ))
    .bind(id.0)
    .fetch_optional(conn)
    .await?;
    Ok(row.map(User::from))
}

async fn fetch_user_by_subject(conn: &mut PgConnection, subject: &str) -> StoreResult<Option<User>> {
    let row = sqlx::query_as::<_, UserRow>(concat!(
        "SELECT ",
        user_columns!(),
        " FROM users WHERE subject = $1"
    ))
    .bind(subject)
    .fetch_optional(conn)
    .await?;
    Ok(row.map(User::from))
}

async fn fetch_user_by_username(
    conn: &mut PgConnection,
    username: &str,
) -> StoreResult<Option<User>> {
    let row = sqlx::query_as::<_, UserRow>(concat!(
        "SELECT ",
        user_columns!(),
        " FROM users WHERE username = $1"
    ))
    .bind(username)
    .fetch_optional(conn)
    .await?;
    Ok(row.map(User::from))
}

async fn fetch_post(conn: &mut PgConnection, id: PostId) -> StoreResult<Option<Post>> {
    let row = sqlx::query_as::<_, PostRow>(concat!(
        "SELECT ",
        post_columns!(),
        " FROM posts WHERE id = $1"
    ))
    .bind(id.0)
    .fetch_optional(conn)
    .await?;
    Ok(row.map(Post::from))
}

async fn fetch_news(conn: &mut PgConnection, id: NewsId) -> StoreResult<Option<News>> {
    let row = sqlx::query_as::<_, NewsRow>(
        "SELECT id, user_id, content, files, created_at FROM news WHERE id = $1",
    )
    .bind(id.0)
    .fetch_optional(conn)
    .await?;
    Ok(row.map(News::from))
}

/// Store backed by a PostgreSQL connection pool.
#[derive(Clone)]
pub struct PgEntityStore {
    pool: PgPool,
}

impl PgEntityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

impl PgUnitOfWork {
    async fn execute(&mut self, mutation: Mutation) -> StoreResult<MutationOutcome> {
        let conn: &mut PgConnection = &mut self.tx;
        match mutation {
            Mutation::InsertUser(new) => {
                let row = sqlx::query(
                    r#"
                    INSERT INTO users (subject, email, username, first_name, last_name, profile_url, is_admin)
                    VALUES ($1, $2, $3, $4, $5, $6, $7)
                    RETURNING id
                    "#,
                )
                .bind(&new.subject)
                .bind(&new.email)
                .bind(&new.username)
                .bind(&new.first_name)
                .bind(&new.last_name)
                .bind(&new.profile_url)
                .bind(new.is_admin)
                .fetch_one(conn)
                .await?;
                returned_id(row)
            }
            Mutation::UpdateProfile {
                user_id,
                username,
                picture,
            } => {
                let (media_id, media_url) = match picture {
                    Some(picture) => (Some(picture.id), Some(picture.url)),
                    None => (None, None),
                };
                let result = sqlx::query(
                    r#"
                    UPDATE users
                    SET username = COALESCE($2, username),
                        profile_media_id = COALESCE($3, profile_media_id),
                        profile_url = COALESCE($4, profile_url),
                        updated_at = NOW()
                    WHERE id = $1
                    "#,
                )
                .bind(user_id.0)
                .bind(username)
                .bind(media_id)
                .bind(media_url)
                .execute(conn)
                .await?;
                Ok(MutationOutcome::Affected(result.rows_affected()))
            }
            Mutation::AddFollowing { user_id, target } => {
                let result = sqlx::query(
                    r#"
                    UPDATE users SET following = array_append(following, $2), updated_at = NOW()
                    WHERE id = $1 AND NOT ($2 = ANY(following))
                    "#,
                )
                .bind(user_id.0)
                .bind(target.0)
                .execute(conn)
                .await?;
                Ok(MutationOutcome::Affected(result.rows_affected()))
            }
            Mutation::RemoveFollowing { user_id, target } => {
                let result = sqlx::query(
                    r#"
                    UPDATE users SET following = array_remove(following, $2), updated_at = NOW()
                    WHERE id = $1 AND $2 = ANY(following)
                    "#,
                )
                .bind(user_id.0)
                .bind(target.0)
                .execute(conn)
                .await?;
                Ok(MutationOutcome::Affected(result.rows_affected()))
            }
            Mutation::AddFollower { user_id, follower } => {
                let result = sqlx::query(
                    r#"
                    UPDATE users SET followers = array_append(followers, $2), updated_at = NOW()
                    WHERE id = $1 AND NOT ($2 = ANY(followers))
                    "#,
                )
                .bind(user_id.0)
                .bind(follower.0)
                .execute(conn)
                .await?;
                Ok(MutationOutcome::Affected(result.rows_affected()))
            }
            Mutation::RemoveFollower { user_id, follower } => {
                let result = sqlx::query(
                    r#"
                    UPDATE users SET followers = array_remove(followers, $2), updated_at = NOW()
                    WHERE id = $1 AND $2 = ANY(followers)
                    "#,
                )
                .bind(user_id.0)
                .bind(follower.0)
                .execute(conn)
                .await?;
                Ok(MutationOutcome::Affected(result.rows_affected()))
            }
            Mutation::InsertPost(new) => {
                let (media_id, media_url) = match new.media {
                    Some(media) => (Some(media.id), Some(media.url)),
                    None => (None, None),
                };
                let row = sqlx::query(
                    r#"
                    INSERT INTO posts (user_id, content, media_id, media_url)
                    VALUES ($1, $2, $3, $4)
                    RETURNING id
                    "#,
                )
                .bind(new.user_id.0)
                .bind(new.content)
                .bind(media_id)
                .bind(media_url)
                .fetch_one(conn)
                .await?;
                returned_id(row)
            }
            Mutation::DeletePost(id) => {
                let result = sqlx::query("DELETE FROM posts WHERE id = $1")
                    .bind(id.0)
                    .execute(conn)
                    .await?;
                Ok(MutationOutcome::Affected(result.rows_affected()))
            }
            Mutation::InsertComment(new) => {
                let row = sqlx::query(
                    r#"
                    INSERT INTO comments (user_id, post_id, content)
                    VALUES ($1, $2, $3)
                    RETURNING id
                    "#,
                )
                .bind(new.user_id.0)
                .bind(new.post_id.0)
                .bind(&new.content)
                .fetch_one(conn)
                .await?;
                returned_id(row)
            }
            Mutation::DeleteComment(id) => {
                let result = sqlx::query("DELETE FROM comments WHERE id = $1")
                    .bind(id.0)
                    .execute(conn)
                    .await?;
                Ok(MutationOutcome::Affected(result.rows_affected()))
            }
            Mutation::DeleteCommentsByPost(post_id) => {
                let result = sqlx::query("DELETE FROM comments WHERE post_id = $1")
                    .bind(post_id.0)
                    .execute(conn)
                    .await?;
                Ok(MutationOutcome::Affected(result.rows_affected()))
            }
            Mutation::InsertLike { user_id, post_id } => {
                let row = sqlx::query(
                    "INSERT INTO likes (user_id, post_id) VALUES ($1, $2) RETURNING id",
                )
                .bind(user_id.0)
                .bind(post_id.0)
                .fetch_one(conn)
                .await?;
                returned_id(row)
            }
            Mutation::DeleteLike { user_id, post_id } => {
                let result = sqlx::query("DELETE FROM likes WHERE user_id = $1 AND post_id = $2")
                    .bind(user_id.0)
                    .bind(post_id.0)
                    .execute(conn)
                    .await?;
                Ok(MutationOutcome::Affected(result.rows_affected()))
            }
            Mutation::DeleteLikesByPost(post_id) => {
                let result = sqlx::query("DELETE FROM likes WHERE post_id = $1")
                    .bind(post_id.0)
                    .execute(conn)
                    .await?;
                Ok(MutationOutcome::Affected(result.rows_affected()))
            }
            Mutation::InsertNotification(new) => {
                let row = sqlx::query(
                    r#"
                    INSERT INTO notifications (from_user, to_user, kind, post_id)
                    VALUES ($1, $2, $3, $4)
                    RETURNING id
                    "#,
                )
                .bind(new.from.0)
                .bind(new.to.0)
                .bind(new.kind.as_str())
                .bind(new.post_id.map(|p| p.0))
                .fetch_one(conn)
                .await?;
                returned_id(row)
            }
            Mutation::DeleteNotification { id, to } => {
                let result =
                    sqlx::query("DELETE FROM notifications WHERE id = $1 AND to_user = $2")
                        .bind(id.0)
                        .bind(to.0)
                        .execute(conn)
                        .await?;
                Ok(MutationOutcome::Affected(result.rows_affected()))
            }
            Mutation::DeleteNotificationsTo(to) => {
                let result = sqlx::query("DELETE FROM notifications WHERE to_user = $1")
                    .bind(to.0)
                    .execute(conn)
                    .await?;
                Ok(MutationOutcome::Affected(result.rows_affected()))
            }
            Mutation::DeleteNotificationsByPost(post_id) => {
                let result = sqlx::query("DELETE FROM notifications WHERE post_id = $1")
                    .bind(post_id.0)
                    .execute(conn)
                    .await?;
                Ok(MutationOutcome::Affected(result.rows_affected()))
            }
            Mutation::DeleteNotificationsMatching {
                from,
                to,
                kind,
                post_id,
            } => {
                let result = sqlx::query(
                    r#"
                    DELETE FROM notifications
                    WHERE from_user = $1 AND to_user = $2 AND kind = $3
                      AND post_id IS NOT DISTINCT FROM $4
                    "#,
                )
                .bind(from.0)
                .bind(to.0)
                .bind(kind.as_str())
                .bind(post_id.map(|p| p.0))
                .execute(conn)
                .await?;
                Ok(MutationOutcome::Affected(result.rows_affected()))
            }
            Mutation::InsertNews(new) => {
                let row = sqlx::query(
                    "INSERT INTO news (user_id, content, files) VALUES ($1, $2, $3) RETURNING id",
                )
                .bind(new.user_id.0)
                .bind(&new.content)
                .bind(Json(&new.files))
                .fetch_one(conn)
                .await?;
                returned_id(row)
            }
            Mutation::DeleteNews(id) => {
                let result = sqlx::query("DELETE FROM news WHERE id = $1")
                    .bind(id.0)
                    .execute(conn)
                    .await?;
                Ok(MutationOutcome::Affected(result.rows_affected()))
            }
        }
    }
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn find_user(&mut self, id: UserId) -> StoreResult<Option<User>> {
        fetch_user_by_id(&mut self.tx, id).await
    }

    async fn lock_user(&mut self, id: UserId) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(concat!(
            "SELECT ",
            user_columns!(),
            " FROM users WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.0)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(User::from))
    }

    async fn find_user_by_subject(&mut self, subject: &str) -> StoreResult<Option<User>> {
        fetch_user_by_subject(&mut self.tx, subject).await
    }

    async fn find_user_by_username(&mut self, username: &str) -> StoreResult<Option<User>> {
        fetch_user_by_username(&mut self.tx, username).await
    }

    async fn find_post(&mut self, id: PostId) -> StoreResult<Option<Post>> {
        fetch_post(&mut self.tx, id).await
    }

    async fn find_comment(&mut self, id: CommentId) -> StoreResult<Option<Comment>> {
        let row = sqlx::query_as::<_, CommentRow>(
            "SELECT id, user_id, post_id, content, created_at FROM comments WHERE id = $1",
        )
        .bind(id.0)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(Comment::from))
    }

    async fn find_like(&mut self, user_id: UserId, post_id: PostId) -> StoreResult<Option<Like>> {
        let row = sqlx::query_as::<_, LikeRow>(
            "SELECT id, user_id, post_id, created_at FROM likes WHERE user_id = $1 AND post_id = $2",
        )
        .bind(user_id.0)
        .bind(post_id.0)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(Like::from))
    }

    async fn find_news(&mut self, id: NewsId) -> StoreResult<Option<News>> {
        fetch_news(&mut self.tx, id).await
    }

    async fn apply(&mut self, mutation: Mutation) -> StoreResult<MutationOutcome> {
        let kind: MutationKind = mutation.kind();
        let outcome = self.execute(mutation).await?;
        debug!(%kind, rows = outcome.rows(), "mutation applied");
        Ok(outcome)
    }

    async fn savepoint(&mut self) -> StoreResult<()> {
        sqlx::query(&format!("SAVEPOINT {SAVEPOINT}"))
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn rollback_to_savepoint(&mut self) -> StoreResult<()> {
        sqlx::query(&format!("ROLLBACK TO SAVEPOINT {SAVEPOINT}"))
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn release_savepoint(&mut self) -> StoreResult<()> {
        sqlx::query(&format!("RELEASE SAVEPOINT {SAVEPOINT}"))
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[async_trait]
impl EntityStore for PgEntityStore {
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
            .execute(&mut *tx)
            .await?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn find_user(&self, id: UserId) -> StoreResult<Option<User>> {
        let mut conn = self.pool.acquire().await?;
        fetch_user_by_id(&mut conn, id).await
    }

    async fn find_user_by_subject(&self, subject: &str) -> StoreResult<Option<User>> {
        let mut conn = self.pool.acquire().await?;
        fetch_user_by_subject(&mut conn, subject).await
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let mut conn = self.pool.acquire().await?;
        fetch_user_by_username(&mut conn, username).await
    }

    async fn find_user_summaries(&self, users: &[UserId]) -> StoreResult<Vec<UserSummary>> {
        if users.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, UserRow>(concat!(
            "SELECT ",
            user_columns!(),
            " FROM users WHERE id = ANY($1)"
        ))
        .bind(ids(users))
        .fetch_all(&self.pool)
        .await?;
        let found: Vec<User> = rows.into_iter().map(User::from).collect();
        Ok(users
            .iter()
            .filter_map(|id| found.iter().find(|u| u.id == *id).map(User::summary))
            .collect())
    }

    async fn find_post(&self, id: PostId) -> StoreResult<Option<Post>> {
        let mut conn = self.pool.acquire().await?;
        fetch_post(&mut conn, id).await
    }

    async fn list_posts(&self, before: Option<PostId>, limit: usize) -> StoreResult<Vec<Post>> {
        let rows = sqlx::query_as::<_, PostRow>(concat!(
            "SELECT ",
            post_columns!(),
            " FROM posts WHERE ($1::BIGINT IS NULL OR id < $1) ORDER BY id DESC LIMIT $2"
        ))
        .bind(before.map(|p| p.0))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Post::from).collect())
    }

    async fn list_comments(&self, post_id: PostId, limit: usize) -> StoreResult<Vec<Comment>> {
        let rows = sqlx::query_as::<_, CommentRow>(
            r#"
            SELECT id, user_id, post_id, content, created_at
            FROM comments
            WHERE post_id = $1
            ORDER BY id DESC
            LIMIT $2
            "#,
        )
        .bind(post_id.0)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Comment::from).collect())
    }

    async fn count_comments(&self, post_id: PostId) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM comments WHERE post_id = $1")
            .bind(post_id.0)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn list_likes(&self, post_id: PostId, limit: usize) -> StoreResult<Vec<Like>> {
        let rows = sqlx::query_as::<_, LikeRow>(
            r#"
            SELECT id, user_id, post_id, created_at
            FROM likes
            WHERE post_id = $1
            ORDER BY id DESC
            LIMIT $2
            "#,
        )
        .bind(post_id.0)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Like::from).collect())
    }

    async fn count_likes(&self, post_id: PostId) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM likes WHERE post_id = $1")
            .bind(post_id.0)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn list_notifications(&self, to: UserId) -> StoreResult<Vec<Notification>> {
        let rows = sqlx::query_as::<_, NotificationRow>(
            r#"
            SELECT id, from_user, to_user, kind, post_id, created_at
            FROM notifications
            WHERE to_user = $1
            ORDER BY id DESC
            "#,
        )
        .bind(to.0)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Notification::try_from).collect()
    }

    async fn list_news(&self) -> StoreResult<Vec<News>> {
        let rows = sqlx::query_as::<_, NewsRow>(
            "SELECT id, user_id, content, files, created_at FROM news ORDER BY id DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(News::from).collect())
    }

    async fn find_news(&self, id: NewsId) -> StoreResult<Option<News>> {
        let mut conn = self.pool.acquire().await?;
        fetch_news(&mut conn, id).await
    }
}
