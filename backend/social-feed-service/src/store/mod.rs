//! Entity store abstraction.
//!
//! All multi-entity writes go through a [`UnitOfWork`]: reads inside a unit see a
//! consistent snapshot, every write is a [`Mutation`], and nothing becomes visible
//! to other readers until [`UnitOfWork::commit`] succeeds. Reads that do not take
//! part in a unit are served directly by [`EntityStore`].

pub mod memory;
pub mod postgres;

use crate::domain::{
    Comment, CommentId, Like, MediaRef, NewComment, NewNews, NewNotification, NewPost, NewUser,
    News, NewsId, Notification, NotificationId, NotificationKind, Post, PostId, User, UserId,
    UserSummary,
};
use async_trait::async_trait;
use std::fmt;

pub use memory::MemoryStore;
pub use postgres::PgEntityStore;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Concurrent unit touched the same records; the unit may be re-run.
    #[error("serialization failure: {0}")]
    SerializationFailure(String),

    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("referential integrity violated: {0}")]
    ForeignKeyViolation(String),

    #[error("check constraint violated: {0}")]
    CheckViolation(String),

    #[error("store backend error: {0}")]
    Backend(String),

    /// The store stopped answering during COMMIT; the unit may or may not be durable.
    #[error("commit outcome unknown: {0}")]
    CommitOutcomeUnknown(String),
}

impl StoreError {
    /// Whether re-running the whole unit from the start can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::SerializationFailure(_) | StoreError::ForeignKeyViolation(_)
        )
    }

    /// Reclassify an error raised by `commit`. A lost connection at that point
    /// leaves the outcome undecided rather than aborted.
    pub fn at_commit(self) -> Self {
        match self {
            StoreError::Unavailable(msg) => StoreError::CommitOutcomeUnknown(msg),
            other => other,
        }
    }
}

/// A single write inside a unit of work.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    InsertUser(NewUser),
    UpdateProfile {
        user_id: UserId,
        username: Option<String>,
        picture: Option<MediaRef>,
    },
    AddFollowing { user_id: UserId, target: UserId },
    RemoveFollowing { user_id: UserId, target: UserId },
    AddFollower { user_id: UserId, follower: UserId },
    RemoveFollower { user_id: UserId, follower: UserId },
    InsertPost(NewPost),
    DeletePost(PostId),
    InsertComment(NewComment),
    DeleteComment(CommentId),
    DeleteCommentsByPost(PostId),
    InsertLike { user_id: UserId, post_id: PostId },
    DeleteLike { user_id: UserId, post_id: PostId },
    DeleteLikesByPost(PostId),
    InsertNotification(NewNotification),
    /// Deletes one notification, only when it targets `to`.
    DeleteNotification { id: NotificationId, to: UserId },
    DeleteNotificationsTo(UserId),
    DeleteNotificationsByPost(PostId),
    /// Deletes every notification with exactly these attributes.
    DeleteNotificationsMatching {
        from: UserId,
        to: UserId,
        kind: NotificationKind,
        post_id: Option<PostId>,
    },
    InsertNews(NewNews),
    DeleteNews(NewsId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    InsertUser,
    UpdateProfile,
    AddFollowing,
    RemoveFollowing,
    AddFollower,
    RemoveFollower,
    InsertPost,
    DeletePost,
    InsertComment,
    DeleteComment,
    DeleteCommentsByPost,
    InsertLike,
    DeleteLike,
    DeleteLikesByPost,
    InsertNotification,
    DeleteNotification,
    DeleteNotificationsTo,
    DeleteNotificationsByPost,
    DeleteNotificationsMatching,
    InsertNews,
    DeleteNews,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl Mutation {
    pub fn kind(&self) -> MutationKind {
        match self {
            Mutation::InsertUser(_) => MutationKind::InsertUser,
            Mutation::UpdateProfile { .. } => MutationKind::UpdateProfile,
            Mutation::AddFollowing { .. } => MutationKind::AddFollowing,
            Mutation::RemoveFollowing { .. } => MutationKind::RemoveFollowing,
            Mutation::AddFollower { .. } => MutationKind::AddFollower,
            Mutation::RemoveFollower { .. } => MutationKind::RemoveFollower,
            Mutation::InsertPost(_) => MutationKind::InsertPost,
            Mutation::DeletePost(_) => MutationKind::DeletePost,
            Mutation::InsertComment(_) => MutationKind::InsertComment,
            Mutation::DeleteComment(_) => MutationKind::DeleteComment,
            Mutation::DeleteCommentsByPost(_) => MutationKind::DeleteCommentsByPost,
            Mutation::InsertLike { .. } => MutationKind::InsertLike,
            Mutation::DeleteLike { .. } => MutationKind::DeleteLike,
            Mutation::DeleteLikesByPost(_) => MutationKind::DeleteLikesByPost,
            Mutation::InsertNotification(_) => MutationKind::InsertNotification,
            Mutation::DeleteNotification { .. } => MutationKind::DeleteNotification,
            Mutation::DeleteNotificationsTo(_) => MutationKind::DeleteNotificationsTo,
            Mutation::DeleteNotificationsByPost(_) => MutationKind::DeleteNotificationsByPost,
            Mutation::DeleteNotificationsMatching { .. } => {
                MutationKind::DeleteNotificationsMatching
            }
            Mutation::InsertNews(_) => MutationKind::InsertNews,
            Mutation::DeleteNews(_) => MutationKind::DeleteNews,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    /// Id assigned to the inserted record
    Inserted(i64),
    /// Number of records changed or removed
    Affected(u64),
}

impl MutationOutcome {
    pub fn inserted_id(&self) -> Option<i64> {
        match self {
            MutationOutcome::Inserted(id) => Some(*id),
            MutationOutcome::Affected(_) => None,
        }
    }

    pub fn rows(&self) -> u64 {
        match self {
            MutationOutcome::Inserted(_) => 1,
            MutationOutcome::Affected(rows) => *rows,
        }
    }

    /// Inserted id, or a backend error when the store reported something else.
    pub fn expect_inserted(&self, kind: MutationKind) -> StoreResult<i64> {
        self.inserted_id()
            .ok_or_else(|| StoreError::Backend(format!("{kind} did not report an id")))
    }
}

/// Transactional scope. Dropping a unit without committing discards its writes.
#[async_trait]
pub trait UnitOfWork: Send {
    async fn find_user(&mut self, id: UserId) -> StoreResult<Option<User>>;

    /// Reads a user and holds a write claim on the record until the unit ends.
    async fn lock_user(&mut self, id: UserId) -> StoreResult<Option<User>>;

    async fn find_user_by_subject(&mut self, subject: &str) -> StoreResult<Option<User>>;

    async fn find_user_by_username(&mut self, username: &str) -> StoreResult<Option<User>>;

    async fn find_post(&mut self, id: PostId) -> StoreResult<Option<Post>>;

    async fn find_comment(&mut self, id: CommentId) -> StoreResult<Option<Comment>>;

    async fn find_like(&mut self, user_id: UserId, post_id: PostId) -> StoreResult<Option<Like>>;

    async fn find_news(&mut self, id: NewsId) -> StoreResult<Option<News>>;

    async fn apply(&mut self, mutation: Mutation) -> StoreResult<MutationOutcome>;

    /// Marks a point the unit can return to without aborting. Not nestable.
    async fn savepoint(&mut self) -> StoreResult<()>;

    async fn rollback_to_savepoint(&mut self) -> StoreResult<()>;

    async fn release_savepoint(&mut self) -> StoreResult<()>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;

    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}

#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>>;

    async fn ping(&self) -> StoreResult<()>;

    async fn find_user(&self, id: UserId) -> StoreResult<Option<User>>;

    async fn find_user_by_subject(&self, subject: &str) -> StoreResult<Option<User>>;

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>>;

    /// Summaries for the given ids, in the order given. Unknown ids are skipped.
    async fn find_user_summaries(&self, ids: &[UserId]) -> StoreResult<Vec<UserSummary>>;

    async fn find_post(&self, id: PostId) -> StoreResult<Option<Post>>;

    /// Posts with id strictly below `before` (or all posts), newest first.
    async fn list_posts(&self, before: Option<PostId>, limit: usize) -> StoreResult<Vec<Post>>;

    async fn list_comments(&self, post_id: PostId, limit: usize) -> StoreResult<Vec<Comment>>;

    async fn count_comments(&self, post_id: PostId) -> StoreResult<u64>;

    async fn list_likes(&self, post_id: PostId, limit: usize) -> StoreResult<Vec<Like>>;

    async fn count_likes(&self, post_id: PostId) -> StoreResult<u64>;

    async fn list_notifications(&self, to: UserId) -> StoreResult<Vec<Notification>>;

    async fn list_news(&self) -> StoreResult<Vec<News>>;

    async fn find_news(&self, id: NewsId) -> StoreResult<Option<News>>;
}
