//! In-process entity store.
//!
//! Each unit works on a private copy of the tables and records the version of
//! every record it reads or writes. Commit validates those versions under the
//! write lock and replays the unit's mutations onto a fresh copy, which then
//! replaces the shared tables in one step. A unit therefore either becomes
//! visible completely or not at all.
//!
//! The store also enforces the relational rules of the SQL schema (unique keys,
//! foreign keys with RESTRICT, check constraints) and supports fault injection
//! for exercising abort paths.
//!
//! Every `begin` copies all tables, so a unit costs time proportional to the
//! whole store. Use it for tests and local development only; deployments run
//! on [`PgEntityStore`](super::PgEntityStore).

use super::{
    EntityStore, Mutation, MutationKind, MutationOutcome, StoreError, StoreResult, UnitOfWork,
};
use crate::domain::{
    Comment, CommentId, Like, LikeId, News, NewsId, Notification, NotificationId, Post, PostId,
    User, UserId, UserSummary,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum RecordKey {
    User(UserId),
    Post(PostId),
    Comment(CommentId),
    Like(UserId, PostId),
    Notification(NotificationId),
    News(NewsId),
}

#[derive(Debug, Clone, Copy)]
struct Stamp {
    id: i64,
    at: DateTime<Utc>,
}

struct Applied {
    outcome: MutationOutcome,
    touched: Vec<RecordKey>,
}

impl Applied {
    fn inserted(id: i64, key: RecordKey) -> Self {
        Self {
            outcome: MutationOutcome::Inserted(id),
            touched: vec![key],
        }
    }

    fn affected(touched: Vec<RecordKey>) -> Self {
        Self {
            outcome: MutationOutcome::Affected(touched.len() as u64),
            touched,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum LinkSide {
    Following,
    Followers,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    users: BTreeMap<UserId, User>,
    posts: BTreeMap<PostId, Post>,
    comments: BTreeMap<CommentId, Comment>,
    likes: BTreeMap<(UserId, PostId), Like>,
    notifications: BTreeMap<NotificationId, Notification>,
    news: BTreeMap<NewsId, News>,
    versions: HashMap<RecordKey, u64>,
    clock: u64,
}

impl Tables {
    fn version(&self, key: RecordKey) -> u64 {
        self.versions.get(&key).copied().unwrap_or(0)
    }

    fn require_user(&self, id: UserId, constraint: &str) -> StoreResult<()> {
        if self.users.contains_key(&id) {
            Ok(())
        } else {
            Err(StoreError::ForeignKeyViolation(constraint.to_string()))
        }
    }

    fn require_post(&self, id: PostId, constraint: &str) -> StoreResult<()> {
        if self.posts.contains_key(&id) {
            Ok(())
        } else {
            Err(StoreError::ForeignKeyViolation(constraint.to_string()))
        }
    }

    fn username_taken(&self, username: &str, except: Option<UserId>) -> bool {
        self.users
            .values()
            .any(|u| u.username == username && Some(u.id) != except)
    }

    fn apply(&mut self, mutation: &Mutation, stamp: Stamp) -> StoreResult<Applied> {
        match mutation {
            Mutation::InsertUser(new) => {
                if self.users.values().any(|u| u.subject == new.subject) {
                    return Err(StoreError::UniqueViolation("users_subject_key".into()));
                }
                if self.username_taken(&new.username, None) {
                    return Err(StoreError::UniqueViolation("users_username_key".into()));
                }
                let id = UserId(stamp.id);
                self.users.insert(
                    id,
                    User {
                        id,
                        subject: new.subject.clone(),
                        email: new.email.clone(),
                        username: new.username.clone(),
                        first_name: new.first_name.clone(),
                        last_name: new.last_name.clone(),
                        profile_url: new.profile_url.clone(),
                        profile_media_id: None,
                        is_admin: new.is_admin,
                        following: Vec::new(),
                        followers: Vec::new(),
                        created_at: stamp.at,
                        updated_at: stamp.at,
                    },
                );
                Ok(Applied::inserted(stamp.id, RecordKey::User(id)))
            }
            Mutation::UpdateProfile {
                user_id,
                username,
                picture,
            } => {
                if let Some(name) = username {
                    if self.username_taken(name, Some(*user_id)) {
                        return Err(StoreError::UniqueViolation("users_username_key".into()));
                    }
                }
                let Some(user) = self.users.get_mut(user_id) else {
                    return Ok(Applied::affected(Vec::new()));
                };
                if let Some(name) = username {
                    user.username = name.clone();
                }
                if let Some(picture) = picture {
                    user.profile_url = Some(picture.url.clone());
                    user.profile_media_id = Some(picture.id.clone());
                }
                user.updated_at = stamp.at;
                Ok(Applied::affected(vec![RecordKey::User(*user_id)]))
            }
            Mutation::AddFollowing { user_id, target } => {
                self.link(*user_id, *target, LinkSide::Following, true, stamp.at)
            }
            Mutation::RemoveFollowing { user_id, target } => {
                self.link(*user_id, *target, LinkSide::Following, false, stamp.at)
            }
            Mutation::AddFollower { user_id, follower } => {
                self.link(*user_id, *follower, LinkSide::Followers, true, stamp.at)
            }
            Mutation::RemoveFollower { user_id, follower } => {
                self.link(*user_id, *follower, LinkSide::Followers, false, stamp.at)
            }
            Mutation::InsertPost(new) => {
                self.require_user(new.user_id, "posts_user_id_fkey")?;
                if new.content.is_none() && new.media.is_none() {
                    return Err(StoreError::CheckViolation("posts_has_body".into()));
                }
                let id = PostId(stamp.id);
                self.posts.insert(
                    id,
                    Post {
                        id,
                        user_id: new.user_id,
                        content: new.content.clone(),
                        media: new.media.clone(),
                        created_at: stamp.at,
                    },
                );
                Ok(Applied::inserted(stamp.id, RecordKey::Post(id)))
            }
            Mutation::DeletePost(id) => {
                if self.comments.values().any(|c| c.post_id == *id) {
                    return Err(StoreError::ForeignKeyViolation(
                        "comments_post_id_fkey".into(),
                    ));
                }
                if self.likes.values().any(|l| l.post_id == *id) {
                    return Err(StoreError::ForeignKeyViolation("likes_post_id_fkey".into()));
                }
                if self.notifications.values().any(|n| n.post_id == Some(*id)) {
                    return Err(StoreError::ForeignKeyViolation(
                        "notifications_post_id_fkey".into(),
                    ));
                }
                let removed = self.posts.remove(id).map(|_| RecordKey::Post(*id));
                Ok(Applied::affected(removed.into_iter().collect()))
            }
            Mutation::InsertComment(new) => {
                self.require_user(new.user_id, "comments_user_id_fkey")?;
                self.require_post(new.post_id, "comments_post_id_fkey")?;
                if new.content.trim().is_empty() {
                    return Err(StoreError::CheckViolation("comments_content_check".into()));
                }
                let id = CommentId(stamp.id);
                self.comments.insert(
                    id,
                    Comment {
                        id,
                        user_id: new.user_id,
                        post_id: new.post_id,
                        content: new.content.clone(),
                        created_at: stamp.at,
                    },
                );
                Ok(Applied::inserted(stamp.id, RecordKey::Comment(id)))
            }
            Mutation::DeleteComment(id) => {
                let removed = self.comments.remove(id).map(|_| RecordKey::Comment(*id));
                Ok(Applied::affected(removed.into_iter().collect()))
            }
            Mutation::DeleteCommentsByPost(post_id) => {
                let ids: Vec<CommentId> = self
                    .comments
                    .values()
                    .filter(|c| c.post_id == *post_id)
                    .map(|c| c.id)
                    .collect();
                for id in &ids {
                    self.comments.remove(id);
                }
                Ok(Applied::affected(
                    ids.into_iter().map(RecordKey::Comment).collect(),
                ))
            }
            Mutation::InsertLike { user_id, post_id } => {
                self.require_user(*user_id, "likes_user_id_fkey")?;
                self.require_post(*post_id, "likes_post_id_fkey")?;
                if self.likes.contains_key(&(*user_id, *post_id)) {
                    return Err(StoreError::UniqueViolation(
                        "likes_user_post_key".into(),
                    ));
                }
                self.likes.insert(
                    (*user_id, *post_id),
                    Like {
                        id: LikeId(stamp.id),
                        user_id: *user_id,
                        post_id: *post_id,
                        created_at: stamp.at,
                    },
                );
                Ok(Applied::inserted(
                    stamp.id,
                    RecordKey::Like(*user_id, *post_id),
                ))
            }
            Mutation::DeleteLike { user_id, post_id } => {
                let removed = self
                    .likes
                    .remove(&(*user_id, *post_id))
                    .map(|_| RecordKey::Like(*user_id, *post_id));
                Ok(Applied::affected(removed.into_iter().collect()))
            }
            Mutation::DeleteLikesByPost(post_id) => {
                let keys: Vec<(UserId, PostId)> = self
                    .likes
                    .keys()
                    .filter(|(_, post)| post == post_id)
                    .copied()
                    .collect();
                for key in &keys {
                    self.likes.remove(key);
                }
                Ok(Applied::affected(
                    keys.into_iter()
                        .map(|(user, post)| RecordKey::Like(user, post))
                        .collect(),
                ))
            }
            Mutation::InsertNotification(new) => {
                self.require_user(new.from, "notifications_from_user_fkey")?;
                self.require_user(new.to, "notifications_to_user_fkey")?;
                if let Some(post_id) = new.post_id {
                    self.require_post(post_id, "notifications_post_id_fkey")?;
                }
                let id = NotificationId(stamp.id);
                self.notifications.insert(
                    id,
                    Notification {
                        id,
                        from: new.from,
                        to: new.to,
                        kind: new.kind,
                        post_id: new.post_id,
                        created_at: stamp.at,
                    },
                );
                Ok(Applied::inserted(stamp.id, RecordKey::Notification(id)))
            }
            Mutation::DeleteNotification { id, to } => {
                Ok(self.remove_notifications(|n| n.id == *id && n.to == *to))
            }
            Mutation::DeleteNotificationsTo(to) => {
                Ok(self.remove_notifications(|n| n.to == *to))
            }
            Mutation::DeleteNotificationsByPost(post_id) => {
                Ok(self.remove_notifications(|n| n.post_id == Some(*post_id)))
            }
            Mutation::DeleteNotificationsMatching {
                from,
                to,
                kind,
                post_id,
            } => Ok(self.remove_notifications(|n| {
                n.from == *from && n.to == *to && n.kind == *kind && n.post_id == *post_id
            })),
            Mutation::InsertNews(new) => {
                self.require_user(new.user_id, "news_user_id_fkey")?;
                if new.content.is_none() && new.files.is_empty() {
                    return Err(StoreError::CheckViolation("news_has_body".into()));
                }
                let id = NewsId(stamp.id);
                self.news.insert(
                    id,
                    News {
                        id,
                        user_id: new.user_id,
                        content: new.content.clone(),
                        files: new.files.clone(),
                        created_at: stamp.at,
                    },
                );
                Ok(Applied::inserted(stamp.id, RecordKey::News(id)))
            }
            Mutation::DeleteNews(id) => {
                let removed = self.news.remove(id).map(|_| RecordKey::News(*id));
                Ok(Applied::affected(removed.into_iter().collect()))
            }
        }
    }

    fn link(
        &mut self,
        user_id: UserId,
        other: UserId,
        side: LinkSide,
        add: bool,
        at: DateTime<Utc>,
    ) -> StoreResult<Applied> {
        if add && user_id == other {
            return Err(StoreError::CheckViolation("users_no_self_follow".into()));
        }
        let Some(user) = self.users.get_mut(&user_id) else {
            return Ok(Applied::affected(Vec::new()));
        };
        let list = match side {
            LinkSide::Following => &mut user.following,
            LinkSide::Followers => &mut user.followers,
        };
        let changed = if add {
            if list.contains(&other) {
                false
            } else {
                list.push(other);
                true
            }
        } else {
            let before = list.len();
            list.retain(|id| *id != other);
            list.len() != before
        };
        if !changed {
            return Ok(Applied::affected(Vec::new()));
        }
        user.updated_at = at;
        Ok(Applied::affected(vec![RecordKey::User(user_id)]))
    }

    fn remove_notifications<P>(&mut self, predicate: P) -> Applied
    where
        P: Fn(&Notification) -> bool,
    {
        let ids: Vec<NotificationId> = self
            .notifications
            .values()
            .filter(|n| predicate(n))
            .map(|n| n.id)
            .collect();
        for id in &ids {
            self.notifications.remove(id);
        }
        Applied::affected(ids.into_iter().map(RecordKey::Notification).collect())
    }

    fn integrity_violations(&self) -> Vec<String> {
        let mut problems = Vec::new();
        for comment in self.comments.values() {
            if !self.posts.contains_key(&comment.post_id) {
                problems.push(format!("comment {} references missing post", comment.id));
            }
            if !self.users.contains_key(&comment.user_id) {
                problems.push(format!("comment {} references missing user", comment.id));
            }
        }
        for like in self.likes.values() {
            if !self.posts.contains_key(&like.post_id) {
                problems.push(format!("like {} references missing post", like.id));
            }
        }
        for notification in self.notifications.values() {
            if let Some(post_id) = notification.post_id {
                if !self.posts.contains_key(&post_id) {
                    problems.push(format!(
                        "notification {} references missing post",
                        notification.id
                    ));
                }
            }
        }
        for user in self.users.values() {
            for target in &user.following {
                let mirrored = self
                    .users
                    .get(target)
                    .map(|t| t.followers.contains(&user.id))
                    .unwrap_or(false);
                if !mirrored {
                    problems.push(format!(
                        "user {} follows {} without a mirrored follower entry",
                        user.id, target
                    ));
                }
            }
            for follower in &user.followers {
                let mirrored = self
                    .users
                    .get(follower)
                    .map(|f| f.following.contains(&user.id))
                    .unwrap_or(false);
                if !mirrored {
                    problems.push(format!(
                        "user {} lists follower {} without a mirrored following entry",
                        user.id, follower
                    ));
                }
            }
        }
        problems
    }
}

#[derive(Debug, Default)]
struct Sequences {
    users: AtomicI64,
    posts: AtomicI64,
    comments: AtomicI64,
    likes: AtomicI64,
    notifications: AtomicI64,
    news: AtomicI64,
}

impl Sequences {
    /// Next id for record-creating mutations, 0 for everything else.
    fn next(&self, kind: MutationKind) -> i64 {
        let sequence = match kind {
            MutationKind::InsertUser => &self.users,
            MutationKind::InsertPost => &self.posts,
            MutationKind::InsertComment => &self.comments,
            MutationKind::InsertLike => &self.likes,
            MutationKind::InsertNotification => &self.notifications,
            MutationKind::InsertNews => &self.news,
            _ => return 0,
        };
        sequence.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[derive(Debug, Default)]
struct Shared {
    tables: RwLock<Tables>,
    sequences: Sequences,
    failpoints: Mutex<HashSet<MutationKind>>,
    forced_conflicts: AtomicUsize,
    lost_acks: AtomicUsize,
    commits: AtomicU64,
}

/// Row counts per table, used to assert that aborted units leave no trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TableCounts {
    pub users: usize,
    pub posts: usize,
    pub comments: usize,
    pub likes: usize,
    pub notifications: usize,
    pub news: usize,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Shared>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every subsequent mutation of `kind` fails with a backend error.
    pub fn fail_on(&self, kind: MutationKind) {
        self.inner.failpoints.lock().insert(kind);
    }

    pub fn clear_failpoints(&self) {
        self.inner.failpoints.lock().clear();
    }

    /// The next `count` commits fail with a serialization failure.
    pub fn inject_commit_conflicts(&self, count: usize) {
        self.inner.forced_conflicts.store(count, Ordering::SeqCst);
    }

    /// The next `count` commits that write something are applied but then
    /// reported as a lost connection.
    pub fn inject_lost_commit_acks(&self, count: usize) {
        self.inner.lost_acks.store(count, Ordering::SeqCst);
    }

    /// Number of units that committed at least one mutation.
    pub fn commits(&self) -> u64 {
        self.inner.commits.load(Ordering::SeqCst)
    }

    pub fn counts(&self) -> TableCounts {
        let tables = self.inner.tables.read();
        TableCounts {
            users: tables.users.len(),
            posts: tables.posts.len(),
            comments: tables.comments.len(),
            likes: tables.likes.len(),
            notifications: tables.notifications.len(),
            news: tables.news.len(),
        }
    }

    /// Dangling references and asymmetric follow links in committed state.
    pub fn integrity_violations(&self) -> Vec<String> {
        self.inner.tables.read().integrity_violations()
    }

    fn read<R>(&self, f: impl FnOnce(&Tables) -> R) -> R {
        f(&self.inner.tables.read())
    }
}

struct Savepoint {
    snapshot: Tables,
    log_len: usize,
}

pub struct MemoryUnit {
    shared: Arc<Shared>,
    snapshot: Tables,
    observed: HashMap<RecordKey, u64>,
    log: Vec<(Mutation, Stamp)>,
    savepoint: Option<Savepoint>,
}

impl MemoryUnit {
    fn observe(&mut self, key: RecordKey) {
        let version = self.snapshot.version(key);
        self.observed.entry(key).or_insert(version);
    }

    fn observe_found<T>(&mut self, found: Option<T>, key: impl Fn(&T) -> RecordKey) -> Option<T> {
        if let Some(record) = &found {
            self.observe(key(record));
        }
        found
    }

    fn apply_local(&mut self, mutation: Mutation) -> StoreResult<MutationOutcome> {
        let kind = mutation.kind();
        if self.shared.failpoints.lock().contains(&kind) {
            return Err(StoreError::Backend(format!("injected failure on {kind}")));
        }
        let stamp = Stamp {
            id: self.shared.sequences.next(kind),
            at: Utc::now(),
        };
        let applied = self.snapshot.apply(&mutation, stamp)?;
        for key in &applied.touched {
            self.observe(*key);
        }
        self.log.push((mutation, stamp));
        Ok(applied.outcome)
    }

    fn publish(&self) -> StoreResult<()> {
        let pending = self.shared.forced_conflicts.load(Ordering::SeqCst);
        if pending > 0
            && self
                .shared
                .forced_conflicts
                .compare_exchange(pending, pending - 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        {
            return Err(StoreError::SerializationFailure(
                "injected commit conflict".into(),
            ));
        }

        let mut tables = self.shared.tables.write();
        for (key, seen) in &self.observed {
            if tables.version(*key) != *seen {
                return Err(StoreError::SerializationFailure(format!(
                    "{key:?} was modified by a concurrent unit"
                )));
            }
        }
        if self.log.is_empty() {
            return Ok(());
        }

        let mut next = tables.clone();
        next.clock += 1;
        let clock = next.clock;
        for (mutation, stamp) in &self.log {
            let applied = next.apply(mutation, *stamp)?;
            for key in applied.touched {
                next.versions.insert(key, clock);
            }
        }
        *tables = next;
        self.shared.commits.fetch_add(1, Ordering::SeqCst);

        let lost = self.shared.lost_acks.load(Ordering::SeqCst);
        if lost > 0
            && self
                .shared
                .lost_acks
                .compare_exchange(lost, lost - 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        {
            return Err(StoreError::Unavailable(
                "connection lost after commit".into(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnit {
    async fn find_user(&mut self, id: UserId) -> StoreResult<Option<User>> {
        let found = self.snapshot.users.get(&id).cloned();
        Ok(self.observe_found(found, |u| RecordKey::User(u.id)))
    }

    async fn lock_user(&mut self, id: UserId) -> StoreResult<Option<User>> {
        self.observe(RecordKey::User(id));
        Ok(self.snapshot.users.get(&id).cloned())
    }

    async fn find_user_by_subject(&mut self, subject: &str) -> StoreResult<Option<User>> {
        let found = self
            .snapshot
            .users
            .values()
            .find(|u| u.subject == subject)
            .cloned();
        Ok(self.observe_found(found, |u| RecordKey::User(u.id)))
    }

    async fn find_user_by_username(&mut self, username: &str) -> StoreResult<Option<User>> {
        let found = self
            .snapshot
            .users
            .values()
            .find(|u| u.username == username)
            .cloned();
        Ok(self.observe_found(found, |u| RecordKey::User(u.id)))
    }

    async fn find_post(&mut self, id: PostId) -> StoreResult<Option<Post>> {
        self.observe(RecordKey::Post(id));
        Ok(self.snapshot.posts.get(&id).cloned())
    }

    async fn find_comment(&mut self, id: CommentId) -> StoreResult<Option<Comment>> {
        self.observe(RecordKey::Comment(id));
        Ok(self.snapshot.comments.get(&id).cloned())
    }

    async fn find_like(&mut self, user_id: UserId, post_id: PostId) -> StoreResult<Option<Like>> {
        self.observe(RecordKey::Like(user_id, post_id));
        Ok(self.snapshot.likes.get(&(user_id, post_id)).cloned())
    }

    async fn find_news(&mut self, id: NewsId) -> StoreResult<Option<News>> {
        self.observe(RecordKey::News(id));
        Ok(self.snapshot.news.get(&id).cloned())
    }

    async fn apply(&mut self, mutation: Mutation) -> StoreResult<MutationOutcome> {
        self.apply_local(mutation)
    }

    async fn savepoint(&mut self) -> StoreResult<()> {
        self.savepoint = Some(Savepoint {
            snapshot: self.snapshot.clone(),
            log_len: self.log.len(),
        });
        Ok(())
    }

    async fn rollback_to_savepoint(&mut self) -> StoreResult<()> {
        let savepoint = self
            .savepoint
            .take()
            .ok_or_else(|| StoreError::Backend("no active savepoint".into()))?;
        self.snapshot = savepoint.snapshot;
        self.log.truncate(savepoint.log_len);
        Ok(())
    }

    async fn release_savepoint(&mut self) -> StoreResult<()> {
        self.savepoint
            .take()
            .map(|_| ())
            .ok_or_else(|| StoreError::Backend("no active savepoint".into()))
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.publish()
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>> {
        let snapshot = self.inner.tables.read().clone();
        Ok(Box::new(MemoryUnit {
            shared: Arc::clone(&self.inner),
            snapshot,
            observed: HashMap::new(),
            log: Vec::new(),
            savepoint: None,
        }))
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn find_user(&self, id: UserId) -> StoreResult<Option<User>> {
        Ok(self.read(|t| t.users.get(&id).cloned()))
    }

    async fn find_user_by_subject(&self, subject: &str) -> StoreResult<Option<User>> {
        Ok(self.read(|t| t.users.values().find(|u| u.subject == subject).cloned()))
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        Ok(self.read(|t| t.users.values().find(|u| u.username == username).cloned()))
    }

    async fn find_user_summaries(&self, ids: &[UserId]) -> StoreResult<Vec<UserSummary>> {
        Ok(self.read(|t| {
            ids.iter()
                .filter_map(|id| t.users.get(id).map(User::summary))
                .collect()
        }))
    }

    async fn find_post(&self, id: PostId) -> StoreResult<Option<Post>> {
        Ok(self.read(|t| t.posts.get(&id).cloned()))
    }

    async fn list_posts(&self, before: Option<PostId>, limit: usize) -> StoreResult<Vec<Post>> {
        Ok(self.read(|t| match before {
            Some(cursor) => t
                .posts
                .range(..cursor)
                .rev()
                .take(limit)
                .map(|(_, p)| p.clone())
                .collect(),
            None => t.posts.values().rev().take(limit).cloned().collect(),
        }))
    }

    async fn list_comments(&self, post_id: PostId, limit: usize) -> StoreResult<Vec<Comment>> {
        Ok(self.read(|t| {
            t.comments
                .values()
                .rev()
                .filter(|c| c.post_id == post_id)
                .take(limit)
                .cloned()
                .collect()
        }))
    }

    async fn count_comments(&self, post_id: PostId) -> StoreResult<u64> {
        Ok(self.read(|t| t.comments.values().filter(|c| c.post_id == post_id).count() as u64))
    }

    async fn list_likes(&self, post_id: PostId, limit: usize) -> StoreResult<Vec<Like>> {
        Ok(self.read(|t| {
            let mut likes: Vec<Like> = t
                .likes
                .values()
                .filter(|l| l.post_id == post_id)
                .cloned()
                .collect();
            likes.sort_by_key(|l| Reverse(l.id));
            likes.truncate(limit);
            likes
        }))
    }

    async fn count_likes(&self, post_id: PostId) -> StoreResult<u64> {
        Ok(self.read(|t| t.likes.values().filter(|l| l.post_id == post_id).count() as u64))
    }

    async fn list_notifications(&self, to: UserId) -> StoreResult<Vec<Notification>> {
        Ok(self.read(|t| {
            t.notifications
                .values()
                .rev()
                .filter(|n| n.to == to)
                .cloned()
                .collect()
        }))
    }

    async fn list_news(&self) -> StoreResult<Vec<News>> {
        Ok(self.read(|t| t.news.values().rev().cloned().collect()))
    }

    async fn find_news(&self, id: NewsId) -> StoreResult<Option<News>> {
        Ok(self.read(|t| t.news.get(&id).cloned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NewComment, NewPost, NewUser};

    fn new_user(name: &str) -> Mutation {
        Mutation::InsertUser(NewUser {
            subject: format!("sub-{name}"),
            email: format!("{name}@example.com"),
            username: name.to_string(),
            first_name: name.to_string(),
            last_name: "Test".into(),
            profile_url: None,
            is_admin: false,
        })
    }

    async fn seed_user(store: &MemoryStore, name: &str) -> UserId {
        let mut unit = store.begin().await.unwrap();
        let id = unit.apply(new_user(name)).await.unwrap().inserted_id().unwrap();
        unit.commit().await.unwrap();
        UserId(id)
    }

    async fn seed_post(store: &MemoryStore, user_id: UserId) -> PostId {
        let mut unit = store.begin().await.unwrap();
        let id = unit
            .apply(Mutation::InsertPost(NewPost {
                user_id,
                content: Some("hello".into()),
                media: None,
            }))
            .await
            .unwrap()
            .inserted_id()
            .unwrap();
        unit.commit().await.unwrap();
        PostId(id)
    }

    #[tokio::test]
    async fn uncommitted_writes_are_invisible() {
        let store = MemoryStore::new();
        let user = seed_user(&store, "alice").await;

        let mut unit = store.begin().await.unwrap();
        unit.apply(Mutation::InsertPost(NewPost {
            user_id: user,
            content: Some("draft".into()),
            media: None,
        }))
        .await
        .unwrap();
        assert_eq!(store.counts().posts, 0);

        unit.rollback().await.unwrap();
        assert_eq!(store.counts().posts, 0);
    }

    #[tokio::test]
    async fn dropped_unit_discards_writes() {
        let store = MemoryStore::new();
        {
            let mut unit = store.begin().await.unwrap();
            unit.apply(new_user("ghost")).await.unwrap();
        }
        assert_eq!(store.counts().users, 0);
    }

    #[tokio::test]
    async fn concurrent_writers_on_same_record_conflict() {
        let store = MemoryStore::new();
        let alice = seed_user(&store, "alice").await;
        let bob = seed_user(&store, "bob").await;
        let post = seed_post(&store, alice).await;

        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();
        assert!(first.find_like(bob, post).await.unwrap().is_none());
        assert!(second.find_like(bob, post).await.unwrap().is_none());
        first
            .apply(Mutation::InsertLike { user_id: bob, post_id: post })
            .await
            .unwrap();
        second
            .apply(Mutation::InsertLike { user_id: bob, post_id: post })
            .await
            .unwrap();

        first.commit().await.unwrap();
        let err = second.commit().await.unwrap_err();
        assert!(matches!(err, StoreError::SerializationFailure(_)));
        assert_eq!(store.counts().likes, 1);
    }

    #[tokio::test]
    async fn delete_post_is_restricted_while_children_remain() {
        let store = MemoryStore::new();
        let alice = seed_user(&store, "alice").await;
        let post = seed_post(&store, alice).await;

        let mut unit = store.begin().await.unwrap();
        unit.apply(Mutation::InsertComment(NewComment {
            user_id: alice,
            post_id: post,
            content: "first".into(),
        }))
        .await
        .unwrap();
        let err = unit.apply(Mutation::DeletePost(post)).await.unwrap_err();
        assert!(matches!(err, StoreError::ForeignKeyViolation(_)));

        unit.apply(Mutation::DeleteCommentsByPost(post)).await.unwrap();
        let outcome = unit.apply(Mutation::DeletePost(post)).await.unwrap();
        assert_eq!(outcome.rows(), 1);
        unit.commit().await.unwrap();
        assert_eq!(store.counts().posts, 0);
        assert!(store.integrity_violations().is_empty());
    }

    #[tokio::test]
    async fn duplicate_subject_is_a_unique_violation() {
        let store = MemoryStore::new();
        seed_user(&store, "alice").await;

        let mut unit = store.begin().await.unwrap();
        let err = unit.apply(new_user("alice")).await.unwrap_err();
        assert_eq!(err, StoreError::UniqueViolation("users_subject_key".into()));
    }

    #[tokio::test]
    async fn savepoint_rollback_discards_only_later_writes() {
        let store = MemoryStore::new();
        let alice = seed_user(&store, "alice").await;

        let mut unit = store.begin().await.unwrap();
        unit.apply(Mutation::InsertPost(NewPost {
            user_id: alice,
            content: Some("kept".into()),
            media: None,
        }))
        .await
        .unwrap();
        unit.savepoint().await.unwrap();
        unit.apply(Mutation::InsertPost(NewPost {
            user_id: alice,
            content: Some("discarded".into()),
            media: None,
        }))
        .await
        .unwrap();
        unit.rollback_to_savepoint().await.unwrap();
        unit.commit().await.unwrap();

        let posts = store.list_posts(None, 10).await.unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].content.as_deref(), Some("kept"));
    }

    #[tokio::test]
    async fn failpoint_rejects_matching_mutations() {
        let store = MemoryStore::new();
        store.fail_on(MutationKind::InsertUser);

        let mut unit = store.begin().await.unwrap();
        assert!(matches!(
            unit.apply(new_user("alice")).await,
            Err(StoreError::Backend(_))
        ));

        store.clear_failpoints();
        assert!(unit.apply(new_user("alice")).await.is_ok());
    }

    #[tokio::test]
    async fn injected_conflicts_fail_commits() {
        let store = MemoryStore::new();
        store.inject_commit_conflicts(1);

        let mut unit = store.begin().await.unwrap();
        unit.apply(new_user("alice")).await.unwrap();
        assert!(matches!(
            unit.commit().await,
            Err(StoreError::SerializationFailure(_))
        ));
        assert_eq!(store.counts().users, 0);

        seed_user(&store, "alice").await;
        assert_eq!(store.counts().users, 1);
    }

    #[tokio::test]
    async fn cursor_listing_is_strictly_below_cursor() {
        let store = MemoryStore::new();
        let alice = seed_user(&store, "alice").await;
        for _ in 0..5 {
            seed_post(&store, alice).await;
        }

        let page = store.list_posts(Some(PostId(4)), 10).await.unwrap();
        let ids: Vec<i64> = page.iter().map(|p| p.id.0).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }
}
