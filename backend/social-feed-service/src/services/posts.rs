/// Post service - post creation, retrieval, likes listing and cascading deletion
use crate::coordinator::Coordinator;
use crate::domain::{
    normalize_text, Like, LikeId, NewPost, Post, PostId, User, UserId, UserSummary,
};
use crate::error::{AppError, Result};
use crate::media::{release_after_abort, remove_media, upload_staged, MediaStore, StagedUpload};
use crate::store::{EntityStore, Mutation, MutationKind};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

pub const LIKES_LISTED: usize = 20;

/// A post together with its author
#[derive(Debug, Clone, Serialize)]
pub struct PostView {
    #[serde(flatten)]
    pub post: Post,
    pub author: Option<UserSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LikeView {
    pub id: LikeId,
    pub user: Option<UserSummary>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LikeListing {
    pub likes: Vec<LikeView>,
    pub count: u64,
}

/// What a post deletion removed
#[derive(Debug, Clone, Serialize)]
pub struct PostDeletion {
    pub post_id: PostId,
    pub comments_removed: u64,
    pub likes_removed: u64,
    pub notifications_removed: u64,
    /// Media ids that could not be removed from the media store
    pub orphaned_media: Vec<String>,
}

#[derive(Clone)]
pub struct PostService {
    coordinator: Coordinator,
    media: Arc<dyn MediaStore>,
}

impl PostService {
    pub fn new(coordinator: Coordinator, media: Arc<dyn MediaStore>) -> Self {
        Self { coordinator, media }
    }

    fn store(&self) -> &Arc<dyn EntityStore> {
        self.coordinator.store()
    }

    /// Create a post from text, an attachment, or both.
    pub async fn create_post(
        &self,
        actor: UserId,
        content: Option<String>,
        attachment: Option<StagedUpload>,
    ) -> Result<Post> {
        let content = normalize_text(content);
        if content.is_none() && attachment.is_none() {
            return Err(AppError::Validation(
                "Provide a file or text field to create a post".into(),
            ));
        }
        if self.store().find_user(actor).await?.is_none() {
            return Err(AppError::not_found("User"));
        }

        let media = match attachment {
            Some(staged) => Some(upload_staged(self.media.as_ref(), staged).await?),
            None => None,
        };
        let uploaded = media.clone();

        let result = self
            .coordinator
            .run_atomic("create_post", move |unit| {
                let new_post = NewPost {
                    user_id: actor,
                    content: content.clone(),
                    media: media.clone(),
                };
                Box::pin(async move {
                    unit.find_user(actor)
                        .await?
                        .ok_or_else(|| AppError::not_found("User"))?;
                    let id = unit
                        .apply(Mutation::InsertPost(new_post))
                        .await?
                        .expect_inserted(MutationKind::InsertPost)?;
                    unit.find_post(PostId(id))
                        .await?
                        .ok_or_else(|| AppError::Internal("inserted post not readable".into()))
                })
            })
            .await;

        match result {
            Ok(post) => {
                info!(user_id = %actor, post_id = %post.id, has_media = post.media.is_some(), "post created");
                Ok(post)
            }
            Err(err) => {
                if let Some(media) = uploaded {
                    release_after_abort(self.media.as_ref(), std::slice::from_ref(&media), &err)
                        .await;
                }
                Err(err)
            }
        }
    }

    pub async fn get_post(&self, post_id: PostId) -> Result<PostView> {
        let post = self
            .store()
            .find_post(post_id)
            .await?
            .ok_or_else(|| AppError::not_found("Post"))?;
        let mut views = self.with_authors(vec![post]).await?;
        views
            .pop()
            .ok_or_else(|| AppError::Internal("post view missing".into()))
    }

    /// Attach author summaries to a batch of posts.
    pub async fn with_authors(&self, posts: Vec<Post>) -> Result<Vec<PostView>> {
        let authors = summaries_by_id(self.store(), posts.iter().map(|p| p.user_id)).await?;
        Ok(posts
            .into_iter()
            .map(|post| PostView {
                author: authors.get(&post.user_id).cloned(),
                post,
            })
            .collect())
    }

    /// Delete a post and everything that references it.
    ///
    /// Children go first (comments, likes, notifications), then the post, all in
    /// one unit. The attached media is removed after commit; a failure there is
    /// reported in `orphaned_media` and does not fail the deletion.
    pub async fn delete_post(&self, actor: UserId, post_id: PostId) -> Result<PostDeletion> {
        let (mut deletion, media) = self
            .coordinator
            .run_atomic("delete_post", move |unit| {
                Box::pin(async move {
                    let acting = unit
                        .find_user(actor)
                        .await?
                        .ok_or_else(|| AppError::not_found("User"))?;
                    let post = unit
                        .find_post(post_id)
                        .await?
                        .ok_or_else(|| AppError::not_found("Post"))?;
                    ensure_owner_or_admin(&acting, post.user_id, "delete this post")?;

                    let comments_removed =
                        unit.apply(Mutation::DeleteCommentsByPost(post_id)).await?.rows();
                    let likes_removed =
                        unit.apply(Mutation::DeleteLikesByPost(post_id)).await?.rows();
                    let notifications_removed = unit
                        .apply(Mutation::DeleteNotificationsByPost(post_id))
                        .await?
                        .rows();
                    unit.apply(Mutation::DeletePost(post_id)).await?;

                    Ok((
                        PostDeletion {
                            post_id,
                            comments_removed,
                            likes_removed,
                            notifications_removed,
                            orphaned_media: Vec::new(),
                        },
                        post.media,
                    ))
                })
            })
            .await?;

        if let Some(media) = media {
            deletion.orphaned_media = remove_media(self.media.as_ref(), &[media]).await;
        }
        info!(
            user_id = %actor,
            %post_id,
            comments = deletion.comments_removed,
            likes = deletion.likes_removed,
            notifications = deletion.notifications_removed,
            orphaned = deletion.orphaned_media.len(),
            "post deleted"
        );
        Ok(deletion)
    }

    /// Latest likes of a post with the likers, plus the total count.
    pub async fn list_likes(&self, post_id: PostId) -> Result<LikeListing> {
        if self.store().find_post(post_id).await?.is_none() {
            return Err(AppError::not_found("Post"));
        }
        let likes = self.store().list_likes(post_id, LIKES_LISTED).await?;
        let count = self.store().count_likes(post_id).await?;
        let users = summaries_by_id(self.store(), likes.iter().map(|l| l.user_id)).await?;
        Ok(LikeListing {
            likes: likes
                .into_iter()
                .map(|like: Like| LikeView {
                    id: like.id,
                    user: users.get(&like.user_id).cloned(),
                    created_at: like.created_at,
                })
                .collect(),
            count,
        })
    }
}

pub(crate) fn ensure_owner_or_admin(acting: &User, owner: UserId, action: &str) -> Result<()> {
    if acting.id == owner || acting.is_admin {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "You are not allowed to {action}"
        )))
    }
}

pub(crate) async fn summaries_by_id(
    store: &Arc<dyn EntityStore>,
    ids: impl Iterator<Item = UserId>,
) -> Result<HashMap<UserId, UserSummary>> {
    let mut unique: Vec<UserId> = ids.collect();
    unique.sort();
    unique.dedup();
    let summaries = store.find_user_summaries(&unique).await?;
    Ok(summaries.into_iter().map(|s| (s.id, s)).collect())
}
