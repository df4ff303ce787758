/// Comment service - creation with owner notification, listing and deletion
use super::posts::{ensure_owner_or_admin, summaries_by_id};
use crate::coordinator::{best_effort, Coordinator};
use crate::domain::{
    normalize_text, Comment, CommentId, NewComment, NewNotification, NotificationKind, PostId,
    UserId, UserSummary,
};
use crate::error::{AppError, Result};
use crate::store::{EntityStore, Mutation, MutationKind};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

pub const COMMENTS_LISTED: usize = 30;

#[derive(Debug, Clone, Serialize)]
pub struct CommentView {
    #[serde(flatten)]
    pub comment: Comment,
    pub author: Option<UserSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommentListing {
    pub comments: Vec<CommentView>,
    pub count: u64,
}

#[derive(Clone)]
pub struct CommentService {
    coordinator: Coordinator,
}

impl CommentService {
    pub fn new(coordinator: Coordinator) -> Self {
        Self { coordinator }
    }

    fn store(&self) -> &Arc<dyn EntityStore> {
        self.coordinator.store()
    }

    /// Add a comment to a post. The post owner is notified in the same unit
    /// unless they wrote the comment themselves.
    pub async fn create_comment(
        &self,
        actor: UserId,
        post_id: PostId,
        content: Option<String>,
    ) -> Result<Comment> {
        let content = normalize_text(content)
            .ok_or_else(|| AppError::Validation("Comment content is required".into()))?;

        let comment = self
            .coordinator
            .run_atomic("create_comment", move |unit| {
                let content = content.clone();
                Box::pin(async move {
                    unit.find_user(actor)
                        .await?
                        .ok_or_else(|| AppError::not_found("User"))?;
                    let post = unit
                        .find_post(post_id)
                        .await?
                        .ok_or_else(|| AppError::not_found("Post"))?;

                    let id = unit
                        .apply(Mutation::InsertComment(NewComment {
                            user_id: actor,
                            post_id,
                            content,
                        }))
                        .await?
                        .expect_inserted(MutationKind::InsertComment)?;
                    if post.user_id != actor {
                        unit.apply(Mutation::InsertNotification(NewNotification {
                            from: actor,
                            to: post.user_id,
                            kind: NotificationKind::Comment,
                            post_id: Some(post_id),
                        }))
                        .await?;
                    }
                    unit.find_comment(CommentId(id))
                        .await?
                        .ok_or_else(|| AppError::Internal("inserted comment not readable".into()))
                })
            })
            .await?;

        info!(user_id = %actor, %post_id, comment_id = %comment.id, "comment created");
        Ok(comment)
    }

    /// Latest comments of a post with their authors, plus the total count.
    pub async fn list_comments(&self, post_id: PostId) -> Result<CommentListing> {
        if self.store().find_post(post_id).await?.is_none() {
            return Err(AppError::not_found("Post"));
        }
        let comments = self.store().list_comments(post_id, COMMENTS_LISTED).await?;
        let count = self.store().count_comments(post_id).await?;
        let authors = summaries_by_id(self.store(), comments.iter().map(|c| c.user_id)).await?;
        Ok(CommentListing {
            comments: comments
                .into_iter()
                .map(|comment| CommentView {
                    author: authors.get(&comment.user_id).cloned(),
                    comment,
                })
                .collect(),
            count,
        })
    }

    /// Delete a comment. Allowed for its author, the post owner and admins.
    ///
    /// Comment notifications from the author on that post are removed on a
    /// best-effort basis.
    pub async fn delete_comment(&self, actor: UserId, comment_id: CommentId) -> Result<Comment> {
        let removed = self
            .coordinator
            .run_atomic("delete_comment", move |unit| {
                Box::pin(async move {
                    let acting = unit
                        .find_user(actor)
                        .await?
                        .ok_or_else(|| AppError::not_found("User"))?;
                    let comment = unit
                        .find_comment(comment_id)
                        .await?
                        .ok_or_else(|| AppError::not_found("Comment"))?;
                    let post = unit
                        .find_post(comment.post_id)
                        .await?
                        .ok_or_else(|| AppError::not_found("Post"))?;
                    if acting.id != comment.user_id {
                        ensure_owner_or_admin(&acting, post.user_id, "delete this comment")?;
                    }

                    unit.apply(Mutation::DeleteComment(comment_id)).await?;
                    best_effort(
                        unit,
                        Mutation::DeleteNotificationsMatching {
                            from: comment.user_id,
                            to: post.user_id,
                            kind: NotificationKind::Comment,
                            post_id: Some(post.id),
                        },
                    )
                    .await?;
                    Ok(comment)
                })
            })
            .await?;

        info!(user_id = %actor, %comment_id, post_id = %removed.post_id, "comment deleted");
        Ok(removed)
    }
}
