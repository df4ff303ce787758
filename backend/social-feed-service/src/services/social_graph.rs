//! Like and follow edges.
//!
//! Both operations are toggles over a two-state edge. Creating an edge writes the
//! edge and its notification in the same unit; removing an edge removes the
//! notification on a best-effort basis.

use crate::coordinator::{best_effort, Coordinator};
use crate::domain::{NewNotification, NotificationKind, PostId, UserId};
use crate::error::{AppError, Result};
use crate::store::Mutation;
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LikeToggle {
    Liked,
    Unliked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FollowToggle {
    Followed,
    Unfollowed,
}

#[derive(Clone)]
pub struct SocialGraphService {
    coordinator: Coordinator,
    allow_self_like: bool,
}

impl SocialGraphService {
    pub fn new(coordinator: Coordinator, allow_self_like: bool) -> Self {
        Self {
            coordinator,
            allow_self_like,
        }
    }

    pub async fn toggle_like(&self, actor: UserId, post_id: PostId) -> Result<LikeToggle> {
        let allow_self_like = self.allow_self_like;

        let toggled = self
            .coordinator
            .run_atomic("toggle_like", move |unit| {
                Box::pin(async move {
                    unit.lock_user(actor)
                        .await?
                        .ok_or_else(|| AppError::not_found("User"))?;
                    let post = unit
                        .find_post(post_id)
                        .await?
                        .ok_or_else(|| AppError::not_found("Post"))?;
                    let own_post = post.user_id == actor;

                    if unit.find_like(actor, post_id).await?.is_some() {
                        unit.apply(Mutation::DeleteLike {
                            user_id: actor,
                            post_id,
                        })
                        .await?;
                        if !own_post {
                            best_effort(
                                unit,
                                Mutation::DeleteNotificationsMatching {
                                    from: actor,
                                    to: post.user_id,
                                    kind: NotificationKind::Like,
                                    post_id: Some(post_id),
                                },
                            )
                            .await?;
                        }
                        return Ok(LikeToggle::Unliked);
                    }

                    if own_post && !allow_self_like {
                        return Err(AppError::Validation("You cannot like your own post".into()));
                    }
                    unit.apply(Mutation::InsertLike {
                        user_id: actor,
                        post_id,
                    })
                    .await?;
                    if !own_post {
                        unit.apply(Mutation::InsertNotification(NewNotification {
                            from: actor,
                            to: post.user_id,
                            kind: NotificationKind::Like,
                            post_id: Some(post_id),
                        }))
                        .await?;
                    }
                    Ok(LikeToggle::Liked)
                })
            })
            .await?;

        info!(user_id = %actor, %post_id, outcome = ?toggled, "like toggled");
        Ok(toggled)
    }

    pub async fn toggle_follow(&self, actor: UserId, target: UserId) -> Result<FollowToggle> {
        if actor == target {
            return Err(AppError::Validation(
                "You can't follow or unfollow yourself".into(),
            ));
        }

        let toggled = self
            .coordinator
            .run_atomic("toggle_follow", move |unit| {
                Box::pin(async move {
                    // Lock in id order so opposite follows cannot deadlock.
                    let (low, high) = if actor < target {
                        (actor, target)
                    } else {
                        (target, actor)
                    };
                    let low_user = unit.lock_user(low).await?;
                    let high_user = unit.lock_user(high).await?;
                    let (acting, targeted) = if actor < target {
                        (low_user, high_user)
                    } else {
                        (high_user, low_user)
                    };
                    let acting = acting.ok_or_else(|| AppError::not_found("User"))?;
                    targeted.ok_or_else(|| AppError::not_found("User to follow"))?;

                    if acting.is_following(target) {
                        unit.apply(Mutation::RemoveFollowing {
                            user_id: actor,
                            target,
                        })
                        .await?;
                        unit.apply(Mutation::RemoveFollower {
                            user_id: target,
                            follower: actor,
                        })
                        .await?;
                        best_effort(
                            unit,
                            Mutation::DeleteNotificationsMatching {
                                from: actor,
                                to: target,
                                kind: NotificationKind::Follow,
                                post_id: None,
                            },
                        )
                        .await?;
                        return Ok(FollowToggle::Unfollowed);
                    }

                    unit.apply(Mutation::AddFollowing {
                        user_id: actor,
                        target,
                    })
                    .await?;
                    unit.apply(Mutation::AddFollower {
                        user_id: target,
                        follower: actor,
                    })
                    .await?;
                    unit.apply(Mutation::InsertNotification(NewNotification {
                        from: actor,
                        to: target,
                        kind: NotificationKind::Follow,
                        post_id: None,
                    }))
                    .await?;
                    Ok(FollowToggle::Followed)
                })
            })
            .await?;

        info!(user_id = %actor, target_id = %target, outcome = ?toggled, "follow toggled");
        Ok(toggled)
    }
}
