use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse::<i64>().map($name)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                $name(value)
            }
        }
    };
}

entity_id!(
    /// Primary key of a user record
    UserId
);
entity_id!(PostId);
entity_id!(CommentId);
entity_id!(LikeId);
entity_id!(NotificationId);
entity_id!(NewsId);

/// A file held by the media store, addressed by its storage id and public url
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub subject: String,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub profile_url: Option<String>,
    pub profile_media_id: Option<String>,
    pub is_admin: bool,
    pub following: Vec<UserId>,
    pub followers: Vec<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_following(&self, other: UserId) -> bool {
        self.following.contains(&other)
    }

    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            username: self.username.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            profile_url: self.profile_url.clone(),
            is_admin: self.is_admin,
        }
    }
}

/// Public projection of a user attached to posts, likes and follow lists
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: UserId,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub profile_url: Option<String>,
    pub is_admin: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub user_id: UserId,
    pub content: Option<String>,
    pub media: Option<MediaRef>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub user_id: UserId,
    pub post_id: PostId,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Like {
    pub id: LikeId,
    pub user_id: UserId,
    pub post_id: PostId,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Like,
    Follow,
    Comment,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Like => "like",
            NotificationKind::Follow => "follow",
            NotificationKind::Comment => "comment",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "like" => Ok(NotificationKind::Like),
            "follow" => Ok(NotificationKind::Follow),
            "comment" => Ok(NotificationKind::Comment),
            other => Err(format!("unknown notification kind: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub from: UserId,
    pub to: UserId,
    pub kind: NotificationKind,
    pub post_id: Option<PostId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct News {
    pub id: NewsId,
    pub user_id: UserId,
    pub content: Option<String>,
    pub files: Vec<MediaRef>,
    pub created_at: DateTime<Utc>,
}

// Insert payloads. Ids and timestamps are assigned by the store.

#[derive(Debug, Clone, PartialEq)]
pub struct NewUser {
    pub subject: String,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub profile_url: Option<String>,
    pub is_admin: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPost {
    pub user_id: UserId,
    pub content: Option<String>,
    pub media: Option<MediaRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewComment {
    pub user_id: UserId,
    pub post_id: PostId,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub from: UserId,
    pub to: UserId,
    pub kind: NotificationKind,
    pub post_id: Option<PostId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewNews {
    pub user_id: UserId,
    pub content: Option<String>,
    pub files: Vec<MediaRef>,
}
