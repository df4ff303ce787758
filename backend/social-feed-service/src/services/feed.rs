//! Reverse-chronological post listing with id cursors.
//!
//! A page is read with one extra row. If the extra row comes back there is a
//! further page, and the cursor for it is the id of the last post returned.
//! Listing never mutates, so it reads the store directly instead of opening a
//! unit.

use super::posts::{summaries_by_id, PostView};
use crate::domain::{Post, PostId};
use crate::error::{AppError, Result};
use crate::store::EntityStore;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Serialize)]
pub struct PostPage {
    pub posts: Vec<PostView>,
    pub has_next: bool,
    pub next_cursor: Option<PostId>,
}

#[derive(Clone)]
pub struct FeedService {
    store: Arc<dyn EntityStore>,
    page_size: usize,
}

impl FeedService {
    pub fn new(store: Arc<dyn EntityStore>, page_size: usize) -> Self {
        Self {
            store,
            page_size: page_size.max(1),
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// List one page of posts, newest first, strictly older than `cursor`.
    pub async fn list_posts(&self, cursor: Option<PostId>) -> Result<PostPage> {
        let fetched = self.store.list_posts(cursor, self.page_size + 1).await?;
        if fetched.is_empty() && cursor.is_some() {
            return Err(AppError::NotFound("No more posts".into()));
        }

        let (posts, next_cursor) = paginate(fetched, self.page_size);
        let authors = summaries_by_id(&self.store, posts.iter().map(|p| p.user_id)).await?;
        debug!(
            cursor = ?cursor,
            returned = posts.len(),
            next_cursor = ?next_cursor,
            "posts listed"
        );

        Ok(PostPage {
            posts: posts
                .into_iter()
                .map(|post| PostView {
                    author: authors.get(&post.user_id).cloned(),
                    post,
                })
                .collect(),
            has_next: next_cursor.is_some(),
            next_cursor,
        })
    }
}

/// Trim a `page_size + 1` read to one page and derive the continuation cursor.
pub fn paginate(mut fetched: Vec<Post>, page_size: usize) -> (Vec<Post>, Option<PostId>) {
    if fetched.len() > page_size {
        fetched.truncate(page_size);
        let cursor = fetched.last().map(|post| post.id);
        (fetched, cursor)
    } else {
        (fetched, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::UserId;
    use chrono::Utc;

    fn posts(ids: impl DoubleEndedIterator<Item = i64>) -> Vec<Post> {
        ids.rev()
            .map(|id| Post {
                id: PostId(id),
                user_id: UserId(1),
                content: Some(format!("post {id}")),
                media: None,
                created_at: Utc::now(),
            })
            .collect()
    }

    #[test]
    fn extra_row_yields_cursor_of_last_returned() {
        let (page, cursor) = paginate(posts(5..=15), 10);
        assert_eq!(page.len(), 10);
        assert_eq!(page.first().map(|p| p.id), Some(PostId(15)));
        assert_eq!(cursor, Some(PostId(6)));
    }

    #[test]
    fn exact_page_has_no_cursor() {
        let (page, cursor) = paginate(posts(1..=10), 10);
        assert_eq!(page.len(), 10);
        assert_eq!(cursor, None);
    }

    #[test]
    fn short_page_has_no_cursor() {
        let (page, cursor) = paginate(posts(1..=3), 10);
        assert_eq!(page.len(), 3);
        assert!(cursor.is_none());
    }
}
