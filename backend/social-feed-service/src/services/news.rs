//! Announcements published by administrators.
//!
//! Attachments are uploaded before the unit opens. If the unit aborts they are
//! removed again; once a news record is deleted its files are removed after
//! commit and any failure is reported as orphaned media.

use super::posts::summaries_by_id;
use crate::coordinator::Coordinator;
use crate::domain::{normalize_text, NewNews, News, NewsId, UserId, UserSummary};
use crate::error::{AppError, Result};
use crate::media::{release_after_abort, remove_media, upload_all, MediaStore, StagedUpload};
use crate::store::{EntityStore, Mutation, MutationKind};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Serialize)]
pub struct NewsView {
    #[serde(flatten)]
    pub news: News,
    pub author: Option<UserSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewsDeletion {
    pub news_id: NewsId,
    pub orphaned_media: Vec<String>,
}

#[derive(Clone)]
pub struct NewsService {
    coordinator: Coordinator,
    media: Arc<dyn MediaStore>,
    max_files: usize,
}

impl NewsService {
    pub fn new(coordinator: Coordinator, media: Arc<dyn MediaStore>, max_files: usize) -> Self {
        Self {
            coordinator,
            media,
            max_files,
        }
    }

    fn store(&self) -> &Arc<dyn EntityStore> {
        self.coordinator.store()
    }

    async fn require_admin(&self, actor: UserId) -> Result<()> {
        let user = self
            .store()
            .find_user(actor)
            .await?
            .ok_or_else(|| AppError::not_found("User"))?;
        if !user.is_admin {
            return Err(AppError::Forbidden("Only administrators can manage news".into()));
        }
        Ok(())
    }

    pub async fn create_news(
        &self,
        actor: UserId,
        content: Option<String>,
        files: Vec<StagedUpload>,
    ) -> Result<News> {
        let content = normalize_text(content);
        if content.is_none() && files.is_empty() {
            return Err(AppError::Validation(
                "Provide a file or text field to create a news".into(),
            ));
        }
        if files.len() > self.max_files {
            return Err(AppError::Validation(format!(
                "A news item can carry at most {} files",
                self.max_files
            )));
        }
        self.require_admin(actor).await?;

        let files = upload_all(self.media.as_ref(), files).await?;
        let uploaded = files.clone();

        let result = self
            .coordinator
            .run_atomic("create_news", move |unit| {
                let new_news = NewNews {
                    user_id: actor,
                    content: content.clone(),
                    files: files.clone(),
                };
                Box::pin(async move {
                    let user = unit
                        .find_user(actor)
                        .await?
                        .ok_or_else(|| AppError::not_found("User"))?;
                    if !user.is_admin {
                        return Err(AppError::Forbidden(
                            "Only administrators can manage news".into(),
                        ));
                    }
                    let id = unit
                        .apply(Mutation::InsertNews(new_news))
                        .await?
                        .expect_inserted(MutationKind::InsertNews)?;
                    unit.find_news(NewsId(id))
                        .await?
                        .ok_or_else(|| AppError::Internal("inserted news not readable".into()))
                })
            })
            .await;

        match result {
            Ok(news) => {
                info!(user_id = %actor, news_id = %news.id, files = news.files.len(), "news created");
                Ok(news)
            }
            Err(err) => {
                release_after_abort(self.media.as_ref(), &uploaded, &err).await;
                Err(err)
            }
        }
    }

    pub async fn list_news(&self) -> Result<Vec<NewsView>> {
        let items = self.store().list_news().await?;
        let authors = summaries_by_id(self.store(), items.iter().map(|n| n.user_id)).await?;
        Ok(items
            .into_iter()
            .map(|news| NewsView {
                author: authors.get(&news.user_id).cloned(),
                news,
            })
            .collect())
    }

    pub async fn delete_news(&self, actor: UserId, news_id: NewsId) -> Result<NewsDeletion> {
        self.require_admin(actor).await?;

        let files = self
            .coordinator
            .run_atomic("delete_news", move |unit| {
                Box::pin(async move {
                    let news = unit
                        .find_news(news_id)
                        .await?
                        .ok_or_else(|| AppError::not_found("News"))?;
                    unit.apply(Mutation::DeleteNews(news_id)).await?;
                    Ok(news.files)
                })
            })
            .await?;

        let orphaned_media = remove_media(self.media.as_ref(), &files).await;
        info!(user_id = %actor, %news_id, orphaned = orphaned_media.len(), "news deleted");
        Ok(NewsDeletion {
            news_id,
            orphaned_media,
        })
    }
}
