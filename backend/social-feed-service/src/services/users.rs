/// User synchronization, lookup and profile updates
use crate::coordinator::Coordinator;
use crate::domain::{normalize_text, NewUser, User, UserId, UserSummary};
use crate::error::{AppError, Result};
use crate::mail::{dispatch_welcome, MailNotifier, WelcomeMail};
use crate::media::{release_after_abort, upload_staged, MediaStore, StagedUpload};
use crate::middleware::Identity;
use crate::store::{EntityStore, Mutation, MutationKind, UnitOfWork};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

const USERNAME_ATTEMPTS: usize = 8;
const SYNC_ATTEMPTS: u32 = 3;
const USERNAME_MAX_LEN: usize = 30;

#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub user: User,
    pub created: bool,
}

/// A user together with the summaries of the accounts it is linked to.
#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub id: UserId,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub profile_url: Option<String>,
    pub is_admin: bool,
    pub followers: Vec<UserSummary>,
    pub following: Vec<UserSummary>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct UserService {
    coordinator: Coordinator,
    media: Arc<dyn MediaStore>,
    mail: Arc<dyn MailNotifier>,
    admin_email: Option<String>,
}

impl UserService {
    pub fn new(
        coordinator: Coordinator,
        media: Arc<dyn MediaStore>,
        mail: Arc<dyn MailNotifier>,
        admin_email: Option<String>,
    ) -> Self {
        Self {
            coordinator,
            media,
            mail,
            admin_email: admin_email.map(|email| email.trim().to_ascii_lowercase()),
        }
    }

    fn store(&self) -> &Arc<dyn EntityStore> {
        self.coordinator.store()
    }

    /// Create the local user for an external identity, once.
    pub async fn sync(&self, identity: &Identity) -> Result<SyncOutcome> {
        if let Some(user) = self.store().find_user_by_subject(&identity.subject).await? {
            return Ok(SyncOutcome {
                user,
                created: false,
            });
        }

        let email = identity
            .email
            .as_deref()
            .map(|email| email.trim().to_ascii_lowercase())
            .filter(|email| email.contains('@'))
            .ok_or_else(|| {
                AppError::Validation("Identity provider did not supply an email address".into())
            })?;
        let is_admin = self.admin_email.as_deref() == Some(email.as_str());
        let base = username_base(&email);
        let template = NewUser {
            subject: identity.subject.clone(),
            email,
            username: String::new(),
            first_name: identity.first_name.clone().unwrap_or_default(),
            last_name: identity.last_name.clone().unwrap_or_default(),
            profile_url: identity.image_url.clone(),
            is_admin,
        };

        let mut attempt = 0;
        let (user, created) = loop {
            attempt += 1;
            let template = template.clone();
            let base = base.clone();
            let result = self
                .coordinator
                .run_atomic("sync_user", move |unit| {
                    let template = template.clone();
                    let base = base.clone();
                    Box::pin(async move {
                        if let Some(existing) = unit.find_user_by_subject(&template.subject).await? {
                            return Ok((existing, false));
                        }
                        let username = free_username(unit, &base).await?;
                        let id = unit
                            .apply(Mutation::InsertUser(NewUser {
                                username,
                                ..template
                            }))
                            .await?
                            .expect_inserted(MutationKind::InsertUser)?;
                        let user = unit
                            .find_user(UserId(id))
                            .await?
                            .ok_or_else(|| AppError::Internal("inserted user not readable".into()))?;
                        Ok((user, true))
                    })
                })
                .await;

            match result {
                Ok(synced) => break synced,
                // Either the same subject committed first, or another subject
                // took the derived username and the next run picks a suffix.
                Err(AppError::Conflict(reason)) => {
                    if let Some(user) = self.store().find_user_by_subject(&identity.subject).await? {
                        break (user, false);
                    }
                    if attempt >= SYNC_ATTEMPTS {
                        return Err(AppError::Conflict(reason));
                    }
                    debug!(subject = %identity.subject, attempt, %reason, "username taken concurrently, re-running sync");
                }
                Err(err) => return Err(err),
            }
        };

        if created {
            info!(user_id = %user.id, username = %user.username, is_admin = user.is_admin, "user synced");
            dispatch_welcome(
                Arc::clone(&self.mail),
                WelcomeMail {
                    recipient: user.email.clone(),
                    first_name: user.first_name.clone(),
                },
            );
        }
        Ok(SyncOutcome { user, created })
    }

    /// Map an authenticated identity to its stored user.
    pub async fn resolve(&self, identity: &Identity) -> Result<User> {
        self.store()
            .find_user_by_subject(&identity.subject)
            .await?
            .ok_or_else(|| AppError::not_found("User"))
    }

    pub async fn current(&self, identity: &Identity) -> Result<UserProfile> {
        let user = self.resolve(identity).await?;
        self.profile(user, true).await
    }

    pub async fn lookup(&self, username: &str) -> Result<User> {
        self.store()
            .find_user_by_username(&username.trim().to_ascii_lowercase())
            .await?
            .ok_or_else(|| AppError::not_found("User"))
    }

    pub async fn by_username(&self, username: &str) -> Result<UserProfile> {
        let user = self.lookup(username).await?;
        self.profile(user, false).await
    }

    async fn profile(&self, user: User, include_email: bool) -> Result<UserProfile> {
        let followers = self.store().find_user_summaries(&user.followers).await?;
        let following = self.store().find_user_summaries(&user.following).await?;
        Ok(UserProfile {
            id: user.id,
            username: user.username,
            email: include_email.then_some(user.email),
            first_name: user.first_name,
            last_name: user.last_name,
            profile_url: user.profile_url,
            is_admin: user.is_admin,
            followers,
            following,
            created_at: user.created_at,
        })
    }

    /// Change the username and/or profile picture of `actor`.
    pub async fn update_profile(
        &self,
        actor: UserId,
        username: Option<String>,
        image: Option<StagedUpload>,
    ) -> Result<User> {
        let username = normalize_text(username).map(|name| name.to_ascii_lowercase());
        if let Some(name) = &username {
            validate_username(name)?;
        }
        if let Some(image) = &image {
            if !image.content_type().starts_with("image/") {
                return Err(AppError::Validation(
                    "Profile picture must be an image".into(),
                ));
            }
        }
        if username.is_none() && image.is_none() {
            return Err(AppError::Validation(
                "Provide a username or a profile picture".into(),
            ));
        }

        let picture = match image {
            Some(staged) => Some(upload_staged(self.media.as_ref(), staged).await?),
            None => None,
        };
        let uploaded = picture.clone();

        let result = self
            .coordinator
            .run_atomic("update_profile", move |unit| {
                let username = username.clone();
                let picture = picture.clone();
                Box::pin(async move {
                    let current = unit
                        .lock_user(actor)
                        .await?
                        .ok_or_else(|| AppError::not_found("User"))?;
                    if let Some(name) = &username {
                        if let Some(other) = unit.find_user_by_username(name).await? {
                            if other.id != actor {
                                return Err(AppError::Conflict("Username already taken".into()));
                            }
                        }
                    }
                    let replaced = picture.as_ref().and(current.profile_media_id);
                    unit.apply(Mutation::UpdateProfile {
                        user_id: actor,
                        username,
                        picture,
                    })
                    .await?;
                    let updated = unit
                        .find_user(actor)
                        .await?
                        .ok_or_else(|| AppError::not_found("User"))?;
                    Ok((updated, replaced))
                })
            })
            .await;

        match result {
            Ok((updated, replaced)) => {
                if let Some(previous) = replaced {
                    if let Err(err) = self.media.delete(&previous).await {
                        warn!(user_id = %actor, media_id = %previous, error = %err, "previous profile picture left orphaned");
                    }
                }
                Ok(updated)
            }
            Err(err) => {
                if let Some(picture) = uploaded {
                    release_after_abort(self.media.as_ref(), std::slice::from_ref(&picture), &err)
                        .await;
                }
                Err(err)
            }
        }
    }
}

/// Local part of an email reduced to username characters.
fn username_base(email: &str) -> String {
    let local = email.split('@').next().unwrap_or_default();
    let base: String = local
        .chars()
        .map(|c| c.to_ascii_lowercase())
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .take(USERNAME_MAX_LEN - 4)
        .collect();
    if base.is_empty() {
        "user".to_string()
    } else {
        base
    }
}

fn validate_username(username: &str) -> Result<()> {
    let valid_chars = username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if username.len() < 3 || username.len() > USERNAME_MAX_LEN || !valid_chars {
        return Err(AppError::Validation(format!(
            "Username must be 3-{USERNAME_MAX_LEN} characters of letters, digits, '.', '_' or '-'"
        )));
    }
    Ok(())
}

async fn free_username(unit: &mut dyn UnitOfWork, base: &str) -> Result<String> {
    if unit.find_user_by_username(base).await?.is_none() {
        return Ok(base.to_string());
    }
    for _ in 0..USERNAME_ATTEMPTS {
        let suffix: u32 = rand::thread_rng().gen_range(1000..10000);
        let candidate = format!("{base}{suffix}");
        if unit.find_user_by_username(&candidate).await?.is_none() {
            return Ok(candidate);
        }
    }
    Err(AppError::Conflict(format!(
        "Could not derive a free username from {base}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_base_uses_email_local_part() {
        assert_eq!(username_base("Jane.Doe+news@example.com"), "jane.doenews");
        assert_eq!(username_base("@example.com"), "user");
    }

    #[test]
    fn username_validation() {
        assert!(validate_username("jane_doe").is_ok());
        assert!(validate_username("jd").is_err());
        assert!(validate_username("jane doe").is_err());
    }
}
