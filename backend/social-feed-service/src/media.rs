//! Media store collaborator and local upload staging.
//!
//! Uploads are not transactional. Callers upload before opening a unit and
//! remove the object again if the unit aborts; deletes of media belonging to
//! removed records happen after commit and only produce warnings on failure.

use crate::domain::MediaRef;
use crate::error::{AppError, Result};
use crate::metrics;
use async_trait::async_trait;
use parking_lot::Mutex;
use resilience::{object_storage_config, with_retry_if, with_timeout_result, ServiceConfig};
use s3_utils::S3Client;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;
use uuid::Uuid;

#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        content_type: &str,
        extension: Option<&str>,
    ) -> Result<MediaRef>;

    async fn delete(&self, media_id: &str) -> Result<()>;

    async fn health_check(&self) -> Result<()>;
}

/// Media store backed by an S3 bucket
pub struct S3MediaStore {
    client: S3Client,
    policy: ServiceConfig,
}

impl S3MediaStore {
    pub fn new(client: S3Client) -> Self {
        Self {
            client,
            policy: object_storage_config(),
        }
    }
}

fn media_error(err: impl std::fmt::Display) -> AppError {
    AppError::ExternalService {
        service: "media store",
        message: err.to_string(),
    }
}

#[async_trait]
impl MediaStore for S3MediaStore {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        content_type: &str,
        extension: Option<&str>,
    ) -> Result<MediaRef> {
        let operations = self.client.operations();
        let stored = with_retry_if(
            &self.policy.retry,
            |_| true,
            || {
                with_timeout_result(
                    self.policy.timeout.duration,
                    operations.upload(bytes.clone(), content_type, extension),
                )
            },
        )
        .await
        .map_err(media_error)?;

        Ok(MediaRef {
            id: stored.key,
            url: stored.url,
        })
    }

    async fn delete(&self, media_id: &str) -> Result<()> {
        let operations = self.client.operations();
        with_retry_if(
            &self.policy.retry,
            |_| true,
            || with_timeout_result(self.policy.timeout.duration, operations.delete(media_id)),
        )
        .await
        .map_err(media_error)
    }

    async fn health_check(&self) -> Result<()> {
        self.client.health_check().await.map_err(media_error)
    }
}

/// Media store kept in process memory, used by the memory backend and tests.
#[derive(Default)]
pub struct InMemoryMediaStore {
    objects: Mutex<HashMap<String, StoredBlob>>,
    fail_uploads: AtomicBool,
    fail_deletes: AtomicBool,
}

#[derive(Debug, Clone)]
struct StoredBlob {
    content_type: String,
    size: usize,
}

impl InMemoryMediaStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn contains(&self, media_id: &str) -> bool {
        self.objects.lock().contains_key(media_id)
    }

    pub fn len(&self) -> usize {
        self.objects.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn content_type(&self, media_id: &str) -> Option<String> {
        self.objects
            .lock()
            .get(media_id)
            .map(|blob| blob.content_type.clone())
    }

    pub fn size_of(&self, media_id: &str) -> Option<usize> {
        self.objects.lock().get(media_id).map(|blob| blob.size)
    }
}

#[async_trait]
impl MediaStore for InMemoryMediaStore {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        content_type: &str,
        extension: Option<&str>,
    ) -> Result<MediaRef> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(media_error("upload rejected"));
        }
        let id = match extension {
            Some(ext) => format!("uploads/{}.{}", Uuid::new_v4(), ext),
            None => format!("uploads/{}", Uuid::new_v4()),
        };
        self.objects.lock().insert(
            id.clone(),
            StoredBlob {
                content_type: content_type.to_string(),
                size: bytes.len(),
            },
        );
        let url = format!("memory://{id}");
        Ok(MediaRef { id, url })
    }

    async fn delete(&self, media_id: &str) -> Result<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(media_error("delete rejected"));
        }
        self.objects.lock().remove(media_id);
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

/// A file received from a client and written to the local staging directory.
///
/// The staged file is removed when the upload is consumed or the value is
/// dropped, whichever comes first.
#[derive(Debug)]
pub struct StagedUpload {
    path: PathBuf,
    content_type: String,
    original_name: Option<String>,
    size: usize,
    removed: bool,
}

impl StagedUpload {
    pub fn new(
        path: PathBuf,
        content_type: impl Into<String>,
        original_name: Option<String>,
        size: usize,
    ) -> Self {
        Self {
            path,
            content_type: content_type.into(),
            original_name,
            size,
            removed: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Lower-cased extension of the client's file name, if any.
    pub fn extension(&self) -> Option<String> {
        self.original_name
            .as_deref()
            .and_then(|name| Path::new(name).extension())
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
    }

    async fn discard(mut self) {
        self.removed = true;
        if let Err(err) = tokio::fs::remove_file(&self.path).await {
            if err.kind() != std::io::ErrorKind::NotFound {
                metrics::record_side_effect_failure("staged_file");
                warn!(path = %self.path.display(), error = %err, "failed to remove staged upload");
            }
        }
    }
}

impl Drop for StagedUpload {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        if let Err(err) = std::fs::remove_file(&self.path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                metrics::record_side_effect_failure("staged_file");
                warn!(path = %self.path.display(), error = %err, "failed to remove staged upload");
            }
        }
    }
}

/// Push a staged file to the media store. The local copy is removed whether or
/// not the upload succeeds.
pub async fn upload_staged(media: &dyn MediaStore, staged: StagedUpload) -> Result<MediaRef> {
    let result = match tokio::fs::read(staged.path()).await {
        Ok(bytes) => {
            let extension = staged.extension();
            media
                .upload(bytes, staged.content_type(), extension.as_deref())
                .await
        }
        Err(err) => Err(AppError::Internal(format!(
            "failed to read staged upload: {err}"
        ))),
    };
    staged.discard().await;
    result
}

/// Upload several staged files. If any upload fails, the ones that already
/// succeeded are removed again and the first error is returned.
pub async fn upload_all(media: &dyn MediaStore, staged: Vec<StagedUpload>) -> Result<Vec<MediaRef>> {
    let mut uploaded = Vec::with_capacity(staged.len());
    let mut pending = staged.into_iter();

    while let Some(file) = pending.next() {
        match upload_staged(media, file).await {
            Ok(media_ref) => uploaded.push(media_ref),
            Err(err) => {
                drop(pending);
                remove_media(media, &uploaded).await;
                return Err(err);
            }
        }
    }
    Ok(uploaded)
}

/// Best-effort removal of objects that are not referenced by any record.
/// Returns the ids that could not be removed.
pub async fn remove_media(media: &dyn MediaStore, objects: &[MediaRef]) -> Vec<String> {
    let mut orphaned = Vec::new();
    for object in objects {
        if let Err(err) = media.delete(&object.id).await {
            metrics::record_side_effect_failure("orphaned_media");
            warn!(media_id = %object.id, error = %err, "media left orphaned");
            orphaned.push(object.id.clone());
        }
    }
    orphaned
}

/// Clean up uploads after a failed unit.
///
/// When the commit outcome is unknown the record may reference the objects, so
/// they are kept and reported as possible orphans instead of being deleted.
pub async fn release_after_abort(
    media: &dyn MediaStore,
    objects: &[MediaRef],
    err: &AppError,
) -> Vec<String> {
    if !err.commit_outcome_unknown() {
        return remove_media(media, objects).await;
    }
    for object in objects {
        metrics::record_side_effect_failure("unconfirmed_media");
        warn!(media_id = %object.id, error = %err, "commit outcome unknown, keeping uploaded media");
    }
    objects.iter().map(|object| object.id.clone()).collect()
}
