/// Multipart form staging
///
/// File parts are streamed to the local upload directory and returned as
/// [`StagedUpload`]s, which remove themselves once consumed or dropped. Text
/// parts are collected as plain fields.
use crate::config::UploadConfig;
use crate::error::{AppError, Result};
use crate::media::StagedUpload;
use actix_multipart::{Field, Multipart};
use futures_util::stream::StreamExt;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

const MAX_TEXT_FIELD_BYTES: usize = 64 * 1024;

/// A parsed multipart body
#[derive(Debug, Default)]
pub struct StagedForm {
    pub fields: HashMap<String, String>,
    pub files: Vec<StagedUpload>,
}

impl StagedForm {
    pub fn text(&mut self, name: &str) -> Option<String> {
        self.fields.remove(name)
    }

    /// Take the single staged file, rejecting bodies that carry more.
    pub fn single_file(&mut self) -> Result<Option<StagedUpload>> {
        if self.files.len() > 1 {
            return Err(AppError::Validation("Only one file may be attached".into()));
        }
        Ok(self.files.pop())
    }
}

/// Whether a content type may be uploaded at all
pub fn is_accepted_type(content_type: &str) -> bool {
    content_type.starts_with("image/") || content_type == "application/pdf"
}

fn malformed(err: impl std::fmt::Display) -> AppError {
    AppError::Validation(format!("Malformed multipart body: {err}"))
}

/// Read a whole multipart body, staging files under `config.dir`.
pub async fn stage_multipart(mut payload: Multipart, config: &UploadConfig) -> Result<StagedForm> {
    tokio::fs::create_dir_all(&config.dir).await?;
    let mut form = StagedForm::default();

    while let Some(item) = payload.next().await {
        let mut field = item.map_err(malformed)?;
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .map(str::to_string);

        let Some(file_name) = file_name else {
            let value = read_text(&mut field).await?;
            form.fields.insert(name, value);
            continue;
        };

        if form.files.len() >= config.max_files {
            return Err(AppError::Validation(format!(
                "At most {} files may be uploaded",
                config.max_files
            )));
        }
        let content_type = field
            .content_type()
            .map(|mime| mime.essence_str().to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string());
        if !is_accepted_type(&content_type) {
            return Err(AppError::Validation(format!(
                "Unsupported file type {content_type}; only images and PDF documents are accepted"
            )));
        }

        let path = staging_path(&config.dir, &file_name);
        match write_file(&mut field, &path, config.max_file_bytes).await {
            Ok(size) => {
                debug!(field = %name, file = %file_name, size, "upload staged");
                form.files
                    .push(StagedUpload::new(path, content_type, Some(file_name), size));
            }
            Err(err) => {
                let _ = tokio::fs::remove_file(&path).await;
                return Err(err);
            }
        }
    }

    Ok(form)
}

fn staging_path(dir: &Path, file_name: &str) -> PathBuf {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_default();
    dir.join(format!("{}{}", Uuid::new_v4(), extension))
}

async fn write_file(field: &mut Field, path: &Path, limit: usize) -> Result<usize> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut written = 0usize;
    while let Some(chunk) = field.next().await {
        let chunk = chunk.map_err(malformed)?;
        written += chunk.len();
        if written > limit {
            return Err(AppError::Validation(format!(
                "File exceeds the {} MiB limit",
                limit / (1024 * 1024)
            )));
        }
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    Ok(written)
}

async fn read_text(field: &mut Field) -> Result<String> {
    let mut buffer = Vec::new();
    while let Some(chunk) = field.next().await {
        let chunk = chunk.map_err(malformed)?;
        if buffer.len() + chunk.len() > MAX_TEXT_FIELD_BYTES {
            return Err(AppError::Validation("Text field is too large".into()));
        }
        buffer.extend_from_slice(&chunk);
    }
    String::from_utf8(buffer).map_err(|_| AppError::Validation("Text field is not UTF-8".into()))
}
