/// S3 operations for media upload and removal
use crate::config::S3Config;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum S3Error {
    #[error("S3 request failed: {0}")]
    Request(String),
}

/// An object written by [`S3Operations::upload`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    pub url: String,
}

#[derive(Clone)]
pub struct S3Operations {
    client: Arc<Client>,
    config: S3Config,
}

impl S3Operations {
    pub fn new(client: Arc<Client>, config: S3Config) -> Self {
        Self { client, config }
    }

    /// Build a fresh, collision-free key keeping the original extension
    pub fn new_key(&self, extension: Option<&str>) -> String {
        let id = Uuid::new_v4();
        match extension.filter(|e| !e.is_empty()) {
            Some(ext) => format!("{}/{}.{}", self.config.key_prefix, id, ext.to_ascii_lowercase()),
            None => format!("{}/{}", self.config.key_prefix, id),
        }
    }

    /// Upload bytes under a new key
    pub async fn upload(
        &self,
        body: Vec<u8>,
        content_type: &str,
        extension: Option<&str>,
    ) -> Result<StoredObject, S3Error> {
        let key = self.new_key(extension);
        debug!(bucket = %self.config.bucket, %key, size = body.len(), "uploading object");

        self.client
            .put_object()
            .bucket(&self.config.bucket)
            .key(&key)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| S3Error::Request(e.to_string()))?;

        let url = self.config.public_url(&key);
        Ok(StoredObject { key, url })
    }

    /// Delete object by key
    pub async fn delete(&self, key: &str) -> Result<(), S3Error> {
        debug!(bucket = %self.config.bucket, %key, "deleting object");

        self.client
            .delete_object()
            .bucket(&self.config.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| S3Error::Request(e.to_string()))?;

        Ok(())
    }
}
