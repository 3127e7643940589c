//! Durable storage for uploaded invoice files
//!
//! Objects are keyed `invoices/{user_id}/{uuid}.{ext}` and referenced by an
//! `s3://{bucket}/{key}` locator, which is what ends up in `invoices.file_path`.

use crate::config::StorageConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, instrument};
use uuid::Uuid;

const LOCATOR_SCHEME: &str = "s3://";

/// Blob storage for invoice files
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `content` under `key` and return its locator
    async fn put(&self, content: Vec<u8>, key: &str, content_type: &str) -> Result<String>;

    /// Remove the object a locator points to
    async fn delete(&self, locator: &str) -> Result<()>;
}

/// Object key for a new upload
pub fn object_key(user_id: i32, file_name: &str) -> String {
    match file_extension(file_name) {
        Some(ext) => format!("invoices/{}/{}.{}", user_id, Uuid::new_v4(), ext),
        None => format!("invoices/{}/{}", user_id, Uuid::new_v4()),
    }
}

fn file_extension(file_name: &str) -> Option<&str> {
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext)
}

pub fn locator(bucket: &str, key: &str) -> String {
    format!("{}{}/{}", LOCATOR_SCHEME, bucket, key)
}

/// Split a locator into `(bucket, key)`
pub fn parse_locator(locator: &str) -> Result<(&str, &str)> {
    locator
        .strip_prefix(LOCATOR_SCHEME)
        .and_then(|rest| rest.split_once('/'))
        .filter(|(bucket, key)| !bucket.is_empty() && !key.is_empty())
        .ok_or_else(|| AppError::StorageError {
            message: format!("Not an s3 locator: {}", locator),
        })
}

/// S3-backed store
#[derive(Clone, Debug)]
pub struct S3BlobStore {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3BlobStore {
    pub fn new(client: aws_sdk_s3::Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// Build a client from config; a custom endpoint switches to path-style addressing
    pub async fn from_config(config: &StorageConfig) -> Self {
        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_types::region::Region::new(config.region.clone()))
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self::new(aws_sdk_s3::Client::from_conf(builder.build()), config.bucket.clone())
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    #[instrument(skip(self, content), fields(bucket = %self.bucket, size = content.len()))]
    async fn put(&self, content: Vec<u8>, key: &str, content_type: &str) -> Result<String> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(content))
            .send()
            .await
            .map_err(|e| AppError::StorageError {
                message: format!("Failed to upload {}: {}", key, e),
            })?;

        debug!("Stored invoice file");
        Ok(locator(&self.bucket, key))
    }

    #[instrument(skip(self))]
    async fn delete(&self, locator: &str) -> Result<()> {
        let (bucket, key) = parse_locator(locator)?;

        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| AppError::StorageError {
                message: format!("Failed to delete {}: {}", locator, e),
            })?;

        Ok(())
    }
}

/// In-memory store for tests and local runs
pub struct InMemoryBlobStore {
    bucket: String,
    objects: RwLock<HashMap<String, (Vec<u8>, String)>>,
}

impl Default for InMemoryBlobStore {
    fn default() -> Self {
        Self {
            bucket: "memory".to_string(),
            objects: RwLock::new(HashMap::new()),
        }
    }
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Content and content type stored under a locator
    pub async fn get(&self, locator: &str) -> Option<(Vec<u8>, String)> {
        let (_, key) = parse_locator(locator).ok()?;
        self.objects.read().await.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put(&self, content: Vec<u8>, key: &str, content_type: &str) -> Result<String> {
        self.objects
            .write()
            .await
            .insert(key.to_string(), (content, content_type.to_string()));
        Ok(locator(&self.bucket, key))
    }

    async fn delete(&self, locator: &str) -> Result<()> {
        let (_, key) = parse_locator(locator)?;
        self.objects.write().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_key_layout() {
        let key = object_key(7, "facture mars.pdf");
        assert!(key.starts_with("invoices/7/"));
        assert!(key.ends_with(".pdf"));

        let key = object_key(7, "noextension");
        assert!(!key.contains('.'));
    }

    #[test]
    fn test_parse_locator() {
        assert_eq!(
            parse_locator("s3://invoice-files/invoices/1/a.pdf").unwrap(),
            ("invoice-files", "invoices/1/a.pdf")
        );
        assert!(parse_locator("/tmp/a.pdf").is_err());
        assert!(parse_locator("s3://bucket-only").is_err());
        assert!(parse_locator("https://bucket/key").is_err());
    }

    #[tokio::test]
    async fn test_in_memory_put_and_delete() {
        let store = InMemoryBlobStore::new();
        let locator = store
            .put(b"%PDF".to_vec(), "invoices/1/x.pdf", "application/pdf")
            .await
            .unwrap();

        assert_eq!(locator, "s3://memory/invoices/1/x.pdf");
        let (content, content_type) = store.get(&locator).await.unwrap();
        assert_eq!(content, b"%PDF");
        assert_eq!(content_type, "application/pdf");

        store.delete(&locator).await.unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_delete_rejects_foreign_locator() {
        let store = InMemoryBlobStore::new();
        let err = store.delete("file:///etc/passwd").await.unwrap_err();
        assert!(matches!(err, AppError::StorageError { .. }));
    }
}
