use async_trait::async_trait;
use aws_sdk_s3 as s3;
use s3::primitives::ByteStream;
use std::sync::{Arc, Mutex};

use crate::models::ListingImage;

/// StorageService
///
/// The abstract contract for the asset store: accept an image upload and hand
/// back a stable public URL plus the object key needed to delete it later.
/// The concrete client (`S3StorageClient`) is swapped for the in-memory
/// `MockStorageService` in tests.
///
/// Deletions are best-effort: a crash between the row mutation and the asset
/// calls can orphan remote objects, which is accepted rather than remediated.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Ensures the configured bucket exists. Used in the local setup to
    /// provision MinIO automatically; a no-op against provisioned buckets.
    async fn ensure_bucket_exists(&self);

    /// Uploads an image body under `key` and returns the stored asset
    /// reference (public URL + deletable key).
    async fn upload_image(
        &self,
        key: &str,
        content_type: &str,
        data: Vec<u8>,
    ) -> Result<ListingImage, String>;

    /// Removes a previously stored object. Idempotent at the S3 level.
    async fn delete_image(&self, key: &str) -> Result<(), String>;
}

/// The concrete type used to share the storage service across the
/// application state.
pub type StorageState = Arc<dyn StorageService>;

/// S3StorageClient
///
/// The real implementation over the AWS SDK. S3 compatibility covers both the
/// local Dockerized MinIO instance and the production object store; the
/// `force_path_style(true)` setting is required for both gateways.
#[derive(Clone)]
pub struct S3StorageClient {
    client: s3::Client,
    endpoint: String,
    bucket_name: String,
}

impl S3StorageClient {
    pub async fn new(
        endpoint: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
        bucket: &str,
    ) -> Self {
        let credentials =
            s3::config::Credentials::new(access_key, secret_key, None, None, "static");

        let config = s3::Config::builder()
            .credentials_provider(credentials)
            .endpoint_url(endpoint)
            .region(s3::config::Region::new(region.to_string()))
            .behavior_version_latest()
            .force_path_style(true)
            .build();

        Self {
            client: s3::Client::from_conf(config),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            bucket_name: bucket.to_string(),
        }
    }

    /// Path-style public URL for a stored object.
    fn object_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint, self.bucket_name, key)
    }
}

#[async_trait]
impl StorageService for S3StorageClient {
    async fn ensure_bucket_exists(&self) {
        // CreateBucket is idempotent; safe to call at startup.
        let _ = self
            .client
            .create_bucket()
            .bucket(&self.bucket_name)
            .send()
            .await;
    }

    async fn upload_image(
        &self,
        key: &str,
        content_type: &str,
        data: Vec<u8>,
    ) -> Result<ListingImage, String> {
        // Same key normalization as the mock, so the two never diverge.
        let key = sanitize_key(key);
        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(&key)
            .content_type(content_type)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| e.to_string())?;

        Ok(ListingImage {
            url: self.object_url(&key),
            key,
        })
    }

    async fn delete_image(&self, key: &str) -> Result<(), String> {
        self.client
            .delete_object()
            .bucket(&self.bucket_name)
            .key(key)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        Ok(())
    }
}

/// sanitize_key
///
/// Strips directory-navigation components from a user-influenced key segment
/// before it is used as an object path.
pub fn sanitize_key(key: &str) -> String {
    key.split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".." && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// MockStorageService
///
/// In-memory stand-in for unit and integration tests. Records deletions so
/// tests can assert that replaced or removed listings release their assets.
#[derive(Clone, Default)]
pub struct MockStorageService {
    /// When true, all operations return a simulated failure.
    pub should_fail: bool,
    pub deleted_keys: Arc<Mutex<Vec<String>>>,
}

impl MockStorageService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl StorageService for MockStorageService {
    async fn ensure_bucket_exists(&self) {}

    async fn upload_image(
        &self,
        key: &str,
        _content_type: &str,
        _data: Vec<u8>,
    ) -> Result<ListingImage, String> {
        if self.should_fail {
            return Err("mock storage failure".to_string());
        }

        let sanitized = sanitize_key(key);
        Ok(ListingImage {
            url: format!("http://localhost:9000/mock-bucket/{sanitized}"),
            key: sanitized,
        })
    }

    async fn delete_image(&self, key: &str) -> Result<(), String> {
        if self.should_fail {
            return Err("mock storage failure".to_string());
        }
        self.deleted_keys
            .lock()
            .expect("mock storage lock poisoned")
            .push(key.to_string());
        Ok(())
    }
}
