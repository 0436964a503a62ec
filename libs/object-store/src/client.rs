use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use chrono::{DateTime, Utc};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::error::{ObjectStoreError, Stage};

/// The two named buckets the pipeline talks to. Source holds the uploaded
/// originals; output holds emitted HLS bundles and thumbnails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Source,
    Output,
}

#[derive(Debug, Clone)]
pub struct ObjectInfo {
    pub size: i64,
    pub etag: Option<String>,
    pub content_type: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct UploadResult {
    pub size: i64,
    pub etag: Option<String>,
    pub uploaded_at: DateTime<Utc>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn download(
        &self,
        key: &str,
        local_path: &Path,
        bucket: Bucket,
    ) -> Result<(), ObjectStoreError>;

    async fn upload(
        &self,
        local_path: &Path,
        key: &str,
        content_type: &str,
        bucket: Bucket,
    ) -> Result<UploadResult, ObjectStoreError>;

    async fn head(&self, key: &str, bucket: Bucket) -> Result<Option<ObjectInfo>, ObjectStoreError>;

    async fn list(
        &self,
        prefix: &str,
        max: i32,
        bucket: Bucket,
    ) -> Result<Vec<String>, ObjectStoreError>;

    async fn delete(&self, key: &str, bucket: Bucket) -> Result<(), ObjectStoreError>;

    fn public_url(&self, key: &str, bucket: Bucket) -> String;
}

/// Credentials and bucket configuration for the B2 S3-compatible endpoint,
/// read from the `B2_*` environment variables.
#[derive(Debug, Clone)]
pub struct ObjectStoreConfig {
    pub endpoint: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub source_bucket: String,
    pub output_bucket: String,
}

impl ObjectStoreConfig {
    pub fn from_env() -> Result<Self, String> {
        let required = |name: &str| -> Result<String, String> {
            std::env::var(name).map_err(|_| format!("missing required env var {name}"))
        };
        Ok(ObjectStoreConfig {
            endpoint: required("B2_ENDPOINT")?,
            region: std::env::var("B2_REGION").unwrap_or_else(|_| "us-west-000".to_string()),
            access_key_id: required("B2_ACCESS_KEY_ID")?,
            secret_access_key: required("B2_SECRET_ACCESS_KEY")?,
            source_bucket: required("B2_SOURCE_BUCKET")?,
            output_bucket: required("B2_OUTPUT_BUCKET")?,
        })
    }
}

/// S3-compatible object store client (Backblaze B2). Authorization is lazy:
/// the underlying `aws_sdk_s3::Client` is built once behind a `OnceCell`, so
/// concurrent first callers coalesce onto a single in-flight construction
/// rather than racing to authenticate independently.
pub struct S3ObjectStore {
    config: ObjectStoreConfig,
    client: OnceCell<Client>,
}

impl S3ObjectStore {
    pub fn new(config: ObjectStoreConfig) -> Self {
        S3ObjectStore {
            config,
            client: OnceCell::new(),
        }
    }

    async fn client(&self) -> Result<&Client, ObjectStoreError> {
        self.client
            .get_or_try_init(|| async {
                let credentials = aws_sdk_s3::config::Credentials::new(
                    &self.config.access_key_id,
                    &self.config.secret_access_key,
                    None,
                    None,
                    "object-store-client",
                );
                let s3_config = aws_sdk_s3::config::Builder::new()
                    .region(aws_sdk_s3::config::Region::new(self.config.region.clone()))
                    .endpoint_url(&self.config.endpoint)
                    .credentials_provider(credentials)
                    .behavior_version(aws_sdk_s3::config::BehaviorVersion::latest())
                    .build();
                debug!(endpoint = %self.config.endpoint, "authorizing object store client");
                Ok::<_, ObjectStoreError>(Client::from_conf(s3_config))
            })
            .await
    }

    fn bucket_name(&self, bucket: Bucket) -> &str {
        match bucket {
            Bucket::Source => &self.config.source_bucket,
            Bucket::Output => &self.config.output_bucket,
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn download(
        &self,
        key: &str,
        local_path: &Path,
        bucket: Bucket,
    ) -> Result<(), ObjectStoreError> {
        let client = self.client().await?;
        let bucket_name = self.bucket_name(bucket);
        let output = client
            .get_object()
            .bucket(bucket_name)
            .key(key)
            .send()
            .await
            .map_err(|e| classify_sdk_error(Stage::Download, &e.to_string()))?;

        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ObjectStoreError::new(Stage::Download, true, e.to_string()))?;
        }

        let mut body = output.body.into_async_read();
        let mut file = tokio::fs::File::create(local_path)
            .await
            .map_err(|e| ObjectStoreError::new(Stage::Download, true, e.to_string()))?;
        tokio::io::copy(&mut body, &mut file)
            .await
            .map_err(|e| ObjectStoreError::new(Stage::Download, true, e.to_string()))?;
        Ok(())
    }

    async fn upload(
        &self,
        local_path: &Path,
        key: &str,
        content_type: &str,
        bucket: Bucket,
    ) -> Result<UploadResult, ObjectStoreError> {
        let client = self.client().await?;
        let bucket_name = self.bucket_name(bucket);
        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|e| ObjectStoreError::new(Stage::Upload, false, e.to_string()))?;
        let metadata = tokio::fs::metadata(local_path)
            .await
            .map_err(|e| ObjectStoreError::new(Stage::Upload, true, e.to_string()))?;

        let response = client
            .put_object()
            .bucket(bucket_name)
            .key(key)
            .content_type(content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| classify_sdk_error(Stage::Upload, &e.to_string()))?;

        Ok(UploadResult {
            size: metadata.len() as i64,
            etag: response.e_tag().map(|s| s.trim_matches('"').to_string()),
            uploaded_at: Utc::now(),
        })
    }

    async fn head(&self, key: &str, bucket: Bucket) -> Result<Option<ObjectInfo>, ObjectStoreError> {
        let client = self.client().await?;
        let bucket_name = self.bucket_name(bucket);
        match client.head_object().bucket(bucket_name).key(key).send().await {
            Ok(output) => Ok(Some(ObjectInfo {
                size: output.content_length().unwrap_or(0),
                etag: output.e_tag().map(|s| s.trim_matches('"').to_string()),
                content_type: output.content_type().map(|s| s.to_string()),
                last_modified: output
                    .last_modified()
                    .and_then(|d| DateTime::from_timestamp(d.secs(), 0)),
            })),
            Err(e) => {
                let msg = e.to_string();
                if msg.contains("404") || msg.contains("NotFound") {
                    warn!(%key, "object store head miss");
                    Ok(None)
                } else {
                    Err(classify_sdk_error(Stage::List, &msg))
                }
            }
        }
    }

    async fn list(
        &self,
        prefix: &str,
        max: i32,
        bucket: Bucket,
    ) -> Result<Vec<String>, ObjectStoreError> {
        let client = self.client().await?;
        let bucket_name = self.bucket_name(bucket);
        let output = client
            .list_objects_v2()
            .bucket(bucket_name)
            .prefix(prefix)
            .max_keys(max)
            .send()
            .await
            .map_err(|e| classify_sdk_error(Stage::List, &e.to_string()))?;
        Ok(output
            .contents()
            .iter()
            .filter_map(|o| o.key().map(|s| s.to_string()))
            .collect())
    }

    async fn delete(&self, key: &str, bucket: Bucket) -> Result<(), ObjectStoreError> {
        let client = self.client().await?;
        let bucket_name = self.bucket_name(bucket);
        client
            .delete_object()
            .bucket(bucket_name)
            .key(key)
            .send()
            .await
            .map_err(|e| classify_sdk_error(Stage::Delete, &e.to_string()))?;
        Ok(())
    }

    fn public_url(&self, key: &str, bucket: Bucket) -> String {
        let bucket_name = self.bucket_name(bucket);
        format!("{}/{}/{}", self.config.endpoint.trim_end_matches('/'), bucket_name, key)
    }
}

/// Maps an SDK error's display string to a retriable/terminal split: network
/// and 5xx errors retry, 4xx (other than 401) don't.
fn classify_sdk_error(stage: Stage, message: &str) -> ObjectStoreError {
    if message.contains("NoSuchBucket") || message.contains("403") || message.contains("Forbidden")
    {
        ObjectStoreError::new(stage, false, message.to_string())
    } else if message.contains("401") || message.contains("Unauthorized") {
        ObjectStoreError::new(stage, true, message.to_string())
    } else if message.contains("timeout")
        || message.contains("dispatch failure")
        || message.contains("connect")
    {
        ObjectStoreError::new(stage, true, message.to_string())
    } else {
        // Unrecognized shapes default to retriable: a Backblaze-side 5xx is
        // more likely than a novel client error here.
        ObjectStoreError::new(stage, true, message.to_string())
    }
}

pub type SharedObjectStore = Arc<dyn ObjectStore>;

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ObjectStoreConfig {
        ObjectStoreConfig {
            endpoint: "https://s3.us-west-000.backblazeb2.com/".to_string(),
            region: "us-west-000".to_string(),
            access_key_id: "key".to_string(),
            secret_access_key: "secret".to_string(),
            source_bucket: "nova-source".to_string(),
            output_bucket: "nova-output".to_string(),
        }
    }

    #[test]
    fn forbidden_and_missing_bucket_are_not_retriable() {
        assert!(!classify_sdk_error(Stage::Upload, "NoSuchBucket").retriable);
        assert!(!classify_sdk_error(Stage::Upload, "403 Forbidden").retriable);
    }

    #[test]
    fn auth_and_transient_errors_are_retriable() {
        assert!(classify_sdk_error(Stage::Download, "401 Unauthorized").retriable);
        assert!(classify_sdk_error(Stage::Download, "connection timeout").retriable);
        assert!(classify_sdk_error(Stage::Download, "dispatch failure").retriable);
    }

    #[test]
    fn unrecognized_error_shape_defaults_retriable() {
        assert!(classify_sdk_error(Stage::List, "something unexpected").retriable);
    }

    #[test]
    fn public_url_joins_endpoint_bucket_and_key() {
        let store = S3ObjectStore::new(config());
        let url = store.public_url("demo/index.m3u8", Bucket::Output);
        assert_eq!(url, "https://s3.us-west-000.backblazeb2.com/nova-output/demo/index.m3u8");
    }

    #[test]
    fn bucket_name_resolves_source_and_output_separately() {
        let store = S3ObjectStore::new(config());
        assert_eq!(store.bucket_name(Bucket::Source), "nova-source");
        assert_eq!(store.bucket_name(Bucket::Output), "nova-output");
    }

    #[test]
    fn from_status_retries_5xx_and_auth_but_not_other_4xx() {
        assert!(ObjectStoreError::from_status(Stage::Upload, 503, "unavailable").retriable);
        assert!(ObjectStoreError::from_status(Stage::Upload, 401, "expired").retriable);
        assert!(!ObjectStoreError::from_status(Stage::Upload, 404, "missing").retriable);
    }
}
