//! Raw and processed publishers.
//!
//! Files are uploaded to `{layer}/{YYYY}/{MM}/{DD}/{filename}`. A put to an
//! existing key replaces the object, so re-publishing a date never creates
//! duplicates.

use chrono::NaiveDate;
use movieflow_protocol::{object_key, ObjectLayer};
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::config::StorageConfig;
use crate::credentials::Connection;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("object store error: {0}")]
    Store(#[from] object_store::Error),

    #[error("invalid storage configuration: {0}")]
    Config(String),
}

/// Uploads local files into one bucket.
#[derive(Debug, Clone)]
pub struct ObjectPublisher {
    store: Arc<dyn ObjectStore>,
    bucket: String,
}

impl ObjectPublisher {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
        }
    }

    /// S3 client for `storage.bucket`. Keys come from the `aws_conn`
    /// connection (`login` / `password`, `region_name` in `extra`); without a
    /// connection the default AWS environment chain applies.
    pub fn s3(storage: &StorageConfig, conn: Option<&Connection>) -> Result<Self, PublishError> {
        let mut builder = AmazonS3Builder::from_env().with_bucket_name(&storage.bucket);

        let region = conn
            .and_then(|c| c.extra.get("region_name").cloned())
            .or_else(|| storage.region.clone());
        if let Some(region) = region {
            builder = builder.with_region(region);
        }
        if let Some(conn) = conn {
            if let Some(key_id) = &conn.login {
                builder = builder.with_access_key_id(key_id);
            }
            if let Some(secret) = &conn.password {
                builder = builder.with_secret_access_key(secret);
            }
        }
        if let Some(endpoint) = &storage.endpoint {
            builder = builder
                .with_endpoint(endpoint)
                .with_allow_http(endpoint.starts_with("http://"));
        }

        let store = builder
            .build()
            .map_err(|e| PublishError::Config(e.to_string()))?;
        Ok(Self::new(Arc::new(store), storage.bucket.clone()))
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Upload `local` under the date-partitioned key for `layer`.
    pub async fn publish_file(
        &self,
        local: &Path,
        layer: ObjectLayer,
        date: NaiveDate,
    ) -> Result<String, PublishError> {
        let filename = local
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| PublishError::Config(format!("no file name in {}", local.display())))?;
        let key = object_key(layer, date, filename);

        let body = tokio::fs::read(local).await.map_err(|source| PublishError::Io {
            path: local.to_path_buf(),
            source,
        })?;
        let size = body.len();
        self.store
            .put(&ObjectPath::from(key.as_str()), PutPayload::from(body))
            .await?;

        info!(
            bucket = %self.bucket,
            key = %key,
            bytes = size,
            "Published {}",
            local.display()
        );
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::memory::InMemory;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 5).unwrap()
    }

    #[tokio::test]
    async fn republishing_overwrites_the_same_key() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("movies_2024-01-05.csv");
        let store = Arc::new(InMemory::new());
        let publisher = ObjectPublisher::new(store.clone(), "kaggle-movies");

        std::fs::write(&file, "id\n1\n").unwrap();
        let first = publisher
            .publish_file(&file, ObjectLayer::Raw, date())
            .await
            .unwrap();
        std::fs::write(&file, "id\n2\n").unwrap();
        let second = publisher
            .publish_file(&file, ObjectLayer::Raw, date())
            .await
            .unwrap();

        assert_eq!(first, "raw/2024/01/05/movies_2024-01-05.csv");
        assert_eq!(first, second);
        let body = store
            .get(&ObjectPath::from(first.as_str()))
            .await
            .unwrap()
            .bytes()
            .await
            .unwrap();
        assert_eq!(&body[..], b"id\n2\n");
    }

    #[tokio::test]
    async fn missing_local_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = ObjectPublisher::new(Arc::new(InMemory::new()), "kaggle-movies");
        let err = publisher
            .publish_file(&dir.path().join("absent.parquet"), ObjectLayer::Processed, date())
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::Io { .. }));
    }

    #[test]
    fn s3_publisher_builds_from_connection() {
        let storage = StorageConfig {
            bucket: "kaggle-movies".to_string(),
            region: Some("eu-west-1".to_string()),
            endpoint: Some("http://localhost:9000".to_string()),
        };
        let conn = Connection {
            login: Some("AKIAEXAMPLE".into()),
            password: Some("secret".into()),
            ..Connection::default()
        };
        let publisher = ObjectPublisher::s3(&storage, Some(&conn)).unwrap();
        assert_eq!(publisher.bucket(), "kaggle-movies");
    }
}
