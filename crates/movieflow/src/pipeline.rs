//! The daily movies pipeline.
//!
//! [`MoviePipeline`] owns the long-lived collaborators (catalog, object
//! store, both database targets, staging paths). Each logical date gets a
//! [`DailyRun`] that executes the graph tasks against an immutable
//! [`RunContext`].

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use movieflow_db::MovieStore;
use movieflow_protocol::defaults::{AWS_CONN_ID, KAGGLE_CONN_ID};
use movieflow_protocol::naming::{CSV_EXTENSION, PARQUET_EXTENSION, SOURCE_FILENAME};
use movieflow_protocol::{ObjectLayer, RequestedParams, RunContext, TaskId};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::catalog::{DatasetCatalog, KaggleClient, KaggleCredentials};
use crate::cleanup::remove_files_with_extension;
use crate::config::{PipelineConfig, StorageConfig};
use crate::credentials::{CredentialError, CredentialStore};
use crate::error::TaskError;
use crate::fetch::fetch_datasets;
use crate::publish::ObjectPublisher;
use crate::runner::{run_graph, RetryPolicy, RunReport, TaskExecutor};

/// Where the fetcher gets its catalog client.
#[derive(Clone)]
pub enum CatalogSource {
    /// Build a Kaggle client per fetch from the `kaggle_conn` credentials.
    Kaggle {
        credentials: Arc<dyn CredentialStore>,
        base_url: String,
    },
    /// A ready client (tests, alternative catalogs).
    Fixed(Arc<dyn DatasetCatalog>),
}

impl CatalogSource {
    fn catalog(&self) -> Result<Arc<dyn DatasetCatalog>, TaskError> {
        match self {
            CatalogSource::Fixed(catalog) => Ok(Arc::clone(catalog)),
            CatalogSource::Kaggle {
                credentials,
                base_url,
            } => {
                let conn = credentials.connection(KAGGLE_CONN_ID).map_err(|e| match e {
                    CredentialError::NotFound(_) => {
                        TaskError::authentication("catalog credentials are not configured", e)
                    }
                    other => TaskError::from(other),
                })?;
                let creds = KaggleCredentials::from_connection(&conn)?;
                Ok(Arc::new(KaggleClient::new(creds, base_url.clone())?))
            }
        }
    }
}

/// Where the publishers get their object store.
#[derive(Clone)]
pub enum StoreSource {
    /// S3 client from `[storage]` and the `aws_conn` connection.
    S3 {
        storage: StorageConfig,
        credentials: Arc<dyn CredentialStore>,
    },
    Fixed(ObjectPublisher),
}

impl StoreSource {
    fn publisher(&self) -> Result<ObjectPublisher, TaskError> {
        match self {
            StoreSource::Fixed(publisher) => Ok(publisher.clone()),
            StoreSource::S3 {
                storage,
                credentials,
            } => {
                let conn = match credentials.connection(AWS_CONN_ID) {
                    Ok(conn) => Some(conn),
                    Err(CredentialError::NotFound(_)) => None,
                    Err(other) => return Err(other.into()),
                };
                Ok(ObjectPublisher::s3(storage, conn.as_ref())?)
            }
        }
    }
}

/// One relational target, connected on first use.
pub struct DatabaseTarget {
    conn_id: String,
    url: Option<String>,
    store: OnceCell<MovieStore>,
}

impl DatabaseTarget {
    /// Resolve `conn_id` through the credential store when first needed.
    pub fn from_connection(conn_id: impl Into<String>, credentials: &dyn CredentialStore) -> Self {
        let conn_id = conn_id.into();
        let url = credentials
            .connection(&conn_id)
            .and_then(|conn| conn.to_database_url(&conn_id));
        let url = match url {
            Ok(url) => Some(url),
            Err(err) => {
                warn!(conn_id = %conn_id, error = %err, "Database connection unavailable");
                None
            }
        };
        Self {
            conn_id,
            url,
            store: OnceCell::new(),
        }
    }

    pub fn from_url(conn_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            conn_id: conn_id.into(),
            url: Some(url.into()),
            store: OnceCell::new(),
        }
    }

    /// An already connected store.
    pub fn from_store(conn_id: impl Into<String>, store: MovieStore) -> Self {
        Self {
            conn_id: conn_id.into(),
            url: None,
            store: OnceCell::new_with(Some(store)),
        }
    }

    pub fn conn_id(&self) -> &str {
        &self.conn_id
    }

    pub async fn store(&self) -> Result<&MovieStore, TaskError> {
        self.store
            .get_or_try_init(|| async {
                let url = self.url.as_deref().ok_or_else(|| {
                    TaskError::validation(format!(
                        "database connection '{}' is not configured",
                        self.conn_id
                    ))
                })?;
                MovieStore::connect(url).await.map_err(TaskError::from)
            })
            .await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingPaths {
    pub csv_dir: PathBuf,
    pub parquet_dir: PathBuf,
}

impl StagingPaths {
    pub fn new(csv_dir: impl Into<PathBuf>, parquet_dir: impl Into<PathBuf>) -> Self {
        Self {
            csv_dir: csv_dir.into(),
            parquet_dir: parquet_dir.into(),
        }
    }

    pub fn source_file(&self) -> PathBuf {
        self.csv_dir.join(SOURCE_FILENAME)
    }
}

pub struct MoviePipeline {
    catalog: CatalogSource,
    objects: StoreSource,
    local_db: DatabaseTarget,
    remote_db: DatabaseTarget,
    paths: StagingPaths,
    policy: RetryPolicy,
}

impl MoviePipeline {
    pub fn new(
        catalog: CatalogSource,
        objects: StoreSource,
        local_db: DatabaseTarget,
        remote_db: DatabaseTarget,
        paths: StagingPaths,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            catalog,
            objects,
            local_db,
            remote_db,
            paths,
            policy,
        }
    }

    /// Production wiring from the config file and credential store.
    pub fn from_config(config: &PipelineConfig, credentials: Arc<dyn CredentialStore>) -> Self {
        let local_db = DatabaseTarget::from_connection(&config.databases.local, credentials.as_ref());
        let remote_db =
            DatabaseTarget::from_connection(&config.databases.remote, credentials.as_ref());
        Self::new(
            CatalogSource::Kaggle {
                credentials: Arc::clone(&credentials),
                base_url: config.catalog.base_url.clone(),
            },
            StoreSource::S3 {
                storage: config.storage.clone(),
                credentials,
            },
            local_db,
            remote_db,
            StagingPaths::new(&config.paths.csv_dir, &config.paths.parquet_dir),
            config.retry.into(),
        )
    }

    pub fn paths(&self) -> &StagingPaths {
        &self.paths
    }

    pub fn local_db(&self) -> &DatabaseTarget {
        &self.local_db
    }

    pub fn remote_db(&self) -> &DatabaseTarget {
        &self.remote_db
    }

    /// Run every task for `logical_date`.
    ///
    /// Parameters are resolved first; invalid parameters fail `get_inputs`
    /// and nothing else runs.
    pub async fn run_for_date(
        self: &Arc<Self>,
        logical_date: NaiveDate,
        requested: &RequestedParams,
    ) -> RunReport {
        let ctx = match RunContext::resolve(logical_date, requested) {
            Ok(ctx) => ctx,
            Err(err) => {
                let err = TaskError::from(err);
                warn!(logical_date = %logical_date, error = %err, "Invalid run parameters");
                return RunReport::failed_inputs(logical_date, &err);
            }
        };
        let run = Arc::new(DailyRun {
            ctx,
            pipeline: Arc::clone(self),
        });
        run_graph(run, self.policy, logical_date).await
    }
}

/// Task executor for one logical date.
pub struct DailyRun {
    ctx: RunContext,
    pipeline: Arc<MoviePipeline>,
}

impl DailyRun {
    fn paths(&self) -> &StagingPaths {
        &self.pipeline.paths
    }

    fn snapshot_path(&self) -> PathBuf {
        self.paths().csv_dir.join(self.ctx.partition_filename())
    }

    fn processed_path(&self) -> PathBuf {
        self.paths().parquet_dir.join(self.ctx.processed_filename())
    }

    async fn publish(&self, local: PathBuf, layer: ObjectLayer) -> Result<(), TaskError> {
        let publisher = self.pipeline.objects.publisher()?;
        publisher
            .publish_file(&local, layer, self.ctx.logical_date())
            .await?;
        Ok(())
    }

    async fn load(&self, target: &DatabaseTarget) -> Result<(), TaskError> {
        let store = target.store().await?;
        let stats = store.load_csv(&self.snapshot_path()).await?;
        info!(
            conn_id = target.conn_id(),
            rows = stats.rows_upserted,
            "Upserted partition"
        );
        Ok(())
    }

    async fn sweep(&self, dir: PathBuf, extension: &'static str) -> Result<(), TaskError> {
        tokio::task::spawn_blocking(move || remove_files_with_extension(&dir, extension)).await??;
        Ok(())
    }
}

#[async_trait]
impl TaskExecutor for DailyRun {
    async fn execute(&self, task: TaskId) -> Result<(), TaskError> {
        match task {
            TaskId::GetInputs => {
                let params = self.ctx.params();
                info!(
                    search = %params.search,
                    sort_by = %params.sort_by,
                    quantity = params.quantity,
                    "Resolved run inputs"
                );
                Ok(())
            }
            TaskId::GetFiles => {
                let catalog = self.pipeline.catalog.catalog()?;
                fetch_datasets(catalog.as_ref(), self.ctx.params(), &self.paths().csv_dir).await?;
                Ok(())
            }
            TaskId::PartitionFiles => {
                let source = self.paths().source_file();
                let out_dir = self.paths().csv_dir.clone();
                let date = self.ctx.logical_date();
                tokio::task::spawn_blocking(move || {
                    movieflow_sinks::partition_by_release_date(&source, &out_dir, date, Utc::now())
                })
                .await??;
                Ok(())
            }
            TaskId::RawDataToS3 => self.publish(self.snapshot_path(), ObjectLayer::Raw).await,
            TaskId::CreateTablePostgres => {
                self.pipeline.local_db.store().await?.ensure_table().await?;
                Ok(())
            }
            TaskId::CreateTableRds => {
                self.pipeline.remote_db.store().await?.ensure_table().await?;
                Ok(())
            }
            TaskId::PushToDatabase => self.load(&self.pipeline.local_db).await,
            TaskId::PushToRds => self.load(&self.pipeline.remote_db).await,
            TaskId::ProcessData => {
                let input = self.snapshot_path();
                let out_dir = self.paths().parquet_dir.clone();
                let filename = self.ctx.processed_filename();
                tokio::task::spawn_blocking(move || {
                    movieflow_sinks::explode_genres_to_parquet(&input, &out_dir, &filename)
                })
                .await??;
                Ok(())
            }
            TaskId::ProcessedDataToS3 => {
                self.publish(self.processed_path(), ObjectLayer::Processed)
                    .await
            }
            TaskId::RemoveCsvFiles => {
                self.sweep(self.paths().csv_dir.clone(), CSV_EXTENSION).await
            }
            TaskId::RemoveParquetFiles => {
                self.sweep(self.paths().parquet_dir.clone(), PARQUET_EXTENSION)
                    .await
            }
        }
    }
}

/// Logical dates from `start` to `end`, inclusive.
pub fn date_range(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    start.iter_days().take_while(|d| *d <= end).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{ConfigCredentialStore, Connection};
    use std::collections::BTreeMap;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn date_range_is_inclusive() {
        let dates = date_range(date(2024, 2, 28), date(2024, 3, 1));
        assert_eq!(dates, vec![date(2024, 2, 28), date(2024, 2, 29), date(2024, 3, 1)]);
        assert!(date_range(date(2024, 3, 2), date(2024, 3, 1)).is_empty());
    }

    #[test]
    fn missing_catalog_credentials_is_authentication() {
        let source = CatalogSource::Kaggle {
            credentials: Arc::new(ConfigCredentialStore::new(BTreeMap::new())),
            base_url: "http://127.0.0.1:9".to_string(),
        };
        let err = source.catalog().err().unwrap();
        assert_eq!(err.kind(), "authentication");
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn unconfigured_database_fails_validation() {
        let creds = ConfigCredentialStore::new(BTreeMap::new());
        let target = DatabaseTarget::from_connection("rds_conn", &creds);
        let err = target.store().await.err().unwrap();
        assert_eq!(err.kind(), "validation");
    }

    #[tokio::test]
    async fn sqlite_connection_is_reused() {
        let mut conns = BTreeMap::new();
        conns.insert(
            "postgres_localhost".to_string(),
            Connection::from_uri("postgres_localhost", "sqlite::memory:").unwrap(),
        );
        let creds = ConfigCredentialStore::new(conns);
        let target = DatabaseTarget::from_connection("postgres_localhost", &creds);

        target.store().await.unwrap().ensure_table().await.unwrap();
        // Same in-memory database on the second call
        assert_eq!(target.store().await.unwrap().count_rows().await.unwrap(), 0);
    }
}
