//! Movieflow - daily movie dataset pipeline.
//!
//! Fetches a catalog dataset, keeps the rows released on the logical date,
//! loads them into two relational databases, explodes genres into Parquet,
//! publishes both files to object storage and cleans up local staging.

pub mod catalog;
pub mod cleanup;
pub mod config;
pub mod credentials;
pub mod dag;
pub mod error;
pub mod fetch;
pub mod ledger;
pub mod pipeline;
pub mod publish;
pub mod runner;

pub use catalog::{CatalogError, DatasetCatalog, DatasetInfo, KaggleClient, KaggleCredentials};
pub use config::{ConfigError, PipelineConfig};
pub use credentials::{ConfigCredentialStore, Connection, CredentialError, CredentialStore};
pub use error::TaskError;
pub use ledger::{catchup_dates, RunLedger};
pub use pipeline::{
    date_range, CatalogSource, DailyRun, DatabaseTarget, MoviePipeline, StagingPaths,
    StoreSource,
};
pub use publish::{ObjectPublisher, PublishError};
pub use runner::{run_graph, RetryPolicy, RunReport, TaskExecutor, TaskOutcome, TaskState};
