//! Canonical default values shared across the pipeline.

pub const DEFAULT_BUCKET: &str = "kaggle-movies";
pub const DEFAULT_SEARCH: &str = "akshaypawar7/millions-of-movies";
pub const DEFAULT_QUANTITY: u64 = 1;

pub const KAGGLE_CONN_ID: &str = "kaggle_conn";
pub const AWS_CONN_ID: &str = "aws_conn";
pub const LOCAL_DB_CONN_ID: &str = "postgres_localhost";
pub const REMOTE_DB_CONN_ID: &str = "rds_conn";

pub const DEFAULT_CSV_DIR: &str = "data/csv";
pub const DEFAULT_PARQUET_DIR: &str = "data/parquet";

pub const DEFAULT_RETRIES: u32 = 5;
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 120;

pub const MOVIES_TABLE: &str = "movies";
