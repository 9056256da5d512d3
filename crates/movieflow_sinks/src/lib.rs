//! File writers for the movies pipeline.
//!
//! - [`partition`] filters the catalog CSV down to one release date and
//!   stamps every row with an ingestion time.
//! - [`explode`] turns a partition snapshot into one row per genre and
//!   writes it as Parquet.
//!
//! Every output is written to a hidden temp file next to its destination and
//! promoted by rename, so a retried task replaces the previous attempt's file
//! and never leaves a half-written one under the final name.

use std::path::{Path, PathBuf};
use thiserror::Error;

pub mod explode;
pub mod parquet_sink;
pub mod partition;

pub use explode::{explode_genres, explode_genres_to_parquet, ExplodeOutput};
pub use parquet_sink::ParquetSink;
pub use partition::{partition_by_release_date, PartitionOutput};

/// Errors returned by the partitioner, transformer and sinks.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("{message}")]
    Message { message: String },
    #[error("column '{column}' not found in {}", .path.display())]
    MissingColumn { column: String, path: PathBuf },
    #[error("{message}")]
    Source {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

pub type SinkResult<T> = std::result::Result<T, SinkError>;

impl SinkError {
    pub(crate) fn message(message: impl Into<String>) -> Self {
        SinkError::Message {
            message: message.into(),
        }
    }

    pub(crate) fn missing_column(column: &str, path: &Path) -> Self {
        SinkError::MissingColumn {
            column: column.to_string(),
            path: path.to_path_buf(),
        }
    }
}

impl From<anyhow::Error> for SinkError {
    fn from(err: anyhow::Error) -> Self {
        SinkError::Source {
            message: err.to_string(),
            source: err,
        }
    }
}

/// `.{filename}.tmp` in the destination directory.
pub(crate) fn temp_path_for(dir: &Path, filename: &str) -> PathBuf {
    dir.join(format!(".{}.tmp", filename))
}
