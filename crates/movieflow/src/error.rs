//! Task error classification.
//!
//! The runner only looks at [`TaskError::is_retryable`]: validation and
//! authentication failures end the task on the first attempt, everything
//! else is retried.

use movieflow_db::DbError;
use movieflow_protocol::ParamsError;
use movieflow_sinks::SinkError;
use thiserror::Error;

use crate::catalog::CatalogError;
use crate::credentials::CredentialError;
use crate::fetch::FetchError;
use crate::publish::PublishError;

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("authentication failed: {message}")]
    Authentication {
        message: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("{message}")]
    Transient {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

impl TaskError {
    pub fn validation(message: impl Into<String>) -> Self {
        TaskError::Validation(message.into())
    }

    pub fn authentication(message: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        TaskError::Authentication {
            message: message.into(),
            source: source.into(),
        }
    }

    pub fn transient(message: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        TaskError::Transient {
            message: message.into(),
            source: source.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, TaskError::Transient { .. })
    }

    /// Stable label for logs and the run report.
    pub fn kind(&self) -> &'static str {
        match self {
            TaskError::Validation(_) => "validation",
            TaskError::Authentication { .. } => "authentication",
            TaskError::Transient { .. } => "transient",
        }
    }
}

impl From<ParamsError> for TaskError {
    fn from(err: ParamsError) -> Self {
        TaskError::Validation(err.to_string())
    }
}

impl From<CredentialError> for TaskError {
    fn from(err: CredentialError) -> Self {
        TaskError::Validation(err.to_string())
    }
}

impl From<DbError> for TaskError {
    fn from(err: DbError) -> Self {
        if err.is_permanent() {
            TaskError::Validation(err.to_string())
        } else {
            TaskError::transient(format!("database: {}", err), err)
        }
    }
}

impl From<SinkError> for TaskError {
    fn from(err: SinkError) -> Self {
        match err {
            SinkError::MissingColumn { .. } => TaskError::Validation(err.to_string()),
            other => TaskError::transient(other.to_string(), other),
        }
    }
}

impl From<CatalogError> for TaskError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::Authentication(ref message) => {
                TaskError::authentication(message.clone(), err)
            }
            other => TaskError::transient(format!("catalog: {}", other), other),
        }
    }
}

impl From<FetchError> for TaskError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Catalog(inner) => inner.into(),
            FetchError::UnsafePath(_) => TaskError::Validation(err.to_string()),
            other => TaskError::transient(other.to_string(), other),
        }
    }
}

impl From<PublishError> for TaskError {
    fn from(err: PublishError) -> Self {
        match err {
            PublishError::Config(_) => TaskError::Validation(err.to_string()),
            other => TaskError::transient(format!("publish: {}", other), other),
        }
    }
}

impl From<std::io::Error> for TaskError {
    fn from(err: std::io::Error) -> Self {
        TaskError::transient(format!("io: {}", err), err)
    }
}

impl From<tokio::task::JoinError> for TaskError {
    fn from(err: tokio::task::JoinError) -> Self {
        TaskError::transient(format!("blocking task failed: {}", err), err)
    }
}
