//! Connection pool creation.
//!
//! Targets are selected by URL scheme at runtime. Each variant holds a
//! concrete pool type rather than `sqlx::AnyPool`, so statements can use the
//! dialect they need (casts for PostgreSQL, plain parameters for SQLite).

use std::fmt;
use tracing::info;

use crate::error::{DbError, Result};

/// Supported relational backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseType {
    Postgres,
    Sqlite,
}

impl DatabaseType {
    /// Detect the backend from a connection URL.
    pub fn from_url(url: &str) -> Option<Self> {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Some(DatabaseType::Postgres)
        } else if url.starts_with("sqlite:") {
            Some(DatabaseType::Sqlite)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseType::Postgres => "postgres",
            DatabaseType::Sqlite => "sqlite",
        }
    }
}

impl fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Database configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Database connection URL
    pub url: String,
    /// Detected database type
    pub db_type: DatabaseType,
    /// Maximum connections in the pool
    pub max_connections: u32,
}

impl DbConfig {
    /// Create configuration from a URL, auto-detecting database type.
    pub fn from_url(url: impl Into<String>) -> Result<Self> {
        let url = url.into();
        let db_type = DatabaseType::from_url(&url)
            .ok_or_else(|| DbError::InvalidUrl(redact_url(&url)))?;

        let max_connections = match db_type {
            // Every in-memory SQLite connection is its own database.
            DatabaseType::Sqlite if is_sqlite_memory(&url) => 1,
            DatabaseType::Sqlite => 5,
            DatabaseType::Postgres => 10,
        };

        Ok(Self {
            url,
            db_type,
            max_connections,
        })
    }

    /// In-memory SQLite configuration (for testing).
    pub fn sqlite_memory() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            db_type: DatabaseType::Sqlite,
            max_connections: 1,
        }
    }

    /// Set maximum connections.
    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }
}

/// A pool for one of the supported backends.
#[derive(Debug, Clone)]
pub enum DbPool {
    Postgres(sqlx::PgPool),
    Sqlite(sqlx::SqlitePool),
}

impl DbPool {
    pub fn db_type(&self) -> DatabaseType {
        match self {
            DbPool::Postgres(_) => DatabaseType::Postgres,
            DbPool::Sqlite(_) => DatabaseType::Sqlite,
        }
    }

    pub async fn close(&self) {
        match self {
            DbPool::Postgres(pool) => pool.close().await,
            DbPool::Sqlite(pool) => pool.close().await,
        }
    }
}

/// Create a database pool from configuration.
pub async fn create_pool(config: &DbConfig) -> Result<DbPool> {
    let pool = match config.db_type {
        DatabaseType::Postgres => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(config.max_connections)
                .connect(&config.url)
                .await?;
            DbPool::Postgres(pool)
        }
        DatabaseType::Sqlite => {
            let pool = sqlx::sqlite::SqlitePoolOptions::new()
                .max_connections(config.max_connections)
                .connect(&config.url)
                .await?;
            if !is_sqlite_memory(&config.url) {
                apply_sqlite_optimizations(&pool).await?;
            }
            DbPool::Sqlite(pool)
        }
    };

    info!(
        db_type = %config.db_type,
        url = %redact_url(&config.url),
        "Connected to database"
    );
    Ok(pool)
}

/// Apply SQLite-specific optimizations.
async fn apply_sqlite_optimizations(pool: &sqlx::SqlitePool) -> Result<()> {
    // WAL mode so the two loaders can share one local file
    sqlx::query("PRAGMA journal_mode=WAL").execute(pool).await?;
    sqlx::query("PRAGMA synchronous=NORMAL").execute(pool).await?;
    Ok(())
}

fn is_sqlite_memory(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

/// Hide the password component of a connection URL.
pub fn redact_url(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    let Some((userinfo, host)) = rest.rsplit_once('@') else {
        return url.to_string();
    };
    match userinfo.split_once(':') {
        Some((user, _)) => format!("{}://{}:***@{}", scheme, user, host),
        None => url.to_string(),
    }
}
