//! The `movies` table on one relational target.

use std::path::Path;
use std::time::Instant;

use tracing::{info, Instrument};

use crate::error::Result;
use crate::pool::{create_pool, DatabaseType, DbConfig, DbPool};
use crate::rows::{collapse_duplicate_ids, read_movie_csv, MovieRow};
use crate::sql::{
    count_rows_sql, create_table_sql, hash_sql, remove_duplicates_sql, rows_per_statement,
    sql_op_name, upsert_sql, DEFAULT_MAX_PARAMS,
};

/// Outcome of loading one per-date file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    /// Records read from the file
    pub rows_read: usize,
    /// Distinct ids written (after collapsing in-file duplicates)
    pub rows_upserted: usize,
    /// Upsert statements executed
    pub statements: usize,
}

/// Loader for the `movies` table of one target database.
#[derive(Debug, Clone)]
pub struct MovieStore {
    pool: DbPool,
    max_params: usize,
}

impl MovieStore {
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            max_params: DEFAULT_MAX_PARAMS,
        }
    }

    /// Connect to a `postgres://` or `sqlite:` URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let config = DbConfig::from_url(url)?;
        Ok(Self::new(create_pool(&config).await?))
    }

    /// Lower the per-statement parameter budget (smaller batches).
    pub fn with_max_params(mut self, max_params: usize) -> Self {
        self.max_params = max_params;
        self
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn db_type(&self) -> DatabaseType {
        self.pool.db_type()
    }

    /// Create the table if it does not exist yet.
    pub async fn ensure_table(&self) -> Result<()> {
        let sql = create_table_sql();
        self.execute(&sql).await?;
        Ok(())
    }

    /// Load a per-date CSV in one transaction.
    pub async fn load_csv(&self, path: &Path) -> Result<LoadStats> {
        let rows = read_movie_csv(path)?;
        let rows_read = rows.len();
        let mut stats = self.upsert_rows(rows).await?;
        stats.rows_read = rows_read;
        info!(
            path = %path.display(),
            db_type = %self.db_type(),
            rows_read = stats.rows_read,
            rows_upserted = stats.rows_upserted,
            "Loaded movies file"
        );
        Ok(stats)
    }

    /// Insert-or-replace rows keyed by id, batched inside one transaction.
    pub async fn upsert_rows(&self, rows: Vec<MovieRow>) -> Result<LoadStats> {
        let rows_read = rows.len();
        let rows = collapse_duplicate_ids(rows);
        let mut stats = LoadStats {
            rows_read,
            rows_upserted: rows.len(),
            statements: 0,
        };
        if rows.is_empty() {
            return Ok(stats);
        }

        let chunk_size = rows_per_statement(self.max_params);
        match &self.pool {
            DbPool::Postgres(pool) => {
                let mut tx = pool.begin().await?;
                for chunk in rows.chunks(chunk_size) {
                    let sql = upsert_sql(DatabaseType::Postgres, chunk.len());
                    let mut query = sqlx::query(&sql);
                    for row in chunk {
                        for value in row.values() {
                            query = query.bind(value.as_deref());
                        }
                    }
                    let span = exec_span(&sql);
                    let start = Instant::now();
                    query.execute(&mut *tx).instrument(span.clone()).await?;
                    span.record("duration_ms", start.elapsed().as_millis() as u64);
                    stats.statements += 1;
                }
                tx.commit().await?;
            }
            DbPool::Sqlite(pool) => {
                let mut tx = pool.begin().await?;
                for chunk in rows.chunks(chunk_size) {
                    let sql = upsert_sql(DatabaseType::Sqlite, chunk.len());
                    let mut query = sqlx::query(&sql);
                    for row in chunk {
                        for value in row.values() {
                            query = query.bind(value.as_deref());
                        }
                    }
                    let span = exec_span(&sql);
                    let start = Instant::now();
                    query.execute(&mut *tx).instrument(span.clone()).await?;
                    span.record("duration_ms", start.elapsed().as_millis() as u64);
                    stats.statements += 1;
                }
                tx.commit().await?;
            }
        }
        Ok(stats)
    }

    /// Keep only the latest `inserted_at` per id. Returns rows deleted.
    pub async fn remove_duplicates(&self) -> Result<u64> {
        let sql = remove_duplicates_sql(self.db_type());
        let deleted = self.execute(&sql).await?;
        info!(db_type = %self.db_type(), deleted, "Removed duplicate movies");
        Ok(deleted)
    }

    pub async fn count_rows(&self) -> Result<i64> {
        let sql = count_rows_sql();
        let count = match &self.pool {
            DbPool::Postgres(pool) => {
                sqlx::query_scalar::<_, i64>(&sql)
                    .fetch_one(pool)
                    .instrument(exec_span(&sql))
                    .await?
            }
            DbPool::Sqlite(pool) => {
                sqlx::query_scalar::<_, i64>(&sql)
                    .fetch_one(pool)
                    .instrument(exec_span(&sql))
                    .await?
            }
        };
        Ok(count)
    }

    async fn execute(&self, sql: &str) -> Result<u64> {
        let span = exec_span(sql);
        let start = Instant::now();
        let affected = match &self.pool {
            DbPool::Postgres(pool) => {
                sqlx::query(sql)
                    .execute(pool)
                    .instrument(span.clone())
                    .await?
                    .rows_affected()
            }
            DbPool::Sqlite(pool) => {
                sqlx::query(sql)
                    .execute(pool)
                    .instrument(span.clone())
                    .await?
                    .rows_affected()
            }
        };
        span.record("duration_ms", start.elapsed().as_millis() as u64);
        Ok(affected)
    }
}

fn exec_span(sql: &str) -> tracing::Span {
    tracing::debug_span!(
        "db.exec",
        op = sql_op_name(sql),
        sql_hash = %hash_sql(sql),
        duration_ms = tracing::field::Empty
    )
}
