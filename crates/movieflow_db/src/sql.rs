//! SQL text for the `movies` table.
//!
//! Statements are generated from [`MOVIE_COLUMNS`] so the DDL, the upsert
//! and the CSV mapping cannot drift apart.

use movieflow_protocol::defaults::MOVIES_TABLE;
use movieflow_protocol::schema::{ColumnKind, ID_COLUMN, INSERTED_AT_COLUMN};
use movieflow_protocol::MOVIE_COLUMNS;

use crate::pool::DatabaseType;

/// Upper bound on bind parameters in one statement (SQLite's historic limit).
pub const DEFAULT_MAX_PARAMS: usize = 999;

/// Rows per upsert statement.
pub fn rows_per_statement(max_params: usize) -> usize {
    (max_params / MOVIE_COLUMNS.len()).max(1)
}

/// `CREATE TABLE IF NOT EXISTS "movies" (...)` valid for both backends.
pub fn create_table_sql() -> String {
    let columns = MOVIE_COLUMNS
        .iter()
        .map(|column| {
            let mut def = format!("{} {}", quote_ident(column.name), column.kind.sql_type());
            if column.name == ID_COLUMN {
                def.push_str(" NOT NULL PRIMARY KEY");
            }
            def
        })
        .collect::<Vec<_>>()
        .join(",\n    ");
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
        quote_ident(MOVIES_TABLE),
        columns
    )
}

/// Multi-row `INSERT ... ON CONFLICT (id) DO UPDATE` for `row_count` rows.
///
/// All values are bound as text. PostgreSQL placeholders carry a cast to the
/// column type; SQLite relies on column affinity.
pub fn upsert_sql(db_type: DatabaseType, row_count: usize) -> String {
    let column_list = MOVIE_COLUMNS
        .iter()
        .map(|c| quote_ident(c.name))
        .collect::<Vec<_>>()
        .join(", ");

    let mut param_index = 1usize;
    let mut tuples = Vec::with_capacity(row_count);
    for _ in 0..row_count {
        let mut values = Vec::with_capacity(MOVIE_COLUMNS.len());
        for column in MOVIE_COLUMNS.iter() {
            values.push(placeholder(db_type, param_index, column.kind));
            param_index += 1;
        }
        tuples.push(format!("({})", values.join(", ")));
    }

    let updates = MOVIE_COLUMNS
        .iter()
        .filter(|c| c.name != ID_COLUMN)
        .map(|c| {
            let ident = quote_ident(c.name);
            format!("{} = excluded.{}", ident, ident)
        })
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "INSERT INTO {} ({}) VALUES {} ON CONFLICT ({}) DO UPDATE SET {}",
        quote_ident(MOVIES_TABLE),
        column_list,
        tuples.join(", "),
        quote_ident(ID_COLUMN),
        updates
    )
}

fn placeholder(db_type: DatabaseType, index: usize, kind: ColumnKind) -> String {
    match db_type {
        DatabaseType::Sqlite => "?".to_string(),
        DatabaseType::Postgres => match kind {
            ColumnKind::Text => format!("${}", index),
            other => format!("CAST(${} AS {})", index, other.sql_type()),
        },
    }
}

/// Keep, per id, only the rows carrying the latest `inserted_at`.
pub fn remove_duplicates_sql(db_type: DatabaseType) -> String {
    let table = quote_ident(MOVIES_TABLE);
    let id = quote_ident(ID_COLUMN);
    let inserted_at = quote_ident(INSERTED_AT_COLUMN);
    match db_type {
        DatabaseType::Postgres => format!(
            "WITH cte AS (SELECT {id}, max({ts}) AS max_data FROM {table} GROUP BY {id}) \
             DELETE FROM {table} t USING cte WHERE t.{id} = cte.{id} AND t.{ts} <> cte.max_data",
            id = id,
            ts = inserted_at,
            table = table
        ),
        // SQLite has no DELETE ... USING
        DatabaseType::Sqlite => format!(
            "DELETE FROM {table} WHERE {ts} <> \
             (SELECT max(m.{ts}) FROM {table} m WHERE m.{id} = {table}.{id})",
            id = id,
            ts = inserted_at,
            table = table
        ),
    }
}

pub fn count_rows_sql() -> String {
    format!("SELECT COUNT(*) FROM {}", quote_ident(MOVIES_TABLE))
}

pub(crate) fn quote_ident(name: &str) -> String {
    let mut escaped = String::with_capacity(name.len() + 2);
    escaped.push('"');
    for ch in name.chars() {
        if ch == '"' {
            escaped.push('"');
        }
        escaped.push(ch);
    }
    escaped.push('"');
    escaped
}

pub(crate) fn sql_op_name(sql: &str) -> &str {
    sql.split_whitespace().next().unwrap_or("unknown")
}

pub(crate) fn hash_sql(sql: &str) -> String {
    // FNV-1a 64-bit, stable across runs for log correlation.
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in sql.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    format!("{:016x}", hash)
}
