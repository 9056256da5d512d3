//! Column layout shared by the partitioner, loaders and transformer.

/// Relational type of a movie column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnKind {
    Integer,
    Text,
    Date,
    Numeric,
    Timestamp,
}

impl ColumnKind {
    /// SQL type used in the `movies` DDL.
    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnKind::Integer => "integer",
            ColumnKind::Text => "varchar",
            ColumnKind::Date => "date",
            ColumnKind::Numeric => "numeric",
            ColumnKind::Timestamp => "timestamp",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MovieColumn {
    pub name: &'static str,
    pub kind: ColumnKind,
}

const fn col(name: &'static str, kind: ColumnKind) -> MovieColumn {
    MovieColumn { name, kind }
}

pub const ID_COLUMN: &str = "id";
pub const GENRES_COLUMN: &str = "genres";
pub const GENRE_COLUMN: &str = "genre";
pub const RELEASE_DATE_COLUMN: &str = "release_date";
pub const INSERTED_AT_COLUMN: &str = "inserted_at";

pub const GENRE_DELIMITER: char = '-';

/// Format of the `inserted_at` ingestion timestamp.
pub const INSERTED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Target columns of the relational loaders, in insert order.
pub const MOVIE_COLUMNS: [MovieColumn; 21] = [
    col(ID_COLUMN, ColumnKind::Integer),
    col("title", ColumnKind::Text),
    col(GENRES_COLUMN, ColumnKind::Text),
    col("original_language", ColumnKind::Text),
    col("overview", ColumnKind::Text),
    col("popularity", ColumnKind::Text),
    col("production_companies", ColumnKind::Text),
    col(RELEASE_DATE_COLUMN, ColumnKind::Date),
    col("budget", ColumnKind::Numeric),
    col("revenue", ColumnKind::Numeric),
    col("runtime", ColumnKind::Numeric),
    col("status", ColumnKind::Text),
    col("tagline", ColumnKind::Text),
    col("vote_average", ColumnKind::Numeric),
    col("vote_count", ColumnKind::Numeric),
    col("credits", ColumnKind::Text),
    col("keywords", ColumnKind::Text),
    col("poster_path", ColumnKind::Text),
    col("backdrop_path", ColumnKind::Text),
    col("recommendations", ColumnKind::Text),
    col(INSERTED_AT_COLUMN, ColumnKind::Timestamp),
];

pub fn movie_column_names() -> Vec<&'static str> {
    MOVIE_COLUMNS.iter().map(|c| c.name).collect()
}
