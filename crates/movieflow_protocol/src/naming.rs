//! File names and object-storage keys.
//!
//! Names are keyed by logical date only, never by attempt, so a retried run
//! overwrites the files and objects of the previous attempt.

use chrono::{Datelike, NaiveDate};
use std::fmt;

/// File the catalog download is expected to produce in the staging directory.
pub const SOURCE_FILENAME: &str = "movies.csv";

pub const CSV_EXTENSION: &str = "csv";
pub const PARQUET_EXTENSION: &str = "parquet";

/// `movies_{YYYY-MM-DD}.csv`
pub fn partition_filename(date: NaiveDate) -> String {
    format!("movies_{}.{}", date.format("%Y-%m-%d"), CSV_EXTENSION)
}

/// `processed_movies_{YYYY-MM-DD}.parquet`
pub fn processed_filename(date: NaiveDate) -> String {
    format!(
        "processed_movies_{}.{}",
        date.format("%Y-%m-%d"),
        PARQUET_EXTENSION
    )
}

/// Top-level prefix of a published object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectLayer {
    Raw,
    Processed,
}

impl ObjectLayer {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectLayer::Raw => "raw",
            ObjectLayer::Processed => "processed",
        }
    }
}

impl fmt::Display for ObjectLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// `{layer}/{YYYY}/{MM}/{DD}/{filename}`
pub fn object_key(layer: ObjectLayer, date: NaiveDate, filename: &str) -> String {
    format!(
        "{}/{:04}/{:02}/{:02}/{}",
        layer.as_str(),
        date.year(),
        date.month(),
        date.day(),
        filename
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn raw_key_layout() {
        let d = date(2024, 1, 5);
        assert_eq!(
            object_key(ObjectLayer::Raw, d, &partition_filename(d)),
            "raw/2024/01/05/movies_2024-01-05.csv"
        );
    }

    #[test]
    fn processed_key_layout() {
        let d = date(2023, 12, 31);
        assert_eq!(
            object_key(ObjectLayer::Processed, d, &processed_filename(d)),
            "processed/2023/12/31/processed_movies_2023-12-31.parquet"
        );
    }
}
