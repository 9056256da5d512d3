//! Mapping of a per-date CSV onto the fixed column list.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use movieflow_protocol::schema::ID_COLUMN;
use movieflow_protocol::MOVIE_COLUMNS;

use crate::error::{DbError, Result};

/// One relational row, values in [`MOVIE_COLUMNS`] order. `None` loads as NULL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovieRow {
    values: Vec<Option<String>>,
}

impl MovieRow {
    /// Build a row from values in column order.
    pub fn new(values: Vec<Option<String>>) -> Result<Self> {
        if values.len() != MOVIE_COLUMNS.len() {
            return Err(DbError::invalid_input(format!(
                "expected {} values, got {}",
                MOVIE_COLUMNS.len(),
                values.len()
            )));
        }
        match values[0].as_deref() {
            Some(id) if !id.is_empty() => Ok(Self { values }),
            _ => Err(DbError::invalid_input("row has no id")),
        }
    }

    pub fn id(&self) -> &str {
        self.values[0].as_deref().unwrap_or_default()
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        let index = MOVIE_COLUMNS.iter().position(|c| c.name == column)?;
        self.values[index].as_deref()
    }

    pub fn values(&self) -> &[Option<String>] {
        &self.values
    }
}

/// Read every row of a per-date CSV file.
pub fn read_movie_csv(path: &Path) -> Result<Vec<MovieRow>> {
    let file = std::fs::File::open(path)?;
    read_movie_rows(file)
}

/// Map CSV records by header name onto [`MOVIE_COLUMNS`].
///
/// Columns absent from the header and empty fields become NULL; unknown
/// header columns are ignored. The header must contain `id` and every
/// record must carry a non-empty id.
pub fn read_movie_rows<R: Read>(reader: R) -> Result<Vec<MovieRow>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers = csv_reader.headers()?.clone();
    let positions: HashMap<&str, usize> = headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (name.trim(), idx))
        .collect();

    if !positions.contains_key(ID_COLUMN) {
        return Err(DbError::invalid_input(format!(
            "CSV header has no '{}' column",
            ID_COLUMN
        )));
    }

    let mapping: Vec<Option<usize>> = MOVIE_COLUMNS
        .iter()
        .map(|c| positions.get(c.name).copied())
        .collect();

    let mut rows = Vec::new();
    for (line, record) in csv_reader.records().enumerate() {
        let record = record?;
        let values = mapping
            .iter()
            .map(|pos| {
                pos.and_then(|idx| record.get(idx))
                    .filter(|value| !value.is_empty())
                    .map(str::to_string)
            })
            .collect();
        let row = MovieRow::new(values).map_err(|err| match err {
            DbError::InvalidInput(msg) => {
                DbError::invalid_input(format!("record {}: {}", line + 1, msg))
            }
            other => other,
        })?;
        rows.push(row);
    }
    Ok(rows)
}

/// Collapse duplicate ids so the last occurrence wins.
///
/// The surviving row keeps the position of the first occurrence.
pub fn collapse_duplicate_ids(rows: Vec<MovieRow>) -> Vec<MovieRow> {
    let mut index_by_id: HashMap<String, usize> = HashMap::with_capacity(rows.len());
    let mut out: Vec<MovieRow> = Vec::with_capacity(rows.len());
    for row in rows {
        match index_by_id.get(row.id()) {
            Some(&idx) => out[idx] = row,
            None => {
                index_by_id.insert(row.id().to_string(), out.len());
                out.push(row);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_columns_by_name_in_any_order() {
        let data = "title,id,genres\nHeat,7,Crime-Drama\n";
        let rows = read_movie_rows(data.as_bytes()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id(), "7");
        assert_eq!(rows[0].get("title"), Some("Heat"));
        assert_eq!(rows[0].get("genres"), Some("Crime-Drama"));
        assert_eq!(rows[0].get("overview"), None);
    }

    #[test]
    fn empty_fields_are_null() {
        let data = "id,title,tagline\n1,,\n";
        let rows = read_movie_rows(data.as_bytes()).unwrap();
        assert_eq!(rows[0].get("title"), None);
        assert_eq!(rows[0].get("tagline"), None);
    }

    #[test]
    fn missing_id_column_is_rejected() {
        let err = read_movie_rows("title\nHeat\n".as_bytes()).unwrap_err();
        assert!(matches!(err, DbError::InvalidInput(_)));
    }

    #[test]
    fn empty_id_is_rejected_with_record_number() {
        let err = read_movie_rows("id,title\n1,A\n,B\n".as_bytes()).unwrap_err();
        assert!(err.to_string().contains("record 2"));
    }

    #[test]
    fn header_only_file_has_no_rows() {
        let rows = read_movie_rows("id,title,release_date\n".as_bytes()).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn duplicates_collapse_to_last_occurrence() {
        let data = "id,title\n1,first\n2,other\n1,second\n";
        let rows = collapse_duplicate_ids(read_movie_rows(data.as_bytes()).unwrap());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id(), "1");
        assert_eq!(rows[0].get("title"), Some("second"));
        assert_eq!(rows[1].id(), "2");
    }
}
