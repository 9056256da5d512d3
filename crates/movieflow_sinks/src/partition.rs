//! Daily partition snapshots.
//!
//! Streams the catalog CSV and keeps rows whose `release_date` equals the
//! logical date. Matching is plain text equality on `YYYY-MM-DD`, so values
//! carrying a time part never match.

use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use movieflow_protocol::naming::partition_filename;
use movieflow_protocol::schema::{INSERTED_AT_COLUMN, INSERTED_AT_FORMAT, RELEASE_DATE_COLUMN};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::{temp_path_for, SinkError, SinkResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionOutput {
    pub path: PathBuf,
    /// Rows read from the source file
    pub rows_scanned: usize,
    /// Rows written to the snapshot
    pub rows_written: usize,
}

/// Write `movies_{date}.csv` into `output_dir` with the rows released on `date`.
///
/// Every written row gets `inserted_at` set to `inserted_at` formatted as
/// `YYYY-MM-DD HH:MM:SS.ffffff`. If the source already has that column its
/// value is replaced, otherwise the column is appended. No match still
/// produces a header-only file.
pub fn partition_by_release_date(
    source: &Path,
    output_dir: &Path,
    date: NaiveDate,
    inserted_at: DateTime<Utc>,
) -> SinkResult<PartitionOutput> {
    let ds = date.format("%Y-%m-%d").to_string();
    let stamp = inserted_at.format(INSERTED_AT_FORMAT).to_string();

    let source_file = File::open(source)
        .with_context(|| format!("Failed to open source CSV: {}", source.display()))?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(source_file);

    let mut headers = reader
        .headers()
        .with_context(|| format!("Failed to read CSV header: {}", source.display()))?
        .clone();
    let date_idx = headers
        .iter()
        .position(|h| h.trim() == RELEASE_DATE_COLUMN)
        .ok_or_else(|| SinkError::missing_column(RELEASE_DATE_COLUMN, source))?;
    let stamp_idx = headers.iter().position(|h| h.trim() == INSERTED_AT_COLUMN);
    if stamp_idx.is_none() {
        headers.push_field(INSERTED_AT_COLUMN);
    }

    std::fs::create_dir_all(output_dir).with_context(|| {
        format!("Failed to create output directory: {}", output_dir.display())
    })?;
    let filename = partition_filename(date);
    let final_path = output_dir.join(&filename);
    let temp_path = temp_path_for(output_dir, &filename);

    let result = write_snapshot(
        &mut reader,
        &headers,
        &temp_path,
        date_idx,
        stamp_idx,
        &ds,
        &stamp,
    );
    let (rows_scanned, rows_written) = match result {
        Ok(counts) => counts,
        Err(err) => {
            let _ = std::fs::remove_file(&temp_path);
            return Err(err);
        }
    };

    std::fs::rename(&temp_path, &final_path).with_context(|| {
        format!(
            "Failed to rename {} -> {}",
            temp_path.display(),
            final_path.display()
        )
    })?;

    info!(
        date = %ds,
        rows_scanned,
        rows_written,
        "Wrote partition snapshot {}",
        final_path.display()
    );

    Ok(PartitionOutput {
        path: final_path,
        rows_scanned,
        rows_written,
    })
}

fn write_snapshot(
    reader: &mut csv::Reader<File>,
    headers: &csv::StringRecord,
    temp_path: &Path,
    date_idx: usize,
    stamp_idx: Option<usize>,
    ds: &str,
    stamp: &str,
) -> SinkResult<(usize, usize)> {
    let temp_file = File::create(temp_path)
        .with_context(|| format!("Failed to create temp file: {}", temp_path.display()))?;
    let mut writer = csv::Writer::from_writer(temp_file);
    writer
        .write_record(headers)
        .context("Failed to write CSV header")?;

    let mut scanned = 0usize;
    let mut written = 0usize;
    let mut record = csv::StringRecord::new();
    loop {
        let more = reader
            .read_record(&mut record)
            .with_context(|| format!("Failed to read CSV record {}", scanned + 1))?;
        if !more {
            break;
        }
        scanned += 1;

        if record.get(date_idx).map(str::trim) != Some(ds) {
            continue;
        }

        let out: csv::StringRecord = match stamp_idx {
            Some(idx) => record
                .iter()
                .enumerate()
                .map(|(i, field)| if i == idx { stamp } else { field })
                .collect(),
            None => {
                let mut row = record.clone();
                row.push_field(stamp);
                row
            }
        };
        writer
            .write_record(&out)
            .context("Failed to write CSV record")?;
        written += 1;
    }

    let file = writer
        .into_inner()
        .map_err(|e| SinkError::message(format!("Failed to flush snapshot: {}", e)))?;
    file.sync_all().context("Failed to sync snapshot")?;
    Ok((scanned, written))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    const SOURCE: &str = "id,title,genres,release_date\n\
                          1,Alpha,Action-Drama,2024-01-01\n\
                          2,Beta,Comedy,2024-01-02\n\
                          3,\"Gamma, the sequel\",,2024-01-01T00:00:00\n";

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn stamp() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()
    }

    fn setup(source: &str) -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("movies.csv");
        std::fs::write(&path, source).unwrap();
        (dir, path)
    }

    #[test]
    fn keeps_only_rows_for_the_date_and_stamps_them() {
        let (dir, source) = setup(SOURCE);
        let out = partition_by_release_date(&source, dir.path(), date(2024, 1, 1), stamp()).unwrap();

        assert_eq!(out.path, dir.path().join("movies_2024-01-01.csv"));
        assert_eq!(out.rows_scanned, 3);
        assert_eq!(out.rows_written, 1);

        let content = std::fs::read_to_string(&out.path).unwrap();
        assert_eq!(
            content,
            "id,title,genres,release_date,inserted_at\n\
             1,Alpha,Action-Drama,2024-01-01,2024-01-02 03:04:05.000000\n"
        );
    }

    #[test]
    fn no_match_writes_header_only_file() {
        let (dir, source) = setup(SOURCE);
        let out = partition_by_release_date(&source, dir.path(), date(1999, 1, 1), stamp()).unwrap();
        assert_eq!(out.rows_written, 0);
        let content = std::fs::read_to_string(&out.path).unwrap();
        assert_eq!(content, "id,title,genres,release_date,inserted_at\n");
    }

    #[test]
    fn rerun_replaces_previous_snapshot() {
        let (dir, source) = setup(SOURCE);
        let d = date(2024, 1, 2);
        let first = partition_by_release_date(&source, dir.path(), d, stamp()).unwrap();
        let later = Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap();
        let second = partition_by_release_date(&source, dir.path(), d, later).unwrap();

        assert_eq!(first.rows_written, second.rows_written);
        let content = std::fs::read_to_string(&second.path).unwrap();
        assert!(content.contains("2024-01-03 00:00:00.000000"));
        assert!(!content.contains("2024-01-02 03:04:05"));
        assert!(!dir.path().join(".movies_2024-01-02.csv.tmp").exists());
    }

    #[test]
    fn existing_inserted_at_column_is_overwritten() {
        let (dir, source) = setup("id,release_date,inserted_at\n9,2024-01-01,old\n");
        let out = partition_by_release_date(&source, dir.path(), date(2024, 1, 1), stamp()).unwrap();
        let content = std::fs::read_to_string(&out.path).unwrap();
        assert_eq!(
            content,
            "id,release_date,inserted_at\n9,2024-01-01,2024-01-02 03:04:05.000000\n"
        );
    }

    #[test]
    fn missing_release_date_column_is_an_error() {
        let (dir, source) = setup("id,title\n1,Alpha\n");
        let err =
            partition_by_release_date(&source, dir.path(), date(2024, 1, 1), stamp()).unwrap_err();
        assert!(matches!(err, SinkError::MissingColumn { .. }));
        assert!(!dir.path().join("movies_2024-01-01.csv").exists());
    }

    #[test]
    fn missing_source_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let result = partition_by_release_date(
            &dir.path().join("movies.csv"),
            dir.path(),
            date(2024, 1, 1),
            stamp(),
        );
        assert!(result.is_err());
    }
}
