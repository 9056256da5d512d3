//! Genre explosion: one output row per (movie, genre) pair.
//!
//! The input schema is inferred from the snapshot. Columns without any value
//! are typed as nullable text, and `genres` is always read as text. The output
//! keeps every other column in order, drops `genres` and appends `genre`.

use anyhow::Context;
use arrow::array::{Array, ArrayRef, RecordBatch, StringArray, StringBuilder, UInt32Array};
use arrow::compute::take;
use arrow::csv::reader::Format;
use arrow::csv::ReaderBuilder;
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use movieflow_protocol::schema::{GENRES_COLUMN, GENRE_COLUMN, GENRE_DELIMITER};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::parquet_sink::ParquetSink;
use crate::{SinkError, SinkResult};

const READ_BATCH_SIZE: usize = 8192;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplodeOutput {
    pub path: PathBuf,
    pub rows_read: usize,
    pub rows_written: usize,
}

/// Split a genres value into its non-empty pieces.
pub fn split_genres(value: &str) -> impl Iterator<Item = &str> {
    value.split(GENRE_DELIMITER).filter(|piece| !piece.is_empty())
}

/// Read `input`, explode genres and write `{output_dir}/{filename}` as Parquet.
pub fn explode_genres_to_parquet(
    input: &Path,
    output_dir: &Path,
    filename: &str,
) -> SinkResult<ExplodeOutput> {
    let input_schema = Arc::new(infer_input_schema(input)?);
    let output_schema = output_schema(&input_schema);

    let file = File::open(input)
        .with_context(|| format!("Failed to open snapshot: {}", input.display()))?;
    let reader = ReaderBuilder::new(input_schema)
        .with_header(true)
        .with_batch_size(READ_BATCH_SIZE)
        .build(file)
        .with_context(|| format!("Failed to build CSV reader: {}", input.display()))?;

    let mut sink = ParquetSink::new(output_dir, filename)?;
    sink.init(&output_schema)?;

    let mut rows_read = 0usize;
    for batch in reader {
        let batch =
            batch.with_context(|| format!("Failed to decode snapshot: {}", input.display()))?;
        rows_read += batch.num_rows();
        let exploded = explode_genres(&batch)?;
        sink.write_batch(&exploded)?;
    }

    let rows_written = sink.rows_written() as usize;
    let path = sink.commit()?;
    info!(
        rows_read,
        rows_written,
        "Wrote exploded genres to {}",
        path.display()
    );

    Ok(ExplodeOutput {
        path,
        rows_read,
        rows_written,
    })
}

/// Replace the `genres` column with one row per genre in a trailing `genre` column.
///
/// A row with a null, empty or all-delimiter `genres` value yields exactly one
/// row with a null `genre`. A batch without a `genres` column is treated as
/// all-empty.
pub fn explode_genres(batch: &RecordBatch) -> SinkResult<RecordBatch> {
    let schema = batch.schema();
    let genres_idx = schema.index_of(GENRES_COLUMN).ok();

    let genres: Option<&StringArray> = match genres_idx {
        Some(idx) => Some(
            batch
                .column(idx)
                .as_any()
                .downcast_ref::<StringArray>()
                .ok_or_else(|| SinkError::message("genres column is not text"))?,
        ),
        None => None,
    };

    let mut indices: Vec<u32> = Vec::with_capacity(batch.num_rows());
    let mut genre = StringBuilder::new();
    for row in 0..batch.num_rows() {
        let row_idx = u32::try_from(row)
            .map_err(|_| SinkError::message("batch too large to explode"))?;
        let value = genres.filter(|arr| !arr.is_null(row)).map(|arr| arr.value(row));
        let mut emitted = false;
        for piece in value.into_iter().flat_map(|v| split_genres(v)) {
            indices.push(row_idx);
            genre.append_value(piece);
            emitted = true;
        }
        if !emitted {
            indices.push(row_idx);
            genre.append_null();
        }
    }

    let indices = UInt32Array::from(indices);
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(schema.fields().len());
    for (idx, column) in batch.columns().iter().enumerate() {
        if Some(idx) == genres_idx {
            continue;
        }
        let taken = take(column.as_ref(), &indices, None)
            .context("Failed to repeat column values")?;
        columns.push(taken);
    }
    columns.push(Arc::new(genre.finish()));

    RecordBatch::try_new(output_schema(&schema), columns)
        .context("Failed to assemble exploded batch")
        .map_err(SinkError::from)
}

fn infer_input_schema(input: &Path) -> SinkResult<Schema> {
    let file = File::open(input)
        .with_context(|| format!("Failed to open snapshot: {}", input.display()))?;
    let (schema, _) = Format::default()
        .with_header(true)
        .infer_schema(file, None)
        .with_context(|| format!("Failed to infer schema: {}", input.display()))?;

    let fields: Vec<Field> = schema
        .fields()
        .iter()
        .map(|field| {
            let data_type = if field.name() == GENRES_COLUMN || field.data_type() == &DataType::Null
            {
                DataType::Utf8
            } else {
                field.data_type().clone()
            };
            Field::new(field.name(), data_type, true)
        })
        .collect();
    Ok(Schema::new(fields))
}

fn output_schema(input: &SchemaRef) -> SchemaRef {
    let mut fields: Vec<Field> = input
        .fields()
        .iter()
        .filter(|f| f.name() != GENRES_COLUMN)
        .map(|f| f.as_ref().clone())
        .collect();
    fields.push(Field::new(GENRE_COLUMN, DataType::Utf8, true));
    Arc::new(Schema::new(fields))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Int64Array;
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    use tempfile::TempDir;

    fn batch(ids: Vec<i64>, genres: Vec<Option<&str>>) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, true),
            Field::new(GENRES_COLUMN, DataType::Utf8, true),
            Field::new("title", DataType::Utf8, true),
        ]));
        let titles: Vec<String> = ids.iter().map(|i| format!("t{}", i)).collect();
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(ids)),
                Arc::new(StringArray::from(genres)),
                Arc::new(StringArray::from(titles)),
            ],
        )
        .unwrap()
    }

    fn genre_values(batch: &RecordBatch) -> Vec<Option<String>> {
        let col = batch
            .column_by_name(GENRE_COLUMN)
            .unwrap()
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        (0..col.len())
            .map(|i| (!col.is_null(i)).then(|| col.value(i).to_string()))
            .collect()
    }

    #[test]
    fn two_genres_make_two_rows_differing_only_in_genre() {
        let out = explode_genres(&batch(vec![7], vec![Some("Drama-Comedy")])).unwrap();

        assert_eq!(out.num_rows(), 2);
        let schema = out.schema();
        let names: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
        assert_eq!(names, vec!["id", "title", "genre"]);
        assert_eq!(
            genre_values(&out),
            vec![Some("Drama".to_string()), Some("Comedy".to_string())]
        );
        let ids = out.column(0).as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!((ids.value(0), ids.value(1)), (7, 7));
    }

    #[test]
    fn empty_and_null_genres_yield_one_null_row() {
        let out = explode_genres(&batch(vec![1, 2, 3], vec![None, Some(""), Some("--")])).unwrap();
        assert_eq!(out.num_rows(), 3);
        assert_eq!(genre_values(&out), vec![None, None, None]);
    }

    #[test]
    fn empty_pieces_are_dropped() {
        let out = explode_genres(&batch(vec![1], vec![Some("Action--Drama-")])).unwrap();
        assert_eq!(
            genre_values(&out),
            vec![Some("Action".to_string()), Some("Drama".to_string())]
        );
    }

    #[test]
    fn batch_without_genres_gets_null_genre_column() {
        let schema = Arc::new(Schema::new(vec![Field::new("id", DataType::Int64, true)]));
        let input =
            RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(vec![1, 2]))]).unwrap();
        let out = explode_genres(&input).unwrap();
        assert_eq!(out.num_rows(), 2);
        assert_eq!(out.num_columns(), 2);
        assert_eq!(genre_values(&out), vec![None, None]);
    }

    #[test]
    fn csv_snapshot_round_trips_to_parquet() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("movies_2024-01-01.csv");
        std::fs::write(
            &input,
            "id,title,genres,tagline,release_date\n\
             1,Alpha,Action-Drama,,2024-01-01\n\
             2,Beta,,,2024-01-01\n",
        )
        .unwrap();
        let out_dir = dir.path().join("parquet");

        let out =
            explode_genres_to_parquet(&input, &out_dir, "processed_movies_2024-01-01.parquet")
                .unwrap();

        assert_eq!(out.rows_read, 2);
        assert_eq!(out.rows_written, 3);

        let file = File::open(&out.path).unwrap();
        let builder = ParquetRecordBatchReaderBuilder::try_new(file).unwrap();
        let schema = builder.schema().clone();
        let names: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
        assert_eq!(names, vec!["id", "title", "tagline", "release_date", "genre"]);
        // All-empty column falls back to text.
        assert_eq!(
            schema.field_with_name("tagline").unwrap().data_type(),
            &DataType::Utf8
        );
        let rows: usize = builder.build().unwrap().map(|b| b.unwrap().num_rows()).sum();
        assert_eq!(rows, 3);
    }

    #[test]
    fn header_only_snapshot_writes_empty_parquet() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("movies_2024-01-01.csv");
        std::fs::write(&input, "id,title,genres,release_date,inserted_at\n").unwrap();

        let out = explode_genres_to_parquet(&input, dir.path(), "out.parquet").unwrap();

        assert_eq!(out.rows_written, 0);
        assert!(out.path.exists());
    }
}
