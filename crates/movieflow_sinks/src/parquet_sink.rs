//! Parquet writer with temp-file staging.

use anyhow::{Context, Result};
use arrow::array::RecordBatch;
use arrow::datatypes::Schema;
use parquet::arrow::arrow_writer::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::temp_path_for;

/// Parquet sink writer
///
/// Writes `{output_dir}/{filename}` via `.{filename}.tmp`; the final file
/// appears only on [`ParquetSink::commit`].
pub struct ParquetSink {
    output_dir: PathBuf,
    filename: String,
    writer: Option<ArrowWriter<std::fs::File>>,
    rows_written: u64,
    /// Temp file path for staging
    temp_path: Option<PathBuf>,
    /// Final file path
    final_path: Option<PathBuf>,
}

impl ParquetSink {
    pub fn new(output_dir: &Path, filename: &str) -> Result<Self> {
        std::fs::create_dir_all(output_dir).with_context(|| {
            format!(
                "Failed to create output directory: {}",
                output_dir.display()
            )
        })?;

        Ok(Self {
            output_dir: output_dir.to_path_buf(),
            filename: filename.to_string(),
            writer: None,
            rows_written: 0,
            temp_path: None,
            final_path: None,
        })
    }

    pub fn init(&mut self, schema: &Schema) -> Result<()> {
        let final_path = self.output_dir.join(&self.filename);
        let temp_path = temp_path_for(&self.output_dir, &self.filename);

        debug!(
            "Initializing Parquet sink: {} (temp: {})",
            final_path.display(),
            temp_path.display()
        );

        let file = std::fs::File::create(&temp_path).with_context(|| {
            format!(
                "Failed to create temp parquet file: {}",
                temp_path.display()
            )
        })?;

        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();

        let writer = ArrowWriter::try_new(file, Arc::new(schema.clone()), Some(props))
            .context("Failed to create Parquet writer")?;

        self.writer = Some(writer);
        self.temp_path = Some(temp_path);
        self.final_path = Some(final_path);
        Ok(())
    }

    pub fn write_batch(&mut self, batch: &RecordBatch) -> Result<u64> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("Parquet sink not initialized"))?;

        writer
            .write(batch)
            .context("Failed to write batch to Parquet")?;

        let rows = batch.num_rows() as u64;
        self.rows_written += rows;
        debug!(
            "Wrote {} rows to Parquet (total: {})",
            rows, self.rows_written
        );
        Ok(rows)
    }

    /// Close the writer and promote the temp file to its final name.
    pub fn commit(&mut self) -> Result<PathBuf> {
        if let Some(writer) = self.writer.take() {
            writer.close().context("Failed to close Parquet writer")?;
        }
        let (temp_path, final_path) = match (self.temp_path.take(), &self.final_path) {
            (Some(temp), Some(fin)) => (temp, fin.clone()),
            _ => anyhow::bail!("Parquet sink not initialized"),
        };
        std::fs::rename(&temp_path, &final_path).with_context(|| {
            format!(
                "Failed to rename {} -> {}",
                temp_path.display(),
                final_path.display()
            )
        })?;
        info!(
            "Committed Parquet file: {} ({} rows)",
            final_path.display(),
            self.rows_written
        );
        Ok(final_path)
    }

    /// Drop the temp file. An already committed file is left in place.
    pub fn rollback(&mut self) {
        self.writer = None;
        if let Some(temp_path) = self.temp_path.take() {
            if temp_path.exists() {
                let _ = std::fs::remove_file(&temp_path);
                warn!("Rolled back Parquet temp file: {}", temp_path.display());
            }
        }
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }
}

impl Drop for ParquetSink {
    fn drop(&mut self) {
        if self.temp_path.is_some() {
            self.rollback();
        }
    }
}
