//! # Parquet I/O for converted and resampled partitions
//!
//! Thin helpers around `parquet`'s Arrow integration shared by ingestion, resampling and
//! the inspection commands.
//!
//! ## Overview
//! -----------------
//! - [`ParquetSink`] streams record batches into `<path>.tmp` and atomically renames it
//!   to `<path>` on [`ParquetSink::finish`]. A reader therefore never observes a partial
//!   file, and "output exists" is a sound idempotency check.
//! - [`write_batch`] is the one-shot variant for fully materialised batches.
//! - [`read_batch`] reads a whole file and concatenates its row groups.
//! - [`read_many`] concatenates several files sharing one schema.
//! - [`file_shape`] reports `(rows, columns)` from the footer without decoding data.
//!
//! ## Compression
//! -----------------
//! Files are written with ZSTD (default level).
use std::fs::{self, File};

use arrow_array::RecordBatch;
use arrow_schema::SchemaRef;
use arrow_select::concat::concat_batches;
use camino::{Utf8Path, Utf8PathBuf};
use parquet::{
    arrow::{arrow_reader::ParquetRecordBatchReaderBuilder, ArrowWriter},
    basic::{Compression, ZstdLevel},
    file::properties::WriterProperties,
};

use crate::ais_errors::AisError;

/// Reader batch size; large batches amortize decompression and Arrow decoding.
const READ_BATCH_SIZE: usize = 65_536;

/// Streaming, atomically published Parquet writer.
pub struct ParquetSink {
    target: Utf8PathBuf,
    temp: Utf8PathBuf,
    writer: Option<ArrowWriter<File>>,
    schema: SchemaRef,
    rows: usize,
}

impl ParquetSink {
    /// Open `<target>.tmp` for writing, creating the parent directory if needed.
    pub fn create(target: &Utf8Path, schema: SchemaRef) -> Result<Self, AisError> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let temp = Utf8PathBuf::from(format!("{target}.tmp"));
        let file = File::create(&temp)?;

        let props = WriterProperties::builder()
            .set_compression(Compression::ZSTD(ZstdLevel::default()))
            .build();
        let writer = ArrowWriter::try_new(file, schema.clone(), Some(props))?;

        Ok(ParquetSink {
            target: target.to_owned(),
            temp,
            writer: Some(writer),
            schema,
            rows: 0,
        })
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    pub fn write(&mut self, batch: &RecordBatch) -> Result<(), AisError> {
        if let Some(writer) = self.writer.as_mut() {
            writer.write(batch)?;
            self.rows += batch.num_rows();
        }
        Ok(())
    }

    /// Close the file and publish it under its final name.
    ///
    /// Return
    /// ----------
    /// * The number of rows written.
    pub fn finish(mut self) -> Result<usize, AisError> {
        if let Some(writer) = self.writer.take() {
            if let Err(err) = writer.close() {
                let _ = fs::remove_file(&self.temp);
                return Err(err.into());
            }
        }
        fs::rename(&self.temp, &self.target)?;
        Ok(self.rows)
    }
}

impl Drop for ParquetSink {
    fn drop(&mut self) {
        // Not finished: the temp file is incomplete and must not linger
        if self.writer.take().is_some() {
            let _ = fs::remove_file(&self.temp);
        }
    }
}

/// Write a fully materialised batch to `path` (temp file + rename).
pub fn write_batch(path: &Utf8Path, batch: &RecordBatch) -> Result<usize, AisError> {
    let mut sink = ParquetSink::create(path, batch.schema())?;
    sink.write(batch)?;
    sink.finish()
}

/// Read every row group of a Parquet file into a single batch.
pub fn read_batch(path: &Utf8Path) -> Result<RecordBatch, AisError> {
    if !path.exists() {
        return Err(AisError::MissingInput(path.to_owned()));
    }
    let file = File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let schema = builder.schema().clone();
    let reader = builder.with_batch_size(READ_BATCH_SIZE).build()?;

    let batches = reader.collect::<Result<Vec<_>, _>>()?;
    Ok(concat_batches(&schema, &batches)?)
}

/// Read several files with a common schema and concatenate them in the given order.
///
/// Return
/// ----------
/// * `None` when `paths` is empty.
pub fn read_many(paths: &[Utf8PathBuf]) -> Result<Option<RecordBatch>, AisError> {
    let batches = paths
        .iter()
        .map(|p| read_batch(p))
        .collect::<Result<Vec<_>, _>>()?;
    match batches.first() {
        None => Ok(None),
        Some(first) => Ok(Some(concat_batches(&first.schema(), &batches)?)),
    }
}

/// `(rows, columns)` of a Parquet file, read from its footer only.
pub fn file_shape(path: &Utf8Path) -> Result<(i64, usize), AisError> {
    let file = File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let rows = builder.metadata().file_metadata().num_rows();
    let columns = builder.schema().fields().len();
    Ok((rows, columns))
}
