//! # Raw CSV → typed Arrow conversion
//!
//! Converts chunks of raw `aisdk` CSV rows into Arrow [`RecordBatch`]es with a fixed,
//! typed schema. This is the only place where raw text becomes typed data.
//!
//! ## Column typing
//! -----------------
//! Each header column is classified by [`column_kind`]:
//! - `# Timestamp` → `Timestamp(Millisecond)`, **non-null**, fixed format
//!   `%d/%m/%Y %H:%M:%S`. A cell that does not parse fails the whole conversion.
//! - `MMSI` → `Utf8`, **non-null and non-empty**. Identifiers stay strings so that every
//!   partition encodes them identically.
//! - `ETA` → nullable `Timestamp(Millisecond)`; empty cells are null, malformed cells fail.
//! - `IMO`, `Callsign`, `Name`, `Destination` → nullable plain `Utf8` (never dictionaries).
//! - navigation/dimension columns → nullable `Float64`; unparseable cells become null.
//! - anything else → nullable `Utf8`, passed through.
//!
//! Every column of the first five groups is **required** in the header.
//!
//! ## Streaming
//! -----------------
//! [`CsvBatches`] wraps a [`csv::Reader`] over any [`Read`] source and yields one batch
//! per `batch_size` rows, keeping memory bounded on multi-gigabyte daily exports. The
//! converter never touches the filesystem itself.
use std::{io::Read, sync::Arc};

use arrow_array::{
    builder::{Float64Builder, StringBuilder, TimestampMillisecondBuilder},
    ArrayRef, RecordBatch,
};
use arrow_schema::{DataType, Field, Schema, SchemaRef, TimeUnit};
use csv::StringRecord;

use crate::{
    ais_errors::{AisError, SchemaError},
    constants::{CATEGORICAL_COLUMNS, ENTITY_COLUMN, ETA_COLUMN, NUMERIC_COLUMNS, TIMESTAMP_COLUMN},
    time::{format_timestamp, parse_timestamp, Period},
};

/// Typing rule applied to one raw column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Timestamp,
    OptionalTimestamp,
    EntityId,
    Categorical,
    Numeric,
    Text,
}

impl ColumnKind {
    fn data_type(&self) -> DataType {
        match self {
            ColumnKind::Timestamp | ColumnKind::OptionalTimestamp => {
                DataType::Timestamp(TimeUnit::Millisecond, None)
            }
            ColumnKind::Numeric => DataType::Float64,
            ColumnKind::EntityId | ColumnKind::Categorical | ColumnKind::Text => DataType::Utf8,
        }
    }

    fn nullable(&self) -> bool {
        !matches!(self, ColumnKind::Timestamp | ColumnKind::EntityId)
    }
}

/// Classify a raw header name.
pub fn column_kind(name: &str) -> ColumnKind {
    if name == TIMESTAMP_COLUMN {
        ColumnKind::Timestamp
    } else if name == ENTITY_COLUMN {
        ColumnKind::EntityId
    } else if name == ETA_COLUMN {
        ColumnKind::OptionalTimestamp
    } else if CATEGORICAL_COLUMNS.contains(&name) {
        ColumnKind::Categorical
    } else if NUMERIC_COLUMNS.contains(&name) {
        ColumnKind::Numeric
    } else {
        ColumnKind::Text
    }
}

/// Names of every column that must appear in a raw header.
pub fn required_columns() -> impl Iterator<Item = &'static str> {
    [TIMESTAMP_COLUMN, ENTITY_COLUMN, ETA_COLUMN]
        .into_iter()
        .chain(CATEGORICAL_COLUMNS)
        .chain(NUMERIC_COLUMNS)
}

#[derive(Debug, Clone)]
struct ColumnPlan {
    name: String,
    position: usize,
    kind: ColumnKind,
}

enum ColumnBuilder {
    Timestamp(TimestampMillisecondBuilder),
    Float(Float64Builder),
    Text(StringBuilder),
}

impl ColumnBuilder {
    fn for_kind(kind: ColumnKind, capacity: usize) -> Self {
        match kind {
            ColumnKind::Timestamp | ColumnKind::OptionalTimestamp => {
                ColumnBuilder::Timestamp(TimestampMillisecondBuilder::with_capacity(capacity))
            }
            ColumnKind::Numeric => ColumnBuilder::Float(Float64Builder::with_capacity(capacity)),
            _ => ColumnBuilder::Text(StringBuilder::with_capacity(capacity, capacity * 8)),
        }
    }

    fn finish(self) -> ArrayRef {
        match self {
            ColumnBuilder::Timestamp(mut b) => Arc::new(b.finish()),
            ColumnBuilder::Float(mut b) => Arc::new(b.finish()),
            ColumnBuilder::Text(mut b) => Arc::new(b.finish()),
        }
    }
}

/// Header-bound converter from raw rows to typed batches.
#[derive(Debug, Clone)]
pub struct RecordConverter {
    plan: Vec<ColumnPlan>,
    schema: SchemaRef,
    period: Option<Period>,
}

impl RecordConverter {
    /// Bind the converter to a CSV header.
    ///
    /// Arguments
    /// -----------------
    /// * `header`: the raw header record. A leading UTF-8 BOM and surrounding blanks are
    ///   stripped from names.
    /// * `period`: when given, every row timestamp must fall inside it.
    ///
    /// Return
    /// ----------
    /// * The converter, or [`SchemaError::MissingColumn`] for the first required column
    ///   absent from the header.
    pub fn for_header(header: &StringRecord, period: Option<Period>) -> Result<Self, SchemaError> {
        let plan: Vec<ColumnPlan> = header
            .iter()
            .enumerate()
            .map(|(position, raw)| {
                let name = raw.trim_start_matches('\u{feff}').trim().to_string();
                let kind = column_kind(&name);
                ColumnPlan {
                    name,
                    position,
                    kind,
                }
            })
            .collect();

        if let Some(missing) =
            required_columns().find(|req| !plan.iter().any(|c| c.name == *req))
        {
            return Err(SchemaError::MissingColumn(missing.to_string()));
        }

        let fields: Vec<Field> = plan
            .iter()
            .map(|c| Field::new(c.name.clone(), c.kind.data_type(), c.kind.nullable()))
            .collect();

        Ok(RecordConverter {
            plan,
            schema: Arc::new(Schema::new(fields)),
            period,
        })
    }

    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    /// Convert a chunk of raw rows.
    ///
    /// Arguments
    /// -----------------
    /// * `rows`: raw records in file order.
    /// * `first_line`: line number of `rows[0]`, used in error messages when a record
    ///   carries no position of its own.
    ///
    /// Return
    /// ----------
    /// * A batch with one row per input record, or the first [`SchemaError`] met.
    ///   Nothing is returned for a partially converted chunk.
    pub fn convert(&self, rows: &[StringRecord], first_line: u64) -> Result<RecordBatch, AisError> {
        let mut builders: Vec<ColumnBuilder> = self
            .plan
            .iter()
            .map(|c| ColumnBuilder::for_kind(c.kind, rows.len()))
            .collect();

        for (offset, row) in rows.iter().enumerate() {
            let line = row
                .position()
                .map(|p| p.line())
                .unwrap_or(first_line + offset as u64);

            for (column, builder) in self.plan.iter().zip(builders.iter_mut()) {
                let cell = row
                    .get(column.position)
                    .ok_or_else(|| SchemaError::MalformedRow {
                        line,
                        reason: format!(
                            "expected {} fields, found {}",
                            self.plan.len(),
                            row.len()
                        ),
                    })?
                    .trim();
                self.push_cell(column, builder, cell, line)?;
            }
        }

        let columns = builders.into_iter().map(ColumnBuilder::finish).collect();
        Ok(RecordBatch::try_new(self.schema.clone(), columns)?)
    }

    fn push_cell(
        &self,
        column: &ColumnPlan,
        builder: &mut ColumnBuilder,
        cell: &str,
        line: u64,
    ) -> Result<(), SchemaError> {
        let invalid_timestamp = || SchemaError::InvalidTimestamp {
            column: column.name.clone(),
            line,
            value: cell.to_string(),
        };

        match (column.kind, builder) {
            (ColumnKind::Timestamp, ColumnBuilder::Timestamp(b)) => {
                let t = parse_timestamp(cell).ok_or_else(invalid_timestamp)?;
                if let Some(period) = &self.period {
                    if !period.contains(t) {
                        return Err(SchemaError::OutOfPeriod {
                            line,
                            value: format_timestamp(t),
                            period: period.to_string(),
                        });
                    }
                }
                b.append_value(t);
            }
            (ColumnKind::OptionalTimestamp, ColumnBuilder::Timestamp(b)) => {
                if cell.is_empty() {
                    b.append_null();
                } else {
                    b.append_value(parse_timestamp(cell).ok_or_else(invalid_timestamp)?);
                }
            }
            (ColumnKind::EntityId, ColumnBuilder::Text(b)) => {
                if cell.is_empty() {
                    return Err(SchemaError::EmptyEntityId { line });
                }
                b.append_value(cell);
            }
            (ColumnKind::Numeric, ColumnBuilder::Float(b)) => {
                b.append_option(cell.parse::<f64>().ok());
            }
            (_, ColumnBuilder::Text(b)) => {
                if cell.is_empty() {
                    b.append_null();
                } else {
                    b.append_value(cell);
                }
            }
            (kind, _) => unreachable!("builder does not match column kind {kind:?}"),
        }
        Ok(())
    }
}

/// Iterator of typed batches over a raw CSV stream.
pub struct CsvBatches<R: Read> {
    reader: csv::Reader<R>,
    converter: RecordConverter,
    batch_size: usize,
    next_line: u64,
    done: bool,
}

impl<R: Read> CsvBatches<R> {
    /// Read the header of `source` and prepare the converter.
    ///
    /// Return
    /// ----------
    /// * [`SchemaError::MissingColumn`] (wrapped) if the header lacks a required column.
    pub fn new(source: R, period: Option<Period>, batch_size: usize) -> Result<Self, AisError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(source);
        let header = reader.headers().map_err(csv_error)?.clone();
        let converter = RecordConverter::for_header(&header, period)?;

        Ok(CsvBatches {
            reader,
            converter,
            batch_size: batch_size.max(1),
            next_line: 2,
            done: false,
        })
    }

    pub fn schema(&self) -> SchemaRef {
        self.converter.schema()
    }

    fn next_chunk(&mut self) -> Result<Option<RecordBatch>, AisError> {
        let mut rows = Vec::with_capacity(self.batch_size);
        while rows.len() < self.batch_size {
            let mut record = StringRecord::new();
            if !self.reader.read_record(&mut record).map_err(csv_error)? {
                self.done = true;
                break;
            }
            rows.push(record);
        }
        if rows.is_empty() {
            return Ok(None);
        }

        let first_line = self.next_line;
        self.next_line += rows.len() as u64;
        self.converter.convert(&rows, first_line).map(Some)
    }
}

impl<R: Read> Iterator for CsvBatches<R> {
    type Item = Result<RecordBatch, AisError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_chunk() {
            Ok(Some(batch)) => Some(Ok(batch)),
            Ok(None) => None,
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

/// Parsing problems are schema errors; genuine I/O failures stay CSV/I/O errors.
fn csv_error(err: csv::Error) -> AisError {
    if err.is_io_error() {
        return AisError::Csv(err);
    }
    let line = err.position().map(|p| p.line()).unwrap_or(0);
    AisError::Schema(SchemaError::MalformedRow {
        line,
        reason: err.to_string(),
    })
}
