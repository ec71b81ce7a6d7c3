//! # Null-coalescing window resampler
//!
//! One resampling stage: rows are grouped by `(entity, window_start)` where
//! `window_start = floor(t / width) * width`, and every bucket collapses to one row.
//!
//! ## Coalescing rule
//! -----------------
//! For each non-key column, the output value of a bucket is the **earliest non-null**
//! value of that column among the bucket's rows (row order of the input), or null when
//! the column is null in every row. Columns are coalesced independently, so an output row
//! may combine values that came from different input rows. This is exactly "backward
//! fill inside the bucket, then keep the first row".
//!
//! ## Output
//! -----------------
//! - Same columns, same order and same types as the input.
//! - The index column holds `window_start` (its timezone, if any, is kept).
//! - The group column holds the bucket's entity.
//! - A trailing `numobs: UInt32` column counts the input rows of the bucket. A `numobs`
//!   column produced by a previous stage is dropped and recomputed.
//! - Rows are ordered by `(window_start, entity)`, which is sorted input for the next
//!   stage.
//!
//! ## Algorithm
//! -----------------
//! A single pass over the rows. Because the index is non-decreasing, a window is never
//! revisited once the pass has moved beyond it, so only the buckets of the current window
//! are kept in the lookup map. For each bucket and column, the row index of the first
//! non-null value is remembered; the output is then gathered column by column with
//! `arrow_select::take` (a null take index yields a null output value).
use std::sync::Arc;

use arrow_array::{Array, ArrayRef, RecordBatch, TimestampMillisecondArray, UInt32Array};
use arrow_schema::{DataType, Field, Schema, SchemaRef};
use arrow_select::take::take;

use crate::{
    ais_errors::AisError,
    constants::{FastHashMap, UnixMillis, NUMOBS_COLUMN},
    resampling::{KeyColumns, ResampleSpec},
    time::Resolution,
};

/// One occupied `(entity, window_start)` pair.
struct Bucket<'a> {
    window_start: UnixMillis,
    entity: &'a str,
    first_row: u32,
    numobs: u32,
    /// Row of the first non-null value, per value column.
    first_valid: Vec<Option<u32>>,
    unresolved: usize,
}

#[derive(Debug, Clone)]
pub struct WindowResampler {
    spec: ResampleSpec,
    width: Resolution,
}

impl WindowResampler {
    pub fn new(spec: ResampleSpec, width: Resolution) -> Self {
        WindowResampler { spec, width }
    }

    pub fn width(&self) -> Resolution {
        self.width
    }

    pub fn spec(&self) -> &ResampleSpec {
        &self.spec
    }

    /// Output schema for a given input schema: `numobs` removed, then appended.
    pub fn output_schema(&self, input: &Schema) -> SchemaRef {
        let mut fields: Vec<Field> = input
            .fields()
            .iter()
            .filter(|f| f.name() != NUMOBS_COLUMN)
            .map(|f| f.as_ref().clone())
            .collect();
        fields.push(Field::new(NUMOBS_COLUMN, DataType::UInt32, false));
        Arc::new(Schema::new_with_metadata(fields, input.metadata().clone()))
    }

    /// Resample one time-sorted batch.
    ///
    /// Arguments
    /// -----------------
    /// * `batch`: input rows; the index column must be `Timestamp(Millisecond, _)` and
    ///   non-decreasing, the group column `Utf8`. Neither may contain nulls.
    ///
    /// Return
    /// ----------
    /// * One row per occupied bucket, see the module documentation.
    /// * [`AisError::UnsortedInput`] at the first row whose timestamp is smaller than its
    ///   predecessor's, [`AisError::NullKey`] on a null key,
    ///   [`AisError::ColumnNotFound`] / [`AisError::ColumnType`] on a bad schema.
    ///
    /// See also
    /// ------------
    /// * [`sort_by_time_and_entity`](crate::resampling::sort_by_time_and_entity) – Makes
    ///   arbitrary input acceptable.
    /// * [`Cascade`](crate::resampling::Cascade) – Chains several widths.
    pub fn resample(&self, batch: &RecordBatch) -> Result<RecordBatch, AisError> {
        let keys = KeyColumns::resolve(batch, &self.spec)?;
        keys.ensure_no_nulls(&self.spec)?;
        let out_schema = self.output_schema(batch.schema_ref());

        if batch.num_rows() == 0 {
            return Ok(RecordBatch::new_empty(out_schema));
        }

        let value_columns: Vec<usize> = batch
            .schema_ref()
            .fields()
            .iter()
            .enumerate()
            .filter(|(i, f)| {
                *i != keys.index_position
                    && *i != keys.group_position
                    && f.name() != NUMOBS_COLUMN
            })
            .map(|(i, _)| i)
            .collect();

        let buckets = self.collect_buckets(batch, &keys, &value_columns)?;

        let window_starts = TimestampMillisecondArray::from(
            buckets.iter().map(|b| b.window_start).collect::<Vec<_>>(),
        )
        .with_timezone_opt(match batch.schema_ref().field(keys.index_position).data_type() {
            DataType::Timestamp(_, tz) => tz.clone(),
            _ => None,
        });
        let first_rows = UInt32Array::from(buckets.iter().map(|b| b.first_row).collect::<Vec<_>>());

        let mut columns: Vec<ArrayRef> = Vec::with_capacity(out_schema.fields().len());
        let mut value_slot = 0;
        for (position, field) in batch.schema_ref().fields().iter().enumerate() {
            if position == keys.index_position {
                columns.push(Arc::new(window_starts.clone()));
            } else if position == keys.group_position {
                columns.push(take(batch.column(position).as_ref(), &first_rows, None)?);
            } else if field.name() != NUMOBS_COLUMN {
                let indices = UInt32Array::from(
                    buckets
                        .iter()
                        .map(|b| b.first_valid[value_slot])
                        .collect::<Vec<_>>(),
                );
                columns.push(take(batch.column(position).as_ref(), &indices, None)?);
                value_slot += 1;
            }
        }
        columns.push(Arc::new(UInt32Array::from(
            buckets.iter().map(|b| b.numobs).collect::<Vec<_>>(),
        )));

        Ok(RecordBatch::try_new(out_schema, columns)?)
    }

    fn collect_buckets<'b>(
        &self,
        batch: &'b RecordBatch,
        keys: &KeyColumns<'b>,
        value_columns: &[usize],
    ) -> Result<Vec<Bucket<'b>>, AisError> {
        let times = keys.index.values();
        let values: Vec<&ArrayRef> = value_columns.iter().map(|&i| batch.column(i)).collect();

        let mut buckets: Vec<Bucket<'b>> = Vec::new();
        // Buckets of the window currently being filled, by entity
        let mut open: FastHashMap<&'b str, usize> = FastHashMap::default();
        let mut current_window = self.width.window_start(times[0]);
        let mut window_begin = 0;

        for (row, &t) in times.iter().enumerate() {
            if row > 0 && t < times[row - 1] {
                return Err(AisError::UnsortedInput {
                    row,
                    previous: times[row - 1],
                    current: t,
                });
            }

            let window_start = self.width.window_start(t);
            if window_start != current_window {
                buckets[window_begin..].sort_by(|a, b| a.entity.cmp(b.entity));
                window_begin = buckets.len();
                open.clear();
                current_window = window_start;
            }

            let entity = keys.group.value(row);
            let slot = *open.entry(entity).or_insert_with(|| {
                buckets.push(Bucket {
                    window_start,
                    entity,
                    first_row: row as u32,
                    numobs: 0,
                    first_valid: vec![None; values.len()],
                    unresolved: values.len(),
                });
                buckets.len() - 1
            });

            let bucket = &mut buckets[slot];
            bucket.numobs += 1;
            if bucket.unresolved > 0 {
                for (column, first) in values.iter().zip(bucket.first_valid.iter_mut()) {
                    if first.is_none() && column.is_valid(row) {
                        *first = Some(row as u32);
                        bucket.unresolved -= 1;
                    }
                }
            }
        }
        buckets[window_begin..].sort_by(|a, b| a.entity.cmp(b.entity));

        Ok(buckets)
    }
}
