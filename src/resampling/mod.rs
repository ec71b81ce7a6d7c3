//! # Windowed resampling
//!
//! Downsamples time-sorted AIS partitions into fixed-width buckets per entity, keeping
//! for every column the earliest non-null value seen in the bucket.
//!
//! ## Overview
//! -----------------
//! - [`window_resampler`]: one resampling stage, `(entity, window_start)` buckets.
//! - [`cascade`]: a chain of stages over increasing widths, each consuming the previous
//!   stage's output.
//! - [`period`]: the file-level loops that resample the converted files of a period and
//!   produce the final multi-resolution artifacts.
//!
//! ## Ordering contract
//! -----------------
//! Every stage requires its index column to be non-decreasing and checks it. Converted
//! files carry no ordering guarantee, so callers sort them with
//! [`sort_by_time_and_entity`] first; stage outputs are ordered by
//! `(window_start, entity)` and feed the next stage directly.
use std::cmp::Ordering;

use arrow_array::{Array, RecordBatch, StringArray, TimestampMillisecondArray, UInt32Array};
use arrow_schema::{DataType, TimeUnit};
use arrow_select::take::take_record_batch;

use crate::{
    ais_errors::AisError,
    constants::{ENTITY_COLUMN, TIMESTAMP_COLUMN},
};

pub mod cascade;
pub mod period;
pub mod window_resampler;

pub use cascade::Cascade;
pub use window_resampler::WindowResampler;

/// Names of the index (time) and group (entity) columns of a resampling stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResampleSpec {
    pub index_column: String,
    pub group_column: String,
}

impl ResampleSpec {
    pub fn new(index_column: impl Into<String>, group_column: impl Into<String>) -> Self {
        ResampleSpec {
            index_column: index_column.into(),
            group_column: group_column.into(),
        }
    }
}

impl Default for ResampleSpec {
    fn default() -> Self {
        ResampleSpec::new(TIMESTAMP_COLUMN, ENTITY_COLUMN)
    }
}

/// Borrowed views on the two key columns of a batch, with types checked.
pub(crate) struct KeyColumns<'a> {
    pub index_position: usize,
    pub group_position: usize,
    pub index: &'a TimestampMillisecondArray,
    pub group: &'a StringArray,
}

impl<'a> KeyColumns<'a> {
    pub fn resolve(batch: &'a RecordBatch, spec: &ResampleSpec) -> Result<Self, AisError> {
        let schema = batch.schema_ref();
        let index_position = schema
            .index_of(&spec.index_column)
            .map_err(|_| AisError::ColumnNotFound(spec.index_column.clone()))?;
        let group_position = schema
            .index_of(&spec.group_column)
            .map_err(|_| AisError::ColumnNotFound(spec.group_column.clone()))?;

        let index = batch
            .column(index_position)
            .as_any()
            .downcast_ref::<TimestampMillisecondArray>()
            .ok_or_else(|| AisError::ColumnType {
                column: spec.index_column.clone(),
                expected: DataType::Timestamp(TimeUnit::Millisecond, None).to_string(),
                found: schema.field(index_position).data_type().to_string(),
            })?;
        let group = batch
            .column(group_position)
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| AisError::ColumnType {
                column: spec.group_column.clone(),
                expected: DataType::Utf8.to_string(),
                found: schema.field(group_position).data_type().to_string(),
            })?;

        Ok(KeyColumns {
            index_position,
            group_position,
            index,
            group,
        })
    }

    /// Fail with [`AisError::NullKey`] on the first null in either key column.
    pub fn ensure_no_nulls(&self, spec: &ResampleSpec) -> Result<(), AisError> {
        if let Some(row) = first_null(self.index) {
            return Err(AisError::NullKey {
                column: spec.index_column.clone(),
                row,
            });
        }
        if let Some(row) = first_null(self.group) {
            return Err(AisError::NullKey {
                column: spec.group_column.clone(),
                row,
            });
        }
        Ok(())
    }
}

fn first_null(array: &dyn Array) -> Option<usize> {
    if array.null_count() == 0 {
        return None;
    }
    (0..array.len()).find(|&i| array.is_null(i))
}

/// Stable sort of a batch by `(index, group)`.
///
/// Rows with equal keys keep their relative order, which is what makes "first non-null
/// in the bucket" well defined after sorting.
pub fn sort_by_time_and_entity(
    batch: &RecordBatch,
    spec: &ResampleSpec,
) -> Result<RecordBatch, AisError> {
    let keys = KeyColumns::resolve(batch, spec)?;
    keys.ensure_no_nulls(spec)?;

    let times = keys.index.values();
    let mut order: Vec<u32> = (0..batch.num_rows() as u32).collect();
    if order
        .windows(2)
        .all(|w| compare_rows(&keys, times, w[0], w[1]) != Ordering::Greater)
    {
        return Ok(batch.clone());
    }
    order.sort_by(|&a, &b| compare_rows(&keys, times, a, b));

    Ok(take_record_batch(batch, &UInt32Array::from(order))?)
}

fn compare_rows(keys: &KeyColumns<'_>, times: &[i64], a: u32, b: u32) -> Ordering {
    let (a, b) = (a as usize, b as usize);
    times[a]
        .cmp(&times[b])
        .then_with(|| keys.group.value(a).cmp(keys.group.value(b)))
}

#[cfg(test)]
pub(crate) mod resampling_test {
    use std::sync::Arc;

    use arrow_array::{ArrayRef, Int64Array};
    use arrow_schema::{Field, Schema};

    use super::*;

    /// Batch with the default key columns plus one nullable `Int64` value column `v`.
    pub(crate) fn keyed_batch(rows: &[(i64, &str, Option<i64>)]) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new(
                TIMESTAMP_COLUMN,
                DataType::Timestamp(TimeUnit::Millisecond, None),
                false,
            ),
            Field::new(ENTITY_COLUMN, DataType::Utf8, false),
            Field::new("v", DataType::Int64, true),
        ]));
        let columns: Vec<ArrayRef> = vec![
            Arc::new(TimestampMillisecondArray::from(
                rows.iter().map(|r| r.0).collect::<Vec<_>>(),
            )),
            Arc::new(StringArray::from(
                rows.iter().map(|r| r.1).collect::<Vec<_>>(),
            )),
            Arc::new(Int64Array::from(rows.iter().map(|r| r.2).collect::<Vec<_>>())),
        ];
        RecordBatch::try_new(schema, columns).unwrap()
    }

    #[test]
    fn test_sort_is_stable() {
        let batch = keyed_batch(&[
            (20, "b", Some(1)),
            (10, "b", Some(2)),
            (10, "a", Some(3)),
            (10, "b", Some(4)),
        ]);
        let sorted = sort_by_time_and_entity(&batch, &ResampleSpec::default()).unwrap();
        let v = sorted
            .column(2)
            .as_any()
            .downcast_ref::<arrow_array::Int64Array>()
            .unwrap();
        assert_eq!(v.values().to_vec(), vec![3, 2, 4, 1]);
    }

    #[test]
    fn test_missing_key_column() {
        let batch = keyed_batch(&[(0, "a", None)]);
        let spec = ResampleSpec::new("time", ENTITY_COLUMN);
        assert_eq!(
            sort_by_time_and_entity(&batch, &spec).unwrap_err(),
            AisError::ColumnNotFound("time".into())
        );
    }

    #[test]
    fn test_wrong_key_type() {
        let batch = keyed_batch(&[(0, "a", None)]);
        let spec = ResampleSpec::new(TIMESTAMP_COLUMN, "v");
        assert!(matches!(
            sort_by_time_and_entity(&batch, &spec),
            Err(AisError::ColumnType { .. })
        ));
    }
}
