//! # Constants and type definitions for aisprint
//!
//! This module centralizes the **column catalogue** of the Danish Maritime Authority
//! `aisdk` CSV exports, the fixed **timestamp format**, the default pipeline settings,
//! and a few type aliases shared across the crate.
//!
//! ## Overview
//!
//! - Names of the index (`# Timestamp`) and entity (`MMSI`) columns
//! - Typed column groups: categorical text, numeric navigation fields, timestamps
//! - Default resolutions, batch size and dataset name
//! - [`FastHashMap`], the `ahash`-backed map used on hot paths
//!
//! The catalogue is consumed by
//! [`RecordConverter`](crate::ingestion::record_converter::RecordConverter) to decide how
//! each raw CSV column is typed.

use std::collections::HashMap;

use ahash::RandomState;

// -------------------------------------------------------------------------------------------------
// Column catalogue
// -------------------------------------------------------------------------------------------------

/// Observation time of a record (index column of every resampling stage).
pub const TIMESTAMP_COLUMN: &str = "# Timestamp";

/// Primary entity identifier (Maritime Mobile Service Identity).
pub const ENTITY_COLUMN: &str = "MMSI";

/// Occupancy count appended by every resampling stage.
pub const NUMOBS_COLUMN: &str = "numobs";

/// Estimated time of arrival, parsed with the same format as [`TIMESTAMP_COLUMN`].
pub const ETA_COLUMN: &str = "ETA";

/// Text columns kept as plain strings.
///
/// `IMO` is the secondary vessel identifier. None of these are ever dictionary-encoded:
/// dictionaries built per input file do not merge across partitions.
pub const CATEGORICAL_COLUMNS: [&str; 4] = ["IMO", "Callsign", "Name", "Destination"];

/// Navigation and dimension columns cast to `Float64` (unparseable cells become null).
pub const NUMERIC_COLUMNS: [&str; 13] = [
    "Latitude", "Longitude", "ROT", "SOG", "COG", "Heading", "Width", "Length", "Draught", "A",
    "B", "C", "D",
];

/// Single format used for every timestamp column of the raw exports.
pub const TIMESTAMP_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

// -------------------------------------------------------------------------------------------------
// Pipeline defaults
// -------------------------------------------------------------------------------------------------

/// Prefix of the raw entries and of the final artifacts.
pub const DEFAULT_DATASET: &str = "aisdk";

/// Cascade widths, base resolution first.
pub const DEFAULT_RESOLUTIONS: [&str; 3] = ["15m", "30m", "1h"];

/// Rows converted per Arrow batch while streaming a CSV entry.
pub const DEFAULT_BATCH_SIZE: usize = 65_536;

/// Columnar partitions allowed in memory at the same time.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 1;

/// File name of the append-only failure ledger.
pub const LEDGER_FILE_NAME: &str = "errors.csv";

/// Directory (under `data/proc`) receiving the final multi-resolution artifacts.
pub const FINAL_DIR_NAME: &str = "final";

pub const MILLIS_PER_SECOND: i64 = 1_000;
pub const MILLIS_PER_MINUTE: i64 = 60 * MILLIS_PER_SECOND;
pub const MILLIS_PER_HOUR: i64 = 60 * MILLIS_PER_MINUTE;
pub const MILLIS_PER_DAY: i64 = 24 * MILLIS_PER_HOUR;

/// Bytes in a megabyte, as used by the inspection commands.
pub const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

// -------------------------------------------------------------------------------------------------
// Type aliases
// -------------------------------------------------------------------------------------------------

/// Unix time in milliseconds (UTC wall clock).
pub type UnixMillis = i64;

/// Hash map using [`ahash`](https://docs.rs/ahash) for fast hashing.
pub type FastHashMap<K, V> = HashMap<K, V, RandomState>;
