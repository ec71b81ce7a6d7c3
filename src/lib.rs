//! # aisprint
//!
//! Ingestion of AIS vessel archives into Parquet, and null-coalescing multi-resolution
//! resampling of the converted partitions.
//!
//! ## Overview
//! -----------------
//! - [`ingestion`]: ZIP archives → typed Parquet files, idempotent, with a failure ledger.
//! - [`resampling`]: `(entity, window)` bucketing keeping the earliest non-null value per
//!   column, chained over increasing widths.
//! - [`commands`] / [`cli`]: the operations exposed by the `aisprint` binary.
//! - [`config`]: the single [`PipelineConfig`](config::PipelineConfig) passed everywhere.
pub mod ais_errors;
pub mod budget;
pub mod cli;
pub mod commands;
pub mod config;
pub mod constants;
pub mod ingestion;
pub mod parquet_io;
pub mod resampling;
pub mod time;

pub use ais_errors::{AisError, SchemaError};
pub use config::PipelineConfig;
pub use resampling::{Cascade, ResampleSpec, WindowResampler};
pub use time::{Period, Resolution};
