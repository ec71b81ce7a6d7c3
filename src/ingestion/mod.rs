//! # Ingestion: raw ZIP archives → converted Parquet partitions
//!
//! ## Overview
//! -----------------
//! - [`record_converter`]: raw CSV rows → typed Arrow batches (pure).
//! - [`archive_extractor`]: one archive → one converted file per CSV entry, with
//!   per-entry failure isolation.
//! - [`driver`]: the period loop, idempotency and the failure policy.
//! - [`failure_ledger`]: append-only CSV record of corrupt archives.
//! - [`progress_bar`]: iteration timing, and an `indicatif` bar with the `progress`
//!   feature.
pub mod archive_extractor;
pub mod driver;
pub mod failure_ledger;
pub mod progress_bar;
pub mod record_converter;

pub use archive_extractor::{ArchiveExtractor, ArchiveOutcome, ArchiveReport, EntryOutcome};
pub use driver::{IngestionDriver, IngestionSummary};
pub use failure_ledger::{FailureLedger, LedgerEntry};
pub use record_converter::{CsvBatches, RecordConverter};
