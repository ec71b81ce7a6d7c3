//! # Pipeline configuration
//!
//! This module defines [`PipelineConfig`], the **single configuration value** passed to
//! every component that needs file locations or tuning knobs. It is built once (by the
//! binary from CLI flags / `AISPRINT_*` environment variables, or directly in tests) and
//! never looked up implicitly.
//!
//! ## Layout
//!
//! ```text
//! archive_root/
//! └── <period>/*.zip                         raw archives
//! data_root/
//! ├── errors.csv                              failure ledger
//! └── data/
//!     ├── <period>/<entry>.parquet            converted entries
//!     └── proc/
//!         ├── <period>/<stem>-<res>.parquet   base resolution, one per entry
//!         └── final/<dataset>-<period>-<res>.parquet
//! ```
//!
//! ## Notes
//!
//! - `resolutions` is the cascade, base resolution first.
//! - `max_in_flight` caps the number of columnar partitions held in memory, see
//!   [`InFlightBudget`](crate::budget::InFlightBudget).
use camino::{Utf8Path, Utf8PathBuf};

use crate::{
    ais_errors::AisError,
    constants::{
        DEFAULT_BATCH_SIZE, DEFAULT_DATASET, DEFAULT_MAX_IN_FLIGHT, DEFAULT_RESOLUTIONS,
        FINAL_DIR_NAME, LEDGER_FILE_NAME,
    },
    time::{Period, Resolution},
};

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub archive_root: Utf8PathBuf,
    pub data_root: Utf8PathBuf,
    pub dataset: String,
    pub periods: Vec<Period>,
    pub resolutions: Vec<Resolution>,
    pub batch_size: usize,
    pub max_in_flight: usize,
}

impl PipelineConfig {
    /// Create a configuration with the default dataset name, cascade and tuning.
    ///
    /// Arguments
    /// -----------------
    /// * `archive_root`: directory holding one subdirectory of archives per period.
    /// * `data_root`: directory receiving every output and the failure ledger.
    ///
    /// Return
    /// ----------
    /// * A configuration with no periods; add them with [`PipelineConfig::with_periods`].
    pub fn new(
        archive_root: impl Into<Utf8PathBuf>,
        data_root: impl Into<Utf8PathBuf>,
    ) -> Result<Self, AisError> {
        let resolutions = DEFAULT_RESOLUTIONS
            .iter()
            .map(|r| r.parse())
            .collect::<Result<Vec<Resolution>, _>>()?;

        Ok(PipelineConfig {
            archive_root: archive_root.into(),
            data_root: data_root.into(),
            dataset: DEFAULT_DATASET.to_string(),
            periods: Vec::new(),
            resolutions,
            batch_size: DEFAULT_BATCH_SIZE,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        })
    }

    pub fn with_periods(mut self, periods: Vec<Period>) -> Self {
        self.periods = periods;
        self
    }

    pub fn with_resolutions(mut self, resolutions: Vec<Resolution>) -> Self {
        self.resolutions = resolutions;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }

    pub fn with_dataset(mut self, dataset: impl Into<String>) -> Self {
        self.dataset = dataset.into();
        self
    }

    /// Base resolution of the cascade (first configured width).
    pub fn base_resolution(&self) -> Result<Resolution, AisError> {
        self.resolutions
            .first()
            .copied()
            .ok_or_else(|| AisError::InvalidCascade("no resolution configured".into()))
    }

    pub fn archive_dir(&self, period: &Period) -> Utf8PathBuf {
        self.archive_root.join(period.to_string())
    }

    pub fn converted_dir(&self, period: &Period) -> Utf8PathBuf {
        self.data_root.join("data").join(period.to_string())
    }

    pub fn resampled_dir(&self, period: &Period) -> Utf8PathBuf {
        self.data_root
            .join("data")
            .join("proc")
            .join(period.to_string())
    }

    pub fn final_dir(&self) -> Utf8PathBuf {
        self.data_root.join("data").join("proc").join(FINAL_DIR_NAME)
    }

    pub fn ledger_path(&self) -> Utf8PathBuf {
        self.data_root.join(LEDGER_FILE_NAME)
    }

    /// Path of the final artifact `{dataset}-{period}-{resolution}.parquet`.
    pub fn final_artifact(&self, period: &Period, resolution: &Resolution) -> Utf8PathBuf {
        self.final_dir()
            .join(format!("{}-{period}-{resolution}.parquet", self.dataset))
    }

    /// Path of the base-resolution output of one converted file.
    pub fn resampled_file(
        &self,
        period: &Period,
        converted: &Utf8Path,
        resolution: &Resolution,
    ) -> Utf8PathBuf {
        let stem = converted.file_stem().unwrap_or("unnamed");
        self.resampled_dir(period)
            .join(format!("{stem}-{resolution}.parquet"))
    }
}
