//! # Period-level resampling
//!
//! File loops around the resampling engine.
//!
//! ## Overview
//! -----------------
//! 1. [`PeriodResampler::resample_period`] resamples every converted file of a period at
//!    the base resolution, one file at a time, into `data/proc/<period>/`.
//! 2. [`PeriodResampler::run_period_cascade`] concatenates those base files and runs the
//!    [`Cascade`] over the remaining resolutions, writing one final artifact per
//!    resolution into `data/proc/final/`.
//!
//! Both steps skip outputs that already exist, so they can be re-run after a crash.
use camino::{Utf8Path, Utf8PathBuf};
use itertools::Itertools;
use tracing::{error, info};

use crate::{
    ais_errors::AisError,
    budget::InFlightBudget,
    config::PipelineConfig,
    ingestion::progress_bar::LoopProgress,
    parquet_io::{read_batch, read_many, write_batch},
    resampling::{
        cascade::Cascade, sort_by_time_and_entity, window_resampler::WindowResampler,
        ResampleSpec,
    },
    time::{Period, Resolution},
};

/// Per-file counters of [`PeriodResampler::resample_period`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResampleSummary {
    pub written: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Result of [`PeriodResampler::run_period_cascade`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CascadeOutcome {
    /// Every final artifact already existed.
    Skipped,
    Written(Vec<Utf8PathBuf>),
}

pub struct PeriodResampler<'a> {
    config: &'a PipelineConfig,
    budget: &'a InFlightBudget,
    spec: ResampleSpec,
}

impl<'a> PeriodResampler<'a> {
    pub fn new(config: &'a PipelineConfig, budget: &'a InFlightBudget) -> Self {
        PeriodResampler {
            config,
            budget,
            spec: ResampleSpec::default(),
        }
    }

    pub fn with_spec(mut self, spec: ResampleSpec) -> Self {
        self.spec = spec;
        self
    }

    /// Converted files of a period (`<dataset>*.parquet`), sorted by name.
    pub fn converted_files(&self, period: &Period) -> Result<Vec<Utf8PathBuf>, AisError> {
        let dir = self.config.converted_dir(period);
        sorted_glob(&dir, &format!("{}*.parquet", glob::Pattern::escape(&self.config.dataset)))
    }

    /// Base-resolution files of a period (`*-<resolution>.parquet`), sorted by name.
    pub fn resampled_files(
        &self,
        period: &Period,
        resolution: &Resolution,
    ) -> Result<Vec<Utf8PathBuf>, AisError> {
        let dir = self.config.resampled_dir(period);
        sorted_glob(&dir, &format!("*-{resolution}.parquet"))
    }

    /// Resample each converted file of `period` at `resolution`.
    ///
    /// Each file is sorted by `(timestamp, entity)` first, since converted files keep the
    /// raw row order. A failing file is logged and counted; the loop continues.
    ///
    /// Return
    /// ----------
    /// * [`AisError::MissingInput`] if the period has no converted directory.
    /// * [`AisError::BudgetExhausted`] is not recovered.
    pub fn resample_period(
        &self,
        period: &Period,
        resolution: Resolution,
    ) -> Result<ResampleSummary, AisError> {
        let files = self.converted_files(period)?;
        let resampler = WindowResampler::new(self.spec.clone(), resolution);
        let mut summary = ResampleSummary::default();
        let mut progress = LoopProgress::new(files.len());

        info!(%period, %resolution, files = files.len(), "resampling converted files");
        for file in &files {
            let output = self.config.resampled_file(period, file, &resolution);
            if output.exists() {
                info!(%output, "already resampled, skipping");
                summary.skipped += 1;
            } else {
                match self.resample_file(&resampler, file, &output) {
                    Ok(rows) => {
                        info!(input = %file, %output, rows, "resampled");
                        summary.written += 1;
                    }
                    Err(err @ AisError::BudgetExhausted { .. }) => return Err(err),
                    Err(err) => {
                        error!(input = %file, error = %err, "resampling failed");
                        summary.failed += 1;
                    }
                }
            }
            progress.item_done(file.file_name().unwrap_or_default());
        }
        progress.finish();

        Ok(summary)
    }

    fn resample_file(
        &self,
        resampler: &WindowResampler,
        input: &Utf8Path,
        output: &Utf8Path,
    ) -> Result<usize, AisError> {
        let _permit = self.budget.acquire(input.as_str())?;
        let batch = read_batch(input)?;
        let sorted = sort_by_time_and_entity(&batch, &self.spec)?;
        let resampled = resampler.resample(&sorted)?;
        write_batch(output, &resampled)
    }

    /// Build the final multi-resolution artifacts of `period`.
    ///
    /// The base-resolution files are read, concatenated and sorted once; the base data is
    /// written as the first artifact and every coarser resolution is derived from the
    /// previous one.
    ///
    /// Return
    /// ----------
    /// * [`CascadeOutcome::Skipped`] when every artifact already exists.
    /// * [`AisError::MissingInput`] when no base-resolution file exists for the period.
    pub fn run_period_cascade(&self, period: &Period) -> Result<CascadeOutcome, AisError> {
        let cascade = Cascade::new(&self.config.resolutions, self.spec.clone())?;
        let artifacts = cascade
            .resolutions()
            .iter()
            .map(|r| self.config.final_artifact(period, r))
            .collect_vec();
        if artifacts.iter().all(|a| a.exists()) {
            info!(%period, "final artifacts already exist, skipping");
            return Ok(CascadeOutcome::Skipped);
        }

        let base_resolution = self.config.base_resolution()?;
        let base_files = self.resampled_files(period, &base_resolution)?;
        if base_files.is_empty() {
            return Err(AisError::MissingInput(self.config.resampled_dir(period)));
        }

        let _permit = self.budget.acquire(&format!("cascade {period}"))?;
        let Some(base) = read_many(&base_files)? else {
            return Err(AisError::MissingInput(self.config.resampled_dir(period)));
        };
        let base = sort_by_time_and_entity(&base, &self.spec)?;
        info!(%period, files = base_files.len(), rows = base.num_rows(), "running cascade");

        let mut written = Vec::with_capacity(artifacts.len());
        cascade.run_from_base(&base, |resolution, batch| {
            let path = self.config.final_artifact(period, &resolution);
            let rows = write_batch(&path, batch)?;
            info!(%resolution, output = %path, rows, "final artifact written");
            written.push(path);
            Ok(())
        })?;

        Ok(CascadeOutcome::Written(written))
    }
}

fn sorted_glob(dir: &Utf8Path, file_pattern: &str) -> Result<Vec<Utf8PathBuf>, AisError> {
    if !dir.is_dir() {
        return Err(AisError::MissingInput(dir.to_owned()));
    }
    let pattern = format!("{}/{file_pattern}", glob::Pattern::escape(dir.as_str()));
    glob::glob(&pattern)?
        .filter_map(Result::ok)
        .map(|p| {
            Utf8PathBuf::from_path_buf(p)
                .map_err(|p| AisError::NonUtf8Path(p.display().to_string()))
        })
        .collect::<Result<Vec<_>, _>>()
        .map(|files| files.into_iter().sorted().collect())
}
