//! # Ingestion driver
//!
//! Walks the raw archives of a period one at a time and hands each to the
//! [`ArchiveExtractor`]. The driver owns the policy around failures:
//!
//! - a missing input (period directory, archive or loose CSV path) is **fatal** and
//!   reported before any work starts;
//! - a corrupt archive is appended to the [`FailureLedger`] and the loop moves on;
//! - a failed entry is logged with its context and the loop moves on.
//!
//! Re-running any operation is safe: outputs that already exist are skipped.
use camino::{Utf8Path, Utf8PathBuf};
use itertools::Itertools;
use tracing::{error, info, warn};

use crate::{
    ais_errors::AisError,
    budget::InFlightBudget,
    config::PipelineConfig,
    ingestion::{
        archive_extractor::{ArchiveExtractor, ArchiveOutcome, EntryOutcome},
        failure_ledger::FailureLedger,
        progress_bar::LoopProgress,
    },
    time::Period,
};

/// Counters accumulated over one ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestionSummary {
    pub archives_ok: usize,
    pub archives_failed: usize,
    pub entries_converted: usize,
    pub entries_skipped: usize,
    pub entries_failed: usize,
}

impl IngestionSummary {
    fn absorb(&mut self, outcome: &ArchiveOutcome) {
        match outcome {
            ArchiveOutcome::Success(report) => {
                self.archives_ok += 1;
                self.entries_converted += report.converted();
                self.entries_skipped += report.skipped();
                self.entries_failed += report.failed();
            }
            ArchiveOutcome::Failure { .. } => self.archives_failed += 1,
        }
    }

    /// `true` when nothing failed, at archive or entry level.
    pub fn is_clean(&self) -> bool {
        self.archives_failed == 0 && self.entries_failed == 0
    }
}

pub struct IngestionDriver<'a> {
    config: &'a PipelineConfig,
    budget: &'a InFlightBudget,
    ledger: FailureLedger,
}

impl<'a> IngestionDriver<'a> {
    pub fn new(config: &'a PipelineConfig, budget: &'a InFlightBudget) -> Self {
        IngestionDriver {
            config,
            budget,
            ledger: FailureLedger::new(config.ledger_path()),
        }
    }

    pub fn ledger(&self) -> &FailureLedger {
        &self.ledger
    }

    /// Archives of a period, sorted by file name.
    ///
    /// Return
    /// ----------
    /// * [`AisError::MissingInput`] if `<archive_root>/<period>` does not exist.
    pub fn list_archives(&self, period: &Period) -> Result<Vec<Utf8PathBuf>, AisError> {
        let dir = self.config.archive_dir(period);
        if !dir.is_dir() {
            return Err(AisError::MissingInput(dir));
        }
        let pattern = format!("{}/*.zip", glob::Pattern::escape(dir.as_str()));
        let archives = glob::glob(&pattern)?
            .filter_map(Result::ok)
            .map(|p| {
                Utf8PathBuf::from_path_buf(p)
                    .map_err(|p| AisError::NonUtf8Path(p.display().to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(archives.into_iter().sorted().collect())
    }

    /// Convert every archive of `period` into `<data_root>/data/<period>/`.
    pub fn ingest_period(&self, period: &Period) -> Result<IngestionSummary, AisError> {
        let archives = self.list_archives(period)?;
        info!(%period, archives = archives.len(), "ingesting period");
        self.ingest_archives(&archives, &self.config.converted_dir(period), Some(*period))
    }

    /// Process archives strictly one at a time.
    ///
    /// Arguments
    /// -----------------
    /// * `archives`: archive paths, all checked for existence before the first one is
    ///   opened.
    /// * `out_dir`: destination of the converted files.
    /// * `period`: bounds row timestamps when known.
    ///
    /// Return
    /// ----------
    /// * The accumulated [`IngestionSummary`]. Corrupt archives are recorded in the ledger
    ///   and counted, not returned as errors.
    pub fn ingest_archives(
        &self,
        archives: &[Utf8PathBuf],
        out_dir: &Utf8Path,
        period: Option<Period>,
    ) -> Result<IngestionSummary, AisError> {
        ensure_all_exist(archives)?;

        let extractor = ArchiveExtractor::new(period, self.config.batch_size, self.budget);
        let mut summary = IngestionSummary::default();
        let mut progress = LoopProgress::new(archives.len());

        for archive in archives {
            let outcome = extractor.extract(archive, out_dir)?;
            match &outcome {
                ArchiveOutcome::Failure { reason, .. } => {
                    let name = archive.file_name().unwrap_or(archive.as_str());
                    if let Some(err) = outcome.error() {
                        error!(error = %err, "recording archive in ledger");
                    }
                    self.ledger.record(name, period.as_ref(), reason)?;
                }
                ArchiveOutcome::Success(report) => {
                    for entry in &report.entries {
                        if let EntryOutcome::Failed { entry, reason } = entry {
                            warn!(%archive, %entry, %reason, "entry not converted");
                        }
                    }
                }
            }
            summary.absorb(&outcome);
            progress.item_done(archive.file_name().unwrap_or_default());
        }
        progress.finish();

        info!(?summary, "ingestion finished");
        Ok(summary)
    }

    /// Re-run the archives the failure ledger recorded for `period`.
    ///
    /// Entries recorded for another period are left alone. Each name is looked up in
    /// every directory of `search_dirs` first (replacement copies usually live there),
    /// then in the period's archive directory. Entries with no recorded period are only
    /// looked up in the period's archive directory, since a shared search directory may
    /// hold archives of several periods. Names found nowhere are logged and skipped.
    pub fn retry_failed_archives(
        &self,
        period: &Period,
        search_dirs: &[Utf8PathBuf],
    ) -> Result<IngestionSummary, AisError> {
        let own_dir = self.config.archive_dir(period);
        let candidates: Vec<(String, bool)> = self
            .ledger
            .entries()?
            .into_iter()
            .filter_map(|e| match e.recorded_for(period) {
                Some(false) => None,
                pinned => Some((e.archive_name, pinned.is_some())),
            })
            .sorted_by_key(|(_, pinned)| !pinned)
            .unique_by(|(name, _)| name.clone())
            .collect();

        let resolved: Vec<Utf8PathBuf> = candidates
            .iter()
            .filter_map(|(name, pinned)| {
                let shared = search_dirs.iter().filter(|_| *pinned);
                let found = shared
                    .chain(std::iter::once(&own_dir))
                    .map(|d| d.join(name))
                    .find(|p| p.is_file());
                if found.is_none() {
                    warn!(archive = %name, %period, "ledger entry not found in search directories");
                }
                found
            })
            .sorted()
            .collect();

        info!(
            %period,
            recorded = candidates.len(),
            resolved = resolved.len(),
            "retrying failed archives"
        );
        self.ingest_archives(&resolved, &self.config.converted_dir(period), Some(*period))
    }

    /// Convert loose CSV files (typically left behind by failed entries).
    ///
    /// Inputs are validated up front; a file whose output already exists is skipped.
    /// Inputs are never deleted.
    pub fn convert_raw_files(
        &self,
        files: &[Utf8PathBuf],
        out_dir: &Utf8Path,
        period: Option<Period>,
    ) -> Result<IngestionSummary, AisError> {
        ensure_all_exist(files)?;

        let extractor = ArchiveExtractor::new(period, self.config.batch_size, self.budget);
        let mut summary = IngestionSummary::default();
        let mut progress = LoopProgress::new(files.len());

        for csv in files {
            let stem = csv.file_stem().unwrap_or("unnamed");
            let output = out_dir.join(format!("{stem}.parquet"));
            if output.exists() {
                info!(%csv, %output, "already converted, skipping");
                summary.entries_skipped += 1;
            } else {
                match extractor.convert_csv_file(csv, &output) {
                    Ok(_) => summary.entries_converted += 1,
                    Err(err) if err.is_entry_local() => {
                        error!(%csv, error = %err, "conversion failed");
                        summary.entries_failed += 1;
                    }
                    Err(err) => return Err(err),
                }
            }
            progress.item_done(csv.file_name().unwrap_or_default());
        }
        progress.finish();

        Ok(summary)
    }
}

fn ensure_all_exist(paths: &[Utf8PathBuf]) -> Result<(), AisError> {
    match paths.iter().find(|p| !p.exists()) {
        Some(missing) => Err(AisError::MissingInput(missing.clone())),
        None => Ok(()),
    }
}
