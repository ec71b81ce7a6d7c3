//! # Pipeline commands
//!
//! The closed set of operations the binary can run, as a [`Command`] enum dispatched by
//! [`execute`]. Each command takes the [`PipelineConfig`] explicitly and returns the text
//! to print (tables are rendered with `comfy-table`).
//!
//! | command              | effect                                                    |
//! |----------------------|-----------------------------------------------------------|
//! | `ListArchives`       | archives of each period with their size                   |
//! | `InspectConverted`   | converted files of each period, totals vs archive totals  |
//! | `Ingest`             | convert every archive of a period                         |
//! | `RetryArchives`      | re-run explicit archives, or those of the failure ledger  |
//! | `RetryFiles`         | convert loose CSV files                                   |
//! | `Resample`           | base-resolution resampling of a period                    |
//! | `Cascade`            | final multi-resolution artifacts of a period              |
//! | `InspectFinal`       | final artifacts with their size and shape                 |
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use comfy_table::{presets::UTF8_FULL, Cell, CellAlignment, ContentArrangement, Row, Table};
use itertools::Itertools;
use tracing::{info, warn};

use crate::{
    ais_errors::AisError,
    budget::InFlightBudget,
    config::PipelineConfig,
    constants::BYTES_PER_MB,
    ingestion::driver::{IngestionDriver, IngestionSummary},
    parquet_io::file_shape,
    resampling::period::{CascadeOutcome, PeriodResampler},
    time::Period,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    ListArchives,
    InspectConverted,
    Ingest {
        period: Period,
    },
    /// `paths` may hold archives (re-run directly) and directories (searched for the
    /// archives recorded in the ledger). With no archive given, the ledger drives the
    /// retry.
    RetryArchives {
        period: Period,
        paths: Vec<Utf8PathBuf>,
    },
    RetryFiles {
        period: Period,
        files: Vec<Utf8PathBuf>,
    },
    Resample {
        period: Period,
    },
    Cascade {
        period: Period,
    },
    InspectFinal,
}

/// Run one command to completion.
///
/// Return
/// ----------
/// * The human-readable report of the command.
/// * Only fatal errors: missing inputs, invalid configuration, budget violations.
pub fn execute(config: &PipelineConfig, command: &Command) -> Result<String, AisError> {
    let budget = InFlightBudget::new(config.max_in_flight);
    info!(?command, "executing");

    match command {
        Command::ListArchives => list_archives(config),
        Command::InspectConverted => inspect_converted(config),
        Command::Ingest { period } => {
            let summary = IngestionDriver::new(config, &budget).ingest_period(period)?;
            Ok(render_summary(period, &summary))
        }
        Command::RetryArchives { period, paths } => {
            let driver = IngestionDriver::new(config, &budget);
            let (dirs, archives): (Vec<Utf8PathBuf>, Vec<Utf8PathBuf>) =
                paths.iter().cloned().partition(|p| p.is_dir());
            let summary = if archives.is_empty() {
                driver.retry_failed_archives(period, &dirs)?
            } else {
                driver.ingest_archives(&archives, &config.converted_dir(period), Some(*period))?
            };
            Ok(render_summary(period, &summary))
        }
        Command::RetryFiles { period, files } => {
            let summary = IngestionDriver::new(config, &budget).convert_raw_files(
                files,
                &config.converted_dir(period),
                Some(*period),
            )?;
            Ok(render_summary(period, &summary))
        }
        Command::Resample { period } => {
            let summary = PeriodResampler::new(config, &budget)
                .resample_period(period, config.base_resolution()?)?;
            Ok(format!(
                "{period}: {} resampled, {} skipped, {} failed",
                summary.written, summary.skipped, summary.failed
            ))
        }
        Command::Cascade { period } => {
            match PeriodResampler::new(config, &budget).run_period_cascade(period)? {
                CascadeOutcome::Skipped => Ok(format!("{period}: final artifacts already exist")),
                CascadeOutcome::Written(paths) => Ok(format!(
                    "{period}: wrote {}",
                    paths.iter().filter_map(|p| p.file_name()).join(", ")
                )),
            }
        }
        Command::InspectFinal => inspect_final(config),
    }
}

/// Periods to report on: the configured ones, or every period directory found under
/// the archive root.
pub fn periods(config: &PipelineConfig) -> Result<Vec<Period>, AisError> {
    if !config.periods.is_empty() {
        return Ok(config.periods.clone());
    }
    if !config.archive_root.is_dir() {
        return Err(AisError::MissingInput(config.archive_root.clone()));
    }
    let found = config
        .archive_root
        .read_dir_utf8()?
        .filter_map(Result::ok)
        .filter(|e| e.path().is_dir())
        .filter_map(|e| e.file_name().parse::<Period>().ok())
        .sorted_by_key(|p| p.to_string())
        .collect();
    Ok(found)
}

fn size_mb(path: &Utf8Path) -> f64 {
    match fs::metadata(path) {
        Ok(meta) => meta.len() as f64 / BYTES_PER_MB,
        Err(err) => {
            warn!(%path, error = %err, "cannot stat file");
            0.0
        }
    }
}

fn files_in(dir: &Utf8Path, extension: &str) -> Result<Vec<Utf8PathBuf>, AisError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    Ok(dir
        .read_dir_utf8()?
        .filter_map(Result::ok)
        .map(|e| e.into_path())
        .filter(|p| p.is_file() && p.extension() == Some(extension))
        .sorted()
        .collect())
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(header.into_iter().map(Cell::new).collect_vec());
    table
}

fn right(value: impl ToString) -> Cell {
    Cell::new(value.to_string()).set_alignment(CellAlignment::Right)
}

fn list_archives(config: &PipelineConfig) -> Result<String, AisError> {
    let mut table = new_table(vec!["Period", "Archive", "Size [MB]"]);
    for period in periods(config)? {
        for archive in files_in(&config.archive_dir(&period), "zip")? {
            table.add_row(Row::from(vec![
                Cell::new(period.to_string()),
                Cell::new(archive.file_name().unwrap_or_default()),
                right(format!("{:.2}", size_mb(&archive))),
            ]));
        }
    }
    Ok(table.to_string())
}

fn inspect_converted(config: &PipelineConfig) -> Result<String, AisError> {
    let mut files = new_table(vec!["Period", "File", "Size [MB]"]);
    let mut totals = new_table(vec!["Period", "Archives [GB]", "Converted [GB]", "Ratio"]);

    for period in periods(config)? {
        let converted = files_in(&config.converted_dir(&period), "parquet")?;
        for file in &converted {
            files.add_row(Row::from(vec![
                Cell::new(period.to_string()),
                Cell::new(file.file_name().unwrap_or_default()),
                right(format!("{:.2}", size_mb(file))),
            ]));
        }

        let archive_gb: f64 = files_in(&config.archive_dir(&period), "zip")?
            .iter()
            .map(|p| size_mb(p))
            .sum::<f64>()
            / 1024.0;
        let converted_gb: f64 = converted.iter().map(|p| size_mb(p)).sum::<f64>() / 1024.0;
        let ratio = if archive_gb > 0.0 {
            format!("{:.2}", converted_gb / archive_gb)
        } else {
            "-".to_string()
        };
        totals.add_row(Row::from(vec![
            Cell::new(period.to_string()),
            right(format!("{archive_gb:.3}")),
            right(format!("{converted_gb:.3}")),
            right(ratio),
        ]));
    }
    Ok(format!("{files}\n{totals}"))
}

fn inspect_final(config: &PipelineConfig) -> Result<String, AisError> {
    let mut table = new_table(vec!["Artifact", "Size [MB]", "Rows", "Columns"]);
    for artifact in files_in(&config.final_dir(), "parquet")? {
        let (rows, columns) = file_shape(&artifact)?;
        table.add_row(Row::from(vec![
            Cell::new(artifact.file_name().unwrap_or_default()),
            right(format!("{:.2}", size_mb(&artifact))),
            right(rows),
            right(columns),
        ]));
    }
    Ok(table.to_string())
}

fn render_summary(period: &Period, summary: &IngestionSummary) -> String {
    format!(
        "{period}: archives {} ok / {} failed, entries {} converted / {} skipped / {} failed",
        summary.archives_ok,
        summary.archives_failed,
        summary.entries_converted,
        summary.entries_skipped,
        summary.entries_failed
    )
}

#[cfg(test)]
mod commands_test {
    use super::*;
    use crate::parquet_io::write_batch;

    fn config_in(dir: &tempfile::TempDir) -> PipelineConfig {
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        PipelineConfig::new(root.join("zips"), root.join("work")).unwrap()
    }

    #[test]
    fn test_periods_are_discovered() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);
        for name in ["2022", "2021", "misc"] {
            fs::create_dir_all(config.archive_root.join(name)).unwrap();
        }
        assert_eq!(
            periods(&config).unwrap(),
            vec![Period::Year(2021), Period::Year(2022)]
        );

        let pinned = config.clone().with_periods(vec![Period::Month(2023, 4)]);
        assert_eq!(periods(&pinned).unwrap(), vec![Period::Month(2023, 4)]);
    }

    #[test]
    fn test_list_archives_table() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);
        let period_dir = config.archive_dir(&Period::Year(2021));
        fs::create_dir_all(&period_dir).unwrap();
        fs::write(period_dir.join("a.zip"), vec![0u8; 1024]).unwrap();

        let out = execute(&config, &Command::ListArchives).unwrap();
        assert!(out.contains("a.zip"));
        assert!(out.contains("2021"));
    }

    #[test]
    fn test_ingest_missing_period_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);
        let err = execute(&config, &Command::Ingest { period: Period::Year(2021) }).unwrap_err();
        assert!(matches!(err, AisError::MissingInput(_)));
    }

    #[test]
    fn test_inspect_final_reports_shape() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);
        let batch = crate::resampling::resampling_test::keyed_batch(&[(0, "a", Some(1))]);
        write_batch(
            &config.final_artifact(&Period::Year(2021), &"1h".parse().unwrap()),
            &batch,
        )
        .unwrap();

        let out = execute(&config, &Command::InspectFinal).unwrap();
        assert!(out.contains("aisdk-2021-1h.parquet"));
        assert!(out.contains("Rows"));
    }
}
