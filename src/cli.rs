//! Command-line surface of the `aisprint` binary.
//!
//! Every global flag can also be set through an `AISPRINT_*` environment variable:
//!
//! - `AISPRINT_ARCHIVE_ROOT` - directory holding `<period>/*.zip`
//! - `AISPRINT_DATA_ROOT` - directory receiving every output and `errors.csv`
//! - `AISPRINT_DATASET` - prefix of the final artifacts (default `aisdk`)
//! - `AISPRINT_PERIODS` - comma-separated periods for the listing commands
//! - `AISPRINT_RESOLUTIONS` - comma-separated cascade, base first (default `15m,30m,1h`)
//! - `AISPRINT_BATCH_SIZE` - rows per conversion batch
//! - `AISPRINT_MAX_IN_FLIGHT` - columnar partitions allowed in memory at once
use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};

use crate::{
    ais_errors::AisError,
    commands::Command,
    config::PipelineConfig,
    constants::{DEFAULT_BATCH_SIZE, DEFAULT_DATASET, DEFAULT_MAX_IN_FLIGHT},
    time::{Period, Resolution},
};

/// Ingest AIS archives and build multi-resolution Parquet artifacts.
#[derive(Debug, Parser)]
#[command(name = "aisprint")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Directory holding one subdirectory of ZIP archives per period.
    #[arg(long, env = "AISPRINT_ARCHIVE_ROOT", default_value = "zips")]
    pub archive_root: Utf8PathBuf,

    /// Directory receiving converted, resampled and final files.
    #[arg(long, env = "AISPRINT_DATA_ROOT", default_value = ".")]
    pub data_root: Utf8PathBuf,

    /// Dataset name used in final artifact names.
    #[arg(long, env = "AISPRINT_DATASET", default_value = DEFAULT_DATASET)]
    pub dataset: String,

    /// Periods considered by the listing commands (default: every period directory).
    #[arg(long, env = "AISPRINT_PERIODS", value_delimiter = ',')]
    pub periods: Vec<Period>,

    /// Cascade resolutions, base first.
    #[arg(
        long,
        env = "AISPRINT_RESOLUTIONS",
        value_delimiter = ',',
        default_value = "15m,30m,1h"
    )]
    pub resolutions: Vec<Resolution>,

    /// Rows per conversion batch.
    #[arg(long, env = "AISPRINT_BATCH_SIZE", default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Columnar partitions allowed in memory at once.
    #[arg(long, env = "AISPRINT_MAX_IN_FLIGHT", default_value_t = DEFAULT_MAX_IN_FLIGHT)]
    pub max_in_flight: usize,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Build the pipeline configuration from the global flags.
    pub fn config(&self) -> Result<PipelineConfig, AisError> {
        Ok(PipelineConfig::new(self.archive_root.clone(), self.data_root.clone())?
            .with_dataset(self.dataset.clone())
            .with_periods(self.periods.clone())
            .with_resolutions(self.resolutions.clone())
            .with_batch_size(self.batch_size)
            .with_max_in_flight(self.max_in_flight))
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List the archives of each period with their size.
    ListArchives,
    /// Show converted file sizes and per-period totals.
    InspectConverted,
    /// Convert every archive of a period.
    Ingest { period: Period },
    /// Re-run archives: explicit archive paths, or those recorded in the failure ledger
    /// (directories given are searched for them).
    RetryArchives {
        period: Period,
        paths: Vec<Utf8PathBuf>,
    },
    /// Convert loose CSV files into the period's converted directory.
    RetryFiles {
        period: Period,
        #[arg(required = true)]
        files: Vec<Utf8PathBuf>,
    },
    /// Resample every converted file of a period at the base resolution.
    Resample { period: Period },
    /// Build the final multi-resolution artifacts of a period.
    Cascade { period: Period },
    /// Show final artifacts with their size and shape.
    InspectFinal,
}

impl From<Commands> for Command {
    fn from(value: Commands) -> Self {
        match value {
            Commands::ListArchives => Command::ListArchives,
            Commands::InspectConverted => Command::InspectConverted,
            Commands::Ingest { period } => Command::Ingest { period },
            Commands::RetryArchives { period, paths } => Command::RetryArchives { period, paths },
            Commands::RetryFiles { period, files } => Command::RetryFiles { period, files },
            Commands::Resample { period } => Command::Resample { period },
            Commands::Cascade { period } => Command::Cascade { period },
            Commands::InspectFinal => Command::InspectFinal,
        }
    }
}

#[cfg(test)]
mod cli_test {
    use super::*;

    #[test]
    fn test_cli_config_from_flags() {
        let cli = Cli::parse_from([
            "aisprint",
            "--archive-root",
            "/zips",
            "--data-root",
            "/work",
            "--periods",
            "2021,2022-03",
            "--resolutions",
            "10m,1h",
            "--max-in-flight",
            "2",
            "ingest",
            "2021",
        ]);

        let config = cli.config().unwrap();
        assert_eq!(config.archive_root, Utf8PathBuf::from("/zips"));
        assert_eq!(config.periods, vec![Period::Year(2021), Period::Month(2022, 3)]);
        assert_eq!(
            config.resolutions.iter().map(|r| r.to_string()).collect::<Vec<_>>(),
            vec!["10m", "1h"]
        );
        assert_eq!(config.max_in_flight, 2);
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(
            Command::from(cli.command),
            Command::Ingest {
                period: Period::Year(2021)
            }
        );
    }

    #[test]
    fn test_bad_period_is_rejected() {
        assert!(Cli::try_parse_from(["aisprint", "ingest", "21"]).is_err());
    }

    #[test]
    fn test_retry_files_requires_files() {
        assert!(Cli::try_parse_from(["aisprint", "retry-files", "2021"]).is_err());
    }
}
