//! # Archive extraction and per-entry conversion
//!
//! [`ArchiveExtractor`] turns one raw ZIP archive into converted Parquet files, one per
//! CSV entry, inside an output directory.
//!
//! ## Per-entry lifecycle
//! -----------------
//! 1. Directories and non-CSV entries are ignored.
//! 2. If `<output_dir>/<stem>.parquet` already exists the entry is **skipped**: a
//!    previous run converted it and re-running must not redo the work.
//! 3. The entry is extracted to `<output_dir>/<name>` (sanitised with
//!    `enclosed_name`, flattened to its file name). Two entries of one archive that
//!    flatten to the same name are a conflict: the later one fails.
//! 4. The CSV is streamed through [`CsvBatches`] into a [`ParquetSink`], i.e. written to
//!    `<stem>.parquet.tmp` and renamed on success.
//! 5. The extracted CSV is deleted only after the rename. On any failure it stays on
//!    disk for inspection and a later `retry-files`.
//!
//! ## Failure isolation
//! -----------------
//! An archive that cannot be opened yields [`ArchiveOutcome::Failure`] and nothing
//! else happens. Entry-level problems (bad schema, truncated data, write errors) are
//! reported as [`EntryOutcome::Failed`] and the next entry is processed.
use std::{
    fs::{self, File},
    io::{self, BufReader},
};

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, error, info, warn};
use zip::ZipArchive;

use crate::{
    ais_errors::AisError,
    budget::InFlightBudget,
    constants::FastHashMap,
    ingestion::record_converter::CsvBatches,
    parquet_io::ParquetSink,
    time::Period,
};

/// What happened to one CSV entry of an archive.
#[derive(Debug, Clone, PartialEq)]
pub enum EntryOutcome {
    Converted {
        entry: String,
        output: Utf8PathBuf,
        rows: usize,
    },
    Skipped {
        entry: String,
        output: Utf8PathBuf,
    },
    Failed {
        entry: String,
        reason: String,
    },
}

/// Entry outcomes of an archive that could be opened.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ArchiveReport {
    pub archive: Utf8PathBuf,
    pub entries: Vec<EntryOutcome>,
}

impl ArchiveReport {
    pub fn converted(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e, EntryOutcome::Converted { .. }))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e, EntryOutcome::Skipped { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e, EntryOutcome::Failed { .. }))
            .count()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArchiveOutcome {
    Success(ArchiveReport),
    /// The archive itself is unreadable; no entry was looked at.
    Failure { archive: Utf8PathBuf, reason: String },
}

impl ArchiveOutcome {
    /// The archive-level error carried by a [`ArchiveOutcome::Failure`].
    pub fn error(&self) -> Option<AisError> {
        match self {
            ArchiveOutcome::Success(_) => None,
            ArchiveOutcome::Failure { archive, reason } => Some(AisError::CorruptArchive {
                archive: archive.file_name().unwrap_or(archive.as_str()).to_string(),
                reason: reason.clone(),
            }),
        }
    }
}

pub struct ArchiveExtractor<'a> {
    period: Option<Period>,
    batch_size: usize,
    budget: &'a InFlightBudget,
}

impl<'a> ArchiveExtractor<'a> {
    /// Arguments
    /// -----------------
    /// * `period`: when known, rows outside it fail their entry.
    /// * `batch_size`: rows per conversion chunk (bounds memory per entry).
    /// * `budget`: shared in-flight partition budget; one permit per conversion.
    pub fn new(period: Option<Period>, batch_size: usize, budget: &'a InFlightBudget) -> Self {
        ArchiveExtractor {
            period,
            batch_size: batch_size.max(1),
            budget,
        }
    }

    /// Extract and convert every CSV entry of `archive` into `output_dir`.
    ///
    /// Return
    /// ----------
    /// * `Ok(ArchiveOutcome)` for every archive-level or entry-level outcome, including
    ///   a corrupt archive.
    /// * `Err` only for problems outside the archive: the output directory cannot be
    ///   created, or the in-flight budget is exhausted.
    pub fn extract(
        &self,
        archive: &Utf8Path,
        output_dir: &Utf8Path,
    ) -> Result<ArchiveOutcome, AisError> {
        let mut zip = match File::open(archive)
            .map_err(|e| e.to_string())
            .and_then(|f| ZipArchive::new(f).map_err(|e| e.to_string()))
        {
            Ok(zip) => zip,
            Err(reason) => {
                warn!(%archive, %reason, "cannot open archive");
                return Ok(ArchiveOutcome::Failure {
                    archive: archive.to_owned(),
                    reason,
                });
            }
        };
        fs::create_dir_all(output_dir)?;

        let mut report = ArchiveReport {
            archive: archive.to_owned(),
            entries: Vec::new(),
        };
        // flattened output name -> entry that claimed it
        let mut claimed: FastHashMap<String, String> = FastHashMap::default();

        for index in 0..zip.len() {
            let (name, csv_path, parquet_path) = {
                let mut entry = match zip.by_index(index) {
                    Ok(entry) => entry,
                    Err(err) => {
                        error!(%archive, index, error = %err, "unreadable archive entry");
                        report.entries.push(EntryOutcome::Failed {
                            entry: format!("#{index}"),
                            reason: err.to_string(),
                        });
                        continue;
                    }
                };
                let name = entry.name().to_string();
                if entry.is_dir() || !is_csv(&name) {
                    debug!(%archive, entry = %name, "ignoring non-CSV entry");
                    continue;
                }

                let Some(file_name) = entry
                    .enclosed_name()
                    .and_then(|p| p.file_name().map(|f| f.to_owned()))
                    .and_then(|f| f.into_string().ok())
                else {
                    report.entries.push(EntryOutcome::Failed {
                        entry: name,
                        reason: "entry name escapes the output directory or is not UTF-8".into(),
                    });
                    continue;
                };

                if let Some(first) = claimed.get(&file_name) {
                    error!(%archive, entry = %name, %first, "entry flattens onto an earlier entry");
                    report.entries.push(EntryOutcome::Failed {
                        reason: format!("output name '{file_name}' already used by '{first}'"),
                        entry: name,
                    });
                    continue;
                }
                claimed.insert(file_name.clone(), name.clone());

                let csv_path = output_dir.join(&file_name);
                let parquet_path = csv_path.with_extension("parquet");
                if parquet_path.exists() {
                    info!(entry = %name, output = %parquet_path, "already converted, skipping");
                    report.entries.push(EntryOutcome::Skipped {
                        entry: name,
                        output: parquet_path,
                    });
                    continue;
                }

                if let Err(err) = copy_entry(&mut entry, &csv_path) {
                    error!(%archive, entry = %name, error = %err, "extraction failed");
                    report.entries.push(EntryOutcome::Failed {
                        entry: name,
                        reason: err.to_string(),
                    });
                    continue;
                }
                (name, csv_path, parquet_path)
            };

            match self.convert_csv_file(&csv_path, &parquet_path) {
                Ok(rows) => {
                    if let Err(err) = fs::remove_file(&csv_path) {
                        warn!(csv = %csv_path, error = %err, "could not delete extracted CSV");
                    }
                    report.entries.push(EntryOutcome::Converted {
                        entry: name,
                        output: parquet_path,
                        rows,
                    });
                }
                Err(err) if err.is_entry_local() => {
                    error!(
                        %archive,
                        entry = %name,
                        csv = %csv_path,
                        error = %err,
                        "conversion failed, CSV kept"
                    );
                    report.entries.push(EntryOutcome::Failed {
                        entry: name,
                        reason: err.to_string(),
                    });
                }
                Err(err) => return Err(err),
            }
        }

        info!(
            %archive,
            converted = report.converted(),
            skipped = report.skipped(),
            failed = report.failed(),
            "archive processed"
        );
        Ok(ArchiveOutcome::Success(report))
    }

    /// Convert one raw CSV file into `parquet`. The input file is never deleted.
    ///
    /// Return
    /// ----------
    /// * The number of rows written. On error no file exists at `parquet`.
    pub fn convert_csv_file(&self, csv: &Utf8Path, parquet: &Utf8Path) -> Result<usize, AisError> {
        if !csv.exists() {
            return Err(AisError::MissingInput(csv.to_owned()));
        }
        let _permit = self.budget.acquire(csv.as_str())?;

        let reader = BufReader::new(File::open(csv)?);
        let batches = CsvBatches::new(reader, self.period, self.batch_size)?;
        let mut sink = ParquetSink::create(parquet, batches.schema())?;
        for batch in batches {
            sink.write(&batch?)?;
        }
        let rows = sink.finish()?;

        info!(%csv, output = %parquet, rows, "converted");
        Ok(rows)
    }
}

fn is_csv(name: &str) -> bool {
    Utf8Path::new(name)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
}

/// Stream one entry to disk, removing the partial file on failure.
fn copy_entry(entry: &mut impl io::Read, target: &Utf8Path) -> Result<u64, AisError> {
    let mut out = File::create(target)?;
    match io::copy(entry, &mut out) {
        Ok(n) => Ok(n),
        Err(err) => {
            drop(out);
            let _ = fs::remove_file(target);
            Err(err.into())
        }
    }
}

#[cfg(test)]
mod archive_extractor_test {
    use std::io::Write;

    use zip::write::SimpleFileOptions;

    use super::*;

    const HEADER: &str = "# Timestamp,Type of mobile,MMSI,Latitude,Longitude,Navigational status,ROT,SOG,COG,Heading,IMO,Callsign,Name,Ship type,Cargo type,Width,Length,Type of position fixing device,Draught,Destination,ETA,Data source type,A,B,C,D";
    const ROW: &str = "15/12/2021 03:00:00,Class A,219000001,55.1,11.2,Moored,0.0,0.0,0.0,0,,OXAB2,EAGLE,Cargo,,20,140,GPS,6.1,AARHUS,,AIS,10,130,5,15";

    fn utf8(dir: &tempfile::TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap()
    }

    fn write_zip(path: &Utf8Path, entries: &[(&str, String)]) {
        let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
        for (name, content) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_extract_converts_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let root = utf8(&dir);
        let archive = root.join("aisdk-2021-12.zip");
        write_zip(
            &archive,
            &[
                ("aisdk-2021-12-15.csv", format!("{HEADER}\n{ROW}\n")),
                ("README.txt", "not data".into()),
            ],
        );

        let budget = InFlightBudget::new(1);
        let extractor = ArchiveExtractor::new(Some(Period::Year(2021)), 16, &budget);
        let out = root.join("out");
        let ArchiveOutcome::Success(report) = extractor.extract(&archive, &out).unwrap() else {
            panic!("archive should open");
        };

        assert_eq!(report.converted(), 1);
        assert_eq!(report.failed(), 0);
        assert!(out.join("aisdk-2021-12-15.parquet").exists());
        assert!(!out.join("aisdk-2021-12-15.csv").exists());
        assert!(!out.join("README.txt").exists());
        assert_eq!(budget.in_flight(), 0);

        // Second run skips
        let ArchiveOutcome::Success(again) = extractor.extract(&archive, &out).unwrap() else {
            panic!("archive should open");
        };
        assert_eq!(again.skipped(), 1);
        assert_eq!(again.converted(), 0);
    }

    #[test]
    fn test_corrupt_archive_is_a_failure_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let root = utf8(&dir);
        let archive = root.join("broken.zip");
        fs::write(&archive, b"this is not a zip file").unwrap();

        let budget = InFlightBudget::new(1);
        let extractor = ArchiveExtractor::new(None, 16, &budget);
        let outcome = extractor.extract(&archive, &root.join("out")).unwrap();
        assert!(matches!(outcome, ArchiveOutcome::Failure { .. }));

        let Some(AisError::CorruptArchive { archive, .. }) = outcome.error() else {
            panic!("a failure carries a corrupt archive error");
        };
        assert_eq!(archive, "broken.zip");
    }

    #[test]
    fn test_entries_flattening_to_one_name_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let root = utf8(&dir);
        let archive = root.join("nested.zip");
        write_zip(
            &archive,
            &[
                ("north/day.csv", format!("{HEADER}\n{ROW}\n")),
                ("south/day.csv", format!("{HEADER}\n{ROW}\n{ROW}\n")),
            ],
        );

        let budget = InFlightBudget::new(1);
        let extractor = ArchiveExtractor::new(None, 16, &budget);
        let out = root.join("out");
        let ArchiveOutcome::Success(report) = extractor.extract(&archive, &out).unwrap() else {
            panic!("archive should open");
        };

        assert_eq!(report.converted(), 1);
        assert_eq!(report.skipped(), 0);
        assert!(matches!(
            &report.entries[1],
            EntryOutcome::Failed { entry, .. } if entry == "south/day.csv"
        ));
        assert_eq!(crate::parquet_io::file_shape(&out.join("day.parquet")).unwrap().0, 1);

        // Still a conflict on re-run, never a silent skip
        let ArchiveOutcome::Success(again) = extractor.extract(&archive, &out).unwrap() else {
            panic!("archive should open");
        };
        assert_eq!(again.skipped(), 1);
        assert_eq!(again.failed(), 1);
    }

    #[test]
    fn test_bad_entry_keeps_csv_and_continues() {
        let dir = tempfile::tempdir().unwrap();
        let root = utf8(&dir);
        let archive = root.join("mixed.zip");
        write_zip(
            &archive,
            &[
                ("bad.csv", "# Timestamp,MMSI\n15/12/2021 03:00:00,1\n".into()),
                ("good.csv", format!("{HEADER}\n{ROW}\n")),
            ],
        );

        let budget = InFlightBudget::new(1);
        let extractor = ArchiveExtractor::new(None, 16, &budget);
        let out = root.join("out");
        let ArchiveOutcome::Success(report) = extractor.extract(&archive, &out).unwrap() else {
            panic!("archive should open");
        };

        assert_eq!(report.failed(), 1);
        assert_eq!(report.converted(), 1);
        assert!(out.join("bad.csv").exists());
        assert!(!out.join("bad.parquet").exists());
        assert!(!out.join("bad.parquet.tmp").exists());
        assert!(out.join("good.parquet").exists());
    }

    #[test]
    fn test_convert_csv_file_keeps_input() {
        let dir = tempfile::tempdir().unwrap();
        let root = utf8(&dir);
        let csv = root.join("loose.csv");
        fs::write(&csv, format!("{HEADER}\n{ROW}\n{ROW}\n")).unwrap();

        let budget = InFlightBudget::new(1);
        let extractor = ArchiveExtractor::new(None, 1, &budget);
        let rows = extractor
            .convert_csv_file(&csv, &root.join("loose.parquet"))
            .unwrap();
        assert_eq!(rows, 2);
        assert!(csv.exists());
    }

    #[test]
    fn test_is_csv() {
        assert!(is_csv("a/b.csv"));
        assert!(is_csv("B.CSV"));
        assert!(!is_csv("b.csv.zip"));
        assert!(!is_csv("csv"));
    }
}
