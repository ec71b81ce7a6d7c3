//! Append-only record of archives that could not be processed.
//!
//! The ledger is a header-less CSV file (`archive_name,recorded_at,reason,period`)
//! living at [`PipelineConfig::ledger_path`](crate::config::PipelineConfig::ledger_path).
//! Entries are never rewritten or removed; a later successful retry simply leaves the
//! old line in place. Reasons containing commas or quotes are quoted by the CSV writer.
//!
//! One ledger serves every period, so each line carries the period the archive was
//! ingested for. An empty period means it was not known (loose archive lists, or lines
//! written before the column existed).
use std::fs::{self, OpenOptions};

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{ais_errors::AisError, time::Period};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub archive_name: String,
    pub recorded_at: String,
    pub reason: String,
    #[serde(default)]
    pub period: String,
}

impl LedgerEntry {
    /// `Some(true)` when recorded for `period`, `None` when no period was recorded.
    pub fn recorded_for(&self, period: &Period) -> Option<bool> {
        if self.period.is_empty() {
            None
        } else {
            Some(self.period == period.to_string())
        }
    }
}

#[derive(Debug, Clone)]
pub struct FailureLedger {
    path: Utf8PathBuf,
}

impl FailureLedger {
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        FailureLedger { path: path.into() }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Append one failure, stamped with the current UTC time.
    pub fn record(
        &self,
        archive_name: &str,
        period: Option<&Period>,
        reason: &str,
    ) -> Result<LedgerEntry, AisError> {
        let entry = LedgerEntry {
            archive_name: archive_name.to_string(),
            recorded_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            reason: reason.replace(['\n', '\r'], " "),
            period: period.map(ToString::to_string).unwrap_or_default(),
        };
        self.append(&entry)?;
        Ok(entry)
    }

    pub fn append(&self, entry: &LedgerEntry) -> Result<(), AisError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        writer.serialize(entry)?;
        writer.flush()?;
        Ok(())
    }

    /// Every entry in append order. A missing ledger is an empty ledger.
    ///
    /// Lines that do not parse as an entry are logged and skipped.
    pub fn entries(&self) -> Result<Vec<LedgerEntry>, AisError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&self.path)?;

        let mut entries = Vec::new();
        for result in reader.deserialize::<LedgerEntry>() {
            match result {
                Ok(entry) => entries.push(entry),
                Err(err) => {
                    warn!(ledger = %self.path, error = %err, "skipping unreadable ledger line")
                }
            }
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod failure_ledger_test {
    use super::*;

    fn ledger_in(dir: &tempfile::TempDir) -> FailureLedger {
        FailureLedger::new(Utf8PathBuf::from_path_buf(dir.path().join("errors.csv")).unwrap())
    }

    #[test]
    fn test_missing_ledger_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);
        assert!(ledger.entries().unwrap().is_empty());
    }

    #[test]
    fn test_record_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);
        let y2021 = Period::Year(2021);
        ledger
            .record("aisdk-2021-12.zip", Some(&y2021), "invalid Zip archive: bad header")
            .unwrap();
        ledger.record("aisdk-2022-01.zip", None, "truncated, \"really\"").unwrap();
        ledger.record("aisdk-2021-12.zip", Some(&y2021), "again").unwrap();

        let entries = ledger.entries().unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[1].reason, "truncated, \"really\"");
        assert_eq!(entries[0].period, "2021");
        assert_eq!(entries[0].recorded_for(&y2021), Some(true));
        assert_eq!(entries[0].recorded_for(&Period::Year(2022)), Some(false));
        assert_eq!(entries[1].recorded_for(&y2021), None);

        let raw = fs::read_to_string(ledger.path()).unwrap();
        assert!(raw.starts_with("aisdk-2021-12.zip,"));
        assert_eq!(raw.lines().count(), 3);

    }

    #[test]
    fn test_multiline_reason_stays_on_one_line() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);
        ledger.record("a.zip", None, "first\nsecond").unwrap();
        let raw = fs::read_to_string(ledger.path()).unwrap();
        assert_eq!(raw.lines().count(), 1);
    }

    #[test]
    fn test_lines_without_period_still_read() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);
        fs::write(ledger.path(), "old.zip,2024-01-02T03:04:05Z,bad header\n").unwrap();

        let entries = ledger.entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].archive_name, "old.zip");
        assert!(entries[0].period.is_empty());
    }
}
