mod common;

use std::fs;

use aisprint::{
    budget::InFlightBudget,
    commands::{execute, Command},
    ingestion::{FailureLedger, IngestionDriver, IngestionSummary},
    parquet_io::{file_shape, read_batch},
    AisError, Period,
};
use arrow_array::{Array, Float64Array, StringArray};
use common::{aisdk_csv, column, csv_row, pipeline_config, utf8_tempdir, write_zip};

fn day_rows(day: u32) -> Vec<String> {
    vec![
        csv_row(&format!("{day:02}/12/2021 03:00:00"), "219000001", "11.5", "EAGLE"),
        csv_row(&format!("{day:02}/12/2021 03:05:00"), "219000001", "", ""),
        csv_row(&format!("{day:02}/12/2021 03:02:00"), "265000002", "7.0", "HAVFRUEN"),
    ]
}

#[test]
fn test_ingest_is_idempotent() {
    let (_dir, root) = utf8_tempdir();
    let config = pipeline_config(&root);
    let period = Period::Year(2021);
    let archive_dir = config.archive_dir(&period);

    write_zip(
        &archive_dir.join("aisdk-2021-12.zip"),
        &[
            ("aisdk-2021-12-15.csv", aisdk_csv(&day_rows(15))),
            ("aisdk-2021-12-16.csv", aisdk_csv(&day_rows(16))),
        ],
    );

    let budget = InFlightBudget::new(config.max_in_flight);
    let driver = IngestionDriver::new(&config, &budget);

    let first = driver.ingest_period(&period).unwrap();
    assert_eq!(
        first,
        IngestionSummary {
            archives_ok: 1,
            archives_failed: 0,
            entries_converted: 2,
            entries_skipped: 0,
            entries_failed: 0,
        }
    );

    let converted = config.converted_dir(&period).join("aisdk-2021-12-15.parquet");
    let before = fs::read(&converted).unwrap();

    let second = driver.ingest_period(&period).unwrap();
    assert_eq!(second.entries_converted, 0);
    assert_eq!(second.entries_skipped, 2);
    assert_eq!(fs::read(&converted).unwrap(), before);

    let batch = read_batch(&converted).unwrap();
    assert_eq!(batch.num_rows(), 3);
    let sog = column::<Float64Array>(&batch, "SOG");
    assert!(sog.is_null(1));
    let name = column::<StringArray>(&batch, "Name");
    assert_eq!(name.value(2), "HAVFRUEN");
}

#[test]
fn test_corrupt_archive_is_recorded_and_skipped() {
    let (_dir, root) = utf8_tempdir();
    let config = pipeline_config(&root);
    let period = Period::Year(2021);
    let archive_dir = config.archive_dir(&period);

    fs::create_dir_all(&archive_dir).unwrap();
    fs::write(archive_dir.join("aisdk-2021-11.zip"), b"PK\x03\x04 truncated").unwrap();
    write_zip(
        &archive_dir.join("aisdk-2021-12.zip"),
        &[("aisdk-2021-12-15.csv", aisdk_csv(&day_rows(15)))],
    );

    let budget = InFlightBudget::new(1);
    let driver = IngestionDriver::new(&config, &budget);
    let summary = driver.ingest_period(&period).unwrap();

    assert_eq!(summary.archives_failed, 1);
    assert_eq!(summary.archives_ok, 1);
    assert_eq!(summary.entries_converted, 1);

    let ledger = FailureLedger::new(config.ledger_path());
    let entries = ledger.entries().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].archive_name, "aisdk-2021-11.zip");
    assert_eq!(entries[0].period, "2021");

    // Retrying a still-corrupt archive appends again and leaves the rest alone
    let retry = driver.retry_failed_archives(&period, &[]).unwrap();
    assert_eq!(retry.archives_failed, 1);
    assert_eq!(ledger.entries().unwrap().len(), 2);
}

#[test]
fn test_retry_keeps_archives_in_their_own_period() {
    let (_dir, root) = utf8_tempdir();
    let config = pipeline_config(&root);
    let y2023 = Period::Year(2023);
    let y2024 = Period::Year(2024);

    let dir_2023 = config.archive_dir(&y2023);
    fs::create_dir_all(&dir_2023).unwrap();
    fs::write(dir_2023.join("aisdk-2023-02.zip"), b"PK\x03\x04 truncated").unwrap();
    fs::create_dir_all(config.archive_dir(&y2024)).unwrap();

    let budget = InFlightBudget::new(1);
    let driver = IngestionDriver::new(&config, &budget);
    assert_eq!(driver.ingest_period(&y2023).unwrap().archives_failed, 1);

    // A shared directory of replacement archives spanning several years
    let extra = root.join("extra-zips");
    let feb_rows = vec![
        csv_row("01/02/2023 03:00:00", "219000001", "11.5", "EAGLE"),
        csv_row("01/02/2023 03:05:00", "265000002", "7.0", "HAVFRUEN"),
    ];
    write_zip(
        &extra.join("aisdk-2023-02.zip"),
        &[("aisdk-2023-02-01.csv", aisdk_csv(&feb_rows))],
    );

    let other_year = driver.retry_failed_archives(&y2024, &[extra.clone()]).unwrap();
    assert_eq!(other_year, IngestionSummary::default());
    let dir_2024 = config.converted_dir(&y2024);
    assert!(!dir_2024.exists() || fs::read_dir(&dir_2024).unwrap().next().is_none());

    let own_year = driver.retry_failed_archives(&y2023, &[extra]).unwrap();
    assert_eq!(own_year.archives_ok, 1);
    assert_eq!(own_year.entries_converted, 1);
    assert_eq!(
        file_shape(&config.converted_dir(&y2023).join("aisdk-2023-02-01.parquet")).unwrap().0,
        2
    );
}

#[test]
fn test_schema_error_keeps_csv_for_retry() {
    let (_dir, root) = utf8_tempdir();
    let config = pipeline_config(&root);
    let period = Period::Year(2021);

    let mut rows = day_rows(15);
    rows.push(csv_row("2021/12/15 04:00:00", "219000001", "1.0", "EAGLE"));
    write_zip(
        &config.archive_dir(&period).join("aisdk-2021-12.zip"),
        &[("aisdk-2021-12-15.csv", aisdk_csv(&rows))],
    );

    let budget = InFlightBudget::new(1);
    let driver = IngestionDriver::new(&config, &budget);
    let summary = driver.ingest_period(&period).unwrap();
    assert_eq!(summary.entries_failed, 1);

    let out_dir = config.converted_dir(&period);
    let left_over = out_dir.join("aisdk-2021-12-15.csv");
    assert!(left_over.exists());
    assert!(!out_dir.join("aisdk-2021-12-15.parquet").exists());
    // Entry-level failures are not archive failures
    assert!(FailureLedger::new(config.ledger_path()).entries().unwrap().is_empty());

    // Fix the file by hand, then retry it as a loose file
    fs::write(&left_over, aisdk_csv(&day_rows(15))).unwrap();
    let retry = driver.convert_raw_files(&[left_over.clone()], &out_dir, Some(period)).unwrap();
    assert_eq!(retry.entries_converted, 1);
    assert!(left_over.exists());
    assert_eq!(file_shape(&out_dir.join("aisdk-2021-12-15.parquet")).unwrap().0, 3);
}

#[test]
fn test_out_of_period_rows_fail_the_entry() {
    let (_dir, root) = utf8_tempdir();
    let config = pipeline_config(&root);
    let period = Period::Month(2021, 11);

    write_zip(
        &config.archive_dir(&period).join("aisdk-2021-11.zip"),
        &[("aisdk-2021-11-30.csv", aisdk_csv(&day_rows(15)))],
    );

    let budget = InFlightBudget::new(1);
    let summary = IngestionDriver::new(&config, &budget).ingest_period(&period).unwrap();
    assert_eq!(summary.entries_failed, 1);
    assert_eq!(summary.entries_converted, 0);
}

#[test]
fn test_missing_inputs_are_fatal() {
    let (_dir, root) = utf8_tempdir();
    let config = pipeline_config(&root);
    let budget = InFlightBudget::new(1);
    let driver = IngestionDriver::new(&config, &budget);

    let missing = root.join("nope.csv");
    assert_eq!(
        driver
            .convert_raw_files(&[missing.clone()], &root.join("out"), None)
            .unwrap_err(),
        AisError::MissingInput(missing)
    );
}

#[test]
fn test_end_to_end_commands() {
    let (_dir, root) = utf8_tempdir();
    let config = pipeline_config(&root).with_periods(vec![Period::Year(2021)]);
    let period = Period::Year(2021);

    write_zip(
        &config.archive_dir(&period).join("aisdk-2021-12.zip"),
        &[
            ("aisdk-2021-12-15.csv", aisdk_csv(&day_rows(15))),
            ("aisdk-2021-12-16.csv", aisdk_csv(&day_rows(16))),
        ],
    );

    execute(&config, &Command::Ingest { period }).unwrap();
    let resampled = execute(&config, &Command::Resample { period }).unwrap();
    assert!(resampled.contains("2 resampled"));

    let cascade = execute(&config, &Command::Cascade { period }).unwrap();
    assert!(cascade.contains("aisdk-2021-1h.parquet"));

    for resolution in &config.resolutions {
        let artifact = config.final_artifact(&period, resolution);
        // Two vessels on two days, all within one hour of the day
        assert_eq!(file_shape(&artifact).unwrap().0, 4, "{artifact}");
    }

    let again = execute(&config, &Command::Cascade { period }).unwrap();
    assert!(again.contains("already exist"));

    let listing = execute(&config, &Command::InspectConverted).unwrap();
    assert!(listing.contains("2021"));
    let finals = execute(&config, &Command::InspectFinal).unwrap();
    assert!(finals.contains("aisdk-2021-15m.parquet"));
}
