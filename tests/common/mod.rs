#![allow(dead_code)]

use std::{fs::File, io::Write, sync::Arc};

use aisprint::config::PipelineConfig;
use arrow_array::{Array, RecordBatch};
use camino::{Utf8Path, Utf8PathBuf};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

pub const HEADER: &str = "# Timestamp,Type of mobile,MMSI,Latitude,Longitude,Navigational status,ROT,SOG,COG,Heading,IMO,Callsign,Name,Ship type,Cargo type,Width,Length,Type of position fixing device,Draught,Destination,ETA,Data source type,A,B,C,D";

/// One raw `aisdk` line with the fields the tests care about.
pub fn csv_row(timestamp: &str, mmsi: &str, sog: &str, name: &str) -> String {
    format!(
        "{timestamp},Class A,{mmsi},55.67,12.58,Under way using engine,0.0,{sog},181.2,180,,OZ2048,{name},Cargo,,24,160,GPS,7.2,COPENHAGEN,,AIS,120,40,12,12"
    )
}

pub fn aisdk_csv(rows: &[String]) -> String {
    let mut csv = String::from(HEADER);
    csv.push('\n');
    for row in rows {
        csv.push_str(row);
        csv.push('\n');
    }
    csv
}

pub fn write_zip(path: &Utf8Path, entries: &[(&str, String)]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
    for (name, content) in entries {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
}

pub fn utf8_tempdir() -> (TempDir, Utf8PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
    (dir, path)
}

pub fn pipeline_config(root: &Utf8Path) -> PipelineConfig {
    PipelineConfig::new(root.join("zips"), root.join("work")).unwrap()
}

pub fn column<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> &'a T {
    batch
        .column_by_name(name)
        .unwrap_or_else(|| panic!("column {name} missing"))
        .as_any()
        .downcast_ref::<T>()
        .unwrap_or_else(|| panic!("column {name} has unexpected type"))
}

pub fn arc<A: Array + 'static>(array: A) -> Arc<dyn Array> {
    Arc::new(array)
}
