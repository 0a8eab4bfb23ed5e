//! Loading of grade records and teacher assignments exported by the records
//! service, as a JSON array or a CSV file with a header row.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{AnalyticsError, Result};
use crate::filter::TeacherAssignment;
use crate::models::GradeRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Csv,
}

impl Format {
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("json") => Ok(Format::Json),
            Some("csv") => Ok(Format::Csv),
            _ => Err(AnalyticsError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

pub fn read_json<T: DeserializeOwned, R: Read>(reader: R) -> Result<Vec<T>> {
    Ok(serde_json::from_reader(reader)?)
}

pub fn read_csv<T: DeserializeOwned, R: Read>(reader: R) -> Result<Vec<T>> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut rows = Vec::new();
    for result in reader.deserialize::<T>() {
        rows.push(result?);
    }
    Ok(rows)
}

fn load<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let format = Format::from_path(path)?;
    let reader = BufReader::new(File::open(path)?);
    let rows = match format {
        Format::Json => read_json(reader)?,
        Format::Csv => read_csv(reader)?,
    };
    debug!(path = %path.display(), rows = rows.len(), "loaded rows");
    Ok(rows)
}

pub fn load_records(path: &Path) -> Result<Vec<GradeRecord>> {
    load(path)
}

pub fn load_assignments(path: &Path) -> Result<Vec<TeacherAssignment>> {
    load(path)
}
