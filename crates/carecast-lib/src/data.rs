//! Time series CSV loading
//!
//! Expected header: `timestamp,admissions,discharges,bed_occupancy,oxygen_level,occupancy_rate`.
//! Additional columns are ignored. `occupancy_rate` may be omitted and is
//! then derived from bed occupancy and the bed count.

use crate::error::{Error, Result};
use crate::models::{validate_series, TimeSeriesRecord, DEFAULT_TOTAL_BEDS};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use std::io::Read;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct CsvRow {
    timestamp: String,
    admissions: u32,
    discharges: u32,
    bed_occupancy: u32,
    oxygen_level: f64,
    #[serde(default)]
    occupancy_rate: Option<f64>,
}

/// Load and validate a series from a CSV file
pub fn load_series_csv(path: impl AsRef<Path>) -> Result<Vec<TimeSeriesRecord>> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)
        .map_err(|e| Error::Validation(format!("cannot open {}: {}", path.display(), e)))?;
    let series = read_series_csv(file, DEFAULT_TOTAL_BEDS)?;
    debug!(path = %path.display(), rows = series.len(), "Loaded time series");
    Ok(series)
}

/// Parse a series from any CSV reader
pub fn read_series_csv<R: Read>(reader: R, total_beds: u32) -> Result<Vec<TimeSeriesRecord>> {
    let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

    let mut series = Vec::new();
    for (i, row) in csv_reader.deserialize::<CsvRow>().enumerate() {
        let row = row.map_err(|e| Error::Validation(format!("row {}: {}", i, e)))?;
        let timestamp = parse_timestamp(&row.timestamp).ok_or_else(|| {
            Error::Validation(format!("row {}: bad timestamp {:?}", i, row.timestamp))
        })?;
        let occupancy_rate = row
            .occupancy_rate
            .unwrap_or_else(|| row.bed_occupancy as f64 / total_beds.max(1) as f64 * 100.0);

        series.push(TimeSeriesRecord {
            timestamp,
            admissions: row.admissions,
            discharges: row.discharges,
            bed_occupancy: row.bed_occupancy,
            oxygen_level: row.oxygen_level,
            occupancy_rate,
        });
    }

    validate_series(&series, total_beds)?;
    Ok(series)
}

/// RFC 3339 or `YYYY-MM-DD HH:MM:SS[.fff]` taken as UTC
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc())
}
