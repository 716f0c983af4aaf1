//! Series Loader and Event Catalogue loader.
//!
//! Raw price exports mix date layouts (`14-May-97`, `"May 14, 2023"`,
//! ISO dates). Rows whose date or price cannot be parsed are skipped and
//! counted; the surviving rows are sorted, de-duplicated by date and validated
//! into an [`ObservationSeries`].

use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use csv::StringRecord;
use thiserror::Error;
use tracing::{debug, warn};

use super::events::{CalendarEvent, EventCatalogue};
use super::{InputError, ObservationSeries};

const DATE_FORMATS: [&str; 5] = ["%Y-%m-%d", "%d-%b-%y", "%b %d, %Y", "%d-%b-%Y", "%m/%d/%Y"];
const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// Errors raised by the file-backed collaborators.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("input file not found: {}", path.display())]
    MissingFile { path: PathBuf },
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error("required column `{column}` is missing in {source_name}")]
    MissingColumn {
        column: &'static str,
        source_name: String,
    },
    #[error("no parsable rows in {source_name}")]
    NoUsableRows { source_name: String },
    #[error(transparent)]
    Input(#[from] InputError),
}

/// A loaded series plus row accounting.
#[derive(Debug, Clone)]
pub struct LoadedSeries {
    pub series: ObservationSeries,
    pub rows_read: usize,
    pub rows_skipped: usize,
    pub duplicates_dropped: usize,
}

/// Load a `date,price` CSV file.
///
/// # Errors
///
/// Returns `LoadError::MissingFile` if the file does not exist, or another
/// `LoadError` if it cannot be read or yields an invalid series.
pub fn load_price_series(path: impl AsRef<Path>) -> Result<LoadedSeries, LoadError> {
    let path = path.as_ref();
    let file = open_existing(path)?;
    read_price_series(file, &path.display().to_string())
}

/// Parse `date,price` rows from any reader. A header row is tolerated and
/// skipped like any other unparsable row.
///
/// # Errors
///
/// Returns `LoadError` if no row parses or the parsed rows violate the
/// Observation Series invariants.
pub fn read_price_series<R: Read>(reader: R, source_name: &str) -> Result<LoadedSeries, LoadError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut rows = Vec::new();
    let mut rows_read = 0usize;
    let mut rows_skipped = 0usize;

    for (idx, result) in reader.records().enumerate() {
        rows_read += 1;
        let parsed = result
            .ok()
            .and_then(|record| parse_price_row(&record));
        if let Some(row) = parsed {
            rows.push(row);
        } else {
            rows_skipped += 1;
            debug!(line = idx + 1, source = source_name, "skipping unparsable price row");
        }
    }

    if rows.is_empty() {
        return Err(LoadError::NoUsableRows {
            source_name: source_name.to_string(),
        });
    }

    rows.sort_by_key(|(date, _)| *date);
    let before = rows.len();
    rows.dedup_by_key(|(date, _)| *date);
    let duplicates_dropped = before - rows.len();

    if rows_skipped > 0 || duplicates_dropped > 0 {
        warn!(
            source = source_name,
            rows_skipped, duplicates_dropped, "price rows dropped while loading"
        );
    }

    let series = ObservationSeries::from_pairs(rows)?;
    Ok(LoadedSeries {
        series,
        rows_read,
        rows_skipped,
        duplicates_dropped,
    })
}

/// Load an `Event,Date,Description` CSV file.
///
/// # Errors
///
/// Returns `LoadError::MissingFile` if the file does not exist, or
/// `LoadError::MissingColumn` if no `Date` column is present.
pub fn load_event_catalogue(path: impl AsRef<Path>) -> Result<EventCatalogue, LoadError> {
    let path = path.as_ref();
    let file = open_existing(path)?;
    read_event_catalogue(file, &path.display().to_string())
}

/// Degraded-mode variant of [`load_event_catalogue`]: any failure yields an
/// empty catalogue and a warning.
#[must_use]
pub fn load_event_catalogue_or_empty(path: impl AsRef<Path>) -> EventCatalogue {
    match load_event_catalogue(path.as_ref()) {
        Ok(catalogue) => catalogue,
        Err(error) => {
            warn!(%error, "event catalogue unavailable; continuing without events");
            EventCatalogue::empty()
        }
    }
}

/// Parse event rows from any reader with a header row.
///
/// # Errors
///
/// Returns `LoadError` if the header cannot be read or lacks a `Date` column.
pub fn read_event_catalogue<R: Read>(
    reader: R,
    source_name: &str,
) -> Result<EventCatalogue, LoadError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader.headers()?.clone();
    let header_map = build_header_map(&headers);
    let Some(&date_col) = header_map.get("date") else {
        return Err(LoadError::MissingColumn {
            column: "Date",
            source_name: source_name.to_string(),
        });
    };
    let name_col = header_map.get("event").copied();
    let description_col = header_map.get("description").copied();

    let mut events = Vec::new();
    for result in reader.records() {
        let Ok(record) = result else {
            continue;
        };
        let Some(date) = record.get(date_col).and_then(parse_date) else {
            continue;
        };
        let field = |col: Option<usize>| {
            col.and_then(|idx| record.get(idx))
                .unwrap_or_default()
                .to_string()
        };
        events.push(CalendarEvent {
            name: field(name_col),
            date,
            description: field(description_col),
        });
    }

    Ok(EventCatalogue::new(events))
}

/// Parse one of the supported date layouts.
#[must_use]
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim().trim_matches('"').trim();
    if trimmed.is_empty() {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
                .map(|datetime| datetime.date())
        })
}

fn parse_price_row(record: &StringRecord) -> Option<(NaiveDate, f64)> {
    let date = parse_date(record.get(0)?)?;
    let price = record.get(1)?.trim().parse::<f64>().ok()?;
    price.is_finite().then_some((date, price))
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (name.trim().to_ascii_lowercase(), idx))
        .collect()
}

fn open_existing(path: &Path) -> Result<std::fs::File, LoadError> {
    if !path.exists() {
        return Err(LoadError::MissingFile {
            path: path.to_path_buf(),
        });
    }
    std::fs::File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    #[test]
    fn parse_date_accepts_mixed_layouts() {
        assert_eq!(parse_date("20-May-87"), Some(day(1987, 5, 20)));
        assert_eq!(parse_date("\"Apr 22, 2020\""), Some(day(2020, 4, 22)));
        assert_eq!(parse_date("2022-11-14"), Some(day(2022, 11, 14)));
        assert_eq!(parse_date("2022-11-14 00:00:00"), Some(day(2022, 11, 14)));
        assert_eq!(parse_date("not a date"), None);
    }

    #[test]
    fn read_price_series_skips_header_and_bad_rows() {
        let raw = "Date,Price\n21-May-87,18.45\n20-May-87,18.63\n22-May-87,n/a\n\"Apr 22, 2020\",13.77\n";
        let loaded = read_price_series(raw.as_bytes(), "inline").expect("series should load");
        assert_eq!(loaded.rows_read, 5);
        assert_eq!(loaded.rows_skipped, 2);
        assert_eq!(loaded.series.len(), 3);
        assert_eq!(loaded.series.first_date(), Some(day(1987, 5, 20)));
        assert_eq!(loaded.series.last_date(), Some(day(2020, 4, 22)));
    }

    #[test]
    fn read_price_series_drops_duplicate_dates() {
        let raw = "2020-01-01,1.0\n2020-01-01,2.0\n2020-01-02,3.0\n";
        let loaded = read_price_series(raw.as_bytes(), "inline").expect("series should load");
        assert_eq!(loaded.duplicates_dropped, 1);
        assert!((loaded.series.values()[0] - 1.0).abs() < 1.0e-12);
    }

    #[test]
    fn read_price_series_without_rows_fails() {
        let error = read_price_series("Date,Price\n".as_bytes(), "inline")
            .expect_err("header only should fail");
        assert!(matches!(error, LoadError::NoUsableRows { .. }));
    }

    #[test]
    fn read_event_catalogue_skips_bad_dates() {
        let raw = "Event,Date,Description\nCut,2020-04-12,Big cut\nBroken,someday,??\n";
        let catalogue = read_event_catalogue(raw.as_bytes(), "inline").expect("events should load");
        assert_eq!(catalogue.len(), 1);
        assert_eq!(catalogue.events()[0].name, "Cut");
    }

    #[test]
    fn read_event_catalogue_requires_date_column() {
        let raw = "Event,When\nCut,2020-04-12\n";
        let error = read_event_catalogue(raw.as_bytes(), "inline").expect_err("no date column");
        assert!(matches!(error, LoadError::MissingColumn { column: "Date", .. }));
    }

    #[test]
    fn missing_series_file_is_typed() {
        let error = load_price_series("/definitely/not/here.csv").expect_err("missing file");
        assert!(matches!(error, LoadError::MissingFile { .. }));
    }

    #[test]
    fn missing_event_file_degrades_to_empty() {
        assert!(load_event_catalogue_or_empty("/definitely/not/here.csv").is_empty());
    }
}
