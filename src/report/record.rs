//! Persisted summary record and API payloads.
//!
//! A Change-Point Summary is stored as a flat CSV record: one header row of
//! field names and one row of values. Readers that only need the numbers can
//! use [`load_summary_record_or_default`], which degrades to a zero-valued
//! summary instead of failing.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::input::EventCatalogue;
use crate::input::loader::parse_date;
use crate::models::changepoint::{ChangePointSummary, percentage_change};

/// Errors raised while persisting or reading a summary record.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("summary record not found: {}", path.display())]
    MissingFile { path: PathBuf },
    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error("summary record in {source_name} has no value row")]
    EmptyRecord { source_name: String },
    #[error("unparsable change date `{value}`")]
    InvalidDate { value: String },
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct FlatSummaryRow {
    #[serde(rename = "Change Point Index")]
    change_index: usize,
    #[serde(rename = "Change Point Date")]
    change_date: String,
    #[serde(rename = "Pre-Change Mean")]
    pre_mean: f64,
    #[serde(rename = "Post-Change Mean")]
    post_mean: f64,
    #[serde(rename = "Pre-Change HDI Low")]
    pre_low: f64,
    #[serde(rename = "Pre-Change HDI High")]
    pre_high: f64,
    #[serde(rename = "Post-Change HDI Low")]
    post_low: f64,
    #[serde(rename = "Post-Change HDI High")]
    post_high: f64,
}

impl From<&ChangePointSummary> for FlatSummaryRow {
    fn from(summary: &ChangePointSummary) -> Self {
        Self {
            change_index: summary.change_index,
            change_date: summary.change_date.format("%Y-%m-%d").to_string(),
            pre_mean: summary.pre_mean,
            post_mean: summary.post_mean,
            pre_low: summary.pre_mean_interval.0,
            pre_high: summary.pre_mean_interval.1,
            post_low: summary.post_mean_interval.0,
            post_high: summary.post_mean_interval.1,
        }
    }
}

impl TryFrom<FlatSummaryRow> for ChangePointSummary {
    type Error = RecordError;

    fn try_from(row: FlatSummaryRow) -> Result<Self, Self::Error> {
        let change_date = parse_date(&row.change_date).ok_or(RecordError::InvalidDate {
            value: row.change_date,
        })?;
        Ok(Self {
            change_index: row.change_index,
            change_date,
            pre_mean: row.pre_mean,
            post_mean: row.post_mean,
            pre_mean_interval: (row.pre_low, row.pre_high),
            post_mean_interval: (row.post_low, row.post_high),
        })
    }
}

/// Write `summary` as a header row plus one value row.
///
/// # Errors
///
/// Returns `RecordError::Csv` if the writer fails.
pub fn write_summary_record<W: Write>(
    writer: W,
    summary: &ChangePointSummary,
) -> Result<(), RecordError> {
    let mut writer = csv::Writer::from_writer(writer);
    writer.serialize(FlatSummaryRow::from(summary))?;
    writer.flush().map_err(csv::Error::from)?;
    Ok(())
}

/// Persist `summary` to `path`, replacing any existing file.
///
/// # Errors
///
/// Returns `RecordError::Io` if the file cannot be created, or
/// `RecordError::Csv` if writing fails.
pub fn save_summary_record(
    path: impl AsRef<Path>,
    summary: &ChangePointSummary,
) -> Result<(), RecordError> {
    let path = path.as_ref();
    let file = std::fs::File::create(path).map_err(|source| RecordError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    write_summary_record(file, summary)
}

/// Read the first value row of a summary record.
///
/// # Errors
///
/// Returns `RecordError` if the record has no value row, a field is missing
/// or malformed, or the change date cannot be parsed.
pub fn read_summary_record<R: Read>(
    reader: R,
    source_name: &str,
) -> Result<ChangePointSummary, RecordError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let row: FlatSummaryRow = reader
        .deserialize()
        .next()
        .ok_or_else(|| RecordError::EmptyRecord {
            source_name: source_name.to_string(),
        })??;
    ChangePointSummary::try_from(row)
}

/// Load a summary record from `path`.
///
/// # Errors
///
/// Returns `RecordError::MissingFile` if the file does not exist, plus the
/// errors of [`read_summary_record`].
pub fn load_summary_record(path: impl AsRef<Path>) -> Result<ChangePointSummary, RecordError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(RecordError::MissingFile {
            path: path.to_path_buf(),
        });
    }
    let file = std::fs::File::open(path).map_err(|source| RecordError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    read_summary_record(file, &path.display().to_string())
}

/// Degraded-mode variant of [`load_summary_record`]: a missing or corrupt
/// record yields a zero-valued summary and a warning.
#[must_use]
pub fn load_summary_record_or_default(path: impl AsRef<Path>) -> ChangePointSummary {
    let path = path.as_ref();
    match load_summary_record(path) {
        Ok(summary) => summary,
        Err(error) => {
            warn!(path = %path.display(), %error, "summary record unavailable; using zeros");
            ChangePointSummary::default()
        }
    }
}

/// One detected change point as served to a dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangePointRecord {
    /// `YYYY-MM-DD`.
    pub date: String,
    pub pre_mean: f64,
    pub post_mean: f64,
    /// Percentage change rounded to one decimal; `0.0` when `pre_mean` is zero.
    pub impact_percent: f64,
    pub event: Option<String>,
    pub description: Option<String>,
}

impl ChangePointRecord {
    /// Build a record from `summary`, labelled with the nearest catalogue
    /// event no more than `max_days` away.
    #[must_use]
    pub fn from_summary(
        summary: &ChangePointSummary,
        catalogue: &EventCatalogue,
        max_days: u32,
    ) -> Self {
        let nearest = catalogue.nearest(summary.change_date, max_days);
        Self {
            date: summary.change_date.format("%Y-%m-%d").to_string(),
            pre_mean: summary.pre_mean,
            post_mean: summary.post_mean,
            impact_percent: rounded_impact(summary.pre_mean, summary.post_mean),
            event: nearest.map(|event| event.name.clone()),
            description: nearest.map(|event| event.description.clone()),
        }
    }

    /// Replace the event label, e.g. with a curated name for a known window.
    #[must_use]
    pub fn with_event(mut self, event: impl Into<String>, description: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self.description = Some(description.into());
        self
    }
}

fn rounded_impact(pre_mean: f64, post_mean: f64) -> f64 {
    percentage_change(pre_mean, post_mean).map_or(0.0, |pct| (pct * 10.0).round() / 10.0)
}

/// Serialize change-point records as a JSON array.
///
/// # Errors
///
/// Returns `RecordError::Json` if serialization fails.
pub fn change_point_payload(records: &[ChangePointRecord]) -> Result<String, RecordError> {
    Ok(serde_json::to_string(records)?)
}
