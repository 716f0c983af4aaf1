//! # Model inputs
//!
//! Defines the Observation Series consumed by the change-point model: an
//! ordered, gap-free sequence of `(index, date, value)` records.
//!
//! # Examples
//!
//! ```
//! use chrono::NaiveDate;
//! use changepoint_models::ObservationSeries;
//!
//! let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
//! let series = ObservationSeries::daily(start, vec![20.0, 21.0, 80.0]).unwrap();
//! assert_eq!(series.len(), 3);
//! assert_eq!(series.timestamp(2), NaiveDate::from_ymd_opt(2020, 1, 3));
//! ```
//!
//! ```
//! use chrono::NaiveDate;
//! use changepoint_models::ObservationSeries;
//!
//! let day = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
//! // Timestamps must be strictly increasing.
//! assert!(ObservationSeries::new(vec![day, day], vec![1.0, 2.0]).is_err());
//! ```

use chrono::{Days, NaiveDate};
use thiserror::Error;

pub mod events;
pub mod loader;

pub use events::{CalendarEvent, EventCatalogue};

/// Minimum series length accepted by the change-point model.
pub const MIN_OBSERVATIONS: usize = 2;

/// Errors returned when validating an Observation Series.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("series needs at least {minimum} observations; found {found}")]
    TooFewObservations { found: usize, minimum: usize },
    #[error("timestamp count ({timestamps}) must match value count ({values})")]
    LengthMismatch { timestamps: usize, values: usize },
    #[error("value at index {index} is not finite")]
    NonFiniteValue { index: usize },
    #[error("timestamp at index {index} ({current}) does not follow {previous}")]
    NonIncreasingTimestamp {
        index: usize,
        previous: NaiveDate,
        current: NaiveDate,
    },
    #[error("daily timestamp for index {index} is out of the supported date range")]
    DateOutOfRange { index: usize },
    #[error("no observations fall between {start} and {end}")]
    EmptyWindow { start: NaiveDate, end: NaiveDate },
}

/// One record of an Observation Series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub index: usize,
    pub timestamp: NaiveDate,
    pub value: f64,
}

/// Validated, chronologically ordered price observations.
///
/// Invariants: at least two records, strictly increasing timestamps and
/// finite values. The series is read-only once built.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationSeries {
    timestamps: Vec<NaiveDate>,
    values: Vec<f64>,
}

impl ObservationSeries {
    /// # Errors
    ///
    /// Returns `InputError` if lengths differ, the series is too short,
    /// a value is non-finite or timestamps are not strictly increasing.
    pub fn new(timestamps: Vec<NaiveDate>, values: Vec<f64>) -> Result<Self, InputError> {
        let series = Self { timestamps, values };
        series.validate()?;
        Ok(series)
    }

    /// Build a series from `(date, value)` pairs in the given order.
    ///
    /// # Errors
    ///
    /// Returns `InputError` under the same conditions as [`ObservationSeries::new`].
    pub fn from_pairs<I>(pairs: I) -> Result<Self, InputError>
    where
        I: IntoIterator<Item = (NaiveDate, f64)>,
    {
        let (timestamps, values): (Vec<NaiveDate>, Vec<f64>) = pairs.into_iter().unzip();
        Self::new(timestamps, values)
    }

    /// Consecutive calendar days starting at `start`.
    ///
    /// # Errors
    ///
    /// Returns `InputError` if the values are invalid or the dates overflow.
    pub fn daily(start: NaiveDate, values: Vec<f64>) -> Result<Self, InputError> {
        let timestamps = (0..values.len())
            .map(|index| {
                u64::try_from(index)
                    .ok()
                    .and_then(|offset| start.checked_add_days(Days::new(offset)))
                    .ok_or(InputError::DateOutOfRange { index })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(timestamps, values)
    }

    /// # Errors
    ///
    /// Returns `InputError` if the series invariants do not hold.
    pub fn validate(&self) -> Result<(), InputError> {
        if self.timestamps.len() != self.values.len() {
            return Err(InputError::LengthMismatch {
                timestamps: self.timestamps.len(),
                values: self.values.len(),
            });
        }
        if self.values.len() < MIN_OBSERVATIONS {
            return Err(InputError::TooFewObservations {
                found: self.values.len(),
                minimum: MIN_OBSERVATIONS,
            });
        }
        if let Some(index) = self.values.iter().position(|value| !value.is_finite()) {
            return Err(InputError::NonFiniteValue { index });
        }
        if let Some(offset) = self
            .timestamps
            .windows(2)
            .position(|pair| pair[1] <= pair[0])
        {
            return Err(InputError::NonIncreasingTimestamp {
                index: offset + 1,
                previous: self.timestamps[offset],
                current: self.timestamps[offset + 1],
            });
        }
        Ok(())
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    #[must_use]
    pub fn timestamps(&self) -> &[NaiveDate] {
        &self.timestamps
    }

    #[must_use]
    pub fn timestamp(&self, index: usize) -> Option<NaiveDate> {
        self.timestamps.get(index).copied()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<Observation> {
        Some(Observation {
            index,
            timestamp: *self.timestamps.get(index)?,
            value: *self.values.get(index)?,
        })
    }

    #[must_use]
    pub fn first_date(&self) -> Option<NaiveDate> {
        self.timestamps.first().copied()
    }

    #[must_use]
    pub fn last_date(&self) -> Option<NaiveDate> {
        self.timestamps.last().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = Observation> + '_ {
        self.timestamps
            .iter()
            .zip(&self.values)
            .enumerate()
            .map(|(index, (timestamp, value))| Observation {
                index,
                timestamp: *timestamp,
                value: *value,
            })
    }

    /// Re-indexed sub-series with `start <= date <= end`.
    ///
    /// Used to rerun the single change-point analysis on separate time windows.
    ///
    /// # Errors
    ///
    /// Returns `InputError::EmptyWindow` if nothing falls in range, or
    /// `TooFewObservations` if the window keeps a single record.
    pub fn window(&self, start: NaiveDate, end: NaiveDate) -> Result<Self, InputError> {
        let first = self.timestamps.partition_point(|date| *date < start);
        let last = self.timestamps.partition_point(|date| *date <= end);
        if first >= last {
            return Err(InputError::EmptyWindow { start, end });
        }
        Self::new(
            self.timestamps[first..last].to_vec(),
            self.values[first..last].to_vec(),
        )
    }
}
