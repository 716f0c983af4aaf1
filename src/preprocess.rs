use chrono::NaiveDate;

use crate::input::ObservationSeries;
use crate::utils::{mean, sample_std_dev};

/// Default absolute tolerance used by [`series_has_variation`].
pub const DEFAULT_VARIATION_TOLERANCE: f64 = 1.0e-12;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesDiagnostics {
    pub n_observations: usize,
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
    pub has_variation: bool,
}

#[must_use]
pub fn series_diagnostics(series: &ObservationSeries) -> SeriesDiagnostics {
    let values = series.values();
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for value in values {
        min = min.min(*value);
        max = max.max(*value);
    }

    SeriesDiagnostics {
        n_observations: series.len(),
        first_date: series.first_date().unwrap_or_default(),
        last_date: series.last_date().unwrap_or_default(),
        min,
        max,
        mean: mean(values),
        std_dev: sample_std_dev(values),
        has_variation: (max - min).abs() > DEFAULT_VARIATION_TOLERANCE,
    }
}

/// Whether the series spans more than `tolerance` between its extremes.
#[must_use]
pub fn series_has_variation(series: &ObservationSeries, tolerance: f64) -> bool {
    if series.len() < 2 {
        return false;
    }
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for value in series.values() {
        min = min.min(*value);
        max = max.max(*value);
    }
    (max - min).abs() > tolerance.abs()
}

/// Day-over-day fractional changes `(x[i] - x[i-1]) / x[i-1]`; pairs with a
/// zero denominator are skipped.
#[must_use]
pub fn daily_returns(values: &[f64]) -> Vec<f64> {
    values
        .windows(2)
        .filter(|pair| pair[0] != 0.0)
        .map(|pair| (pair[1] - pair[0]) / pair[0])
        .collect()
}
