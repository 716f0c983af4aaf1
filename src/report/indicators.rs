//! Headline indicators for a price series.

use serde::{Deserialize, Serialize};

use crate::input::{EventCatalogue, ObservationSeries};
use crate::preprocess::daily_returns;
use crate::utils::{mean, sample_std_dev};

/// Trading days used to annualize daily volatility.
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Dashboard indicators. Prices and volatility are rounded to two decimals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SeriesIndicators {
    pub latest_price: f64,
    pub average_price: f64,
    /// Sample standard deviation of daily percentage changes, annualized.
    pub annualized_volatility: f64,
    pub total_events: usize,
    pub detected_change_points: usize,
}

impl SeriesIndicators {
    #[must_use]
    pub fn compute(
        series: &ObservationSeries,
        catalogue: &EventCatalogue,
        detected_change_points: usize,
    ) -> Self {
        let values = series.values();
        let latest_price = values.last().copied().unwrap_or_default();
        let average_price = if values.is_empty() { 0.0 } else { mean(values) };
        let volatility =
            sample_std_dev(&daily_returns(values)) * 100.0 * TRADING_DAYS_PER_YEAR.sqrt();

        Self {
            latest_price: round2(latest_price),
            average_price: round2(average_price),
            annualized_volatility: round2(volatility),
            total_events: catalogue.len(),
            detected_change_points,
        }
    }

    /// # Errors
    ///
    /// Returns `serde_json::Error` if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    use super::*;
    use crate::input::CalendarEvent;

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2022, 1, 3).expect("valid date")
    }

    #[test]
    fn indicators_follow_price_history() {
        let series =
            ObservationSeries::daily(start(), vec![100.0, 110.0, 99.0, 99.0]).expect("series");
        let catalogue = EventCatalogue::new(vec![CalendarEvent::new("x", start(), "")]);
        let indicators = SeriesIndicators::compute(&series, &catalogue, 2);

        assert_relative_eq!(indicators.latest_price, 99.0);
        assert_relative_eq!(indicators.average_price, 102.0);
        assert_eq!(indicators.total_events, 1);
        assert_eq!(indicators.detected_change_points, 2);

        // returns: 0.1, -0.1, 0.0 -> sample sd 0.1
        let expected = (0.1_f64 * 100.0 * 252.0_f64.sqrt() * 100.0).round() / 100.0;
        assert_relative_eq!(indicators.annualized_volatility, expected);
    }

    #[test]
    fn flat_series_has_zero_volatility() {
        let series = ObservationSeries::daily(start(), vec![5.0, 5.0, 5.0]).expect("series");
        let indicators = SeriesIndicators::compute(&series, &EventCatalogue::empty(), 0);
        assert_relative_eq!(indicators.annualized_volatility, 0.0);
        let json = indicators.to_json().expect("serializes");
        assert!(json.contains("\"latest_price\":5.0"));
    }
}
