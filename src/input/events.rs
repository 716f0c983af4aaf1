//! Event Catalogue: labeled calendar events used to annotate detected shifts.
//!
//! The catalogue never constrains the model; it is informational input for
//! reports.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A labeled calendar event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    #[serde(rename = "Event")]
    pub name: String,
    #[serde(rename = "Date")]
    pub date: NaiveDate,
    #[serde(rename = "Description")]
    pub description: String,
}

impl CalendarEvent {
    #[must_use]
    pub fn new(name: impl Into<String>, date: NaiveDate, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            date,
            description: description.into(),
        }
    }
}

/// Date-ordered collection of events. An empty catalogue is a valid value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCatalogue {
    events: Vec<CalendarEvent>,
}

impl EventCatalogue {
    #[must_use]
    pub const fn empty() -> Self {
        Self { events: Vec::new() }
    }

    /// Build a catalogue; events are stored sorted by date (stable for ties).
    #[must_use]
    pub fn new(mut events: Vec<CalendarEvent>) -> Self {
        events.sort_by_key(|event| event.date);
        Self { events }
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    #[must_use]
    pub fn events(&self) -> &[CalendarEvent] {
        &self.events
    }

    /// Events with `start <= date <= end`.
    pub fn between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> impl Iterator<Item = &CalendarEvent> + '_ {
        self.events
            .iter()
            .filter(move |event| event.date >= start && event.date <= end)
    }

    /// Closest event to `date` within `max_days`; earlier event wins ties.
    #[must_use]
    pub fn nearest(&self, date: NaiveDate, max_days: u32) -> Option<&CalendarEvent> {
        self.events
            .iter()
            .map(|event| ((event.date - date).num_days().unsigned_abs(), event))
            .filter(|(distance, _)| *distance <= u64::from(max_days))
            .min_by_key(|(distance, _)| *distance)
            .map(|(_, event)| event)
    }
}
