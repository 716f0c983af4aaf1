//! # Report Emitter helpers
//!
//! Presentation-facing views of a finished analysis: text tables, the flat
//! persisted summary record, JSON payloads for an API layer and headline
//! series indicators. Nothing here feeds back into sampling.

pub mod indicators;
pub mod record;
pub mod tables;

pub use indicators::{SeriesIndicators, TRADING_DAYS_PER_YEAR};
pub use record::{
    ChangePointRecord, RecordError, change_point_payload, load_summary_record,
    load_summary_record_or_default, read_summary_record, save_summary_record,
    write_summary_record,
};
pub use tables::{AnalysisTables, render_analysis_tables, render_change_index_table};
