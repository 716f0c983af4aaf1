use std::io::Write;

use chrono::NaiveDate;
use changepoint_models::{
    AnalysisConfig, ChangePointRecord, ChangePointSummary, LoadError, SamplerConfig,
    SeriesIndicators, analyze_change_point, load_event_catalogue, load_event_catalogue_or_empty,
    load_price_series, load_summary_record, load_summary_record_or_default, save_summary_record,
};

fn day(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

fn write_file(dir: &tempfile::TempDir, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).expect("file creates");
    file.write_all(contents.as_bytes()).expect("file writes");
    path
}

#[test]
fn mixed_format_price_file_loads_sorted_and_deduplicated() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = write_file(
        &dir,
        "prices.csv",
        "Date,Price\n\
         22-May-87,18.55\n\
         20-May-87,18.63\n\
         \"Apr 22, 2020\",13.77\n\
         21-May-87,18.45\n\
         21-May-87,99.0\n\
         garbage,1.0\n\
         2022-11-14,93.59\n",
    );

    let loaded = load_price_series(&path).expect("series loads");
    let series = &loaded.series;
    assert_eq!(series.len(), 5);
    assert_eq!(series.first_date(), Some(day(1987, 5, 20)));
    assert_eq!(series.last_date(), Some(day(2022, 11, 14)));
    assert_eq!(series.values()[1], 18.45);
    assert_eq!(loaded.duplicates_dropped, 1);
    // header and the garbage row
    assert_eq!(loaded.rows_skipped, 2);
}

#[test]
fn missing_files_are_typed_failures() {
    let dir = tempfile::tempdir().expect("temp dir");
    let absent = dir.path().join("absent.csv");

    assert!(matches!(
        load_price_series(&absent),
        Err(LoadError::MissingFile { .. })
    ));
    assert!(matches!(
        load_event_catalogue(&absent),
        Err(LoadError::MissingFile { .. })
    ));
    assert!(load_event_catalogue_or_empty(&absent).is_empty());
}

#[test]
fn full_pipeline_writes_record_and_payloads() {
    let dir = tempfile::tempdir().expect("temp dir");
    let mut prices = String::from("Date,Price\n");
    for offset in 0..60u64 {
        let date = day(2020, 2, 1)
            .checked_add_days(chrono::Days::new(offset))
            .expect("date in range");
        let wiggle = if offset % 2 == 0 { 0.4 } else { -0.4 };
        let level = if offset < 38 { 55.0 } else { 28.0 };
        prices.push_str(&format!("{},{:.2}\n", date.format("%Y-%m-%d"), level + wiggle));
    }
    let price_path = write_file(&dir, "prices.csv", &prices);
    let event_path = write_file(
        &dir,
        "events.csv",
        "Event,Date,Description\n\
         OPEC+ Agreement,2020-04-12,Unprecedented output cut\n\
         Price war,2020-03-08,Producers abandon quotas\n\
         broken row without date\n",
    );

    let series = load_price_series(&price_path).expect("prices load").series;
    let catalogue = load_event_catalogue(&event_path).expect("events load");
    assert_eq!(catalogue.len(), 2);

    let config = AnalysisConfig {
        sampler: SamplerConfig {
            draws: 400,
            tune: 500,
            chains: 2,
            ..SamplerConfig::default()
        },
        ..AnalysisConfig::default()
    };
    let analysis = analyze_change_point(&series, &config).expect("analysis runs");
    assert_eq!(analysis.summary.change_index, 38);
    assert_eq!(analysis.summary.change_date, day(2020, 3, 10));

    let record_path = dir.path().join("analysis_summary.csv");
    save_summary_record(&record_path, &analysis.summary).expect("record saves");
    let restored = load_summary_record(&record_path).expect("record loads");
    assert_eq!(restored.change_index, analysis.summary.change_index);
    assert_eq!(restored.change_date, analysis.summary.change_date);
    assert!((restored.pre_mean - analysis.summary.pre_mean).abs() < 1e-9);

    let record = ChangePointRecord::from_summary(&restored, &catalogue, 14);
    assert_eq!(record.date, "2020-03-10");
    assert_eq!(record.event.as_deref(), Some("Price war"));
    assert!(record.impact_percent < -40.0 && record.impact_percent > -55.0);

    let indicators = SeriesIndicators::compute(&series, &catalogue, 1);
    assert_eq!(indicators.total_events, 2);
    assert!(indicators.annualized_volatility > 0.0);
    assert!((indicators.latest_price - 27.6).abs() < 1e-9);
}

#[test]
fn corrupt_record_degrades_to_zero_summary() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = write_file(&dir, "analysis_summary.csv", "not,a,summary\n1,2\n");
    assert!(load_summary_record(&path).is_err());
    assert_eq!(
        load_summary_record_or_default(&path),
        ChangePointSummary::default()
    );
}
