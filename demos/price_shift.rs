use chrono::NaiveDate;
use changepoint_models::{
    AnalysisConfig, CalendarEvent, ChangeIndexPosterior, ChangePointRecord, EventCatalogue,
    ObservationSeries, SamplerConfig, SeriesIndicators, analyze_change_point,
    parameter_correlation, render_analysis_tables, render_change_index_table,
};
use faer::Mat;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let series = build_synthetic_prices(240, 150)?;
    let catalogue = EventCatalogue::new(vec![CalendarEvent::new(
        "Supply cut",
        NaiveDate::from_ymd_opt(2020, 5, 27).ok_or("invalid date")?,
        "Producers announce a coordinated output cut",
    )]);

    let config = AnalysisConfig {
        sampler: SamplerConfig {
            draws: 1_000,
            tune: 1_000,
            chains: 4,
            seed: 2_020,
            ..SamplerConfig::default()
        },
        ..AnalysisConfig::default()
    };

    let analysis = analyze_change_point(&series, &config)?;
    let summary = &analysis.summary;
    println!(
        "Change point: index={}, date={}, pre={:.2}, post={:.2}",
        summary.change_index, summary.change_date, summary.pre_mean, summary.post_mean
    );
    println!(
        "Sampler: chains={}, draws={}, divergences={}",
        analysis.report.chains.len(),
        analysis.samples.len(),
        analysis.report.total_divergences()
    );

    println!("{}", render_analysis_tables(&analysis, config.credible_mass)?);

    let tau_posterior =
        ChangeIndexPosterior::from_indices(&analysis.samples.change_indices(), series.len())?;
    println!(
        "Posterior of tau (mode frequency {:.3}):",
        tau_posterior.mode_frequency()
    );
    println!("{}", render_change_index_table(&tau_posterior, &series, 5));

    let correlation: Mat<f64> = parameter_correlation(&analysis.samples);
    println!(
        "corr(mu_pre, mu_post)={:.3}, corr(tau, sigma)={:.3}",
        correlation[(1, 2)],
        correlation[(0, 3)]
    );

    let record = ChangePointRecord::from_summary(summary, &catalogue, 30);
    println!("{}", serde_json::to_string_pretty(&record)?);

    let indicators = SeriesIndicators::compute(&series, &catalogue, 1);
    println!("{}", indicators.to_json()?);

    Ok(())
}

fn build_synthetic_prices(
    days: usize,
    shift_at: usize,
) -> Result<ObservationSeries, Box<dyn std::error::Error>> {
    let start = NaiveDate::from_ymd_opt(2020, 1, 1).ok_or("invalid date")?;
    let values = (0..days)
        .map(|day| {
            let level = if day < shift_at { 62.0 } else { 38.0 };
            let phase = f64::from(u32::try_from(day % 7).unwrap_or(0));
            level + 1.5 * (phase * 0.9).sin()
        })
        .collect();
    Ok(ObservationSeries::daily(start, values)?)
}
