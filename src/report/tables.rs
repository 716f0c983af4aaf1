//! Text tables for a finished analysis, rendered with `comfy_table`.

use comfy_table::{Attribute, Cell, Color, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};

use crate::input::ObservationSeries;
use crate::models::changepoint::{
    ChangeIndexPosterior, ChangePointAnalysis, ChangePointError, ParameterSummary,
    SamplerReport, summarize_parameters,
};

/// Split-R-hat above this value is highlighted in the convergence table.
const RHAT_WARNING: f64 = 1.01;

/// Rendered tables for one analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisTables {
    pub summary: String,
    pub parameters: String,
    pub chains: String,
    pub convergence: String,
}

impl std::fmt::Display for AnalysisTables {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Change point")?;
        writeln!(f, "{}", self.summary)?;
        writeln!(f, "Posterior parameters")?;
        writeln!(f, "{}", self.parameters)?;
        writeln!(f, "Chains")?;
        writeln!(f, "{}", self.chains)?;
        writeln!(f, "Convergence")?;
        write!(f, "{}", self.convergence)
    }
}

/// Render the summary, parameter, chain and convergence tables.
///
/// # Errors
///
/// Returns `ChangePointError` if `credible_mass` is outside `(0, 1)`.
pub fn render_analysis_tables(
    analysis: &ChangePointAnalysis,
    credible_mass: f64,
) -> Result<AnalysisTables, ChangePointError> {
    let parameters = summarize_parameters(&analysis.samples, credible_mass)?;
    Ok(AnalysisTables {
        summary: summary_table(analysis).to_string(),
        parameters: parameter_table(&parameters).to_string(),
        chains: chain_table(&analysis.report).to_string(),
        convergence: convergence_table(&analysis.report).to_string(),
    })
}

/// Top `limit` change indices by posterior frequency, with their dates.
#[must_use]
pub fn render_change_index_table(
    posterior: &ChangeIndexPosterior,
    series: &ObservationSeries,
    limit: usize,
) -> String {
    let mut ranked: Vec<(usize, usize)> = posterior
        .counts()
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, count)| *count > 0)
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    let mut table = make_table(&["tau", "date", "draws", "probability"]);
    for (index, count) in ranked.into_iter().take(limit) {
        let date = series
            .timestamp(index)
            .map_or_else(|| "-".to_string(), |d| d.to_string());
        let tau_cell = if index == posterior.mode() {
            Cell::new(index).add_attribute(Attribute::Bold)
        } else {
            Cell::new(index)
        };
        table.add_row(vec![
            tau_cell,
            Cell::new(date),
            Cell::new(count),
            Cell::new(format!("{:.4}", posterior.probability(index))),
        ]);
    }
    table.to_string()
}

fn summary_table(analysis: &ChangePointAnalysis) -> Table {
    let summary = &analysis.summary;
    let mut table = make_table(&["field", "value"]);
    table.add_row(vec![Cell::new("change index"), Cell::new(summary.change_index)]);
    table.add_row(vec![
        Cell::new("change date"),
        Cell::new(summary.change_date.to_string()),
    ]);
    table.add_row(vec![
        Cell::new("pre-change mean"),
        Cell::new(format!(
            "{:.4} [{:.4}, {:.4}]",
            summary.pre_mean, summary.pre_mean_interval.0, summary.pre_mean_interval.1
        )),
    ]);
    table.add_row(vec![
        Cell::new("post-change mean"),
        Cell::new(format!(
            "{:.4} [{:.4}, {:.4}]",
            summary.post_mean, summary.post_mean_interval.0, summary.post_mean_interval.1
        )),
    ]);
    table.add_row(vec![
        Cell::new("shift"),
        Cell::new(format!("{:+.4}", summary.shift())),
    ]);
    let change = summary
        .percentage_change()
        .map_or_else(|_| "undefined".to_string(), |pct| format!("{pct:+.1}%"));
    table.add_row(vec![Cell::new("change"), Cell::new(change)]);
    table
}

fn parameter_table(rows: &[ParameterSummary]) -> Table {
    let mut table = make_table(&[
        "parameter", "mean", "sd", "hdi_low", "hdi_high", "q2.5", "q50", "q97.5",
    ]);
    for row in rows {
        table.add_row(vec![
            Cell::new(row.parameter.name()),
            Cell::new(format!("{:.4}", row.mean)),
            Cell::new(format!("{:.4}", row.std_dev)),
            Cell::new(format!("{:.4}", row.hdi_low)),
            Cell::new(format!("{:.4}", row.hdi_high)),
            Cell::new(format!("{:.4}", row.q025)),
            Cell::new(format!("{:.4}", row.q50)),
            Cell::new(format!("{:.4}", row.q975)),
        ]);
    }
    table
}

fn chain_table(report: &SamplerReport) -> Table {
    let mut table = make_table(&[
        "chain",
        "seed",
        "draws",
        "acc_tau",
        "acc_sigma",
        "divergences",
        "sigma_scale",
        "min_ess",
    ]);
    for chain in &report.chains {
        let divergences = if chain.divergences > 0 {
            Cell::new(chain.divergences).fg(Color::Red)
        } else {
            Cell::new(chain.divergences)
        };
        table.add_row(vec![
            Cell::new(chain.chain),
            Cell::new(chain.seed),
            Cell::new(chain.retained_draws),
            Cell::new(format!("{:.3}", chain.acceptance_rates.change_index)),
            Cell::new(format!("{:.3}", chain.acceptance_rates.sigma)),
            divergences,
            Cell::new(format!("{:.4}", chain.log_sigma_draw_scale)),
            Cell::new(format!("{:.1}", chain.effective_sample_size.min())),
        ]);
    }
    table
}

fn convergence_table(report: &SamplerReport) -> Table {
    let convergence = &report.convergence;
    let mut table = make_table(&["parameter", "split_rhat"]);
    let rows = [
        ("tau", convergence.change_index_split_rhat),
        ("mu_pre", convergence.pre_mean_split_rhat),
        ("mu_post", convergence.post_mean_split_rhat),
        ("sigma", convergence.sigma_split_rhat),
    ];
    for (name, rhat) in rows {
        table.add_row(vec![Cell::new(name), rhat_cell(rhat)]);
    }
    table
}

fn rhat_cell(rhat: Option<f64>) -> Cell {
    match rhat {
        None => Cell::new("n/a"),
        Some(value) if value > RHAT_WARNING => Cell::new(format!("{value:.4}"))
            .fg(Color::Yellow)
            .add_attribute(Attribute::Bold),
        Some(value) => Cell::new(format!("{value:.4}")),
    }
}

fn make_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(headers.iter().map(|h| Cell::new(*h)).collect::<Vec<_>>());
    table
}
