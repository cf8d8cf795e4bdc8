//! Plain-text table renderings of analysis and forecast results.

use chrono::NaiveDate;
use tabled::{Table, Tabled};

use crate::common::types::{ForecastResult, TimeSeries};
use crate::metrics::display::MetricTable;
use crate::metrics::{Metric, MetricBundle};
use crate::seasonality::decomposition::Decomposition;
use crate::seasonality::detection::SeasonalityResult;
use crate::stationarity::AdfResult;
use crate::summary::{BoxPlot, HistogramBin, SeriesSummary};

/// Suffix marking the best value of a metric column.
pub const BEST_MARK: &str = " *";

fn num(v: f64) -> String {
    format!("{:.2}", v)
}

fn opt_num(v: Option<f64>) -> String {
    v.map(num).unwrap_or_default()
}

#[derive(Tabled)]
struct ObservationRow {
    #[tabled(rename = "Date")]
    date: NaiveDate,
    #[tabled(rename = "Value")]
    value: String,
}

pub fn history_table(series: &TimeSeries) -> String {
    let rows = series
        .timestamps
        .iter()
        .zip(&series.values)
        .map(|(date, v)| ObservationRow {
            date: *date,
            value: num(*v),
        });
    Table::new(rows).to_string()
}

#[derive(Tabled)]
struct StatRow {
    #[tabled(rename = "Statistic")]
    name: &'static str,
    #[tabled(rename = "Value")]
    value: String,
}

fn stat(name: &'static str, value: String) -> StatRow {
    StatRow { name, value }
}

pub fn summary_table(summary: &SeriesSummary) -> String {
    let rows = [
        stat("count", summary.count.to_string()),
        stat("mean", num(summary.mean)),
        stat("std", num(summary.std_dev)),
        stat("min", num(summary.min)),
        stat("25%", num(summary.q1)),
        stat("50%", num(summary.median)),
        stat("75%", num(summary.q3)),
        stat("max", num(summary.max)),
        stat("IQR", num(summary.iqr())),
    ];
    Table::new(rows).to_string()
}

pub fn box_plot_table(plot: &BoxPlot) -> String {
    let outliers = if plot.outliers.is_empty() {
        "none".to_string()
    } else {
        plot.outliers.iter().map(|v| num(*v)).collect::<Vec<_>>().join(", ")
    };
    let rows = [
        stat("lower whisker", num(plot.lower_whisker)),
        stat("Q1", num(plot.q1)),
        stat("median", num(plot.median)),
        stat("Q3", num(plot.q3)),
        stat("upper whisker", num(plot.upper_whisker)),
        stat("outliers", outliers),
    ];
    Table::new(rows).to_string()
}

#[derive(Tabled)]
struct BinRow {
    #[tabled(rename = "Range")]
    range: String,
    #[tabled(rename = "Count")]
    count: usize,
}

pub fn histogram_table(bins: &[HistogramBin]) -> String {
    let rows = bins.iter().map(|b| BinRow {
        range: format!("[{}, {})", num(b.start), num(b.end)),
        count: b.count,
    });
    Table::new(rows).to_string()
}

#[derive(Tabled)]
struct ComponentRow {
    #[tabled(rename = "Date")]
    date: NaiveDate,
    #[tabled(rename = "Observed")]
    observed: String,
    #[tabled(rename = "Trend")]
    trend: String,
    #[tabled(rename = "Seasonal")]
    seasonal: String,
    #[tabled(rename = "Residual")]
    residual: String,
}

/// Components by date; edge rows without a trend estimate show blanks.
pub fn decomposition_table(timestamps: &[NaiveDate], dec: &Decomposition) -> String {
    let rows = timestamps.iter().enumerate().map(|(i, date)| ComponentRow {
        date: *date,
        observed: num(dec.observed[i]),
        trend: opt_num(dec.trend[i]),
        seasonal: format!("{:.4}", dec.seasonal[i]),
        residual: opt_num(dec.residual[i]),
    });
    Table::new(rows).to_string()
}

#[derive(Tabled)]
struct PeriodRow {
    #[tabled(rename = "Period")]
    period: u32,
    #[tabled(rename = "Strength")]
    strength: String,
}

pub fn periods_table(periods: &[SeasonalityResult]) -> String {
    let rows = periods.iter().map(|p| PeriodRow {
        period: p.period,
        strength: format!("{:.3}", p.strength),
    });
    Table::new(rows).to_string()
}

fn fixed4(value: f64) -> String {
    format!("{:.4}", value)
}

pub fn adf_table(result: &AdfResult, significance: f64) -> String {
    let verdict = if result.is_stationary(significance) {
        "stationary"
    } else {
        "unit root not rejected"
    };
    let rows = [
        stat("ADF statistic", fixed4(result.statistic)),
        stat("p-value", fixed4(result.p_value)),
        stat("lags used", result.used_lag.to_string()),
        stat("observations", result.nobs.to_string()),
        stat("critical value (1%)", fixed4(result.critical_values.one)),
        stat("critical value (5%)", fixed4(result.critical_values.five)),
        stat("critical value (10%)", fixed4(result.critical_values.ten)),
        stat("result", format!("{} at {}", verdict, significance)),
    ];
    Table::new(rows).to_string()
}

#[derive(Tabled)]
struct LagRow {
    #[tabled(rename = "Lag")]
    lag: usize,
    #[tabled(rename = "ACF")]
    acf: String,
    #[tabled(rename = "PACF")]
    pacf: String,
}

/// ACF and PACF side by side; values outside +/-`bound` are starred.
pub fn correlogram_table(acf: &[f64], pacf: &[f64], bound: f64) -> String {
    let cell = |v: Option<&f64>, lag: usize| match v {
        Some(v) if lag > 0 && v.abs() > bound => format!("{:.4}{}", v, BEST_MARK),
        Some(v) => format!("{:.4}", v),
        None => String::new(),
    };
    let rows = (0..acf.len().max(pacf.len())).map(|lag| LagRow {
        lag,
        acf: cell(acf.get(lag), lag),
        pacf: cell(pacf.get(lag), lag),
    });
    let mut out = Table::new(rows).to_string();
    out.push_str(&format!("\n* outside +/-{:.4}", bound));
    out
}

#[derive(Tabled)]
struct ForecastRow {
    #[tabled(rename = "Date")]
    date: NaiveDate,
    #[tabled(rename = "Forecast")]
    forecast: String,
    #[tabled(rename = "Lower")]
    lower: String,
    #[tabled(rename = "Upper")]
    upper: String,
}

pub fn forecast_table(result: &ForecastResult) -> String {
    let rows = (0..result.len()).map(|i| ForecastRow {
        date: result.timestamps[i],
        forecast: num(result.forecasts[i]),
        lower: num(result.lower_bounds[i]),
        upper: num(result.upper_bounds[i]),
    });
    Table::new(rows).to_string()
}

#[derive(Tabled)]
struct MetricRow {
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "MSE")]
    mse: String,
    #[tabled(rename = "MAE")]
    mae: String,
    #[tabled(rename = "MAPE")]
    mape: String,
    #[tabled(rename = "RMSE")]
    rmse: String,
    #[tabled(rename = "Bias")]
    bias: String,
    #[tabled(rename = "Bias Rate")]
    bias_rate: String,
}

/// Per-model metrics, with the best value of each column marked.
pub fn metric_comparison_table(table: &MetricTable) -> String {
    let rows = table.rows().iter().map(|(model, bundle)| {
        let cell = |metric: Metric| {
            let text = bundle.display(metric);
            if table.is_best(model, metric) {
                text + BEST_MARK
            } else {
                text
            }
        };
        MetricRow {
            model: model.clone(),
            mse: cell(Metric::Mse),
            mae: cell(Metric::Mae),
            mape: cell(Metric::Mape),
            rmse: cell(Metric::Rmse),
            bias: cell(Metric::Bias),
            bias_rate: cell(Metric::BiasRate),
        }
    });
    Table::new(rows).to_string()
}

#[derive(Tabled)]
struct SingleMetricRow {
    #[tabled(rename = "Metric")]
    metric: &'static str,
    #[tabled(rename = "Value")]
    value: String,
}

pub fn metrics_table(bundle: &MetricBundle) -> String {
    let rows = Metric::ALL.iter().map(|&metric| SingleMetricRow {
        metric: metric.label(),
        value: bundle.display(metric),
    });
    Table::new(rows).to_string()
}
