//! carstats binary.
//!
//! Each subcommand renders one view of a monthly series as text tables:
//! the history, a seasonal analysis, stationarity diagnostics, model
//! forecasts with their holdout accuracy, or a metric comparison of two
//! columns.

use anyhow::{Context, Result};
use clap::Parser;
use duckdb::Connection;
use tracing::{debug, Level};
use tracing_subscriber::EnvFilter;

use carstats::cli::{AnalyzeArgs, Cli, Command, CompareArgs, StationarityArgs};
use carstats::common::table_reader::{load_series, read_columns};
use carstats::common::types::TimeSeries;
use carstats::config::Settings;
use carstats::forecast::{evaluate_models, in_sample_table, metric_table};
use carstats::metrics::MetricBundle;
use carstats::report;
use carstats::seasonality::{self, params::DecompositionKind, params::DecompositionParams};
use carstats::stationarity::autocorrelation::{acf, confidence_bound, pacf};
use carstats::stationarity::{adf_test, AdfOptions};
use carstats::summary::{histogram, SeriesSummary};

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(
                    cli.global.log_level.parse().unwrap_or(Level::WARN).into(),
                )
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();

    let settings = Settings::load(cli.global.config.as_deref(), &cli.overrides())
        .context("loading configuration")?;

    match &cli.command {
        Command::History => history(&settings),
        Command::Analyze(args) => analyze(&settings, args),
        Command::Stationarity(args) => stationarity(&settings, args),
        Command::Forecast(_) => forecast(&settings),
        Command::Compare(args) => compare(&settings, args),
    }
}

fn load(settings: &Settings) -> Result<TimeSeries> {
    let params = settings.series_params()?;
    let series = load_series(&params).with_context(|| format!("reading '{}'", params.source))?;
    debug!(frequency = ?series.frequency(), "detected sampling frequency");
    Ok(series)
}

fn history(settings: &Settings) -> Result<()> {
    let series = load(settings)?;
    println!("{}", report::history_table(&series));
    if let Some(summary) = SeriesSummary::new(&series.values) {
        println!("\nSummary");
        println!("{}", report::summary_table(&summary));
    }
    Ok(())
}

fn analyze(settings: &Settings, args: &AnalyzeArgs) -> Result<()> {
    let series = load(settings)?;
    let kind = if args.multiplicative {
        DecompositionKind::Multiplicative
    } else {
        DecompositionKind::Additive
    };
    let period = args.period.unwrap_or(settings.forecast.season_length);
    let params = DecompositionParams::new(period, kind)?;
    let analysis = seasonality::analyze(&series, &params)
        .with_context(|| format!("{} decomposition with period {}", kind, period))?;

    println!("Detected seasonal periods");
    if analysis.periods.is_empty() {
        println!("none");
    } else {
        println!("{}", report::periods_table(&analysis.periods));
    }

    println!("\n{} decomposition (period {})", kind, period);
    println!(
        "{}",
        report::decomposition_table(&series.timestamps, &analysis.decomposition)
    );

    if let Some(summary) = SeriesSummary::new(&series.values) {
        println!("\nBox plot");
        println!("{}", report::box_plot_table(&summary.box_plot(&series.values)));
    }

    let bins = args.bins.unwrap_or(settings.analysis.histogram_bins);
    println!("\nHistogram");
    println!("{}", report::histogram_table(&histogram(&series.values, bins)));
    Ok(())
}

fn stationarity(settings: &Settings, args: &StationarityArgs) -> Result<()> {
    let series = load(settings)?;
    let options = AdfOptions {
        max_lag: args.adf_lag,
        autolag: args.adf_lag.is_none(),
    };
    let significance = settings.analysis.significance;
    let adf = adf_test(&series.values, &options).context("augmented Dickey-Fuller test")?;
    println!("Augmented Dickey-Fuller test");
    println!("{}", report::adf_table(&adf, significance));

    let nlags = args.nlags.unwrap_or(settings.analysis.max_lag);
    let bound = confidence_bound(series.len(), 1.0 - significance);
    println!("\nAutocorrelation");
    println!(
        "{}",
        report::correlogram_table(
            &acf(&series.values, nlags),
            &pacf(&series.values, nlags),
            bound
        )
    );
    Ok(())
}

fn forecast(settings: &Settings) -> Result<()> {
    let series = load(settings)?;
    let params = settings.forecast_params()?;
    let models = settings.models()?;

    let outcomes = evaluate_models(&models, &series, &params);
    for outcome in &outcomes {
        println!("\n{} forecast", outcome.kind.label());
        match &outcome.forecast {
            Ok(result) => println!("{}", report::forecast_table(result)),
            Err(e) => println!("failed: {}", e),
        }
    }

    let table = metric_table(&outcomes);
    println!("\nAccuracy on the last {} observations", params.horizon);
    if table.is_empty() {
        println!("no model could be evaluated");
    } else {
        println!("{}", report::metric_comparison_table(&table));
    }
    for outcome in &outcomes {
        if let Err(e) = &outcome.evaluation {
            println!("{}: {}", outcome.kind.label(), e);
        }
    }

    let fitted = in_sample_table(&outcomes);
    if !fitted.is_empty() {
        println!("\nAccuracy of the fitted values over the whole history");
        println!("{}", report::metric_comparison_table(&fitted));
    }
    for outcome in &outcomes {
        if let Some(Err(e)) = &outcome.in_sample {
            println!("{} in-sample: {}", outcome.kind.label(), e);
        }
    }
    Ok(())
}

fn compare(settings: &Settings, args: &CompareArgs) -> Result<()> {
    let params = settings.series_params()?;
    let con = Connection::open_in_memory()?;
    let (actual, predicted) = read_columns(
        &con,
        &params.source,
        &args.actual,
        &args.predicted,
        args.order_by.as_deref(),
    )
    .with_context(|| format!("reading '{}'", params.source))?;

    let bundle = if args.strict {
        MetricBundle::compute_strict(&actual, &predicted)?
    } else {
        MetricBundle::compute(&actual, &predicted)?
    };
    println!("{}", report::metrics_table(&bundle));
    Ok(())
}
