//! Command-line interface.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::Overrides;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Forecast evaluation for monthly licensing series",
    long_about = None
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Configuration file (TOML). Defaults to ./carstats.toml when present
    #[arg(long, global = true, value_name = "PATH", env = "CARSTATS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Data file (CSV, Parquet, XLSX) or table name
    #[arg(short, long, global = true)]
    pub source: Option<String>,

    /// Column holding the dates
    #[arg(long, global = true)]
    pub timestamp_column: Option<String>,

    /// Column holding the observed values
    #[arg(long, global = true)]
    pub value_column: Option<String>,

    /// Default log level; RUST_LOG takes precedence
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show the observed series and its descriptive summary
    History,
    /// Seasonal decomposition, box plot, histogram and detected periods
    Analyze(AnalyzeArgs),
    /// Augmented Dickey-Fuller test and ACF/PACF table
    Stationarity(StationarityArgs),
    /// Fit forecasting models and compare their holdout accuracy
    Forecast(ForecastArgs),
    /// Compute accuracy metrics for two aligned columns
    Compare(CompareArgs),
}

#[derive(Debug, Args)]
pub struct AnalyzeArgs {
    /// Multiplicative instead of additive decomposition
    #[arg(long)]
    pub multiplicative: bool,

    /// Decomposition period; defaults to forecast.season_length
    #[arg(long)]
    pub period: Option<usize>,

    /// Histogram bin count; defaults to analysis.histogram_bins
    #[arg(long)]
    pub bins: Option<usize>,
}

#[derive(Debug, Args)]
pub struct StationarityArgs {
    /// Lags in the ACF/PACF table; defaults to analysis.max_lag
    #[arg(long)]
    pub nlags: Option<usize>,

    /// Fixed ADF lag instead of AIC selection
    #[arg(long)]
    pub adf_lag: Option<usize>,
}

#[derive(Debug, Args)]
pub struct ForecastArgs {
    /// Forecast horizon in periods
    #[arg(long)]
    pub horizon: Option<usize>,

    /// Season length in periods
    #[arg(long)]
    pub season_length: Option<usize>,

    /// Prediction interval coverage, between 0 and 1
    #[arg(long)]
    pub confidence_level: Option<f64>,

    /// Models to run (comma separated), e.g. hw-add,auto-arima
    #[arg(short, long, value_delimiter = ',')]
    pub models: Option<Vec<String>>,
}

#[derive(Debug, Args)]
pub struct CompareArgs {
    /// Column of observed values
    #[arg(long)]
    pub actual: String,

    /// Column of predicted values
    #[arg(long)]
    pub predicted: String,

    /// Sort rows by this column before comparing
    #[arg(long)]
    pub order_by: Option<String>,

    /// Fail instead of reporting N/A when a percentage metric divides by zero
    #[arg(long)]
    pub strict: bool,
}

impl Cli {
    /// Command-line values that override the layered configuration.
    pub fn overrides(&self) -> Overrides {
        let mut overrides = Overrides {
            source: self.global.source.clone(),
            timestamp_column: self.global.timestamp_column.clone(),
            value_column: self.global.value_column.clone(),
            ..Default::default()
        };
        if let Command::Forecast(args) = &self.command {
            overrides.horizon = args.horizon;
            overrides.season_length = args.season_length;
            overrides.confidence_level = args.confidence_level;
            overrides.models = args.models.clone();
        }
        overrides
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_forecast_flags_become_overrides() {
        let cli = Cli::parse_from([
            "carstats",
            "forecast",
            "--source",
            "data.csv",
            "--horizon",
            "6",
            "--models",
            "hw-add,auto-arima",
        ]);
        let overrides = cli.overrides();
        assert_eq!(overrides.source.as_deref(), Some("data.csv"));
        assert_eq!(overrides.horizon, Some(6));
        assert_eq!(
            overrides.models,
            Some(vec!["hw-add".to_string(), "auto-arima".to_string()])
        );
        assert_eq!(overrides.confidence_level, None);
    }

    #[test]
    fn test_compare_requires_columns() {
        assert!(Cli::try_parse_from(["carstats", "compare", "--actual", "y"]).is_err());
        let cli = Cli::try_parse_from([
            "carstats", "compare", "-s", "f.csv", "--actual", "y", "--predicted", "yhat",
        ])
        .unwrap();
        match cli.command {
            Command::Compare(args) => {
                assert_eq!(args.actual, "y");
                assert!(!args.strict);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_analyze_flags() {
        let cli = Cli::parse_from(["carstats", "analyze", "--multiplicative", "--period", "4"]);
        match cli.command {
            Command::Analyze(args) => {
                assert!(args.multiplicative);
                assert_eq!(args.period, Some(4));
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert_eq!(cli.global.log_level, "warn");
    }
}
