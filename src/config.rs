//! Layered settings: built-in defaults, an optional TOML file, `CARSTATS__*`
//! environment variables, then command-line overrides.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::common::params::{ParamsError, SeriesParams};
use crate::forecast::params::{parse_models, ForecastParams, ModelKind};

/// Config file picked up from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "carstats.toml";

const ENV_PREFIX: &str = "CARSTATS";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("no data source configured; pass --source or set data.source")]
    MissingSource,

    #[error(transparent)]
    Params(#[from] ParamsError),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DataSettings {
    #[serde(default)]
    pub source: Option<String>,
    pub timestamp_column: String,
    pub value_column: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ForecastSettings {
    pub horizon: usize,
    pub season_length: usize,
    pub confidence_level: f64,
    pub models: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AnalysisSettings {
    /// Lags shown in the ACF/PACF table.
    pub max_lag: usize,
    pub histogram_bins: usize,
    /// Significance level for the ADF verdict.
    pub significance: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Settings {
    pub data: DataSettings,
    pub forecast: ForecastSettings,
    pub analysis: AnalysisSettings,
}

/// Values given explicitly on the command line. `None` keeps the layered value.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub source: Option<String>,
    pub timestamp_column: Option<String>,
    pub value_column: Option<String>,
    pub horizon: Option<usize>,
    pub season_length: Option<usize>,
    pub confidence_level: Option<f64>,
    pub models: Option<Vec<String>>,
}

impl Settings {
    /// Load configuration from all sources.
    ///
    /// `config_path` must exist when given; otherwise `carstats.toml` in the
    /// working directory is read if present.
    pub fn load(config_path: Option<&Path>, overrides: &Overrides) -> Result<Self, SettingsError> {
        let mut builder = config::Config::builder().add_source(config::File::from_str(
            include_str!("../config/default.toml"),
            config::FileFormat::Toml,
        ));

        builder = match config_path {
            Some(path) => builder.add_source(config::File::from(path)),
            None => builder
                .add_source(config::File::from(PathBuf::from(DEFAULT_CONFIG_FILE)).required(false)),
        };

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let mut settings: Settings = builder.build()?.try_deserialize()?;
        settings.apply(overrides);
        Ok(settings)
    }

    fn apply(&mut self, overrides: &Overrides) {
        if let Some(source) = &overrides.source {
            self.data.source = Some(source.clone());
        }
        if let Some(col) = &overrides.timestamp_column {
            self.data.timestamp_column = col.clone();
        }
        if let Some(col) = &overrides.value_column {
            self.data.value_column = col.clone();
        }
        if let Some(horizon) = overrides.horizon {
            self.forecast.horizon = horizon;
        }
        if let Some(m) = overrides.season_length {
            self.forecast.season_length = m;
        }
        if let Some(level) = overrides.confidence_level {
            self.forecast.confidence_level = level;
        }
        if let Some(models) = &overrides.models {
            self.forecast.models = models.clone();
        }
    }

    pub fn series_params(&self) -> Result<SeriesParams, SettingsError> {
        let source = self.data.source.as_deref().ok_or(SettingsError::MissingSource)?;
        Ok(SeriesParams::new(
            source,
            self.data.timestamp_column.as_str(),
            self.data.value_column.as_str(),
        )?)
    }

    pub fn forecast_params(&self) -> Result<ForecastParams, ParamsError> {
        ForecastParams::new(
            self.forecast.horizon,
            self.forecast.confidence_level,
            self.forecast.season_length,
        )
    }

    pub fn models(&self) -> Result<Vec<ModelKind>, ParamsError> {
        if self.forecast.models.is_empty() {
            return Err(ParamsError::Empty("models"));
        }
        parse_models(&self.forecast.models)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let file = write_config("");
        let settings = Settings::load(Some(file.path()), &Overrides::default()).unwrap();

        assert_eq!(settings.data.timestamp_column, "Mês");
        assert_eq!(settings.data.value_column, "AUTOMÓVEIS");
        assert_eq!(settings.forecast_params().unwrap(), ForecastParams::default());
        assert_eq!(settings.models().unwrap(), ModelKind::DEFAULT_SET.to_vec());
        assert_eq!(settings.analysis.max_lag, 30);
        assert_eq!(settings.analysis.histogram_bins, 20);
        assert!(matches!(
            settings.series_params(),
            Err(SettingsError::MissingSource)
        ));
    }

    #[test]
    fn test_file_overrides_defaults() {
        let file = write_config(
            r#"
[data]
source = "licensing.csv"
value_column = "MOTOS"

[forecast]
horizon = 6
models = ["linear", "seasonal-naive"]
"#,
        );
        let settings = Settings::load(Some(file.path()), &Overrides::default()).unwrap();

        let series = settings.series_params().unwrap();
        assert_eq!(series.source, "licensing.csv");
        assert_eq!(series.timestamp_col, "Mês", "unset keys keep their defaults");
        assert_eq!(series.value_col, "MOTOS");
        assert_eq!(settings.forecast.horizon, 6);
        assert_eq!(settings.forecast.season_length, 12);
        assert_eq!(
            settings.models().unwrap(),
            vec![ModelKind::Linear, ModelKind::SeasonalNaive]
        );
    }

    #[test]
    fn test_cli_overrides_win() {
        let file = write_config("[forecast]\nhorizon = 6\n");
        let overrides = Overrides {
            source: Some("other.parquet".to_string()),
            horizon: Some(24),
            confidence_level: Some(0.8),
            ..Default::default()
        };
        let settings = Settings::load(Some(file.path()), &overrides).unwrap();

        assert_eq!(settings.data.source.as_deref(), Some("other.parquet"));
        assert_eq!(settings.forecast.horizon, 24);
        assert_eq!(settings.forecast_params().unwrap().confidence_level, 0.8);
    }

    #[test]
    fn test_invalid_values_are_reported() {
        let file = write_config("[forecast]\nconfidence_level = 1.5\nmodels = [\"neural-net\"]\n");
        let settings = Settings::load(Some(file.path()), &Overrides::default()).unwrap();
        assert!(settings.forecast_params().is_err());
        assert_eq!(
            settings.models().unwrap_err(),
            ParamsError::UnknownModel("neural-net".to_string())
        );
    }

    #[test]
    fn test_missing_explicit_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(matches!(
            Settings::load(Some(&missing), &Overrides::default()),
            Err(SettingsError::Load(_))
        ));
    }
}
