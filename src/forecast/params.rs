use std::fmt;
use std::str::FromStr;

use crate::common::params::{check_at_least, check_unit_interval, ParamsError};

/// Forecasting models that can be run by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelKind {
    HoltWintersAdditive,
    HoltWintersMultiplicative,
    AutoArima,
    AutoEts,
    AutoTheta,
    AutoCes,
    ProphetAdditive,
    ProphetMultiplicative,
    Linear,
    SeasonalNaive,
    /// Cross-validated choice among the other models.
    Auto,
}

impl ModelKind {
    /// Models compared by default, matching the dashboard's pages.
    pub const DEFAULT_SET: [ModelKind; 8] = [
        ModelKind::HoltWintersAdditive,
        ModelKind::HoltWintersMultiplicative,
        ModelKind::AutoArima,
        ModelKind::AutoEts,
        ModelKind::AutoTheta,
        ModelKind::AutoCes,
        ModelKind::ProphetAdditive,
        ModelKind::ProphetMultiplicative,
    ];

    /// Short name accepted on the command line and in config files.
    pub fn name(self) -> &'static str {
        match self {
            ModelKind::HoltWintersAdditive => "hw-add",
            ModelKind::HoltWintersMultiplicative => "hw-mul",
            ModelKind::AutoArima => "auto-arima",
            ModelKind::AutoEts => "auto-ets",
            ModelKind::AutoTheta => "auto-theta",
            ModelKind::AutoCes => "auto-ces",
            ModelKind::ProphetAdditive => "prophet-add",
            ModelKind::ProphetMultiplicative => "prophet-mul",
            ModelKind::Linear => "linear",
            ModelKind::SeasonalNaive => "seasonal-naive",
            ModelKind::Auto => "auto",
        }
    }

    /// Label used in reports.
    pub fn label(self) -> &'static str {
        match self {
            ModelKind::HoltWintersAdditive => "Add",
            ModelKind::HoltWintersMultiplicative => "Multi",
            ModelKind::AutoArima => "AutoARIMA",
            ModelKind::AutoEts => "AutoETS",
            ModelKind::AutoTheta => "AutoTheta",
            ModelKind::AutoCes => "CES",
            ModelKind::ProphetAdditive => "Prophet Add",
            ModelKind::ProphetMultiplicative => "Prophet Multi",
            ModelKind::Linear => "Linear",
            ModelKind::SeasonalNaive => "SeasonalNaive",
            ModelKind::Auto => "Auto",
        }
    }

    /// Whether the model is also scored on its fit to the whole history.
    pub fn reports_in_sample(self) -> bool {
        matches!(
            self,
            ModelKind::ProphetAdditive | ModelKind::ProphetMultiplicative
        )
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelKind {
    type Err = ParamsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        let kind = match normalized.as_str() {
            "hw-add" | "add" | "holt-winters-add" => ModelKind::HoltWintersAdditive,
            "hw-mul" | "multi" | "holt-winters-mul" => ModelKind::HoltWintersMultiplicative,
            "auto-arima" | "autoarima" | "arima" => ModelKind::AutoArima,
            "auto-ets" | "autoets" | "ets" => ModelKind::AutoEts,
            "auto-theta" | "autotheta" | "theta" => ModelKind::AutoTheta,
            "auto-ces" | "autoces" | "ces" => ModelKind::AutoCes,
            "prophet-add" | "prophet" => ModelKind::ProphetAdditive,
            "prophet-mul" | "prophet-multi" => ModelKind::ProphetMultiplicative,
            "linear" => ModelKind::Linear,
            "seasonal-naive" | "snaive" => ModelKind::SeasonalNaive,
            "auto" => ModelKind::Auto,
            _ => return Err(ParamsError::UnknownModel(s.to_string())),
        };
        Ok(kind)
    }
}

/// Parse a list of model names, rejecting the first unknown one.
pub fn parse_models<S: AsRef<str>>(names: &[S]) -> Result<Vec<ModelKind>, ParamsError> {
    names.iter().map(|n| n.as_ref().parse()).collect()
}

/// Validated forecasting parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForecastParams {
    pub horizon: usize,
    pub confidence_level: f64,
    pub season_length: usize,
}

impl ForecastParams {
    pub fn new(
        horizon: usize,
        confidence_level: f64,
        season_length: usize,
    ) -> Result<Self, ParamsError> {
        Ok(Self {
            horizon: check_at_least("horizon", horizon, 1)?,
            confidence_level: check_unit_interval("confidence_level", confidence_level)?,
            season_length: check_at_least("season_length", season_length, 1)?,
        })
    }

    /// Same parameters with a different horizon.
    pub fn with_horizon(&self, horizon: usize) -> Self {
        Self { horizon, ..*self }
    }
}

impl Default for ForecastParams {
    fn default() -> Self {
        Self {
            horizon: 12,
            confidence_level: 0.95,
            season_length: 12,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_model_names() {
        assert_eq!("hw-add".parse::<ModelKind>(), Ok(ModelKind::HoltWintersAdditive));
        assert_eq!("Multi".parse::<ModelKind>(), Ok(ModelKind::HoltWintersMultiplicative));
        assert_eq!("auto_arima".parse::<ModelKind>(), Ok(ModelKind::AutoArima));
        assert_eq!(" AutoETS ".parse::<ModelKind>(), Ok(ModelKind::AutoEts));
        assert_eq!("snaive".parse::<ModelKind>(), Ok(ModelKind::SeasonalNaive));
        assert_eq!("CES".parse::<ModelKind>(), Ok(ModelKind::AutoCes));
        assert_eq!("prophet".parse::<ModelKind>(), Ok(ModelKind::ProphetAdditive));
        assert_eq!("prophet_mul".parse::<ModelKind>(), Ok(ModelKind::ProphetMultiplicative));
    }

    #[test]
    fn test_parse_unknown_model() {
        let err = "nope".parse::<ModelKind>().unwrap_err();
        assert_eq!(err, ParamsError::UnknownModel("nope".to_string()));
        assert!(err.to_string().contains("Valid models"));
    }

    #[test]
    fn test_default_set_labels() {
        let labels: Vec<&str> = ModelKind::DEFAULT_SET.iter().map(|k| k.label()).collect();
        assert_eq!(
            labels,
            [
                "Add",
                "Multi",
                "AutoARIMA",
                "AutoETS",
                "AutoTheta",
                "CES",
                "Prophet Add",
                "Prophet Multi"
            ]
        );
        assert!(ModelKind::ProphetMultiplicative.reports_in_sample());
        assert!(!ModelKind::AutoCes.reports_in_sample());
    }

    #[test]
    fn test_names_round_trip() {
        for kind in ModelKind::DEFAULT_SET {
            assert_eq!(kind.name().parse::<ModelKind>(), Ok(kind));
        }
        assert_eq!(parse_models(&["linear", "auto"]).unwrap().len(), 2);
        assert!(parse_models(&["linear", "nope"]).is_err());
    }

    #[test]
    fn test_forecast_params_validation() {
        assert!(ForecastParams::new(12, 0.95, 12).is_ok());
        assert_eq!(
            ForecastParams::new(0, 0.95, 12).unwrap_err().to_string(),
            "horizon must be a positive integer, got 0"
        );
        assert!(ForecastParams::new(12, 1.0, 12).is_err());
        assert!(ForecastParams::new(12, 0.9, 0).is_err());
    }
}
