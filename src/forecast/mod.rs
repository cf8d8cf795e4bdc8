pub mod arima;
pub mod ces;
pub mod holt_winters;
pub mod models;
pub mod params;
pub mod prophet;

use std::panic::{catch_unwind, AssertUnwindSafe};

use augurs_prophet::FeatureMode;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::common::params::ParamsError;
use crate::common::types::{ForecastResult, TimeSeries, MIN_DATA_POINTS};
use crate::metrics::display::MetricTable;
use crate::metrics::{MetricBundle, MetricsError};
use crate::seasonality::detection::best_season_length;

use holt_winters::Seasonality;
use params::{ForecastParams, ModelKind};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ForecastError {
    #[error("{model} needs at least {needed} data points, got {got}")]
    InsufficientData {
        model: &'static str,
        needed: usize,
        got: usize,
    },

    #[error("{model} requires strictly positive values")]
    NonPositive { model: &'static str },

    #[error("{model} fit failed: {reason}")]
    Fit { model: &'static str, reason: String },

    #[error("{model} produced non-finite forecasts")]
    NonFinite { model: &'static str },

    #[error(transparent)]
    Params(#[from] ParamsError),

    #[error(transparent)]
    Metrics(#[from] MetricsError),
}

/// Forecast `params.horizon` steps past the end of `series` with one model.
pub fn run_model(
    kind: ModelKind,
    series: &TimeSeries,
    params: &ForecastParams,
) -> Result<ForecastResult, ForecastError> {
    match kind {
        ModelKind::HoltWintersAdditive => {
            holt_winters::forecast_holt_winters(series, params, Seasonality::Additive)
        }
        ModelKind::HoltWintersMultiplicative => {
            holt_winters::forecast_holt_winters(series, params, Seasonality::Multiplicative)
        }
        ModelKind::AutoArima => arima::forecast_auto_arima(series, params),
        ModelKind::AutoEts => models::forecast_auto_ets(series, params),
        ModelKind::AutoTheta => models::forecast_theta(series, params),
        ModelKind::AutoCes => ces::forecast_auto_ces(series, params),
        ModelKind::ProphetAdditive => {
            prophet::forecast_prophet(series, params, FeatureMode::Additive)
        }
        ModelKind::ProphetMultiplicative => {
            prophet::forecast_prophet(series, params, FeatureMode::Multiplicative)
        }
        ModelKind::Linear => models::forecast_linear(series, params),
        ModelKind::SeasonalNaive => models::forecast_seasonal_naive(series, params),
        ModelKind::Auto => forecast_auto(series, params),
    }
}

/// Run `fit` with panics from the numerical libraries turned into errors.
fn guarded<T>(
    kind: ModelKind,
    fit: impl FnOnce() -> Result<T, ForecastError>,
) -> Result<T, ForecastError> {
    catch_unwind(AssertUnwindSafe(fit)).unwrap_or_else(|_| {
        Err(ForecastError::Fit {
            model: kind.label(),
            reason: "model panicked during fitting".to_string(),
        })
    })
}

fn run_guarded(
    kind: ModelKind,
    series: &TimeSeries,
    params: &ForecastParams,
) -> Result<ForecastResult, ForecastError> {
    guarded(kind, || run_model(kind, series, params))
}

/// Holdout forecast of one model and its accuracy against the held-out values.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelEvaluation {
    pub kind: ModelKind,
    /// Forecast made from the training part, covering the holdout dates.
    pub forecast: ForecastResult,
    /// The held-out tail of the observed series.
    pub actual: Vec<f64>,
    pub metrics: MetricBundle,
}

/// Fit on all but the last `params.horizon` points, forecast them and
/// score the forecast against what was actually observed.
pub fn backtest(
    kind: ModelKind,
    series: &TimeSeries,
    params: &ForecastParams,
) -> Result<ModelEvaluation, ForecastError> {
    let needed = params.horizon + MIN_DATA_POINTS;
    if series.len() < needed {
        return Err(ForecastError::InsufficientData {
            model: kind.label(),
            needed,
            got: series.len(),
        });
    }

    let (train, holdout) = series.split_at_tail(params.horizon);
    let forecast = run_guarded(kind, &train, params)?;
    let metrics = MetricBundle::compute(&holdout.values, &forecast.forecasts)?;

    debug!(model = kind.label(), mse = metrics.mse, mae = metrics.mae, "backtest");

    Ok(ModelEvaluation {
        kind,
        forecast,
        actual: holdout.values,
        metrics,
    })
}

/// Fit on the whole series and score the fitted values against it, for
/// models that report in-sample accuracy. `None` for the others.
pub fn in_sample(
    kind: ModelKind,
    series: &TimeSeries,
    params: &ForecastParams,
) -> Option<Result<ModelEvaluation, ForecastError>> {
    let mode = match kind {
        ModelKind::ProphetAdditive => FeatureMode::Additive,
        ModelKind::ProphetMultiplicative => FeatureMode::Multiplicative,
        _ => return None,
    };
    Some(guarded(kind, || prophet::in_sample_evaluation(series, params, mode)))
}

/// Future forecast, holdout evaluation and, where the model reports it,
/// in-sample evaluation of one model. Each may fail independently.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelOutcome {
    pub kind: ModelKind,
    pub forecast: Result<ForecastResult, ForecastError>,
    pub evaluation: Result<ModelEvaluation, ForecastError>,
    pub in_sample: Option<Result<ModelEvaluation, ForecastError>>,
}

/// Run every model in `kinds`, keeping failures as part of the result.
pub fn evaluate_models(
    kinds: &[ModelKind],
    series: &TimeSeries,
    params: &ForecastParams,
) -> Vec<ModelOutcome> {
    kinds
        .iter()
        .map(|&kind| {
            let forecast = run_guarded(kind, series, params);
            let evaluation = backtest(kind, series, params);
            if let Err(e) = &forecast {
                warn!(model = kind.label(), error = %e, "forecast failed");
            }
            if let Err(e) = &evaluation {
                warn!(model = kind.label(), error = %e, "backtest failed");
            }
            let in_sample = in_sample(kind, series, params);
            if let Some(Err(e)) = &in_sample {
                warn!(model = kind.label(), error = %e, "in-sample fit failed");
            }
            ModelOutcome {
                kind,
                forecast,
                evaluation,
                in_sample,
            }
        })
        .collect()
}

/// Metric comparison table over the successful backtests.
pub fn metric_table(outcomes: &[ModelOutcome]) -> MetricTable {
    let mut table = MetricTable::new();
    for outcome in outcomes {
        if let Ok(eval) = &outcome.evaluation {
            table.push(outcome.kind.label(), eval.metrics);
        }
    }
    table
}

/// Metric comparison table over the successful in-sample fits.
pub fn in_sample_table(outcomes: &[ModelOutcome]) -> MetricTable {
    let mut table = MetricTable::new();
    for outcome in outcomes {
        if let Some(Ok(eval)) = &outcome.in_sample {
            table.push(outcome.kind.label(), eval.metrics);
        }
    }
    table
}

/// Sanity checks on a refit before `forecast_auto` accepts it.
fn validate_forecast(series: &TimeSeries, result: &ForecastResult) -> bool {
    if result.is_empty() {
        return false;
    }

    let n = series.len();
    if n >= 3 {
        let recent = &series.values[n - 3..];
        let last = recent[2];
        let first_forecast = result.forecasts[0];
        // A rising series should not open the forecast >10% below its last value.
        if recent[2] > recent[0] && first_forecast < last * 0.9 {
            debug!(
                last,
                first_forecast, "forecast validation failed: dropped more than 10%"
            );
            return false;
        }
    }

    if !result.is_finite() {
        debug!(model = %result.model, "forecast validation failed: non-finite values");
        return false;
    }
    true
}

fn auto_candidates(series: &TimeSeries, season_length: usize) -> Vec<ModelKind> {
    let mut candidates = Vec::new();
    if season_length > 1 {
        candidates.push(ModelKind::HoltWintersAdditive);
        if series.values.iter().all(|&v| v > 0.0) {
            candidates.push(ModelKind::HoltWintersMultiplicative);
        }
        candidates.push(ModelKind::SeasonalNaive);
    }
    candidates.extend([
        ModelKind::AutoArima,
        ModelKind::AutoEts,
        ModelKind::AutoTheta,
        ModelKind::AutoCes,
        ModelKind::Linear,
    ]);
    candidates
}

/// Pick a model by holdout MSE, refit it on the whole series and return its
/// forecast.
///
/// The holdout is 20% of the series, bounded so that both sides keep at
/// least [`MIN_DATA_POINTS`]. Refits that fail validation hand over to the
/// next-ranked model; linear regression is the last resort. Series too short
/// for a holdout go straight to AutoETS, then linear.
pub fn forecast_auto(
    series: &TimeSeries,
    params: &ForecastParams,
) -> Result<ForecastResult, ForecastError> {
    let n = series.len();
    let season_length = if params.season_length > 1 {
        params.season_length
    } else {
        best_season_length(&series.values)
    };
    let params = ForecastParams {
        season_length,
        ..*params
    };

    if n < 2 * MIN_DATA_POINTS {
        warn!(n, "auto: insufficient data for cross-validation, using fallback");
        return models::forecast_auto_ets(series, &params)
            .or_else(|_| models::forecast_linear(series, &params));
    }

    let holdout = ((n as f64 * 0.2).ceil() as usize)
        .max(MIN_DATA_POINTS)
        .min(n - MIN_DATA_POINTS);
    let cv_params = params.with_horizon(holdout);

    let mut ranked: Vec<(ModelKind, f64)> = Vec::new();
    for kind in auto_candidates(series, season_length) {
        match backtest(kind, series, &cv_params) {
            Ok(eval) => {
                debug!(model = kind.label(), mse = eval.metrics.mse, "auto CV");
                ranked.push((kind, eval.metrics.mse));
            }
            Err(e) => debug!(model = kind.label(), error = %e, "auto CV: skipped"),
        }
    }
    ranked.sort_by(|a, b| a.1.total_cmp(&b.1));

    for (kind, mse) in &ranked {
        match run_guarded(*kind, series, &params) {
            Ok(forecast) if validate_forecast(series, &forecast) => {
                info!(model = kind.label(), cv_mse = mse, "auto: selected model");
                return Ok(forecast);
            }
            Ok(_) => debug!(model = kind.label(), "auto: refit failed validation, trying next"),
            Err(e) => debug!(model = kind.label(), error = %e, "auto: refit failed, trying next"),
        }
    }

    warn!("auto: no candidate passed validation, falling back to linear");
    models::forecast_linear(series, &params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::test_noise;
    use crate::common::types::Frequency;
    use crate::metrics::Metric;
    use chrono::NaiveDate;

    /// Helper to create a monthly TimeSeries of month-end dates from Jan 1990.
    fn make_series(values: Vec<f64>) -> TimeSeries {
        let start = NaiveDate::from_ymd_opt(1990, 1, 31).unwrap();
        let timestamps = (0..values.len())
            .map(|i| Frequency::Monthly.advance(start, i))
            .collect();
        TimeSeries::new(timestamps, values)
    }

    fn params(horizon: usize, season_length: usize) -> ForecastParams {
        ForecastParams::new(horizon, 0.95, season_length).unwrap()
    }

    const PATTERN: [f64; 12] = [
        0.85, 0.9, 1.05, 1.0, 1.1, 1.05, 1.0, 1.1, 0.95, 1.0, 0.95, 1.05,
    ];

    fn seasonal_values(n: usize) -> Vec<f64> {
        let noise = test_noise(n, 21);
        (0..n)
            .map(|i| (200.0 + 2.0 * i as f64) * PATTERN[i % 12] + noise[i])
            .collect()
    }

    // ==================== Dispatch ====================

    #[test]
    fn test_run_model_labels() {
        let series = make_series(seasonal_values(72));
        for kind in [
            ModelKind::HoltWintersAdditive,
            ModelKind::HoltWintersMultiplicative,
            ModelKind::AutoArima,
            ModelKind::AutoEts,
            ModelKind::AutoTheta,
            ModelKind::AutoCes,
            ModelKind::ProphetAdditive,
            ModelKind::ProphetMultiplicative,
            ModelKind::Linear,
            ModelKind::SeasonalNaive,
        ] {
            let result = run_model(kind, &series, &params(12, 12))
                .unwrap_or_else(|e| panic!("{} failed: {}", kind, e));
            assert_eq!(result.model, kind.label());
            assert_eq!(result.len(), 12, "{} should forecast 12 steps", kind);
            assert_eq!(
                result.timestamps[0],
                NaiveDate::from_ymd_opt(1996, 1, 31).unwrap()
            );
        }
    }

    // ==================== Backtest ====================

    #[test]
    fn test_backtest_exact_on_periodic_series() {
        let values: Vec<f64> = (0..48).map(|i| 100.0 * PATTERN[i % 12]).collect();
        let series = make_series(values.clone());
        let eval = backtest(ModelKind::SeasonalNaive, &series, &params(12, 12)).unwrap();

        assert_eq!(eval.actual, values[36..].to_vec());
        assert_eq!(eval.forecast.timestamps, series.timestamps[36..].to_vec());
        assert!(eval.metrics.mse.abs() < 1e-9, "mse {}", eval.metrics.mse);
        assert!(eval.metrics.bias.abs() < 1e-9);
        assert_eq!(eval.metrics.mape, Some(0.0));
    }

    #[test]
    fn test_backtest_scores_against_holdout() {
        let series = make_series(seasonal_values(72));
        let eval = backtest(ModelKind::Linear, &series, &params(12, 12)).unwrap();
        let expected = MetricBundle::compute(&eval.actual, &eval.forecast.forecasts).unwrap();
        assert_eq!(eval.metrics, expected);
        assert!(eval.metrics.rmse > 0.0, "linear cannot fit the seasonal swing exactly");
    }

    #[test]
    fn test_backtest_too_short() {
        let series = make_series((0..10).map(|i| i as f64 + 1.0).collect());
        assert_eq!(
            backtest(ModelKind::Linear, &series, &params(12, 12)).unwrap_err(),
            ForecastError::InsufficientData {
                model: "Linear",
                needed: 16,
                got: 10
            }
        );
    }

    // ==================== Evaluate models ====================

    #[test]
    fn test_evaluate_models_reports_failures() {
        let series = make_series((0..20).map(|i| 50.0 + 2.0 * i as f64).collect());
        let outcomes = evaluate_models(
            &[ModelKind::HoltWintersAdditive, ModelKind::Linear],
            &series,
            &params(6, 12),
        );

        assert_eq!(outcomes.len(), 2);
        assert!(
            outcomes[0].forecast.is_err(),
            "Holt-Winters needs two full seasons"
        );
        assert!(outcomes[0].evaluation.is_err());
        assert!(outcomes[1].forecast.is_ok());
        assert!(outcomes[1].evaluation.is_ok());

        let table = metric_table(&outcomes);
        assert_eq!(table.rows().len(), 1);
        assert_eq!(table.best(Metric::Mse), Some("Linear"));
        assert!(outcomes.iter().all(|o| o.in_sample.is_none()));
        assert!(in_sample_table(&outcomes).is_empty());
    }

    #[test]
    fn test_prophet_outcome_carries_in_sample_fit() {
        let series = make_series(seasonal_values(72));
        let outcomes = evaluate_models(&[ModelKind::ProphetAdditive], &series, &params(12, 12));

        let eval = match &outcomes[0].in_sample {
            Some(Ok(eval)) => eval,
            other => panic!("expected an in-sample fit, got {:?}", other),
        };
        assert_eq!(eval.forecast.len(), 72);
        assert_eq!(eval.actual, series.values);

        let table = in_sample_table(&outcomes);
        assert_eq!(table.rows().len(), 1);
        assert_eq!(table.rows()[0].0, "Prophet Add");
        assert!(in_sample(ModelKind::Linear, &series, &params(12, 12)).is_none());
    }

    // ==================== Auto ====================

    #[test]
    fn test_auto_seasonal_data() {
        let series = make_series(seasonal_values(96));
        let result = forecast_auto(&series, &params(12, 12)).unwrap();
        assert_eq!(result.len(), 12);
        assert!(result.is_finite());
        assert!(
            result.forecasts.iter().all(|f| *f > 300.0 && *f < 500.0),
            "forecasts should continue the level near 390: {:?}",
            result.forecasts
        );
    }

    #[test]
    fn test_auto_linear_data() {
        // Linear data: auto should work (picks linear or a trend model)
        let values: Vec<f64> = (0..20)
            .map(|i| 10.0 + 3.0 * i as f64 + (i as f64 * 0.5).sin())
            .collect();
        let series = make_series(values);

        let result = forecast_auto(&series, &params(5, 1));
        assert!(result.is_ok(), "Auto should succeed on linear data");
        assert_eq!(result.unwrap().forecasts.len(), 5);
    }

    #[test]
    fn test_auto_with_negatives_skips_multiplicative() {
        let values: Vec<f64> = (0..30).map(|i| -10.0 + 2.0 * i as f64).collect();
        let series = make_series(values);
        assert!(!auto_candidates(&series, 12).contains(&ModelKind::HoltWintersMultiplicative));

        let result = forecast_auto(&series, &params(5, 12));
        assert!(
            result.is_ok(),
            "Auto should succeed even with negative values"
        );
        assert_eq!(result.unwrap().forecasts.len(), 5);
    }

    #[test]
    fn test_auto_fallback_small_data() {
        // With exactly MIN_DATA_POINTS, should use fallback (not CV)
        let values: Vec<f64> = (0..MIN_DATA_POINTS).map(|i| i as f64 * 2.0 + 1.0).collect();
        let series = make_series(values);

        let result = forecast_auto(&series, &params(3, 1));
        assert!(
            result.is_ok(),
            "Auto should succeed with minimal data via fallback"
        );
    }

    #[test]
    fn test_run_model_auto_dispatches() {
        let series = make_series(seasonal_values(60));
        let result = run_model(ModelKind::Auto, &series, &params(6, 12)).unwrap();
        assert_eq!(result.len(), 6);
    }

    // ==================== Validation ====================

    #[test]
    fn test_validate_rejects_drop_on_rising_series() {
        let series = make_series(vec![10.0, 20.0, 30.0, 40.0]);
        let forecast = ForecastResult {
            model: "Linear".to_string(),
            timestamps: series.future_timestamps(2),
            forecasts: vec![30.0, 31.0],
            lower_bounds: vec![20.0, 21.0],
            upper_bounds: vec![40.0, 41.0],
        };
        assert!(!validate_forecast(&series, &forecast));

        let ok = ForecastResult {
            forecasts: vec![41.0, 42.0],
            ..forecast
        };
        assert!(validate_forecast(&series, &ok));
    }

    #[test]
    fn test_validate_rejects_non_finite() {
        let series = make_series(vec![40.0, 30.0, 20.0]);
        let forecast = ForecastResult {
            model: "Linear".to_string(),
            timestamps: series.future_timestamps(1),
            forecasts: vec![f64::NAN],
            lower_bounds: vec![0.0],
            upper_bounds: vec![1.0],
        };
        assert!(!validate_forecast(&series, &forecast));
    }
}
