use augurs_core::{Fit, Predict};
use augurs_ets::AutoETS;
use linregress::{FormulaRegressionBuilder, RegressionDataBuilder};
use statrs::distribution::{ContinuousCDF, Normal, StudentsT};
use tracing::{debug, warn};

use super::params::ForecastParams;
use super::ForecastError;
use crate::common::types::{ForecastResult, TimeSeries, MIN_DATA_POINTS};
use crate::seasonality::decomposition::decompose;
use crate::seasonality::params::{DecompositionKind, DecompositionParams};
use crate::stationarity::autocorrelation::acf;

/// Fail with `InsufficientData` unless the series has `needed` points.
pub(crate) fn require_points(
    model: &'static str,
    series: &TimeSeries,
    needed: usize,
) -> Result<(), ForecastError> {
    if series.len() < needed {
        return Err(ForecastError::InsufficientData {
            model,
            needed,
            got: series.len(),
        });
    }
    Ok(())
}

/// Map a library error into `ForecastError::Fit` for `model`.
pub(crate) fn fit_error<E: std::fmt::Display>(model: &'static str) -> impl Fn(E) -> ForecastError {
    move |e| ForecastError::Fit {
        model,
        reason: e.to_string(),
    }
}

/// Two-sided standard normal quantile for a confidence level.
pub(crate) fn z_value(model: &'static str, confidence_level: f64) -> Result<f64, ForecastError> {
    let normal = Normal::new(0.0, 1.0).map_err(fit_error(model))?;
    Ok(normal.inverse_cdf(0.5 + confidence_level / 2.0))
}

/// Attach future timestamps and reject non-finite output.
pub(crate) fn assemble(
    model: &'static str,
    series: &TimeSeries,
    forecasts: Vec<f64>,
    lower_bounds: Vec<f64>,
    upper_bounds: Vec<f64>,
) -> Result<ForecastResult, ForecastError> {
    let result = ForecastResult {
        model: model.to_string(),
        timestamps: series.future_timestamps(forecasts.len()),
        forecasts,
        lower_bounds,
        upper_bounds,
    };
    if !result.is_finite() {
        return Err(ForecastError::NonFinite { model });
    }
    Ok(result)
}

/// Non-seasonal automatic ETS ("ZZN").
pub fn forecast_ets(
    series: &TimeSeries,
    params: &ForecastParams,
) -> Result<ForecastResult, ForecastError> {
    const MODEL: &str = "AutoETS";
    require_points(MODEL, series, MIN_DATA_POINTS)?;

    let model = AutoETS::non_seasonal();
    let fitted = model.fit(&series.values).map_err(fit_error(MODEL))?;
    let forecast = fitted
        .predict(params.horizon, params.confidence_level)
        .map_err(fit_error(MODEL))?;

    let (lower, upper) = match forecast.intervals {
        Some(intervals) => (intervals.lower, intervals.upper),
        None => (forecast.point.clone(), forecast.point.clone()),
    };
    assemble(MODEL, series, forecast.point, lower, upper)
}

/// Automatic ETS searching every error/trend/season combination ("ZZZ")
/// for the configured season length.
pub fn forecast_ets_seasonal(
    series: &TimeSeries,
    params: &ForecastParams,
) -> Result<ForecastResult, ForecastError> {
    const MODEL: &str = "AutoETS";
    require_points(MODEL, series, MIN_DATA_POINTS.max(2 * params.season_length))?;

    let model = AutoETS::new(params.season_length, "ZZZ").map_err(fit_error(MODEL))?;
    let fitted = model.fit(&series.values).map_err(fit_error(MODEL))?;
    let forecast = fitted
        .predict(params.horizon, params.confidence_level)
        .map_err(fit_error(MODEL))?;

    let (lower, upper) = match forecast.intervals {
        Some(intervals) => (intervals.lower, intervals.upper),
        None => (forecast.point.clone(), forecast.point.clone()),
    };
    assemble(MODEL, series, forecast.point, lower, upper)
}

/// AutoETS: the seasonal search when a season length is set and the series
/// covers two seasons, otherwise (or when that fit fails) the non-seasonal one.
pub fn forecast_auto_ets(
    series: &TimeSeries,
    params: &ForecastParams,
) -> Result<ForecastResult, ForecastError> {
    if params.season_length > 1 && series.len() >= 2 * params.season_length {
        match forecast_ets_seasonal(series, params) {
            Ok(result) => return Ok(result),
            Err(e) => warn!(error = %e, "seasonal ETS failed, falling back to non-seasonal"),
        }
    }
    forecast_ets(series, params)
}

/// OLS fit of y = intercept + slope * t on t = 0, 1, ...
/// Returns (intercept, slope, residual variance).
fn fit_trend(model: &'static str, values: &[f64]) -> Result<(f64, f64, f64), ForecastError> {
    let x_vals: Vec<f64> = (0..values.len()).map(|i| i as f64).collect();
    let data = vec![("Y".to_string(), values.to_vec()), ("X".to_string(), x_vals)];

    let regression_data = RegressionDataBuilder::new()
        .build_from(data)
        .map_err(fit_error(model))?;
    let fitted = FormulaRegressionBuilder::new()
        .data(&regression_data)
        .formula("Y ~ X")
        .fit()
        .map_err(fit_error(model))?;

    // parameters() returns [intercept, slope]; scale() is SSR / (n - 2)
    let params = fitted.parameters();
    Ok((params[0], params[1], fitted.scale()))
}

/// Linear trend (OLS on the time index) with Student's t prediction intervals.
pub fn forecast_linear(
    series: &TimeSeries,
    params: &ForecastParams,
) -> Result<ForecastResult, ForecastError> {
    const MODEL: &str = "Linear";
    require_points(MODEL, series, MIN_DATA_POINTS)?;

    let n = series.len();
    let (intercept, slope, scale) = fit_trend(MODEL, &series.values)?;
    let residual_se = scale.max(0.0).sqrt();

    let x_mean = (n - 1) as f64 / 2.0;
    let sum_sq_dev: f64 = (0..n).map(|i| (i as f64 - x_mean).powi(2)).sum();

    let t_value = if residual_se < 1e-10 {
        0.0
    } else {
        let t_dist = StudentsT::new(0.0, 1.0, (n - 2) as f64).map_err(fit_error(MODEL))?;
        t_dist.inverse_cdf(0.5 + params.confidence_level / 2.0)
    };

    let mut forecasts = Vec::with_capacity(params.horizon);
    let mut lower = Vec::with_capacity(params.horizon);
    let mut upper = Vec::with_capacity(params.horizon);

    for h in 1..=params.horizon {
        let x_pred = (n - 1 + h) as f64;
        let y_hat = intercept + slope * x_pred;
        // PI = y_hat +/- t * se * sqrt(1 + 1/n + (x - x_mean)^2 / Sxx)
        let width = t_value
            * residual_se
            * (1.0 + 1.0 / n as f64 + (x_pred - x_mean).powi(2) / sum_sq_dev).sqrt();
        forecasts.push(y_hat);
        lower.push(y_hat - width);
        upper.push(y_hat + width);
    }

    assemble(MODEL, series, forecasts, lower, upper)
}

/// Repeat the last observed season. Interval width grows with the number of
/// whole seasons ahead.
pub fn forecast_seasonal_naive(
    series: &TimeSeries,
    params: &ForecastParams,
) -> Result<ForecastResult, ForecastError> {
    const MODEL: &str = "SeasonalNaive";
    let m = params.season_length;
    require_points(MODEL, series, MIN_DATA_POINTS.max(m + 1))?;

    let n = series.len();
    let values = &series.values;
    let residuals: Vec<f64> = (m..n).map(|t| values[t] - values[t - m]).collect();
    let sigma = (residuals.iter().map(|e| e * e).sum::<f64>() / residuals.len() as f64).sqrt();
    let z = z_value(MODEL, params.confidence_level)?;

    let mut forecasts = Vec::with_capacity(params.horizon);
    let mut lower = Vec::with_capacity(params.horizon);
    let mut upper = Vec::with_capacity(params.horizon);
    for h in 1..=params.horizon {
        let point = values[n - m + (h - 1) % m];
        let seasons_ahead = ((h - 1) / m) as f64;
        let width = z * sigma * (seasons_ahead + 1.0).sqrt();
        forecasts.push(point);
        lower.push(point - width);
        upper.push(point + width);
    }

    assemble(MODEL, series, forecasts, lower, upper)
}

/// 90% one-sided test that lag `m` autocorrelation is significant, with
/// Bartlett's variance from the lower lags.
pub(crate) fn seasonality_test(values: &[f64], m: usize) -> bool {
    let r = acf(values, m);
    if r.len() <= m {
        return false;
    }
    let lower_lags: f64 = r[1..m].iter().map(|v| v * v).sum();
    let limit = 1.645 * ((1.0 + 2.0 * lower_lags) / values.len() as f64).sqrt();
    r[m].abs() > limit
}

/// Simple exponential smoothing with alpha chosen on a grid by one-step SSE.
/// Returns (alpha, final level, one-step residual standard deviation).
fn fit_ses(values: &[f64]) -> (f64, f64, f64) {
    let run = |alpha: f64| {
        let mut level = values[0];
        let mut sse = 0.0;
        for &y in &values[1..] {
            let e = y - level;
            sse += e * e;
            level += alpha * e;
        }
        (level, sse)
    };

    let mut best = (0.5, run(0.5).0, f64::INFINITY);
    for step in 1..100 {
        let alpha = step as f64 / 100.0;
        let (level, sse) = run(alpha);
        if sse < best.2 {
            best = (alpha, level, sse);
        }
    }
    let (alpha, level, sse) = best;
    (alpha, level, (sse / (values.len() - 1) as f64).sqrt())
}

/// Standard Theta method with automatic seasonal adjustment.
///
/// When the lag-`m` autocorrelation is significant and the data are
/// positive, the series is divided by classical multiplicative seasonal
/// indices. The adjusted series is forecast by simple exponential smoothing
/// plus half the OLS trend slope, then reseasonalized.
pub fn forecast_theta(
    series: &TimeSeries,
    params: &ForecastParams,
) -> Result<ForecastResult, ForecastError> {
    const MODEL: &str = "AutoTheta";
    require_points(MODEL, series, MIN_DATA_POINTS)?;

    let n = series.len();
    let m = params.season_length;
    let values = &series.values;

    let indices = if m > 1
        && n >= 2 * m
        && values.iter().all(|v| *v > 0.0)
        && seasonality_test(values, m)
    {
        let decomposition_params = DecompositionParams {
            period: m,
            kind: DecompositionKind::Multiplicative,
        };
        decompose(values, &decomposition_params)
            .ok()
            .map(|d| d.seasonal_indices().to_vec())
    } else {
        None
    };
    debug!(seasonal = indices.is_some(), "theta seasonal adjustment");

    let season = |i: usize| indices.as_ref().map_or(1.0, |s| s[i % m]);
    let adjusted: Vec<f64> = values
        .iter()
        .enumerate()
        .map(|(i, y)| y / season(i))
        .collect();

    let (alpha, level, sigma) = fit_ses(&adjusted);
    let (_, slope, _) = fit_trend(MODEL, &adjusted)?;
    let z = z_value(MODEL, params.confidence_level)?;
    debug!(alpha, level, slope, "theta fit");

    let decay = (1.0 - alpha).powi(n as i32) / alpha;
    let mut forecasts = Vec::with_capacity(params.horizon);
    let mut lower = Vec::with_capacity(params.horizon);
    let mut upper = Vec::with_capacity(params.horizon);
    for h in 1..=params.horizon {
        let drift = slope / 2.0 * ((h - 1) as f64 + 1.0 / alpha - decay);
        let s = season(n + h - 1);
        let point = (level + drift) * s;
        let width = z * sigma * (1.0 + (h - 1) as f64 * alpha * alpha).sqrt() * s;
        forecasts.push(point);
        lower.push(point - width);
        upper.push(point + width);
    }

    assemble(MODEL, series, forecasts, lower, upper)
}
