//! Prophet forecasts with an additive or multiplicative yearly seasonality.
//!
//! Feature construction, scaling and uncertainty sampling come from
//! `augurs-prophet`. The posterior mode is found here by [`MapOptimizer`],
//! which needs no external Stan installation.

use augurs_prophet::optimizer::{self, Data, InitialParams, OptimizeOpts, OptimizedParams};
use augurs_prophet::{
    FeatureMode, IntervalWidth, Optimizer, PositiveFloat, PredictionData, Prophet,
    ProphetOptions, TrainingData, TrendIndicator,
};
use chrono::{NaiveDate, NaiveTime};
use nalgebra::{DMatrix, DVector};
use tracing::debug;

use super::models::{assemble, fit_error, require_points};
use super::params::{ForecastParams, ModelKind};
use super::{ForecastError, ModelEvaluation};
use crate::common::types::{ForecastResult, TimeSeries, MIN_DATA_POINTS};
use crate::metrics::MetricBundle;

/// Prior scale of the base growth rate and offset.
const TREND_PRIOR_SCALE: f64 = 5.0;

/// Prior scale of the observation noise.
const NOISE_PRIOR_SCALE: f64 = 0.5;

/// Smallest noise scale, on the scaled series.
const SIGMA_FLOOR: f64 = 1e-10;

/// Coordinate descent sweeps over the trend block per outer iteration.
const TREND_SWEEPS: usize = 100;

/// Largest coordinate step that still counts as converged.
const STEP_TOLERANCE: f64 = 1e-12;

/// Maximum a posteriori estimate of Prophet's linear or flat trend model.
///
/// Alternates minimisation over three blocks: the trend parameters
/// `(k, m, delta)` given the regressor coefficients, the coefficients given
/// the trend, and the noise scale in closed form. Every block update lowers
/// the negative log posterior.
#[derive(Debug, Clone, Copy)]
pub struct MapOptimizer {
    pub max_iter: u32,
    /// Relative change in the objective that ends the iteration.
    pub tolerance: f64,
}

impl Default for MapOptimizer {
    fn default() -> Self {
        Self {
            max_iter: 500,
            tolerance: 1e-9,
        }
    }
}

/// Dense views of the optimizer input.
struct Posterior {
    y: DVector<f64>,
    /// Trend design: `t`, `1`, then `A_ij (t_i - t_change_j)`.
    trend_design: DMatrix<f64>,
    /// Columns of `trend_design` that are free parameters.
    free: Vec<usize>,
    x: DMatrix<f64>,
    additive: DVector<f64>,
    multiplicative: DVector<f64>,
    sigmas: Vec<f64>,
    tau: f64,
}

impl Posterior {
    fn new(data: &Data) -> Result<Self, optimizer::Error> {
        let n = data.y.len();
        let s = data.t_change.len();
        let k = data.s_a.len();

        let free: Vec<usize> = match data.trend_indicator {
            TrendIndicator::Linear => (0..2 + s).collect(),
            TrendIndicator::Flat => vec![1],
            TrendIndicator::Logistic => {
                return Err(optimizer::Error::static_str(
                    "logistic growth is not supported",
                ))
            }
        };
        if data.t.len() != n || data.X.len() != n * k || data.sigmas.len() != k {
            return Err(optimizer::Error::static_str("inconsistent model dimensions"));
        }

        let trend_design = DMatrix::from_fn(n, 2 + s, |i, j| match j {
            0 => data.t[i],
            1 => 1.0,
            _ => {
                let change = data.t_change[j - 2];
                if data.t[i] >= change {
                    data.t[i] - change
                } else {
                    0.0
                }
            }
        });

        Ok(Self {
            y: DVector::from_column_slice(&data.y),
            trend_design,
            free,
            x: DMatrix::from_row_slice(n, k, &data.X),
            additive: DVector::from_iterator(k, data.s_a.iter().map(|&v| v as f64)),
            multiplicative: DVector::from_iterator(k, data.s_m.iter().map(|&v| v as f64)),
            sigmas: data.sigmas.iter().map(|s| **s).collect(),
            tau: *data.tau,
        })
    }

    fn n(&self) -> usize {
        self.y.len()
    }

    /// Additive and multiplicative regressor effects for `beta`.
    fn effects(&self, beta: &DVector<f64>) -> (DVector<f64>, DVector<f64>) {
        (
            &self.x * beta.component_mul(&self.additive),
            &self.x * beta.component_mul(&self.multiplicative),
        )
    }

    fn fitted(&self, trend: &DVector<f64>, beta: &DVector<f64>) -> DVector<f64> {
        let (additive, multiplicative) = self.effects(beta);
        trend.component_mul(&multiplicative.add_scalar(1.0)) + additive
    }

    /// Negative log posterior, up to a constant.
    fn objective(&self, theta: &DVector<f64>, beta: &DVector<f64>, sigma: f64) -> f64 {
        let trend = &self.trend_design * theta;
        let ssr = (&self.y - self.fitted(&trend, beta)).norm_squared();
        let trend_prior =
            (theta[0].powi(2) + theta[1].powi(2)) / (2.0 * TREND_PRIOR_SCALE.powi(2));
        let change_prior = theta.rows(2, theta.len() - 2).abs().sum() / self.tau;
        let beta_prior: f64 = beta
            .iter()
            .zip(&self.sigmas)
            .map(|(b, s)| b * b / (2.0 * s * s))
            .sum();
        ssr / (2.0 * sigma * sigma)
            + self.n() as f64 * sigma.ln()
            + sigma * sigma / (2.0 * NOISE_PRIOR_SCALE.powi(2))
            + trend_prior
            + change_prior
            + beta_prior
    }

    /// Trend parameters minimising the objective for fixed `beta`, by
    /// cyclic coordinate descent starting from `theta`. Changepoint
    /// adjustments are soft-thresholded, which is exact for the Laplace prior.
    fn solve_trend(
        &self,
        theta: &DVector<f64>,
        beta: &DVector<f64>,
        sigma: f64,
    ) -> DVector<f64> {
        let (additive, multiplicative) = self.effects(beta);
        let scale = multiplicative.add_scalar(1.0);
        let design = &self.trend_design;
        let z = DMatrix::from_fn(design.nrows(), design.ncols(), |i, j| {
            scale[i] * design[(i, j)]
        });

        let precision = 1.0 / (sigma * sigma);
        let curvature: Vec<f64> = z
            .column_iter()
            .map(|c| c.norm_squared() * precision)
            .collect();
        let mut theta = theta.clone();
        let mut residual = &self.y - additive - &z * &theta;

        for _ in 0..TREND_SWEEPS {
            let mut largest_step = 0.0_f64;
            for &j in &self.free {
                if curvature[j] == 0.0 {
                    continue;
                }
                let column = z.column(j);
                let old = theta[j];
                let rho = column.dot(&residual) * precision + curvature[j] * old;
                let new = if j < 2 {
                    rho / (curvature[j] + 1.0 / TREND_PRIOR_SCALE.powi(2))
                } else {
                    soft_threshold(rho, 1.0 / self.tau) / curvature[j]
                };
                if new != old {
                    residual.axpy(old - new, &column, 1.0);
                    theta[j] = new;
                    largest_step = largest_step.max((new - old).abs());
                }
            }
            if largest_step < STEP_TOLERANCE {
                break;
            }
        }
        theta
    }

    /// Regressor coefficients minimising the objective for a fixed trend.
    fn solve_beta(
        &self,
        trend: &DVector<f64>,
        sigma: f64,
    ) -> Result<DVector<f64>, optimizer::Error> {
        let h = DMatrix::from_fn(self.x.nrows(), self.x.ncols(), |i, j| {
            self.x[(i, j)] * (self.additive[j] + trend[i] * self.multiplicative[j])
        });
        let precision = 1.0 / (sigma * sigma);
        let mut lhs = h.transpose() * &h * precision;
        for (j, s) in self.sigmas.iter().enumerate() {
            lhs[(j, j)] += 1.0 / (s * s);
        }
        let rhs = h.transpose() * (&self.y - trend) * precision;
        solve_spd(lhs, rhs)
    }

    /// Noise scale minimising the objective for a residual sum of squares.
    fn solve_sigma(&self, ssr: f64) -> f64 {
        // Positive root of s^4 / c^2 + n s^2 - ssr = 0, the stationary
        // point of n ln s + ssr / 2s^2 + s^2 / 2c^2.
        let n = self.n() as f64;
        let c2 = NOISE_PRIOR_SCALE.powi(2);
        let s2 = 2.0 * ssr / (n + (n * n + 4.0 * ssr / c2).sqrt());
        s2.sqrt().max(SIGMA_FLOOR)
    }
}

fn soft_threshold(value: f64, threshold: f64) -> f64 {
    value.signum() * (value.abs() - threshold).max(0.0)
}

fn solve_spd(lhs: DMatrix<f64>, rhs: DVector<f64>) -> Result<DVector<f64>, optimizer::Error> {
    match lhs.clone().cholesky() {
        Some(chol) => Ok(chol.solve(&rhs)),
        None => lhs
            .lu()
            .solve(&rhs)
            .ok_or_else(|| optimizer::Error::static_str("singular normal equations")),
    }
}

impl Optimizer for MapOptimizer {
    fn optimize(
        &self,
        init: &InitialParams,
        data: &Data,
        opts: &OptimizeOpts,
    ) -> Result<OptimizedParams, optimizer::Error> {
        let posterior = Posterior::new(data)?;
        let s = data.t_change.len();

        let mut theta = DVector::<f64>::zeros(2 + s);
        theta[0] = init.k;
        theta[1] = init.m;
        for (j, d) in init.delta.iter().take(s).enumerate() {
            theta[2 + j] = *d;
        }
        if data.trend_indicator == TrendIndicator::Flat {
            theta[0] = 0.0;
            theta.rows_mut(2, s).fill(0.0);
        }
        let mut beta = DVector::from_iterator(
            posterior.sigmas.len(),
            init.beta.iter().copied().chain(std::iter::repeat(0.0)),
        );
        let mut sigma = *init.sigma_obs;

        let max_iter = opts.iter.unwrap_or(self.max_iter).max(1);
        let mut previous = f64::INFINITY;
        let mut iterations = 0;
        for iter in 0..max_iter {
            theta = posterior.solve_trend(&theta, &beta, sigma);
            let trend = &posterior.trend_design * &theta;
            beta = posterior.solve_beta(&trend, sigma)?;
            let ssr = (&posterior.y - posterior.fitted(&trend, &beta)).norm_squared();
            sigma = posterior.solve_sigma(ssr);

            let objective = posterior.objective(&theta, &beta, sigma);
            if !objective.is_finite() {
                return Err(optimizer::Error::static_str("objective is not finite"));
            }
            iterations = iter + 1;
            if (previous - objective).abs() <= self.tolerance * (1.0 + objective.abs()) {
                break;
            }
            previous = objective;
        }
        debug!(iterations, sigma, "prophet MAP optimisation");

        let trend = &posterior.trend_design * &theta;
        Ok(OptimizedParams {
            k: theta[0],
            m: theta[1],
            sigma_obs: PositiveFloat::try_new(sigma)
                .map_err(|e| optimizer::Error::string(e.to_string()))?,
            delta: theta.rows(2, s).iter().copied().collect(),
            beta: beta.iter().copied().collect(),
            trend: trend.iter().copied().collect(),
        })
    }
}

fn mode_label(mode: FeatureMode) -> &'static str {
    match mode {
        FeatureMode::Additive => ModelKind::ProphetAdditive.label(),
        FeatureMode::Multiplicative => ModelKind::ProphetMultiplicative.label(),
    }
}

fn seconds(dates: &[NaiveDate]) -> Vec<i64> {
    dates
        .iter()
        .map(|d| d.and_time(NaiveTime::MIN).and_utc().timestamp())
        .collect()
}

/// Fit Prophet on the whole series.
pub fn fit_prophet(
    series: &TimeSeries,
    confidence_level: f64,
    mode: FeatureMode,
) -> Result<Prophet<MapOptimizer>, ForecastError> {
    let model = mode_label(mode);
    require_points(model, series, MIN_DATA_POINTS)?;

    let options = ProphetOptions {
        seasonality_mode: mode,
        interval_width: IntervalWidth::try_new(confidence_level).map_err(fit_error(model))?,
        ..ProphetOptions::default()
    };
    let data = TrainingData::new(seconds(&series.timestamps), series.values.clone())
        .map_err(fit_error(model))?;

    let mut prophet = Prophet::new(options, MapOptimizer::default());
    prophet
        .fit(data, OptimizeOpts::default())
        .map_err(fit_error(model))?;
    Ok(prophet)
}

/// Prophet forecast for the `params.horizon` periods after the series.
pub fn forecast_prophet(
    series: &TimeSeries,
    params: &ForecastParams,
    mode: FeatureMode,
) -> Result<ForecastResult, ForecastError> {
    let model = mode_label(mode);
    let prophet = fit_prophet(series, params.confidence_level, mode)?;

    let future = PredictionData::new(seconds(&series.future_timestamps(params.horizon)));
    let predictions = prophet.predict(future).map_err(fit_error(model))?;
    let point = predictions.yhat.point;
    let lower = predictions.yhat.lower.unwrap_or_else(|| point.clone());
    let upper = predictions.yhat.upper.unwrap_or_else(|| point.clone());
    assemble(model, series, point, lower, upper)
}

/// Fit on the whole series and score the fitted values against it.
pub fn in_sample_evaluation(
    series: &TimeSeries,
    params: &ForecastParams,
    mode: FeatureMode,
) -> Result<ModelEvaluation, ForecastError> {
    let model = mode_label(mode);
    let prophet = fit_prophet(series, params.confidence_level, mode)?;
    let predictions = prophet
        .predict(None::<PredictionData>)
        .map_err(fit_error(model))?;

    let point = predictions.yhat.point;
    let lower = predictions.yhat.lower.unwrap_or_else(|| point.clone());
    let upper = predictions.yhat.upper.unwrap_or_else(|| point.clone());
    let fitted = ForecastResult {
        model: model.to_string(),
        timestamps: series.timestamps.clone(),
        forecasts: point,
        lower_bounds: lower,
        upper_bounds: upper,
    };
    if !fitted.is_finite() {
        return Err(ForecastError::NonFinite { model });
    }

    let metrics = MetricBundle::compute(&series.values, &fitted.forecasts)?;
    debug!(model, mse = metrics.mse, mape = ?metrics.mape, "prophet in-sample fit");

    let kind = match mode {
        FeatureMode::Additive => ModelKind::ProphetAdditive,
        FeatureMode::Multiplicative => ModelKind::ProphetMultiplicative,
    };
    Ok(ModelEvaluation {
        kind,
        forecast: fitted,
        actual: series.values.clone(),
        metrics,
    })
}
