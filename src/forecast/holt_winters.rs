//! Holt-Winters exponential smoothing with an additive trend and an additive
//! or multiplicative seasonal component.
//!
//! Smoothing weights are found in two stages: a coarse grid picks a starting
//! point, then Levenberg-Marquardt minimises the one-step squared errors over
//! unconstrained parameters mapped into (0, 1) by a logistic function.

use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt};
use nalgebra::{Dyn, OMatrix, OVector, Owned, Vector3, U3};
use tracing::debug;

use super::models::{assemble, require_points, z_value};
use super::params::ForecastParams;
use super::ForecastError;
use crate::common::types::{ForecastResult, TimeSeries, MIN_DATA_POINTS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seasonality {
    Additive,
    Multiplicative,
}

impl Seasonality {
    pub fn label(self) -> &'static str {
        match self {
            Seasonality::Additive => "Add",
            Seasonality::Multiplicative => "Multi",
        }
    }
}

/// Smoothing weights for level, trend and season.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Smoothing {
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
}

impl Smoothing {
    fn from_unconstrained(p: &Vector3<f64>) -> Self {
        Self {
            alpha: sigmoid(p[0]),
            beta: sigmoid(p[1]),
            gamma: sigmoid(p[2]),
        }
    }

    fn to_unconstrained(self) -> Vector3<f64> {
        Vector3::new(logit(self.alpha), logit(self.beta), logit(self.gamma))
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn logit(p: f64) -> f64 {
    let p = p.clamp(1e-6, 1.0 - 1e-6);
    (p / (1.0 - p)).ln()
}

/// Starting states estimated from the first two seasons.
#[derive(Debug, Clone)]
struct InitialState {
    level: f64,
    trend: f64,
    seasonal: Vec<f64>,
}

fn initial_state(values: &[f64], m: usize, kind: Seasonality) -> InitialState {
    let first = values[..m].iter().sum::<f64>() / m as f64;
    let second = values[m..2 * m].iter().sum::<f64>() / m as f64;
    let trend = (second - first) / m as f64;
    let centre = (m as f64 - 1.0) / 2.0;

    let mut seasonal: Vec<f64> = (0..m)
        .map(|i| {
            let baseline = first + (i as f64 - centre) * trend;
            match kind {
                Seasonality::Additive => values[i] - baseline,
                Seasonality::Multiplicative => values[i] / baseline,
            }
        })
        .collect();

    let mean = seasonal.iter().sum::<f64>() / m as f64;
    match kind {
        Seasonality::Additive => seasonal.iter_mut().for_each(|s| *s -= mean),
        Seasonality::Multiplicative => seasonal.iter_mut().for_each(|s| *s /= mean),
    }

    InitialState {
        // Level one step before the first observation.
        level: first - (centre + 1.0) * trend,
        trend,
        seasonal,
    }
}

/// Final states and one-step errors of a smoothing pass.
#[derive(Debug, Clone)]
struct SmoothingRun {
    errors: Vec<f64>,
    level: f64,
    trend: f64,
    /// Latest seasonal state per cycle position, indexed by `t % m`.
    seasonal: Vec<f64>,
}

impl SmoothingRun {
    fn sse(&self) -> f64 {
        self.errors.iter().map(|e| e * e).sum()
    }
}

fn smooth(values: &[f64], kind: Seasonality, init: &InitialState, w: Smoothing) -> SmoothingRun {
    let m = init.seasonal.len();
    let mut level = init.level;
    let mut trend = init.trend;
    let mut seasonal = init.seasonal.clone();
    let mut errors = Vec::with_capacity(values.len());

    for (t, &y) in values.iter().enumerate() {
        let s = seasonal[t % m];
        let base = level + trend;
        let (fitted, new_level, new_season) = match kind {
            Seasonality::Additive => {
                let l = w.alpha * (y - s) + (1.0 - w.alpha) * base;
                (base + s, l, w.gamma * (y - base) + (1.0 - w.gamma) * s)
            }
            Seasonality::Multiplicative => {
                let l = w.alpha * (y / s) + (1.0 - w.alpha) * base;
                (base * s, l, w.gamma * (y / base) + (1.0 - w.gamma) * s)
            }
        };
        errors.push(y - fitted);
        trend = w.beta * (new_level - level) + (1.0 - w.beta) * trend;
        level = new_level;
        seasonal[t % m] = new_season;
    }

    SmoothingRun {
        errors,
        level,
        trend,
        seasonal,
    }
}

/// One-step errors as a least-squares problem in the unconstrained weights.
struct SmoothingProblem<'a> {
    params: Vector3<f64>,
    values: &'a [f64],
    kind: Seasonality,
    init: &'a InitialState,
}

impl SmoothingProblem<'_> {
    fn errors_at(&self, p: &Vector3<f64>) -> Option<Vec<f64>> {
        let run = smooth(self.values, self.kind, self.init, Smoothing::from_unconstrained(p));
        run.errors.iter().all(|e| e.is_finite()).then_some(run.errors)
    }
}

impl LeastSquaresProblem<f64, Dyn, U3> for SmoothingProblem<'_> {
    type ParameterStorage = Owned<f64, U3>;
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, U3>;

    fn set_params(&mut self, p: &Vector3<f64>) {
        self.params.copy_from(p);
    }

    fn params(&self) -> Vector3<f64> {
        self.params
    }

    fn residuals(&self) -> Option<OVector<f64, Dyn>> {
        self.errors_at(&self.params).map(OVector::<f64, Dyn>::from_vec)
    }

    fn jacobian(&self) -> Option<OMatrix<f64, Dyn, U3>> {
        // Central differences; the recursion has no convenient closed form.
        const STEP: f64 = 1e-6;
        let n = self.values.len();
        let mut jac = OMatrix::<f64, Dyn, U3>::zeros(n);
        for k in 0..3 {
            let mut plus = self.params;
            let mut minus = self.params;
            plus[k] += STEP;
            minus[k] -= STEP;
            let ep = self.errors_at(&plus)?;
            let em = self.errors_at(&minus)?;
            for i in 0..n {
                jac[(i, k)] = (ep[i] - em[i]) / (2.0 * STEP);
            }
        }
        Some(jac)
    }
}

/// A fitted Holt-Winters model.
#[derive(Debug, Clone)]
pub struct HoltWintersFit {
    pub seasonality: Seasonality,
    pub smoothing: Smoothing,
    pub level: f64,
    pub trend: f64,
    seasonal: Vec<f64>,
    n: usize,
    pub sse: f64,
    /// Residual standard deviation of the one-step errors.
    pub sigma: f64,
}

impl HoltWintersFit {
    /// Fit to `values` with season length `m`.
    pub fn fit(values: &[f64], m: usize, kind: Seasonality) -> Result<Self, ForecastError> {
        let model = kind.label();
        if m < 2 {
            return Err(ForecastError::Fit {
                model,
                reason: "season length must be at least 2".to_string(),
            });
        }
        let needed = MIN_DATA_POINTS.max(2 * m);
        if values.len() < needed {
            return Err(ForecastError::InsufficientData {
                model,
                needed,
                got: values.len(),
            });
        }
        if kind == Seasonality::Multiplicative && values.iter().any(|v| *v <= 0.0) {
            return Err(ForecastError::NonPositive { model });
        }

        let init = initial_state(values, m, kind);
        let sse_of = |w: Smoothing| {
            let sse = smooth(values, kind, &init, w).sse();
            if sse.is_finite() {
                sse
            } else {
                f64::INFINITY
            }
        };

        let mut best = Smoothing {
            alpha: 0.5,
            beta: 0.1,
            gamma: 0.1,
        };
        let mut best_sse = sse_of(best);
        for &alpha in &[0.1, 0.3, 0.5, 0.7, 0.9] {
            for &beta in &[0.01, 0.1, 0.3] {
                for &gamma in &[0.01, 0.1, 0.3] {
                    let w = Smoothing { alpha, beta, gamma };
                    let sse = sse_of(w);
                    if sse < best_sse {
                        best = w;
                        best_sse = sse;
                    }
                }
            }
        }
        if !best_sse.is_finite() {
            return Err(ForecastError::Fit {
                model,
                reason: "no smoothing weights give finite errors".to_string(),
            });
        }

        let problem = SmoothingProblem {
            params: best.to_unconstrained(),
            values,
            kind,
            init: &init,
        };
        let (result, report) = LevenbergMarquardt::new().minimize(problem);
        let refined = Smoothing::from_unconstrained(&result.params);
        let refined_sse = sse_of(refined);

        let smoothing = if report.termination.was_successful() && refined_sse <= best_sse {
            refined
        } else {
            debug!(
                termination = ?report.termination,
                "LM refinement rejected, keeping grid weights"
            );
            best
        };
        debug!(
            model,
            alpha = smoothing.alpha,
            beta = smoothing.beta,
            gamma = smoothing.gamma,
            "holt-winters fit"
        );

        let run = smooth(values, kind, &init, smoothing);
        let sse = run.sse();
        let n = values.len();
        // Weights plus initial level and trend.
        let dof = n.saturating_sub(5).max(1);

        Ok(Self {
            seasonality: kind,
            smoothing,
            level: run.level,
            trend: run.trend,
            seasonal: run.seasonal,
            n,
            sse,
            sigma: (sse / dof as f64).sqrt(),
        })
    }

    pub fn season_length(&self) -> usize {
        self.seasonal.len()
    }

    /// Point forecasts `1..=horizon` steps ahead.
    pub fn predict(&self, horizon: usize) -> Vec<f64> {
        let m = self.season_length();
        (1..=horizon)
            .map(|h| {
                let base = self.level + h as f64 * self.trend;
                let s = self.seasonal[(self.n + h - 1) % m];
                match self.seasonality {
                    Seasonality::Additive => base + s,
                    Seasonality::Multiplicative => base * s,
                }
            })
            .collect()
    }

    /// Forecast standard deviation `h` steps ahead:
    /// sigma * sqrt(1 + sum_{j<h} c_j^2), c_j = alpha + alpha*beta*j + gamma*[j % m == 0].
    pub fn forecast_sd(&self, h: usize) -> f64 {
        let m = self.season_length();
        let Smoothing { alpha, beta, gamma } = self.smoothing;
        let sum: f64 = (1..h)
            .map(|j| {
                let seasonal = if j % m == 0 { gamma } else { 0.0 };
                let c = alpha + alpha * beta * j as f64 + seasonal;
                c * c
            })
            .sum();
        self.sigma * (1.0 + sum).sqrt()
    }
}

/// Holt-Winters forecast with the configured season length.
pub fn forecast_holt_winters(
    series: &TimeSeries,
    params: &ForecastParams,
    kind: Seasonality,
) -> Result<ForecastResult, ForecastError> {
    let model = kind.label();
    require_points(model, series, MIN_DATA_POINTS)?;

    let fit = HoltWintersFit::fit(&series.values, params.season_length, kind)?;
    let z = z_value(model, params.confidence_level)?;

    let forecasts = fit.predict(params.horizon);
    let (lower, upper): (Vec<f64>, Vec<f64>) = forecasts
        .iter()
        .enumerate()
        .map(|(i, f)| {
            let width = z * fit.forecast_sd(i + 1);
            (f - width, f + width)
        })
        .unzip();

    assemble(model, series, forecasts, lower, upper)
}
