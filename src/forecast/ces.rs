//! Complex exponential smoothing.
//!
//! Each variant is a linear innovations state-space model
//! `y_t = w'x_{t-1} + e_t`, `x_t = F x_{t-1} + g e_t` whose state carries a
//! complex-valued level (a real part and an imaginary "information
//! potential" part). Seasonal variants keep a shift register of the last
//! `m` seasonal states. Smoothing parameters come from a grid followed by
//! Levenberg-Marquardt on the one-step errors, and the variant with the
//! lowest AICc is used for the forecast.

use std::fmt;

use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt};
use nalgebra::linalg::Schur;
use nalgebra::{DMatrix, DVector, Dyn, OMatrix, OVector, Owned};
use tracing::debug;

use super::models::{assemble, require_points, z_value};
use super::params::ForecastParams;
use super::ForecastError;
use crate::common::types::{ForecastResult, TimeSeries, MIN_DATA_POINTS};

const MODEL: &str = "CES";

/// Number of observations averaged for the starting level of the
/// non-seasonal variant.
const INITIAL_LEVEL_POINTS: usize = 10;

/// Ratio of the starting real part to the starting imaginary part.
const INITIAL_POTENTIAL_RATIO: f64 = 1.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CesKind {
    /// Complex level only.
    None,
    /// Complex level lagged by the season length, no short-term level.
    Simple,
    /// Complex level plus a real additive seasonal component.
    Partial,
    /// Complex level plus a complex seasonal component.
    Full,
}

impl CesKind {
    fn parameter_count(self) -> usize {
        match self {
            CesKind::None | CesKind::Simple => 2,
            CesKind::Partial => 3,
            CesKind::Full => 4,
        }
    }

    fn has_level(self) -> bool {
        !matches!(self, CesKind::Simple)
    }

    fn state_len(self, m: usize) -> usize {
        match self {
            CesKind::None => 2,
            CesKind::Simple => 2 * m,
            CesKind::Partial => 2 + m,
            CesKind::Full => 2 + 2 * m,
        }
    }

    /// Grid of starting smoothing parameters.
    fn starting_points(self) -> Vec<Vec<f64>> {
        const REAL: [f64; 4] = [1.0, 1.3, 1.6, 1.9];
        const IMAGINARY: [f64; 3] = [0.8, 1.0, 1.2];
        let complex: Vec<(f64, f64)> = REAL
            .iter()
            .flat_map(|&a0| IMAGINARY.iter().map(move |&a1| (a0, a1)))
            .collect();

        match self {
            CesKind::None | CesKind::Simple => {
                complex.iter().map(|&(a0, a1)| vec![a0, a1]).collect()
            }
            CesKind::Partial => complex
                .iter()
                .flat_map(|&(a0, a1)| [0.05, 0.1, 0.3].map(|b| vec![a0, a1, b]))
                .collect(),
            CesKind::Full => complex
                .iter()
                .flat_map(|&(a0, a1)| complex.iter().map(move |&(b0, b1)| vec![a0, a1, b0, b1]))
                .collect(),
        }
    }
}

impl fmt::Display for CesKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CesKind::None => "N",
            CesKind::Simple => "S",
            CesKind::Partial => "P",
            CesKind::Full => "F",
        };
        f.write_str(name)
    }
}

/// Transition, persistence and measurement of one variant.
#[derive(Debug, Clone)]
struct StateSpace {
    transition: DMatrix<f64>,
    persistence: DVector<f64>,
    measurement: DVector<f64>,
}

/// Write one complex smoothing block. `from` is the state the block reads,
/// `to` is where its new real part goes; the imaginary parts follow each.
fn complex_block(space: &mut StateSpace, from: usize, to: usize, a0: f64, a1: f64) {
    let f = &mut space.transition;
    f[(to, from)] = 1.0;
    f[(to, from + 1)] = a1 - 1.0;
    f[(to + 1, from)] = 1.0;
    f[(to + 1, from + 1)] = 1.0 - a0;
    space.persistence[to] = a0 - a1;
    space.persistence[to + 1] = a0 + a1;
    space.measurement[from] = 1.0;
}

impl StateSpace {
    fn new(kind: CesKind, p: &[f64], m: usize) -> Self {
        let k = kind.state_len(m);
        let mut space = Self {
            transition: DMatrix::zeros(k, k),
            persistence: DVector::zeros(k),
            measurement: DVector::zeros(k),
        };

        let base = if kind.has_level() {
            complex_block(&mut space, 0, 0, p[0], p[1]);
            2
        } else {
            0
        };

        match kind {
            CesKind::None => {}
            CesKind::Simple | CesKind::Full => {
                let (b0, b1) = if kind == CesKind::Simple {
                    (p[0], p[1])
                } else {
                    (p[2], p[3])
                };
                // Newest pair first; the oldest pair is the one observed next.
                complex_block(&mut space, base + 2 * (m - 1), base, b0, b1);
                for j in 1..m {
                    space.transition[(base + 2 * j, base + 2 * (j - 1))] = 1.0;
                    space.transition[(base + 2 * j + 1, base + 2 * (j - 1) + 1)] = 1.0;
                }
            }
            CesKind::Partial => {
                let oldest = base + m - 1;
                space.transition[(base, oldest)] = 1.0;
                space.persistence[base] = p[2];
                space.measurement[oldest] = 1.0;
                for j in 1..m {
                    space.transition[(base + j, base + j - 1)] = 1.0;
                }
            }
        }
        space
    }

    /// Whether the discount matrix `F - g w'` has all eigenvalues inside
    /// the unit circle.
    fn is_stable(&self) -> bool {
        let discount = &self.transition - &self.persistence * self.measurement.transpose();
        if discount.iter().any(|v| !v.is_finite()) {
            return false;
        }
        match Schur::try_new(discount, f64::EPSILON, 1000) {
            Some(schur) => schur
                .complex_eigenvalues()
                .iter()
                .all(|z| z.norm() <= 1.0 + 1e-9),
            None => false,
        }
    }
}

/// Starting state for `kind`, newest seasonal position first.
fn initial_state(kind: CesKind, values: &[f64], m: usize) -> DVector<f64> {
    let mut x = Vec::with_capacity(kind.state_len(m));
    let season_mean = values[..m.min(values.len())].iter().sum::<f64>() / m as f64;

    match kind {
        CesKind::None => {
            let k = values.len().min(INITIAL_LEVEL_POINTS);
            let level = values[..k].iter().sum::<f64>() / k as f64;
            x.extend([level, level / INITIAL_POTENTIAL_RATIO]);
        }
        CesKind::Simple => {
            for &v in values[..m].iter().rev() {
                x.extend([v, v / INITIAL_POTENTIAL_RATIO]);
            }
        }
        CesKind::Partial => {
            x.extend([season_mean, season_mean / INITIAL_POTENTIAL_RATIO]);
            x.extend(values[..m].iter().rev().map(|v| v - season_mean));
        }
        CesKind::Full => {
            x.extend([season_mean, season_mean / INITIAL_POTENTIAL_RATIO]);
            for &v in values[..m].iter().rev() {
                let s = v - season_mean;
                x.extend([s, s / INITIAL_POTENTIAL_RATIO]);
            }
        }
    }
    DVector::from_vec(x)
}

/// One-step errors and the final state of a filtering pass.
fn filter(space: &StateSpace, init: &DVector<f64>, values: &[f64]) -> (Vec<f64>, DVector<f64>) {
    let mut x = init.clone();
    let mut errors = Vec::with_capacity(values.len());
    for &y in values {
        let e = y - space.measurement.dot(&x);
        errors.push(e);
        x = &space.transition * x + &space.persistence * e;
    }
    (errors, x)
}

fn sse(errors: &[f64]) -> f64 {
    let total: f64 = errors.iter().map(|e| e * e).sum();
    if total.is_finite() {
        total
    } else {
        f64::INFINITY
    }
}

struct CesProblem<'a> {
    params: DVector<f64>,
    kind: CesKind,
    m: usize,
    init: &'a DVector<f64>,
    values: &'a [f64],
}

impl CesProblem<'_> {
    fn errors_at(&self, p: &DVector<f64>) -> Option<Vec<f64>> {
        let space = StateSpace::new(self.kind, p.as_slice(), self.m);
        let (errors, _) = filter(&space, self.init, self.values);
        errors.iter().all(|e| e.is_finite()).then_some(errors)
    }
}

impl LeastSquaresProblem<f64, Dyn, Dyn> for CesProblem<'_> {
    type ParameterStorage = Owned<f64, Dyn>;
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;

    fn set_params(&mut self, p: &DVector<f64>) {
        self.params.copy_from(p);
    }

    fn params(&self) -> DVector<f64> {
        self.params.clone()
    }

    fn residuals(&self) -> Option<OVector<f64, Dyn>> {
        self.errors_at(&self.params).map(OVector::<f64, Dyn>::from_vec)
    }

    fn jacobian(&self) -> Option<OMatrix<f64, Dyn, Dyn>> {
        const STEP: f64 = 1e-6;
        let n = self.values.len();
        let k = self.params.len();
        let mut jac = OMatrix::<f64, Dyn, Dyn>::zeros(n, k);
        for j in 0..k {
            let mut plus = self.params.clone();
            let mut minus = self.params.clone();
            plus[j] += STEP;
            minus[j] -= STEP;
            let ep = self.errors_at(&plus)?;
            let em = self.errors_at(&minus)?;
            for i in 0..n {
                jac[(i, j)] = (ep[i] - em[i]) / (2.0 * STEP);
            }
        }
        Some(jac)
    }
}

/// A fitted CES variant.
#[derive(Debug, Clone)]
pub struct CesFit {
    pub kind: CesKind,
    pub params: Vec<f64>,
    pub sse: f64,
    pub aicc: f64,
    /// Residual standard deviation of the one-step errors.
    pub sigma: f64,
    space: StateSpace,
    state: DVector<f64>,
}

impl CesFit {
    /// Fit one variant with season length `m` (ignored by `CesKind::None`).
    pub fn fit(values: &[f64], m: usize, kind: CesKind) -> Result<Self, ForecastError> {
        let m = if kind == CesKind::None { 1 } else { m };
        let needed = match kind {
            CesKind::None => MIN_DATA_POINTS,
            _ => MIN_DATA_POINTS.max(2 * m),
        };
        if values.len() < needed {
            return Err(ForecastError::InsufficientData {
                model: MODEL,
                needed,
                got: values.len(),
            });
        }
        if kind != CesKind::None && m < 2 {
            return Err(ForecastError::Fit {
                model: MODEL,
                reason: "seasonal CES needs a season length of at least 2".to_string(),
            });
        }

        let init = initial_state(kind, values, m);
        let sse_of = |p: &[f64]| {
            let space = StateSpace::new(kind, p, m);
            if !space.is_stable() {
                return f64::INFINITY;
            }
            sse(&filter(&space, &init, values).0)
        };

        let (best, best_sse) = kind
            .starting_points()
            .into_iter()
            .map(|p| {
                let s = sse_of(&p);
                (p, s)
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .ok_or_else(|| ForecastError::Fit {
                model: MODEL,
                reason: "empty parameter grid".to_string(),
            })?;
        if !best_sse.is_finite() {
            return Err(ForecastError::Fit {
                model: MODEL,
                reason: format!("no stable parameters for CES({})", kind),
            });
        }

        let problem = CesProblem {
            params: DVector::from_vec(best.clone()),
            kind,
            m,
            init: &init,
            values,
        };
        let (result, report) = LevenbergMarquardt::new().minimize(problem);
        let refined: Vec<f64> = result.params.iter().copied().collect();
        let refined_sse = sse_of(&refined);

        let (params, sse) = if report.termination.was_successful() && refined_sse <= best_sse {
            (refined, refined_sse)
        } else {
            debug!(
                kind = %kind,
                termination = ?report.termination,
                "LM refinement rejected, keeping grid parameters"
            );
            (best, best_sse)
        };

        let space = StateSpace::new(kind, &params, m);
        let (_, state) = filter(&space, &init, values);

        let n = values.len() as f64;
        let k = (kind.parameter_count() + 1) as f64;
        let aicc = if n - k - 1.0 > 0.0 {
            n * (sse / n).max(f64::MIN_POSITIVE).ln()
                + 2.0 * k
                + 2.0 * k * (k + 1.0) / (n - k - 1.0)
        } else {
            f64::INFINITY
        };
        let dof = (n - k).max(1.0);
        debug!(kind = %kind, ?params, sse, aicc, "ces fit");

        Ok(Self {
            kind,
            params,
            sse,
            aicc,
            sigma: (sse / dof).sqrt(),
            space,
            state,
        })
    }

    /// Point forecasts and their standard errors `1..=horizon` steps ahead.
    pub fn predict(&self, horizon: usize) -> (Vec<f64>, Vec<f64>) {
        let f = &self.space.transition;
        let w = &self.space.measurement;

        let mut x = self.state.clone();
        // F^{h-1} g, for the h-step error variance.
        let mut impulse = self.space.persistence.clone();
        let mut variance: f64 = 1.0;

        let mut points = Vec::with_capacity(horizon);
        let mut errors = Vec::with_capacity(horizon);
        for _ in 0..horizon {
            points.push(w.dot(&x));
            errors.push(self.sigma * variance.sqrt());
            x = f * x;
            variance += w.dot(&impulse).powi(2);
            impulse = f * impulse;
        }
        (points, errors)
    }
}

/// Fit every CES variant the data allow and keep the one with the lowest
/// AICc. Seasonal variants need `season_length > 1` and two full seasons.
pub fn auto_ces(values: &[f64], season_length: usize) -> Result<CesFit, ForecastError> {
    let mut kinds = vec![CesKind::None];
    if season_length > 1 && values.len() >= 2 * season_length {
        kinds.extend([CesKind::Simple, CesKind::Partial, CesKind::Full]);
    }

    let mut best: Option<CesFit> = None;
    let mut last_error = None;
    for kind in kinds {
        match CesFit::fit(values, season_length, kind) {
            Ok(fit) => {
                if best.as_ref().map_or(true, |b| fit.aicc < b.aicc) {
                    best = Some(fit);
                }
            }
            Err(e) => {
                debug!(kind = %kind, error = %e, "ces variant skipped");
                last_error = Some(e);
            }
        }
    }

    best.ok_or_else(|| {
        last_error.unwrap_or(ForecastError::Fit {
            model: MODEL,
            reason: "no CES variant could be fitted".to_string(),
        })
    })
}

/// AutoCES forecast with normal prediction intervals.
pub fn forecast_auto_ces(
    series: &TimeSeries,
    params: &ForecastParams,
) -> Result<ForecastResult, ForecastError> {
    require_points(MODEL, series, MIN_DATA_POINTS)?;

    let fit = auto_ces(&series.values, params.season_length)?;
    debug!(kind = %fit.kind, aicc = fit.aicc, "auto ces selected");

    let z = z_value(MODEL, params.confidence_level)?;
    let (points, errors) = fit.predict(params.horizon);
    let lower = points.iter().zip(&errors).map(|(p, s)| p - z * s).collect();
    let upper = points.iter().zip(&errors).map(|(p, s)| p + z * s).collect();
    assemble(MODEL, series, points, lower, upper)
}
