//! Automatic ARIMA(p, d, 0)(0, D, 0)m.
//!
//! The seasonal difference order D (0 or 1) comes from the lag-m
//! autocorrelation test, the regular order d (up to 2) from repeated ADF
//! tests, and the AR order p from AIC over least-squares fits on a common
//! sample. Forecasts run on the observed scale by expanding
//! phi(B) (1 - B)^d (1 - B^m)^D into a single AR polynomial.

use nalgebra::{DMatrix, DVector};
use tracing::debug;

use super::models::{assemble, require_points, seasonality_test, z_value};
use super::params::ForecastParams;
use super::ForecastError;
use crate::common::types::{ForecastResult, TimeSeries, MIN_DATA_POINTS};
use crate::stationarity::{adf_test, AdfOptions};

const MODEL: &str = "AutoARIMA";

/// Largest AR order considered.
const MAX_AR: usize = 5;

/// Largest regular differencing order.
const MAX_D: usize = 2;

const ADF_SIGNIFICANCE: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArimaOrder {
    pub p: usize,
    pub d: usize,
    pub seasonal_d: usize,
    pub season_length: usize,
}

impl std::fmt::Display for ArimaOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ARIMA({},{},0)", self.p, self.d)?;
        if self.seasonal_d > 0 {
            write!(f, "(0,{},0)[{}]", self.seasonal_d, self.season_length)?;
        }
        Ok(())
    }
}

/// A fitted model on the differenced scale.
#[derive(Debug, Clone)]
pub struct ArimaFit {
    pub order: ArimaOrder,
    pub intercept: f64,
    pub ar: Vec<f64>,
    /// Innovation variance.
    pub sigma2: f64,
    pub aic: f64,
}

/// `(1 - B^lag)` applied once.
fn difference(values: &[f64], lag: usize) -> Vec<f64> {
    values
        .iter()
        .skip(lag)
        .zip(values)
        .map(|(a, b)| a - b)
        .collect()
}

fn apply_differences(values: &[f64], order: &ArimaOrder) -> Vec<f64> {
    let mut w = values.to_vec();
    for _ in 0..order.seasonal_d {
        w = difference(&w, order.season_length);
    }
    for _ in 0..order.d {
        w = difference(&w, 1);
    }
    w
}

/// Product of two polynomials in B, lowest power first.
fn poly_mul(a: &[f64], b: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; a.len() + b.len() - 1];
    for (i, x) in a.iter().enumerate() {
        for (j, y) in b.iter().enumerate() {
            out[i + j] += x * y;
        }
    }
    out
}

/// OLS of `y` on `x`; returns (coefficients, residual sum of squares).
fn least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<(DVector<f64>, f64)> {
    if x.ncols() == 0 {
        return Some((DVector::zeros(0), y.dot(y)));
    }
    let xt = x.transpose();
    let beta = (&xt * x).try_inverse()? * (&xt * y);
    let resid = y - x * &beta;
    Some((beta, resid.dot(&resid)))
}

/// Fit AR(p) (with intercept when `with_mean`) to `w`, using rows `start..`.
fn fit_ar(
    w: &[f64],
    p: usize,
    start: usize,
    with_mean: bool,
) -> Option<(f64, Vec<f64>, f64, usize)> {
    let nobs = w.len().checked_sub(start)?;
    let offset = usize::from(with_mean);
    let k = p + offset;
    if nobs <= k + 1 {
        return None;
    }

    let x = DMatrix::from_fn(nobs, k, |r, c| {
        let t = start + r;
        if with_mean && c == 0 {
            1.0
        } else {
            w[t - (c + 1 - offset)]
        }
    });
    let y = DVector::from_iterator(nobs, w[start..].iter().copied());
    let (beta, ssr) = least_squares(&x, &y)?;

    let intercept = if with_mean { beta[0] } else { 0.0 };
    let ar = beta.iter().skip(offset).copied().collect();
    Some((intercept, ar, ssr, nobs))
}

fn aic(ssr: f64, nobs: usize, k: usize) -> f64 {
    let n = nobs as f64;
    n * (ssr / n).max(f64::MIN_POSITIVE).ln() + 2.0 * (k + 1) as f64
}

/// Regular differencing order: difference while the ADF test cannot reject
/// a unit root.
fn select_d(values: &[f64]) -> usize {
    let mut w = values.to_vec();
    for d in 0..MAX_D {
        match adf_test(&w, &AdfOptions::default()) {
            Ok(res) if !res.is_stationary(ADF_SIGNIFICANCE) => {
                debug!(d, p_value = res.p_value, "unit root not rejected");
                w = difference(&w, 1);
            }
            _ => return d,
        }
    }
    MAX_D
}

/// Choose orders and fit.
pub fn fit_auto_arima(values: &[f64], season_length: usize) -> Result<ArimaFit, ForecastError> {
    let m = season_length;
    let seasonal_d = usize::from(
        m > 1 && values.len() >= 2 * m + MIN_DATA_POINTS && seasonality_test(values, m),
    );

    let mut order = ArimaOrder {
        p: 0,
        d: 0,
        seasonal_d,
        season_length: m,
    };
    order.d = select_d(&apply_differences(values, &order));
    let w = apply_differences(values, &order);
    if w.len() < MIN_DATA_POINTS {
        return Err(ForecastError::InsufficientData {
            model: MODEL,
            needed: values.len() + MIN_DATA_POINTS - w.len(),
            got: values.len(),
        });
    }

    // A constant on the differenced scale is a drift; beyond one difference
    // it would be a polynomial trend.
    let with_mean = order.d + order.seasonal_d <= 1;
    let max_p = MAX_AR.min(w.len() / 4);

    let mut best: Option<(usize, f64)> = None;
    for p in 0..=max_p {
        if let Some((_, _, ssr, nobs)) = fit_ar(&w, p, max_p, with_mean) {
            let score = aic(ssr, nobs, p + usize::from(with_mean));
            debug!(p, aic = score, "AR order candidate");
            if best.map_or(true, |(_, b)| score < b) {
                best = Some((p, score));
            }
        }
    }
    order.p = best.map_or(0, |(p, _)| p);

    let (intercept, ar, ssr, nobs) =
        fit_ar(&w, order.p, order.p, with_mean).ok_or_else(|| ForecastError::Fit {
            model: MODEL,
            reason: format!("least squares failed for {}", order),
        })?;
    let k = order.p + usize::from(with_mean);
    let sigma2 = ssr / (nobs - k) as f64;

    debug!(%order, intercept, sigma2, "arima fit");

    Ok(ArimaFit {
        order,
        intercept,
        ar,
        sigma2,
        aic: aic(ssr, nobs, k),
    })
}

impl ArimaFit {
    /// Coefficients a_k of y_t = c + sum_k a_k y_{t-k} + e_t on the observed scale.
    pub fn level_coefficients(&self) -> Vec<f64> {
        let mut poly: Vec<f64> = std::iter::once(1.0)
            .chain(self.ar.iter().map(|phi| -phi))
            .collect();
        for _ in 0..self.order.d {
            poly = poly_mul(&poly, &[1.0, -1.0]);
        }
        for _ in 0..self.order.seasonal_d {
            let mut seasonal = vec![0.0; self.order.season_length + 1];
            seasonal[0] = 1.0;
            seasonal[self.order.season_length] = -1.0;
            poly = poly_mul(&poly, &seasonal);
        }
        poly.iter().skip(1).map(|c| -c).collect()
    }

    /// MA(infinity) weights psi_0..psi_{h-1} of the level process.
    pub fn psi_weights(&self, h: usize) -> Vec<f64> {
        let a = self.level_coefficients();
        let mut psi = Vec::with_capacity(h);
        for j in 0..h {
            let value = if j == 0 {
                1.0
            } else {
                (1..=j.min(a.len())).map(|k| a[k - 1] * psi[j - k]).sum()
            };
            psi.push(value);
        }
        psi
    }

    /// Point forecasts and their standard deviations.
    pub fn predict(&self, history: &[f64], horizon: usize) -> (Vec<f64>, Vec<f64>) {
        let a = self.level_coefficients();
        let mut extended = history.to_vec();
        for _ in 0..horizon {
            let t = extended.len();
            let next = self.intercept
                + a.iter()
                    .enumerate()
                    .map(|(k, coef)| coef * extended[t - k - 1])
                    .sum::<f64>();
            extended.push(next);
        }

        let psi = self.psi_weights(horizon);
        let mut cumulative = 0.0;
        let sds = psi
            .iter()
            .map(|w| {
                cumulative += w * w;
                (self.sigma2 * cumulative).sqrt()
            })
            .collect();

        (extended[history.len()..].to_vec(), sds)
    }
}

/// AutoARIMA forecast with normal prediction intervals.
pub fn forecast_auto_arima(
    series: &TimeSeries,
    params: &ForecastParams,
) -> Result<ForecastResult, ForecastError> {
    require_points(MODEL, series, MIN_DATA_POINTS + 2)?;

    let fit = fit_auto_arima(&series.values, params.season_length)?;
    let z = z_value(MODEL, params.confidence_level)?;
    let (forecasts, sds) = fit.predict(&series.values, params.horizon);

    let lower = forecasts.iter().zip(&sds).map(|(f, s)| f - z * s).collect();
    let upper = forecasts.iter().zip(&sds).map(|(f, s)| f + z * s).collect();

    assemble(MODEL, series, forecasts, lower, upper)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::test_noise;

    fn ar1(phi: f64, n: usize) -> Vec<f64> {
        let mut prev = 0.0;
        test_noise(n, 17)
            .into_iter()
            .map(|e| {
                prev = phi * prev + e;
                50.0 + prev
            })
            .collect()
    }

    #[test]
    fn test_poly_mul() {
        // (1 - B)(1 - B) = 1 - 2B + B^2
        assert_eq!(poly_mul(&[1.0, -1.0], &[1.0, -1.0]), vec![1.0, -2.0, 1.0]);
    }

    #[test]
    fn test_level_coefficients_random_walk() {
        let fit = ArimaFit {
            order: ArimaOrder {
                p: 0,
                d: 1,
                seasonal_d: 0,
                season_length: 1,
            },
            intercept: 0.0,
            ar: vec![],
            sigma2: 1.0,
            aic: 0.0,
        };
        assert_eq!(fit.level_coefficients(), vec![1.0]);
        assert_eq!(fit.psi_weights(4), vec![1.0; 4]);
        let (point, sd) = fit.predict(&[3.0, 5.0], 3);
        assert_eq!(point, vec![5.0; 3]);
        assert!((sd[2] - 3.0_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_seasonal_difference_expansion() {
        let fit = ArimaFit {
            order: ArimaOrder {
                p: 1,
                d: 0,
                seasonal_d: 1,
                season_length: 4,
            },
            intercept: 0.0,
            ar: vec![0.5],
            sigma2: 1.0,
            aic: 0.0,
        };
        // (1 - 0.5B)(1 - B^4) = 1 - 0.5B - B^4 + 0.5B^5
        assert_eq!(fit.level_coefficients(), vec![0.5, 0.0, 0.0, 1.0, -0.5]);
    }

    #[test]
    fn test_stationary_ar1_selects_no_differencing() {
        let values = ar1(0.7, 300);
        let fit = fit_auto_arima(&values, 1).unwrap();
        assert_eq!(fit.order.d, 0);
        assert_eq!(fit.order.seasonal_d, 0);
        assert!(fit.order.p >= 1, "order {}", fit.order);
        assert!((fit.ar[0] - 0.7).abs() < 0.15, "phi {}", fit.ar[0]);
    }

    #[test]
    fn test_seasonal_trend_forecast() {
        let offsets = [-30.0, -20.0, 10.0, 0.0, 20.0, 10.0, 0.0, 25.0, -10.0, 0.0, -10.0, 5.0];
        let noise = test_noise(96, 19);
        let values: Vec<f64> = (0..96)
            .map(|i| 300.0 + 1.5 * i as f64 + offsets[i % 12] + noise[i])
            .collect();

        let fit = fit_auto_arima(&values, 12).unwrap();
        assert_eq!(fit.order.seasonal_d, 1, "order {}", fit.order);

        let (point, sd) = fit.predict(&values, 12);
        for h in 0..12 {
            let truth = 300.0 + 1.5 * (96 + h) as f64 + offsets[(96 + h) % 12];
            assert!(
                (point[h] - truth).abs() < 5.0,
                "step {}: {:.2} vs {:.2}",
                h,
                point[h],
                truth
            );
        }
        assert!(sd.windows(2).all(|w| w[1] >= w[0]));
    }

    #[test]
    fn test_order_display() {
        let order = ArimaOrder {
            p: 2,
            d: 1,
            seasonal_d: 1,
            season_length: 12,
        };
        assert_eq!(order.to_string(), "ARIMA(2,1,0)(0,1,0)[12]");
    }
}
