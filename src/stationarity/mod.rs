//! Unit-root testing and autocorrelation diagnostics.

pub mod autocorrelation;

use nalgebra::{DMatrix, DVector};
use statrs::function::erf::erfc;
use thiserror::Error;
use tracing::debug;

/// Minimum number of observations for the ADF test.
pub const MIN_ADF_POINTS: usize = 8;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StationarityError {
    #[error("need at least {needed} data points, got {got}")]
    TooFewPoints { needed: usize, got: usize },

    #[error("max_lag must be at most {limit} for this sample, got {max_lag}")]
    MaxLagTooLarge { max_lag: usize, limit: usize },

    #[error("series is constant")]
    Constant,

    #[error("ADF regression is singular")]
    Singular,
}

/// Options for [`adf_test`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdfOptions {
    /// Largest lag of the differenced series to include. `None` uses
    /// ceil(12 * (n / 100)^(1/4)), capped by the sample size.
    pub max_lag: Option<usize>,
    /// Select the lag in `0..=max_lag` by AIC; otherwise use `max_lag`.
    pub autolag: bool,
}

impl Default for AdfOptions {
    fn default() -> Self {
        Self {
            max_lag: None,
            autolag: true,
        }
    }
}

/// Finite-sample critical values of the test statistic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CriticalValues {
    pub one: f64,
    pub five: f64,
    pub ten: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdfResult {
    pub statistic: f64,
    pub p_value: f64,
    pub used_lag: usize,
    /// Observations in the final regression.
    pub nobs: usize,
    pub critical_values: CriticalValues,
    /// AIC of the selected lag, when the lag was chosen automatically.
    pub ic_best: Option<f64>,
}

impl AdfResult {
    /// Whether the unit-root null is rejected at `significance`.
    pub fn is_stationary(&self, significance: f64) -> bool {
        self.p_value < significance
    }
}

/// Augmented Dickey-Fuller test with a constant.
///
/// Regresses dy_t on (1, y_{t-1}, dy_{t-1}, ..., dy_{t-p}) and reports the
/// t-statistic of the y_{t-1} coefficient. With `autolag`, every p up to the
/// maximum is fitted on the same sample and the lowest AIC wins (ties go to
/// the smaller lag); the winner is then refitted on all available rows.
pub fn adf_test(values: &[f64], options: &AdfOptions) -> Result<AdfResult, StationarityError> {
    let n = values.len();
    if n < MIN_ADF_POINTS {
        return Err(StationarityError::TooFewPoints {
            needed: MIN_ADF_POINTS,
            got: n,
        });
    }
    if values.iter().all(|v| (v - values[0]).abs() < 1e-12) {
        return Err(StationarityError::Constant);
    }

    let limit = n / 2 - 2;
    let max_lag = match options.max_lag {
        Some(l) if l > limit => {
            return Err(StationarityError::MaxLagTooLarge { max_lag: l, limit })
        }
        Some(l) => l,
        None => ((12.0 * (n as f64 / 100.0).powf(0.25)).ceil() as usize).min(limit),
    };

    let diff: Vec<f64> = values.windows(2).map(|w| w[1] - w[0]).collect();

    let (used_lag, ic_best) = if options.autolag {
        let mut best: Option<(usize, f64)> = None;
        for lag in 0..=max_lag {
            let aic = adf_regression(values, &diff, max_lag, lag)?.aic();
            debug!(lag, aic, "ADF lag candidate");
            if best.map_or(true, |(_, b)| aic < b) {
                best = Some((lag, aic));
            }
        }
        match best {
            Some((lag, aic)) => (lag, Some(aic)),
            None => (max_lag, None),
        }
    } else {
        (max_lag, None)
    };

    let fit = adf_regression(values, &diff, used_lag, used_lag)?;
    let statistic = fit.t_stat(1);
    let nobs = fit.nobs;

    debug!(statistic, used_lag, nobs, "ADF test");

    Ok(AdfResult {
        statistic,
        p_value: mackinnon_p_value(statistic),
        used_lag,
        nobs,
        critical_values: critical_values(nobs),
        ic_best,
    })
}

/// Least-squares fit keeping what the test needs.
struct OlsFit {
    beta: DVector<f64>,
    xtx_inv: DMatrix<f64>,
    ssr: f64,
    nobs: usize,
}

impl OlsFit {
    fn k(&self) -> usize {
        self.beta.len()
    }

    fn t_stat(&self, i: usize) -> f64 {
        let sigma2 = self.ssr / (self.nobs - self.k()) as f64;
        self.beta[i] / (sigma2 * self.xtx_inv[(i, i)]).sqrt()
    }

    /// Gaussian log-likelihood AIC.
    fn aic(&self) -> f64 {
        let n = self.nobs as f64;
        let llf = -n / 2.0 * ((2.0 * std::f64::consts::PI).ln() + (self.ssr / n).ln() + 1.0);
        -2.0 * llf + 2.0 * self.k() as f64
    }
}

/// ADF regression over the rows `start..diff.len()` with `lag` lagged
/// differences. `start >= lag` keeps every candidate on a common sample.
fn adf_regression(
    values: &[f64],
    diff: &[f64],
    start: usize,
    lag: usize,
) -> Result<OlsFit, StationarityError> {
    let nobs = diff.len() - start;
    let k = 2 + lag;
    if nobs <= k {
        return Err(StationarityError::TooFewPoints {
            needed: start + k + 2,
            got: values.len(),
        });
    }

    let x = DMatrix::from_fn(nobs, k, |r, c| {
        let t = start + r;
        match c {
            0 => 1.0,
            1 => values[t],
            j => diff[t - (j - 1)],
        }
    });
    let y = DVector::from_iterator(nobs, diff[start..].iter().copied());

    let xt = x.transpose();
    let xtx_inv = (&xt * &x).try_inverse().ok_or(StationarityError::Singular)?;
    let beta = &xtx_inv * (&xt * &y);
    let resid = &y - &x * &beta;
    let ssr = resid.dot(&resid);
    if !(ssr > 0.0) {
        return Err(StationarityError::Singular);
    }

    Ok(OlsFit {
        beta,
        xtx_inv,
        ssr,
        nobs,
    })
}

fn normal_cdf(x: f64) -> f64 {
    0.5 * erfc(-x / std::f64::consts::SQRT_2)
}

/// MacKinnon (1994) approximate asymptotic p-value for the constant-only
/// single-series case.
pub fn mackinnon_p_value(statistic: f64) -> f64 {
    const TAU_MAX: f64 = 2.74;
    const TAU_MIN: f64 = -18.83;
    const TAU_STAR: f64 = -1.61;
    const SMALL_P: [f64; 3] = [2.1659, 1.4412, 0.038269];
    const LARGE_P: [f64; 4] = [1.7339, 0.93202, -0.12745, -0.010368];

    if statistic > TAU_MAX {
        return 1.0;
    }
    if statistic < TAU_MIN {
        return 0.0;
    }
    let coefs: &[f64] = if statistic <= TAU_STAR {
        &SMALL_P
    } else {
        &LARGE_P
    };
    let poly = coefs
        .iter()
        .rev()
        .fold(0.0, |acc, c| acc * statistic + c);
    normal_cdf(poly)
}

/// MacKinnon (2010) response-surface critical values for `nobs` observations.
pub fn critical_values(nobs: usize) -> CriticalValues {
    const ONE: [f64; 4] = [-3.43035, -6.5393, -16.786, -79.433];
    const FIVE: [f64; 4] = [-2.86154, -2.8903, -4.234, -40.040];
    const TEN: [f64; 4] = [-2.56677, -1.5384, -2.809, 0.0];

    let inv = 1.0 / nobs as f64;
    let surface = |b: &[f64; 4]| b[0] + b[1] * inv + b[2] * inv.powi(2) + b[3] * inv.powi(3);
    CriticalValues {
        one: surface(&ONE),
        five: surface(&FIVE),
        ten: surface(&TEN),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::test_noise;

    #[test]
    fn test_white_noise_is_stationary() {
        let values = test_noise(200, 11);
        let res = adf_test(&values, &AdfOptions::default()).unwrap();
        assert!(res.statistic < res.critical_values.one, "stat {}", res.statistic);
        assert!(res.is_stationary(0.05), "p = {}", res.p_value);
        assert!(res.ic_best.is_some());
    }

    #[test]
    fn test_explosive_growth_is_not_stationary() {
        let noise = test_noise(120, 5);
        let values: Vec<f64> = noise
            .iter()
            .enumerate()
            .map(|(i, e)| 100.0 * 1.03_f64.powi(i as i32) + e)
            .collect();
        let res = adf_test(&values, &AdfOptions::default()).unwrap();
        assert!(!res.is_stationary(0.05), "p = {}", res.p_value);
    }

    #[test]
    fn test_fixed_lag_is_used() {
        let values = test_noise(100, 2);
        let opts = AdfOptions {
            max_lag: Some(3),
            autolag: false,
        };
        let res = adf_test(&values, &opts).unwrap();
        assert_eq!(res.used_lag, 3);
        assert_eq!(res.nobs, 99 - 3);
        assert!(res.ic_best.is_none());
    }

    #[test]
    fn test_default_max_lag_bounds_autolag() {
        let values = test_noise(100, 4);
        let res = adf_test(&values, &AdfOptions::default()).unwrap();
        assert!(res.used_lag <= 12, "used lag {}", res.used_lag);
        assert_eq!(res.nobs, 99 - res.used_lag);
    }

    #[test]
    fn test_max_lag_too_large() {
        let values = test_noise(20, 1);
        let opts = AdfOptions {
            max_lag: Some(9),
            autolag: true,
        };
        assert_eq!(
            adf_test(&values, &opts).unwrap_err(),
            StationarityError::MaxLagTooLarge {
                max_lag: 9,
                limit: 8
            }
        );
    }

    #[test]
    fn test_short_and_constant_input() {
        assert!(matches!(
            adf_test(&[1.0, 2.0, 3.0], &AdfOptions::default()),
            Err(StationarityError::TooFewPoints { .. })
        ));
        assert_eq!(
            adf_test(&[3.0; 30], &AdfOptions::default()).unwrap_err(),
            StationarityError::Constant
        );
    }

    #[test]
    fn test_mackinnon_p_value() {
        assert!((mackinnon_p_value(-3.0) - 0.0349).abs() < 1e-3);
        assert_eq!(mackinnon_p_value(3.0), 1.0);
        assert_eq!(mackinnon_p_value(-20.0), 0.0);
        assert!(mackinnon_p_value(-1.0) > mackinnon_p_value(-2.0));
    }

    #[test]
    fn test_critical_values_at_100() {
        let cv = critical_values(100);
        assert!((cv.one + 3.4977).abs() < 1e-3, "1% {}", cv.one);
        assert!((cv.five + 2.8909).abs() < 1e-3, "5% {}", cv.five);
        assert!((cv.ten + 2.5824).abs() < 1e-3, "10% {}", cv.ten);
    }
}
