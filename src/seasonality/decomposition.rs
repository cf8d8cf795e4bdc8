use tracing::debug;

use super::params::{DecompositionKind, DecompositionParams};
use super::SeasonalityError;

/// Trend, seasonal and residual components of a series.
///
/// `trend` and `residual` are `None` at the edges where the centred moving
/// average has no full window (`period / 2` points on each side).
#[derive(Debug, Clone, PartialEq)]
pub struct Decomposition {
    pub kind: DecompositionKind,
    pub period: usize,
    pub observed: Vec<f64>,
    pub trend: Vec<Option<f64>>,
    pub seasonal: Vec<f64>,
    pub residual: Vec<Option<f64>>,
}

impl Decomposition {
    /// One seasonal index per position in the cycle.
    pub fn seasonal_indices(&self) -> &[f64] {
        &self.seasonal[..self.period.min(self.seasonal.len())]
    }
}

/// Classical decomposition by moving averages.
///
/// The trend is a centred moving average (a 2 x m average for even periods);
/// the seasonal component is the per-position mean of the detrended series,
/// normalised to sum to zero (additive) or average one (multiplicative).
pub fn decompose(
    values: &[f64],
    params: &DecompositionParams,
) -> Result<Decomposition, SeasonalityError> {
    let period = params.period;
    let n = values.len();
    if n < 2 * period {
        return Err(SeasonalityError::TooFewPoints {
            needed: 2 * period,
            got: n,
        });
    }
    if params.kind == DecompositionKind::Multiplicative && values.iter().any(|v| *v <= 0.0) {
        return Err(SeasonalityError::NonPositive);
    }

    let trend = centred_moving_average(values, period);

    let detrended: Vec<Option<f64>> = values
        .iter()
        .zip(&trend)
        .map(|(y, t)| {
            t.map(|t| match params.kind {
                DecompositionKind::Additive => y - t,
                DecompositionKind::Multiplicative => y / t,
            })
        })
        .collect();

    let mut indices: Vec<f64> = (0..period)
        .map(|pos| {
            let (sum, count) = detrended
                .iter()
                .skip(pos)
                .step_by(period)
                .flatten()
                .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
            if count == 0 {
                0.0
            } else {
                sum / count as f64
            }
        })
        .collect();

    let centre = indices.iter().sum::<f64>() / period as f64;
    match params.kind {
        DecompositionKind::Additive => indices.iter_mut().for_each(|s| *s -= centre),
        DecompositionKind::Multiplicative => indices.iter_mut().for_each(|s| *s /= centre),
    }

    let seasonal: Vec<f64> = (0..n).map(|i| indices[i % period]).collect();

    let residual = values
        .iter()
        .zip(&trend)
        .zip(&seasonal)
        .map(|((y, t), s)| {
            t.map(|t| match params.kind {
                DecompositionKind::Additive => y - t - s,
                DecompositionKind::Multiplicative => y / (t * s),
            })
        })
        .collect();

    debug!(period, kind = %params.kind, "decomposed series");

    Ok(Decomposition {
        kind: params.kind,
        period,
        observed: values.to_vec(),
        trend,
        seasonal,
        residual,
    })
}

/// Centred moving average of width `period`; even widths use half weights
/// on the two outermost points.
pub fn centred_moving_average(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let n = values.len();
    let half = period / 2;
    let weights: Vec<f64> = if period % 2 == 0 {
        (0..=period)
            .map(|i| (if i == 0 || i == period { 0.5 } else { 1.0 }) / period as f64)
            .collect()
    } else {
        vec![1.0 / period as f64; period]
    };

    (0..n)
        .map(|i| {
            if i < half || i + weights.len() - half > n {
                return None;
            }
            let start = i - half;
            Some(
                values[start..start + weights.len()]
                    .iter()
                    .zip(&weights)
                    .map(|(v, w)| v * w)
                    .sum(),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seasonal_series(n: usize, multiplicative: bool) -> Vec<f64> {
        let pattern = [1.0, -2.0, 3.0, -2.0];
        (0..n)
            .map(|i| {
                let trend = 100.0 + 2.0 * i as f64;
                if multiplicative {
                    trend * (1.0 + pattern[i % 4] / 10.0)
                } else {
                    trend + pattern[i % 4]
                }
            })
            .collect()
    }

    #[test]
    fn test_moving_average_edges() {
        let values: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let ma = centred_moving_average(&values, 4);
        assert_eq!(ma[0], None);
        assert_eq!(ma[1], None);
        assert!((ma[2].unwrap() - 2.0).abs() < 1e-12);
        assert!((ma[7].unwrap() - 7.0).abs() < 1e-12);
        assert_eq!(ma[8], None);
        assert_eq!(ma[9], None);

        let odd = centred_moving_average(&values, 3);
        assert_eq!(odd[0], None);
        assert!((odd[1].unwrap() - 1.0).abs() < 1e-12);
        assert!((odd[8].unwrap() - 8.0).abs() < 1e-12);
        assert_eq!(odd[9], None);
    }

    #[test]
    fn test_additive_recovers_pattern() {
        let values = seasonal_series(40, false);
        let params = DecompositionParams::new(4, DecompositionKind::Additive).unwrap();
        let d = decompose(&values, &params).unwrap();

        let expected = [1.0, -2.0, 3.0, -2.0];
        for (s, e) in d.seasonal_indices().iter().zip(expected) {
            assert!((s - e).abs() < 1e-9, "seasonal {} vs {}", s, e);
        }
        assert!(d.seasonal_indices().iter().sum::<f64>().abs() < 1e-9);
        for r in d.residual.iter().flatten() {
            assert!(r.abs() < 1e-9, "residual should vanish, got {}", r);
        }
    }

    #[test]
    fn test_multiplicative_indices_average_one() {
        let values = seasonal_series(48, true);
        let params = DecompositionParams::new(4, DecompositionKind::Multiplicative).unwrap();
        let d = decompose(&values, &params).unwrap();
        let mean = d.seasonal_indices().iter().sum::<f64>() / 4.0;
        assert!((mean - 1.0).abs() < 1e-9);
        assert!(d.seasonal_indices()[2] > 1.0);
        assert!(d.seasonal_indices()[1] < 1.0);
    }

    #[test]
    fn test_too_short() {
        let params = DecompositionParams::default();
        let err = decompose(&[1.0; 20], &params).unwrap_err();
        assert_eq!(
            err,
            SeasonalityError::TooFewPoints {
                needed: 24,
                got: 20
            }
        );
    }

    #[test]
    fn test_multiplicative_rejects_zero() {
        let mut values = seasonal_series(16, false);
        values[3] = 0.0;
        let params = DecompositionParams::new(4, DecompositionKind::Multiplicative).unwrap();
        assert_eq!(decompose(&values, &params).unwrap_err(), SeasonalityError::NonPositive);
    }
}
