//! Forecast accuracy metrics.
//!
//! The calculator compares a forecast against the actual observations for the
//! same periods and produces a fixed bundle of six error and bias statistics.

pub mod display;

use std::fmt;

use thiserror::Error;

/// Errors raised by the metric calculator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MetricsError {
    #[error("actual and predicted series differ in length ({actual} vs {predicted})")]
    LengthMismatch { actual: usize, predicted: usize },

    #[error("cannot compute metrics over empty series")]
    EmptyInput,

    #[error("{metric} is undefined: division by zero")]
    DivisionByZero { metric: Metric },
}

/// One of the six fields of a [`MetricBundle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    Mse,
    Mae,
    Mape,
    Rmse,
    Bias,
    BiasRate,
}

impl Metric {
    /// All metrics, in display order.
    pub const ALL: [Metric; 6] = [
        Metric::Mse,
        Metric::Mae,
        Metric::Mape,
        Metric::Rmse,
        Metric::Bias,
        Metric::BiasRate,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Metric::Mse => "MSE",
            Metric::Mae => "MAE",
            Metric::Mape => "MAPE",
            Metric::Rmse => "RMSE",
            Metric::Bias => "Bias",
            Metric::BiasRate => "Bias Rate",
        }
    }

    /// Whether the metric is expressed as a percentage.
    pub fn is_percentage(self) -> bool {
        matches!(self, Metric::Mape | Metric::BiasRate)
    }

    /// Signed metrics are best when closest to zero, not when smallest.
    pub fn is_signed(self) -> bool {
        matches!(self, Metric::Bias | Metric::BiasRate)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Accuracy statistics for one forecast against the matching actual values.
///
/// `mape` and `bias_rate` are `None` when undefined: `mape` when any actual
/// value is zero, `bias_rate` when the mean of the actual values is zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricBundle {
    /// Mean squared error.
    pub mse: f64,
    /// Mean absolute error.
    pub mae: f64,
    /// Mean absolute percentage error, in percent.
    pub mape: Option<f64>,
    /// Root mean squared error.
    pub rmse: f64,
    /// Mean signed error (predicted - actual). Positive means over-forecasting.
    pub bias: f64,
    /// Bias relative to the mean actual value, in percent.
    pub bias_rate: Option<f64>,
}

impl MetricBundle {
    /// Compute all six metrics for `predicted` against `actual`.
    ///
    /// Both slices must be non-empty, of equal length and index-aligned.
    /// Division by zero leaves the affected field `None` instead of failing
    /// the whole bundle; use [`MetricBundle::compute_strict`] to fail instead.
    pub fn compute(actual: &[f64], predicted: &[f64]) -> Result<Self, MetricsError> {
        validate(actual, predicted)?;

        let n = actual.len() as f64;
        let mut sq_sum = 0.0;
        let mut abs_sum = 0.0;
        let mut signed_sum = 0.0;
        let mut pct_sum = 0.0;
        let mut has_zero_actual = false;

        for (&a, &p) in actual.iter().zip(predicted) {
            let err = a - p;
            sq_sum += err * err;
            abs_sum += err.abs();
            signed_sum += p - a;
            if a == 0.0 {
                has_zero_actual = true;
            } else {
                pct_sum += (err / a).abs();
            }
        }

        let mse = sq_sum / n;
        let bias = signed_sum / n;
        let actual_mean = actual.iter().sum::<f64>() / n;

        let mape = (!has_zero_actual).then(|| pct_sum / n * 100.0);
        let bias_rate = (actual_mean != 0.0).then(|| bias / actual_mean * 100.0);

        Ok(Self {
            mse,
            mae: abs_sum / n,
            mape,
            rmse: mse.sqrt(),
            bias,
            bias_rate,
        })
    }

    /// Like [`MetricBundle::compute`], but an undefined `mape` or `bias_rate`
    /// is reported as [`MetricsError::DivisionByZero`].
    pub fn compute_strict(actual: &[f64], predicted: &[f64]) -> Result<Self, MetricsError> {
        let bundle = Self::compute(actual, predicted)?;
        match bundle.undefined().first() {
            Some(&metric) => Err(MetricsError::DivisionByZero { metric }),
            None => Ok(bundle),
        }
    }

    /// Value of a single metric, `None` if undefined.
    pub fn get(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::Mse => Some(self.mse),
            Metric::Mae => Some(self.mae),
            Metric::Mape => self.mape,
            Metric::Rmse => Some(self.rmse),
            Metric::Bias => Some(self.bias),
            Metric::BiasRate => self.bias_rate,
        }
    }

    /// Metrics that could not be computed.
    pub fn undefined(&self) -> Vec<Metric> {
        Metric::ALL
            .into_iter()
            .filter(|&m| self.get(m).is_none())
            .collect()
    }
}

fn validate(actual: &[f64], predicted: &[f64]) -> Result<(), MetricsError> {
    if actual.len() != predicted.len() {
        return Err(MetricsError::LengthMismatch {
            actual: actual.len(),
            predicted: predicted.len(),
        });
    }
    if actual.is_empty() {
        return Err(MetricsError::EmptyInput);
    }
    Ok(())
}
