pub mod decomposition;
pub mod detection;
pub mod params;

use thiserror::Error;
use tracing::info;

use crate::common::types::TimeSeries;
use decomposition::{decompose, Decomposition};
use detection::{detect_seasonality, SeasonalityResult};
use params::DecompositionParams;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SeasonalityError {
    #[error("need at least {needed} data points, got {got}")]
    TooFewPoints { needed: usize, got: usize },

    #[error("multiplicative decomposition requires strictly positive values")]
    NonPositive,
}

/// Detected periods and the decomposition at the requested period.
#[derive(Debug, Clone, PartialEq)]
pub struct SeasonalityReport {
    pub periods: Vec<SeasonalityResult>,
    pub decomposition: Decomposition,
}

impl SeasonalityReport {
    /// Strongest detected period, if any.
    pub fn dominant_period(&self) -> Option<&SeasonalityResult> {
        self.periods.first()
    }
}

/// Run period detection and a classical decomposition over one series.
///
/// A series too short for period detection still gets its decomposition;
/// `periods` is then empty.
pub fn analyze(
    series: &TimeSeries,
    params: &DecompositionParams,
) -> Result<SeasonalityReport, SeasonalityError> {
    let decomposition = decompose(&series.values, params)?;

    let periods = match detect_seasonality(&series.values) {
        Ok(p) => p,
        Err(SeasonalityError::TooFewPoints { .. }) => Vec::new(),
        Err(e) => return Err(e),
    };

    if let Some(top) = periods.first() {
        info!(period = top.period, strength = top.strength, "dominant seasonal period");
    }

    Ok(SeasonalityReport {
        periods,
        decomposition,
    })
}
