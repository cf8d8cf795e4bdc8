use augurs_seasons::PeriodogramDetector;
use tracing::debug;

use super::SeasonalityError;

/// A single detected seasonal period with its strength.
#[derive(Debug, Clone, PartialEq)]
pub struct SeasonalityResult {
    /// The detected period length (e.g. 12 for yearly cycles in monthly data).
    pub period: u32,
    /// Strength of the seasonal component, normalized to 0.0 - 1.0.
    pub strength: f64,
}

/// Minimum number of data points required for seasonality detection.
/// Needs enough data to observe at least two full cycles of a potential period.
pub const MIN_SEASONALITY_POINTS: usize = 8;

/// Minimum spectral power (as fraction of max) to consider a period as candidate.
const PERIODOGRAM_POWER_THRESHOLD: f64 = 0.01;

/// Maximum number of periods reported.
const MAX_PERIODS: usize = 20;

/// Minimum autocorrelation strength to report a detected seasonal period.
const MIN_SEASONALITY_STRENGTH: f64 = 0.1;

/// A multiple of a shorter period is dropped unless it is stronger by more
/// than this.
const HARMONIC_TOLERANCE: f64 = 0.1;

/// Strength a period needs before it is used as a model's season length.
pub const SEASON_LENGTH_THRESHOLD: f64 = 0.3;

/// Detect seasonal periods in a series.
///
/// The series is first detrended by an OLS line. Each band of the
/// `augurs-seasons` periodogram holding more than 1% of the peak power is a
/// candidate; its exact period is the lag inside the band with the highest
/// autocorrelation, which also gives its strength (0.0 for none, 1.0 for
/// perfect periodicity). Multiples of a period that are not clearly stronger
/// are dropped. Periods with strength above 0.1 are returned, strongest first.
pub fn detect_seasonality(values: &[f64]) -> Result<Vec<SeasonalityResult>, SeasonalityError> {
    if values.len() < MIN_SEASONALITY_POINTS {
        return Err(SeasonalityError::TooFewPoints {
            needed: MIN_SEASONALITY_POINTS,
            got: values.len(),
        });
    }

    let n = values.len();
    let mean = values.iter().sum::<f64>() / n as f64;
    let total_variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;

    let residuals = detrend(values);
    let variance = residuals.iter().map(|r| r * r).sum::<f64>() / n as f64;
    if variance < 1e-10 * total_variance.max(1.0) {
        return Ok(Vec::new());
    }

    let max_period = (n / 2) as u32;
    let detector = PeriodogramDetector::builder()
        .min_period(2)
        .max_period(max_period)
        .build();

    let periodogram = detector.periodogram(&residuals);

    let max_power = periodogram
        .powers
        .iter()
        .cloned()
        .fold(f64::NEG_INFINITY, f64::max);

    if max_power <= 0.0 || !max_power.is_finite() {
        return Ok(Vec::new());
    }

    // Periods fall as frequency rises, so a band runs from the next period
    // up to the previous one.
    let periods = &periodogram.periods;
    let mut scored: Vec<SeasonalityResult> = Vec::new();
    for (i, (&period, &power)) in periods.iter().zip(&periodogram.powers).enumerate() {
        if power <= max_power * PERIODOGRAM_POWER_THRESHOLD {
            continue;
        }
        let upper = if i == 0 { max_period - 1 } else { periods[i - 1] - 1 };
        let lower = periods.get(i + 1).map_or(2, |p| p + 1).max(2);
        let Some((lag, strength)) = best_lag(&residuals, lower..=upper.min(max_period), variance)
        else {
            continue;
        };
        debug!(band = period, lag, strength, "periodogram candidate");

        if strength <= MIN_SEASONALITY_STRENGTH {
            continue;
        }
        match scored.iter_mut().find(|r| r.period == lag) {
            Some(existing) => existing.strength = existing.strength.max(strength),
            None => scored.push(SeasonalityResult {
                period: lag,
                strength,
            }),
        }
    }

    let mut results: Vec<SeasonalityResult> = scored
        .iter()
        .filter(|r| {
            !scored.iter().any(|s| {
                s.period < r.period
                    && r.period % s.period == 0
                    && s.strength >= r.strength - HARMONIC_TOLERANCE
            })
        })
        .map(|r| SeasonalityResult {
            period: r.period,
            strength: r.strength.clamp(0.0, 1.0),
        })
        .collect();

    results.sort_by(|a, b| b.strength.total_cmp(&a.strength));
    results.truncate(MAX_PERIODS);

    Ok(results)
}

/// The strongest detected period with strength above 0.3, or 1 when the
/// series shows no usable seasonality (or is too short to tell).
pub fn best_season_length(values: &[f64]) -> usize {
    match detect_seasonality(values) {
        Ok(results) => results
            .first()
            .filter(|r| r.strength > SEASON_LENGTH_THRESHOLD)
            .map_or(1, |r| r.period as usize),
        Err(_) => 1,
    }
}

/// Residuals of an OLS line through the series against its index.
fn detrend(values: &[f64]) -> Vec<f64> {
    let n = values.len() as f64;
    let x_mean = (n - 1.0) / 2.0;
    let y_mean = values.iter().sum::<f64>() / n;
    let (sxy, sxx) = values
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(sxy, sxx), (i, y)| {
            let dx = i as f64 - x_mean;
            (sxy + dx * (y - y_mean), sxx + dx * dx)
        });
    let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };
    values
        .iter()
        .enumerate()
        .map(|(i, y)| y - y_mean - slope * (i as f64 - x_mean))
        .collect()
}

/// Lag in `lags` with the highest autocorrelation.
fn best_lag(
    residuals: &[f64],
    lags: std::ops::RangeInclusive<u32>,
    variance: f64,
) -> Option<(u32, f64)> {
    lags.map(|lag| (lag, autocorrelation_at_lag(residuals, lag as usize, variance)))
        .fold(None, |best, (lag, r)| match best {
            Some((_, b)) if b >= r => best,
            _ => Some((lag, r)),
        })
}

/// Autocorrelation of a zero-mean series at a specific lag, in -1.0..=1.0.
fn autocorrelation_at_lag(residuals: &[f64], lag: usize, variance: f64) -> f64 {
    if lag >= residuals.len() || variance < 1e-10 {
        return 0.0;
    }

    let valid_pairs = (residuals.len() - lag) as f64;
    let covariance: f64 = residuals[..residuals.len() - lag]
        .iter()
        .zip(residuals[lag..].iter())
        .map(|(a, b)| a * b)
        .sum::<f64>()
        / valid_pairs;

    covariance / variance
}
