use statrs::function::erf::erf_inv;

/// Sample autocorrelation for lags `0..=nlags` (lag 0 is always 1).
///
/// Uses the biased autocovariance (divided by n), so the sequence is a valid
/// autocorrelation function. Returns an empty vector for fewer than 2 points;
/// `nlags` is capped at `n - 1`.
pub fn acf(values: &[f64], nlags: usize) -> Vec<f64> {
    let n = values.len();
    if n < 2 {
        return Vec::new();
    }
    let nlags = nlags.min(n - 1);
    let mean = values.iter().sum::<f64>() / n as f64;
    let c0 = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>();

    if c0 < 1e-12 {
        let mut out = vec![0.0; nlags + 1];
        out[0] = 1.0;
        return out;
    }

    (0..=nlags)
        .map(|lag| {
            values[lag..]
                .iter()
                .zip(&values[..n - lag])
                .map(|(a, b)| (a - mean) * (b - mean))
                .sum::<f64>()
                / c0
        })
        .collect()
}

/// Autocorrelation with each lag-`k` autocovariance divided by `n - k`
/// instead of `n`. Same lag cap and degenerate cases as [`acf`].
fn adjusted_acf(values: &[f64], nlags: usize) -> Vec<f64> {
    let n = values.len();
    acf(values, nlags)
        .into_iter()
        .enumerate()
        .map(|(lag, r)| r * n as f64 / (n - lag) as f64)
        .collect()
}

/// Partial autocorrelation for lags `0..=nlags`: the last Yule-Walker
/// coefficient of each order, solved by the Durbin-Levinson recursion over
/// [`adjusted_acf`].
pub fn pacf(values: &[f64], nlags: usize) -> Vec<f64> {
    let rho = adjusted_acf(values, nlags);
    if rho.is_empty() {
        return Vec::new();
    }
    let nlags = rho.len() - 1;
    let mut out = vec![0.0; nlags + 1];
    out[0] = 1.0;
    if nlags == 0 {
        return out;
    }

    let mut phi = vec![0.0; nlags + 1];
    let mut prev = vec![0.0; nlags + 1];
    phi[1] = rho[1];
    out[1] = rho[1];

    for k in 2..=nlags {
        prev[..k].copy_from_slice(&phi[..k]);

        let num = rho[k] - (1..k).map(|j| prev[j] * rho[k - j]).sum::<f64>();
        let den = 1.0 - (1..k).map(|j| prev[j] * rho[j]).sum::<f64>();
        if den.abs() < 1e-10 {
            break;
        }

        phi[k] = num / den;
        for j in 1..k {
            phi[j] = prev[j] - phi[k] * prev[k - j];
        }
        out[k] = phi[k];
    }

    out
}

/// Half-width of the white-noise band for ACF/PACF values: z / sqrt(n),
/// with z the two-sided normal quantile for `level`.
pub fn confidence_bound(n: usize, level: f64) -> f64 {
    if n == 0 {
        return f64::INFINITY;
    }
    std::f64::consts::SQRT_2 * erf_inv(level) / (n as f64).sqrt()
}
