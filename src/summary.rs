//! Descriptive statistics of an observed series: the numbers behind a box plot
//! and a histogram.

use statrs::statistics::Statistics;

/// Five-number summary plus moments of a sample.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesSummary {
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation (n - 1 denominator).
    pub std_dev: f64,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

/// Box-plot geometry: whiskers at the most extreme points within 1.5 IQR.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxPlot {
    pub lower_whisker: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub upper_whisker: f64,
    pub outliers: Vec<f64>,
}

/// One equal-width histogram bin, `[start, end)` (the last bin is closed).
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramBin {
    pub start: f64,
    pub end: f64,
    pub count: usize,
}

impl SeriesSummary {
    /// Summarise `values`. Returns None for an empty sample.
    pub fn new(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let std_dev = if values.len() > 1 {
            values.std_dev()
        } else {
            0.0
        };

        Some(Self {
            count: values.len(),
            mean: values.mean(),
            std_dev,
            min: sorted[0],
            q1: quantile_sorted(&sorted, 0.25),
            median: quantile_sorted(&sorted, 0.5),
            q3: quantile_sorted(&sorted, 0.75),
            max: sorted[sorted.len() - 1],
        })
    }

    pub fn iqr(&self) -> f64 {
        self.q3 - self.q1
    }

    /// Box-plot whiskers and outliers for the same sample.
    pub fn box_plot(&self, values: &[f64]) -> BoxPlot {
        let lo_fence = self.q1 - 1.5 * self.iqr();
        let hi_fence = self.q3 + 1.5 * self.iqr();

        let inside = values.iter().copied().filter(|v| *v >= lo_fence && *v <= hi_fence);
        let lower_whisker = inside.clone().fold(f64::INFINITY, f64::min);
        let upper_whisker = inside.fold(f64::NEG_INFINITY, f64::max);

        let mut outliers: Vec<f64> = values
            .iter()
            .copied()
            .filter(|v| *v < lo_fence || *v > hi_fence)
            .collect();
        outliers.sort_by(|a, b| a.total_cmp(b));

        BoxPlot {
            lower_whisker,
            q1: self.q1,
            median: self.median,
            q3: self.q3,
            upper_whisker,
            outliers,
        }
    }
}

/// Quantile with linear interpolation between order statistics.
/// `sorted` must be non-empty and ascending.
fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Equal-width histogram of `values` with `bins` bins.
pub fn histogram(values: &[f64], bins: usize) -> Vec<HistogramBin> {
    if values.is_empty() || bins == 0 {
        return Vec::new();
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    // Constant data: a single bin holding everything.
    if (max - min).abs() < f64::EPSILON {
        return vec![HistogramBin {
            start: min,
            end: max,
            count: values.len(),
        }];
    }

    let width = (max - min) / bins as f64;
    let mut counts = vec![0usize; bins];
    for &v in values {
        let idx = (((v - min) / width) as usize).min(bins - 1);
        counts[idx] += 1;
    }

    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| HistogramBin {
            start: min + i as f64 * width,
            end: if i + 1 == bins {
                max
            } else {
                min + (i + 1) as f64 * width
            },
            count,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_basic() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        let s = SeriesSummary::new(&values).unwrap();
        assert_eq!(s.count, 5);
        assert_eq!(s.mean, 3.0);
        assert_eq!(s.median, 3.0);
        assert_eq!(s.q1, 2.0);
        assert_eq!(s.q3, 4.0);
        assert_eq!(s.min, 1.0);
        assert_eq!(s.max, 5.0);
        assert!((s.std_dev - 2.5_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_quantile_interpolates() {
        let s = SeriesSummary::new(&[4.0, 1.0, 3.0, 2.0]).unwrap();
        assert!((s.median - 2.5).abs() < 1e-12);
        assert!((s.q1 - 1.75).abs() < 1e-12);
        assert!((s.q3 - 3.25).abs() < 1e-12);
    }

    #[test]
    fn test_summary_empty() {
        assert!(SeriesSummary::new(&[]).is_none());
    }

    #[test]
    fn test_single_value_has_zero_std() {
        let s = SeriesSummary::new(&[7.0]).unwrap();
        assert_eq!(s.std_dev, 0.0);
        assert_eq!(s.iqr(), 0.0);
    }

    #[test]
    fn test_box_plot_outliers() {
        let values = [10.0, 11.0, 12.0, 13.0, 14.0, 100.0];
        let s = SeriesSummary::new(&values).unwrap();
        let bp = s.box_plot(&values);
        assert_eq!(bp.outliers, vec![100.0]);
        assert_eq!(bp.upper_whisker, 14.0);
        assert_eq!(bp.lower_whisker, 10.0);
    }

    #[test]
    fn test_histogram_counts_everything() {
        let values: Vec<f64> = (0..100).map(|i| i as f64).collect();
        let bins = histogram(&values, 10);
        assert_eq!(bins.len(), 10);
        assert_eq!(bins.iter().map(|b| b.count).sum::<usize>(), 100);
        assert!(bins.iter().all(|b| b.count == 10));
        assert_eq!(bins[9].end, 99.0);
    }

    #[test]
    fn test_histogram_constant() {
        let bins = histogram(&[5.0; 8], 4);
        assert_eq!(bins.len(), 1);
        assert_eq!(bins[0].count, 8);
    }
}
