use super::{Metric, MetricBundle};

/// Placeholder shown for a metric that could not be computed.
pub const UNDEFINED: &str = "N/A";

/// Format a metric value with two decimals, suffixing percentages with `%`.
pub fn format_metric(value: Option<f64>, percent: bool) -> String {
    match value {
        Some(v) if v.is_finite() => {
            if percent {
                format!("{:.2}%", v)
            } else {
                format!("{:.2}", v)
            }
        }
        _ => UNDEFINED.to_string(),
    }
}

impl MetricBundle {
    /// Formatted value of one metric, ready for display.
    pub fn display(&self, metric: Metric) -> String {
        format_metric(self.get(metric), metric.is_percentage())
    }
}

/// Metric bundles for several models, compared column by column.
#[derive(Debug, Clone, Default)]
pub struct MetricTable {
    rows: Vec<(String, MetricBundle)>,
}

impl MetricTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, model: impl Into<String>, bundle: MetricBundle) {
        self.rows.push((model.into(), bundle));
    }

    pub fn rows(&self) -> &[(String, MetricBundle)] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Name of the model with the best value for `metric`.
    ///
    /// Error metrics are best when smallest, bias metrics when closest to
    /// zero. Undefined values never win. Ties keep the first row.
    pub fn best(&self, metric: Metric) -> Option<&str> {
        let score = |b: &MetricBundle| {
            b.get(metric)
                .filter(|v| v.is_finite())
                .map(|v| if metric.is_signed() { v.abs() } else { v })
        };

        let mut best: Option<(&str, f64)> = None;
        for (name, bundle) in &self.rows {
            if let Some(s) = score(bundle) {
                match best {
                    Some((_, current)) if current <= s => {}
                    _ => best = Some((name.as_str(), s)),
                }
            }
        }
        best.map(|(name, _)| name)
    }

    /// Whether `model` holds the best value in the `metric` column.
    pub fn is_best(&self, model: &str, metric: Metric) -> bool {
        self.best(metric) == Some(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle(actual: &[f64], predicted: &[f64]) -> MetricBundle {
        MetricBundle::compute(actual, predicted).unwrap()
    }

    #[test]
    fn test_format_two_decimals() {
        assert_eq!(format_metric(Some(100.0), false), "100.00");
        assert_eq!(format_metric(Some(-3.333333), false), "-3.33");
        assert_eq!(format_metric(Some(8.0561), true), "8.06%");
    }

    #[test]
    fn test_format_undefined() {
        assert_eq!(format_metric(None, true), "N/A");
        assert_eq!(format_metric(Some(f64::NAN), false), "N/A");
        assert_eq!(format_metric(Some(f64::INFINITY), false), "N/A");
    }

    #[test]
    fn test_bundle_display_uses_percent_suffix() {
        let m = bundle(&[100.0, 200.0, 300.0], &[110.0, 190.0, 290.0]);
        assert_eq!(m.display(Metric::Mae), "10.00");
        assert_eq!(m.display(Metric::Mape), "6.11%");
        assert_eq!(m.display(Metric::Bias), "-3.33");
        assert_eq!(m.display(Metric::BiasRate), "-1.67%");
    }

    #[test]
    fn test_best_prefers_smallest_error() {
        let mut table = MetricTable::new();
        table.push("Add", bundle(&[10.0, 20.0], &[12.0, 22.0]));
        table.push("Multi", bundle(&[10.0, 20.0], &[11.0, 21.0]));

        assert_eq!(table.best(Metric::Mse), Some("Multi"));
        assert!(table.is_best("Multi", Metric::Rmse));
        assert!(!table.is_best("Add", Metric::Mae));
    }

    #[test]
    fn test_best_bias_is_closest_to_zero() {
        let mut table = MetricTable::new();
        table.push("under", bundle(&[10.0, 20.0], &[5.0, 15.0]));
        table.push("over", bundle(&[10.0, 20.0], &[11.0, 21.0]));

        // "under" has bias -5, "over" has bias +1
        assert_eq!(table.best(Metric::Bias), Some("over"));
        assert_eq!(table.best(Metric::BiasRate), Some("over"));
    }

    #[test]
    fn test_best_skips_undefined() {
        let mut table = MetricTable::new();
        table.push("zero", bundle(&[0.0, 20.0], &[0.0, 20.0]));
        table.push("other", bundle(&[10.0, 20.0], &[15.0, 25.0]));

        assert_eq!(table.best(Metric::Mape), Some("other"));
        assert_eq!(table.best(Metric::Mse), Some("zero"));
    }

    #[test]
    fn test_best_empty_table() {
        assert_eq!(MetricTable::new().best(Metric::Mse), None);
    }
}
