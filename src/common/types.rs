use chrono::{Datelike, Days, Months, NaiveDate};

/// Minimum number of data points required to fit any forecasting model.
pub const MIN_DATA_POINTS: usize = 4;

/// A univariate time series of (date, value) pairs, ordered by date.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    pub timestamps: Vec<NaiveDate>,
    pub values: Vec<f64>,
}

impl TimeSeries {
    pub fn new(timestamps: Vec<NaiveDate>, values: Vec<f64>) -> Self {
        debug_assert_eq!(timestamps.len(), values.len());
        Self { timestamps, values }
    }

    /// Returns the number of data points.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the series has no data points.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the last timestamp, or None if empty.
    pub fn last_timestamp(&self) -> Option<NaiveDate> {
        self.timestamps.last().copied()
    }

    /// Split off the last `holdout` points: returns (training, holdout).
    pub fn split_at_tail(&self, holdout: usize) -> (TimeSeries, TimeSeries) {
        let cut = self.len().saturating_sub(holdout);
        (
            TimeSeries {
                timestamps: self.timestamps[..cut].to_vec(),
                values: self.values[..cut].to_vec(),
            },
            TimeSeries {
                timestamps: self.timestamps[cut..].to_vec(),
                values: self.values[cut..].to_vec(),
            },
        )
    }

    /// Detected sampling frequency of the series.
    pub fn frequency(&self) -> Frequency {
        detect_frequency(&self.timestamps)
    }

    /// The `horizon` timestamps following the last observation.
    pub fn future_timestamps(&self, horizon: usize) -> Vec<NaiveDate> {
        let freq = self.frequency();
        match self.last_timestamp() {
            Some(last) => (1..=horizon).map(|i| freq.advance(last, i)).collect(),
            None => Vec::new(),
        }
    }
}

/// The result of a forecasting operation.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastResult {
    /// Display name of the model that produced the forecast.
    pub model: String,
    /// Future timestamps.
    pub timestamps: Vec<NaiveDate>,
    /// Point forecasts.
    pub forecasts: Vec<f64>,
    /// Lower prediction interval bounds.
    pub lower_bounds: Vec<f64>,
    /// Upper prediction interval bounds.
    pub upper_bounds: Vec<f64>,
}

impl ForecastResult {
    pub fn len(&self) -> usize {
        self.forecasts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forecasts.is_empty()
    }

    /// True when every point forecast and bound is finite.
    pub fn is_finite(&self) -> bool {
        self.forecasts
            .iter()
            .chain(&self.lower_bounds)
            .chain(&self.upper_bounds)
            .all(|v| v.is_finite())
    }
}

/// Sampling frequency of a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
    /// Any other fixed spacing, in days.
    Days(u64),
}

impl Frequency {
    /// The date `steps` periods after `date`.
    ///
    /// Calendar frequencies keep month-end anchoring: the last day of a month
    /// advances to the last day of the target month.
    pub fn advance(self, date: NaiveDate, steps: usize) -> NaiveDate {
        let steps = steps as u32;
        match self {
            Frequency::Daily => date + Days::new(steps as u64),
            Frequency::Weekly => date + Days::new(7 * steps as u64),
            Frequency::Days(d) => date + Days::new(d * steps as u64),
            Frequency::Monthly => add_months(date, steps),
            Frequency::Quarterly => add_months(date, 3 * steps),
            Frequency::Yearly => add_months(date, 12 * steps),
        }
    }
}

fn is_month_end(date: NaiveDate) -> bool {
    date.succ_opt().map_or(true, |next| next.month() != date.month())
}

fn add_months(date: NaiveDate, months: u32) -> NaiveDate {
    if is_month_end(date) {
        // First day of the month after the target month, minus one day.
        let first = date.with_day(1).unwrap_or(date);
        let after = first + Months::new(months + 1);
        return after.pred_opt().unwrap_or(after);
    }
    // checked_add_months clamps the day to the target month's length.
    date.checked_add_months(Months::new(months)).unwrap_or(date)
}

/// Detect the sampling frequency from the most common gap between dates.
/// Returns `Daily` if fewer than 2 data points or no positive gap.
pub fn detect_frequency(timestamps: &[NaiveDate]) -> Frequency {
    match detect_interval(timestamps) {
        1 => Frequency::Daily,
        7 => Frequency::Weekly,
        28..=31 => Frequency::Monthly,
        89..=92 => Frequency::Quarterly,
        365 | 366 => Frequency::Yearly,
        d => Frequency::Days(d as u64),
    }
}

/// Detect the most common interval (in days) between consecutive timestamps.
/// Returns 1 (daily) if fewer than 2 data points or no clear interval.
pub fn detect_interval(timestamps: &[NaiveDate]) -> i64 {
    if timestamps.len() < 2 {
        return 1;
    }

    let mut diffs: Vec<i64> = timestamps
        .windows(2)
        .map(|w| (w[1] - w[0]).num_days())
        .collect();
    diffs.sort_unstable();

    // Monthly gaps vary between 28 and 31 days; fold them onto one bucket so
    // the mode is not split across month lengths.
    let bucket = |d: i64| if (28..=31).contains(&d) { 30 } else { d };

    let mut best_val = diffs[0];
    let mut best_count = 0usize;
    let mut current_val = diffs[0];
    let mut current_count = 0usize;

    for &d in &diffs {
        if bucket(d) == bucket(current_val) {
            current_count += 1;
        } else {
            if current_count > best_count {
                best_count = current_count;
                best_val = current_val;
            }
            current_val = d;
            current_count = 1;
        }
    }
    if current_count > best_count {
        best_val = current_val;
    }

    if best_val <= 0 {
        return 1;
    }

    best_val
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn month_ends(n: usize) -> Vec<NaiveDate> {
        (0..n)
            .map(|i| Frequency::Monthly.advance(date(1990, 1, 31), i))
            .collect()
    }

    #[test]
    fn test_detect_interval_daily() {
        let ts: Vec<NaiveDate> = (0..5).map(|i| date(2024, 1, 1) + Days::new(i)).collect();
        assert_eq!(detect_interval(&ts), 1);
    }

    #[test]
    fn test_detect_interval_weekly() {
        let ts: Vec<NaiveDate> = (0..5).map(|i| date(2024, 1, 1) + Days::new(7 * i)).collect();
        assert_eq!(detect_interval(&ts), 7);
    }

    #[test]
    fn test_detect_interval_monthly_approx() {
        let interval = detect_interval(&month_ends(24));
        assert!((28..=31).contains(&interval), "got {}", interval);
    }

    #[test]
    fn test_detect_interval_single_point() {
        assert_eq!(detect_interval(&[date(2024, 1, 1)]), 1);
    }

    #[test]
    fn test_detect_interval_empty() {
        assert_eq!(detect_interval(&[]), 1);
    }

    #[test]
    fn test_detect_frequency_monthly() {
        assert_eq!(detect_frequency(&month_ends(36)), Frequency::Monthly);

        let firsts: Vec<NaiveDate> = (0..12).map(|m| date(2023, m + 1, 1)).collect();
        assert_eq!(detect_frequency(&firsts), Frequency::Monthly);
    }

    #[test]
    fn test_advance_keeps_month_end() {
        assert_eq!(Frequency::Monthly.advance(date(2024, 1, 31), 1), date(2024, 2, 29));
        assert_eq!(Frequency::Monthly.advance(date(2024, 2, 29), 1), date(2024, 3, 31));
        assert_eq!(Frequency::Monthly.advance(date(2024, 11, 30), 2), date(2025, 1, 31));
    }

    #[test]
    fn test_advance_month_start() {
        assert_eq!(Frequency::Monthly.advance(date(2024, 1, 1), 13), date(2025, 2, 1));
        assert_eq!(Frequency::Quarterly.advance(date(2024, 1, 15), 1), date(2024, 4, 15));
    }

    #[test]
    fn test_future_timestamps() {
        let ts = month_ends(12);
        let series = TimeSeries::new(ts, vec![1.0; 12]);
        let future = series.future_timestamps(3);
        assert_eq!(future, vec![date(1991, 1, 31), date(1991, 2, 28), date(1991, 3, 31)]);
    }

    #[test]
    fn test_split_at_tail() {
        let series = TimeSeries::new(month_ends(10), (0..10).map(|i| i as f64).collect());
        let (train, test) = series.split_at_tail(3);
        assert_eq!(train.len(), 7);
        assert_eq!(test.values, vec![7.0, 8.0, 9.0]);
        assert_eq!(test.timestamps, series.timestamps[7..].to_vec());
    }
}
