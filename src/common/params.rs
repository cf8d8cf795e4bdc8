use thiserror::Error;

/// Errors raised while validating user-supplied parameters.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParamsError {
    #[error("{0} cannot be empty")]
    Empty(&'static str),

    #[error("{name} must be {expected}, got {got}")]
    OutOfRange {
        name: &'static str,
        expected: String,
        got: String,
    },

    #[error(
        "invalid model '{0}'. Valid models: hw-add, hw-mul, auto-arima, auto-ets, auto-theta, \
         auto-ces, prophet-add, prophet-mul, linear, seasonal-naive, auto"
    )]
    UnknownModel(String),
}

/// Where to read a series from and which columns hold it.
///
/// `source` is either a file path (CSV, TSV, Parquet or XLSX, picked by
/// extension) or the name of a table in an existing DuckDB connection.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesParams {
    pub source: String,
    pub timestamp_col: String,
    pub value_col: String,
}

impl SeriesParams {
    pub fn new(
        source: impl Into<String>,
        timestamp_col: impl Into<String>,
        value_col: impl Into<String>,
    ) -> Result<Self, ParamsError> {
        let params = Self {
            source: source.into(),
            timestamp_col: timestamp_col.into(),
            value_col: value_col.into(),
        };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<(), ParamsError> {
        if self.source.trim().is_empty() {
            return Err(ParamsError::Empty("source"));
        }
        if self.timestamp_col.is_empty() {
            return Err(ParamsError::Empty("timestamp column"));
        }
        if self.value_col.is_empty() {
            return Err(ParamsError::Empty("value column"));
        }
        Ok(())
    }

}

/// Require `value` to lie strictly between 0 and 1.
pub fn check_unit_interval(name: &'static str, value: f64) -> Result<f64, ParamsError> {
    if value > 0.0 && value < 1.0 {
        Ok(value)
    } else {
        Err(ParamsError::OutOfRange {
            name,
            expected: "between 0.0 and 1.0 (exclusive)".to_string(),
            got: value.to_string(),
        })
    }
}

/// Require `value` to be at least `min`.
pub fn check_at_least(name: &'static str, value: usize, min: usize) -> Result<usize, ParamsError> {
    if value >= min {
        Ok(value)
    } else {
        Err(ParamsError::OutOfRange {
            name,
            expected: if min == 1 {
                "a positive integer".to_string()
            } else {
                format!("at least {}", min)
            },
            got: value.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_series_params_validate() {
        assert!(SeriesParams::new("data.csv", "Mês", "AUTOMÓVEIS").is_ok());
        assert_eq!(
            SeriesParams::new("  ", "ds", "y").unwrap_err(),
            ParamsError::Empty("source")
        );
        assert_eq!(
            SeriesParams::new("t", "", "y").unwrap_err(),
            ParamsError::Empty("timestamp column")
        );
    }

    #[test]
    fn test_unit_interval() {
        assert_eq!(check_unit_interval("confidence_level", 0.95), Ok(0.95));
        let err = check_unit_interval("confidence_level", 1.0).unwrap_err();
        assert!(err.to_string().contains("between 0.0 and 1.0"));
    }

    #[test]
    fn test_at_least() {
        assert_eq!(check_at_least("horizon", 12, 1), Ok(12));
        let err = check_at_least("horizon", 0, 1).unwrap_err();
        assert_eq!(err.to_string(), "horizon must be a positive integer, got 0");
    }
}
