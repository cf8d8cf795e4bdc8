use std::fmt;

use crate::common::params::{check_at_least, ParamsError};

/// How the seasonal and trend components combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecompositionKind {
    /// y = trend + seasonal + residual
    #[default]
    Additive,
    /// y = trend * seasonal * residual
    Multiplicative,
}

impl fmt::Display for DecompositionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecompositionKind::Additive => write!(f, "additive"),
            DecompositionKind::Multiplicative => write!(f, "multiplicative"),
        }
    }
}

/// Parameters for a classical seasonal decomposition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecompositionParams {
    pub period: usize,
    pub kind: DecompositionKind,
}

impl DecompositionParams {
    pub fn new(period: usize, kind: DecompositionKind) -> Result<Self, ParamsError> {
        check_at_least("period", period, 2)?;
        Ok(Self { period, kind })
    }
}

impl Default for DecompositionParams {
    fn default() -> Self {
        Self {
            period: 12,
            kind: DecompositionKind::Additive,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_must_be_at_least_two() {
        let err = DecompositionParams::new(1, DecompositionKind::Additive).unwrap_err();
        assert_eq!(err.to_string(), "period must be at least 2, got 1");
        assert!(DecompositionParams::new(12, DecompositionKind::Multiplicative).is_ok());
    }
}
