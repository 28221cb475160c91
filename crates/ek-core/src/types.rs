//! Common result types for epikit.

use serde::{Deserialize, Serialize};

/// A point estimate with an optional confidence interval.
///
/// Shared currency between the estimators (TMLE, effect-measure
/// calculators) and the plot artifacts that consume them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IntervalEstimate {
    /// Point estimate.
    pub estimate: f64,

    /// Lower confidence bound. `None` when no interval was computed.
    pub lower: Option<f64>,

    /// Upper confidence bound. `None` when no interval was computed.
    pub upper: Option<f64>,

    /// Confidence level of the interval (e.g. `0.95`).
    pub conf_level: Option<f64>,
}

impl IntervalEstimate {
    /// A point estimate without an interval.
    pub fn point(estimate: f64) -> Self {
        Self { estimate, lower: None, upper: None, conf_level: None }
    }

    /// A point estimate with a confidence interval.
    pub fn with_interval(estimate: f64, lower: f64, upper: f64, conf_level: f64) -> Self {
        Self {
            estimate,
            lower: Some(lower.min(upper)),
            upper: Some(lower.max(upper)),
            conf_level: Some(conf_level),
        }
    }

    /// Interval width, if an interval is present.
    pub fn width(&self) -> Option<f64> {
        match (self.lower, self.upper) {
            (Some(lo), Some(hi)) => Some(hi - lo),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_interval_orders_bounds() {
        let e = IntervalEstimate::with_interval(0.5, 0.9, 0.1, 0.95);
        assert_eq!(e.lower, Some(0.1));
        assert_eq!(e.upper, Some(0.9));
        assert!((e.width().unwrap() - 0.8).abs() < 1e-15);
    }

    #[test]
    fn point_has_no_interval() {
        let e = IntervalEstimate::point(1.5);
        assert!(e.lower.is_none() && e.upper.is_none() && e.width().is_none());
    }
}
