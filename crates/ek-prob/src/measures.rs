//! Association measures from 2×2 tables.
//!
//! Wald-type confidence intervals on the natural scale for the risk
//! difference and on the log scale for ratio measures.

use ek_core::{Error, IntervalEstimate, Result};
use statrs::distribution::{ContinuousCDF, Normal};

/// A 2×2 table of exposure by outcome.
///
/// Cell layout follows the conventional epidemiologic table:
///
/// | | event | no event |
/// |---|---|---|
/// | exposed   | `a` | `b` |
/// | unexposed | `c` | `d` |
#[derive(Debug, Clone, Copy)]
pub struct TwoByTwo {
    /// Exposed subjects with the event.
    pub a: u64,
    /// Exposed subjects without the event.
    pub b: u64,
    /// Unexposed subjects with the event.
    pub c: u64,
    /// Unexposed subjects without the event.
    pub d: u64,
}

impl TwoByTwo {
    /// Build a table, rejecting margins with no observations.
    pub fn new(a: u64, b: u64, c: u64, d: u64) -> Result<Self> {
        if a + b == 0 || c + d == 0 {
            return Err(Error::Validation(
                "both exposure groups must contain at least one subject".to_string(),
            ));
        }
        Ok(Self { a, b, c, d })
    }

    /// Risk among the exposed, `a / (a + b)`.
    pub fn risk_exposed(&self) -> f64 {
        self.a as f64 / (self.a + self.b) as f64
    }

    /// Risk among the unexposed, `c / (c + d)`.
    pub fn risk_unexposed(&self) -> f64 {
        self.c as f64 / (self.c + self.d) as f64
    }
}

#[inline]
fn z_value(conf_level: f64) -> Result<f64> {
    if !(conf_level.is_finite() && conf_level > 0.0 && conf_level < 1.0) {
        return Err(Error::Validation(format!("conf_level must be in (0,1), got {conf_level}")));
    }
    // Safe by construction for mean=0, sigma=1.
    let normal = Normal::new(0.0, 1.0).expect("standard normal should be constructible");
    Ok(normal.inverse_cdf(1.0 - (1.0 - conf_level) / 2.0))
}

/// Risk difference `R1 - R0` with a Wald interval.
pub fn risk_difference(table: &TwoByTwo, conf_level: f64) -> Result<IntervalEstimate> {
    let z = z_value(conf_level)?;
    let (r1, r0) = (table.risk_exposed(), table.risk_unexposed());
    let n1 = (table.a + table.b) as f64;
    let n0 = (table.c + table.d) as f64;
    let se = (r1 * (1.0 - r1) / n1 + r0 * (1.0 - r0) / n0).sqrt();
    let rd = r1 - r0;
    Ok(IntervalEstimate::with_interval(rd, rd - z * se, rd + z * se, conf_level))
}

/// Risk ratio `R1 / R0` with a log-scale Wald interval.
///
/// # Errors
/// Fails when either margin has zero events (the log ratio is undefined).
pub fn risk_ratio(table: &TwoByTwo, conf_level: f64) -> Result<IntervalEstimate> {
    let z = z_value(conf_level)?;
    if table.a == 0 || table.c == 0 {
        return Err(Error::Computation(
            "risk ratio requires at least one event in each exposure group".to_string(),
        ));
    }
    let n1 = (table.a + table.b) as f64;
    let n0 = (table.c + table.d) as f64;
    let rr = table.risk_exposed() / table.risk_unexposed();
    let se = (1.0 / table.a as f64 - 1.0 / n1 + 1.0 / table.c as f64 - 1.0 / n0).sqrt();
    let log_rr = rr.ln();
    Ok(IntervalEstimate::with_interval(
        rr,
        (log_rr - z * se).exp(),
        (log_rr + z * se).exp(),
        conf_level,
    ))
}

/// Odds ratio `(a·d) / (b·c)` with a log-scale Wald interval.
///
/// # Errors
/// Fails when any cell is zero (the log odds ratio is undefined).
pub fn odds_ratio(table: &TwoByTwo, conf_level: f64) -> Result<IntervalEstimate> {
    let z = z_value(conf_level)?;
    if table.a == 0 || table.b == 0 || table.c == 0 || table.d == 0 {
        return Err(Error::Computation(
            "odds ratio requires all four cells to be non-zero".to_string(),
        ));
    }
    let (a, b, c, d) =
        (table.a as f64, table.b as f64, table.c as f64, table.d as f64);
    let or = (a * d) / (b * c);
    let se = (1.0 / a + 1.0 / b + 1.0 / c + 1.0 / d).sqrt();
    let log_or = or.ln();
    Ok(IntervalEstimate::with_interval(
        or,
        (log_or - z * se).exp(),
        (log_or + z * se).exp(),
        conf_level,
    ))
}
