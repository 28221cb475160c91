//! Bernoulli draw utilities for simulated binary variables.

use ek_core::{Error, Result};
use rand::Rng;

/// Draw a 0/1 outcome with success probability `p`.
///
/// The degenerate probabilities `0.0` and `1.0` are honoured exactly, so
/// deterministic fixtures do not depend on the generator state.
///
/// # Errors
/// Rejects `p` outside `[0, 1]`; a covariate or outcome model that emits
/// such a value is misspecified and the simulation must stop.
pub fn draw_bernoulli<R: Rng + ?Sized>(rng: &mut R, p: f64) -> Result<u8> {
    if !p.is_finite() || !(0.0..=1.0).contains(&p) {
        return Err(Error::Validation(format!(
            "Bernoulli probability must be finite and in [0,1], got {p}"
        )));
    }
    if p <= 0.0 {
        return Ok(0);
    }
    if p >= 1.0 {
        return Ok(1);
    }
    Ok(u8::from(rng.gen::<f64>() < p))
}
