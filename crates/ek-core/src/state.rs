//! Per-subject covariate state.
//!
//! The simulation engine threads an explicit [`CovariateState`] record
//! through each step; model functions receive immutable snapshots and the
//! engine owns every mutation. Reads of variables that were never defined
//! surface as [`Error::UndefinedVariable`] so misconfigured policies and
//! recodes fail with a descriptive condition instead of a silent default.

use std::collections::BTreeMap;

use crate::{Error, Result};

/// Named covariate values for one subject at one point in time.
///
/// Variable names map to `f64` values; binary covariates are coded 0/1.
/// Iteration order is stable (lexicographic by name), which keeps
/// serialized rows and debug output reproducible.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CovariateState {
    values: BTreeMap<String, f64>,
}

impl CovariateState {
    /// Create an empty state.
    pub fn new() -> Self {
        Self { values: BTreeMap::new() }
    }

    /// Build a state from `(name, value)` pairs.
    ///
    /// # Errors
    /// Returns a validation error on an empty name, a non-finite value, or
    /// a duplicated name.
    pub fn from_pairs<I, S>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let mut state = Self::new();
        for (name, value) in pairs {
            let name = name.into();
            if state.values.contains_key(&name) {
                return Err(Error::Validation(format!("duplicate variable name: {name}")));
            }
            state.set(&name, value)?;
        }
        Ok(state)
    }

    /// Read a variable.
    ///
    /// # Errors
    /// [`Error::UndefinedVariable`] if `name` was never set.
    pub fn get(&self, name: &str) -> Result<f64> {
        self.values
            .get(name)
            .copied()
            .ok_or_else(|| Error::UndefinedVariable(name.to_string()))
    }

    /// Read a variable, returning `None` when it is not defined.
    pub fn get_opt(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    /// Set a variable, creating it if necessary.
    ///
    /// # Errors
    /// Returns a validation error on an empty name or a non-finite value.
    pub fn set(&mut self, name: &str, value: f64) -> Result<()> {
        if name.is_empty() {
            return Err(Error::Validation("variable name must be non-empty".to_string()));
        }
        if !value.is_finite() {
            return Err(Error::Validation(format!(
                "value for variable '{name}' must be finite, got {value}"
            )));
        }
        self.values.insert(name.to_string(), value);
        Ok(())
    }

    /// Whether `name` is defined.
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Number of defined variables.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no variables are defined.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate `(name, value)` pairs in lexicographic name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(k, &v)| (k.as_str(), v))
    }

    /// Variable names in lexicographic order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}
