//! Time-varying Monte Carlo g-formula simulation engine.
//!
//! Given fitted exposure, outcome, and covariate models plus a pool of
//! baseline subject records, the engine simulates a synthetic cohort
//! forward through discrete time under a treatment policy:
//!
//! - **Resampling**: subjects are drawn with replacement from the baseline
//!   pool.
//! - **Interval loop**: each interval applies the entry-time recode, sets
//!   exposure from the policy, evaluates covariate models in ascending
//!   label order (each recode runs immediately after the prediction it
//!   depends on), then draws the outcome indicator.
//! - **Terminal states**: an event stops the subject's trajectory; subjects
//!   reaching the time horizon are administratively censored. Both states
//!   are absorbing.
//! - **Lag update**: lagged variables are refreshed from the interval's
//!   post-prediction values before the next interval begins.
//!
//! Configuration errors (missing models, undefined variable references,
//! duplicate labels) surface before any random draw is made.

use std::collections::BTreeMap;
use std::fmt;

use ek_core::{CovariateState, Error, ProbabilityModel, Result, ValueModel};
use ek_prob::draw_bernoulli;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

/// Recode closure run immediately after one covariate prediction.
pub type RecodeFn = Box<dyn Fn(&mut CovariateState) -> Result<()> + Send + Sync>;

/// Recode closure run at interval entry, before any model is evaluated.
/// Receives the current interval index.
pub type EntryRecodeFn = Box<dyn Fn(&mut CovariateState, u32) -> Result<()> + Send + Sync>;

/// Custom treatment predicate: `true` forces exposure, `false` withholds it.
pub type PolicyFn = Box<dyn Fn(&CovariateState) -> Result<bool> + Send + Sync>;

// ---------------------------------------------------------------------------
// Model registration types
// ---------------------------------------------------------------------------

/// Treatment policy applied at every interval.
///
/// Forced policies (`All`, `None`, `Custom`) override the fitted exposure
/// model; only `Natural` consults it.
pub enum TreatmentPolicy {
    /// Draw exposure from the fitted exposure model (natural course).
    Natural,
    /// Force exposure to 1 at every interval.
    All,
    /// Force exposure to 0 at every interval.
    None,
    /// Decide exposure from the current covariate state.
    Custom(PolicyFn),
}

impl fmt::Debug for TreatmentPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Natural => f.write_str("Natural"),
            Self::All => f.write_str("All"),
            Self::None => f.write_str("None"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// How a covariate model's prediction is turned into a simulated value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableKind {
    /// Prediction is a Bernoulli success probability; the value is drawn.
    Binary,
    /// Prediction is used directly as the fitted value.
    Continuous,
}

/// A named, ordered predictive rule for one time-varying covariate.
///
/// The label fixes the evaluation order within an interval: later models
/// see the freshly predicted values of earlier ones. The optional recode
/// keeps derived terms (squares, cubes, clamps) consistent and runs
/// immediately after this model's prediction, never batched at interval
/// end.
pub struct CovariateModel {
    label: u32,
    name: String,
    kind: VariableKind,
    model: Box<dyn ValueModel>,
    recode: Option<RecodeFn>,
}

impl CovariateModel {
    /// Register a predictive rule for `name`, evaluated at position `label`.
    pub fn new(
        label: u32,
        name: &str,
        kind: VariableKind,
        model: impl ValueModel + 'static,
    ) -> Result<Self> {
        if name.is_empty() {
            return Err(Error::Validation("covariate name must be non-empty".to_string()));
        }
        Ok(Self { label, name: name.to_string(), kind, model: Box::new(model), recode: None })
    }

    /// Attach a recode applied immediately after this model's prediction.
    pub fn with_recode(
        mut self,
        recode: impl Fn(&mut CovariateState) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.recode = Some(Box::new(recode));
        self
    }

    /// Evaluation-order label.
    pub fn label(&self) -> u32 {
        self.label
    }

    /// Covariate written by this model.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sampling kind.
    pub fn kind(&self) -> VariableKind {
        self.kind
    }
}

impl fmt::Debug for CovariateModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CovariateModel")
            .field("label", &self.label)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("recode", &self.recode.is_some())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Input / output types
// ---------------------------------------------------------------------------

/// One sampled individual in the baseline pool.
#[derive(Debug, Clone)]
pub struct BaselineRecord {
    /// Unique subject identifier from the source data.
    pub id: u64,
    /// Observed exit time; the pool maximum supplies the default horizon.
    pub exit_time: u32,
    /// Baseline covariate values, including any lagged variables the
    /// models read at the first interval.
    pub covariates: CovariateState,
}

/// Configuration for one simulation run.
#[derive(Debug)]
pub struct SimulationConfig {
    /// Treatment policy applied at every interval.
    pub policy: TreatmentPolicy,
    /// Number of subjects to draw with replacement from the baseline pool.
    pub n_subjects: usize,
    /// Time horizon. `None` uses the maximum observed exit time.
    pub t_max: Option<u32>,
    /// Master random seed. Subject `i` draws from a generator seeded with
    /// `seed.wrapping_add(i)`, so output is reproducible at any thread
    /// count.
    pub seed: u64,
    /// Number of Rayon threads: `1` = serial (default behaviour), `0` =
    /// Rayon's global pool, otherwise a dedicated pool of that size.
    pub n_threads: usize,
}

/// Terminal status of a simulated subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubjectStatus {
    /// Still at risk (only observed mid-simulation, never in output).
    Alive,
    /// Outcome occurred; trajectory stopped at the event interval.
    Dead,
    /// Reached the time horizon without an event (administrative).
    Censored,
}

/// One row of the synthetic longitudinal table.
#[derive(Debug, Clone)]
pub struct SimulatedInterval {
    /// Simulated subject index (`0..n_subjects`).
    pub subject: usize,
    /// Baseline record id this subject was resampled from.
    pub source_id: u64,
    /// Interval entry time.
    pub t_in: u32,
    /// Interval exit time (`t_in + 1`).
    pub t_out: u32,
    /// Exposure applied this interval (0/1).
    pub exposure: u8,
    /// Event probability the outcome model produced for this interval.
    pub event_probability: f64,
    /// Outcome draw (0/1).
    pub event: u8,
    /// Whether this row ends the subject's trajectory with an event.
    pub terminal: bool,
    /// Covariate state after all predictions and recodes this interval.
    pub covariates: CovariateState,
}

/// Synthetic cohort produced by [`MonteCarloGFormula::simulate`].
#[derive(Debug)]
pub struct SimulatedCohort {
    rows: Vec<SimulatedInterval>,
    statuses: Vec<SubjectStatus>,
    t_max: u32,
}

impl SimulatedCohort {
    /// The full longitudinal table, ordered by subject then interval.
    pub fn rows(&self) -> &[SimulatedInterval] {
        &self.rows
    }

    /// Number of simulated subjects.
    pub fn n_subjects(&self) -> usize {
        self.statuses.len()
    }

    /// Time horizon the cohort was simulated to.
    pub fn t_max(&self) -> u32 {
        self.t_max
    }

    /// Terminal status per subject, indexed by simulated subject index.
    pub fn statuses(&self) -> &[SubjectStatus] {
        &self.statuses
    }

    /// Last observation per subject, the view survival-curve estimation
    /// consumes. One entry per subject, in subject order.
    pub fn last_observations(&self) -> Vec<&SimulatedInterval> {
        let mut last: Vec<Option<&SimulatedInterval>> = vec![None; self.statuses.len()];
        for row in &self.rows {
            last[row.subject] = Some(row);
        }
        last.into_iter().flatten().collect()
    }

    /// Fraction of subjects whose trajectory ended in the event.
    pub fn event_risk(&self) -> f64 {
        if self.statuses.is_empty() {
            return f64::NAN;
        }
        let events = self.statuses.iter().filter(|s| **s == SubjectStatus::Dead).count();
        events as f64 / self.statuses.len() as f64
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Time-varying Monte Carlo g-formula estimator.
///
/// Register fitted models, then call [`simulate`](Self::simulate):
///
/// ```
/// use ek_causal::gformula::{
///     BaselineRecord, CovariateModel, MonteCarloGFormula, SimulationConfig,
///     TreatmentPolicy, VariableKind,
/// };
/// use ek_core::{CovariateState, ProbabilityFn, ValueFn};
///
/// let baseline = vec![BaselineRecord {
///     id: 1,
///     exit_time: 3,
///     covariates: CovariateState::from_pairs([("cd4", 350.0)]).unwrap(),
/// }];
/// let mut gf = MonteCarloGFormula::new(baseline, "art", "dead").unwrap();
/// gf.exposure_model(ProbabilityFn::new(|_s: &CovariateState| Ok(0.4)));
/// gf.outcome_model(ProbabilityFn::new(|s: &CovariateState| {
///     Ok(if s.get("cd4")? < 200.0 { 0.2 } else { 0.05 })
/// }));
/// gf.add_covariate_model(
///     CovariateModel::new(
///         1,
///         "cd4",
///         VariableKind::Continuous,
///         ValueFn::new(|s: &CovariateState| Ok(s.get("cd4")? - 25.0)),
///     )
///     .unwrap(),
/// )
/// .unwrap();
///
/// let cohort = gf
///     .simulate(&SimulationConfig {
///         policy: TreatmentPolicy::All,
///         n_subjects: 100,
///         t_max: None,
///         seed: 7,
///         n_threads: 1,
///     })
///     .unwrap();
/// assert_eq!(cohort.n_subjects(), 100);
/// ```
pub struct MonteCarloGFormula {
    baseline: Vec<BaselineRecord>,
    exposure: String,
    outcome: String,
    exposure_model: Option<Box<dyn ProbabilityModel>>,
    outcome_model: Option<Box<dyn ProbabilityModel>>,
    covariate_models: Vec<CovariateModel>,
    lag_map: BTreeMap<String, String>,
    entry_recode: Option<EntryRecodeFn>,
}

impl std::fmt::Debug for MonteCarloGFormula {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonteCarloGFormula")
            .field("baseline", &self.baseline)
            .field("exposure", &self.exposure)
            .field("outcome", &self.outcome)
            .field("exposure_model", &self.exposure_model.is_some())
            .field("outcome_model", &self.outcome_model.is_some())
            .field("covariate_models", &self.covariate_models)
            .field("lag_map", &self.lag_map)
            .field("entry_recode", &self.entry_recode.is_some())
            .finish()
    }
}

impl MonteCarloGFormula {
    /// Create an engine over a baseline pool.
    ///
    /// # Errors
    /// Rejects an empty pool, empty variable names, and baseline records
    /// that do not share a common variable set (a ragged pool would make
    /// model behaviour depend on which record was resampled).
    pub fn new(baseline: Vec<BaselineRecord>, exposure: &str, outcome: &str) -> Result<Self> {
        if baseline.is_empty() {
            return Err(Error::Validation("baseline pool must be non-empty".to_string()));
        }
        if exposure.is_empty() || outcome.is_empty() {
            return Err(Error::Validation(
                "exposure and outcome names must be non-empty".to_string(),
            ));
        }
        if exposure == outcome {
            return Err(Error::Validation(
                "exposure and outcome must be distinct variables".to_string(),
            ));
        }
        let first: Vec<&str> = baseline[0].covariates.names().collect();
        for record in &baseline[1..] {
            let names: Vec<&str> = record.covariates.names().collect();
            if names != first {
                return Err(Error::Validation(format!(
                    "baseline record {} does not share the pool's variable set",
                    record.id
                )));
            }
        }
        Ok(Self {
            baseline,
            exposure: exposure.to_string(),
            outcome: outcome.to_string(),
            exposure_model: None,
            outcome_model: None,
            covariate_models: Vec::new(),
            lag_map: BTreeMap::new(),
            entry_recode: None,
        })
    }

    /// Register the fitted exposure model (consulted only under the
    /// natural-course policy).
    pub fn exposure_model(&mut self, model: impl ProbabilityModel + 'static) -> &mut Self {
        self.exposure_model = Some(Box::new(model));
        self
    }

    /// Register the fitted outcome model.
    pub fn outcome_model(&mut self, model: impl ProbabilityModel + 'static) -> &mut Self {
        self.outcome_model = Some(Box::new(model));
        self
    }

    /// Register a covariate model.
    ///
    /// Models are kept sorted ascending by label regardless of
    /// registration order.
    ///
    /// # Errors
    /// Duplicate labels are rejected: the label is the evaluation order,
    /// and two models at the same position would make within-interval
    /// dependencies ambiguous.
    pub fn add_covariate_model(&mut self, model: CovariateModel) -> Result<&mut Self> {
        match self.covariate_models.binary_search_by_key(&model.label, |m| m.label) {
            Ok(_) => Err(Error::Specification(format!(
                "duplicate covariate model label {} ('{}')",
                model.label, model.name
            ))),
            Err(pos) => {
                self.covariate_models.insert(pos, model);
                Ok(self)
            }
        }
    }

    /// Map `source` to its lagged counterpart `lagged`.
    ///
    /// At the end of each interval the engine copies the current value of
    /// `source` into `lagged`, so the next interval's models see the
    /// previous interval's post-prediction state.
    pub fn lag(&mut self, source: &str, lagged: &str) -> Result<&mut Self> {
        if source.is_empty() || lagged.is_empty() {
            return Err(Error::Validation("lag variable names must be non-empty".to_string()));
        }
        if source == lagged {
            return Err(Error::Validation(format!(
                "variable '{source}' cannot lag onto itself"
            )));
        }
        self.lag_map.insert(source.to_string(), lagged.to_string());
        Ok(self)
    }

    /// Register a recode applied at the entry of every interval, before
    /// any model is evaluated (e.g. advancing a time-in-study variable).
    pub fn entry_recode(
        &mut self,
        recode: impl Fn(&mut CovariateState, u32) -> Result<()> + Send + Sync + 'static,
    ) -> &mut Self {
        self.entry_recode = Some(Box::new(recode));
        self
    }

    /// Simulate the synthetic cohort.
    ///
    /// # Errors
    /// Fails before any random draw when the configuration is incomplete:
    /// missing outcome model, missing exposure model under
    /// [`TreatmentPolicy::Natural`], lag variables absent from the
    /// baseline, or undefined variable references in models, policies, or
    /// recodes (surfaced by a dry evaluation pass).
    pub fn simulate(&self, config: &SimulationConfig) -> Result<SimulatedCohort> {
        let t_max = self.validate(config)?;

        // Resampling indices come from an offset generator so subject 0's
        // stream is independent of the index draws.
        let mut index_rng = StdRng::seed_from_u64(config.seed.wrapping_add(0x5A5A_5A5A));
        let draws: Vec<usize> =
            (0..config.n_subjects).map(|_| index_rng.gen_range(0..self.baseline.len())).collect();

        let run = |draws: &[usize]| -> Result<Vec<(Vec<SimulatedInterval>, SubjectStatus)>> {
            draws
                .par_iter()
                .enumerate()
                .map(|(subject, &baseline_idx)| {
                    self.simulate_subject(subject, baseline_idx, t_max, config)
                })
                .collect()
        };

        let per_subject = if config.n_threads == 1 {
            draws
                .iter()
                .enumerate()
                .map(|(subject, &baseline_idx)| {
                    self.simulate_subject(subject, baseline_idx, t_max, config)
                })
                .collect::<Result<Vec<_>>>()?
        } else if config.n_threads == 0 {
            run(&draws)?
        } else {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(config.n_threads)
                .build()
                .map_err(|e| Error::Computation(format!("failed to create thread pool: {e}")))?;
            pool.install(|| run(&draws))?
        };

        let mut rows = Vec::new();
        let mut statuses = Vec::with_capacity(per_subject.len());
        for (subject_rows, status) in per_subject {
            rows.extend(subject_rows);
            statuses.push(status);
        }
        Ok(SimulatedCohort { rows, statuses, t_max })
    }

    /// Check the configuration and run the dry evaluation pass.
    /// Returns the resolved time horizon.
    fn validate(&self, config: &SimulationConfig) -> Result<u32> {
        if config.n_subjects == 0 {
            return Err(Error::Validation("n_subjects must be > 0".to_string()));
        }
        if self.outcome_model.is_none() {
            return Err(Error::Specification(
                "no outcome model registered; call outcome_model() before simulate()".to_string(),
            ));
        }
        if matches!(config.policy, TreatmentPolicy::Natural) && self.exposure_model.is_none() {
            return Err(Error::Specification(
                "the natural-course policy requires a fitted exposure model".to_string(),
            ));
        }
        let t_max = match config.t_max {
            Some(t) => t,
            // Pool is non-empty by construction.
            None => self.baseline.iter().map(|r| r.exit_time).max().unwrap_or(0),
        };
        if t_max == 0 {
            return Err(Error::Validation(
                "time horizon must be at least 1 interval".to_string(),
            ));
        }

        let baseline_state = &self.baseline[0].covariates;
        for (source, lagged) in &self.lag_map {
            let produced = source == &self.exposure
                || self.covariate_models.iter().any(|m| &m.name == source)
                || baseline_state.contains(source);
            if !produced {
                return Err(Error::Specification(format!(
                    "lag source '{source}' is neither a baseline variable, the exposure, nor a \
                     modelled covariate"
                )));
            }
            if !baseline_state.contains(lagged) {
                return Err(Error::Specification(format!(
                    "lag variable '{lagged}' must be present in the baseline state (it is read \
                     before the first interval completes)"
                )));
            }
        }

        self.dry_run(baseline_state.clone(), config)?;
        Ok(t_max)
    }

    /// Evaluate one full interval against the first baseline record with
    /// draws replaced by deterministic level assignments. Surfaces
    /// undefined-variable references and out-of-range predictions before
    /// the simulation consumes randomness.
    fn dry_run(&self, mut state: CovariateState, config: &SimulationConfig) -> Result<()> {
        if let Some(recode) = &self.entry_recode {
            recode(&mut state, 0)
                .map_err(|e| annotate(e, "entry recode"))?;
        }

        let exposure = match &config.policy {
            TreatmentPolicy::All => 1.0,
            TreatmentPolicy::None => 0.0,
            TreatmentPolicy::Natural => {
                // Checked in validate().
                let model = self.exposure_model.as_ref().expect("exposure model present");
                let p = model
                    .predict_probability(&state)
                    .map_err(|e| annotate(e, "exposure model"))?;
                ensure_probability(p, "exposure model")?;
                1.0
            }
            TreatmentPolicy::Custom(policy) => {
                let forced = policy(&state).map_err(|e| annotate(e, "treatment policy"))?;
                f64::from(u8::from(forced))
            }
        };
        state.set(&self.exposure, exposure)?;

        for cm in &self.covariate_models {
            let context = format!("covariate model '{}' (label {})", cm.name, cm.label);
            let pred = cm.model.predict_value(&state).map_err(|e| annotate(e, &context))?;
            let value = match cm.kind {
                VariableKind::Binary => {
                    ensure_probability(pred, &context)?;
                    1.0
                }
                VariableKind::Continuous => pred,
            };
            state.set(&cm.name, value).map_err(|e| annotate(e, &context))?;
            if let Some(recode) = &cm.recode {
                recode(&mut state).map_err(|e| annotate(e, &context))?;
            }
        }

        // Checked in validate().
        let outcome_model = self.outcome_model.as_ref().expect("outcome model present");
        let p = outcome_model
            .predict_probability(&state)
            .map_err(|e| annotate(e, "outcome model"))?;
        ensure_probability(p, "outcome model")?;

        for (source, lagged) in &self.lag_map {
            let value = state.get(source).map_err(|e| annotate(e, "lag update"))?;
            state.set(lagged, value)?;
        }
        Ok(())
    }

    /// Simulate one subject's trajectory.
    fn simulate_subject(
        &self,
        subject: usize,
        baseline_idx: usize,
        t_max: u32,
        config: &SimulationConfig,
    ) -> Result<(Vec<SimulatedInterval>, SubjectStatus)> {
        let record = &self.baseline[baseline_idx];
        let mut state = record.covariates.clone();
        let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(subject as u64));
        let mut rows = Vec::new();

        for t in 0..t_max {
            if let Some(recode) = &self.entry_recode {
                recode(&mut state, t)?;
            }

            let exposure = match &config.policy {
                TreatmentPolicy::All => 1,
                TreatmentPolicy::None => 0,
                TreatmentPolicy::Natural => {
                    // Checked in validate().
                    let model = self.exposure_model.as_ref().expect("exposure model present");
                    let p = model.predict_probability(&state)?;
                    draw_bernoulli(&mut rng, ensure_probability(p, "exposure model")?)?
                }
                TreatmentPolicy::Custom(policy) => u8::from(policy(&state)?),
            };
            state.set(&self.exposure, f64::from(exposure))?;

            for cm in &self.covariate_models {
                let pred = cm.model.predict_value(&state)?;
                let value = match cm.kind {
                    VariableKind::Binary => {
                        let p = ensure_probability(
                            pred,
                            &format!("covariate model '{}'", cm.name),
                        )?;
                        f64::from(draw_bernoulli(&mut rng, p)?)
                    }
                    VariableKind::Continuous => pred,
                };
                state.set(&cm.name, value)?;
                if let Some(recode) = &cm.recode {
                    recode(&mut state)?;
                }
            }

            // Checked in validate().
            let outcome_model = self.outcome_model.as_ref().expect("outcome model present");
            let p_event =
                ensure_probability(outcome_model.predict_probability(&state)?, "outcome model")?;
            let event = draw_bernoulli(&mut rng, p_event)?;

            rows.push(SimulatedInterval {
                subject,
                source_id: record.id,
                t_in: t,
                t_out: t + 1,
                exposure,
                event_probability: p_event,
                event,
                terminal: event == 1,
                covariates: state.clone(),
            });

            if event == 1 {
                return Ok((rows, SubjectStatus::Dead));
            }

            for (source, lagged) in &self.lag_map {
                let value = state.get(source)?;
                state.set(lagged, value)?;
            }
        }

        Ok((rows, SubjectStatus::Censored))
    }
}

#[inline]
fn ensure_probability(p: f64, what: &str) -> Result<f64> {
    if !p.is_finite() || !(0.0..=1.0).contains(&p) {
        return Err(Error::Validation(format!(
            "{what} must predict a probability in [0,1], got {p}"
        )));
    }
    Ok(p)
}

/// Prefix an undefined-variable error with where it was raised, so
/// configuration failures name the offending component.
fn annotate(error: Error, context: &str) -> Error {
    match error {
        Error::UndefinedVariable(name) => {
            Error::UndefinedVariable(format!("'{name}' referenced by {context}"))
        }
        Error::Validation(msg) => Error::Validation(format!("{context}: {msg}")),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ek_core::{ProbabilityFn, ValueFn};

    fn baseline(n: usize) -> Vec<BaselineRecord> {
        (0..n)
            .map(|i| BaselineRecord {
                id: i as u64 + 1,
                exit_time: 3,
                covariates: CovariateState::from_pairs([
                    ("cd4", 350.0),
                    ("lag_art", 0.0),
                    ("t_enter", 0.0),
                ])
                .unwrap(),
            })
            .collect()
    }

    fn engine(n: usize) -> MonteCarloGFormula {
        let mut gf = MonteCarloGFormula::new(baseline(n), "art", "dead").unwrap();
        gf.exposure_model(ProbabilityFn::new(|_s: &CovariateState| Ok(0.5)));
        gf.outcome_model(ProbabilityFn::new(|_s: &CovariateState| Ok(0.1)));
        gf
    }

    fn config(policy: TreatmentPolicy) -> SimulationConfig {
        SimulationConfig { policy, n_subjects: 50, t_max: Some(3), seed: 11, n_threads: 1 }
    }

    #[test]
    fn missing_outcome_model_is_a_specification_error() {
        let mut gf = MonteCarloGFormula::new(baseline(2), "art", "dead").unwrap();
        gf.exposure_model(ProbabilityFn::new(|_s: &CovariateState| Ok(0.5)));
        let err = gf.simulate(&config(TreatmentPolicy::All)).unwrap_err();
        assert!(matches!(err, Error::Specification(_)), "{err:?}");
    }

    #[test]
    fn natural_policy_requires_exposure_model() {
        let mut gf = MonteCarloGFormula::new(baseline(2), "art", "dead").unwrap();
        gf.outcome_model(ProbabilityFn::new(|_s: &CovariateState| Ok(0.1)));
        let err = gf.simulate(&config(TreatmentPolicy::Natural)).unwrap_err();
        assert!(matches!(err, Error::Specification(_)), "{err:?}");
        // Forced policies never consult the exposure model.
        assert!(gf.simulate(&config(TreatmentPolicy::All)).is_ok());
    }

    #[test]
    fn duplicate_labels_are_rejected() {
        let mut gf = engine(2);
        gf.add_covariate_model(
            CovariateModel::new(
                1,
                "cd4",
                VariableKind::Continuous,
                ValueFn::new(|s: &CovariateState| s.get("cd4")),
            )
            .unwrap(),
        )
        .unwrap();
        let err = gf
            .add_covariate_model(
                CovariateModel::new(
                    1,
                    "other",
                    VariableKind::Continuous,
                    ValueFn::new(|s: &CovariateState| s.get("cd4")),
                )
                .unwrap(),
            )
            .unwrap_err();
        assert!(matches!(err, Error::Specification(_)), "{err:?}");
    }

    #[test]
    fn labels_are_evaluated_in_ascending_order_regardless_of_registration() {
        let mut gf = engine(2);
        // Registered out of order: label 2 doubles what label 1 wrote.
        gf.add_covariate_model(
            CovariateModel::new(
                2,
                "twice",
                VariableKind::Continuous,
                ValueFn::new(|s: &CovariateState| Ok(2.0 * s.get("step")?)),
            )
            .unwrap(),
        )
        .unwrap();
        gf.add_covariate_model(
            CovariateModel::new(
                1,
                "step",
                VariableKind::Continuous,
                ValueFn::new(|s: &CovariateState| Ok(s.get("cd4")? - 100.0)),
            )
            .unwrap(),
        )
        .unwrap();
        let cohort = gf.simulate(&config(TreatmentPolicy::None)).unwrap();
        for row in cohort.rows() {
            let step = row.covariates.get("step").unwrap();
            let twice = row.covariates.get("twice").unwrap();
            assert!((twice - 2.0 * step).abs() < 1e-12, "same-interval dependency violated");
        }
    }

    #[test]
    fn undefined_policy_variable_fails_before_simulation() {
        let mut gf = engine(2);
        let cfg = SimulationConfig {
            policy: TreatmentPolicy::Custom(Box::new(|s: &CovariateState| {
                Ok(s.get("no_such_var")? > 0.0)
            })),
            n_subjects: 10,
            t_max: Some(2),
            seed: 1,
            n_threads: 1,
        };
        let err = gf.simulate(&cfg).unwrap_err();
        match err {
            Error::UndefinedVariable(msg) => {
                assert!(msg.contains("no_such_var") && msg.contains("treatment policy"), "{msg}");
            }
            other => panic!("expected UndefinedVariable, got {other:?}"),
        }
    }

    #[test]
    fn lag_variable_must_exist_in_baseline() {
        let mut gf = engine(2);
        gf.lag("art", "missing_lag").unwrap();
        let err = gf.simulate(&config(TreatmentPolicy::All)).unwrap_err();
        assert!(matches!(err, Error::Specification(_)), "{err:?}");
    }

    #[test]
    fn lags_reflect_previous_interval_post_prediction_state() {
        let mut gf = engine(3);
        gf.lag("art", "lag_art").unwrap();
        let cohort = gf.simulate(&config(TreatmentPolicy::All)).unwrap();
        for row in cohort.rows() {
            let lag = row.covariates.get("lag_art").unwrap();
            // Exposure is forced to 1 from t=0, so the lag is 0 at the first
            // interval and 1 afterwards.
            if row.t_in == 0 {
                assert_eq!(lag, 0.0);
            } else {
                assert_eq!(lag, 1.0);
            }
        }
    }

    #[test]
    fn default_horizon_is_pool_maximum_exit_time() {
        let mut pool = baseline(3);
        pool[2].exit_time = 5;
        let mut gf = MonteCarloGFormula::new(pool, "art", "dead").unwrap();
        gf.outcome_model(ProbabilityFn::new(|_s: &CovariateState| Ok(0.0)));
        let cfg = SimulationConfig {
            policy: TreatmentPolicy::None,
            n_subjects: 4,
            t_max: None,
            seed: 3,
            n_threads: 1,
        };
        let cohort = gf.simulate(&cfg).unwrap();
        assert_eq!(cohort.t_max(), 5);
        assert!(cohort.rows().iter().all(|r| r.t_out <= 5));
        // No events: every subject reaches the horizon.
        assert_eq!(cohort.rows().len(), 4 * 5);
        assert!(cohort.statuses().iter().all(|s| *s == SubjectStatus::Censored));
    }

    #[test]
    fn same_seed_reproduces_the_table() {
        let mut gf = engine(5);
        gf.lag("art", "lag_art").unwrap();
        let a = gf.simulate(&config(TreatmentPolicy::Natural)).unwrap();
        let b = gf.simulate(&config(TreatmentPolicy::Natural)).unwrap();
        assert_eq!(a.rows().len(), b.rows().len());
        for (x, y) in a.rows().iter().zip(b.rows()) {
            assert_eq!(x.subject, y.subject);
            assert_eq!(x.exposure, y.exposure);
            assert_eq!(x.event, y.event);
            assert_eq!(x.covariates, y.covariates);
        }
    }

    #[test]
    fn parallel_output_matches_serial() {
        let gf = engine(5);
        let serial = gf.simulate(&config(TreatmentPolicy::Natural)).unwrap();
        let mut cfg = config(TreatmentPolicy::Natural);
        cfg.n_threads = 4;
        let parallel = gf.simulate(&cfg).unwrap();
        assert_eq!(serial.rows().len(), parallel.rows().len());
        for (x, y) in serial.rows().iter().zip(parallel.rows()) {
            assert_eq!((x.subject, x.t_in, x.exposure, x.event), (y.subject, y.t_in, y.exposure, y.event));
        }
    }

    #[test]
    fn event_risk_counts_terminal_subjects() {
        let mut gf = engine(2);
        // Certain event at the first interval.
        gf.outcome_model(ProbabilityFn::new(|_s: &CovariateState| Ok(1.0)));
        let cohort = gf.simulate(&config(TreatmentPolicy::None)).unwrap();
        assert_eq!(cohort.event_risk(), 1.0);
        assert_eq!(cohort.rows().len(), cohort.n_subjects());
        assert!(cohort.rows().iter().all(|r| r.terminal && r.t_in == 0));
    }
}
