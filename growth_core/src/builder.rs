//! Type-state builder for `GrowthOptimizer`.
//!
//! The builder enforces at compile time that the unit name and the
//! turbidostat band are provided before `build()` is available. `try_build()`
//! is always available for dynamic checks.

use std::marker::PhantomData;
use std::sync::Arc;

use growth_traits::clock::{ExperimentClock, MonotonicExperimentClock};

use crate::averager::SignalAverager;
use crate::channel::ParameterChannel;
use crate::config::*;
use crate::error::{BuildError, Result};
use crate::growth::GrowthRateEstimator;
use crate::optimizer::{GrowthOptimizer, Strategy};
use crate::pso::PsoOptimizer;
use crate::stability::StabilityDetector;
use crate::suspension::SuspensionCoordinator;
use crate::sweep::StepSequencer;
use crate::turbidostat::Turbidostat;
use crate::util::fnv1a64;

// ── Type-state markers ───────────────────────────────────────────────────────

pub struct Missing;
pub struct Set;

/// Builder for `GrowthOptimizer`. All fields are validated on `build()`.
pub struct OptimizerBuilder<U, T> {
    unit: Option<String>,
    turbidostat: Option<TurbidostatCfg>,
    growth: Option<GrowthCfg>,
    stability: Option<StabilityCfg>,
    parameter: Option<ParameterCfg>,
    suspension: Option<SuspensionCfg>,
    clock: Option<Arc<dyn ExperimentClock + Send + Sync>>,
    seed: Option<u64>,
    _u: PhantomData<U>,
    _t: PhantomData<T>,
}

impl Default for OptimizerBuilder<Missing, Missing> {
    fn default() -> Self {
        Self {
            unit: None,
            turbidostat: None,
            growth: None,
            stability: None,
            parameter: None,
            suspension: None,
            clock: None,
            seed: None,
            _u: PhantomData,
            _t: PhantomData,
        }
    }
}

impl GrowthOptimizer {
    /// Start building a GrowthOptimizer.
    pub fn builder() -> OptimizerBuilder<Missing, Missing> {
        OptimizerBuilder::default()
    }
}

fn invalid(msg: &'static str) -> eyre::Report {
    eyre::Report::new(BuildError::InvalidConfig(msg))
}

fn pct_ok(v: f64) -> bool {
    (0.0..=100.0).contains(&v)
}

/// Validate configuration and construct the optimizer.
///
/// Single source of truth for validation, used by `try_build()` and
/// `from_config()`. A reversed OD band is accepted: it is swapped, with a
/// warning, when a unit context is initialized.
#[allow(clippy::too_many_arguments)]
fn validate_and_build(
    unit: String,
    turbidostat: TurbidostatCfg,
    growth: GrowthCfg,
    stability: StabilityCfg,
    parameter: ParameterCfg,
    suspension: SuspensionCfg,
    clock: Option<Arc<dyn ExperimentClock + Send + Sync>>,
    seed: Option<u64>,
) -> Result<GrowthOptimizer> {
    // ── Validation ───────────────────────────────────────────────────────────
    if unit.trim().is_empty() {
        return Err(eyre::Report::new(BuildError::MissingUnit));
    }
    if turbidostat.readout_interval_s == 0 {
        return Err(invalid("readout_interval_s must be >= 1"));
    }
    if !(turbidostat.od_min > 0.0 && turbidostat.od_max > 0.0) {
        return Err(invalid("OD bounds must be > 0"));
    }
    if !(pct_ok(turbidostat.pump_speed_pct)
        && pct_ok(turbidostat.slow_down_range_pct)
        && pct_ok(turbidostat.slow_down_factor_pct))
    {
        return Err(invalid("pump percentages must be in [0, 100]"));
    }
    if !(turbidostat.noise_ratio > 0.0 && turbidostat.noise_ratio < 1.0) {
        return Err(invalid("noise_ratio must be in (0, 1)"));
    }
    if !(0.0..=1.0).contains(&growth.r2_min) {
        return Err(invalid("r2_min must be in [0, 1]"));
    }
    if let EvalWindow::Fraction(f) = growth.eval
        && !(f > 0.0 && f <= 1.0)
    {
        return Err(invalid("eval fraction must be in (0, 1]"));
    }
    if !(growth.regression_time_unit_s > 0.0) {
        return Err(invalid("regression_time_unit_s must be > 0"));
    }
    if stability.analyzed_steps < 2 {
        return Err(invalid("analyzed_steps must be >= 2"));
    }
    let arity = parameter.channel.arity();
    let strategy = match parameter.strategy {
        StrategyCfg::Sweep { steps } => {
            if steps.iter().any(|s| s.arity() != arity) {
                return Err(invalid("set point arity does not match the channel"));
            }
            Strategy::Sweep(StepSequencer::new(steps))
        }
        StrategyCfg::Pso(pso) => {
            if parameter.channel == ParameterChannel::None {
                return Err(invalid("pso needs a parameter channel"));
            }
            if pso.leader.trim().is_empty() {
                return Err(invalid("pso leader must not be empty"));
            }
            if pso.dims() != arity || pso.search_max.len() != arity || pso.max_step.len() != arity {
                return Err(invalid("pso vectors must match the channel arity"));
            }
            let finite = |v: &[f64]| v.iter().all(|x| x.is_finite());
            if !finite(&pso.search_min)
                || !finite(&pso.search_max)
                || !finite(&pso.max_step)
                || pso.initial.as_deref().is_some_and(|v| !finite(v))
            {
                return Err(invalid("pso vectors must be finite"));
            }
            if pso.search_min.iter().zip(&pso.search_max).any(|(lo, hi)| lo > hi) {
                return Err(invalid("pso search_min must be <= search_max"));
            }
            if pso.max_step.iter().any(|s| *s <= 0.0) {
                return Err(invalid("pso max_step must be > 0"));
            }
            Strategy::Pso(PsoOptimizer::new(pso, seed))
        }
    };

    // ── Precompute ───────────────────────────────────────────────────────────
    let fingerprint = format!(
        "{:016x}",
        fnv1a64(
            format!("{unit}|{turbidostat:?}|{growth:?}|{stability:?}|{:?}|{suspension:?}", parameter.channel)
                .as_bytes()
        ) ^ strategy_fingerprint(&strategy)
    );
    let clock: Arc<dyn ExperimentClock + Send + Sync> = match clock {
        Some(c) => c,
        None => Arc::new(MonotonicExperimentClock::new()),
    };

    Ok(GrowthOptimizer {
        unit,
        averager: SignalAverager::new(turbidostat.noise_ratio),
        turbidostat: Turbidostat::new(turbidostat),
        estimator: GrowthRateEstimator::new(growth),
        detector: StabilityDetector::new(stability),
        channel: parameter.channel,
        strategy,
        suspension: SuspensionCoordinator::new(suspension),
        clock,
        fingerprint,
    })
}

fn strategy_fingerprint(strategy: &Strategy) -> u64 {
    let text = match strategy {
        Strategy::Sweep(seq) => format!("sweep{:?}", seq.steps()),
        Strategy::Pso(pso) => format!("pso{:?}", pso.cfg()),
    };
    fnv1a64(text.as_bytes())
}

impl<U, T> OptimizerBuilder<U, T> {
    /// Fallible build available in any type-state; returns detailed error for missing pieces.
    pub fn try_build(self) -> Result<GrowthOptimizer> {
        let unit = self
            .unit
            .ok_or_else(|| eyre::Report::new(BuildError::MissingUnit))?;
        let turbidostat = self
            .turbidostat
            .ok_or_else(|| eyre::Report::new(BuildError::MissingTurbidostat))?;
        validate_and_build(
            unit,
            turbidostat,
            self.growth.unwrap_or_default(),
            self.stability.unwrap_or_default(),
            self.parameter.unwrap_or_default(),
            self.suspension.unwrap_or_default(),
            self.clock,
            self.seed,
        )
    }
}

/// Chainable setters that do not affect type-state.
impl<U, T> OptimizerBuilder<U, T> {
    pub fn with_growth(mut self, growth: GrowthCfg) -> Self {
        self.growth = Some(growth);
        self
    }
    pub fn with_stability(mut self, stability: StabilityCfg) -> Self {
        self.stability = Some(stability);
        self
    }
    pub fn with_parameter(mut self, parameter: ParameterCfg) -> Self {
        self.parameter = Some(parameter);
        self
    }
    pub fn with_suspension(mut self, suspension: SuspensionCfg) -> Self {
        self.suspension = Some(suspension);
        self
    }
    /// Provide the experiment clock; defaults to `MonotonicExperimentClock`.
    pub fn with_clock(mut self, clock: Arc<dyn ExperimentClock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }
    /// Seed the swarm optimizer's random numbers.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

// Setters that advance type-state
impl<T> OptimizerBuilder<Missing, T> {
    pub fn with_unit(self, unit: impl Into<String>) -> OptimizerBuilder<Set, T> {
        OptimizerBuilder {
            unit: Some(unit.into()),
            turbidostat: self.turbidostat,
            growth: self.growth,
            stability: self.stability,
            parameter: self.parameter,
            suspension: self.suspension,
            clock: self.clock,
            seed: self.seed,
            _u: PhantomData,
            _t: PhantomData,
        }
    }
}

impl<U> OptimizerBuilder<U, Missing> {
    pub fn with_turbidostat(self, turbidostat: TurbidostatCfg) -> OptimizerBuilder<U, Set> {
        OptimizerBuilder {
            unit: self.unit,
            turbidostat: Some(turbidostat),
            growth: self.growth,
            stability: self.stability,
            parameter: self.parameter,
            suspension: self.suspension,
            clock: self.clock,
            seed: self.seed,
            _u: PhantomData,
            _t: PhantomData,
        }
    }
}

impl OptimizerBuilder<Set, Set> {
    /// Validate and build. Only available when unit and turbidostat are set.
    pub fn build(self) -> Result<GrowthOptimizer> {
        self.try_build()
    }
}

/// Build an optimizer from a validated TOML configuration.
pub fn from_config(
    cfg: &growth_config::Config,
    clock: Option<Arc<dyn ExperimentClock + Send + Sync>>,
) -> Result<GrowthOptimizer> {
    from_config_as(cfg, &cfg.unit.name, clock)
}

/// Like `from_config`, for a unit other than `[unit].name` (simulated swarms
/// share one configuration).
pub fn from_config_as(
    cfg: &growth_config::Config,
    unit: &str,
    clock: Option<Arc<dyn ExperimentClock + Send + Sync>>,
) -> Result<GrowthOptimizer> {
    let parameter = ParameterCfg::try_from(cfg)?;
    validate_and_build(
        unit.to_string(),
        TurbidostatCfg::from(&cfg.turbidostat),
        GrowthCfg::from(&cfg.growth),
        StabilityCfg::from(&cfg.stability),
        parameter,
        SuspensionCfg::from(&cfg.suspension),
        clock,
        cfg.pso.seed.map(|s| s ^ crate::util::fnv1a64(unit.as_bytes())),
    )
}
