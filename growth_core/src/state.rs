//! Typed view over a unit's persistent context.
//!
//! Every field is read with a default and written back at the end of a
//! successful cycle. The context stays the source of truth between cycles;
//! `UnitState` only lives for one invocation.

use std::fmt;
use std::str::FromStr;

use growth_traits::{Context, ContextValue};

use crate::averager::AveragerState;
use crate::error::{OptimizerError, Result};
use crate::growth::GrowthSeries;
use crate::pso::{NeighborReport, Particle};
use crate::turbidostat::OdBand;

pub mod keys {
    pub const OD_LAST: &str = "odLast";
    pub const OD_NOISE_FLAG: &str = "odNoiseFlag";
    pub const PHASE: &str = "phase";
    pub const MODE_DILUTION: &str = "modeDilution";
    pub const MODE_STABILIZED: &str = "modeStabilized";
    pub const LAST_PUMP_STOP: &str = "lastPumpStop";
    pub const STEP_COUNTER: &str = "stepCounter";
    pub const STEP_START_TIME: &str = "stepStartTime";
    pub const STEP_ELAPSED: &str = "stepElapsed";
    pub const STEP_DOUBLING_TIME: &str = "stepDoublingTime";
    pub const STABILIZED_TIME: &str = "stabilizedTime";
    pub const STABILIZED_TIME_MAX: &str = "stabilizedTimeMax";
    pub const CHANGE_COUNTER: &str = "changeCounter";
    pub const PARAMETER_TEXT: &str = "controlledParameterText";
    pub const PUMP_SUSPENDED: &str = "pumpSuspended";
    pub const OD_BAND_MIN: &str = "odBandMin";
    pub const OD_BAND_MAX: &str = "odBandMax";
    pub const OD_MIN_MODIFIER: &str = "odMinModifier";
    pub const OD_MAX_MODIFIER: &str = "odMaxModifier";
    pub const INITIALIZED: &str = "initialized";
    pub const CONFIG_FINGERPRINT: &str = "configFingerprint";
}

/// Named control phase of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// No dilution seen since initialization.
    #[default]
    Idle,
    /// Pump running, OD coming down to the lower bound.
    Diluting,
    /// Pump off, culture growing; the next dilution closes the step.
    MeasuringStep,
    /// Stability declared for the current set point.
    Stabilized,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Diluting => "diluting",
            Self::MeasuringStep => "measuring-step",
            Self::Stabilized => "stabilized",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = OptimizerError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "idle" => Ok(Self::Idle),
            "diluting" => Ok(Self::Diluting),
            "measuring-step" => Ok(Self::MeasuringStep),
            "stabilized" => Ok(Self::Stabilized),
            other => Err(OptimizerError::Context(format!("unknown phase '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnitState {
    pub averager: AveragerState,
    pub phase: Phase,
    pub mode_dilution: bool,
    pub last_pump_stop: Option<u64>,
    pub step_counter: u64,
    pub series: GrowthSeries,
    /// Earliest declaration time; `None` until a series opens.
    pub stabilized_time: Option<u64>,
    /// Forced-advance deadline of the open series.
    pub stabilized_time_max: Option<u64>,
    pub change_counter: u64,
    pub parameter_text: String,
    pub pump_suspended: bool,
    /// OD band set through the `OdRange` channel, overriding the configured one.
    pub od_band: Option<OdBand>,
    pub particle: Option<Particle>,
    pub report: Option<NeighborReport>,
}

impl UnitState {
    /// Fresh state for a ring of `analyzed_steps`.
    pub fn new(analyzed_steps: usize) -> Self {
        Self {
            averager: AveragerState::default(),
            phase: Phase::Idle,
            mode_dilution: false,
            last_pump_stop: None,
            step_counter: 0,
            series: GrowthSeries::new(analyzed_steps),
            stabilized_time: None,
            stabilized_time_max: None,
            change_counter: 0,
            parameter_text: String::new(),
            pump_suspended: false,
            od_band: None,
            particle: None,
            report: None,
        }
    }

    pub fn load(ctx: &dyn Context, analyzed_steps: usize, pso_dims: usize) -> Result<Self> {
        let phase = match ctx.get(keys::PHASE) {
            Some(ContextValue::Text(s)) => s.parse::<Phase>().map_err(eyre::Report::new)?,
            _ => Phase::Idle,
        };
        let od_band = match (ctx.get(keys::OD_BAND_MIN), ctx.get(keys::OD_BAND_MAX)) {
            (Some(_), Some(_)) => Some(
                OdBand::new(ctx.get_f64(keys::OD_BAND_MIN, 0.0), ctx.get_f64(keys::OD_BAND_MAX, 0.0)).0,
            ),
            _ => None,
        };
        let (particle, report) = if pso_dims > 0 {
            (Particle::load(ctx, pso_dims), NeighborReport::load(ctx, pso_dims))
        } else {
            (None, None)
        };
        Ok(Self {
            averager: AveragerState {
                od_last: ctx.get_f64(keys::OD_LAST, 0.0),
                noise_flag: ctx.get_bool(keys::OD_NOISE_FLAG, true),
            },
            phase,
            mode_dilution: ctx.get_bool(keys::MODE_DILUTION, false),
            last_pump_stop: read_time(ctx, keys::LAST_PUMP_STOP),
            step_counter: read_time(ctx, keys::STEP_COUNTER).unwrap_or(0),
            series: GrowthSeries::from_parts(
                analyzed_steps,
                &ctx.get_list(keys::STEP_START_TIME),
                &ctx.get_list(keys::STEP_ELAPSED),
                &ctx.get_list(keys::STEP_DOUBLING_TIME),
            ),
            stabilized_time: read_time(ctx, keys::STABILIZED_TIME),
            stabilized_time_max: read_time(ctx, keys::STABILIZED_TIME_MAX),
            change_counter: read_time(ctx, keys::CHANGE_COUNTER).unwrap_or(0),
            parameter_text: ctx.get_string(keys::PARAMETER_TEXT, ""),
            pump_suspended: ctx.get_bool(keys::PUMP_SUSPENDED, false),
            od_band,
            particle,
            report,
        })
    }

    pub fn store(&self, ctx: &mut dyn Context) {
        ctx.put(keys::OD_LAST, self.averager.od_last.into());
        ctx.put(keys::OD_NOISE_FLAG, self.averager.noise_flag.into());
        ctx.put(keys::PHASE, self.phase.as_str().into());
        ctx.put(keys::MODE_DILUTION, self.mode_dilution.into());
        ctx.put(keys::MODE_STABILIZED, self.mode_stabilized().into());
        write_time(ctx, keys::LAST_PUMP_STOP, self.last_pump_stop);
        ctx.put(keys::STEP_COUNTER, self.step_counter.into());
        ctx.put(keys::STEP_START_TIME, self.series.start_times().into());
        ctx.put(keys::STEP_ELAPSED, self.series.elapsed().into());
        ctx.put(keys::STEP_DOUBLING_TIME, self.series.doubling_times().into());
        write_time(ctx, keys::STABILIZED_TIME, self.stabilized_time);
        write_time(ctx, keys::STABILIZED_TIME_MAX, self.stabilized_time_max);
        ctx.put(keys::CHANGE_COUNTER, self.change_counter.into());
        ctx.put(keys::PARAMETER_TEXT, self.parameter_text.as_str().into());
        ctx.put(keys::PUMP_SUSPENDED, self.pump_suspended.into());
        match self.od_band {
            Some(b) => {
                ctx.put(keys::OD_BAND_MIN, b.min.into());
                ctx.put(keys::OD_BAND_MAX, b.max.into());
            }
            None => {
                ctx.remove(keys::OD_BAND_MIN);
                ctx.remove(keys::OD_BAND_MAX);
            }
        }
        if let Some(p) = &self.particle {
            p.store(ctx);
        }
        if let Some(r) = &self.report {
            r.store(ctx);
        }
    }

    pub fn mode_stabilized(&self) -> bool {
        self.phase == Phase::Stabilized
    }

    /// Drop the growth series after a declaration or a forced advance.
    pub fn reset_series(&mut self) {
        self.series.clear();
        self.step_counter = 0;
        self.stabilized_time = None;
        self.stabilized_time_max = None;
    }
}

/// Runtime OD band modifiers published by collaborators, 1.0 when absent.
pub fn band_modifiers(ctx: &dyn Context) -> (f64, f64) {
    (
        ctx.get_f64(keys::OD_MIN_MODIFIER, 1.0),
        ctx.get_f64(keys::OD_MAX_MODIFIER, 1.0),
    )
}

fn read_time(ctx: &dyn Context, key: &str) -> Option<u64> {
    match ctx.get(key) {
        Some(ContextValue::Int(v)) if v >= 0 => Some(v as u64),
        Some(ContextValue::Float(v)) if v.is_finite() && v >= 0.0 => Some(v as u64),
        _ => None,
    }
}

fn write_time(ctx: &mut dyn Context, key: &str, value: Option<u64>) {
    match value {
        Some(v) => ctx.put(key, v.into()),
        None => ctx.remove(key),
    }
}
