//! Turbidostat state machine: keeps OD inside a band by driving the
//! dilution pump.

use crate::config::TurbidostatCfg;
use crate::status::PumpCommand;

/// OD band, always ordered `min <= max`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OdBand {
    pub min: f64,
    pub max: f64,
}

impl OdBand {
    /// Build a band, swapping reversed bounds. The flag reports a swap.
    pub fn new(min: f64, max: f64) -> (Self, bool) {
        if min > max {
            (Self { min: max, max: min }, true)
        } else {
            (Self { min, max }, false)
        }
    }

    /// Band scaled by the runtime modifiers `[min·min_mod, max·max_mod]`.
    pub fn modified(self, min_mod: f64, max_mod: f64) -> Self {
        Self::new(self.min * min_mod, self.max * max_mod).0
    }

    /// Upper edge of the slow-down zone.
    pub fn slow_down_edge(self, range_pct: f64) -> f64 {
        self.min + (self.max - self.min) * range_pct / 100.0
    }
}

/// Change requested for the pump on a confirmed OD value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Idle → running at full speed.
    StartDilution,
    /// Keep running at reduced speed.
    SlowDown,
    /// Running → idle.
    StopDilution,
    NoChange,
}

#[derive(Debug, Clone)]
pub struct Turbidostat {
    cfg: TurbidostatCfg,
}

impl Turbidostat {
    pub fn new(cfg: TurbidostatCfg) -> Self {
        Self { cfg }
    }

    pub fn cfg(&self) -> &TurbidostatCfg {
        &self.cfg
    }

    /// Configured band, swap-corrected.
    pub fn band(&self) -> OdBand {
        OdBand::new(self.cfg.od_min, self.cfg.od_max).0
    }

    pub fn transition(&self, od: f64, band: OdBand, running: bool) -> Transition {
        if od > band.max && !running {
            Transition::StartDilution
        } else if od <= band.min && running {
            Transition::StopDilution
        } else if running && od <= band.slow_down_edge(self.cfg.slow_down_range_pct) {
            Transition::SlowDown
        } else {
            Transition::NoChange
        }
    }

    /// Pump command for a transition, given the pump's maximum output.
    pub fn command(&self, t: Transition, pump_max: f64) -> PumpCommand {
        let nominal = pump_max * self.cfg.pump_speed_pct / 100.0;
        match t {
            Transition::StartDilution => PumpCommand::Full(nominal),
            Transition::SlowDown => PumpCommand::Slow(nominal * self.cfg.slow_down_factor_pct / 100.0),
            Transition::StopDilution => PumpCommand::Off,
            Transition::NoChange => PumpCommand::NotInfluenced,
        }
    }
}
