//! Configuration types for the growth optimizer engine.
//!
//! These are the runtime configuration structs used by `GrowthOptimizer`.
//! They are separate from the TOML-deserialized config in `growth_config`.

use crate::channel::{ParameterChannel, SetPoint};

/// Turbidostat band and pump behavior.
#[derive(Debug, Clone)]
pub struct TurbidostatCfg {
    /// Lower bound of the OD band; dilution stops at or below it.
    pub od_min: f64,
    /// Upper bound of the OD band; dilution starts above it.
    pub od_max: f64,
    /// OD sensor wavelength in nm (680, 720, 735).
    pub od_sensor_nm: u16,
    /// How often OD is read; also the invocation period.
    pub readout_interval_s: u64,
    /// Nominal pump speed in percent of the pump maximum.
    pub pump_speed_pct: f64,
    /// Lower part of the band (percent) where the pump slows down.
    pub slow_down_range_pct: f64,
    /// Slow-down speed in percent of the nominal speed.
    pub slow_down_factor_pct: f64,
    /// Max relative change between readings accepted by the averager.
    pub noise_ratio: f64,
}

impl Default for TurbidostatCfg {
    fn default() -> Self {
        Self {
            od_min: 0.48,
            od_max: 0.52,
            od_sensor_nm: 680,
            readout_interval_s: 60,
            pump_speed_pct: 100.0,
            slow_down_range_pct: 25.0,
            slow_down_factor_pct: 50.0,
            noise_ratio: 0.04,
        }
    }
}

/// Part of a growth step fed to the regression.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EvalWindow {
    /// Trailing fraction of the step, in (0, 1].
    Fraction(f64),
    /// Drop this many seconds after the pump stop.
    Delay(u64),
}

impl Default for EvalWindow {
    fn default() -> Self {
        Self::Fraction(2.0 / 3.0)
    }
}

#[derive(Debug, Clone)]
pub struct GrowthCfg {
    /// Minimal coefficient of determination of an accepted fit.
    pub r2_min: f64,
    pub eval: EvalWindow,
    /// Window used when the step is too short to size one.
    pub fallback_window: usize,
    /// Time unit of the host regression slope, in seconds.
    pub regression_time_unit_s: f64,
    /// OD data-history capacity set when a series opens.
    pub history_capacity: usize,
}

impl Default for GrowthCfg {
    fn default() -> Self {
        Self {
            r2_min: 0.75,
            eval: EvalWindow::default(),
            fallback_window: 60,
            regression_time_unit_s: 0.1,
            history_capacity: 600,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StabilityCfg {
    pub analyzed_steps: usize,
    pub confidence_max_pct: f64,
    pub trend_max_pct: f64,
    pub min_dwell_s: u64,
    /// Forced advance after this long without stability; `None` disables.
    pub max_dwell_s: Option<u64>,
}

impl Default for StabilityCfg {
    fn default() -> Self {
        Self {
            analyzed_steps: 6,
            confidence_max_pct: 3.0,
            trend_max_pct: 1.0,
            min_dwell_s: 12 * 3600,
            max_dwell_s: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PsoCfg {
    pub leader: String,
    pub neighbors: Vec<String>,
    pub search_min: Vec<f64>,
    pub search_max: Vec<f64>,
    pub max_step: Vec<f64>,
    pub initial: Option<Vec<f64>>,
    pub stale_after_s: u64,
    pub mail_recipient: String,
}

impl PsoCfg {
    pub fn dims(&self) -> usize {
        self.search_min.len()
    }
}

/// How the next set point is chosen once growth is stable.
#[derive(Debug, Clone)]
pub enum StrategyCfg {
    Sweep { steps: Vec<SetPoint> },
    Pso(PsoCfg),
}

impl Default for StrategyCfg {
    fn default() -> Self {
        Self::Sweep { steps: Vec::new() }
    }
}

#[derive(Debug, Clone)]
pub struct ParameterCfg {
    pub channel: ParameterChannel,
    pub strategy: StrategyCfg,
}

impl Default for ParameterCfg {
    fn default() -> Self {
        Self {
            channel: ParameterChannel::None,
            strategy: StrategyCfg::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SuspensionCfg {
    pub enabled: bool,
    /// Accessory whose context publishes the O2 measurement flag.
    pub o2_probe: String,
}

impl Default for SuspensionCfg {
    fn default() -> Self {
        Self {
            enabled: true,
            o2_probe: growth_traits::ids::O2_PROBE.to_string(),
        }
    }
}
