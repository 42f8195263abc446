//! `From` implementations bridging `growth_config` types to `growth_core` types.

use crate::channel::{ParameterChannel, SetPoint};
use crate::config::{
    EvalWindow, GrowthCfg, ParameterCfg, PsoCfg, StabilityCfg, StrategyCfg, SuspensionCfg,
    TurbidostatCfg,
};
use crate::error::BuildError;
use crate::util::hours_to_secs;

// ── TurbidostatCfg ───────────────────────────────────────────────────────────

impl From<&growth_config::TurbidostatCfg> for TurbidostatCfg {
    fn from(c: &growth_config::TurbidostatCfg) -> Self {
        Self {
            od_min: c.od_min,
            od_max: c.od_max,
            od_sensor_nm: c.od_sensor,
            readout_interval_s: c.readout_interval_s,
            pump_speed_pct: c.pump_speed_pct,
            slow_down_range_pct: c.slow_down_range_pct,
            slow_down_factor_pct: c.slow_down_factor_pct,
            noise_ratio: c.noise_ratio,
        }
    }
}

// ── GrowthCfg ────────────────────────────────────────────────────────────────

impl From<&growth_config::GrowthCfg> for GrowthCfg {
    fn from(c: &growth_config::GrowthCfg) -> Self {
        let eval = match (c.eval_fraction, c.eval_delay_s) {
            (_, Some(d)) => EvalWindow::Delay(d),
            (Some(f), None) => EvalWindow::Fraction(f),
            (None, None) => EvalWindow::default(),
        };
        Self {
            r2_min: c.regression_r2_min,
            eval,
            fallback_window: c.fallback_window,
            regression_time_unit_s: c.regression_time_unit_s,
            history_capacity: c.history_capacity,
        }
    }
}

// ── StabilityCfg ─────────────────────────────────────────────────────────────

impl From<&growth_config::StabilityCfg> for StabilityCfg {
    fn from(c: &growth_config::StabilityCfg) -> Self {
        Self {
            analyzed_steps: c.analyzed_steps,
            confidence_max_pct: c.confidence_max_pct,
            trend_max_pct: c.trend_max_pct,
            min_dwell_s: hours_to_secs(c.min_dwell_h),
            max_dwell_s: (c.max_dwell_h > 0.0).then(|| hours_to_secs(c.max_dwell_h)),
        }
    }
}

// ── Parameter channel and strategy ───────────────────────────────────────────

impl From<growth_config::ChannelKind> for ParameterChannel {
    fn from(c: growth_config::ChannelKind) -> Self {
        use growth_config::ChannelKind as K;
        match c {
            K::None => Self::None,
            K::Temperature => Self::Temperature,
            K::LightRed => Self::LightRed,
            K::LightBlue => Self::LightBlue,
            K::Lights => Self::Lights,
            K::Gms => Self::Gms,
            K::GmsCo2 => Self::GmsCo2,
            K::Stirrer => Self::Stirrer,
            K::OdRange => Self::OdRange,
        }
    }
}

impl From<&growth_config::PsoCfg> for PsoCfg {
    fn from(c: &growth_config::PsoCfg) -> Self {
        Self {
            leader: c.leader.clone(),
            neighbors: c.neighbors.clone(),
            search_min: c.search_min.clone(),
            search_max: c.search_max.clone(),
            max_step: c.max_step.clone(),
            initial: c.initial.clone(),
            stale_after_s: c.stale_after_s,
            mail_recipient: c.mail_recipient.clone(),
        }
    }
}

impl TryFrom<&growth_config::Config> for ParameterCfg {
    type Error = eyre::Report;

    fn try_from(c: &growth_config::Config) -> Result<Self, Self::Error> {
        let strategy = match c.parameter.strategy {
            growth_config::Strategy::Sweep => {
                let steps = c
                    .parameter
                    .steps
                    .iter()
                    .map(|s| SetPoint::from_values(&s.values()))
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| {
                        eyre::Report::new(BuildError::InvalidConfig("set points carry one or two values"))
                    })?;
                StrategyCfg::Sweep { steps }
            }
            growth_config::Strategy::Pso => StrategyCfg::Pso(PsoCfg::from(&c.pso)),
        };
        Ok(Self {
            channel: c.parameter.channel.into(),
            strategy,
        })
    }
}

// ── SuspensionCfg ────────────────────────────────────────────────────────────

impl From<&growth_config::SuspensionCfg> for SuspensionCfg {
    fn from(c: &growth_config::SuspensionCfg) -> Self {
        Self {
            enabled: c.enabled,
            o2_probe: c.o2_probe.clone(),
        }
    }
}
