//! Parameter controller: applies a set point to one environmental channel.
//!
//! Exactly one channel is active per unit. Each channel knows which host
//! accessories it drives, how many values its set point carries, and how to
//! describe an applied set point for the experiment journal.

use eyre::WrapErr;
use growth_traits::{AccessoryGroup, ProtoConfig, ids};

use crate::error::{OptimizerError, Result};
use crate::hw_error::map_hw_error;
use crate::turbidostat::OdBand;
use crate::util::round_to;

/// A set point: one value or a small pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SetPoint {
    Scalar(f64),
    Pair(f64, f64),
}

impl SetPoint {
    /// Build from a value slice of length 1 or 2.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        match *values {
            [a] => Some(Self::Scalar(a)),
            [a, b] => Some(Self::Pair(a, b)),
            _ => None,
        }
    }

    pub fn values(&self) -> Vec<f64> {
        match *self {
            Self::Scalar(a) => vec![a],
            Self::Pair(a, b) => vec![a, b],
        }
    }

    pub fn arity(&self) -> usize {
        match self {
            Self::Scalar(_) => 1,
            Self::Pair(..) => 2,
        }
    }

    fn joined(&self) -> String {
        match *self {
            Self::Scalar(a) => fmt_num(a),
            Self::Pair(a, b) => format!("{} and {}", fmt_num(a), fmt_num(b)),
        }
    }
}

fn fmt_num(v: f64) -> String {
    format!("{}", round_to(v, 2))
}

/// Environmental channel driven by the optimizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParameterChannel {
    #[default]
    None,
    Temperature,
    LightRed,
    /// Blue (or white) actinic light.
    LightBlue,
    /// Red and blue lights as a pair.
    Lights,
    /// Gas mixing as (air, CO2) flows.
    Gms,
    /// CO2 flow only.
    GmsCo2,
    Stirrer,
    /// The turbidostat OD band itself, as (min, max).
    OdRange,
}

/// Outcome of applying a set point.
#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    /// Human-readable set point, e.g. "temperature 30 °C".
    pub description: String,
    /// Journal line announcing the change.
    pub event: String,
    /// New OD band when the channel is `OdRange`.
    pub od_band: Option<OdBand>,
}

impl ParameterChannel {
    pub fn arity(self) -> usize {
        match self {
            Self::None => 0,
            Self::Temperature | Self::LightRed | Self::LightBlue | Self::GmsCo2 | Self::Stirrer => 1,
            Self::Lights | Self::Gms | Self::OdRange => 2,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Temperature => "temperature",
            Self::LightRed => "light-red",
            Self::LightBlue => "light-blue",
            Self::Lights => "lights",
            Self::Gms => "GMS",
            Self::GmsCo2 => "GMS-CO2",
            Self::Stirrer => "stirrer",
            Self::OdRange => "ODRange",
        }
    }

    fn unit(self) -> &'static str {
        match self {
            Self::Temperature => " °C",
            Self::LightRed | Self::LightBlue | Self::Lights => " uE",
            Self::Gms | Self::GmsCo2 => " ml/min",
            Self::Stirrer => "%",
            Self::None | Self::OdRange => "",
        }
    }

    /// Native host protocols that must be disabled for this channel to work.
    /// Reported as journal events at initialization, not enforced.
    pub fn preconditions(self) -> Vec<String> {
        let protocols: &[&str] = match self {
            Self::None | Self::OdRange => &[],
            Self::Temperature => &["Thermoregulation"],
            Self::LightRed | Self::LightBlue | Self::Lights => &["Lights"],
            Self::Gms | Self::GmsCo2 => &["GMS"],
            Self::Stirrer => &["Stirrer"],
        };
        protocols
            .iter()
            .map(|p| format!("The native \"{p}\" protocol has to be disabled for {} control", self.label()))
            .collect()
    }

    /// Write `value` to the channel's accessories.
    ///
    /// `None` is a no-op returning `Ok(None)`. An arity mismatch or a missing
    /// accessory is an error; nothing is written in that case.
    pub fn apply(self, value: &SetPoint, group: &mut dyn AccessoryGroup) -> Result<Option<Applied>> {
        if self == Self::None {
            return Ok(None);
        }
        if value.arity() != self.arity() {
            return Err(eyre::Report::new(OptimizerError::Channel(format!(
                "{} expects {} value(s), got {}",
                self.label(),
                self.arity(),
                value.arity()
            ))));
        }

        let mut extra = String::new();
        let mut od_band = None;
        match (self, *value) {
            (Self::Temperature, SetPoint::Scalar(t)) => set(group, ids::THERMOREGULATOR, t)?,
            (Self::LightRed, SetPoint::Scalar(i)) => set(group, ids::LIGHT_RED, i)?,
            (Self::LightBlue, SetPoint::Scalar(i)) => set(group, ids::LIGHT_BLUE, i)?,
            (Self::Lights, SetPoint::Pair(red, blue)) => {
                set(group, ids::LIGHT_RED, red)?;
                set(group, ids::LIGHT_BLUE, blue)?;
            }
            (Self::Gms, SetPoint::Pair(air, co2)) => {
                set(group, ids::GMS_AIR, air)?;
                set(group, ids::GMS_CO2, co2)?;
                extra = format!(" ({}% CO2)", round_to(co2_percent(air, co2), 1));
            }
            (Self::GmsCo2, SetPoint::Scalar(co2)) => set(group, ids::GMS_CO2, co2)?,
            (Self::Stirrer, SetPoint::Scalar(pct)) => set(group, ids::STIRRER, pct)?,
            (Self::OdRange, SetPoint::Pair(min, max)) => {
                od_band = Some(OdBand::new(min, max).0);
            }
            _ => {
                return Err(eyre::Report::new(OptimizerError::Channel(format!(
                    "unsupported set point {value:?} for {}",
                    self.label()
                ))));
            }
        }

        let shown = format!("{}{}{extra}", value.joined(), self.unit());
        let label = self.label();
        let mut capitalized = label.to_string();
        if let Some(first) = capitalized.get_mut(0..1) {
            first.make_ascii_uppercase();
        }
        tracing::info!(channel = label, value = ?value, "set point applied");
        Ok(Some(Applied {
            description: format!("{label} {shown}"),
            event: format!("{capitalized} changed to {shown}"),
            od_band,
        }))
    }
}

/// CO2 share of the gas mix in percent, including ambient CO2 in the air.
pub fn co2_percent(air: f64, co2: f64) -> f64 {
    let total = air + co2;
    if total <= 0.0 {
        return 0.0;
    }
    (co2 / total + 400.0 / 1e6) * 100.0
}

fn set(group: &mut dyn AccessoryGroup, id: &str, value: f64) -> Result<()> {
    let accessory = group
        .accessory(id)
        .ok_or_else(|| eyre::Report::new(OptimizerError::Channel(format!("accessory {id} not present"))))?;
    accessory
        .set_running_config(ProtoConfig::Value(value))
        .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
        .wrap_err_with(|| format!("setting {id}"))
}
