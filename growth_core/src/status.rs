//! Result of one invocation of the control script.

use growth_traits::ProtoConfig;
use serde::Serialize;

/// Pump command for this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "kebab-case")]
pub enum PumpCommand {
    /// Dilution at nominal speed.
    Full(f64),
    /// Dilution slowed down near the lower bound of the band.
    Slow(f64),
    Off,
    /// Forced to the pump minimum while an O2 measurement runs.
    Suspended(f64),
    /// Leave the pump as it is; distinct from `Off`.
    NotInfluenced,
}

impl PumpCommand {
    /// Protocol config to hand to the host pump; `None` for "not influenced".
    pub fn proto_config(self) -> Option<ProtoConfig> {
        match self {
            Self::Full(v) | Self::Slow(v) | Self::Suspended(v) => Some(ProtoConfig::Value(v)),
            Self::Off => Some(ProtoConfig::Off),
            Self::NotInfluenced => None,
        }
    }
}

/// What the host gets back from every invocation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Invocation {
    /// Seconds until the next invocation.
    pub delay_s: u64,
    pub pump: PumpCommand,
}
