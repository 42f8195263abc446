//! Boundary traits between the growth optimizer and its host.
//!
//! Everything the engine touches outside its own logic goes through these
//! traits: accessories (sensors and actuators), the OD data history with its
//! regression primitive, the per-unit key-value context, the peer directory
//! used to reach other bioreactor units, and the experiment journal.
pub mod clock;
pub mod context;

pub use clock::{ExperimentClock, ManualClock, MonotonicExperimentClock};
pub use context::{Context, ContextValue, MemoryContext};

/// Error type used at every trait boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Running configuration pushed into an accessory's native protocol.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProtoConfig {
    /// Drive the accessory at the given set point (accessory units).
    Value(f64),
    On,
    Off,
}

/// A host accessory: a sensor, an actuator, or both.
pub trait Accessory {
    /// Current value; `None` when the accessory reports NaN / nothing.
    fn value(&self) -> Option<f64>;
    fn has_error(&self) -> bool {
        false
    }
    fn set_running_config(&mut self, cfg: ProtoConfig) -> Result<(), BoxError>;
    /// Suspend the accessory's native protocol until the given experiment second.
    ///
    /// `suspend` and `resume` are host surface for the O2 evolution
    /// measurement, which pauses the pump's own protocol; the optimizer only
    /// yields to it through the probe context.
    fn suspend(&mut self, _until_s: u64) -> Result<(), BoxError> {
        Ok(())
    }
    /// Resume the accessory's native protocol at the given experiment second.
    fn resume(&mut self, _at_s: u64) -> Result<(), BoxError> {
        Ok(())
    }
    fn min(&self) -> f64 {
        0.0
    }
    fn max(&self) -> f64 {
        100.0
    }
}

/// Regression model supported by the host data history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendKind {
    /// y = a + b·x
    Linear,
    /// y = a·e^(b·x)
    Exponential,
}

/// Result of a regression over the trailing window of a data history.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegressionFit {
    pub intercept: f64,
    pub slope: f64,
    /// Coefficient of determination of the fit.
    pub r_squared: f64,
}

/// Recorded time series of a sensor.
pub trait DataHistory {
    /// Fit the last `window` samples. `None` when not enough data is recorded.
    fn regression(&self, kind: TrendKind, window: usize) -> Option<RegressionFit>;
    fn set_capacity(&mut self, _samples: usize) {}
}

/// An OD sensor is an accessory with a recorded history.
pub trait OdSensor: Accessory + DataHistory {}
impl<T: Accessory + DataHistory> OdSensor for T {}

/// Accessories of one bioreactor unit, addressed by host id
/// (e.g. `thermo.thermo-reg`, `pwm.stirrer`).
pub trait AccessoryGroup {
    fn accessory(&mut self, id: &str) -> Option<&mut dyn Accessory>;
    fn od_sensor(&mut self, id: &str) -> Option<&mut dyn OdSensor>;
    /// Context of a sibling accessory (e.g. the O2 probe's measurement flags).
    fn accessory_context(&self, id: &str) -> Option<&dyn Context>;
}

/// Reaches the pump contexts of other bioreactor units by unit name.
///
/// Lookups never block; an unreachable peer is simply `None`.
pub trait PeerDirectory {
    fn peer_context(&self, unit: &str) -> Option<&dyn Context>;
    fn peer_context_mut(&mut self, unit: &str) -> Option<&mut dyn Context>;
}

/// A directory with no reachable peers.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPeers;

impl PeerDirectory for NoPeers {
    fn peer_context(&self, _unit: &str) -> Option<&dyn Context> {
        None
    }
    fn peer_context_mut(&mut self, _unit: &str) -> Option<&mut dyn Context> {
        None
    }
}

/// Experiment event log and notifier. Fire-and-forget.
pub trait Journal {
    fn add_event(&self, text: &str);
    fn send_mail(&self, subject: &str, recipient: &str, body: &str);
}

/// Host accessory ids of a bioreactor unit.
pub mod ids {
    pub const THERMOREGULATOR: &str = "thermo.thermo-reg";
    pub const LIGHT_RED: &str = "actinic-lights.light-Red";
    pub const LIGHT_BLUE: &str = "actinic-lights.light-Blue";
    /// CO2 valve of the gas mixing system
    pub const GMS_CO2: &str = "gas-mixer.valve-0-reg";
    /// Air valve of the gas mixing system
    pub const GMS_AIR: &str = "gas-mixer.valve-1-reg";
    pub const STIRRER: &str = "pwm.stirrer";
    pub const O2_PROBE: &str = "probes.o2";

    /// Id of the OD sensor for a wavelength in nm; unknown wavelengths fall back to 680.
    pub fn od_sensor(nm: u16) -> &'static str {
        match nm {
            720 => "od-sensors.od-720",
            735 => "od-sensors.od-735",
            _ => "od-sensors.od-680",
        }
    }
}
