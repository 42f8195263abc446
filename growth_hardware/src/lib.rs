//! Simulated bioreactor accessories.
//!
//! A `SimCulture` grows exponentially at a doubling time chosen by the caller
//! and is diluted while the pump runs; its readings land in a data history
//! that answers the host's regression queries. `SimAccessory` stands in for
//! pumps, thermoregulators, lights, gas valves and the stirrer.
pub mod error;
pub mod util;

use std::collections::{BTreeMap, VecDeque};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use growth_traits::{
    Accessory, AccessoryGroup, BoxError, Context, DataHistory, MemoryContext, OdSensor,
    ProtoConfig, RegressionFit, TrendKind, ids,
};

use crate::error::HwError;

/// Simulated actuator with a value range.
#[derive(Debug, Clone)]
pub struct SimAccessory {
    value: Option<f64>,
    min: f64,
    max: f64,
    suspended_until: Option<u64>,
    faulted: bool,
    writes: usize,
}

impl SimAccessory {
    pub fn new(min: f64, max: f64) -> Self {
        Self {
            value: None,
            min,
            max,
            suspended_until: None,
            faulted: false,
            writes: 0,
        }
    }

    /// Peristaltic pump driven in percent of its nominal speed.
    pub fn pump() -> Self {
        Self::new(0.0, 100.0)
    }

    pub fn set_fault(&mut self, faulted: bool) {
        self.faulted = faulted;
    }

    /// Number of accepted set-point writes.
    pub fn writes(&self) -> usize {
        self.writes
    }

    pub fn suspended_until(&self) -> Option<u64> {
        self.suspended_until
    }

    /// Fraction of full range the accessory is currently driven at.
    pub fn duty(&self) -> f64 {
        match self.value {
            Some(v) if self.max > self.min => ((v - self.min) / (self.max - self.min)).clamp(0.0, 1.0),
            _ => 0.0,
        }
    }
}

impl Accessory for SimAccessory {
    fn value(&self) -> Option<f64> {
        self.value
    }

    fn has_error(&self) -> bool {
        self.faulted
    }

    fn set_running_config(&mut self, cfg: ProtoConfig) -> Result<(), BoxError> {
        if self.faulted {
            return Err(Box::new(HwError::Fault("set_running_config".into())));
        }
        match cfg {
            ProtoConfig::Value(v) => {
                if !(self.min..=self.max).contains(&v) {
                    return Err(Box::new(HwError::OutOfRange {
                        value: v,
                        min: self.min,
                        max: self.max,
                    }));
                }
                self.value = Some(v);
            }
            ProtoConfig::On => self.value = Some(self.max),
            ProtoConfig::Off => self.value = None,
        }
        self.writes += 1;
        tracing::trace!(value = ?self.value, "sim accessory set");
        Ok(())
    }

    fn suspend(&mut self, until_s: u64) -> Result<(), BoxError> {
        self.suspended_until = Some(until_s);
        Ok(())
    }

    fn resume(&mut self, _at_s: u64) -> Result<(), BoxError> {
        self.suspended_until = None;
        Ok(())
    }

    fn min(&self) -> f64 {
        self.min
    }

    fn max(&self) -> f64 {
        self.max
    }
}

/// Simulated culture seen through its OD sensor.
#[derive(Debug, Clone)]
pub struct SimCulture {
    od: f64,
    reading: Option<f64>,
    history: VecDeque<(u64, f64)>,
    capacity: usize,
    time_unit_s: f64,
    faulted: bool,
}

impl SimCulture {
    /// `time_unit_s` is the x unit of regression slopes (host: 0.1 s).
    pub fn new(initial_od: f64, time_unit_s: f64) -> Self {
        Self {
            od: initial_od,
            reading: None,
            history: VecDeque::new(),
            capacity: 600,
            time_unit_s,
            faulted: false,
        }
    }

    /// True optical density of the culture.
    pub fn od(&self) -> f64 {
        self.od
    }

    pub fn set_fault(&mut self, faulted: bool) {
        self.faulted = faulted;
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Grow for `dt_s` seconds at `doubling_h` while diluting at `dilution_per_h`.
    pub fn grow(&mut self, dt_s: u64, doubling_h: f64, dilution_per_h: f64) {
        let dt_h = dt_s as f64 / 3600.0;
        let mu = if doubling_h > 0.0 {
            std::f64::consts::LN_2 / doubling_h
        } else {
            0.0
        };
        self.od *= ((mu - dilution_per_h.max(0.0)) * dt_h).exp();
    }

    /// Take a reading of the true OD at experiment time `t_s`.
    pub fn sample(&mut self, t_s: u64) -> f64 {
        let od = self.od;
        self.record(t_s, od);
        od
    }

    /// Record an arbitrary reading (e.g. a spike) at `t_s`.
    pub fn record(&mut self, t_s: u64, reading: f64) {
        self.reading = Some(reading);
        self.history.push_back((t_s, reading));
        while self.history.len() > self.capacity {
            self.history.pop_front();
        }
    }
}

/// Single-sample OD spikes as seen on real turbidity probes.
#[derive(Debug, Clone)]
pub struct SpikeNoise {
    rng: StdRng,
    probability: f64,
    /// Relative spike height, e.g. 0.2 for +-20 %.
    amplitude: f64,
}

impl SpikeNoise {
    pub fn new(seed: u64, probability: f64, amplitude: f64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            probability: probability.clamp(0.0, 1.0),
            amplitude,
        }
    }

    /// The reading, occasionally replaced by a spike.
    pub fn apply(&mut self, od: f64) -> f64 {
        if self.probability > 0.0 && self.rng.gen_bool(self.probability) {
            let sign = if self.rng.r#gen::<bool>() { 1.0 } else { -1.0 };
            od * (1.0 + sign * self.amplitude)
        } else {
            od
        }
    }
}

impl Accessory for SimCulture {
    fn value(&self) -> Option<f64> {
        self.reading
    }

    fn has_error(&self) -> bool {
        self.faulted
    }

    fn set_running_config(&mut self, _cfg: ProtoConfig) -> Result<(), BoxError> {
        Err(Box::new(HwError::Fault("OD sensor has no set point".into())))
    }
}

impl DataHistory for SimCulture {
    fn regression(&self, kind: TrendKind, window: usize) -> Option<RegressionFit> {
        let n = window.min(self.history.len());
        if n < 2 {
            return None;
        }
        let skip = self.history.len() - n;
        let (xs, ys): (Vec<f64>, Vec<f64>) = self
            .history
            .iter()
            .skip(skip)
            .map(|(t, y)| (*t as f64 / self.time_unit_s, *y))
            .unzip();
        match kind {
            TrendKind::Linear => util::fit_linear(&xs, &ys),
            TrendKind::Exponential => util::fit_exponential(&xs, &ys),
        }
    }

    fn set_capacity(&mut self, samples: usize) {
        self.capacity = samples.max(1);
        while self.history.len() > self.capacity {
            self.history.pop_front();
        }
    }
}

/// Accessories of one simulated bioreactor unit.
#[derive(Debug, Clone)]
pub struct SimGroup {
    od_id: String,
    culture: SimCulture,
    accessories: BTreeMap<String, SimAccessory>,
    contexts: BTreeMap<String, MemoryContext>,
}

impl SimGroup {
    /// Group with only the OD sensor (by wavelength).
    pub fn new(od_sensor_nm: u16, culture: SimCulture) -> Self {
        Self {
            od_id: ids::od_sensor(od_sensor_nm).to_string(),
            culture,
            accessories: BTreeMap::new(),
            contexts: BTreeMap::new(),
        }
    }

    /// Group with the thermoregulator, lights, gas mixer, stirrer and O2 probe.
    pub fn with_standard_accessories(od_sensor_nm: u16, culture: SimCulture) -> Self {
        let mut g = Self::new(od_sensor_nm, culture);
        g.insert_accessory(ids::THERMOREGULATOR, SimAccessory::new(10.0, 60.0));
        g.insert_accessory(ids::LIGHT_RED, SimAccessory::new(0.0, 2000.0));
        g.insert_accessory(ids::LIGHT_BLUE, SimAccessory::new(0.0, 2000.0));
        g.insert_accessory(ids::GMS_CO2, SimAccessory::new(0.0, 100.0));
        g.insert_accessory(ids::GMS_AIR, SimAccessory::new(0.0, 2000.0));
        g.insert_accessory(ids::STIRRER, SimAccessory::new(0.0, 100.0));
        g.contexts.insert(ids::O2_PROBE.to_string(), MemoryContext::new());
        g
    }

    pub fn insert_accessory(&mut self, id: &str, accessory: SimAccessory) {
        self.accessories.insert(id.to_string(), accessory);
    }

    pub fn accessory_ref(&self, id: &str) -> Option<&SimAccessory> {
        self.accessories.get(id)
    }

    pub fn accessory_mut(&mut self, id: &str) -> Option<&mut SimAccessory> {
        self.accessories.get_mut(id)
    }

    pub fn culture(&self) -> &SimCulture {
        &self.culture
    }

    pub fn culture_mut(&mut self) -> &mut SimCulture {
        &mut self.culture
    }

    /// Context of a sibling accessory, created on first use.
    pub fn context_mut(&mut self, id: &str) -> &mut MemoryContext {
        self.contexts.entry(id.to_string()).or_default()
    }
}

impl AccessoryGroup for SimGroup {
    fn accessory(&mut self, id: &str) -> Option<&mut dyn Accessory> {
        if id == self.od_id {
            return Some(&mut self.culture);
        }
        self.accessories
            .get_mut(id)
            .map(|a| a as &mut dyn Accessory)
    }

    fn od_sensor(&mut self, id: &str) -> Option<&mut dyn OdSensor> {
        if id == self.od_id {
            Some(&mut self.culture)
        } else {
            None
        }
    }

    fn accessory_context(&self, id: &str) -> Option<&dyn Context> {
        self.contexts.get(id).map(|c| c as &dyn Context)
    }
}
