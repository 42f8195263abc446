#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas and OD trace parsing for the growth optimizer.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - The OD trace CSV loader enforces headers and time ordering; traces feed
//!   the `replay` command.
use serde::Deserialize;

/// OD trace CSV schema.
///
/// Expected headers:
/// time_s,od
///
/// Example:
/// time_s,od
/// 0,0.412
/// 60,0.415
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct OdSample {
    pub time_s: u64,
    pub od: f64,
}

#[derive(Debug, Deserialize)]
pub struct UnitCfg {
    /// Unit id used by peers to reach this unit's context.
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TurbidostatCfg {
    pub od_min: f64,
    pub od_max: f64,
    /// OD sensor wavelength in nm: 680, 720 or 735
    pub od_sensor: u16,
    pub readout_interval_s: u64,
    pub pump_speed_pct: f64,
    /// Lower part of the band (percent) where the pump slows down
    pub slow_down_range_pct: f64,
    /// Slow-down speed as percent of the nominal speed
    pub slow_down_factor_pct: f64,
    /// Max relative jump accepted by the OD averager
    pub noise_ratio: f64,
}

impl Default for TurbidostatCfg {
    fn default() -> Self {
        Self {
            od_min: 0.48,
            od_max: 0.52,
            od_sensor: 680,
            readout_interval_s: 60,
            pump_speed_pct: 100.0,
            slow_down_range_pct: 25.0,
            slow_down_factor_pct: 50.0,
            noise_ratio: 0.04,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GrowthCfg {
    /// Fits with a lower coefficient of determination are discarded
    pub regression_r2_min: f64,
    /// Trailing fraction of the step used for the fit
    pub eval_fraction: Option<f64>,
    /// Alternatively: seconds after the pump stop excluded from the fit
    pub eval_delay_s: Option<u64>,
    /// Window used when the step is too short to size one
    pub fallback_window: usize,
    /// Time unit of the host regression slope, in seconds
    pub regression_time_unit_s: f64,
    /// Samples retained by the OD data history
    pub history_capacity: usize,
}

impl Default for GrowthCfg {
    fn default() -> Self {
        Self {
            regression_r2_min: 0.75,
            eval_fraction: None,
            eval_delay_s: None,
            fallback_window: 60,
            regression_time_unit_s: 0.1,
            history_capacity: 600,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StabilityCfg {
    pub analyzed_steps: usize,
    /// Max CI95 half-width in percent of the mean doubling time
    pub confidence_max_pct: f64,
    /// Max |trend| in percent of the mean doubling time
    pub trend_max_pct: f64,
    /// Minimal duration of a characterization step (hours)
    pub min_dwell_h: f64,
    /// Forced advance after this many hours; 0 disables
    pub max_dwell_h: f64,
}

impl Default for StabilityCfg {
    fn default() -> Self {
        Self {
            analyzed_steps: 6,
            confidence_max_pct: 3.0,
            trend_max_pct: 1.0,
            min_dwell_h: 12.0,
            max_dwell_h: 0.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ChannelKind {
    #[default]
    None,
    Temperature,
    LightRed,
    LightBlue,
    Lights,
    Gms,
    GmsCo2,
    Stirrer,
    OdRange,
}

impl ChannelKind {
    /// Number of values a set point of this channel carries.
    pub fn arity(self) -> usize {
        match self {
            Self::None => 0,
            Self::Temperature | Self::LightRed | Self::LightBlue | Self::GmsCo2 | Self::Stirrer => 1,
            Self::Lights | Self::Gms | Self::OdRange => 2,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    #[default]
    Sweep,
    Pso,
}

/// A set point as written in TOML: `28.0` or `[55.0, 25.0]`.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum SetPointToml {
    Scalar(f64),
    Tuple(Vec<f64>),
}

impl SetPointToml {
    pub fn values(&self) -> Vec<f64> {
        match self {
            Self::Scalar(v) => vec![*v],
            Self::Tuple(v) => v.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct ParameterCfg {
    pub channel: ChannelKind,
    pub strategy: Strategy,
    pub steps: Vec<SetPointToml>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PsoCfg {
    /// Unit whose context holds the swarm best
    pub leader: String,
    pub neighbors: Vec<String>,
    pub search_min: Vec<f64>,
    pub search_max: Vec<f64>,
    pub max_step: Vec<f64>,
    /// Starting position; defaults to the middle of the search range
    pub initial: Option<Vec<f64>>,
    pub seed: Option<u64>,
    /// Swarm state older than this is reported as stale
    pub stale_after_s: u64,
    pub mail_recipient: String,
}

impl Default for PsoCfg {
    fn default() -> Self {
        Self {
            leader: String::new(),
            neighbors: Vec::new(),
            search_min: Vec::new(),
            search_max: Vec::new(),
            max_step: Vec::new(),
            initial: None,
            seed: None,
            stale_after_s: 3600,
            mail_recipient: "pso".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SuspensionCfg {
    pub enabled: bool,
    /// Accessory whose context publishes `modeO2EvolResp`
    pub o2_probe: String,
}

impl Default for SuspensionCfg {
    fn default() -> Self {
        Self {
            enabled: true,
            o2_probe: "probes.o2".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

/// Simulated culture of one unit (CLI `simulate`).
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SimUnitCfg {
    pub name: String,
    /// Set point with the shortest doubling time
    pub optimum: Vec<f64>,
    pub base_doubling_h: f64,
    /// Doubling-time penalty per squared unit of distance to the optimum
    pub curvature: f64,
    pub initial_od: f64,
}

impl Default for SimUnitCfg {
    fn default() -> Self {
        Self {
            name: String::new(),
            optimum: Vec::new(),
            base_doubling_h: 8.0,
            curvature: 0.05,
            initial_od: 0.45,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SimulationCfg {
    pub hours: f64,
    pub tick_s: u64,
    /// Dilution rate per hour at full pump speed
    pub dilution_per_h: f64,
    /// Probability that a reading is a single-sample spike
    pub noise_spike_prob: f64,
    pub seed: u64,
    pub units: Vec<SimUnitCfg>,
}

impl Default for SimulationCfg {
    fn default() -> Self {
        Self {
            hours: 240.0,
            tick_s: 60,
            dilution_per_h: 2.0,
            noise_spike_prob: 0.01,
            seed: 7,
            units: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub unit: UnitCfg,
    #[serde(default)]
    pub turbidostat: TurbidostatCfg,
    #[serde(default)]
    pub growth: GrowthCfg,
    #[serde(default)]
    pub stability: StabilityCfg,
    #[serde(default)]
    pub parameter: ParameterCfg,
    #[serde(default)]
    pub pso: PsoCfg,
    #[serde(default)]
    pub suspension: SuspensionCfg,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub simulation: SimulationCfg,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Load an OD trace from a CSV file with the exact header `time_s,od`.
pub fn load_od_trace_csv(path: &std::path::Path) -> eyre::Result<Vec<OdSample>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open OD trace CSV {:?}: {}", path, e))?;

    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let expected = ["time_s", "od"];
    let actual: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
    if actual != expected {
        eyre::bail!(
            "OD trace CSV must have headers 'time_s,od', got: {}",
            actual.join(",")
        );
    }

    let mut rows: Vec<OdSample> = Vec::new();
    for (idx, rec) in rdr.deserialize::<OdSample>().enumerate() {
        let row = rec.map_err(|e| eyre::eyre!("invalid CSV row {}: {}", idx + 2, e))?;
        if let Some(prev) = rows.last()
            && row.time_s <= prev.time_s
        {
            eyre::bail!(
                "OD trace times must be strictly increasing (row {}: {} after {})",
                idx + 2,
                row.time_s,
                prev.time_s
            );
        }
        rows.push(row);
    }
    if rows.is_empty() {
        eyre::bail!("OD trace CSV {:?} has no samples", path);
    }
    Ok(rows)
}

fn check_pct(name: &str, v: f64) -> eyre::Result<()> {
    if !(0.0..=100.0).contains(&v) {
        eyre::bail!("{name} must be in [0, 100]");
    }
    Ok(())
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Unit
        if self.unit.name.trim().is_empty() {
            eyre::bail!("unit.name must not be empty");
        }

        // Turbidostat
        let t = &self.turbidostat;
        if !(t.od_min > 0.0 && t.od_max > 0.0) {
            eyre::bail!("turbidostat.od_min and od_max must be > 0");
        }
        if !matches!(t.od_sensor, 680 | 720 | 735) {
            eyre::bail!("turbidostat.od_sensor must be one of 680, 720, 735");
        }
        if t.readout_interval_s == 0 {
            eyre::bail!("turbidostat.readout_interval_s must be >= 1");
        }
        check_pct("turbidostat.pump_speed_pct", t.pump_speed_pct)?;
        check_pct("turbidostat.slow_down_range_pct", t.slow_down_range_pct)?;
        check_pct("turbidostat.slow_down_factor_pct", t.slow_down_factor_pct)?;
        if !(t.noise_ratio > 0.0 && t.noise_ratio < 1.0) {
            eyre::bail!("turbidostat.noise_ratio must be in (0.0, 1.0)");
        }

        // Growth
        let g = &self.growth;
        if !(0.0..=1.0).contains(&g.regression_r2_min) {
            eyre::bail!("growth.regression_r2_min must be in [0.0, 1.0]");
        }
        if g.eval_fraction.is_some() && g.eval_delay_s.is_some() {
            eyre::bail!("growth.eval_fraction and growth.eval_delay_s are mutually exclusive");
        }
        if let Some(f) = g.eval_fraction
            && !(f > 0.0 && f <= 1.0)
        {
            eyre::bail!("growth.eval_fraction must be in (0.0, 1.0]");
        }
        if g.fallback_window < 2 {
            eyre::bail!("growth.fallback_window must be >= 2");
        }
        if !(g.regression_time_unit_s > 0.0) {
            eyre::bail!("growth.regression_time_unit_s must be > 0");
        }
        if g.history_capacity == 0 {
            eyre::bail!("growth.history_capacity must be >= 1");
        }

        // Stability
        let s = &self.stability;
        if s.analyzed_steps < 2 {
            eyre::bail!("stability.analyzed_steps must be >= 2");
        }
        if s.confidence_max_pct < 0.0 || s.trend_max_pct < 0.0 {
            eyre::bail!("stability limits must be >= 0");
        }
        if s.min_dwell_h < 0.0 || s.max_dwell_h < 0.0 {
            eyre::bail!("stability dwell times must be >= 0");
        }
        if s.max_dwell_h > 0.0 && s.max_dwell_h < s.min_dwell_h {
            eyre::bail!("stability.max_dwell_h must be >= min_dwell_h (or 0 to disable)");
        }

        // Parameter
        let arity = self.parameter.channel.arity();
        for (i, step) in self.parameter.steps.iter().enumerate() {
            let n = step.values().len();
            if arity > 0 && n != arity {
                eyre::bail!(
                    "parameter.steps[{i}] has {n} values, channel {:?} expects {arity}",
                    self.parameter.channel
                );
            }
            if step.values().iter().any(|v| !v.is_finite()) {
                eyre::bail!("parameter.steps[{i}] must be finite");
            }
        }

        // PSO
        if self.parameter.strategy == Strategy::Pso {
            let p = &self.pso;
            if arity == 0 {
                eyre::bail!("pso strategy requires a parameter.channel other than none");
            }
            if p.leader.trim().is_empty() {
                eyre::bail!("pso.leader must not be empty");
            }
            if p.search_min.len() != arity || p.search_max.len() != arity || p.max_step.len() != arity {
                eyre::bail!("pso.search_min, search_max and max_step must have {arity} values");
            }
            let finite = |v: &[f64]| v.iter().all(|x| x.is_finite());
            if !finite(&p.search_min) || !finite(&p.search_max) || !finite(&p.max_step) {
                eyre::bail!("pso.search_min, search_max and max_step must be finite");
            }
            if p.initial.as_deref().is_some_and(|v| !finite(v)) {
                eyre::bail!("pso.initial must be finite");
            }
            if p.search_min.iter().zip(&p.search_max).any(|(lo, hi)| lo > hi) {
                eyre::bail!("pso.search_min must be <= search_max");
            }
            if p.max_step.iter().any(|s| !(*s > 0.0)) {
                eyre::bail!("pso.max_step must be > 0");
            }
            if let Some(init) = &p.initial
                && init.len() != arity
            {
                eyre::bail!("pso.initial must have {arity} values");
            }
        }

        // Suspension
        if self.suspension.enabled && self.suspension.o2_probe.trim().is_empty() {
            eyre::bail!("suspension.o2_probe must not be empty when enabled");
        }

        // Simulation
        if self.simulation.tick_s == 0 {
            eyre::bail!("simulation.tick_s must be >= 1");
        }
        if !(0.0..=1.0).contains(&self.simulation.noise_spike_prob) {
            eyre::bail!("simulation.noise_spike_prob must be in [0.0, 1.0]");
        }

        Ok(())
    }
}
