//! Simulated swarm: every configured unit runs its own optimizer against a
//! simulated culture, on one shared experiment clock and one context board.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use eyre::{Result, WrapErr, eyre};
use growth_config::{Config, SimUnitCfg};
use growth_core::hw_error::map_hw_error;
use growth_core::pso::SwarmBest;
use growth_core::state::keys;
use growth_core::util::hours_to_secs;
use growth_core::{
    ChannelJournal, ContextBoard, GrowthOptimizer, JournalEntry, ParameterChannel, UnitIo,
    from_config_as,
};
use growth_hardware::{SimAccessory, SimCulture, SimGroup, SpikeNoise};
use growth_traits::{Accessory, Context, ExperimentClock, ManualClock, ids};
use serde::Serialize;

use crate::persist::{self, Progress};

/// Relative height of a simulated OD spike.
const SPIKE_AMPLITUDE: f64 = 0.25;
/// Simulated seconds between two saves of the state directory.
const SAVE_EVERY_S: u64 = 3600;

pub struct SimOptions {
    pub hours: Option<f64>,
    pub state_dir: Option<PathBuf>,
    pub resume: bool,
    pub json: bool,
}

#[derive(Debug, Serialize)]
pub struct UnitSummary {
    pub unit: String,
    pub od: f64,
    pub parameter: String,
    pub phase: String,
    pub steps: i64,
    pub changes: i64,
    pub swarm_best_h: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct Summary {
    pub simulated_s: u64,
    pub interrupted: bool,
    pub units: Vec<UnitSummary>,
}

struct SimUnit {
    name: String,
    model: SimUnitCfg,
    pump: SimAccessory,
    group: SimGroup,
    noise: SpikeNoise,
    opt: GrowthOptimizer,
    journal: ChannelJournal,
    next_due: u64,
}

impl SimUnit {
    /// Doubling time of the culture at the current set point: the base
    /// doubling time plus a quadratic penalty around the optimum.
    fn doubling_h(&self, channel: ParameterChannel) -> f64 {
        let x = current_set_point(channel, &self.group);
        if x.is_empty() || x.len() != self.model.optimum.len() {
            return self.model.base_doubling_h;
        }
        let dist2: f64 = x
            .iter()
            .zip(&self.model.optimum)
            .map(|(a, b)| (a - b).powi(2))
            .sum();
        self.model.base_doubling_h + self.model.curvature * dist2
    }
}

/// Values currently applied on the channel's accessories; empty when the
/// channel drives none or one of them has no value yet.
fn current_set_point(channel: ParameterChannel, group: &SimGroup) -> Vec<f64> {
    let sources: &[&str] = match channel {
        ParameterChannel::None | ParameterChannel::OdRange => &[],
        ParameterChannel::Temperature => &[ids::THERMOREGULATOR],
        ParameterChannel::LightRed => &[ids::LIGHT_RED],
        ParameterChannel::LightBlue => &[ids::LIGHT_BLUE],
        ParameterChannel::Lights => &[ids::LIGHT_RED, ids::LIGHT_BLUE],
        ParameterChannel::Gms => &[ids::GMS_AIR, ids::GMS_CO2],
        ParameterChannel::GmsCo2 => &[ids::GMS_CO2],
        ParameterChannel::Stirrer => &[ids::STIRRER],
    };
    sources
        .iter()
        .map(|id| group.accessory_ref(id).and_then(|a| a.value()))
        .collect::<Option<Vec<_>>>()
        .unwrap_or_default()
}

fn unit_models(cfg: &Config) -> Vec<SimUnitCfg> {
    if cfg.simulation.units.is_empty() {
        return vec![SimUnitCfg {
            name: cfg.unit.name.clone(),
            ..SimUnitCfg::default()
        }];
    }
    cfg.simulation
        .units
        .iter()
        .enumerate()
        .map(|(i, u)| {
            let mut u = u.clone();
            if u.name.trim().is_empty() {
                u.name = format!("{}-{}", cfg.unit.name, i + 1);
            }
            u
        })
        .collect()
}

fn print_entry(entry: &JournalEntry, json: bool) {
    if json {
        match serde_json::to_string(entry) {
            Ok(line) => println!("{line}"),
            Err(e) => tracing::warn!(error = %e, "journal entry not serializable"),
        }
        return;
    }
    match entry {
        JournalEntry::Event { unit, text } => println!("[{unit}] {text}"),
        JournalEntry::Mail {
            unit,
            subject,
            recipient,
            ..
        } => println!("[{unit}] mail to {recipient}: {subject}"),
    }
}

fn save_all(dir: &std::path::Path, units: &[SimUnit], board: &ContextBoard, now: u64) -> Result<()> {
    for u in units {
        if let Some(ctx) = board.get(&u.name) {
            persist::save_context(dir, &u.name, ctx)?;
        }
    }
    let progress = Progress {
        time_s: now,
        od: units
            .iter()
            .map(|u| (u.name.clone(), u.group.culture().od()))
            .collect(),
    };
    persist::save_progress(dir, &progress)
}

pub fn run_simulation(cfg: &Config, opts: &SimOptions, shutdown: Arc<AtomicBool>) -> Result<Summary> {
    let sim = &cfg.simulation;
    let hours = opts.hours.unwrap_or(sim.hours);
    if !(hours.is_finite() && hours > 0.0) {
        return Err(eyre!("simulated hours must be > 0, got {hours}"));
    }
    let tick_s = sim.tick_s.max(1);
    let channel = ParameterChannel::from(cfg.parameter.channel);

    if let Some(dir) = &opts.state_dir {
        std::fs::create_dir_all(dir).wrap_err_with(|| format!("create state dir {}", dir.display()))?;
    }
    let progress = match (&opts.state_dir, opts.resume) {
        (Some(dir), true) => persist::load_progress(dir)?.unwrap_or_default(),
        _ => Progress::default(),
    };
    let start = progress.time_s;
    let end = start + hours_to_secs(hours);
    let clock = ManualClock::starting_at(start);

    let models = unit_models(cfg);
    let (root_journal, rx) = ChannelJournal::new(models[0].name.clone());
    let json = opts.json;
    let printer = std::thread::spawn(move || {
        for entry in rx.iter() {
            print_entry(&entry, json);
        }
    });

    let mut board = ContextBoard::new();
    let mut units = Vec::with_capacity(models.len());
    for (i, model) in models.into_iter().enumerate() {
        let opt = from_config_as(cfg, &model.name, Some(Arc::new(clock.clone())))
            .wrap_err_with(|| format!("build optimizer for {}", model.name))?;
        let od = progress.od.get(&model.name).copied().unwrap_or(model.initial_od);
        let culture = SimCulture::new(od, cfg.growth.regression_time_unit_s);
        if let (Some(dir), true) = (&opts.state_dir, opts.resume)
            && let Some(ctx) = persist::load_context(dir, &model.name)?
        {
            tracing::info!(unit = %model.name, keys = ctx.len(), "context restored");
            board.insert(model.name.clone(), ctx);
        }
        units.push(SimUnit {
            journal: root_journal.for_unit(model.name.clone()),
            pump: SimAccessory::pump(),
            group: SimGroup::with_standard_accessories(cfg.turbidostat.od_sensor, culture),
            noise: SpikeNoise::new(sim.seed.wrapping_add(i as u64), sim.noise_spike_prob, SPIKE_AMPLITUDE),
            opt,
            name: model.name.clone(),
            model,
            next_due: start,
        });
    }
    drop(root_journal);
    tracing::info!(units = units.len(), start_s = start, end_s = end, "simulation started");

    let mut interrupted = false;
    let mut last_save = start;
    while clock.duration_secs() < end {
        if shutdown.load(Ordering::Relaxed) {
            tracing::warn!(at_s = clock.duration_secs(), "simulation interrupted");
            interrupted = true;
            break;
        }
        let now = clock.duration_secs();
        for u in &mut units {
            if now >= u.next_due {
                let od = u.group.culture().od();
                let reading = u.noise.apply(od);
                u.group.culture_mut().record(now, reading);
                let mut ctx = board.take(&u.name);
                let inv = u.opt.invoke(UnitIo {
                    pump: &u.pump,
                    group: &mut u.group,
                    context: &mut ctx,
                    peers: &mut board,
                    journal: &u.journal,
                });
                board.put_back(&u.name, ctx);
                if let Some(cmd) = inv.pump.proto_config()
                    && let Err(e) = u.pump.set_running_config(cmd)
                {
                    let err = map_hw_error(e.as_ref());
                    tracing::warn!(unit = %u.name, error = %err, "pump command rejected");
                }
                u.next_due = now + inv.delay_s.max(1);
            }
            let doubling = u.doubling_h(channel);
            let dilution = sim.dilution_per_h * u.pump.duty();
            u.group.culture_mut().grow(tick_s, doubling, dilution);
        }
        clock.advance(tick_s);

        let now = clock.duration_secs();
        if let Some(dir) = &opts.state_dir
            && now - last_save >= SAVE_EVERY_S
        {
            save_all(dir, &units, &board, now)?;
            last_save = now;
        }
    }

    let simulated_end = clock.duration_secs();
    if let Some(dir) = &opts.state_dir {
        save_all(dir, &units, &board, simulated_end)?;
    }

    let dims = match cfg.parameter.strategy {
        growth_config::Strategy::Pso => cfg.pso.search_min.len(),
        growth_config::Strategy::Sweep => 0,
    };
    let summaries: Vec<UnitSummary> = units
        .iter()
        .map(|u| {
            let ctx = board.get(&u.name);
            let swarm_best_h = ctx
                .filter(|_| dims > 0)
                .and_then(|c| SwarmBest::load(c, dims))
                .map(|b| b.fitness);
            UnitSummary {
                unit: u.name.clone(),
                od: u.group.culture().od(),
                parameter: ctx.map(|c| c.get_string(keys::PARAMETER_TEXT, "")).unwrap_or_default(),
                phase: ctx.map(|c| c.get_string(keys::PHASE, "idle")).unwrap_or_default(),
                steps: ctx.map_or(0, |c| c.get_i64(keys::STEP_COUNTER, 0)),
                changes: ctx.map_or(0, |c| c.get_i64(keys::CHANGE_COUNTER, 0)),
                swarm_best_h,
            }
        })
        .collect();

    // Closing the unit journals ends the printer thread.
    drop(units);
    printer
        .join()
        .map_err(|_| eyre!("journal printer thread panicked"))?;

    Ok(Summary {
        simulated_s: simulated_end - start,
        interrupted,
        units: summaries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group_at(temp: f64) -> SimGroup {
        let mut g = SimGroup::with_standard_accessories(680, SimCulture::new(0.4, 0.1));
        g.accessory_mut(ids::THERMOREGULATOR)
            .unwrap()
            .set_running_config(growth_traits::ProtoConfig::Value(temp))
            .unwrap();
        g
    }

    #[test]
    fn set_point_reads_channel_accessories() {
        let g = group_at(31.0);
        assert_eq!(current_set_point(ParameterChannel::Temperature, &g), vec![31.0]);
        // Lights never set: no complete set point
        assert!(current_set_point(ParameterChannel::Lights, &g).is_empty());
        assert!(current_set_point(ParameterChannel::None, &g).is_empty());
    }
}
