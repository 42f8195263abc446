//! Replays a recorded OD trace through one unit and reports every decision.

use std::path::Path;
use std::sync::Arc;

use eyre::{Result, WrapErr};
use growth_config::{Config, load_od_trace_csv};
use growth_core::{ChannelJournal, ContextBoard, Invocation, JournalEntry, UnitIo, from_config};
use growth_hardware::{SimAccessory, SimCulture, SimGroup};
use growth_traits::{Accessory, ManualClock, MemoryContext};
use serde::Serialize;

/// One replayed reading and what the optimizer made of it.
#[derive(Debug, Serialize)]
pub struct ReplayLine {
    pub time_s: u64,
    pub od: f64,
    #[serde(flatten)]
    pub invocation: Invocation,
    pub journal: Vec<JournalEntry>,
}

#[derive(Debug, Default, Serialize)]
pub struct ReplayStats {
    pub readings: usize,
    pub pump_starts: usize,
    pub journal_events: usize,
}

pub fn run_replay(cfg: &Config, trace: &Path, json: bool) -> Result<ReplayStats> {
    let samples = load_od_trace_csv(trace).wrap_err_with(|| format!("load OD trace {}", trace.display()))?;
    let clock = ManualClock::starting_at(samples.first().map_or(0, |s| s.time_s));
    let mut opt = from_config(cfg, Some(Arc::new(clock.clone())))?;
    let culture = SimCulture::new(samples.first().map_or(0.0, |s| s.od), cfg.growth.regression_time_unit_s);
    let mut group = SimGroup::with_standard_accessories(cfg.turbidostat.od_sensor, culture);
    let mut pump = SimAccessory::pump();
    let mut ctx = MemoryContext::new();
    let mut peers = ContextBoard::new();
    let (journal, rx) = ChannelJournal::new(opt.unit().to_string());

    let mut stats = ReplayStats::default();
    for s in &samples {
        clock.set(s.time_s);
        group.culture_mut().record(s.time_s, s.od);
        let was_running = pump.value().is_some();
        let inv = opt.invoke(UnitIo {
            pump: &pump,
            group: &mut group,
            context: &mut ctx,
            peers: &mut peers,
            journal: &journal,
        });
        if let Some(cmd) = inv.pump.proto_config() {
            pump.set_running_config(cmd)
                .map_err(|e| eyre::Report::new(growth_core::hw_error::map_hw_error(&*e)))?;
        }
        stats.readings += 1;
        if !was_running && pump.value().is_some() {
            stats.pump_starts += 1;
        }
        let entries: Vec<JournalEntry> = rx.try_iter().collect();
        stats.journal_events += entries.len();
        let line = ReplayLine {
            time_s: s.time_s,
            od: s.od,
            invocation: inv,
            journal: entries,
        };
        if json {
            println!("{}", serde_json::to_string(&line).wrap_err("serialize replay line")?);
        } else {
            print_line(&line);
        }
    }
    tracing::info!(readings = stats.readings, pump_starts = stats.pump_starts, "replay finished");
    Ok(stats)
}

fn print_line(line: &ReplayLine) {
    use growth_core::PumpCommand;
    let pump = match line.invocation.pump {
        PumpCommand::Full(v) => format!("pump full {v}"),
        PumpCommand::Slow(v) => format!("pump slow {v}"),
        PumpCommand::Off => "pump off".to_string(),
        PumpCommand::Suspended(v) => format!("pump suspended {v}"),
        PumpCommand::NotInfluenced => "-".to_string(),
    };
    println!("{:>8} s  OD {:.3}  {pump}", line.time_s, line.od);
    for entry in &line.journal {
        if let JournalEntry::Event { text, .. } = entry {
            println!("           {text}");
        }
    }
}
