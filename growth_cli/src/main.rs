mod cli;
mod error_fmt;
mod persist;
mod replay;
mod simulate;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use eyre::{Result, WrapErr};
use growth_core::{GrowthOptimizer, PumpCommand, UnitIo, from_config};
use growth_hardware::{SimAccessory, SimCulture, SimGroup};
use growth_traits::{ManualClock, MemoryContext, NoPeers};
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};
use crate::simulate::{SimOptions, Summary};

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    if !cli.json {
        let _ = color_eyre::install();
    }
    let code = match run(cli) {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "command failed");
            if JSON_MODE.get().copied().unwrap_or(false) {
                eprintln!("{}", format_error_json(&e));
            } else {
                eprintln!("{}", humanize(&e));
            }
            exit_code_for_error(&e)
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<()> {
    let cfg = load_config(&cli.config)?;
    init_tracing(&cli, &cfg.logging)?;
    tracing::debug!(config = %cli.config.display(), "configuration loaded");

    match cli.cmd {
        Commands::CheckConfig => check_config(&cfg, cli.json),
        Commands::Health => health(&cfg, cli.json),
        Commands::Replay { trace } => {
            let stats = replay::run_replay(&cfg, &trace, cli.json)?;
            if !cli.json {
                println!(
                    "Replayed {} readings: {} dilutions started, {} journal events",
                    stats.readings, stats.pump_starts, stats.journal_events
                );
            }
            Ok(())
        }
        Commands::Simulate {
            hours,
            state_dir,
            resume,
        } => {
            let shutdown = Arc::new(AtomicBool::new(false));
            let flag = shutdown.clone();
            ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed))
                .wrap_err("install Ctrl-C handler")?;
            let opts = SimOptions {
                hours,
                state_dir,
                resume,
                json: cli.json,
            };
            let summary = simulate::run_simulation(&cfg, &opts, shutdown)?;
            print_summary(&summary, cli.json)
        }
    }
}

/// Read, parse and validate the TOML configuration.
fn load_config(path: &Path) -> Result<growth_config::Config> {
    let text = std::fs::read_to_string(path).wrap_err_with(|| format!("read config {}", path.display()))?;
    let cfg: growth_config::Config = toml::from_str(&text).wrap_err("parse config")?;
    cfg.validate().wrap_err("invalid configuration")?;
    Ok(cfg)
}

fn init_tracing(cli: &Cli, logging: &growth_config::Logging) -> Result<()> {
    let console_filter = || {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&cli.log_level))
            .unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let (json_layer, text_layer) = if cli.json {
        let layer = tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(console_filter());
        (Some(layer), None)
    } else {
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_filter(console_filter());
        (None, Some(layer))
    };

    let file_layer = match &logging.file {
        Some(file) => {
            let path = Path::new(file);
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| eyre::eyre!("invalid configuration: logging.file has no file name"))?;
            let appender = match logging.rotation.as_deref().unwrap_or("never") {
                "daily" => tracing_appender::rolling::daily(dir, name),
                "hourly" => tracing_appender::rolling::hourly(dir, name),
                "never" => tracing_appender::rolling::never(dir, name),
                other => eyre::bail!("invalid configuration: unknown logging.rotation {other:?}"),
            };
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = FILE_GUARD.set(guard);
            let level = logging.level.as_deref().unwrap_or("info");
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(writer)
                    .with_filter(EnvFilter::try_new(level).wrap_err("invalid configuration: logging.level")?),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(json_layer)
        .with(text_layer)
        .with(file_layer)
        .try_init()
        .wrap_err("initialize logging")
}

fn check_config(cfg: &growth_config::Config, json: bool) -> Result<()> {
    let opt = from_config(cfg, None)?;
    if json {
        let v = serde_json::json!({
            "status": "ok",
            "unit": opt.unit(),
            "od_sensor": opt.od_sensor_id(),
            "readout_interval_s": opt.readout_interval_s(),
            "fingerprint": opt.fingerprint(),
        });
        println!("{v}");
    } else {
        println!(
            "Config OK: unit {} reads {} every {} s (fingerprint {})",
            opt.unit(),
            opt.od_sensor_id(),
            opt.readout_interval_s(),
            opt.fingerprint()
        );
    }
    Ok(())
}

/// Build the optimizer and run one cycle against a simulated unit.
fn health(cfg: &growth_config::Config, json: bool) -> Result<()> {
    let clock = ManualClock::new();
    let mut opt: GrowthOptimizer = from_config(cfg, Some(Arc::new(clock)))?;
    let band_mid = (cfg.turbidostat.od_min + cfg.turbidostat.od_max) / 2.0;
    let mut group = SimGroup::with_standard_accessories(
        cfg.turbidostat.od_sensor,
        SimCulture::new(band_mid, cfg.growth.regression_time_unit_s),
    );
    group.culture_mut().sample(0);
    let pump = SimAccessory::pump();
    let mut ctx = MemoryContext::new();
    let journal = growth_core::TracingJournal::new(opt.unit().to_string());
    let inv = opt.invoke(UnitIo {
        pump: &pump,
        group: &mut group,
        context: &mut ctx,
        peers: &mut NoPeers,
        journal: &journal,
    });
    let healthy = inv.pump == PumpCommand::NotInfluenced && !opt.needs_init(&ctx);
    if !healthy {
        eyre::bail!("health check failed: first cycle returned {:?}", inv.pump);
    }
    if json {
        println!("{}", serde_json::json!({ "status": "ok", "unit": opt.unit() }));
    } else {
        println!("OK");
    }
    Ok(())
}

fn print_summary(summary: &Summary, json: bool) -> Result<()> {
    if json {
        let line = serde_json::json!({ "summary": summary });
        println!("{line}");
        return Ok(());
    }
    let hours = summary.simulated_s as f64 / 3600.0;
    if summary.interrupted {
        println!("Simulation interrupted after {hours:.1} h");
    } else {
        println!("Simulated {hours:.1} h");
    }
    for u in &summary.units {
        let best = u
            .swarm_best_h
            .map(|b| format!(", swarm best {b:.2} h"))
            .unwrap_or_default();
        println!(
            "{}: OD {:.3}, phase {}, {} steps, {} changes, {}{best}",
            u.unit,
            u.od,
            u.phase,
            u.steps,
            u.changes,
            if u.parameter.is_empty() { "no parameter" } else { u.parameter.as_str() }
        );
    }
    Ok(())
}
