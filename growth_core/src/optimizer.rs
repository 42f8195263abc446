//! One control cycle of a bioreactor unit (`GrowthOptimizer::invoke`).
//!
//! Each invocation reads the OD sensor and the unit context, runs the signal
//! averager and the turbidostat, closes a growth step when a dilution starts,
//! evaluates stability and, once stable, moves the controlled parameter with
//! the sweep or the swarm optimizer. The typed state is staged for the whole
//! cycle and written back only when the cycle succeeds.

use std::sync::Arc;

use growth_traits::{
    Accessory, AccessoryGroup, Context, ExperimentClock, Journal, PeerDirectory, ids,
};

use crate::averager::{Averaged, SignalAverager};
use crate::channel::{ParameterChannel, SetPoint};
use crate::error::{OptimizerError, Result};
use crate::growth::{GrowthRateEstimator, StepOutcome, StepSample};
use crate::pso::{NeighborReport, PsoOptimizer, SwarmBest, neighbor_best};
use crate::stability::{StabilityDetector, Verdict};
use crate::state::{Phase, UnitState, band_modifiers, keys};
use crate::status::{Invocation, PumpCommand};
use crate::suspension::{SuspensionAction, SuspensionCoordinator};
use crate::sweep::StepSequencer;
use crate::turbidostat::{OdBand, Transition, Turbidostat};
use crate::util::{FITNESS_SENTINEL, round_to};

/// Host resources handed to one invocation.
pub struct UnitIo<'a> {
    /// The pump accessory running this control script.
    pub pump: &'a dyn Accessory,
    /// Sibling accessories of the unit (OD sensor, actuators, probes).
    pub group: &'a mut dyn AccessoryGroup,
    /// The pump's persistent context.
    pub context: &'a mut dyn Context,
    pub peers: &'a mut dyn PeerDirectory,
    pub journal: &'a dyn Journal,
}

/// How the next set point is chosen.
pub enum Strategy {
    Sweep(StepSequencer),
    Pso(PsoOptimizer),
}

/// Per-cycle scratch data.
struct Cycle {
    now: u64,
    /// Context was (re)initialized in this cycle.
    fresh: bool,
    /// Swarm best to publish in the leader's context on commit.
    swarm_best: Option<SwarmBest>,
}

pub struct GrowthOptimizer {
    pub(crate) unit: String,
    pub(crate) turbidostat: Turbidostat,
    pub(crate) averager: SignalAverager,
    pub(crate) estimator: GrowthRateEstimator,
    pub(crate) detector: StabilityDetector,
    pub(crate) channel: ParameterChannel,
    pub(crate) strategy: Strategy,
    pub(crate) suspension: SuspensionCoordinator,
    pub(crate) clock: Arc<dyn ExperimentClock + Send + Sync>,
    pub(crate) fingerprint: String,
}

impl core::fmt::Debug for GrowthOptimizer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("GrowthOptimizer")
            .field("unit", &self.unit)
            .field("channel", &self.channel)
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}

impl GrowthOptimizer {
    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Fingerprint of the running configuration stored in the context.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn readout_interval_s(&self) -> u64 {
        self.turbidostat.cfg().readout_interval_s
    }

    pub fn od_sensor_id(&self) -> &'static str {
        ids::od_sensor(self.turbidostat.cfg().od_sensor_nm)
    }

    fn pso_dims(&self) -> usize {
        match &self.strategy {
            Strategy::Pso(p) => p.cfg().dims(),
            Strategy::Sweep(_) => 0,
        }
    }

    fn analyzed_steps(&self) -> usize {
        self.detector.cfg().analyzed_steps
    }

    /// Whether the context must be cleared and reinitialized.
    pub fn needs_init(&self, ctx: &dyn Context) -> bool {
        !ctx.get_bool(keys::INITIALIZED, false)
            || ctx.get_string(keys::CONFIG_FINGERPRINT, "") != self.fingerprint
    }

    /// Run one control cycle. Never fails: a failing cycle is logged and
    /// journaled, leaves the context untouched and does not influence the pump.
    pub fn invoke(&mut self, mut io: UnitIo<'_>) -> Invocation {
        let now = self.clock.duration_secs();
        let delay_s = self.readout_interval_s();
        let journal = io.journal;
        let pump = match self.cycle(&mut io, now) {
            Ok(cmd) => cmd,
            Err(e) => {
                tracing::error!(unit = %self.unit, error = %e, "growth optimizer cycle failed");
                journal.add_event(&format!("Growth optimizer error: {e:#}"));
                PumpCommand::NotInfluenced
            }
        };
        Invocation { delay_s, pump }
    }

    fn cycle(&mut self, io: &mut UnitIo<'_>, now: u64) -> Result<PumpCommand> {
        let fresh = self.needs_init(&*io.context);
        let mut cyc = Cycle {
            now,
            fresh,
            swarm_best: None,
        };
        let mut st = if fresh {
            self.initialize(io)?
        } else {
            UnitState::load(&*io.context, self.analyzed_steps(), self.pso_dims())?
        };

        let cmd = self.control(io, &mut st, &mut cyc)?;

        if fresh {
            io.context.clear();
            io.context.put(keys::INITIALIZED, true.into());
            io.context
                .put(keys::CONFIG_FINGERPRINT, self.fingerprint.as_str().into());
        }
        st.store(&mut *io.context);
        if let Some(best) = cyc.swarm_best.take() {
            self.publish_swarm_best(io, &best);
        }
        Ok(cmd)
    }

    /// Fresh state for a cleared context: band check, channel preconditions
    /// and the initial set point.
    fn initialize(&mut self, io: &mut UnitIo<'_>) -> Result<UnitState> {
        let reinit = io.context.get_bool(keys::INITIALIZED, false);
        tracing::info!(unit = %self.unit, reinit, "initializing unit context");
        io.journal.add_event(if reinit {
            "Configuration changed, growth optimizer reinitialized"
        } else {
            "Growth optimizer initialized"
        });

        let cfg = self.turbidostat.cfg();
        let (band, swapped) = OdBand::new(cfg.od_min, cfg.od_max);
        if swapped {
            tracing::warn!(od_min = cfg.od_min, od_max = cfg.od_max, "OD range reversed, swapped");
            io.journal.add_event(&format!(
                "OD range min {} is above max {}, values swapped to {}-{}",
                cfg.od_min, cfg.od_max, band.min, band.max
            ));
        }
        for p in self.channel.preconditions() {
            io.journal.add_event(&p);
        }

        let mut st = UnitState::new(self.analyzed_steps());
        let channel = self.channel;
        match &mut self.strategy {
            Strategy::Sweep(seq) => {
                if seq.is_active()
                    && let Some(sp) = seq.current(0).copied()
                {
                    apply_set_point(channel, io, &mut st, &sp)?;
                }
            }
            Strategy::Pso(pso) => {
                let particle = pso.spawn();
                let sp = set_point_of(&particle.position)?;
                apply_set_point(channel, io, &mut st, &sp)?;
                io.journal.add_event(&format!(
                    "PSO particle initialized at [{}]",
                    join(&particle.position)
                ));
                st.particle = Some(particle);
            }
        }
        Ok(st)
    }

    fn control(&mut self, io: &mut UnitIo<'_>, st: &mut UnitState, cyc: &mut Cycle) -> Result<PumpCommand> {
        let running = io.pump.value().is_some();

        match self
            .suspension
            .decide(&*io.group, running, st.pump_suspended)
        {
            SuspensionAction::Suspend => {
                if !st.pump_suspended {
                    tracing::info!(unit = %self.unit, "dilution suspended for O2 measurement");
                    io.journal
                        .add_event("Dilution suspended during O2 evolution/respiration measurement");
                }
                st.pump_suspended = true;
                return Ok(PumpCommand::Suspended(io.pump.min()));
            }
            SuspensionAction::Defer => return Ok(PumpCommand::NotInfluenced),
            SuspensionAction::Resume => {
                st.pump_suspended = false;
                tracing::info!(unit = %self.unit, "dilution resumed after O2 measurement");
                io.journal.add_event("Dilution resumed after O2 measurement");
                return Ok(PumpCommand::Full(io.pump.max()));
            }
            SuspensionAction::Proceed => {}
        }

        let sensor_id = self.od_sensor_id();
        let reading = match io.group.od_sensor(sensor_id) {
            Some(sensor) if !sensor.has_error() => sensor.value(),
            _ => {
                tracing::debug!(unit = %self.unit, sensor = sensor_id, "OD sensor unavailable");
                return Ok(PumpCommand::NotInfluenced);
            }
        };
        let Some(v) = reading else {
            return Ok(PumpCommand::NotInfluenced);
        };

        let od = match self.averager.filter(v, running, &mut st.averager) {
            Averaged::Confirmed(od) => od,
            _ => return Ok(PumpCommand::NotInfluenced),
        };

        let (min_mod, max_mod) = band_modifiers(&*io.context);
        let band = st
            .od_band
            .unwrap_or_else(|| self.turbidostat.band())
            .modified(min_mod, max_mod);
        let t = self.turbidostat.transition(od, band, running);
        tracing::debug!(unit = %self.unit, od, ?t, band_min = band.min, band_max = band.max, "turbidostat");

        match t {
            Transition::StartDilution => self.on_dilution_start(io, st, cyc)?,
            Transition::StopDilution => {
                st.mode_dilution = false;
                st.last_pump_stop = Some(cyc.now);
                if st.phase != Phase::Stabilized {
                    st.phase = Phase::MeasuringStep;
                }
                tracing::info!(unit = %self.unit, od, "dilution stopped");
                io.journal.add_event("External pump stopped");
            }
            Transition::SlowDown | Transition::NoChange => {}
        }
        self.check_forced_advance(io, st, cyc)?;
        Ok(self.turbidostat.command(t, io.pump.max()))
    }

    /// Close the growth step that just ended and evaluate stability.
    fn on_dilution_start(&mut self, io: &mut UnitIo<'_>, st: &mut UnitState, cyc: &mut Cycle) -> Result<()> {
        let now = cyc.now;
        st.mode_dilution = true;
        st.phase = Phase::Diluting;

        let opened = st.stabilized_time.is_none();
        if opened {
            let stab = self.detector.cfg();
            st.reset_series();
            st.stabilized_time = Some(now + stab.min_dwell_s);
            st.stabilized_time_max = stab.max_dwell_s.map(|d| now + d);
        }

        let elapsed = st.last_pump_stop.map_or(0, |t| now.saturating_sub(t));
        let interval = self.turbidostat.cfg().readout_interval_s;
        let capacity = self.estimator.cfg().history_capacity;
        let sensor_id = self.od_sensor_id();
        let outcome = {
            let sensor = io.group.od_sensor(sensor_id).ok_or_else(|| {
                eyre::Report::new(OptimizerError::Hardware(format!("{sensor_id} not present")))
            })?;
            if opened {
                sensor.set_capacity(capacity);
            }
            (elapsed > 0).then(|| self.estimator.estimate(&*sensor, elapsed, interval))
        };
        tracing::info!(unit = %self.unit, elapsed_s = elapsed, ?outcome, "dilution started");

        let mut accepted = false;
        match outcome {
            None => io.journal.add_event("External pump started"),
            Some(StepOutcome::Accepted(e)) => {
                st.series.push(StepSample {
                    start_s: now,
                    elapsed_s: elapsed,
                    doubling_h: e.doubling_h,
                });
                st.step_counter += 1;
                accepted = true;
                io.journal.add_event(&format!(
                    "External pump started, doubling time of the step was {} h and step no. is {}",
                    round_to(e.doubling_h, 2),
                    st.step_counter
                ));
            }
            Some(StepOutcome::LowConfidence(e)) => io.journal.add_event(&format!(
                "External pump started, doubling time of the step was {} h but R2 {} is below {}, step not counted",
                round_to(e.doubling_h, 2),
                round_to(e.r_squared, 3),
                self.estimator.cfg().r2_min
            )),
            Some(StepOutcome::NoGrowth { .. } | StepOutcome::NoFit { .. }) => io
                .journal
                .add_event("External pump started, no growth detected in the step"),
        }

        let verdict = if accepted {
            self.detector
                .evaluate(&st.series, st.step_counter, now, st.stabilized_time.unwrap_or(0))
        } else {
            Verdict::Collecting
        };
        match verdict {
            Verdict::Stable(stats) => {
                io.journal.add_event(&stats.describe());
                io.journal.add_event(&format!(
                    "*** Stabilized doubling time TD ({}) is {}\u{b1}{} h (IC95)",
                    st.parameter_text,
                    round_to(stats.mean, 2),
                    round_to(stats.ci95, 2)
                ));
                tracing::info!(unit = %self.unit, mean_h = stats.mean, ci95 = stats.ci95, "growth stabilized");
                st.phase = Phase::Stabilized;
                st.reset_series();
                return self.advance(io, st, cyc, Some(stats.mean));
            }
            Verdict::Unstable(stats) | Verdict::Dwelling(stats) => {
                io.journal.add_event(&stats.describe());
            }
            Verdict::Collecting => {}
        }
        Ok(())
    }

    /// Leave a set point whose maximal dwell time has passed, whether or not
    /// the culture still triggers dilutions.
    fn check_forced_advance(&mut self, io: &mut UnitIo<'_>, st: &mut UnitState, cyc: &mut Cycle) -> Result<()> {
        if !self.detector.forced(cyc.now, st.stabilized_time_max) {
            return Ok(());
        }
        let fitness = st.series.mean_doubling();
        tracing::warn!(unit = %self.unit, steps = st.step_counter, "stability not reached, forcing advance");
        io.journal.add_event(&format!(
            "Growth not stabilized within the maximal time ({} steps), moving to the next set point",
            st.step_counter
        ));
        st.reset_series();
        self.advance(io, st, cyc, fitness)
    }

    /// Move the controlled parameter to its next set point.
    fn advance(&mut self, io: &mut UnitIo<'_>, st: &mut UnitState, cyc: &mut Cycle, fitness: Option<f64>) -> Result<()> {
        let channel = self.channel;
        match &mut self.strategy {
            Strategy::Sweep(seq) => {
                let Some((next, sp)) = seq.advance(st.change_counter) else {
                    return Ok(());
                };
                let sp = *sp;
                apply_set_point(channel, io, st, &sp)?;
                st.change_counter = next;
            }
            Strategy::Pso(pso) => {
                let dims = pso.cfg().dims();
                let particle = match st.particle.take() {
                    Some(p) => p,
                    None => pso.spawn(),
                };
                let f = fitness.unwrap_or(FITNESS_SENTINEL);

                let neighbors: Vec<NeighborReport> = pso
                    .cfg()
                    .neighbors
                    .iter()
                    .filter_map(|n| {
                        let r = io.peers.peer_context(n).and_then(|c| NeighborReport::load(c, dims));
                        if r.is_none() {
                            tracing::debug!(unit = %self.unit, neighbor = %n, "no neighbor report");
                        }
                        r
                    })
                    .collect();

                let leader = pso.cfg().leader.as_str();
                let swarm = if leader == self.unit {
                    if cyc.fresh { None } else { SwarmBest::load(&*io.context, dims) }
                } else {
                    io.peers.peer_context(leader).and_then(|c| SwarmBest::load(c, dims))
                };
                if let Some(g) = &swarm {
                    let age = g.age(cyc.now);
                    if age > pso.cfg().stale_after_s {
                        tracing::warn!(
                            unit = %self.unit,
                            age_s = age,
                            version = g.version,
                            owner = %g.particle,
                            "swarm best is stale"
                        );
                    }
                } else {
                    tracing::debug!(unit = %self.unit, leader, "no swarm best available");
                }
                let recipient = pso.cfg().mail_recipient.clone();

                let step = pso.step(
                    &particle,
                    f,
                    neighbor_best(&neighbors),
                    swarm.as_ref(),
                    &self.unit,
                    cyc.now,
                );
                let sp = set_point_of(&step.particle.position)?;
                apply_set_point(channel, io, st, &sp)?;
                io.journal.add_event(&format!(
                    "PSO step: doubling time {} h at [{}], next position [{}]",
                    round_to(f, 2),
                    join(&step.report.position),
                    join(&step.particle.position)
                ));
                if let Some(best) = step.swarm_best {
                    io.journal.send_mail(
                        &format!("Swarm best updated by {}", self.unit),
                        &recipient,
                        &format!(
                            "New swarm best doubling time {} h at [{}] (version {})",
                            round_to(best.fitness, 2),
                            join(&best.position),
                            best.version
                        ),
                    );
                    cyc.swarm_best = Some(best);
                }
                st.particle = Some(step.particle);
                st.report = Some(step.report);
                st.change_counter += 1;
            }
        }
        Ok(())
    }

    /// Write the swarm best into the leader's context; an unreachable leader
    /// only loses this update.
    fn publish_swarm_best(&self, io: &mut UnitIo<'_>, best: &SwarmBest) {
        let Strategy::Pso(pso) = &self.strategy else {
            return;
        };
        let leader = pso.cfg().leader.as_str();
        if leader == self.unit {
            best.store(&mut *io.context);
            return;
        }
        match io.peers.peer_context_mut(leader) {
            Some(ctx) => best.store(ctx),
            None => tracing::warn!(unit = %self.unit, leader, "swarm leader unreachable, best not published"),
        }
    }
}

fn apply_set_point(channel: ParameterChannel, io: &mut UnitIo<'_>, st: &mut UnitState, sp: &SetPoint) -> Result<()> {
    if let Some(applied) = channel.apply(sp, &mut *io.group)? {
        io.journal.add_event(&applied.event);
        st.parameter_text = applied.description;
        if let Some(band) = applied.od_band {
            st.od_band = Some(band);
        }
    }
    Ok(())
}

fn set_point_of(position: &[f64]) -> Result<SetPoint> {
    SetPoint::from_values(position).ok_or_else(|| {
        eyre::Report::new(OptimizerError::State(format!(
            "PSO position with {} dimensions",
            position.len()
        )))
    })
}

fn join(v: &[f64]) -> String {
    v.iter()
        .map(|x| round_to(*x, 2).to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
