//! Shared test rig: one simulated unit driven by a manual clock.
#![allow(dead_code)]

use std::sync::Arc;

use growth_core::mocks::RecordingJournal;
use growth_core::{
    ContextBoard, GrowthOptimizer, Invocation, OptimizerBuilder, PumpCommand, Set, TurbidostatCfg,
    UnitIo,
};
use growth_hardware::{SimAccessory, SimCulture, SimGroup};
use growth_traits::{Accessory, ExperimentClock, ManualClock, MemoryContext};

pub struct Rig {
    pub clock: ManualClock,
    pub pump: SimAccessory,
    pub group: SimGroup,
    pub ctx: MemoryContext,
    pub board: ContextBoard,
    pub journal: RecordingJournal,
    pub opt: GrowthOptimizer,
}

/// Builder for `unit` with the given band, clocked by `clock`.
pub fn builder(unit: &str, clock: &ManualClock, od_min: f64, od_max: f64) -> OptimizerBuilder<Set, Set> {
    GrowthOptimizer::builder()
        .with_unit(unit)
        .with_turbidostat(TurbidostatCfg {
            od_min,
            od_max,
            ..TurbidostatCfg::default()
        })
        .with_clock(Arc::new(clock.clone()))
        .with_seed(11)
}

impl Rig {
    pub fn new(clock: ManualClock, opt: GrowthOptimizer) -> Self {
        Self {
            clock,
            pump: SimAccessory::pump(),
            group: SimGroup::with_standard_accessories(680, SimCulture::new(0.4, 0.1)),
            ctx: MemoryContext::new(),
            board: ContextBoard::new(),
            journal: RecordingJournal::new(),
            opt,
        }
    }

    /// Run one cycle and apply the pump command.
    pub fn invoke(&mut self) -> Invocation {
        let inv = self.opt.invoke(UnitIo {
            pump: &self.pump,
            group: &mut self.group,
            context: &mut self.ctx,
            peers: &mut self.board,
            journal: &self.journal,
        });
        self.apply(inv.pump);
        inv
    }

    pub fn apply(&mut self, cmd: PumpCommand) {
        if let Some(cfg) = cmd.proto_config() {
            self.pump
                .set_running_config(cfg)
                .expect("sim pump accepts commands");
        }
    }

    /// Record `od` now, run one cycle, then let one readout interval pass.
    pub fn read(&mut self, od: f64) -> PumpCommand {
        let t = self.clock.duration_secs();
        self.group.culture_mut().record(t, od);
        let inv = self.invoke();
        self.clock.advance(inv.delay_s);
        inv.pump
    }

    /// One readout interval of the simulated culture: sample, run a cycle,
    /// then grow at `doubling_h` while diluting at `dilution_per_h` scaled by
    /// the pump duty.
    pub fn tick(&mut self, doubling_h: f64, dilution_per_h: f64) -> PumpCommand {
        let t = self.clock.duration_secs();
        self.group.culture_mut().sample(t);
        let inv = self.invoke();
        let dilution = dilution_per_h * self.pump.duty();
        self.group.culture_mut().grow(inv.delay_s, doubling_h, dilution);
        self.clock.advance(inv.delay_s);
        inv.pump
    }

    /// Tick until `done` holds; false when `max_ticks` ran out.
    pub fn run_until(&mut self, max_ticks: usize, doubling_h: f64, done: impl Fn(&Rig) -> bool) -> bool {
        for _ in 0..max_ticks {
            self.tick(doubling_h, 1.0);
            if done(self) {
                return true;
            }
        }
        false
    }

    pub fn running(&self) -> bool {
        self.pump.value().is_some()
    }
}
