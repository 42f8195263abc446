//! Cycle-level scenarios with a scripted OD sensor.

use std::sync::Arc;

use growth_core::mocks::RecordingJournal;
use growth_core::state::keys;
use growth_core::{
    ContextBoard, GrowthCfg, GrowthOptimizer, PumpCommand, TurbidostatCfg, UnitIo,
};
use growth_hardware::SimAccessory;
use growth_traits::{
    Accessory, AccessoryGroup, BoxError, Context, DataHistory, ManualClock, MemoryContext,
    OdSensor, ProtoConfig, RegressionFit, TrendKind,
};

/// OD sensor returning scripted readings and a fixed regression fit.
struct ScriptedSensor {
    reading: Option<f64>,
    fit: Option<RegressionFit>,
    capacity: Option<usize>,
    faulted: bool,
}

impl Accessory for ScriptedSensor {
    fn value(&self) -> Option<f64> {
        self.reading
    }
    fn has_error(&self) -> bool {
        self.faulted
    }
    fn set_running_config(&mut self, _cfg: ProtoConfig) -> Result<(), BoxError> {
        Ok(())
    }
}

impl DataHistory for ScriptedSensor {
    fn regression(&self, _kind: TrendKind, _window: usize) -> Option<RegressionFit> {
        self.fit
    }
    fn set_capacity(&mut self, samples: usize) {
        self.capacity = Some(samples);
    }
}

struct ScriptedGroup {
    sensor: ScriptedSensor,
}

impl AccessoryGroup for ScriptedGroup {
    fn accessory(&mut self, id: &str) -> Option<&mut dyn Accessory> {
        (id == growth_traits::ids::od_sensor(680)).then_some(&mut self.sensor as &mut dyn Accessory)
    }
    fn od_sensor(&mut self, id: &str) -> Option<&mut dyn OdSensor> {
        (id == growth_traits::ids::od_sensor(680)).then_some(&mut self.sensor as &mut dyn OdSensor)
    }
    fn accessory_context(&self, _id: &str) -> Option<&dyn Context> {
        None
    }
}

/// Slope giving a 12 h doubling time in host regression units.
fn slope_12h() -> f64 {
    std::f64::consts::LN_2 / (12.0 * 36_000.0)
}

struct Unit {
    clock: ManualClock,
    pump: SimAccessory,
    group: ScriptedGroup,
    ctx: MemoryContext,
    board: ContextBoard,
    journal: RecordingJournal,
    opt: GrowthOptimizer,
}

impl Unit {
    fn new(r_squared: f64) -> Self {
        let clock = ManualClock::new();
        let opt = GrowthOptimizer::builder()
            .with_unit("pbr-1")
            .with_turbidostat(TurbidostatCfg {
                od_min: 0.4,
                od_max: 0.425,
                slow_down_range_pct: 25.0,
                ..TurbidostatCfg::default()
            })
            .with_growth(GrowthCfg::default())
            .with_clock(Arc::new(clock.clone()))
            .build()
            .expect("valid config");
        Self {
            clock,
            pump: SimAccessory::pump(),
            group: ScriptedGroup {
                sensor: ScriptedSensor {
                    reading: None,
                    fit: Some(RegressionFit {
                        intercept: 0.4,
                        slope: slope_12h(),
                        r_squared,
                    }),
                    capacity: None,
                    faulted: false,
                },
            },
            ctx: MemoryContext::new(),
            board: ContextBoard::new(),
            journal: RecordingJournal::new(),
            opt,
        }
    }

    fn read(&mut self, od: f64) -> PumpCommand {
        self.group.sensor.reading = Some(od);
        let inv = self.opt.invoke(UnitIo {
            pump: &self.pump,
            group: &mut self.group,
            context: &mut self.ctx,
            peers: &mut self.board,
            journal: &self.journal,
        });
        if let Some(cfg) = inv.pump.proto_config() {
            self.pump.set_running_config(cfg).expect("pump accepts");
        }
        self.clock.advance(inv.delay_s);
        inv.pump
    }
}

#[test]
fn noisy_readings_then_confirmed_jump_start_dilution() {
    let mut u = Unit::new(0.99);
    assert_eq!(u.read(0.40), PumpCommand::NotInfluenced); // pending
    assert_eq!(u.read(0.41), PumpCommand::NotInfluenced); // confirmed 0.405, inside band
    assert_eq!(u.read(0.43), PumpCommand::NotInfluenced); // rejected as noise
    assert_eq!(u.read(0.50), PumpCommand::NotInfluenced); // pending again
    assert_eq!(u.read(0.51), PumpCommand::Full(100.0));

    assert!(u.ctx.get_bool(keys::MODE_DILUTION, false));
    assert!(!u.ctx.get_bool(keys::MODE_STABILIZED, true));
    assert_eq!(u.ctx.get_string(keys::PHASE, ""), "diluting");
    // A series was opened: earliest declaration time is set
    assert!(u.ctx.get(keys::STABILIZED_TIME).is_some());
    assert_eq!(u.group.sensor.capacity, Some(600));
    assert!(u.journal.contains("External pump started"));
}

#[test]
fn slow_down_then_stop() {
    let mut u = Unit::new(0.99);
    u.read(0.43);
    assert_eq!(u.read(0.431), PumpCommand::Full(100.0));
    // (0.38 + 0.4305) / 2 = 0.40525: inside the lower quarter of the band
    assert_eq!(u.read(0.38), PumpCommand::Slow(50.0));
    // (0.37 + 0.40525) / 2 <= 0.4
    assert_eq!(u.read(0.37), PumpCommand::Off);
    assert!(!u.running());
    assert!(!u.ctx.get_bool(keys::MODE_DILUTION, true));
    assert_eq!(u.ctx.get_string(keys::PHASE, ""), "measuring-step");
    assert!(u.journal.contains("External pump stopped"));
}

impl Unit {
    fn running(&self) -> bool {
        self.pump.value().is_some()
    }

    /// Start, stop, then regrow past the band and start again.
    fn one_full_step(&mut self) -> PumpCommand {
        self.read(0.43);
        self.read(0.431);
        self.read(0.38);
        self.read(0.37);
        // 0.41 jumps too far from the last confirmed value and is rejected
        self.read(0.41);
        self.read(0.43);
        self.read(0.431)
    }
}

#[test]
fn low_confidence_fit_is_not_counted() {
    let mut u = Unit::new(0.5);
    assert_eq!(u.one_full_step(), PumpCommand::Full(100.0));
    assert_eq!(u.ctx.get_i64(keys::STEP_COUNTER, -1), 0);
    assert!(u.ctx.get_list(keys::STEP_DOUBLING_TIME).is_empty());
    assert!(u.journal.contains("step not counted"));
}

#[test]
fn confident_fit_counts_the_step() {
    let mut u = Unit::new(0.99);
    assert_eq!(u.one_full_step(), PumpCommand::Full(100.0));
    assert_eq!(u.ctx.get_i64(keys::STEP_COUNTER, -1), 1);
    let dt = u.ctx.get_list(keys::STEP_DOUBLING_TIME);
    assert_eq!(dt.len(), 1);
    assert!((dt[0] - 12.0).abs() < 1e-9);
    assert!(
        u.journal
            .contains("doubling time of the step was 12 h and step no. is 1")
    );
}

#[test]
fn faulted_sensor_leaves_context_untouched() {
    let mut u = Unit::new(0.99);
    u.read(0.40);
    u.read(0.41);
    let before = u.ctx.clone();
    u.group.sensor.faulted = true;
    assert_eq!(u.read(0.60), PumpCommand::NotInfluenced);
    assert_eq!(u.ctx, before);
}

#[test]
fn missing_reading_is_not_influenced() {
    let mut u = Unit::new(0.99);
    u.read(0.40);
    u.group.sensor.reading = None;
    let inv = u.opt.invoke(UnitIo {
        pump: &u.pump,
        group: &mut u.group,
        context: &mut u.ctx,
        peers: &mut u.board,
        journal: &u.journal,
    });
    assert_eq!(inv.pump, PumpCommand::NotInfluenced);
    assert_eq!(inv.delay_s, 60);
}
