//! Defers dilution while an O2 evolution/respiration measurement runs.

use growth_traits::AccessoryGroup;

use crate::config::SuspensionCfg;

/// Context flag published by the O2 measurement protocol.
pub const O2_MEASUREMENT_FLAG: &str = "modeO2EvolResp";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspensionAction {
    /// No measurement in progress; run the turbidostat.
    Proceed,
    /// Measurement in progress and the pump runs: force it to its minimum.
    Suspend,
    /// Measurement in progress and the pump is idle: leave it alone.
    Defer,
    /// Measurement finished while suspended: force the pump to its maximum once.
    Resume,
}

#[derive(Debug, Clone)]
pub struct SuspensionCoordinator {
    cfg: SuspensionCfg,
}

impl SuspensionCoordinator {
    pub fn new(cfg: SuspensionCfg) -> Self {
        Self { cfg }
    }

    /// Whether the O2 probe currently publishes an active measurement.
    pub fn measurement_active(&self, group: &dyn AccessoryGroup) -> bool {
        self.cfg.enabled
            && group
                .accessory_context(&self.cfg.o2_probe)
                .is_some_and(|ctx| ctx.get_bool(O2_MEASUREMENT_FLAG, false))
    }

    pub fn decide(&self, group: &dyn AccessoryGroup, pump_running: bool, suspended: bool) -> SuspensionAction {
        match (self.measurement_active(group), pump_running, suspended) {
            (true, true, _) => SuspensionAction::Suspend,
            (true, false, _) => SuspensionAction::Defer,
            (false, _, true) => SuspensionAction::Resume,
            (false, _, false) => SuspensionAction::Proceed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use growth_traits::{Accessory, Context, MemoryContext, OdSensor};

    #[derive(Default)]
    struct Probe {
        ctx: MemoryContext,
    }

    impl AccessoryGroup for Probe {
        fn accessory(&mut self, _id: &str) -> Option<&mut dyn Accessory> {
            None
        }
        fn od_sensor(&mut self, _id: &str) -> Option<&mut dyn OdSensor> {
            None
        }
        fn accessory_context(&self, id: &str) -> Option<&dyn Context> {
            (id == growth_traits::ids::O2_PROBE).then_some(&self.ctx as &dyn Context)
        }
    }

    #[test]
    fn decisions() {
        let c = SuspensionCoordinator::new(SuspensionCfg::default());
        let mut g = Probe::default();
        assert_eq!(c.decide(&g, true, false), SuspensionAction::Proceed);
        assert_eq!(c.decide(&g, true, true), SuspensionAction::Resume);
        g.ctx.put(O2_MEASUREMENT_FLAG, 1i64.into());
        assert_eq!(c.decide(&g, true, false), SuspensionAction::Suspend);
        assert_eq!(c.decide(&g, false, false), SuspensionAction::Defer);
    }

    #[test]
    fn disabled_never_suspends() {
        let c = SuspensionCoordinator::new(SuspensionCfg {
            enabled: false,
            ..SuspensionCfg::default()
        });
        let mut g = Probe::default();
        g.ctx.put(O2_MEASUREMENT_FLAG, true.into());
        assert_eq!(c.decide(&g, true, false), SuspensionAction::Proceed);
    }
}
