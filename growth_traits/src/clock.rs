use std::time::Instant;

/// Experiment clock: the only time source of the control stack.
///
/// - duration_secs(): whole seconds since the experiment started, monotonic per unit
/// - secs_since(): helper to compute elapsed seconds from an earlier reading
pub trait ExperimentClock {
    fn duration_secs(&self) -> u64;

    /// Seconds elapsed since `earlier`, saturating at 0 on underflow.
    fn secs_since(&self, earlier: u64) -> u64 {
        self.duration_secs().saturating_sub(earlier)
    }
}

/// Real-time experiment clock backed by std::time::Instant.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicExperimentClock {
    started: Instant,
}

impl Default for MonotonicExperimentClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicExperimentClock {
    #[inline]
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl ExperimentClock for MonotonicExperimentClock {
    #[inline]
    fn duration_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }
}

/// Deterministic clock whose time is advanced manually (simulation and tests).
///
/// Clones share the same underlying time, so several simulated units can be
/// driven from one clock.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    secs: std::sync::Arc<std::sync::atomic::AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the clock at the given experiment duration.
    pub fn starting_at(secs: u64) -> Self {
        let c = Self::new();
        c.set(secs);
        c
    }

    /// Advance the clock by `secs` seconds.
    pub fn advance(&self, secs: u64) {
        self.secs
            .fetch_add(secs, std::sync::atomic::Ordering::Relaxed);
    }

    /// Set the absolute experiment duration.
    pub fn set(&self, secs: u64) {
        self.secs.store(secs, std::sync::atomic::Ordering::Relaxed);
    }
}

impl ExperimentClock for ManualClock {
    fn duration_secs(&self) -> u64 {
        self.secs.load(std::sync::atomic::Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_clones_share_time() {
        let a = ManualClock::starting_at(10);
        let b = a.clone();
        a.advance(50);
        assert_eq!(b.duration_secs(), 60);
        assert_eq!(b.secs_since(20), 40);
        assert_eq!(b.secs_since(100), 0);
    }
}
