//! Two-cycle confirm-then-average filter for OD readings.
//!
//! Raw OD telemetry shows single-sample spikes. A reading that jumps away
//! from the last confirmed value is held back for one cycle; only a following
//! reading close to it (or any reading while a dilution runs) is acted upon,
//! and then as the midpoint of the two.

use crate::util::round_to;

/// Persisted averager state (`odLast`, `odNoiseFlag`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AveragerState {
    pub od_last: f64,
    pub noise_flag: bool,
}

impl Default for AveragerState {
    /// A fresh context treats the first reading as unconfirmed.
    fn default() -> Self {
        Self {
            od_last: 0.0,
            noise_flag: true,
        }
    }
}

/// Averager decision for one reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Averaged {
    /// Same reading as last time (3 decimals); nothing to do.
    Unchanged,
    /// Reading stored, waiting for confirmation by the next one.
    Pending,
    /// Reading jumped too far and is treated as noise.
    Rejected,
    /// Smoothed value safe to act upon.
    Confirmed(f64),
}

#[derive(Debug, Clone, Copy)]
pub struct SignalAverager {
    noise_ratio: f64,
}

impl Default for SignalAverager {
    fn default() -> Self {
        Self { noise_ratio: 0.04 }
    }
}

impl SignalAverager {
    pub fn new(noise_ratio: f64) -> Self {
        Self { noise_ratio }
    }

    /// Filter reading `v`. `diluting` accepts any jump, since OD legitimately
    /// moves fast while the pump runs.
    pub fn filter(&self, v: f64, diluting: bool, state: &mut AveragerState) -> Averaged {
        if !v.is_finite() || round_to(v, 3) == round_to(state.od_last, 3) {
            return Averaged::Unchanged;
        }
        if state.noise_flag {
            state.noise_flag = false;
            state.od_last = v;
            tracing::debug!(od = v, "od reading pending confirmation");
            return Averaged::Pending;
        }
        let ratio = (1.0 - v / state.od_last).abs();
        if diluting || ratio < self.noise_ratio {
            let mid = (v + state.od_last) / 2.0;
            state.od_last = mid;
            Averaged::Confirmed(mid)
        } else {
            state.noise_flag = true;
            state.od_last = v;
            tracing::debug!(od = v, ratio, "od reading rejected as noise");
            Averaged::Rejected
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_reading_after_init_is_pending() {
        let avg = SignalAverager::default();
        let mut st = AveragerState::default();
        assert_eq!(avg.filter(0.40, false, &mut st), Averaged::Pending);
        assert_eq!(st.od_last, 0.40);
        assert!(!st.noise_flag);
    }

    #[test]
    fn close_reading_is_averaged() {
        let avg = SignalAverager::default();
        let mut st = AveragerState {
            od_last: 0.40,
            noise_flag: false,
        };
        match avg.filter(0.41, false, &mut st) {
            Averaged::Confirmed(v) => assert!((v - 0.405).abs() < 1e-12),
            other => panic!("unexpected {other:?}"),
        }
        assert!((st.od_last - 0.405).abs() < 1e-12);
    }

    #[test]
    fn jump_is_rejected_then_pending() {
        let avg = SignalAverager::default();
        let mut st = AveragerState {
            od_last: 0.405,
            noise_flag: false,
        };
        assert_eq!(avg.filter(0.43, false, &mut st), Averaged::Rejected);
        assert!(st.noise_flag);
        assert_eq!(avg.filter(0.50, false, &mut st), Averaged::Pending);
        assert!(!st.noise_flag);
    }

    #[test]
    fn jump_is_accepted_while_diluting() {
        let avg = SignalAverager::default();
        let mut st = AveragerState {
            od_last: 0.50,
            noise_flag: false,
        };
        assert!(matches!(avg.filter(0.40, true, &mut st), Averaged::Confirmed(_)));
    }

    #[test]
    fn same_reading_is_unchanged_and_nan_ignored() {
        let avg = SignalAverager::default();
        let mut st = AveragerState {
            od_last: 0.4121,
            noise_flag: false,
        };
        assert_eq!(avg.filter(0.4124, false, &mut st), Averaged::Unchanged);
        assert_eq!(avg.filter(f64::NAN, false, &mut st), Averaged::Unchanged);
        assert_eq!(st.od_last, 0.4121);
    }
}
