//! Growth-rate estimation between dilutions.
//!
//! When a dilution starts, the OD history since the previous pump stop is an
//! exponential growth curve. Its trailing part is fitted with `OD = A·e^(B·t)`
//! and the rate converted to a doubling time in hours. Fits below the
//! configured R² are discarded.

use std::collections::VecDeque;

use growth_traits::{DataHistory, TrendKind};

use crate::config::{EvalWindow, GrowthCfg};
use crate::util::SECS_PER_HOUR;

/// Samples dropped from the end of a step (pump start transient).
const TAIL_SAMPLES: u64 = 3;

/// One accepted growth step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepSample {
    /// Experiment second at which the step ended (dilution started).
    pub start_s: u64,
    /// Seconds since the previous pump stop.
    pub elapsed_s: u64,
    pub doubling_h: f64,
}

/// Fixed-capacity ring of the latest growth steps.
#[derive(Debug, Clone, PartialEq)]
pub struct GrowthSeries {
    capacity: usize,
    samples: VecDeque<StepSample>,
}

impl GrowthSeries {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity),
        }
    }

    /// Rebuild from persisted parallel arrays, keeping the newest entries.
    pub fn from_parts(capacity: usize, start: &[f64], elapsed: &[f64], doubling: &[f64]) -> Self {
        let mut s = Self::new(capacity);
        for ((t, e), d) in start.iter().zip(elapsed).zip(doubling) {
            s.push(StepSample {
                start_s: *t as u64,
                elapsed_s: *e as u64,
                doubling_h: *d,
            });
        }
        s
    }

    pub fn push(&mut self, sample: StepSample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &StepSample> {
        self.samples.iter()
    }

    pub fn start_times(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.start_s as f64).collect()
    }

    pub fn elapsed(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.elapsed_s as f64).collect()
    }

    pub fn doubling_times(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.doubling_h).collect()
    }

    /// Mean doubling time, `None` when empty.
    pub fn mean_doubling(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        Some(self.samples.iter().map(|s| s.doubling_h).sum::<f64>() / self.samples.len() as f64)
    }
}

/// Doubling time estimated for one step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrowthEstimate {
    pub doubling_h: f64,
    pub r_squared: f64,
    /// Samples fed to the regression.
    pub window: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepOutcome {
    Accepted(GrowthEstimate),
    /// Fit quality below the minimum; the step is not counted.
    LowConfidence(GrowthEstimate),
    /// No growth (non-positive rate); the step is not counted.
    NoGrowth { window: usize },
    /// The history could not be fitted.
    NoFit { window: usize },
}

#[derive(Debug, Clone)]
pub struct GrowthRateEstimator {
    cfg: GrowthCfg,
}

impl GrowthRateEstimator {
    pub fn new(cfg: GrowthCfg) -> Self {
        Self { cfg }
    }

    pub fn cfg(&self) -> &GrowthCfg {
        &self.cfg
    }

    /// Regression window in samples for a step of `elapsed_s`.
    pub fn window(&self, elapsed_s: u64, interval_s: u64) -> usize {
        let interval = interval_s.max(1);
        let samples = elapsed_s / interval;
        let base = if samples > TAIL_SAMPLES {
            (samples - TAIL_SAMPLES) as usize
        } else {
            self.cfg.fallback_window
        };
        let w = match self.cfg.eval {
            EvalWindow::Fraction(f) => (base as f64 * f).ceil() as usize,
            EvalWindow::Delay(d) => base.saturating_sub(d.div_ceil(interval) as usize),
        };
        w.max(2)
    }

    /// Doubling time in hours for a regression slope in host time units.
    pub fn doubling_hours(&self, slope: f64) -> f64 {
        let per_hour = slope * SECS_PER_HOUR / self.cfg.regression_time_unit_s;
        std::f64::consts::LN_2 / per_hour
    }

    pub fn estimate<H: DataHistory + ?Sized>(&self, history: &H, elapsed_s: u64, interval_s: u64) -> StepOutcome {
        let window = self.window(elapsed_s, interval_s);
        let Some(fit) = history.regression(TrendKind::Exponential, window) else {
            return StepOutcome::NoFit { window };
        };
        if !(fit.slope.is_finite() && fit.slope > 0.0) {
            return StepOutcome::NoGrowth { window };
        }
        let est = GrowthEstimate {
            doubling_h: self.doubling_hours(fit.slope),
            r_squared: fit.r_squared,
            window,
        };
        if fit.r_squared.is_nan() || fit.r_squared < self.cfg.r2_min {
            tracing::debug!(
                r_squared = fit.r_squared,
                r2_min = self.cfg.r2_min,
                doubling_h = est.doubling_h,
                "growth fit discarded"
            );
            StepOutcome::LowConfidence(est)
        } else {
            StepOutcome::Accepted(est)
        }
    }
}
