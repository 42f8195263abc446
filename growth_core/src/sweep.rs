//! Bidirectional sweep over a fixed list of set points.

use crate::channel::SetPoint;

/// Walks `0, 1, .., N-1, N-2, .., 1, 0, 1, ..` over the configured steps.
#[derive(Debug, Clone)]
pub struct StepSequencer {
    steps: Vec<SetPoint>,
}

impl StepSequencer {
    pub fn new(steps: Vec<SetPoint>) -> Self {
        Self { steps }
    }

    pub fn steps(&self) -> &[SetPoint] {
        &self.steps
    }

    /// Sweeps with fewer than two steps never move.
    pub fn is_active(&self) -> bool {
        self.steps.len() > 1
    }

    /// Length of one full forward-and-back cycle.
    pub fn period(&self) -> u64 {
        if self.is_active() {
            2 * (self.steps.len() as u64 - 1)
        } else {
            1
        }
    }

    /// Step index for a change counter.
    pub fn index(&self, counter: u64) -> usize {
        if !self.is_active() {
            return 0;
        }
        let n = self.steps.len() as u64;
        let c = counter % self.period();
        if c < n { c as usize } else { (self.period() - c) as usize }
    }

    pub fn current(&self, counter: u64) -> Option<&SetPoint> {
        self.steps.get(self.index(counter))
    }

    /// Next counter value and the set point to apply, `None` when inactive.
    pub fn advance(&self, counter: u64) -> Option<(u64, &SetPoint)> {
        if !self.is_active() {
            return None;
        }
        let next = (counter + 1) % self.period();
        Some((next, &self.steps[self.index(next)]))
    }
}
