//! Stability decision over the latest growth steps.

use crate::config::StabilityCfg;
use crate::growth::GrowthSeries;
use crate::util::SECS_PER_HOUR;

/// Two-sided 95% normal quantile.
const Z95: f64 = 1.96;

/// Summary statistics of the analyzed steps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepStats {
    pub n: usize,
    /// Mean doubling time in hours.
    pub mean: f64,
    /// Sample standard deviation (n-1).
    pub sd: f64,
    /// 95% confidence half-width of the mean.
    pub ci95: f64,
    /// Doubling-time trend in hours per hour.
    pub trend: f64,
}

impl StepStats {
    /// Compute over `(start_s, doubling_h)` pairs; `None` for fewer than two.
    pub fn compute(points: &[(f64, f64)]) -> Option<Self> {
        let n = points.len();
        if n < 2 {
            return None;
        }
        let nf = n as f64;
        let mean = points.iter().map(|p| p.1).sum::<f64>() / nf;
        let var = points.iter().map(|p| (p.1 - mean).powi(2)).sum::<f64>() / (nf - 1.0);
        let sd = var.sqrt();
        let ci95 = sd / nf.sqrt() * Z95;

        let (mut sx, mut sy, mut sxy, mut sx2) = (0.0, 0.0, 0.0, 0.0);
        for &(x, y) in points {
            sx += x;
            sy += y;
            sxy += x * y;
            sx2 += x * x;
        }
        let denom = nf * sx2 - sx * sx;
        let slope = if denom.abs() > f64::EPSILON {
            (nf * sxy - sx * sy) / denom
        } else {
            0.0
        };
        Some(Self {
            n,
            mean,
            sd,
            ci95,
            trend: slope * SECS_PER_HOUR,
        })
    }

    pub fn ci_ratio(&self) -> f64 {
        self.ci95 / self.mean
    }

    pub fn trend_ratio(&self) -> f64 {
        self.trend / self.mean
    }

    /// Journal line with averages, CI and trend.
    pub fn describe(&self) -> String {
        format!(
            "Steps doubling time Avg: {:.2} h, IC95 {:.2} ({:.1}%) with {:.2} h/h trend ({:.1}%)",
            self.mean,
            self.ci95,
            self.ci_ratio() * 100.0,
            self.trend,
            self.trend_ratio() * 100.0
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verdict {
    /// Not enough accepted steps yet.
    Collecting,
    Unstable(StepStats),
    /// Statistics pass but the minimum dwell has not elapsed.
    Dwelling(StepStats),
    Stable(StepStats),
}

#[derive(Debug, Clone)]
pub struct StabilityDetector {
    cfg: StabilityCfg,
}

impl StabilityDetector {
    pub fn new(cfg: StabilityCfg) -> Self {
        Self { cfg }
    }

    pub fn cfg(&self) -> &StabilityCfg {
        &self.cfg
    }

    pub fn criteria_met(&self, s: &StepStats) -> bool {
        s.mean > 0.0
            && s.ci_ratio() <= self.cfg.confidence_max_pct / 100.0
            && s.trend_ratio().abs() <= self.cfg.trend_max_pct / 100.0
    }

    pub fn evaluate(&self, series: &GrowthSeries, step_counter: u64, now_s: u64, stabilized_time: u64) -> Verdict {
        if step_counter < self.cfg.analyzed_steps as u64 || series.len() < self.cfg.analyzed_steps {
            return Verdict::Collecting;
        }
        let points: Vec<(f64, f64)> = series
            .iter()
            .map(|s| (s.start_s as f64, s.doubling_h))
            .collect();
        let Some(stats) = StepStats::compute(&points) else {
            return Verdict::Collecting;
        };
        if !self.criteria_met(&stats) {
            Verdict::Unstable(stats)
        } else if now_s < stabilized_time {
            Verdict::Dwelling(stats)
        } else {
            Verdict::Stable(stats)
        }
    }

    /// Whether the forced-advance deadline has passed.
    pub fn forced(&self, now_s: u64, stabilized_time_max: Option<u64>) -> bool {
        self.cfg.max_dwell_s.is_some() && stabilized_time_max.is_some_and(|t| now_s >= t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::growth::StepSample;
    use rstest::rstest;

    const STEADY: [f64; 6] = [12.0; 6];
    /// Zero trend, CI95 near 6% of the mean.
    const SCATTERED: [f64; 6] = [13.0, 11.0, 12.0, 12.0, 11.0, 13.0];
    /// CI95 near 2.2% of the mean, trend near 1.4% per hour.
    const DRIFTING: [f64; 6] = [12.0, 12.18, 12.36, 12.54, 12.72, 12.9];

    fn hourly(doubling: &[f64]) -> GrowthSeries {
        let mut series = GrowthSeries::new(doubling.len());
        for (i, d) in doubling.iter().enumerate() {
            series.push(StepSample {
                start_s: (i as u64 + 1) * 3600,
                elapsed_s: 3000,
                doubling_h: *d,
            });
        }
        series
    }

    fn detector() -> StabilityDetector {
        StabilityDetector::new(StabilityCfg {
            analyzed_steps: 6,
            confidence_max_pct: 3.0,
            trend_max_pct: 1.0,
            min_dwell_s: 0,
            max_dwell_s: None,
        })
    }

    #[rstest]
    #[case::steady_after_dwell(&STEADY, 10 * 3600, 8 * 3600, "stable")]
    #[case::steady_before_dwell(&STEADY, 10 * 3600, 20 * 3600, "dwelling")]
    #[case::confidence_only(&SCATTERED, 10 * 3600, 0, "unstable")]
    #[case::trend_only(&DRIFTING, 10 * 3600, 0, "unstable")]
    fn each_criterion_alone_blocks_stability(
        #[case] doubling: &[f64],
        #[case] now_s: u64,
        #[case] stabilized_time: u64,
        #[case] expected: &str,
    ) {
        let verdict = detector().evaluate(&hourly(doubling), 6, now_s, stabilized_time);
        let got = match verdict {
            Verdict::Collecting => "collecting",
            Verdict::Unstable(_) => "unstable",
            Verdict::Dwelling(_) => "dwelling",
            Verdict::Stable(_) => "stable",
        };
        assert_eq!(got, expected, "{verdict:?}");
    }

    #[test]
    fn violations_are_the_ones_intended() {
        let d = detector();
        let s = StepStats::compute(&pts(&SCATTERED)).unwrap();
        assert!(s.ci_ratio() > 0.03 && s.trend.abs() < 1e-9);
        assert!(!d.criteria_met(&s));
        let s = StepStats::compute(&pts(&DRIFTING)).unwrap();
        assert!(s.ci_ratio() < 0.03 && s.trend_ratio() > 0.01);
        assert!(!d.criteria_met(&s));
    }

    #[test]
    fn fewer_steps_than_analyzed_keep_collecting() {
        let verdict = detector().evaluate(&hourly(&STEADY[..5]), 5, 10 * 3600, 0);
        assert_eq!(verdict, Verdict::Collecting);
    }

    fn pts(doubling: &[f64]) -> Vec<(f64, f64)> {
        doubling
            .iter()
            .enumerate()
            .map(|(i, d)| ((i as f64 + 1.0) * 3600.0, *d))
            .collect()
    }

    #[test]
    fn constant_series_has_no_spread() {
        let pts: Vec<_> = (0..6).map(|i| (i as f64 * 3600.0, 12.0)).collect();
        let s = StepStats::compute(&pts).unwrap();
        assert_eq!(s.mean, 12.0);
        assert_eq!(s.ci95, 0.0);
        assert_eq!(s.trend, 0.0);
    }

    #[test]
    fn trend_is_hours_per_hour() {
        // +0.5 h of doubling time per hour of experiment
        let pts: Vec<_> = (0..4).map(|i| (i as f64 * 3600.0, 10.0 + 0.5 * i as f64)).collect();
        let s = StepStats::compute(&pts).unwrap();
        assert!((s.trend - 0.5).abs() < 1e-9);
    }

    #[test]
    fn sample_deviation_uses_n_minus_one() {
        let s = StepStats::compute(&[(0.0, 1.0), (1.0, 3.0)]).unwrap();
        assert!((s.sd - 2f64.sqrt()).abs() < 1e-12);
        assert!((s.ci95 - 1.96).abs() < 1e-12);
    }

    #[test]
    fn describe_formats_percentages() {
        let pts: Vec<_> = (0..6).map(|i| (i as f64 * 3600.0, 12.0)).collect();
        let s = StepStats::compute(&pts).unwrap();
        assert_eq!(
            s.describe(),
            "Steps doubling time Avg: 12.00 h, IC95 0.00 (0.0%) with 0.00 h/h trend (0.0%)"
        );
    }
}
