//! Bounds checks for averaged vital signs.
//!
//! The evaluator holds no state of its own. HR is checked against a strict
//! `(lowest, highest)` band on its recent average. RR is checked by comparing
//! the latest interval to a multiple of the recent average, which flags a
//! sudden lengthening of the beat interval.

use serde::Serialize;
use triage_core::{SignalKind, ThresholdConfig, TriageError};

use crate::tracker::VitalSignTracker;

/// Outcome of a single bounds check.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    InBounds,
    OutOfBounds { signal: SignalKind, message: String },
    /// Not enough data yet. Never a reason to alert.
    NotYetEvaluable,
}

impl Verdict {
    pub fn is_out_of_bounds(&self) -> bool {
        matches!(self, Verdict::OutOfBounds { .. })
    }
}

#[derive(Debug, Clone)]
pub struct ThresholdEvaluator {
    config: ThresholdConfig,
}

impl ThresholdEvaluator {
    pub fn new(config: ThresholdConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ThresholdConfig {
        &self.config
    }

    /// Verdict for an already averaged heart rate.
    pub fn heart_rate_verdict(&self, avg_hr: f64) -> Verdict {
        let c = &self.config;
        if avg_hr > c.lowest_hr_bound && avg_hr < c.highest_hr_bound {
            return Verdict::InBounds;
        }
        Verdict::OutOfBounds {
            signal: SignalKind::HeartRate,
            message: format!(
                "average heart rate {avg_hr:.1} bpm outside ({:.1}, {:.1})",
                c.lowest_hr_bound, c.highest_hr_bound
            ),
        }
    }

    /// Verdict for the latest RR interval against its recent average.
    pub fn rr_verdict(&self, current_rr: Option<f64>, avg_rr: f64) -> Verdict {
        let Some(current) = current_rr else {
            return Verdict::NotYetEvaluable;
        };
        let limit = avg_rr * self.config.rr_multiplier;
        if current < limit {
            return Verdict::InBounds;
        }
        Verdict::OutOfBounds {
            signal: SignalKind::RrInterval,
            message: format!(
                "RR interval {current:.0} ms at or above {limit:.0} ms (average {avg_rr:.1} ms x {})",
                self.config.rr_multiplier
            ),
        }
    }

    pub fn check_heart_rate(&self, tracker: &VitalSignTracker) -> Verdict {
        self.check(SignalKind::HeartRate, tracker)
    }

    pub fn check_rr(&self, tracker: &VitalSignTracker) -> Verdict {
        self.check(SignalKind::RrInterval, tracker)
    }

    /// Verdict for `kind` from the tracker's recent average.
    pub fn check(&self, kind: SignalKind, tracker: &VitalSignTracker) -> Verdict {
        let avg = match tracker.average(kind) {
            Ok(avg) => avg,
            Err(TriageError::InsufficientSamples { .. }) | Err(TriageError::EmptyWindow) => {
                return Verdict::NotYetEvaluable;
            }
            Err(e) => {
                tracing::debug!(error = %e, signal = %kind, "bounds check skipped");
                return Verdict::NotYetEvaluable;
            }
        };
        match kind {
            SignalKind::HeartRate => self.heart_rate_verdict(avg),
            SignalKind::RrInterval => self.rr_verdict(tracker.current_rr(), avg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evaluator() -> ThresholdEvaluator {
        ThresholdEvaluator::new(ThresholdConfig::default())
    }

    #[test]
    fn heart_rate_above_band() {
        let v = evaluator().heart_rate_verdict(115.0);
        match v {
            Verdict::OutOfBounds { signal, message } => {
                assert_eq!(signal, SignalKind::HeartRate);
                assert!(message.contains("115.0"));
            }
            other => panic!("expected OutOfBounds, got: {other:?}"),
        }
    }

    #[test]
    fn heart_rate_inside_band() {
        assert_eq!(evaluator().heart_rate_verdict(90.0), Verdict::InBounds);
    }

    #[test]
    fn heart_rate_bounds_are_exclusive() {
        let e = evaluator();
        assert!(e.heart_rate_verdict(60.0).is_out_of_bounds());
        assert!(e.heart_rate_verdict(110.0).is_out_of_bounds());
        assert_eq!(e.heart_rate_verdict(60.1), Verdict::InBounds);
        assert!(e.heart_rate_verdict(45.0).is_out_of_bounds());
    }

    #[test]
    fn rr_spike_is_out_of_bounds() {
        let v = evaluator().rr_verdict(Some(1000.0), 400.0);
        assert!(v.is_out_of_bounds());
    }

    #[test]
    fn rr_below_limit_is_in_bounds() {
        assert_eq!(evaluator().rr_verdict(Some(799.0), 400.0), Verdict::InBounds);
        assert!(evaluator().rr_verdict(Some(800.0), 400.0).is_out_of_bounds());
    }

    #[test]
    fn rr_without_current_has_no_verdict() {
        assert_eq!(evaluator().rr_verdict(None, 400.0), Verdict::NotYetEvaluable);
    }

    #[test]
    fn tracker_checks_wait_for_samples() {
        let e = evaluator();
        let mut tracker = VitalSignTracker::new(50, e.config());
        for _ in 0..4 {
            tracker.record_heart_rate(150.0);
            tracker.record_rr(400.0);
        }
        assert_eq!(e.check_heart_rate(&tracker), Verdict::NotYetEvaluable);
        assert_eq!(e.check_rr(&tracker), Verdict::NotYetEvaluable);

        tracker.record_heart_rate(150.0);
        assert!(e.check(SignalKind::HeartRate, &tracker).is_out_of_bounds());
    }

    #[test]
    fn tracker_rr_check_includes_latest_sample() {
        let e = evaluator();
        let mut tracker = VitalSignTracker::new(50, e.config());
        for _ in 0..5 {
            tracker.record_rr(400.0);
        }
        assert_eq!(e.check_rr(&tracker), Verdict::InBounds);

        // Average over [400, 400, 400, 400, 2000] is 720; limit 1440.
        tracker.record_rr(2000.0);
        assert!(e.check_rr(&tracker).is_out_of_bounds());
    }

    #[test]
    fn custom_multiplier() {
        let config = ThresholdConfig {
            rr_multiplier: 1.6,
            ..ThresholdConfig::default()
        };
        let e = ThresholdEvaluator::new(config);
        assert!(e.rr_verdict(Some(700.0), 400.0).is_out_of_bounds());
        assert_eq!(e.rr_verdict(Some(600.0), 400.0), Verdict::InBounds);
    }
}
