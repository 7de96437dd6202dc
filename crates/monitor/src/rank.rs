//! Severity rank used to order patients by urgency.
//!
//! `rank = round(avg_hr + (max(last RR) - min(last RR)))` where the RR
//! spread covers only the most recent `rank_window_size` intervals. A higher
//! rank means a faster or more irregular heart.

use triage_core::{Result, SignalKind, ThresholdConfig, TriageError};

use crate::tracker::VitalSignTracker;

#[derive(Debug, Clone)]
pub struct SeverityRanker {
    window_size: usize,
    min_hr_samples: usize,
}

impl SeverityRanker {
    pub fn new(config: &ThresholdConfig) -> Self {
        Self {
            window_size: config.rank_window_size,
            min_hr_samples: config.rank_min_hr_samples,
        }
    }

    pub fn min_hr_samples(&self) -> usize {
        self.min_hr_samples
    }

    /// Whether the tracker holds enough HR samples to be ranked.
    pub fn is_ready(&self, tracker: &VitalSignTracker) -> bool {
        tracker.sample_count(SignalKind::HeartRate) >= self.min_hr_samples
    }

    pub fn compute_rank(&self, tracker: &VitalSignTracker) -> Result<i64> {
        if !self.is_ready(tracker) {
            return Err(TriageError::InsufficientSamples {
                signal: SignalKind::HeartRate,
                available: tracker.sample_count(SignalKind::HeartRate),
                required: self.min_hr_samples,
            });
        }
        let avg_hr = tracker.average_heart_rate()?;
        let spread = rr_spread(&tracker.rr_window().last_n(self.window_size));
        Ok(Self::rank_from(avg_hr, spread))
    }

    pub fn rank_from(avg_hr: f64, rr_spread: f64) -> i64 {
        (avg_hr + rr_spread).round() as i64
    }
}

/// `max - min` over the given intervals, zero when there are none.
fn rr_spread(recent: &[f64]) -> f64 {
    if recent.is_empty() {
        return 0.0;
    }
    let (min, max) = recent
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
    max - min
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker_with(hr: &[f64], rr: &[f64]) -> VitalSignTracker {
        let mut t = VitalSignTracker::new(50, &ThresholdConfig::default());
        for v in hr {
            t.record_heart_rate(*v);
        }
        for v in rr {
            t.record_rr(*v);
        }
        t
    }

    #[test]
    fn rank_combines_average_and_spread() {
        let t = tracker_with(&[80.0; 15], &[800.0, 820.0, 780.0, 900.0, 810.0]);
        let ranker = SeverityRanker::new(&ThresholdConfig::default());
        assert_eq!(ranker.compute_rank(&t).unwrap(), 200);
    }

    #[test]
    fn spread_uses_only_last_five_rr() {
        // The 2000 ms outlier has scrolled out of the last five.
        let t = tracker_with(
            &[80.0; 15],
            &[2000.0, 800.0, 820.0, 780.0, 900.0, 810.0],
        );
        let ranker = SeverityRanker::new(&ThresholdConfig::default());
        assert_eq!(ranker.compute_rank(&t).unwrap(), 200);
    }

    #[test]
    fn empty_rr_has_zero_spread() {
        let t = tracker_with(&[72.4; 15], &[]);
        let ranker = SeverityRanker::new(&ThresholdConfig::default());
        assert_eq!(ranker.compute_rank(&t).unwrap(), 72);
    }

    #[test]
    fn requires_fifteen_hr_samples() {
        let t = tracker_with(&[80.0; 14], &[800.0; 5]);
        let ranker = SeverityRanker::new(&ThresholdConfig::default());
        assert!(!ranker.is_ready(&t));
        match ranker.compute_rank(&t) {
            Err(TriageError::InsufficientSamples { available, required, .. }) => {
                assert_eq!(available, 14);
                assert_eq!(required, 15);
            }
            other => panic!("expected InsufficientSamples, got: {other:?}"),
        }
    }

    #[test]
    fn rounds_half_away_from_zero() {
        assert_eq!(SeverityRanker::rank_from(80.5, 0.0), 81);
        assert_eq!(SeverityRanker::rank_from(80.4, 0.0), 80);
        assert_eq!(SeverityRanker::rank_from(80.0, 120.0), 200);
    }
}
