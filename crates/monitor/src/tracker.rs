//! Per-patient HR and RR histories.

use triage_core::{Result, SignalKind, ThresholdConfig, TriageError};

use crate::window::RollingWindow;

#[derive(Debug, Clone)]
pub struct VitalSignTracker {
    heart_rate: RollingWindow,
    rr: RollingWindow,
    /// Most recent samples averaged by `average_*`.
    averaging_window: usize,
    /// Samples required before an average is defined.
    min_samples: usize,
}

impl VitalSignTracker {
    /// Create a tracker whose windows hold `history_capacity` samples each.
    pub fn new(history_capacity: usize, thresholds: &ThresholdConfig) -> Self {
        Self {
            heart_rate: RollingWindow::new(history_capacity),
            rr: RollingWindow::new(history_capacity),
            averaging_window: thresholds.rank_window_size,
            min_samples: thresholds.min_sample_threshold,
        }
    }

    pub fn record_heart_rate(&mut self, value: f64) {
        self.heart_rate.push(value);
    }

    pub fn record_rr(&mut self, value: f64) {
        self.rr.push(value);
    }

    pub fn record(&mut self, kind: SignalKind, value: f64) {
        match kind {
            SignalKind::HeartRate => self.record_heart_rate(value),
            SignalKind::RrInterval => self.record_rr(value),
        }
    }

    /// Latest HR reading.
    pub fn current_heart_rate(&self) -> Option<f64> {
        self.heart_rate.latest()
    }

    pub fn current_rr(&self) -> Option<f64> {
        self.rr.latest()
    }

    pub fn window(&self, kind: SignalKind) -> &RollingWindow {
        match kind {
            SignalKind::HeartRate => &self.heart_rate,
            SignalKind::RrInterval => &self.rr,
        }
    }

    pub fn heart_rate_window(&self) -> &RollingWindow {
        &self.heart_rate
    }

    pub fn rr_window(&self) -> &RollingWindow {
        &self.rr
    }

    pub fn sample_count(&self, kind: SignalKind) -> usize {
        self.window(kind).len()
    }

    /// Average of the most recent HR samples.
    pub fn average_heart_rate(&self) -> Result<f64> {
        self.recent_average(SignalKind::HeartRate)
    }

    /// Average of the most recent RR samples.
    pub fn average_rr(&self) -> Result<f64> {
        self.recent_average(SignalKind::RrInterval)
    }

    pub fn average(&self, kind: SignalKind) -> Result<f64> {
        self.recent_average(kind)
    }

    fn recent_average(&self, kind: SignalKind) -> Result<f64> {
        let window = self.window(kind);
        if window.len() < self.min_samples {
            return Err(TriageError::InsufficientSamples {
                signal: kind,
                available: window.len(),
                required: self.min_samples,
            });
        }
        window.average_last(self.averaging_window)
    }
}
