//! At-most-once alert latch.

use chrono::{DateTime, Utc};

/// Opens exactly once per session. There is no re-arm.
#[derive(Debug, Clone, Default)]
pub struct AlertGate {
    fired_at: Option<DateTime<Utc>>,
    suppressed: u64,
}

impl AlertGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` the first time it is called, `false` afterwards.
    pub fn try_fire(&mut self, patient_id: &str) -> bool {
        if self.fired_at.is_some() {
            self.suppressed += 1;
            tracing::debug!(
                patient_id,
                suppressed = self.suppressed,
                "alert already fired, suppressing"
            );
            return false;
        }
        self.fired_at = Some(Utc::now());
        true
    }

    pub fn already_fired(&self) -> bool {
        self.fired_at.is_some()
    }

    pub fn fired_at(&self) -> Option<DateTime<Utc>> {
        self.fired_at
    }

    /// Out-of-bounds detections swallowed since the gate fired.
    pub fn suppressed(&self) -> u64 {
        self.suppressed
    }
}
