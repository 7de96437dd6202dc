//! One patient's triage state machine.
//!
//! ```text
//!   connect()                 enough HR samples (polled)
//! Disconnected ──────────► Evaluating ──────────────────► Evaluated
//!      ▲                        │                             │
//!      └──────── disconnect() ──┴─────────────────────────────┘
//! ```
//!
//! The monitor is synchronous and owned by a single task (see
//! [`crate::runtime`]). Listeners are called inline after every mutation with
//! an immutable [`PatientSnapshot`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use triage_core::sample::validate_value;
use triage_core::{
    Config, Patient, Report, ReportKind, Reporter, Result, SensorLink, SignalKind,
};

use crate::gate::AlertGate;
use crate::rank::SeverityRanker;
use crate::threshold::{ThresholdEvaluator, Verdict};
use crate::tracker::VitalSignTracker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Evaluating,
    Evaluated,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Evaluating => write!(f, "evaluating"),
            ConnectionState::Evaluated => write!(f, "evaluated"),
        }
    }
}

/// Read-only view of a patient for presentation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatientSnapshot {
    pub patient_id: String,
    pub sector_name: String,
    pub device_id: String,
    pub connection_state: ConnectionState,
    pub current_hr: Option<f64>,
    pub current_rr: Option<f64>,
    pub rank: Option<i64>,
    pub alert_fired: bool,
    pub alert_fired_at: Option<DateTime<Utc>>,
    /// Out-of-bounds detections since the alert fired.
    pub alerts_suppressed: u64,
    pub episode: u64,
    pub hr_history: Vec<f64>,
    pub rr_history: Vec<f64>,
}

/// Emitted to listeners after each mutation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PatientEvent {
    StateChanged {
        from: ConnectionState,
        to: ConnectionState,
        snapshot: PatientSnapshot,
    },
    SampleRecorded {
        kind: SignalKind,
        value: f64,
        snapshot: PatientSnapshot,
    },
    Ranked {
        rank: i64,
        snapshot: PatientSnapshot,
    },
    Alerted {
        signal: SignalKind,
        message: String,
        snapshot: PatientSnapshot,
    },
}

impl PatientEvent {
    pub fn snapshot(&self) -> &PatientSnapshot {
        match self {
            PatientEvent::StateChanged { snapshot, .. }
            | PatientEvent::SampleRecorded { snapshot, .. }
            | PatientEvent::Ranked { snapshot, .. }
            | PatientEvent::Alerted { snapshot, .. } => snapshot,
        }
    }
}

pub type Listener = Box<dyn Fn(&PatientEvent) + Send>;

/// What happened to an incoming sample.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleOutcome {
    /// Patient not connected.
    Ignored,
    /// Value failed validation and was not recorded.
    Dropped,
    Recorded(Verdict),
    /// Recorded, out of bounds, and the critical report was sent.
    Alerted,
}

/// Result of one evaluation poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationProgress {
    /// Not in `Evaluating`; nothing to poll.
    NotEvaluating,
    Pending { available: usize, required: usize },
    Completed { rank: i64 },
}

pub struct PatientMonitor {
    patient: Patient,
    state: ConnectionState,
    tracker: VitalSignTracker,
    evaluator: ThresholdEvaluator,
    ranker: SeverityRanker,
    gate: AlertGate,
    rank: Option<i64>,
    episode: u64,
    sensor: Arc<dyn SensorLink>,
    reporter: Arc<dyn Reporter>,
    listeners: Vec<Listener>,
}

impl PatientMonitor {
    pub fn new(
        patient: Patient,
        config: &Config,
        sensor: Arc<dyn SensorLink>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self {
            tracker: VitalSignTracker::new(config.monitor.history_capacity, &config.thresholds),
            evaluator: ThresholdEvaluator::new(config.thresholds.clone()),
            ranker: SeverityRanker::new(&config.thresholds),
            gate: AlertGate::new(),
            state: ConnectionState::Disconnected,
            rank: None,
            episode: 0,
            patient,
            sensor,
            reporter,
            listeners: Vec::new(),
        }
    }

    pub fn patient(&self) -> &Patient {
        &self.patient
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn rank(&self) -> Option<i64> {
        self.rank
    }

    /// Incremented on every accepted `connect`.
    pub fn episode(&self) -> u64 {
        self.episode
    }

    pub fn tracker(&self) -> &VitalSignTracker {
        &self.tracker
    }

    pub fn subscribe(&mut self, listener: Listener) {
        self.listeners.push(listener);
    }

    /// Start an episode. Returns `Ok(false)` when already connected.
    ///
    /// If the sensor refuses the subscription the patient stays disconnected.
    pub fn connect(&mut self) -> Result<bool> {
        if self.state != ConnectionState::Disconnected {
            debug!(
                patient_id = %self.patient.patient_id,
                state = %self.state,
                "connect ignored, already connected"
            );
            return Ok(false);
        }

        self.sensor.subscribe(&self.patient.device_ref)?;

        self.episode += 1;
        self.rank = None;
        self.transition(ConnectionState::Evaluating);
        info!(
            patient_id = %self.patient.patient_id,
            device = %self.patient.device_ref,
            episode = self.episode,
            "monitoring started"
        );

        let message = format!(
            "Monitoring started for {} in {}",
            self.patient.patient_id, self.patient.sector_name
        );
        self.send_report(ReportKind::Setup, message);
        Ok(true)
    }

    /// End the episode from any state. Returns `false` when already disconnected.
    ///
    /// Histories and the alert gate survive.
    pub fn disconnect(&mut self) -> bool {
        if self.state == ConnectionState::Disconnected {
            return false;
        }
        if let Err(e) = self.sensor.unsubscribe(&self.patient.device_ref) {
            warn!(
                patient_id = %self.patient.patient_id,
                error = %e,
                "sensor unsubscribe failed"
            );
        }
        self.transition(ConnectionState::Disconnected);
        info!(patient_id = %self.patient.patient_id, "monitoring stopped");
        true
    }

    pub fn on_sample(&mut self, kind: SignalKind, value: f64) -> SampleOutcome {
        if let Err(e) = validate_value(kind, value) {
            debug!(patient_id = %self.patient.patient_id, error = %e, "sample dropped");
            return SampleOutcome::Dropped;
        }
        if self.state == ConnectionState::Disconnected {
            debug!(
                patient_id = %self.patient.patient_id,
                %kind,
                "sample ignored while disconnected"
            );
            return SampleOutcome::Ignored;
        }

        self.tracker.record(kind, value);

        if self.state == ConnectionState::Evaluating {
            self.emit_with(|snapshot| PatientEvent::SampleRecorded { kind, value, snapshot });
            return SampleOutcome::Recorded(Verdict::NotYetEvaluable);
        }

        let verdict = self.evaluator.check(kind, &self.tracker);
        if let Verdict::OutOfBounds { signal, message } = &verdict {
            if self.gate.try_fire(&self.patient.patient_id) {
                warn!(
                    patient_id = %self.patient.patient_id,
                    %signal,
                    %message,
                    "vital signs out of bounds"
                );
                let report_message = format!(
                    "{} ({}): {}",
                    self.patient.patient_id, self.patient.sector_name, message
                );
                self.send_report(ReportKind::Critical, report_message);
                let (signal, message) = (*signal, message.clone());
                self.emit_with(|snapshot| PatientEvent::Alerted { signal, message, snapshot });
                return SampleOutcome::Alerted;
            }
        }

        self.emit_with(|snapshot| PatientEvent::SampleRecorded { kind, value, snapshot });
        SampleOutcome::Recorded(verdict)
    }

    /// Check whether the episode can be ranked, and if so freeze the rank
    /// and move to `Evaluated`.
    pub fn poll_evaluation(&mut self) -> EvaluationProgress {
        if self.state != ConnectionState::Evaluating {
            return EvaluationProgress::NotEvaluating;
        }

        let available = self.tracker.sample_count(SignalKind::HeartRate);
        let required = self.ranker.min_hr_samples();
        if !self.ranker.is_ready(&self.tracker) {
            debug!(
                patient_id = %self.patient.patient_id,
                available,
                required,
                "waiting for samples"
            );
            return EvaluationProgress::Pending { available, required };
        }

        match self.ranker.compute_rank(&self.tracker) {
            Ok(rank) => {
                self.rank = Some(rank);
                info!(patient_id = %self.patient.patient_id, rank, "patient ranked");
                self.emit_with(|snapshot| PatientEvent::Ranked { rank, snapshot });
                self.transition(ConnectionState::Evaluated);
                EvaluationProgress::Completed { rank }
            }
            Err(e) => {
                warn!(patient_id = %self.patient.patient_id, error = %e, "ranking failed");
                EvaluationProgress::Pending { available, required }
            }
        }
    }

    pub fn snapshot(&self) -> PatientSnapshot {
        PatientSnapshot {
            patient_id: self.patient.patient_id.clone(),
            sector_name: self.patient.sector_name.clone(),
            device_id: self.patient.device_ref.to_string(),
            connection_state: self.state,
            current_hr: self.tracker.current_heart_rate(),
            current_rr: self.tracker.current_rr(),
            rank: self.rank,
            alert_fired: self.gate.already_fired(),
            alert_fired_at: self.gate.fired_at(),
            alerts_suppressed: self.gate.suppressed(),
            episode: self.episode,
            hr_history: self.tracker.heart_rate_window().snapshot(),
            rr_history: self.tracker.rr_window().snapshot(),
        }
    }

    fn transition(&mut self, to: ConnectionState) {
        let from = self.state;
        self.state = to;
        self.emit_with(|snapshot| PatientEvent::StateChanged { from, to, snapshot });
    }

    fn emit_with(&self, build: impl FnOnce(PatientSnapshot) -> PatientEvent) {
        if self.listeners.is_empty() {
            return;
        }
        let event = build(self.snapshot());
        for listener in &self.listeners {
            listener(&event);
        }
    }

    fn send_report(&self, kind: ReportKind, message: String) {
        let report = Report::new(&self.patient, kind, message);
        if let Err(e) = self.reporter.report(report) {
            warn!(
                patient_id = %self.patient.patient_id,
                %kind,
                error = %e,
                "report could not be handed off"
            );
        }
    }
}

impl std::fmt::Debug for PatientMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatientMonitor")
            .field("patient", &self.patient)
            .field("state", &self.state)
            .field("rank", &self.rank)
            .field("episode", &self.episode)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
