//! Per-patient vital-sign aggregation and triage.
//!
//! - [`RollingWindow`] and [`VitalSignTracker`] keep bounded HR/RR history
//! - [`ThresholdEvaluator`] checks averages against configured bounds
//! - [`AlertGate`] allows at most one critical report per session
//! - [`SeverityRanker`] derives the rank used to order patients
//! - [`PatientMonitor`] ties these into the connection state machine
//! - [`PatientHandle`] runs a monitor in its own task; [`TriageBoard`] manages many

pub mod board;
pub mod gate;
pub mod ingress;
pub mod monitor;
pub mod rank;
pub mod runtime;
pub mod threshold;
pub mod tracker;
pub mod window;

pub use board::{BoardListener, TriageBoard};
pub use gate::AlertGate;
pub use ingress::IngressRecord;
pub use monitor::{
    ConnectionState, EvaluationProgress, Listener, PatientEvent, PatientMonitor, PatientSnapshot,
    SampleOutcome,
};
pub use rank::SeverityRanker;
pub use runtime::PatientHandle;
pub use threshold::{ThresholdEvaluator, Verdict};
pub use tracker::VitalSignTracker;
pub use window::RollingWindow;
