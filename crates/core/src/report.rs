//! Outbound reports to the alerting endpoint.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::patient::Patient;

/// Kind of report sent to the reporting collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportKind {
    /// Monitoring started for a patient.
    Setup,
    /// A patient's vitals left the configured bounds.
    Critical,
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportKind::Setup => write!(f, "setup"),
            ReportKind::Critical => write!(f, "critical"),
        }
    }
}

/// A single report, routed by `alert_endpoint_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: Uuid,
    pub alert_endpoint_id: String,
    pub kind: ReportKind,
    pub patient_id: String,
    pub sector_name: String,
    pub message: String,
    pub issued_at: DateTime<Utc>,
}

impl Report {
    pub fn new(patient: &Patient, kind: ReportKind, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            alert_endpoint_id: patient.alert_endpoint_id.clone(),
            kind,
            patient_id: patient.patient_id.clone(),
            sector_name: patient.sector_name.clone(),
            message: message.into(),
            issued_at: Utc::now(),
        }
    }
}

/// Fire-and-forget sink for reports.
///
/// `report` must return promptly. An `Err` means the report could not even
/// be handed off; callers log it and carry on.
pub trait Reporter: Send + Sync {
    fn report(&self, report: Report) -> Result<()>;
}
