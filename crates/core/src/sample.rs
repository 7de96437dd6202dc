//! Vital-sign samples and decoding of raw sensor notifications.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TriageError};

/// Which vital sign a sample carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalKind {
    /// Heart rate in beats per minute.
    #[serde(rename = "hr")]
    HeartRate,
    /// RR interval in milliseconds.
    #[serde(rename = "rr")]
    RrInterval,
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalKind::HeartRate => write!(f, "heart rate"),
            SignalKind::RrInterval => write!(f, "RR interval"),
        }
    }
}

/// A single reading pushed by the sensor collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub device_id: String,
    pub kind: SignalKind,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl Sample {
    pub fn new(device_id: impl Into<String>, kind: SignalKind, value: f64) -> Self {
        Self {
            device_id: device_id.into(),
            kind,
            timestamp: Utc::now(),
            value,
        }
    }
}

/// Reject values no sensor can produce (NaN, infinities, zero or negative).
pub fn validate_value(kind: SignalKind, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(TriageError::MalformedSample(format!(
            "{kind} value {value} is not a positive finite number"
        )));
    }
    Ok(())
}

/// Decode one heart-rate notification from the wearable.
///
/// The payload is JSON of the form `{"average": 72.5, "rrData": [812, ...]}`.
/// `average` becomes a heart-rate sample and the first `rrData` entry an RR
/// sample. Either may be missing, but not both.
pub fn decode_hr_notification(
    device_id: &str,
    content: &str,
    timestamp: DateTime<Utc>,
) -> Result<Vec<Sample>> {
    let json: serde_json::Value = serde_json::from_str(content)
        .map_err(|e| TriageError::MalformedSample(format!("invalid notification JSON: {e}")))?;

    let mut samples = Vec::with_capacity(2);

    if let Some(average) = json.get("average").and_then(serde_json::Value::as_f64) {
        samples.push(Sample {
            device_id: device_id.to_string(),
            kind: SignalKind::HeartRate,
            timestamp,
            value: average,
        });
    }

    let first_rr = json
        .get("rrData")
        .and_then(|rr| rr.get(0))
        .and_then(serde_json::Value::as_f64);
    if let Some(rr) = first_rr {
        samples.push(Sample {
            device_id: device_id.to_string(),
            kind: SignalKind::RrInterval,
            timestamp,
            value: rr,
        });
    }

    if samples.is_empty() {
        return Err(TriageError::MalformedSample(
            "notification carries neither average nor rrData".to_string(),
        ));
    }

    Ok(samples)
}
