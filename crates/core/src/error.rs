use thiserror::Error;

use crate::sample::SignalKind;

#[derive(Error, Debug)]
pub enum TriageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Window is empty")]
    EmptyWindow,

    #[error("Insufficient {signal} samples: have {available}, need {required}")]
    InsufficientSamples {
        signal: SignalKind,
        available: usize,
        required: usize,
    },

    #[error("Malformed sample: {0}")]
    MalformedSample(String),

    #[error("Notification delivery failed: {0}")]
    NotificationDelivery(String),

    #[error("Sensor request failed: {0}")]
    Sensor(String),

    #[error("Unknown device: {0}")]
    UnknownDevice(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Monitor unavailable: {0}")]
    MonitorUnavailable(String),

    #[error("Monitor overloaded: {0}")]
    Overloaded(String),
}

/// Result alias for triage operations.
pub type Result<T> = std::result::Result<T, TriageError>;
