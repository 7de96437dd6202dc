//! Boundary with the wearable sensor transport.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Opaque handle identifying one sensor on the transport (the device serial).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceRef(String);

impl DeviceRef {
    pub fn new(serial: impl Into<String>) -> Self {
        Self(serial.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Egress requests towards the sensor transport.
///
/// Implementations must not block: the request is handed off and the
/// transport delivers samples back through the monitor's ingress.
pub trait SensorLink: Send + Sync {
    /// Ask the transport to start streaming heart-rate notifications.
    fn subscribe(&self, device: &DeviceRef) -> Result<()>;

    /// Ask the transport to stop streaming and release the device.
    fn unsubscribe(&self, device: &DeviceRef) -> Result<()>;
}

/// Sensor link that only records requests in the log.
///
/// Used when samples are replayed from a file instead of a live transport.
#[derive(Debug, Default)]
pub struct LoggingSensorLink;

impl SensorLink for LoggingSensorLink {
    fn subscribe(&self, device: &DeviceRef) -> Result<()> {
        tracing::info!(device = %device, "sensor subscription requested");
        Ok(())
    }

    fn unsubscribe(&self, device: &DeviceRef) -> Result<()> {
        tracing::info!(device = %device, "sensor subscription cancelled");
        Ok(())
    }
}
