//! Patient identity and the static device roster.
//!
//! The roster maps a sensor serial to the patient wearing it. It is loaded
//! once at startup from YAML and is read-only afterwards:
//!
//! ```yaml
//! default_sector: Rand sector
//! default_alert_endpoint: triage-desk
//! devices:
//!   "175030001053":
//!     patient_id: Marcis
//!   "175030000988":
//!     patient_id: Austris
//!     sector_name: North sector
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TriageError};
use crate::sensor::DeviceRef;

/// A monitored patient, bound to one sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub patient_id: String,
    /// Descriptive only.
    pub sector_name: String,
    pub device_ref: DeviceRef,
    pub alert_endpoint_id: String,
}

/// One roster line as written in the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub patient_id: String,
    #[serde(default)]
    pub sector_name: Option<String>,
    #[serde(default)]
    pub alert_endpoint_id: Option<String>,
}

fn default_sector() -> String {
    "Unassigned sector".to_string()
}

fn default_alert_endpoint() -> String {
    "default".to_string()
}

/// Static mapping `device_id -> patient`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Roster {
    #[serde(default = "default_sector")]
    pub default_sector: String,
    #[serde(default = "default_alert_endpoint")]
    pub default_alert_endpoint: String,
    #[serde(default)]
    pub devices: BTreeMap<String, RosterEntry>,
}

impl Roster {
    /// Parse and validate a roster document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let roster: Roster = serde_yaml::from_str(yaml)?;
        roster.validate()?;
        Ok(roster)
    }

    /// Load a roster file from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)?;
        let roster = Self::from_yaml_str(&yaml)?;
        tracing::info!(
            path = %path.display(),
            devices = roster.devices.len(),
            "roster loaded"
        );
        Ok(roster)
    }

    /// Patient ids must be unique across devices.
    fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for (device_id, entry) in &self.devices {
            if entry.patient_id.trim().is_empty() {
                return Err(TriageError::Config(format!(
                    "roster entry for device '{device_id}' has an empty patient_id"
                )));
            }
            if !seen.insert(entry.patient_id.as_str()) {
                return Err(TriageError::Config(format!(
                    "patient_id '{}' is assigned to more than one device",
                    entry.patient_id
                )));
            }
        }
        Ok(())
    }

    /// Build the patient paired with `device_id`, if the device is known.
    pub fn lookup(&self, device_id: &str) -> Option<Patient> {
        self.devices.get(device_id).map(|entry| Patient {
            patient_id: entry.patient_id.clone(),
            sector_name: entry
                .sector_name
                .clone()
                .unwrap_or_else(|| self.default_sector.clone()),
            device_ref: DeviceRef::new(device_id),
            alert_endpoint_id: entry
                .alert_endpoint_id
                .clone()
                .unwrap_or_else(|| self.default_alert_endpoint.clone()),
        })
    }

    pub fn patient_for(&self, device_id: &str) -> Result<Patient> {
        self.lookup(device_id)
            .ok_or_else(|| TriageError::UnknownDevice(device_id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
