pub mod config;
pub mod error;
pub mod patient;
pub mod report;
pub mod sample;
pub mod sensor;

pub use config::{Config, MonitorConfig, NotifyConfig, RosterConfig, ThresholdConfig};
pub use error::*;
pub use patient::{Patient, Roster, RosterEntry};
pub use report::{Report, ReportKind, Reporter};
pub use sample::{decode_hr_notification, Sample, SignalKind};
pub use sensor::{DeviceRef, SensorLink};
