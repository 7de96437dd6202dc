//! Multi-patient triage board.
//!
//! Admits patients from the roster on first contact, routes samples by
//! device id and collects snapshots for presentation. The board itself is
//! owned by the ingress loop; each patient runs in its own task.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use triage_core::{
    decode_hr_notification, Config, Reporter, Result, Roster, Sample, SensorLink, TriageError,
};

use crate::monitor::{PatientEvent, PatientMonitor, PatientSnapshot};
use crate::runtime::PatientHandle;

/// Listener attached to every patient admitted to the board.
pub type BoardListener = Arc<dyn Fn(&PatientEvent) + Send + Sync>;

pub struct TriageBoard {
    config: Config,
    roster: Arc<Roster>,
    sensor: Arc<dyn SensorLink>,
    reporter: Arc<dyn Reporter>,
    /// Device id → running patient task.
    patients: HashMap<String, PatientHandle>,
    listeners: Vec<BoardListener>,
}

impl TriageBoard {
    pub fn new(
        config: Config,
        roster: Arc<Roster>,
        sensor: Arc<dyn SensorLink>,
        reporter: Arc<dyn Reporter>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            roster,
            sensor,
            reporter,
            patients: HashMap::new(),
            listeners: Vec::new(),
        })
    }

    /// Register a listener for patients admitted from now on.
    pub fn on_event(&mut self, listener: BoardListener) {
        self.listeners.push(listener);
    }

    /// Start a patient task for `device_id` unless one is already running.
    pub fn admit(&mut self, device_id: &str) -> Result<&PatientHandle> {
        if !self.patients.contains_key(device_id) {
            let patient = self.roster.patient_for(device_id)?;
            let mut monitor = PatientMonitor::new(
                patient,
                &self.config,
                self.sensor.clone(),
                self.reporter.clone(),
            );
            for listener in &self.listeners {
                let listener = listener.clone();
                monitor.subscribe(Box::new(move |event: &PatientEvent| listener(event)));
            }
            info!(
                device = device_id,
                patient_id = %monitor.patient().patient_id,
                sector = %monitor.patient().sector_name,
                "patient admitted"
            );
            let handle = PatientHandle::spawn(monitor, &self.config.monitor);
            self.patients.insert(device_id.to_string(), handle);
        }
        self.patients
            .get(device_id)
            .ok_or_else(|| TriageError::UnknownDevice(device_id.to_string()))
    }

    pub async fn connect(&mut self, device_id: &str) -> Result<bool> {
        self.admit(device_id)?.connect().await
    }

    pub async fn disconnect(&self, device_id: &str) -> Result<bool> {
        match self.patients.get(device_id) {
            Some(handle) => handle.disconnect().await,
            None if self.roster.lookup(device_id).is_some() => Ok(false),
            None => Err(TriageError::UnknownDevice(device_id.to_string())),
        }
    }

    /// Route one sample without waiting on the patient task. Samples from
    /// devices without a task, or for a patient whose queue is full, are
    /// dropped.
    pub fn on_sample(&self, sample: Sample) {
        let Some(handle) = self.patients.get(&sample.device_id) else {
            debug!(device = %sample.device_id, kind = %sample.kind, "sample from idle device dropped");
            return;
        };
        if let Err(e) = handle.send_sample(sample.kind, sample.value) {
            warn!(device = %sample.device_id, error = %e, "sample not delivered");
        }
    }

    /// Decode a raw sensor notification and route the samples it carries.
    pub fn on_notification(&self, device_id: &str, content: &str, at: DateTime<Utc>) {
        match decode_hr_notification(device_id, content, at) {
            Ok(samples) => {
                for sample in samples {
                    self.on_sample(sample);
                }
            }
            Err(e) => debug!(device = device_id, error = %e, "notification dropped"),
        }
    }

    /// End a patient's session and stop its task.
    pub async fn release(&mut self, device_id: &str) -> Result<()> {
        let handle = self
            .patients
            .remove(device_id)
            .ok_or_else(|| TriageError::UnknownDevice(device_id.to_string()))?;
        handle.shutdown().await
    }

    pub fn get(&self, device_id: &str) -> Option<&PatientHandle> {
        self.patients.get(device_id)
    }

    pub fn len(&self) -> usize {
        self.patients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patients.is_empty()
    }

    /// Snapshots of every admitted patient, ordered by patient id.
    ///
    /// A patient whose task does not answer within the snapshot timeout is
    /// left out.
    pub async fn snapshots(&self) -> Vec<PatientSnapshot> {
        let wait = self.config.monitor.snapshot_timeout();
        let mut snapshots = Vec::with_capacity(self.patients.len());
        for (device_id, handle) in &self.patients {
            match tokio::time::timeout(wait, handle.snapshot()).await {
                Ok(Ok(snapshot)) => snapshots.push(snapshot),
                Ok(Err(e)) => warn!(device = %device_id, error = %e, "snapshot unavailable"),
                Err(_) => warn!(
                    device = %device_id,
                    timeout_ms = wait.as_millis() as u64,
                    "snapshot timed out, patient task busy"
                ),
            }
        }
        snapshots.sort_by(|a, b| a.patient_id.cmp(&b.patient_id));
        snapshots
    }

    /// Snapshots ordered by descending rank; unranked patients last.
    ///
    /// Read-only: the board never reorders or acts on rank itself.
    pub async fn ranked(&self) -> Vec<PatientSnapshot> {
        let mut snapshots = self.snapshots().await;
        snapshots.sort_by(|a, b| {
            b.rank
                .cmp(&a.rank)
                .then_with(|| a.patient_id.cmp(&b.patient_id))
        });
        snapshots
    }

    /// Stop every patient task (application teardown).
    pub async fn shutdown(self) {
        for (device_id, handle) in self.patients {
            if let Err(e) = handle.shutdown().await {
                warn!(device = %device_id, error = %e, "patient task did not stop cleanly");
            }
        }
        info!("triage board stopped");
    }
}
