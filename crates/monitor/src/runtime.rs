//! Per-patient task ownership.
//!
//! Each [`PatientMonitor`] lives inside its own tokio task and is mutated
//! only through that task's command channel, so all transitions for one
//! patient are serialized while different patients run in parallel.
//!
//! While a patient is `Evaluating`, a ticker task sends evaluation polls on
//! a separate tick channel at a fixed interval. The ticker is aborted on
//! disconnect, once ranking completes, and when the task shuts down.
//!
//! Samples are offered with `try_send`: a patient whose queue is full drops
//! the sample instead of stalling ingress for everyone else.

use std::time::Duration;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use triage_core::{MonitorConfig, Patient, Result, SignalKind, TriageError};

use crate::monitor::{
    ConnectionState, EvaluationProgress, Listener, PatientMonitor, PatientSnapshot,
};

enum Command {
    Connect(oneshot::Sender<Result<bool>>),
    Disconnect(oneshot::Sender<bool>),
    Sample { kind: SignalKind, value: f64 },
    Subscribe(Listener),
    Snapshot(oneshot::Sender<PatientSnapshot>),
    Shutdown,
}

/// Handle to a running patient task.
#[derive(Debug)]
pub struct PatientHandle {
    patient: Patient,
    tx: mpsc::Sender<Command>,
    task: JoinHandle<()>,
}

impl PatientHandle {
    /// Move `monitor` into a new task. Must be called inside a tokio runtime.
    pub fn spawn(monitor: PatientMonitor, config: &MonitorConfig) -> Self {
        let patient = monitor.patient().clone();
        let (tx, rx) = mpsc::channel(config.command_buffer.max(1));
        let (tick_tx, tick_rx) = mpsc::channel(1);
        let runner = MonitorTask {
            monitor,
            rx,
            tick_tx,
            tick_rx,
            poll_interval: config.evaluation_poll_interval(),
            ticker: None,
        };
        let task = tokio::spawn(runner.run());
        Self { patient, tx, task }
    }

    pub fn patient(&self) -> &Patient {
        &self.patient
    }

    pub async fn connect(&self) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Connect(reply)).await?;
        rx.await.map_err(|_| self.unavailable())?
    }

    pub async fn disconnect(&self) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Disconnect(reply)).await?;
        rx.await.map_err(|_| self.unavailable())
    }

    /// Queue a sample without waiting. Fails with `Overloaded` when the
    /// patient's queue is full.
    pub fn send_sample(&self, kind: SignalKind, value: f64) -> Result<()> {
        self.tx
            .try_send(Command::Sample { kind, value })
            .map_err(|e| match e {
                TrySendError::Full(_) => TriageError::Overloaded(format!(
                    "{}: command queue full, {kind} sample dropped",
                    self.patient.patient_id
                )),
                TrySendError::Closed(_) => self.unavailable(),
            })
    }

    pub async fn subscribe(&self, listener: Listener) -> Result<()> {
        self.send(Command::Subscribe(listener)).await
    }

    pub async fn snapshot(&self) -> Result<PatientSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Snapshot(reply)).await?;
        rx.await.map_err(|_| self.unavailable())
    }

    /// Stop the task, releasing the sensor if still connected.
    pub async fn shutdown(self) -> Result<()> {
        // A closed channel means the task is already gone.
        let _ = self.tx.send(Command::Shutdown).await;
        self.task.await.map_err(|e| {
            TriageError::MonitorUnavailable(format!("{}: {e}", self.patient.patient_id))
        })
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.tx.send(command).await.map_err(|_| self.unavailable())
    }

    fn unavailable(&self) -> TriageError {
        TriageError::MonitorUnavailable(self.patient.patient_id.clone())
    }
}

struct MonitorTask {
    monitor: PatientMonitor,
    rx: mpsc::Receiver<Command>,
    /// Cloned into each ticker. Held here so `tick_rx` never closes.
    tick_tx: mpsc::Sender<u64>,
    tick_rx: mpsc::Receiver<u64>,
    poll_interval: Duration,
    ticker: Option<JoinHandle<()>>,
}

impl MonitorTask {
    async fn run(mut self) {
        let patient_id = self.monitor.patient().patient_id.clone();
        debug!(patient_id = %patient_id, "patient task started");

        loop {
            tokio::select! {
                command = self.rx.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle(command),
                },
                Some(episode) = self.tick_rx.recv() => self.on_tick(episode),
            }
        }

        self.stop_ticker();
        if self.monitor.state() != ConnectionState::Disconnected {
            self.monitor.disconnect();
        }
        info!(patient_id = %patient_id, "patient task stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Connect(reply) => {
                let result = self.monitor.connect();
                if matches!(result, Ok(true)) {
                    self.start_ticker();
                }
                let _ = reply.send(result);
            }
            Command::Disconnect(reply) => {
                let changed = self.monitor.disconnect();
                self.stop_ticker();
                let _ = reply.send(changed);
            }
            Command::Sample { kind, value } => {
                self.monitor.on_sample(kind, value);
            }
            Command::Subscribe(listener) => self.monitor.subscribe(listener),
            Command::Snapshot(reply) => {
                let _ = reply.send(self.monitor.snapshot());
            }
            Command::Shutdown => {}
        }
    }

    fn on_tick(&mut self, episode: u64) {
        // Ticks from a ticker of an earlier episode may still be queued.
        if episode != self.monitor.episode() {
            return;
        }
        match self.monitor.poll_evaluation() {
            EvaluationProgress::Pending { .. } => {}
            EvaluationProgress::Completed { .. } | EvaluationProgress::NotEvaluating => {
                self.stop_ticker();
            }
        }
    }

    fn start_ticker(&mut self) {
        self.stop_ticker();
        let tx = self.tick_tx.clone();
        let episode = self.monitor.episode();
        let period = self.poll_interval;
        self.ticker = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                interval.tick().await;
                if tx.send(episode).await.is_err() {
                    break;
                }
            }
        }));
    }

    fn stop_ticker(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use triage_core::{Config, ReportKind};

    use crate::monitor::tests::{patient, RecordingReporter, RecordingSensor};

    fn spawn() -> (PatientHandle, Arc<RecordingReporter>) {
        let reporter = Arc::new(RecordingReporter::default());
        let config = Config::default();
        let monitor = PatientMonitor::new(
            patient(),
            &config,
            Arc::new(RecordingSensor::default()),
            reporter.clone(),
        );
        (PatientHandle::spawn(monitor, &config.monitor), reporter)
    }

    fn feed(handle: &PatientHandle, kind: SignalKind, value: f64, times: usize) {
        for _ in 0..times {
            handle.send_sample(kind, value).unwrap();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn evaluates_after_poll_interval() {
        let (handle, _) = spawn();
        assert!(handle.connect().await.unwrap());
        feed(&handle, SignalKind::HeartRate, 80.0, 15);

        // No poll has run yet.
        assert_eq!(
            handle.snapshot().await.unwrap().connection_state,
            ConnectionState::Evaluating
        );

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.connection_state, ConnectionState::Evaluated);
        assert_eq!(snapshot.rank, Some(80));

        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn keeps_polling_until_enough_samples() {
        let (handle, _) = spawn();
        handle.connect().await.unwrap();
        feed(&handle, SignalKind::HeartRate, 80.0, 5);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(
            handle.snapshot().await.unwrap().connection_state,
            ConnectionState::Evaluating
        );

        feed(&handle, SignalKind::HeartRate, 80.0, 10);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(
            handle.snapshot().await.unwrap().connection_state,
            ConnectionState::Evaluated
        );
        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_cancels_evaluation() {
        let (handle, _) = spawn();
        handle.connect().await.unwrap();
        feed(&handle, SignalKind::HeartRate, 80.0, 10);
        assert!(handle.disconnect().await.unwrap());

        tokio::time::sleep(Duration::from_secs(5)).await;
        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.connection_state, ConnectionState::Disconnected);
        assert_eq!(snapshot.rank, None);
        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_connect_sends_one_setup() {
        let (handle, reporter) = spawn();
        assert!(handle.connect().await.unwrap());
        assert!(!handle.connect().await.unwrap());
        handle.shutdown().await.unwrap();
        assert_eq!(reporter.kinds(), vec![ReportKind::Setup]);
    }

    #[tokio::test]
    async fn closed_task_reports_unavailable() {
        let (handle, _) = spawn();
        let _ = handle.tx.send(Command::Shutdown).await;
        tokio::task::yield_now().await;
        while !handle.is_finished() {
            tokio::task::yield_now().await;
        }
        match handle.snapshot().await {
            Err(TriageError::MonitorUnavailable(id)) => assert_eq!(id, "Marcis"),
            other => panic!("expected MonitorUnavailable, got: {other:?}"),
        }
    }
}
