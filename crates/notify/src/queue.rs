//! Non-blocking report hand-off.
//!
//! Monitors call [`Reporter::report`] from inside their state transitions,
//! so the report is only queued there. The delivery task routes each report
//! to a lane for its alert endpoint. A lane renders and dispatches its
//! reports in order, each dispatch bounded by a timeout, so one stuck
//! endpoint never holds up reports for another.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use triage_core::{Report, Reporter, Result, TriageError};

use crate::dispatcher::Dispatcher;
use crate::templating::{ReportTemplates, TemplateRenderer};

/// Sending side of the delivery task.
#[derive(Debug, Clone)]
pub struct ReportQueue {
    tx: mpsc::UnboundedSender<Report>,
}

impl Reporter for ReportQueue {
    fn report(&self, report: Report) -> Result<()> {
        let id = report.id;
        self.tx.send(report).map_err(|_| {
            TriageError::NotificationDelivery(format!("delivery task stopped, report {id} lost"))
        })
    }
}

/// Start the delivery task. It runs until every [`ReportQueue`] clone is
/// dropped and every lane has drained.
pub fn spawn_delivery(
    dispatcher: Dispatcher,
    renderer: Arc<TemplateRenderer>,
    templates: ReportTemplates,
    dispatch_timeout: Duration,
) -> (ReportQueue, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<Report>();
    let delivery = Arc::new(Delivery {
        dispatcher,
        renderer,
        templates,
        dispatch_timeout,
    });

    let handle = tokio::spawn(async move {
        let mut lanes: HashMap<String, mpsc::UnboundedSender<Report>> = HashMap::new();
        let mut workers: Vec<JoinHandle<LaneTally>> = Vec::new();

        while let Some(report) = rx.recv().await {
            let lane = lanes
                .entry(report.alert_endpoint_id.clone())
                .or_insert_with_key(|endpoint| {
                    let (lane_tx, lane_rx) = mpsc::unbounded_channel();
                    workers.push(tokio::spawn(delivery.clone().run_lane(endpoint.clone(), lane_rx)));
                    lane_tx
                });
            if let Err(lost) = lane.send(report) {
                warn!(report_id = %lost.0.id, endpoint_id = %lost.0.alert_endpoint_id, "delivery lane gone, report dropped");
            }
        }

        // Closing the lanes lets each worker finish its backlog and return.
        drop(lanes);
        let (mut delivered, mut failed) = (0u64, 0u64);
        for worker in workers {
            match worker.await {
                Ok(tally) => {
                    delivered += tally.delivered;
                    failed += tally.failed;
                }
                Err(e) => warn!(error = %e, "delivery lane failed"),
            }
        }
        info!(delivered, failed, "report delivery stopped");
    });
    (ReportQueue { tx }, handle)
}

struct Delivery {
    dispatcher: Dispatcher,
    renderer: Arc<TemplateRenderer>,
    templates: ReportTemplates,
    dispatch_timeout: Duration,
}

#[derive(Debug, Default)]
struct LaneTally {
    delivered: u64,
    failed: u64,
}

impl Delivery {
    async fn run_lane(
        self: Arc<Self>,
        endpoint_id: String,
        mut rx: mpsc::UnboundedReceiver<Report>,
    ) -> LaneTally {
        debug!(endpoint_id = %endpoint_id, "delivery lane opened");
        let mut tally = LaneTally::default();
        while let Some(report) = rx.recv().await {
            if self.deliver(&report).await {
                tally.delivered += 1;
            } else {
                tally.failed += 1;
            }
        }
        tally
    }

    async fn deliver(&self, report: &Report) -> bool {
        let notification = match self.templates.render(&self.renderer, report) {
            Ok(n) => n,
            Err(e) => {
                warn!(report_id = %report.id, patient_id = %report.patient_id, error = %e, "report rendering failed");
                return false;
            }
        };

        let dispatch = self.dispatcher.dispatch(&report.alert_endpoint_id, &notification);
        match tokio::time::timeout(self.dispatch_timeout, dispatch).await {
            Ok(results) if results.iter().any(|r| r.success) => true,
            Ok(results) => {
                debug!(report_id = %report.id, channels = results.len(), "report not delivered");
                false
            }
            Err(_) => {
                warn!(
                    report_id = %report.id,
                    patient_id = %report.patient_id,
                    endpoint_id = %report.alert_endpoint_id,
                    timeout_ms = self.dispatch_timeout.as_millis() as u64,
                    "report delivery timed out"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    use triage_core::{DeviceRef, Patient, ReportKind};

    use crate::dispatcher::tests::MockNotifier;
    use crate::traits::{Notification, Notifier, NotifyError};

    const TIMEOUT: Duration = Duration::from_secs(5);

    /// Accepts a notification and never completes.
    struct HangingNotifier;

    #[async_trait::async_trait]
    impl Notifier for HangingNotifier {
        async fn send(&self, _notification: &Notification) -> std::result::Result<(), NotifyError> {
            std::future::pending().await
        }

        fn channel_name(&self) -> &str {
            "hanging"
        }
    }

    fn patient(endpoint: &str) -> Patient {
        named("Austris", endpoint)
    }

    fn named(patient_id: &str, endpoint: &str) -> Patient {
        Patient {
            patient_id: patient_id.to_string(),
            sector_name: "Rand sector".to_string(),
            device_ref: DeviceRef::new("175030000988"),
            alert_endpoint_id: endpoint.to_string(),
        }
    }

    #[tokio::test]
    async fn queued_reports_are_rendered_and_dispatched_in_order() {
        let mock = MockNotifier::new("mock");
        let (subjects, count) = (mock.subjects.clone(), mock.send_count.clone());
        let mut dispatcher = Dispatcher::default();
        dispatcher.set_endpoint_channels("ward-b".to_string(), vec![Box::new(mock)]);

        let (queue, handle) = spawn_delivery(
            dispatcher,
            Arc::new(TemplateRenderer::new()),
            ReportTemplates::default(),
            TIMEOUT,
        );
        let p = patient("ward-b");
        queue.report(Report::new(&p, ReportKind::Setup, "started")).unwrap();
        queue.report(Report::new(&p, ReportKind::Critical, "too fast")).unwrap();
        drop(queue);
        handle.await.unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(
            *subjects.lock().unwrap(),
            vec![
                "[SETUP] Austris (Rand sector)".to_string(),
                "[CRITICAL] Austris (Rand sector)".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn report_fails_once_delivery_stopped() {
        let (queue, handle) = spawn_delivery(
            Dispatcher::default(),
            Arc::new(TemplateRenderer::new()),
            ReportTemplates::default(),
            TIMEOUT,
        );
        handle.abort();
        let _ = handle.await;

        let err = queue
            .report(Report::new(&patient("default"), ReportKind::Setup, "started"))
            .unwrap_err();
        assert!(matches!(err, TriageError::NotificationDelivery(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_endpoint_does_not_block_other_endpoints() {
        let ward_b = MockNotifier::new("ward-b");
        let (subjects, count) = (ward_b.subjects.clone(), ward_b.send_count.clone());
        let mut dispatcher = Dispatcher::with_defaults(vec![Box::new(HangingNotifier)]);
        dispatcher.set_endpoint_channels("ward-b".to_string(), vec![Box::new(ward_b)]);

        let (queue, handle) = spawn_delivery(
            dispatcher,
            Arc::new(TemplateRenderer::new()),
            ReportTemplates::default(),
            Duration::from_millis(100),
        );
        let marcis = named("Marcis", "default");
        queue.report(Report::new(&marcis, ReportKind::Setup, "started")).unwrap();
        queue.report(Report::new(&marcis, ReportKind::Critical, "too fast")).unwrap();
        queue.report(Report::new(&patient("ward-b"), ReportKind::Critical, "too fast")).unwrap();

        // ward-b is served while the default endpoint hangs.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(
            *subjects.lock().unwrap(),
            vec!["[CRITICAL] Austris (Rand sector)".to_string()]
        );

        // Both hung dispatches time out, so the task still finishes.
        drop(queue);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("delivery task should finish once hung dispatches time out")
            .unwrap();
    }
}
