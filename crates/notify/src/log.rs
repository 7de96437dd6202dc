//! Notifier that writes notifications to the tracing log.

use crate::traits::{Notification, Notifier, NotifyError};

/// Used when no webhook is configured, e.g. for replays on a workstation.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let patient_id = notification.metadata.get("patient_id").map(String::as_str);
        let kind = notification.metadata.get("kind").map(String::as_str);
        tracing::warn!(
            patient_id = patient_id.unwrap_or("-"),
            kind = kind.unwrap_or("-"),
            subject = %notification.subject,
            body = %notification.body,
            "triage report"
        );
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "log"
    }
}
