//! Routes notifications to the channels of an alert endpoint.
//!
//! Each report names an `alert_endpoint_id`. The dispatcher delivers to
//! every channel registered for that endpoint, or to the default channels
//! when the endpoint has none. One channel failing does not stop the rest.

use std::collections::HashMap;
use std::sync::Arc;

use triage_core::NotifyConfig;

use crate::log::LogNotifier;
use crate::templating::TemplateRenderer;
use crate::traits::{DispatchResult, Notification, Notifier, NotifyError};
use crate::webhook::WebhookNotifier;

#[derive(Default)]
pub struct Dispatcher {
    /// Alert endpoint id → channels for that endpoint.
    endpoint_channels: HashMap<String, Vec<Box<dyn Notifier>>>,
    /// Used when an endpoint has no channels of its own.
    default_channels: Vec<Box<dyn Notifier>>,
}

impl Dispatcher {
    /// Create a dispatcher whose channels are shared by every endpoint.
    pub fn with_defaults(channels: Vec<Box<dyn Notifier>>) -> Self {
        Self {
            endpoint_channels: HashMap::new(),
            default_channels: channels,
        }
    }

    /// Webhook when one is configured, otherwise the log channel.
    pub fn from_config(
        config: &NotifyConfig,
        renderer: Arc<TemplateRenderer>,
    ) -> Result<Self, NotifyError> {
        let channel: Box<dyn Notifier> = match &config.webhook_url {
            Some(_) => Box::new(WebhookNotifier::from_config(config, renderer)?),
            None => Box::new(LogNotifier),
        };
        tracing::info!(channel = channel.channel_name(), "notification channel ready");
        Ok(Self::with_defaults(vec![channel]))
    }

    /// Replace all channels for a specific endpoint.
    pub fn set_endpoint_channels(&mut self, endpoint_id: String, channels: Vec<Box<dyn Notifier>>) {
        self.endpoint_channels.insert(endpoint_id, channels);
    }

    /// Deliver `notification` to every channel of `endpoint_id`.
    pub async fn dispatch(
        &self,
        endpoint_id: &str,
        notification: &Notification,
    ) -> Vec<DispatchResult> {
        let channels = self
            .endpoint_channels
            .get(endpoint_id)
            .unwrap_or(&self.default_channels);

        if channels.is_empty() {
            tracing::debug!(endpoint_id, "No notification channels configured");
            return Vec::new();
        }

        let patient_id = notification
            .metadata
            .get("patient_id")
            .cloned()
            .unwrap_or_default();
        let mut results = Vec::with_capacity(channels.len());

        for channel in channels {
            let start = std::time::Instant::now();
            let result = channel.send(notification).await;
            let duration_ms = start.elapsed().as_millis() as u64;

            let (success, error) = match result {
                Ok(()) => {
                    tracing::info!(
                        endpoint_id,
                        patient_id = %patient_id,
                        channel = channel.channel_name(),
                        duration_ms,
                        "Notification delivered"
                    );
                    (true, None)
                }
                Err(e) => {
                    tracing::warn!(
                        endpoint_id,
                        patient_id = %patient_id,
                        channel = channel.channel_name(),
                        error = %e,
                        duration_ms,
                        "Notification delivery failed"
                    );
                    (false, Some(e.to_string()))
                }
            };

            results.push(DispatchResult {
                channel: channel.channel_name().to_string(),
                patient_id: patient_id.clone(),
                success,
                error,
                duration_ms,
            });
        }

        results
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    pub(crate) struct MockNotifier {
        pub name: String,
        pub send_count: Arc<AtomicUsize>,
        pub subjects: Arc<Mutex<Vec<String>>>,
        pub should_fail: bool,
    }

    impl MockNotifier {
        pub fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                send_count: Arc::new(AtomicUsize::new(0)),
                subjects: Arc::new(Mutex::new(Vec::new())),
                should_fail: false,
            }
        }
    }

    #[async_trait::async_trait]
    impl Notifier for MockNotifier {
        async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
            self.send_count.fetch_add(1, Ordering::SeqCst);
            self.subjects.lock().unwrap().push(notification.subject.clone());
            if self.should_fail {
                Err(NotifyError::Config("mock failure".to_string()))
            } else {
                Ok(())
            }
        }
        fn channel_name(&self) -> &str {
            &self.name
        }
    }

    fn notification() -> Notification {
        Notification {
            subject: "[CRITICAL] Marcis (Rand sector)".to_string(),
            body: "test body".to_string(),
            metadata: HashMap::from([("patient_id".to_string(), "Marcis".to_string())]),
        }
    }

    #[tokio::test]
    async fn dispatch_to_all_endpoint_channels() {
        let a = MockNotifier::new("a");
        let b = MockNotifier::new("b");
        let (count_a, count_b) = (a.send_count.clone(), b.send_count.clone());

        let mut dispatcher = Dispatcher::default();
        dispatcher.set_endpoint_channels("ward-a".to_string(), vec![Box::new(a), Box::new(b)]);

        let results = dispatcher.dispatch("ward-a", &notification()).await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.success));
        assert!(results.iter().all(|r| r.patient_id == "Marcis"));
        assert_eq!(count_a.load(Ordering::SeqCst), 1);
        assert_eq!(count_b.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn partial_failure_doesnt_block() {
        let mut failing = MockNotifier::new("fail");
        failing.should_fail = true;
        let ok = MockNotifier::new("ok");
        let count = ok.send_count.clone();

        let mut dispatcher = Dispatcher::default();
        dispatcher.set_endpoint_channels("ward-a".to_string(), vec![Box::new(failing), Box::new(ok)]);

        let results = dispatcher.dispatch("ward-a", &notification()).await;
        assert_eq!(results.len(), 2);
        assert!(!results[0].success);
        assert!(results[1].success);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_endpoint_uses_defaults() {
        let fallback = MockNotifier::new("fallback");
        let count = fallback.send_count.clone();
        let dispatcher = Dispatcher::with_defaults(vec![Box::new(fallback)]);

        let results = dispatcher.dispatch("nonexistent", &notification()).await;
        assert_eq!(results.len(), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn no_channels_returns_empty() {
        let dispatcher = Dispatcher::default();
        assert!(dispatcher.dispatch("ward-a", &notification()).await.is_empty());
    }

    #[tokio::test]
    async fn from_config_falls_back_to_log() {
        let dispatcher =
            Dispatcher::from_config(&NotifyConfig::default(), Arc::new(TemplateRenderer::new()))
                .unwrap();
        let results = dispatcher.dispatch("default", &notification()).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].channel, "log");
        assert!(results[0].success);
    }

    #[tokio::test]
    async fn from_config_builds_webhook_channel() {
        let config = NotifyConfig {
            webhook_url: Some("http://127.0.0.1:9/hook".to_string()),
            webhook_method: Some("PUT".to_string()),
            ..NotifyConfig::default()
        };
        let dispatcher = Dispatcher::from_config(&config, Arc::new(TemplateRenderer::new())).unwrap();
        assert_eq!(dispatcher.default_channels.len(), 1);
        assert_eq!(dispatcher.default_channels[0].channel_name(), "webhook");

        let broken = NotifyConfig {
            webhook_body_template: Some("{{ unclosed".to_string()),
            ..config
        };
        assert!(Dispatcher::from_config(&broken, Arc::new(TemplateRenderer::new())).is_err());
    }
}
