//! Notifier trait definition and shared error types.

use std::collections::HashMap;

/// Errors that can occur during notification delivery.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Template rendering failed: {0}")]
    Template(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Endpoint rejected notification: {0}")]
    Rejected(String),
}

/// A rendered notification ready for delivery.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Notification {
    /// The rendered subject/title.
    pub subject: String,
    /// The rendered body content.
    pub body: String,
    /// Report fields carried alongside (patient_id, kind, alert_endpoint_id, ...).
    pub metadata: HashMap<String, String>,
}

/// Trait for notification channel implementations.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a notification through this channel.
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;

    /// Human-readable name for this channel (e.g., "webhook", "log").
    fn channel_name(&self) -> &str;
}

/// Result of dispatching a notification to a single channel.
#[derive(Debug)]
pub struct DispatchResult {
    pub channel: String,
    pub patient_id: String,
    pub success: bool,
    pub error: Option<String>,
    pub duration_ms: u64,
}
