//! Delivery of triage reports to alerting endpoints.
//!
//! This crate provides:
//! - `Notifier` trait for pluggable notification channels
//! - Webhook and log notifier implementations
//! - Minijinja template rendering for report subjects and bodies
//! - Dispatcher that routes notifications by alert endpoint
//! - `ReportQueue`, a non-blocking `Reporter` backed by a delivery task

pub mod dispatcher;
pub mod log;
pub mod queue;
pub mod templating;
pub mod traits;
pub mod webhook;

pub use dispatcher::Dispatcher;
pub use log::LogNotifier;
pub use queue::{spawn_delivery, ReportQueue};
pub use templating::{ReportTemplates, TemplateContext, TemplateRenderer};
pub use traits::{DispatchResult, Notification, Notifier, NotifyError};
pub use webhook::WebhookNotifier;
