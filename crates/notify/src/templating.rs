//! Minijinja template rendering for report notifications.
//!
//! Renders subject and body templates with access to the report fields.
//! Templates are arbitrary strings (not pre-registered), so a fresh
//! [`minijinja::Environment`] is created per render call.

use std::collections::HashMap;

use chrono::Utc;
use serde::Serialize;
use triage_core::{NotifyConfig, Report};

use crate::traits::{Notification, NotifyError};

pub const DEFAULT_SUBJECT_TEMPLATE: &str = "[{{ kind | upper }}] {{ patient_id }} ({{ sector_name }})";
pub const DEFAULT_BODY_TEMPLATE: &str = "{{ message }}";

/// Context data available to notification templates.
#[derive(Debug, Clone, Serialize)]
pub struct TemplateContext {
    pub report_id: String,
    /// `"setup"` or `"critical"`.
    pub kind: String,
    pub patient_id: String,
    pub sector_name: String,
    pub alert_endpoint_id: String,
    pub message: String,
    /// When the report was issued, ISO 8601.
    pub issued_at: String,
    /// Render time, ISO 8601.
    pub now: String,
}

impl TemplateContext {
    pub fn from_report(report: &Report) -> Self {
        Self {
            report_id: report.id.to_string(),
            kind: report.kind.to_string(),
            patient_id: report.patient_id.clone(),
            sector_name: report.sector_name.clone(),
            alert_endpoint_id: report.alert_endpoint_id.clone(),
            message: report.message.clone(),
            issued_at: report.issued_at.to_rfc3339(),
            now: Utc::now().to_rfc3339(),
        }
    }

    fn metadata(&self) -> HashMap<String, String> {
        HashMap::from([
            ("report_id".to_string(), self.report_id.clone()),
            ("kind".to_string(), self.kind.clone()),
            ("patient_id".to_string(), self.patient_id.clone()),
            ("sector_name".to_string(), self.sector_name.clone()),
            ("alert_endpoint_id".to_string(), self.alert_endpoint_id.clone()),
            ("issued_at".to_string(), self.issued_at.clone()),
        ])
    }
}

/// Renders notification templates using minijinja.
#[derive(Debug)]
pub struct TemplateRenderer {
    _private: (),
}

impl TemplateRenderer {
    pub fn new() -> Self {
        Self { _private: () }
    }

    /// Build a configured minijinja environment with custom filters and globals.
    fn build_env() -> minijinja::Environment<'static> {
        let mut env = minijinja::Environment::new();

        env.add_filter("round", round_filter);

        // `lower` and `upper` are built-in with the "builtins" feature,
        // but we register explicit versions to guarantee availability.
        env.add_filter("lower", lower_filter);
        env.add_filter("upper", upper_filter);

        env.add_function("env", env_function);

        env
    }

    /// Render a template string with any serializable context.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Template`] if the template is invalid or
    /// rendering fails.
    pub fn render<S: Serialize>(&self, template_str: &str, ctx: &S) -> Result<String, NotifyError> {
        let env = Self::build_env();
        env.render_str(template_str, ctx)
            .map_err(|e| NotifyError::Template(e.to_string()))
    }

    /// Validate that a template string parses without errors.
    pub fn validate(&self, template_str: &str) -> Result<(), NotifyError> {
        let env = Self::build_env();
        env.template_from_str(template_str)
            .map_err(|e| NotifyError::Template(e.to_string()))?;
        Ok(())
    }
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

/// Subject and body templates turning a [`Report`] into a [`Notification`].
#[derive(Debug, Clone)]
pub struct ReportTemplates {
    subject: String,
    body: String,
}

impl ReportTemplates {
    /// Both templates are syntax-checked up front.
    pub fn new(
        subject: impl Into<String>,
        body: impl Into<String>,
        renderer: &TemplateRenderer,
    ) -> Result<Self, NotifyError> {
        let subject = subject.into();
        let body = body.into();
        renderer
            .validate(&subject)
            .map_err(|e| NotifyError::Config(format!("invalid subject template: {e}")))?;
        renderer
            .validate(&body)
            .map_err(|e| NotifyError::Config(format!("invalid body template: {e}")))?;
        Ok(Self { subject, body })
    }

    /// Templates from config, falling back to the defaults.
    pub fn from_config(config: &NotifyConfig, renderer: &TemplateRenderer) -> Result<Self, NotifyError> {
        Self::new(
            config
                .subject_template
                .as_deref()
                .unwrap_or(DEFAULT_SUBJECT_TEMPLATE),
            config.body_template.as_deref().unwrap_or(DEFAULT_BODY_TEMPLATE),
            renderer,
        )
    }

    pub fn render(
        &self,
        renderer: &TemplateRenderer,
        report: &Report,
    ) -> Result<Notification, NotifyError> {
        let ctx = TemplateContext::from_report(report);
        Ok(Notification {
            subject: renderer.render(&self.subject, &ctx)?,
            body: renderer.render(&self.body, &ctx)?,
            metadata: ctx.metadata(),
        })
    }
}

impl Default for ReportTemplates {
    fn default() -> Self {
        Self {
            subject: DEFAULT_SUBJECT_TEMPLATE.to_string(),
            body: DEFAULT_BODY_TEMPLATE.to_string(),
        }
    }
}

/// Custom filter: round a float to N decimal places.
fn round_filter(value: f64, decimals: Option<u32>) -> String {
    let n = decimals.unwrap_or(0);
    format!("{:.prec$}", value, prec = n as usize)
}

fn lower_filter(value: String) -> String {
    value.to_lowercase()
}

fn upper_filter(value: String) -> String {
    value.to_uppercase()
}

/// Global function: read an environment variable by name.
///
/// Returns an empty string (and logs a warning) if the variable is unset.
fn env_function(name: String) -> String {
    match std::env::var(&name) {
        Ok(val) => val,
        Err(_) => {
            tracing::warn!(var = %name, "Environment variable not found, returning empty string");
            String::new()
        }
    }
}
