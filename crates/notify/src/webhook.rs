//! HTTP webhook channel for alert endpoints.
//!
//! Everything comes from [`NotifyConfig`]: URL, method, extra headers, an
//! optional body template and the per-request timeout. `${VAR}` references
//! in the URL and header values are read from the environment once, when
//! the notifier is built.

use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Method;

use triage_core::NotifyConfig;

use crate::templating::TemplateRenderer;
use crate::traits::{Notification, Notifier, NotifyError};

#[derive(Debug)]
pub struct WebhookNotifier {
    url: String,
    method: Method,
    headers: HeaderMap,
    /// Rendered with `subject`, `body` and `metadata`. JSON of the
    /// notification when unset.
    body_template: Option<String>,
    renderer: Arc<TemplateRenderer>,
    client: reqwest::Client,
}

impl WebhookNotifier {
    /// Build the channel, failing on a missing URL, an unknown method, a bad
    /// header, an unset `${VAR}` or a body template that does not parse.
    pub fn from_config(
        config: &NotifyConfig,
        renderer: Arc<TemplateRenderer>,
    ) -> Result<Self, NotifyError> {
        let url = config
            .webhook_url
            .as_deref()
            .ok_or_else(|| NotifyError::Config("webhook url not set".to_string()))?;
        let url = expand_env(url)?;

        let method = match config.webhook_method.as_deref() {
            Some(m) => m
                .to_uppercase()
                .parse::<Method>()
                .map_err(|_| NotifyError::Config(format!("invalid HTTP method: {m}")))?,
            None => Method::POST,
        };

        let mut headers = HeaderMap::with_capacity(config.webhook_headers.len() + 1);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        for (name, value) in &config.webhook_headers {
            let header = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| NotifyError::Config(format!("invalid header name {name:?}: {e}")))?;
            let value = HeaderValue::from_str(&expand_env(value)?)
                .map_err(|e| NotifyError::Config(format!("invalid value for header {name}: {e}")))?;
            headers.insert(header, value);
        }

        if let Some(template) = &config.webhook_body_template {
            renderer
                .validate(template)
                .map_err(|e| NotifyError::Config(format!("invalid body template: {e}")))?;
        }

        let client = reqwest::Client::builder()
            .timeout(config.delivery_timeout())
            .build()?;

        Ok(Self {
            url,
            method,
            headers,
            body_template: config.webhook_body_template.clone(),
            renderer,
            client,
        })
    }

    fn request_body(&self, notification: &Notification) -> Result<String, NotifyError> {
        match &self.body_template {
            Some(template) => self.renderer.render(template, notification),
            None => serde_json::to_string(notification)
                .map_err(|e| NotifyError::Template(format!("notification to json: {e}"))),
        }
    }
}

#[async_trait::async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let body = self.request_body(notification)?;
        let response = self
            .client
            .request(self.method.clone(), &self.url)
            .headers(self.headers.clone())
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::warn!(url = %self.url, %status, body = %text, "webhook rejected report");
            return Err(NotifyError::Rejected(format!("{status}: {text}")));
        }

        tracing::debug!(url = %self.url, method = %self.method, %status, "webhook delivered");
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "webhook"
    }
}

/// Substitute every `${NAME}` in `input` with the value of env var `NAME`.
fn expand_env(input: &str) -> Result<String, NotifyError> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find('}')
            .ok_or_else(|| NotifyError::Config(format!("unterminated ${{}} in {input:?}")))?;
        let name = &after[..end];
        let value = std::env::var(name)
            .map_err(|_| NotifyError::Config(format!("env var {name} is not set")))?;
        out.push_str(&value);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, HashMap};
    use std::time::{Duration, Instant};

    fn config(url: &str) -> NotifyConfig {
        NotifyConfig {
            webhook_url: Some(url.to_string()),
            ..NotifyConfig::default()
        }
    }

    fn notifier(config: &NotifyConfig) -> Result<WebhookNotifier, NotifyError> {
        WebhookNotifier::from_config(config, Arc::new(TemplateRenderer::new()))
    }

    fn notification() -> Notification {
        Notification {
            subject: "[CRITICAL] Marcis (Rand sector)".to_string(),
            body: "average heart rate 128.0 bpm outside (60.0, 110.0)".to_string(),
            metadata: HashMap::from([("patient_id".to_string(), "Marcis".to_string())]),
        }
    }

    #[test]
    fn expands_env_references() {
        std::env::set_var("WEBHOOK_EXPAND_HOST", "pager.ward");
        assert_eq!(
            expand_env("https://${WEBHOOK_EXPAND_HOST}/v1/${WEBHOOK_EXPAND_HOST}").unwrap(),
            "https://pager.ward/v1/pager.ward"
        );
        assert_eq!(expand_env("no refs, $HOME stays").unwrap(), "no refs, $HOME stays");
        assert!(expand_env("https://${WEBHOOK_EXPAND_HOST").is_err());
        std::env::remove_var("WEBHOOK_EXPAND_HOST");
    }

    #[test]
    fn unset_env_var_is_config_error() {
        match notifier(&config("https://${WEBHOOK_SURELY_UNSET_VAR}/hook")) {
            Err(NotifyError::Config(msg)) => assert!(msg.contains("WEBHOOK_SURELY_UNSET_VAR")),
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn missing_url_is_config_error() {
        assert!(matches!(
            notifier(&NotifyConfig::default()),
            Err(NotifyError::Config(_))
        ));
    }

    #[test]
    fn method_is_parsed_case_insensitively() {
        assert_eq!(notifier(&config("https://pager.ward")).unwrap().method, Method::POST);

        let mut put = config("https://pager.ward");
        put.webhook_method = Some("put".to_string());
        assert_eq!(notifier(&put).unwrap().method, Method::PUT);

        put.webhook_method = Some("NOT A METHOD".to_string());
        assert!(notifier(&put).is_err());
    }

    #[test]
    fn configured_headers_are_sent() {
        std::env::set_var("WEBHOOK_HEADER_KEY", "k-123");
        let mut cfg = config("https://pager.ward");
        cfg.webhook_headers = BTreeMap::from([
            ("X-Api-Key".to_string(), "${WEBHOOK_HEADER_KEY}".to_string()),
            ("X-Ward".to_string(), "rand".to_string()),
        ]);
        let webhook = notifier(&cfg).unwrap();
        std::env::remove_var("WEBHOOK_HEADER_KEY");

        assert_eq!(webhook.headers["x-api-key"], "k-123");
        assert_eq!(webhook.headers["x-ward"], "rand");
        assert_eq!(webhook.headers[CONTENT_TYPE], "application/json");

        cfg.webhook_headers = BTreeMap::from([("bad header".to_string(), "v".to_string())]);
        assert!(matches!(notifier(&cfg), Err(NotifyError::Config(_))));
    }

    #[test]
    fn body_defaults_to_notification_json() {
        let body = notifier(&config("https://pager.ward"))
            .unwrap()
            .request_body(&notification())
            .unwrap();
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["subject"], "[CRITICAL] Marcis (Rand sector)");
        assert_eq!(json["metadata"]["patient_id"], "Marcis");
    }

    #[test]
    fn body_template_is_rendered() {
        let mut cfg = config("https://pager.ward");
        cfg.webhook_body_template =
            Some(r#"{"text": "{{ subject }}: {{ metadata.patient_id }}"}"#.to_string());
        let body = notifier(&cfg).unwrap().request_body(&notification()).unwrap();
        assert_eq!(body, r#"{"text": "[CRITICAL] Marcis (Rand sector): Marcis"}"#);

        cfg.webhook_body_template = Some("{{ unclosed".to_string());
        match notifier(&cfg) {
            Err(NotifyError::Config(msg)) => assert!(msg.contains("invalid body template")),
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn silent_endpoint_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept connections and never answer.
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let mut cfg = config(&format!("http://{addr}/hook"));
        cfg.delivery_timeout_ms = 200;
        let webhook = notifier(&cfg).unwrap();

        let started = Instant::now();
        let result = webhook.send(&notification()).await;
        assert!(matches!(result, Err(NotifyError::Http(_))), "got {result:?}");
        assert!(started.elapsed() < Duration::from_secs(5));
        server.abort();
    }
}
