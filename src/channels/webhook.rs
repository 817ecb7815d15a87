//! Webhook channel

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;

use super::{ChannelError, ChannelSender, DeliveryAttempt, DispatchOutcome};
use crate::alerts::AlertRecord;
use crate::config::WebhookConfig;

/// Posts each alert as JSON to every configured URL
///
/// All URLs are attempted, concurrently, regardless of earlier failures.
/// The channel succeeds when any URL accepts the alert.
pub struct WebhookSender {
    config: WebhookConfig,
    method: Method,
    headers: HeaderMap,
    client: reqwest::Client,
}

impl WebhookSender {
    pub fn from_config(config: WebhookConfig) -> Result<Self, ChannelError> {
        let method = Method::from_bytes(config.method.trim().to_uppercase().as_bytes())
            .map_err(|_| ChannelError::Config(format!("Unsupported HTTP method: {}", config.method)))?;

        let mut headers = HeaderMap::new();
        for (key, value) in &config.headers {
            let name = HeaderName::from_bytes(key.trim().as_bytes())
                .map_err(|_| ChannelError::Config(format!("Invalid header name: {}", key)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| ChannelError::Config(format!("Invalid value for header {}", key)))?;
            headers.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ChannelError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            method,
            headers,
            client,
        })
    }

    async fn deliver_to(&self, url: &str, alert: &AlertRecord) -> DeliveryAttempt {
        // Configured headers replace the ones `json` sets
        let request = self
            .client
            .request(self.method.clone(), url)
            .json(alert)
            .headers(self.headers.clone());

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                let error = ChannelError::Delivery(format!("Failed to send webhook: {}", e));
                tracing::error!(url = %url, error = %error, "Failed to send webhook alert");
                return DeliveryAttempt::failed(url, &error);
            }
        };

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            let error = ChannelError::Delivery(format!("Webhook returned status {}", status));
            tracing::error!(url = %url, status = status.as_u16(), "Webhook returned error status");
            return DeliveryAttempt::failed(url, &error);
        }

        tracing::info!(url = %url, status = status.as_u16(), "Webhook alert sent");
        DeliveryAttempt::ok(url)
    }
}

#[async_trait]
impl ChannelSender for WebhookSender {
    fn name(&self) -> &str {
        "webhook"
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    async fn send(&self, alert: &AlertRecord) -> DispatchOutcome {
        let unavailable = if !self.config.enabled {
            Some("webhook alerts disabled")
        } else if self.config.urls.is_empty() {
            Some("no webhook URLs configured")
        } else {
            None
        };
        if let Some(reason) = unavailable {
            let error = ChannelError::Unavailable(reason.to_string());
            tracing::info!(channel = "webhook", "Skipping webhook alert: {}", error);
            return DispatchOutcome::failed(self.name(), &error);
        }

        let attempts = futures::future::join_all(
            self.config
                .urls
                .iter()
                .map(|url| self.deliver_to(url, alert)),
        )
        .await;

        DispatchOutcome::from_attempts(self.name(), attempts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::normalize;
    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{post, put};
    use axum::{Json, Router};
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::Arc;

    /// Token header, number of content-type values, body
    type Captured = Arc<Mutex<Vec<(Option<String>, usize, Value)>>>;

    async fn capture(
        State(captured): State<Captured>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> StatusCode {
        let token = headers
            .get("x-alert-token")
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let content_types = headers.get_all("content-type").iter().count();
        captured.lock().push((token, content_types, body));
        StatusCode::NO_CONTENT
    }

    /// Serve a few fixed-status endpoints on an ephemeral port
    async fn spawn_server() -> (String, Captured) {
        let captured: Captured = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route("/ok", post(|| async { StatusCode::OK }))
            .route("/fail", post(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
            .route("/missing", post(|| async { StatusCode::NOT_FOUND }))
            .route(
                "/slow",
                post(|| async {
                    tokio::time::sleep(Duration::from_secs(3)).await;
                    StatusCode::OK
                }),
            )
            .route(
                "/pause",
                post(|| async {
                    tokio::time::sleep(Duration::from_millis(300)).await;
                    StatusCode::OK
                }),
            )
            .route("/capture", put(capture).post(capture))
            .with_state(Arc::clone(&captured));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{}", addr), captured)
    }

    fn config(urls: Vec<String>) -> WebhookConfig {
        WebhookConfig {
            enabled: true,
            urls,
            ..Default::default()
        }
    }

    fn alert() -> AlertRecord {
        normalize(
            json!({"severity": "high", "message": "x", "source": "ids1", "rule_id": 9})
                .as_object()
                .cloned()
                .unwrap(),
            chrono::Utc::now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_any_url_success_marks_channel_succeeded() {
        let (base, _) = spawn_server().await;
        let sender = WebhookSender::from_config(config(vec![
            format!("{}/fail", base),
            format!("{}/ok", base),
            format!("{}/missing", base),
        ]))
        .unwrap();

        let outcome = sender.send(&alert()).await;

        assert!(outcome.succeeded);
        assert_eq!(outcome.attempts.len(), 3);
        assert_eq!(outcome.attempts.iter().filter(|a| a.succeeded).count(), 1);
        assert!(outcome.attempts[0].error.as_deref().unwrap().contains("500"));
        assert!(outcome.attempts[2].error.as_deref().unwrap().contains("404"));
    }

    #[tokio::test]
    async fn test_all_urls_failing() {
        let (base, _) = spawn_server().await;
        let sender = WebhookSender::from_config(config(vec![
            format!("{}/fail", base),
            // Nothing listens on port 1
            "http://127.0.0.1:1/hook".to_string(),
        ]))
        .unwrap();

        let outcome = sender.send(&alert()).await;

        assert!(!outcome.succeeded);
        assert_eq!(outcome.attempts.len(), 2);
        assert!(outcome.attempts.iter().all(|a| a.error.is_some()));
        assert!(outcome.error.unwrap().contains("Webhook returned status 500"));
    }

    #[tokio::test]
    async fn test_method_headers_and_body() {
        let (base, captured) = spawn_server().await;
        let mut headers = HashMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        headers.insert("X-Alert-Token".to_string(), "s3cret".to_string());
        let sender = WebhookSender::from_config(WebhookConfig {
            method: "put".to_string(),
            headers,
            ..config(vec![format!("{}/capture", base)])
        })
        .unwrap();

        let outcome = sender.send(&alert()).await;
        assert!(outcome.succeeded);

        let captured = captured.lock();
        assert_eq!(captured.len(), 1);
        let (token, content_types, body) = &captured[0];
        assert_eq!(token.as_deref(), Some("s3cret"));
        assert_eq!(*content_types, 1);
        assert_eq!(body["severity"], "high");
        assert_eq!(body["source"], "ids1");
        assert_eq!(body["event_type"], "security_alert");
        assert_eq!(body["rule_id"], 9);
    }

    #[tokio::test]
    async fn test_default_headers_send_one_content_type() {
        let (base, captured) = spawn_server().await;
        let sender = WebhookSender::from_config(config(vec![format!("{}/capture", base)])).unwrap();

        assert!(sender.send(&alert()).await.succeeded);

        let captured = captured.lock();
        assert_eq!(captured[0].1, 1);
    }

    #[tokio::test]
    async fn test_urls_attempted_concurrently() {
        let (base, _) = spawn_server().await;
        let sender = WebhookSender::from_config(config(vec![
            format!("{}/pause", base),
            format!("{}/pause", base),
            format!("{}/pause", base),
        ]))
        .unwrap();

        let started = std::time::Instant::now();
        let outcome = sender.send(&alert()).await;

        assert!(outcome.succeeded);
        assert_eq!(outcome.attempts.len(), 3);
        assert!(started.elapsed() < Duration::from_millis(800));
    }

    #[tokio::test]
    async fn test_request_timeout_is_failure() {
        let (base, _) = spawn_server().await;
        let sender = WebhookSender::from_config(WebhookConfig {
            timeout_secs: 1,
            ..config(vec![format!("{}/slow", base), format!("{}/ok", base)])
        })
        .unwrap();

        let started = std::time::Instant::now();
        let outcome = sender.send(&alert()).await;

        assert!(outcome.succeeded);
        assert!(!outcome.attempts[0].succeeded);
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_disabled_or_empty_is_unavailable() {
        let sender = WebhookSender::from_config(WebhookConfig::default()).unwrap();
        assert!(!sender.is_enabled());
        let outcome = sender.send(&alert()).await;
        assert!(!outcome.succeeded);
        assert!(outcome.attempts.is_empty());
        assert!(outcome.error.unwrap().contains("disabled"));

        let sender = WebhookSender::from_config(config(Vec::new())).unwrap();
        let outcome = sender.send(&alert()).await;
        assert!(outcome.error.unwrap().contains("no webhook URLs"));
    }

    #[test]
    fn test_invalid_method_rejected() {
        let result = WebhookSender::from_config(WebhookConfig {
            method: "NOT A METHOD".to_string(),
            ..Default::default()
        });
        assert!(matches!(result, Err(ChannelError::Config(_))));
    }

    #[test]
    fn test_invalid_header_rejected() {
        let mut headers = HashMap::new();
        headers.insert("Bad Header".to_string(), "x".to_string());
        let result = WebhookSender::from_config(WebhookConfig {
            headers,
            ..Default::default()
        });
        assert!(matches!(result, Err(ChannelError::Config(ref msg)) if msg.contains("header")));
    }
}
