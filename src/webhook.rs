// src/webhook.rs

use crate::config::WebhookSection;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, USER_AGENT};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("invalid webhook header '{0}'")]
    InvalidHeader(String),
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("webhook did not answer within {secs}s")]
    Timeout { secs: u64 },
    #[error("webhook request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("webhook rejected the record with HTTP {status}: {body}{}", hint_suffix(.hint))]
    Rejected {
        status: u16,
        body: String,
        hint: Option<&'static str>,
    },
}

fn hint_suffix(hint: &Option<&'static str>) -> String {
    hint.map(|h| format!(" ({h})")).unwrap_or_default()
}

/// Proof of a successful delivery.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookReceipt {
    pub status: u16,
    pub body: String,
    pub url: String,
    /// RFC 3339, UTC.
    pub timestamp: String,
}

/// The downstream scheduling endpoint that receives finished records.
#[async_trait]
pub trait Webhook: Send + Sync {
    async fn deliver(&self, record: &Value) -> Result<WebhookReceipt, WebhookError>;
}

pub struct HttpWebhook {
    client: Client,
    url: String,
    timeout_secs: u64,
}

impl HttpWebhook {
    pub fn new(url: &str, settings: &WebhookSection) -> Result<Self, WebhookError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&settings.user_agent)
                .map_err(|_| WebhookError::InvalidHeader("User-Agent".into()))?,
        );
        for (name, value) in &settings.headers {
            let name_h = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| WebhookError::InvalidHeader(name.clone()))?;
            let value_h =
                HeaderValue::from_str(value).map_err(|_| WebhookError::InvalidHeader(name.clone()))?;
            headers.insert(name_h, value_h);
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(WebhookError::Client)?;

        Ok(Self {
            client,
            url: url.to_string(),
            timeout_secs: settings.timeout_secs,
        })
    }
}

#[async_trait]
impl Webhook for HttpWebhook {
    async fn deliver(&self, record: &Value) -> Result<WebhookReceipt, WebhookError> {
        let body = serde_json::to_vec(record).unwrap_or_default();
        info!(url = %self.url, bytes = body.len(), "Posting record to webhook");

        let response = self
            .client
            .post(&self.url)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    WebhookError::Timeout { secs: self.timeout_secs }
                } else {
                    WebhookError::Transport(e)
                }
            })?;

        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();

        if !(200..300).contains(&status) {
            let hint = diagnose(status, &text, &self.url);
            error!(status, url = %self.url, hint = hint.unwrap_or("-"), "Webhook rejected record");
            return Err(WebhookError::Rejected { status, body: text, hint });
        }

        info!(status, "Webhook accepted record");
        Ok(WebhookReceipt {
            status,
            body: text,
            url: self.url.clone(),
            timestamp: now_rfc3339(),
        })
    }
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

/// An operator-facing hint for common webhook failures.
pub fn diagnose(status: u16, body: &str, url: &str) -> Option<&'static str> {
    let n8n = url.contains("n8n");
    match status {
        404 if n8n && body.contains("not registered") => Some(
            "n8n test webhook is not listening: run 'Execute Workflow' in the editor, \
             or activate the workflow and use its production URL",
        ),
        429 if n8n => Some("n8n rate limit reached, wait a few minutes before retrying"),
        401 => Some("authentication failed, check the webhook credentials"),
        403 => Some("access forbidden, the webhook refused the connection"),
        500 => Some("the webhook endpoint failed internally"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnose_n8n_test_webhook() {
        let url = "https://magia.app.n8n.cloud/webhook-test/abc";
        let body = r#"{"code":404,"message":"The requested webhook \"abc\" is not registered."}"#;
        assert!(diagnose(404, body, url).unwrap().contains("Execute Workflow"));
        assert!(diagnose(429, "", url).is_some());
    }

    #[test]
    fn test_diagnose_generic_statuses() {
        let url = "https://hooks.example/abc";
        assert!(diagnose(401, "", url).unwrap().contains("authentication"));
        assert!(diagnose(403, "", url).unwrap().contains("forbidden"));
        assert!(diagnose(500, "", url).is_some());
        assert_eq!(diagnose(404, "not registered", url), None);
        assert_eq!(diagnose(429, "", url), None);
        assert_eq!(diagnose(418, "teapot", url), None);
    }

    #[test]
    fn test_rejected_message_includes_hint() {
        let err = WebhookError::Rejected {
            status: 401,
            body: "nope".into(),
            hint: diagnose(401, "nope", "https://hooks.example"),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("webhook rejected the record with HTTP 401: nope ("));

        let err = WebhookError::Rejected { status: 502, body: "bad gateway".into(), hint: None };
        assert_eq!(err.to_string(), "webhook rejected the record with HTTP 502: bad gateway");
    }

    #[test]
    fn test_invalid_extra_header_rejected() {
        let mut settings = WebhookSection::default();
        settings.headers.insert("bad header".into(), "x".into());
        assert!(matches!(
            HttpWebhook::new("https://hooks.example", &settings),
            Err(WebhookError::InvalidHeader(_))
        ));
    }

    /// One-shot HTTP server: reads a full request, waits `delay`, then
    /// answers with `status` and `body`. Yields the raw request it saw.
    async fn serve_once(
        status: &'static str,
        body: &'static str,
        delay: Duration,
    ) -> (String, tokio::task::JoinHandle<String>) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/webhook/solicitudes", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = sock.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&buf);
                if let Some(end) = text.find("\r\n\r\n") {
                    let length = text[..end]
                        .lines()
                        .find_map(|l| {
                            let (name, value) = l.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    if buf.len() >= end + 4 + length {
                        break;
                    }
                }
            }

            tokio::time::sleep(delay).await;
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = sock.write_all(response.as_bytes()).await;
            let _ = sock.shutdown().await;
            String::from_utf8_lossy(&buf).to_string()
        });

        (url, handle)
    }

    fn settings(timeout_secs: u64) -> WebhookSection {
        let mut settings = WebhookSection {
            timeout_secs,
            ..WebhookSection::default()
        };
        settings.headers.insert("X-Token".into(), "s3cret".into());
        settings
    }

    #[tokio::test]
    async fn test_any_2xx_is_delivered() {
        let (url, server) = serve_once("201 Created", "queued", Duration::ZERO).await;
        let webhook = HttpWebhook::new(&url, &settings(5)).unwrap();

        let record = serde_json::json!({ "expediente": "CA-3020", "ciudad": "Bogotá" });
        let receipt = webhook.deliver(&record).await.unwrap();
        assert_eq!(receipt.status, 201);
        assert_eq!(receipt.body, "queued");
        assert_eq!(receipt.url, url);

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /webhook/solicitudes "));
        let lower = request.to_lowercase();
        assert!(lower.contains("content-type: application/json"));
        assert!(lower.contains("user-agent: legal-document-extractor/2.0"));
        assert!(lower.contains("x-token: s3cret"));
        assert!(request.contains(r#""expediente":"CA-3020""#));
        assert!(request.contains("Bogotá"));
    }

    #[tokio::test]
    async fn test_non_2xx_carries_body() {
        let (url, _server) = serve_once("404 Not Found", "no such workflow", Duration::ZERO).await;
        let webhook = HttpWebhook::new(&url, &settings(5)).unwrap();

        let err = webhook.deliver(&serde_json::json!({})).await.unwrap_err();
        match err {
            WebhookError::Rejected { status, body, hint } => {
                assert_eq!(status, 404);
                assert_eq!(body, "no such workflow");
                assert_eq!(hint, None);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_slow_webhook_times_out() {
        let (url, _server) = serve_once("200 OK", "late", Duration::from_secs(3)).await;
        let webhook = HttpWebhook::new(&url, &settings(1)).unwrap();

        let err = webhook.deliver(&serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, WebhookError::Timeout { secs: 1 }));
        assert_eq!(err.to_string(), "webhook did not answer within 1s");
    }

    #[test]
    fn test_timestamp_is_rfc3339() {
        let ts = now_rfc3339();
        assert!(OffsetDateTime::parse(&ts, &Rfc3339).is_ok());
    }
}
