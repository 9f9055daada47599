//! Elasticsearch forwarding handler
//!
//! Posts every change event as a flat JSON document to an index endpoint:
//!
//! ```json
//! { "ts": "1700000000", "ns": "shop.orders", "id": "{}", "data": "{\"_id\":1}",
//!   "curd": "Inserted", "env": "prod" }
//! ```

use super::common::action_label;
use super::handler_factory::OplogHandler;
use crate::error::{CdcError, Result};
use crate::types::ChangeEvent;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Document body posted for each event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForwardedDocument<'a> {
    pub ts: &'a str,
    pub ns: &'a str,
    pub id: &'a str,
    pub data: &'a str,
    pub curd: String,
    pub env: &'a str,
}

impl<'a> ForwardedDocument<'a> {
    pub fn new(event: &'a ChangeEvent, env: &'a str) -> Self {
        Self {
            ts: &event.timestamp,
            ns: &event.namespace,
            id: &event.id,
            data: &event.data,
            curd: action_label(&event.operation),
            env,
        }
    }
}

/// Handler posting events to an Elasticsearch index endpoint
#[derive(Debug, Clone)]
pub struct ElasticsearchForwarder {
    client: reqwest::Client,
    url: String,
    environment: String,
}

impl ElasticsearchForwarder {
    pub fn new(url: &str, environment: &str) -> Result<Self> {
        if url.is_empty() {
            return Err(CdcError::config("Elasticsearch URL is required"));
        }

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            url: url.to_string(),
            environment: environment.to_string(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn forward(&self, event: &ChangeEvent) -> Result<()> {
        let document = ForwardedDocument::new(event, &self.environment);
        debug!(
            "{} {} {} {} {}",
            document.curd, event.timestamp, event.namespace, event.id, event.data
        );

        let response = self
            .client
            .post(&self.url)
            .header("X-Custom-Header", "no-cache")
            .json(&document)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CdcError::handler(format!(
                "Elasticsearch at {} answered {}",
                self.url, status
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl OplogHandler for ElasticsearchForwarder {
    async fn on_insert(&self, event: &ChangeEvent) -> Result<()> {
        self.forward(event).await
    }

    async fn on_update(&self, event: &ChangeEvent) -> Result<()> {
        self.forward(event).await
    }

    async fn on_delete(&self, event: &ChangeEvent) -> Result<()> {
        self.forward(event).await
    }

    async fn on_cmd(&self, event: &ChangeEvent) -> Result<()> {
        self.forward(event).await
    }

    async fn on_noop(&self, event: &ChangeEvent) -> Result<()> {
        self.forward(event).await
    }

    async fn on_unknown(&self, event: &ChangeEvent) -> Result<()> {
        self.forward(event).await
    }

    fn name(&self) -> &str {
        "elasticsearch"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OperationKind;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn event(operation: OperationKind) -> ChangeEvent {
        ChangeEvent {
            timestamp: "1700000000".to_string(),
            namespace: "shop.orders".to_string(),
            id: "{}".to_string(),
            data: r#"{"_id":1}"#.to_string(),
            operation,
        }
    }

    /// Accepts one request, answers with `status` and returns the raw request
    async fn serve_once(listener: TcpListener, status: &'static str) -> String {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 4096];

        loop {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);

            let text = String::from_utf8_lossy(&request).to_string();
            if let Some(header_end) = text.find("\r\n\r\n") {
                let content_length = text[..header_end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if request.len() >= header_end + 4 + content_length {
                    break;
                }
            }
        }

        let response = format!(
            "HTTP/1.1 {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            status
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        String::from_utf8_lossy(&request).to_string()
    }

    #[test]
    fn test_forwarded_document_fields() {
        let event = event(OperationKind::Unknown("xi".to_string()));
        let json = serde_json::to_value(ForwardedDocument::new(&event, "prod")).unwrap();

        assert_eq!(json["ts"], "1700000000");
        assert_eq!(json["ns"], "shop.orders");
        assert_eq!(json["id"], "{}");
        assert_eq!(json["data"], r#"{"_id":1}"#);
        assert_eq!(json["curd"], "Can't recognize: xi");
        assert_eq!(json["env"], "prod");
    }

    #[test]
    fn test_empty_url_rejected() {
        assert!(ElasticsearchForwarder::new("", "prod").is_err());
    }

    #[tokio::test]
    async fn test_forward_posts_json_document() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/mongo.oplogs", listener.local_addr().unwrap());
        let server = tokio::spawn(serve_once(listener, "201 Created"));

        let forwarder = ElasticsearchForwarder::new(&url, "staging").unwrap();
        forwarder
            .on_update(&event(OperationKind::Update))
            .await
            .unwrap();

        let request = server.await.unwrap();
        let lower = request.to_ascii_lowercase();
        assert!(request.starts_with("POST /mongo.oplogs HTTP/1.1"));
        assert!(lower.contains("content-type: application/json"));
        assert!(lower.contains("x-custom-header: no-cache"));
        assert!(request.contains(r#""curd":"Updated""#));
        assert!(request.contains(r#""env":"staging""#));
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/mongo.oplogs", listener.local_addr().unwrap());
        let server = tokio::spawn(serve_once(listener, "503 Service Unavailable"));

        let forwarder = ElasticsearchForwarder::new(&url, "staging").unwrap();
        let err = forwarder
            .on_insert(&event(OperationKind::Insert))
            .await
            .unwrap_err();
        server.await.unwrap();

        assert!(matches!(err, CdcError::Handler(_)));
        assert!(err.to_string().contains("503"));
    }
}
