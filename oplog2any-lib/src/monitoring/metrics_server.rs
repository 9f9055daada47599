//! HTTP server exposing Prometheus metrics
//!
//! # Endpoints
//!
//! - `GET /metrics` - Prometheus text format
//! - `GET /health` - liveness check

use crate::error::{CdcError, Result};
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{body::Incoming, service::service_fn, Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Configuration for the metrics HTTP server
#[derive(Debug, Clone)]
pub struct MetricsServerConfig {
    pub port: u16,
    pub bind_address: [u8; 4],
}

impl Default for MetricsServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            bind_address: [0, 0, 0, 0],
        }
    }
}

/// HTTP server for the metrics endpoint
#[derive(Debug)]
pub struct MetricsServer {
    config: MetricsServerConfig,
}

impl MetricsServer {
    pub fn new(config: MetricsServerConfig) -> Self {
        Self { config }
    }

    /// Serve requests until `shutdown` is cancelled
    pub async fn start(&self, shutdown: CancellationToken) -> Result<()> {
        let addr = SocketAddr::from((self.config.bind_address, self.config.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            CdcError::generic(format!("Failed to bind metrics server to {}: {}", addr, e))
        })?;

        info!("Metrics server listening on http://{}", addr);

        loop {
            let (stream, peer) = tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Metrics server stopped");
                    return Ok(());
                }
                accepted = listener.accept() => accepted?,
            };
            debug!("Metrics request from {}", peer);

            let io = TokioIo::new(stream);
            tokio::task::spawn(async move {
                if let Err(err) = hyper::server::conn::http1::Builder::new()
                    .serve_connection(io, service_fn(metrics_handler))
                    .await
                {
                    if !err.is_incomplete_message() {
                        error!("Error serving metrics connection: {:?}", err);
                    }
                }
            });
        }
    }

    pub fn config(&self) -> &MetricsServerConfig {
        &self.config
    }
}

fn response(status: StatusCode, content_type: &'static str, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

async fn metrics_handler(
    req: Request<Incoming>,
) -> std::result::Result<Response<Full<Bytes>>, Infallible> {
    let reply = match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => match super::gather_metrics() {
            Ok(metrics) => response(StatusCode::OK, PROMETHEUS_CONTENT_TYPE, metrics),
            Err(err) => {
                error!("Failed to collect metrics: {}", err);
                response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "text/plain",
                    "Failed to collect metrics".to_string(),
                )
            }
        },
        (&Method::GET, "/health") => response(
            StatusCode::OK,
            "application/json",
            r#"{"status":"healthy"}"#.to_string(),
        ),
        _ => response(StatusCode::NOT_FOUND, "text/plain", "Not Found".to_string()),
    };

    Ok(reply)
}

/// Create a metrics server on `port`, bound to all interfaces
pub fn create_metrics_server(port: u16) -> MetricsServer {
    MetricsServer::new(MetricsServerConfig {
        port,
        ..Default::default()
    })
}

pub fn create_metrics_server_with_config(config: MetricsServerConfig) -> MetricsServer {
    MetricsServer::new(config)
}
