//! Health and Metrics Server
//!
//! Minimal HTTP/1 endpoint set for probes and scraping:
//!
//! | Path                  | Response                                   |
//! |-----------------------|--------------------------------------------|
//! | `/healthz`, `/livez`  | `200 ok` while the process runs            |
//! | `/readyz`             | health report; `503` when a check errors   |
//! | `/stats`              | JSON [`StatsReport`](crate::monitoring::StatsReport) |
//! | `/metrics`            | Prometheus text exposition                 |

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::coordinator::Coordinator;
use crate::error::{Error, Result};
use crate::monitoring::MetricsExporter;

/// Shared state behind every connection
pub struct ServerState {
    coordinator: Arc<Coordinator>,
    exporter: MetricsExporter,
}

impl ServerState {
    pub fn new(coordinator: Arc<Coordinator>) -> Result<Self> {
        Ok(Self {
            coordinator,
            exporter: MetricsExporter::new()?,
        })
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }
}

/// Bind the listener
pub async fn bind(addr: &str) -> Result<TcpListener> {
    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| Error::Config(format!("Invalid health server address {}: {}", addr, e)))?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Internal(format!("Failed to bind health server: {}", e)))?;

    info!("Health server listening on {}", addr);
    Ok(listener)
}

/// Accept connections until the task is dropped
pub async fn serve(listener: TcpListener, state: Arc<ServerState>) -> Result<()> {
    loop {
        let (stream, peer) = listener
            .accept()
            .await
            .map_err(|e| Error::Internal(format!("Health server accept error: {}", e)))?;
        debug!("Health connection from {}", peer);

        let io = TokioIo::new(stream);
        let state = Arc::clone(&state);

        tokio::spawn(async move {
            let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                let state = Arc::clone(&state);
                async move { Ok::<_, Infallible>(handle(&state, req.method(), req.uri().path()).await) }
            });
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                error!("Health server connection error: {}", e);
            }
        });
    }
}

/// Route one request
pub async fn handle(state: &ServerState, method: &Method, path: &str) -> Response<Full<Bytes>> {
    if method != Method::GET && method != Method::HEAD {
        return text(StatusCode::METHOD_NOT_ALLOWED, "method not allowed");
    }

    match path {
        "/healthz" | "/livez" => text(StatusCode::OK, "ok"),
        "/readyz" => {
            let report = state.coordinator.health_check().await;
            let status = if report.status.is_operational() {
                StatusCode::OK
            } else {
                StatusCode::SERVICE_UNAVAILABLE
            };
            json(status, &report)
        }
        "/stats" => json(StatusCode::OK, &state.coordinator.stats().await),
        "/metrics" => {
            let stats = state.coordinator.stats().await;
            match state.exporter.render(&stats) {
                Ok(body) => respond(StatusCode::OK, state.exporter.content_type(), body),
                Err(e) => {
                    error!("Failed to render metrics: {}", e);
                    text(StatusCode::INTERNAL_SERVER_ERROR, "metrics unavailable")
                }
            }
        }
        _ => text(StatusCode::NOT_FOUND, "not found"),
    }
}

fn respond(
    status: StatusCode,
    content_type: &'static str,
    body: impl Into<Bytes>,
) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn text(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    respond(status, "text/plain; charset=utf-8", body)
}

fn json<T: Serialize>(status: StatusCode, value: &T) -> Response<Full<Bytes>> {
    match serde_json::to_vec(value) {
        Ok(body) => respond(status, "application/json", body),
        Err(e) => {
            error!("Failed to serialize response: {}", e);
            text(StatusCode::INTERNAL_SERVER_ERROR, "serialization failed")
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
