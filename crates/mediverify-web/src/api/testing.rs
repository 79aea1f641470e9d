//! Handler-test scaffolding: a scripted transport plus request helpers
//! for driving the router through `tower::ServiceExt::oneshot`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::Request;
use axum::Router;
use mediverify_core::{
    ApiRequest, ApiResponse, AppConfig, Transport, TransportError, TransportResult,
};
use serde_json::Value;

use crate::state::AppState;

/// Serves the same response to every request and counts the calls.
pub(crate) struct CannedTransport {
    status: u16,
    body: String,
    hits: AtomicUsize,
}

impl CannedTransport {
    pub(crate) fn json(status: u16, body: &Value) -> Arc<Self> {
        Arc::new(Self {
            status,
            body: body.to_string(),
            hits: AtomicUsize::new(0),
        })
    }

    /// A transport that fails every call at the connection level.
    pub(crate) fn refusing() -> Arc<Self> {
        Arc::new(Self {
            status: 0,
            body: String::new(),
            hits: AtomicUsize::new(0),
        })
    }

    pub(crate) fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for CannedTransport {
    async fn execute(&self, _request: ApiRequest) -> TransportResult<ApiResponse> {
        self.hits.fetch_add(1, Ordering::SeqCst);
        if self.status == 0 {
            return Err(TransportError::Connect("scripted refusal".to_string()));
        }
        Ok(ApiResponse {
            status: self.status,
            body: self.body.clone(),
        })
    }
}

/// Full application router over default config and the given transport.
pub(crate) fn app(transport: Arc<CannedTransport>) -> Router {
    let state = AppState::with_transport(AppConfig::default(), transport);
    Router::new()
        .nest("/api", crate::api::router())
        .with_state(state)
}

pub(crate) fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub(crate) fn post_text(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "text/csv")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub(crate) fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub(crate) async fn body_json(body: Body) -> Value {
    let bytes = to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub(crate) async fn body_text(body: Body) -> String {
    let bytes = to_bytes(body, usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}
