//! Scripted transport double shared by unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::transport::{ApiRequest, ApiResponse, Transport, TransportError, TransportResult};

/// Serves queued responses in order and records every request so tests can
/// assert on call counts and payloads. An empty queue answers 200 `{}`.
pub(crate) struct FakeTransport {
    script: Mutex<VecDeque<TransportResult<ApiResponse>>>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl FakeTransport {
    pub(crate) fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn push_response(&self, status: u16, body: &str) {
        self.script.lock().unwrap().push_back(Ok(ApiResponse {
            status,
            body: body.to_string(),
        }));
    }

    pub(crate) fn push_json(&self, status: u16, body: &serde_json::Value) {
        self.push_response(status, &body.to_string());
    }

    pub(crate) fn push_error(&self, error: TransportError) {
        self.script.lock().unwrap().push_back(Err(error));
    }

    pub(crate) fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub(crate) fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn execute(&self, request: ApiRequest) -> TransportResult<ApiResponse> {
        self.requests.lock().unwrap().push(request);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Ok(ApiResponse {
                    status: 200,
                    body: "{}".to_string(),
                })
            })
    }
}
