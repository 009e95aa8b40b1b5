// Scripted transport for deterministic adapter tests.
//
// Responses are replayed in queue order; every request is recorded.

use crate::error::{AdapterError, AdapterResult};
use crate::http::{HttpRequest, HttpResponse, Transport};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;

#[derive(Default)]
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<AdapterResult<HttpResponse>>>,
    calls: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, response: HttpResponse) -> Self {
        self.responses.lock().unwrap().push_back(Ok(response));
        self
    }

    pub fn respond_json(self, status: u16, body: Value) -> Self {
        self.respond(
            HttpResponse::new(status, body.to_string())
                .with_header("Content-Type", "application/json"),
        )
    }

    pub fn fail_network(self) -> Self {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(AdapterError::Network("connection reset".to_string())));
        self
    }

    pub fn calls(&self) -> Vec<HttpRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn urls(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.url).collect()
    }

    pub fn remaining(&self) -> usize {
        self.responses.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> AdapterResult<HttpResponse> {
        self.calls.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(AdapterError::Network(format!(
                    "no scripted response for {}",
                    request.url
                )))
            })
    }
}
