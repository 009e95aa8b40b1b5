// 🌐 Transport - the request-issuing primitive supplied by the host
//
// Adapters build an HttpRequest, hand it to a Transport, and classify the
// HttpResponse with `ensure_success`:
//   401 / 403      → AdapterError::Authentication
//   other non-2xx  → AdapterError::Upstream (with status)
//   no response    → AdapterError::Network (raised by the transport itself)

use crate::error::{AdapterError, AdapterResult};
use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

// ============================================================================
// REQUEST / RESPONSE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        HttpRequest {
            method: Method::Get,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn post(url: impl Into<String>) -> Self {
        HttpRequest {
            method: Method::Post,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Builder pattern: add a header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn bearer(self, token: &str) -> Self {
        self.header("Authorization", format!("Bearer {}", token))
    }

    /// Builder pattern: JSON body + content negotiation headers
    pub fn json_body(mut self, body: &Value) -> Self {
        self.body = Some(body.to_string());
        self.header("Content-Type", "application/json")
            .header("Accept", "application/json")
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// GraphQL POST: `{ operationName, variables, query }`
pub fn graphql_request(
    url: &str,
    operation_name: &str,
    variables: Value,
    query: &str,
) -> HttpRequest {
    HttpRequest::post(url).json_body(&json!({
        "operationName": operation_name,
        "variables": variables,
        "query": query,
    }))
}

/// `data` of a GraphQL response.
///
/// GraphQL reports failures with HTTP 200 and an `errors` array; an
/// UNAUTHENTICATED / FORBIDDEN code maps to Authentication, anything else
/// without data to Upstream.
pub fn graphql_data<'a>(body: &'a Value, context: &str) -> AdapterResult<&'a Value> {
    if let Some(errors) = body.get("errors").and_then(|e| e.as_array()) {
        let unauthenticated = errors.iter().any(|error| {
            matches!(
                error.pointer("/extensions/code").and_then(|c| c.as_str()),
                Some("UNAUTHENTICATED") | Some("FORBIDDEN")
            )
        });
        if unauthenticated {
            return Err(AdapterError::Authentication {
                status: 401,
                message: format!("{}: GraphQL UNAUTHENTICATED", context),
            });
        }

        let has_data = body.get("data").map(|d| !d.is_null()).unwrap_or(false);
        if !has_data && !errors.is_empty() {
            let messages: Vec<&str> = errors
                .iter()
                .filter_map(|e| e.get("message").and_then(|m| m.as_str()))
                .collect();
            return Err(AdapterError::malformed(context, messages.join("; ")));
        }
    }

    body.get("data")
        .filter(|d| d.is_object())
        .ok_or_else(|| AdapterError::missing_field(context, "data"))
}

/// Correlation id with a fixed literal prefix, e.g. "LSW-5f0c...".
pub fn correlation_id(prefix: &str) -> String {
    format!("{}-{}", prefix, uuid::Uuid::new_v4())
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        HttpResponse {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Builder pattern: add a header
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Declared media type without parameters ("application/pdf; x=y" → "application/pdf")
    pub fn content_type(&self) -> Option<String> {
        self.header("content-type")
            .and_then(|v| v.split(';').next())
            .map(|v| v.trim().to_ascii_lowercase())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self, context: &str) -> AdapterResult<T> {
        serde_json::from_slice(&self.body)
            .map_err(|e| AdapterError::malformed(context, format!("invalid JSON body: {}", e)))
    }

    /// Classify a non-success status.
    pub fn ensure_success(self, context: &str) -> AdapterResult<Self> {
        if self.is_success() {
            return Ok(self);
        }

        let message = status_text(self.status, &self.text());
        match self.status {
            401 | 403 => Err(AdapterError::Authentication {
                status: self.status,
                message: format!("{}: {}", context, message),
            }),
            status => Err(AdapterError::upstream_status(context, status, message)),
        }
    }
}

fn status_text(status: u16, body: &str) -> String {
    let reason = reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown Status");
    let snippet: String = body.trim().chars().take(200).collect();
    if snippet.is_empty() {
        reason.to_string()
    } else {
        format!("{} - {}", reason, snippet)
    }
}

// ============================================================================
// TRANSPORT TRAIT
// ============================================================================

/// Request-issuing primitive.
///
/// Returns any response that arrived, whatever its status. Only failures that
/// happen before a response exists are errors (`AdapterError::Network`).
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> AdapterResult<HttpResponse>;
}

// ============================================================================
// REQWEST TRANSPORT
// ============================================================================

/// Production transport on reqwest. Sends the host's cookie string with every
/// request, the way a browser fetch with credentials would.
pub struct ReqwestTransport {
    client: reqwest::Client,
    cookies: Option<String>,
}

impl ReqwestTransport {
    pub fn new() -> AdapterResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(ReqwestTransport {
            client,
            cookies: None,
        })
    }

    /// Builder pattern: attach the ambient cookie string
    pub fn with_cookies(mut self, cookies: impl Into<String>) -> Self {
        let cookies = cookies.into();
        self.cookies = if cookies.trim().is_empty() {
            None
        } else {
            Some(cookies)
        };
        self
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> AdapterResult<HttpResponse> {
        debug!(method = request.method.as_str(), url = %request.url, "sending request");

        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(cookies) = &self.cookies {
            builder = builder.header(reqwest::header::COOKIE, cookies.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
