//! HTTP transport types and the `Transport` seam.
//!
//! # Design
//! Requests and responses are plain data. `MailChimp` builds `HttpRequest`
//! values and parses `HttpResponse` values; only a `Transport` touches the
//! network. Tests plug in scripted transports, production code uses
//! `UreqTransport`.
//!
//! A non-2xx status is returned as an ordinary `HttpResponse`. Only failures
//! to complete the exchange at all are `TransportError`s.

use std::time::Duration;

use crate::error::TransportError;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

/// An HTTP request described as plain data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    /// Look up a header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// An HTTP response described as plain data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Executes an `HttpRequest` and hands back the raw response.
pub trait Transport {
    fn execute(
        &self,
        request: &HttpRequest,
        timeout: Duration,
    ) -> Result<HttpResponse, TransportError>;
}

/// Blocking transport backed by `ureq`.
///
/// One agent is kept for the lifetime of the transport so connections are
/// pooled; the timeout is applied per request. Status codes are never turned
/// into errors so that 4xx/5xx problem documents reach
/// `MailChimp::parse_response` intact.
#[derive(Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new() -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .new_agent();
        Self { agent }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for UreqTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UreqTransport").finish_non_exhaustive()
    }
}

impl Transport for UreqTransport {
    fn execute(
        &self,
        request: &HttpRequest,
        timeout: Duration,
    ) -> Result<HttpResponse, TransportError> {
        let url = request.url.as_str();
        let headers = &request.headers;
        let body = request.body.as_deref();
        let result = match request.method {
            HttpMethod::Get => prepare(self.agent.get(url), headers, timeout).call(),
            HttpMethod::Delete => prepare(self.agent.delete(url), headers, timeout).call(),
            HttpMethod::Post => send(prepare(self.agent.post(url), headers, timeout), body),
            HttpMethod::Put => send(prepare(self.agent.put(url), headers, timeout), body),
            HttpMethod::Patch => send(prepare(self.agent.patch(url), headers, timeout), body),
        };

        let mut response = result.map_err(|e| match e {
            ureq::Error::Timeout(_) => TransportError::Timeout(timeout),
            other => TransportError::Io(other.to_string()),
        })?;

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
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| TransportError::Io(e.to_string()))?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

fn prepare<B>(
    mut builder: ureq::RequestBuilder<B>,
    headers: &[(String, String)],
    timeout: Duration,
) -> ureq::RequestBuilder<B> {
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder.config().timeout_global(Some(timeout)).build()
}

fn send(
    builder: ureq::RequestBuilder<ureq::typestate::WithBody>,
    body: Option<&str>,
) -> Result<ureq::http::Response<ureq::Body>, ureq::Error> {
    match body {
        Some(body) => builder.send(body.as_bytes()),
        None => builder.send_empty(),
    }
}
