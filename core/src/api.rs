//! Thin Mailchimp Marketing API v3 client.
//!
//! # Design
//! `MailChimp` assembles requests, hands them to a `Transport` and records
//! the outcome of the most recent call: whether it succeeded, the last error
//! message, and the last request/response pair. Building and parsing are
//! exposed separately (`build_request` / `parse_response`) so they can be
//! exercised without any I/O.
//!
//! Because every call overwrites the recorded outcome, calls take
//! `&mut self`; a single instance is not meant to be shared between
//! concurrent callers.

use std::time::Duration;

use md5::{Digest, Md5};
use serde_json::{Map, Value};

use crate::error::{NewsletterError, Result, TransportError};
use crate::http::{HttpMethod, HttpRequest, HttpResponse, Transport};

/// Request arguments: query parameters for GET, the JSON body otherwise.
pub type Params = Map<String, Value>;

const USER_AGENT: &str = concat!("newsletter-rs/", env!("CARGO_PKG_VERSION"));

const UNKNOWN_ERROR: &str = "Unknown error, call last_response() to find out what happened.";

#[derive(Debug)]
pub struct MailChimp<T> {
    api_key: String,
    endpoint: String,
    transport: T,
    success: bool,
    last_error: Option<String>,
    last_request: Option<HttpRequest>,
    last_response: Option<HttpResponse>,
}

impl<T: Transport> MailChimp<T> {
    /// Create a client for the datacenter encoded in `api_key`
    /// (`<key>-<dc>` → `https://<dc>.api.mailchimp.com/3.0`).
    pub fn new(api_key: &str, transport: T) -> Result<Self> {
        let datacenter = match api_key.rsplit_once('-') {
            Some((key, dc)) if !key.is_empty() && !dc.is_empty() => dc,
            _ => return Err(NewsletterError::InvalidApiKey(api_key.to_string())),
        };
        Ok(Self {
            api_key: api_key.to_string(),
            endpoint: format!("https://{datacenter}.api.mailchimp.com/3.0"),
            transport,
            success: false,
            last_error: None,
            last_request: None,
            last_response: None,
        })
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.trim_end_matches('/').to_string();
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The identifier Mailchimp uses for a member: MD5 of the address with
    /// ASCII letters lowercased, hex encoded. Non-ASCII characters are hashed
    /// as given.
    pub fn subscriber_hash(&self, email: &str) -> String {
        hex::encode(Md5::digest(email.to_ascii_lowercase().as_bytes()))
    }

    pub fn build_request(
        &self,
        method: HttpMethod,
        path: &str,
        args: &Params,
    ) -> Result<HttpRequest> {
        let mut url = format!("{}/{}", self.endpoint, path.trim_start_matches('/'));
        let mut headers = vec![
            ("accept".to_string(), "application/json".to_string()),
            ("authorization".to_string(), format!("apikey {}", self.api_key)),
            ("user-agent".to_string(), USER_AGENT.to_string()),
        ];

        let body = match method {
            HttpMethod::Get => {
                let query = query_string(args);
                if !query.is_empty() {
                    url.push('?');
                    url.push_str(&query);
                }
                None
            }
            HttpMethod::Delete => None,
            HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch => {
                let body = serde_json::to_string(args)
                    .map_err(|e| NewsletterError::Serialization(e.to_string()))?;
                headers.push(("content-type".to_string(), "application/json".to_string()));
                Some(body)
            }
        };

        Ok(HttpRequest {
            method,
            url,
            headers,
            body,
        })
    }

    /// Decode a response and record whether the call succeeded.
    pub fn parse_response(&mut self, response: HttpResponse) -> Result<Value> {
        self.success = false;
        self.last_error = None;
        self.last_response = Some(response.clone());

        if !response.is_success() {
            let detail = problem_detail(&response.body);
            let message = match &detail {
                Some((status, detail)) => format!("{status}: {detail}"),
                None => UNKNOWN_ERROR.to_string(),
            };
            tracing::warn!(status = response.status, error = %message, "mailchimp call failed");
            self.last_error = Some(message.clone());
            return Err(NewsletterError::Api {
                status: response.status,
                detail: detail.map(|(_, d)| d).unwrap_or(message),
            });
        }

        if response.body.trim().is_empty() {
            self.success = true;
            return Ok(Value::Null);
        }

        match serde_json::from_str(&response.body) {
            Ok(value) => {
                self.success = true;
                Ok(value)
            }
            Err(e) => {
                self.last_error = Some(format!("invalid JSON in response: {e}"));
                Err(NewsletterError::Deserialization(e.to_string()))
            }
        }
    }

    pub fn get(&mut self, path: &str, args: &Params, timeout: Duration) -> Result<Value> {
        self.make_request(HttpMethod::Get, path, args, timeout)
    }

    pub fn post(&mut self, path: &str, args: &Params, timeout: Duration) -> Result<Value> {
        self.make_request(HttpMethod::Post, path, args, timeout)
    }

    pub fn put(&mut self, path: &str, args: &Params, timeout: Duration) -> Result<Value> {
        self.make_request(HttpMethod::Put, path, args, timeout)
    }

    pub fn patch(&mut self, path: &str, args: &Params, timeout: Duration) -> Result<Value> {
        self.make_request(HttpMethod::Patch, path, args, timeout)
    }

    pub fn delete(&mut self, path: &str, args: &Params, timeout: Duration) -> Result<Value> {
        self.make_request(HttpMethod::Delete, path, args, timeout)
    }

    /// Whether the most recent call returned a 2xx status with a decodable body.
    pub fn success(&self) -> bool {
        self.success
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn last_request(&self) -> Option<&HttpRequest> {
        self.last_request.as_ref()
    }

    pub fn last_response(&self) -> Option<&HttpResponse> {
        self.last_response.as_ref()
    }

    /// Mark the most recent call as failed when a 2xx answer turns out to be
    /// unusable for the caller.
    pub(crate) fn record_failure(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(error = %message, "mailchimp call failed");
        self.success = false;
        self.last_error = Some(message);
    }

    fn make_request(
        &mut self,
        method: HttpMethod,
        path: &str,
        args: &Params,
        timeout: Duration,
    ) -> Result<Value> {
        self.success = false;
        self.last_error = None;
        self.last_request = None;
        self.last_response = None;

        let request = self.build_request(method, path, args)?;
        tracing::debug!(method = method.as_str(), url = %request.url, "mailchimp request");
        let outcome = self.transport.execute(&request, timeout);
        self.last_request = Some(request);

        match outcome {
            Ok(response) => {
                tracing::debug!(status = response.status, "mailchimp response");
                self.parse_response(response)
            }
            Err(err) => {
                let message = match &err {
                    TransportError::Timeout(after) => {
                        format!("Request timed out after {} seconds.", after.as_secs_f64())
                    }
                    TransportError::Io(msg) => msg.clone(),
                };
                tracing::warn!(error = %message, "mailchimp transport failure");
                self.last_error = Some(message);
                Err(err.into())
            }
        }
    }
}

/// Extract `(status, detail)` from a problem document, if the body is one.
fn problem_detail(body: &str) -> Option<(String, String)> {
    let value: Value = serde_json::from_str(body).ok()?;
    let status = match value.get("status")? {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let detail = value.get("detail")?.as_str()?.to_string();
    Some((status, detail))
}

fn query_string(args: &Params) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in args {
        let rendered = match value {
            Value::Null => continue,
            Value::Array(items) => items.iter().map(scalar).collect::<Vec<_>>().join(","),
            other => scalar(other),
        };
        serializer.append_pair(key, &rendered);
    }
    serializer.finish()
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    /// Transport that must never be reached.
    #[derive(Debug)]
    struct Offline;

    impl Transport for Offline {
        fn execute(
            &self,
            _request: &HttpRequest,
            timeout: Duration,
        ) -> std::result::Result<HttpResponse, TransportError> {
            Err(TransportError::Timeout(timeout))
        }
    }

    fn client() -> MailChimp<Offline> {
        MailChimp::new("abc123-us6", Offline).unwrap()
    }

    fn params(value: Value) -> Params {
        match value {
            Value::Object(map) => map,
            _ => panic!("params must be an object"),
        }
    }

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: Vec::new(),
            body: body.to_string(),
        }
    }

    #[test]
    fn endpoint_comes_from_datacenter_suffix() {
        assert_eq!(client().endpoint(), "https://us6.api.mailchimp.com/3.0");
    }

    #[test]
    fn key_without_datacenter_is_rejected() {
        let err = MailChimp::new("abc123", Offline).unwrap_err();
        assert!(matches!(err, NewsletterError::InvalidApiKey(_)));
        assert!(MailChimp::new("abc123-", Offline).is_err());
    }

    #[test]
    fn endpoint_override_strips_trailing_slash() {
        let c = client().with_endpoint("http://127.0.0.1:4000/3.0/");
        assert_eq!(c.endpoint(), "http://127.0.0.1:4000/3.0");
    }

    #[test]
    fn subscriber_hash_is_md5_of_lowercased_email() {
        let c = client();
        assert_eq!(
            c.subscriber_hash("Urist.McVankab@freddiesjokes.com"),
            "62eeb292278cc15f5817cb78f7790b08"
        );
        assert_eq!(
            c.subscriber_hash("URIST.MCVANKAB@FREDDIESJOKES.COM"),
            c.subscriber_hash("urist.mcvankab@freddiesjokes.com")
        );
    }

    #[test]
    fn subscriber_hash_lowercases_ascii_only() {
        let c = client();
        assert_eq!(
            c.subscriber_hash("JÖRG@Example.com"),
            "1b589113f29d14ba72e97dd315722763"
        );
        assert_eq!(
            c.subscriber_hash("JÖRG@Example.com"),
            c.subscriber_hash("jÖrg@example.com")
        );
    }

    #[test]
    fn get_encodes_args_as_query() {
        let req = client()
            .build_request(
                HttpMethod::Get,
                "lists/abc/members",
                &params(json!({"count": 10, "status": "subscribed", "fields": ["id", "email_address"], "skip": null})),
            )
            .unwrap();
        assert_eq!(
            req.url,
            "https://us6.api.mailchimp.com/3.0/lists/abc/members?count=10&fields=id%2Cemail_address&status=subscribed"
        );
        assert!(req.body.is_none());
        assert_eq!(req.header("authorization"), Some("apikey abc123-us6"));
        assert_eq!(req.header("content-type"), None);
    }

    #[test]
    fn post_sends_json_body() {
        let req = client()
            .build_request(HttpMethod::Post, "/campaigns", &params(json!({"type": "regular"})))
            .unwrap();
        assert_eq!(req.url, "https://us6.api.mailchimp.com/3.0/campaigns");
        assert_eq!(req.header("content-type"), Some("application/json"));
        let body: Value = serde_json::from_str(req.body.as_deref().unwrap()).unwrap();
        assert_eq!(body, json!({"type": "regular"}));
    }

    #[test]
    fn delete_has_no_body() {
        let req = client()
            .build_request(HttpMethod::Delete, "lists/abc/members/x", &Params::new())
            .unwrap();
        assert_eq!(req.method, HttpMethod::Delete);
        assert!(req.body.is_none());
    }

    #[test]
    fn parse_success_records_state() {
        let mut c = client();
        let value = c.parse_response(response(200, r#"{"id":"x"}"#)).unwrap();
        assert_eq!(value["id"], "x");
        assert!(c.success());
        assert!(c.last_error().is_none());
    }

    #[test]
    fn parse_empty_body_is_null() {
        let mut c = client();
        assert_eq!(c.parse_response(response(204, "")).unwrap(), Value::Null);
        assert!(c.success());
    }

    #[test]
    fn parse_problem_document_sets_last_error() {
        let mut c = client();
        let err = c
            .parse_response(response(
                404,
                r#"{"type":"x","title":"Resource Not Found","status":404,"detail":"The requested resource could not be found.","instance":""}"#,
            ))
            .unwrap_err();
        assert!(matches!(err, NewsletterError::Api { status: 404, ref detail } if detail == "The requested resource could not be found."));
        assert!(!c.success());
        assert_eq!(
            c.last_error(),
            Some("404: The requested resource could not be found.")
        );
    }

    #[test]
    fn parse_failure_without_problem_document() {
        let mut c = client();
        let err = c.parse_response(response(502, "bad gateway")).unwrap_err();
        assert!(matches!(err, NewsletterError::Api { status: 502, .. }));
        assert_eq!(c.last_error(), Some(UNKNOWN_ERROR));
        assert_eq!(c.last_response().unwrap().body, "bad gateway");
    }

    #[test]
    fn parse_invalid_json_is_not_success() {
        let mut c = client();
        let err = c.parse_response(response(200, "not json")).unwrap_err();
        assert!(matches!(err, NewsletterError::Deserialization(_)));
        assert!(!c.success());
    }

    #[test]
    fn sub_second_timeout_keeps_fraction() {
        let mut c = client();
        c.get("ping", &Params::new(), Duration::from_millis(1))
            .unwrap_err();
        assert_eq!(c.last_error(), Some("Request timed out after 0.001 seconds."));
    }

    #[test]
    fn record_failure_clears_success() {
        let mut c = client();
        c.parse_response(response(200, "{}")).unwrap();
        assert!(c.success());
        c.record_failure("campaign response carries no id");
        assert!(!c.success());
        assert_eq!(c.last_error(), Some("campaign response carries no id"));
    }

    #[test]
    fn timeout_is_recorded_as_last_error() {
        let mut c = client();
        let err = c
            .get("ping", &Params::new(), Duration::from_secs(10))
            .unwrap_err();
        assert!(matches!(err, NewsletterError::Transport(TransportError::Timeout(_))));
        assert_eq!(c.last_error(), Some("Request timed out after 10 seconds."));
        assert!(!c.success());
        assert_eq!(
            c.last_request().unwrap().url,
            "https://us6.api.mailchimp.com/3.0/ping"
        );
    }
}
