//! Shared reqwest plumbing: client construction and failure classification.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;

use crate::error::{ConfigError, FailureClass};

const USER_AGENT: &str = concat!("cloud-price-sync/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct HttpOptions {
    pub timeout: Duration,
    pub verify_tls: bool,
    pub bearer: Option<String>,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            verify_tls: true,
            bearer: None,
        }
    }
}

pub fn build_client(opts: &HttpOptions) -> Result<Client, ConfigError> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Some(token) = opts.bearer.as_deref().filter(|t| !t.trim().is_empty()) {
        let value = HeaderValue::from_str(&format!("Bearer {}", token.trim())).map_err(|e| {
            ConfigError::Invalid {
                key: "bearer token",
                reason: e.to_string(),
            }
        })?;
        headers.insert(AUTHORIZATION, value);
    }

    let client = Client::builder()
        .user_agent(USER_AGENT)
        .timeout(opts.timeout)
        .default_headers(headers)
        .danger_accept_invalid_certs(!opts.verify_tls)
        .build()?;
    Ok(client)
}

/// A failed HTTP exchange, already classified for the retry policy.
#[derive(Debug, Clone)]
pub struct HttpFailure {
    pub class: FailureClass,
    pub status: Option<u16>,
    pub reason: String,
}

impl std::fmt::Display for HttpFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(f, "http {status}: {}", self.reason),
            None => f.write_str(&self.reason),
        }
    }
}

pub fn classify_status(status: StatusCode) -> FailureClass {
    if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
    {
        FailureClass::Transient
    } else {
        FailureClass::Permanent
    }
}

pub fn classify_transport(err: &reqwest::Error) -> FailureClass {
    if err.is_decode() || err.is_builder() {
        FailureClass::Permanent
    } else {
        FailureClass::Transient
    }
}

pub fn truncate_for_log(mut s: String, max_len: usize) -> String {
    if s.len() > max_len {
        let mut cut = max_len;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        s.truncate(cut);
        s.push('…');
    }
    s
}

/// Sends the request and decodes a JSON body, mapping every failure to an
/// [`HttpFailure`].
pub async fn send_json(req: RequestBuilder) -> Result<Value, HttpFailure> {
    let resp = req.send().await.map_err(|e| HttpFailure {
        class: classify_transport(&e),
        status: None,
        reason: e.to_string(),
    })?;

    let status = resp.status();
    if !status.is_success() {
        let body = truncate_for_log(resp.text().await.unwrap_or_default(), 500);
        return Err(HttpFailure {
            class: classify_status(status),
            status: Some(status.as_u16()),
            reason: body,
        });
    }

    let bytes = resp.bytes().await.map_err(|e| HttpFailure {
        class: classify_transport(&e),
        status: Some(status.as_u16()),
        reason: e.to_string(),
    })?;
    serde_json::from_slice(&bytes).map_err(|e| HttpFailure {
        class: FailureClass::Permanent,
        status: Some(status.as_u16()),
        reason: format!("invalid json body: {e}"),
    })
}
