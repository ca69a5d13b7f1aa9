//! HTTP transport seam
//!
//! Everything above this module talks JSON values; the transport only moves
//! them over the wire and turns non-success statuses into
//! [`TransportError`]s that keep the parsed error body.

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
pub use reqwest::Method;
use reqwest::{Client, StatusCode};
use serde_json::Value;

use crate::errors::TransportError;

/// Request payload encodings used by the API.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(Value),
    /// `application/x-www-form-urlencoded`
    Form(Vec<(String, String)>),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Performs one request. Success bodies are parsed as JSON; an empty body
    /// is returned as `Value::Null`.
    async fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<RequestBody>,
    ) -> Result<Value, TransportError>;
}

/// Default transport backed by a shared [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Builds a client whose timeout leaves the server-side `timeout`
    /// parameter room to expire first.
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout + Duration::from_secs(5))
            .build()
            .map_err(|e| {
                TransportError::network(format!("Failed to create HTTP client: {e}"))
            })?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<RequestBody>,
    ) -> Result<Value, TransportError> {
        debug!("[Transport] {} {}", method, redact(url));

        let mut request = self
            .client
            .request(method, url)
            .header("Accept", "application/json");
        request = match body {
            Some(RequestBody::Json(value)) => request.json(&value),
            Some(RequestBody::Form(fields)) => request.form(&fields),
            None => request,
        };

        let response = request
            .send()
            .await
            .map_err(|e| TransportError::network(e.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| TransportError::network(e.to_string()))?;
        let parsed = if text.trim().is_empty() {
            None
        } else {
            serde_json::from_str::<Value>(&text).ok()
        };

        if status.is_success() {
            if status == StatusCode::NO_CONTENT || text.trim().is_empty() {
                return Ok(Value::Null);
            }
            return parsed.ok_or_else(|| {
                TransportError::network(format!(
                    "Expected a JSON response but got: {}",
                    truncate(&text, 200)
                ))
            });
        }

        warn!("[Transport] {} answered {}", redact(url), status);
        let error = TransportError::http(
            status.as_u16(),
            status.canonical_reason().unwrap_or("Unknown error"),
        );
        Err(match parsed {
            Some(body) => error.with_body(body),
            None => error,
        })
    }
}

/// Hides the access token when a URL is logged.
pub(crate) fn redact(url: &str) -> String {
    match url.find("access_token=") {
        Some(idx) => {
            let value_start = idx + "access_token=".len();
            let value_end = url[value_start..]
                .find(['&', '#'])
                .map(|offset| value_start + offset)
                .unwrap_or(url.len());
            format!("{}***{}", &url[..value_start], &url[value_end..])
        }
        None => url.to_string(),
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
