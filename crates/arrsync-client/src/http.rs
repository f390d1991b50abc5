//! Authenticated JSON calls to one service

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Method, Response};
use serde_json::Value;
use tracing::debug;

use crate::endpoint::ServiceEndpoint;
use crate::error::{AdapterError, AdapterResult};

const API_KEY_HEADER: &str = "X-Api-Key";
const MAX_ERROR_BODY: usize = 512;

/// Delay after the given failed attempt (1-based): `base`, then doubling,
/// capped at 256 times `base`.
pub fn backoff(base: Duration, attempt: usize) -> Duration {
    let shift = attempt.saturating_sub(1).min(8) as u32;
    base.saturating_mul(1u32 << shift)
}

/// HTTP client bound to one service's credentials.
///
/// Reads go through [`HttpClient::get_json`] and are retried as configured
/// on the endpoint. Writes are sent exactly once; the apply executor owns
/// the retry decision for them.
#[derive(Clone)]
pub struct HttpClient {
    client: ReqwestClient,
    read_attempts: usize,
    read_backoff: Duration,
}

impl HttpClient {
    /// Client with the endpoint's API key, timeout and read retry applied.
    pub fn new(endpoint: &ServiceEndpoint) -> AdapterResult<Self> {
        let mut key = HeaderValue::from_str(&endpoint.api_key)
            .map_err(|e| AdapterError::Setup(format!("invalid api key header: {}", e)))?;
        key.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, key);

        let client = ReqwestClient::builder()
            .timeout(endpoint.request_timeout)
            .user_agent(concat!("arrsync/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()
            .map_err(|e| AdapterError::Setup(e.to_string()))?;

        Ok(Self {
            client,
            read_attempts: endpoint.read_attempts.max(1),
            read_backoff: endpoint.read_backoff,
        })
    }

    /// GET a JSON document, retrying failures a repeated read may get past.
    pub async fn get_json(&self, url: &str) -> AdapterResult<Value> {
        let mut attempt = 1;
        loop {
            match self.call(Method::GET, url, None).await {
                Err(err) if attempt < self.read_attempts && read_may_succeed(&err) => {
                    let delay = backoff(self.read_backoff, attempt);
                    debug!(%url, attempt, error = %err, ?delay, "retrying read");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    /// Send a single request with an optional JSON body.
    pub async fn send_json(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> AdapterResult<Value> {
        self.call(method, url, body).await
    }

    async fn call(&self, method: Method, url: &str, body: Option<&Value>) -> AdapterResult<Value> {
        let mut request = self.client.request(method.clone(), url);
        if let Some(body) = body {
            request = request.json(body);
        }
        debug!(%method, %url, "sending HTTP request");
        let response = request.send().await?;
        debug!(%method, %url, status = %response.status(), "received HTTP response");
        read_json(method, url, response).await
    }
}

/// Reads change nothing remotely, so any network failure or server-side
/// error is worth another attempt.
fn read_may_succeed(err: &AdapterError) -> bool {
    match err {
        AdapterError::Network { .. } => true,
        AdapterError::Rejected { status, .. } => *status == 429 || *status >= 500,
        _ => false,
    }
}

async fn read_json(method: Method, url: &str, response: Response) -> AdapterResult<Value> {
    let status = response.status();
    let text = response.text().await?;

    if status.is_success() {
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        return serde_json::from_str(&text).map_err(|e| AdapterError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        });
    }

    if status.as_u16() == 401 || status.as_u16() == 403 {
        return Err(AdapterError::Unauthorized {
            method: method.to_string(),
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let mut body = text;
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
        body.push_str("...");
    }
    Err(AdapterError::Rejected {
        method: method.to_string(),
        url: url.to_string(),
        status: status.as_u16(),
        body,
    })
}
