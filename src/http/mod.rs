//! Thin JSON-over-HTTP client shared by the OpenAI and Pinecone integrations.
//!
//! Requests are blocking (`ureq`); async callers go through [`blocking`] so
//! the request runs on tokio's blocking pool. HTTP error statuses are not
//! turned into transport errors: the provider's status code and response body
//! are handed back verbatim as [`RagError::Upstream`].


use std::time::Duration;

use anyhow::anyhow;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use crate::{RagError, Result, Service};

pub const DEFAULT_TIMEOUT_SECONDS: u64 = 60;

/// How a service expects its credentials
#[derive(Clone, PartialEq, Eq)]
pub enum Auth {
    /// `Authorization: Bearer <key>`
    Bearer(String),
    /// `Api-Key: <key>`
    ApiKey(String),
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bearer(_) => f.write_str("Bearer(***)"),
            Self::ApiKey(_) => f.write_str("ApiKey(***)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct JsonClient {
    agent: ureq::Agent,
    service: Service,
    auth: Auth,
}

impl JsonClient {
    #[inline]
    pub fn new(service: Service, auth: Auth, timeout: Duration) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .into();

        Self {
            agent,
            service,
            auth,
        }
    }

    /// Perform a GET request and decode the JSON response
    #[inline]
    pub fn get<R: DeserializeOwned>(&self, url: &Url) -> Result<R> {
        debug!("GET {} ({})", url, self.service);

        let request = self.agent.get(url.as_str());
        let response = match &self.auth {
            Auth::Bearer(key) => request
                .header("Authorization", format!("Bearer {}", key))
                .call(),
            Auth::ApiKey(key) => request.header("Api-Key", key.as_str()).call(),
        };

        let body = self.read_response(url, response)?;
        self.decode(&body)
    }

    /// Perform a POST request with a JSON body and decode the JSON response
    #[inline]
    pub fn post<B: Serialize, R: DeserializeOwned>(&self, url: &Url, body: &B) -> Result<R> {
        let request_json = serde_json::to_string(body)?;
        debug!(
            "POST {} ({}, {} bytes)",
            url,
            self.service,
            request_json.len()
        );

        let request = self
            .agent
            .post(url.as_str())
            .header("Content-Type", "application/json");
        let response = match &self.auth {
            Auth::Bearer(key) => request
                .header("Authorization", format!("Bearer {}", key))
                .send(&request_json),
            Auth::ApiKey(key) => request.header("Api-Key", key.as_str()).send(&request_json),
        };

        let body = self.read_response(url, response)?;
        self.decode(&body)
    }

    fn read_response(
        &self,
        url: &Url,
        response: std::result::Result<ureq::http::Response<ureq::Body>, ureq::Error>,
    ) -> Result<String> {
        let mut response = response.map_err(|e| {
            warn!("Transport error for {}: {}", url, e);
            RagError::Transport {
                service: self.service,
                message: e.to_string(),
            }
        })?;

        let status = response.status().as_u16();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| RagError::Transport {
                service: self.service,
                message: format!("Failed to read response body from {}: {}", url, e),
            })?;

        if !(200..300).contains(&status) {
            warn!("{} returned HTTP {} for {}", self.service, status, url);
            return Err(RagError::Upstream {
                service: self.service,
                status,
                message: body,
            });
        }

        debug!("Read {} bytes from {}", body.len(), url);
        Ok(body)
    }

    fn decode<R: DeserializeOwned>(&self, body: &str) -> Result<R> {
        // Some endpoints answer with an empty body; treat it as `null`.
        let body = if body.trim().is_empty() { "null" } else { body };
        serde_json::from_str(body).map_err(|e| RagError::UnexpectedResponse {
            service: self.service,
            message: format!("Failed to parse response: {}", e),
        })
    }
}

/// Join `path` onto `base` while keeping every segment of `base`.
///
/// `Url::join` drops the last segment of a base without a trailing slash,
/// so `https://api.openai.com/v1` + `embeddings` would lose `v1`.
#[inline]
pub fn endpoint(base: &Url, path: &str) -> Result<Url> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let with_slash = format!("{}/", base.path());
        base.set_path(&with_slash);
    }

    base.join(path.trim_start_matches('/'))
        .map_err(|e| RagError::Config(format!("Invalid endpoint '{}': {}", path, e)))
}

/// Run a blocking HTTP call on tokio's blocking pool
#[inline]
pub async fn blocking<F, T>(call: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .map_err(|e| RagError::Other(anyhow!("Blocking HTTP task failed: {}", e)))?
}
