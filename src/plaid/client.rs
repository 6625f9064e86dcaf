use std::time::Instant;

use reqwest::header::HeaderMap;
use serde_json::{Map, Value};
use tracing::{debug, info};

use super::credentials::PlaidCredentials;
use super::environment::resolve_environment;
use super::error::PlaidError;
use super::helpers::mask_credential;
use super::settings::PlaidSettings;
use crate::logger::RequestMetrics;

/// Thin JSON-over-HTTPS client. One call, one POST; no retries.
#[derive(Clone, Debug)]
pub struct PlaidClient {
    http: reqwest::Client,
    base_url: String,
    headers: HeaderMap,
    client_id: String,
    secret: String,
    metrics: RequestMetrics,
}

impl PlaidClient {
    pub fn new(credentials: &PlaidCredentials, settings: &PlaidSettings) -> Result<Self, PlaidError> {
        let resolved = resolve_environment(credentials, settings)?;
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| PlaidError::Transport(format!("could not build HTTP client: {e}")))?;

        debug!(
            base_url = %resolved.base_url,
            client_id = %mask_credential(&credentials.client_id),
            "Plaid client ready"
        );

        Ok(Self {
            http,
            base_url: resolved.base_url,
            headers: resolved.headers,
            client_id: credentials.client_id.clone(),
            secret: credentials.secret.clone(),
            metrics: RequestMetrics::new(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST `body` to `endpoint`. `client_id` and `secret` are added to the
    /// body as well as sent in headers.
    #[tracing::instrument(name = "plaid_post", skip(self, body))]
    pub async fn post(&self, endpoint: &str, mut body: Map<String, Value>) -> Result<Value, PlaidError> {
        body.insert("client_id".into(), Value::String(self.client_id.clone()));
        body.insert("secret".into(), Value::String(self.secret.clone()));

        let url = format!("{}{}", self.base_url, endpoint);
        self.metrics.started(endpoint);
        let started = Instant::now();

        let result = self.send(&url, &body).await;

        let elapsed = started.elapsed();
        self.metrics.finished(endpoint, elapsed, result.is_ok());
        let code = result.as_ref().err().map(PlaidError::code).unwrap_or("OK");
        info!(
            target: "request",
            endpoint,
            code,
            elapsed_ms = elapsed.as_millis() as u64,
            "plaid request"
        );
        if let Err(e) = &result {
            debug!(code = e.code(), "Plaid request failed");
        }
        result
    }

    async fn send(&self, url: &str, body: &Map<String, Value>) -> Result<Value, PlaidError> {
        let response = self
            .http
            .post(url)
            .headers(self.headers.clone())
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PlaidError::Transport(format!("request to {url} timed out"))
                } else {
                    PlaidError::Transport(format!("request to {url} failed: {e}"))
                }
            })?;
        Self::parse_response(response).await
    }

    async fn parse_response(response: reqwest::Response) -> Result<Value, PlaidError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PlaidError::Transport(format!("failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(PlaidError::from_error_body(status.as_u16(), &body));
        }

        serde_json::from_str(&body).map_err(|e| {
            PlaidError::Transport(format!(
                "malformed response body: {} - {}",
                e,
                body.chars().take(200).collect::<String>()
            ))
        })
    }
}
