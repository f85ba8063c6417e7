//! HTTP registry client
//!
//! Talks FHIR R4 JSON over reqwest with per-hospital bearer tokens and
//! exponential backoff on retryable failures.

use super::outcome::classify;
use super::token::TokenCache;
use super::traits::{Accepted, RegistryClient, RegistryResponse};
use crate::config::{HospitalConfig, RegistryConfig, RetryConfig};
use crate::domain::errors::{BridgeError, RegistryError};
use crate::domain::ids::HospitalId;
use crate::domain::Result;
use async_trait::async_trait;
use rand::Rng;
use reqwest::{Client, Method, StatusCode};
use secrecy::ExposeSecret;
use serde_json::Value;
use std::time::Duration;
use url::Url;

/// reqwest based [`RegistryClient`]
pub struct HttpRegistryClient {
    client: Client,
    base_url: Url,
    retry: RetryConfig,
    tokens: TokenCache,
}

impl HttpRegistryClient {
    /// Creates a client for the configured registry and hospitals
    pub fn new(config: &RegistryConfig, hospitals: &[HospitalConfig]) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| {
                RegistryError::ConnectionFailed(format!("Failed to create HTTP client: {e}"))
            })?;

        // A trailing slash keeps `join` from replacing the last path segment
        let base = format!("{}/", config.base_url.trim_end_matches('/'));
        let base_url = Url::parse(&base).map_err(|e| {
            BridgeError::Configuration(format!("Invalid registry base_url '{}': {e}", config.base_url))
        })?;

        let tokens = TokenCache::new(
            client.clone(),
            config.auth_url.clone(),
            config.token_refresh_margin_seconds,
            hospitals,
        )?;

        Ok(Self {
            client,
            base_url,
            retry: config.retry.clone(),
            tokens,
        })
    }

    fn resource_url(&self, resource_type: &str, id: Option<&str>) -> Result<Url> {
        let path = match id {
            Some(id) => format!("{resource_type}/{id}"),
            None => resource_type.to_string(),
        };
        self.base_url.join(&path).map_err(|e| {
            RegistryError::InvalidResponse(format!("Cannot build URL for {path}: {e}")).into()
        })
    }

    /// Retry a request with exponential backoff
    ///
    /// Only `Err` values are retried. Rejections are returned as they come.
    async fn retry_request<F, T, Fut>(&self, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let max_retries = self.retry.max_retries.max(1);
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    attempt += 1;
                    if attempt >= max_retries || !e.is_retryable() {
                        return Err(e);
                    }

                    let delay_ms = (self.retry.initial_delay_ms as f64
                        * self.retry.backoff_multiplier.powf((attempt - 1) as f64))
                        as u64;
                    let delay_ms = delay_ms.min(self.retry.max_delay_ms);
                    let jitter_ms = rand::thread_rng().gen_range(0..=delay_ms / 4);

                    tracing::warn!(
                        attempt = attempt,
                        max_retries = max_retries,
                        delay_ms = delay_ms + jitter_ms,
                        error = %e,
                        "Retrying registry request after error"
                    );

                    tokio::time::sleep(Duration::from_millis(delay_ms + jitter_ms)).await;
                }
            }
        }
    }

    /// Sends one authenticated request and returns status plus parsed body
    async fn send(
        &self,
        hospital: &HospitalId,
        method: Method,
        url: Url,
        payload: Option<&Value>,
    ) -> Result<(StatusCode, Value)> {
        let token = self.tokens.token(hospital).await?;

        let mut request = self
            .client
            .request(method.clone(), url.clone())
            .bearer_auth(token.expose_secret().as_str())
            .header("Accept", "application/fhir+json, application/json");
        if let Some(payload) = payload {
            request = request.json(payload);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                RegistryError::Timeout(format!("{method} {url}: {e}"))
            } else {
                RegistryError::ConnectionFailed(format!("{method} {url}: {e}"))
            }
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            RegistryError::InvalidResponse(format!("Failed to read response body: {e}"))
        })?;
        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            self.tokens.invalidate(hospital).await;
            return Err(RegistryError::AuthenticationFailed(format!(
                "{method} {url} returned {status}"
            ))
            .into());
        }

        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(RegistryError::ServerError {
                status: status.as_u16(),
                message: body.to_string(),
            }
            .into());
        }

        Ok((status, body))
    }

    async fn write(
        &self,
        hospital: &HospitalId,
        method: Method,
        resource_type: &str,
        id: Option<&str>,
        payload: &Value,
    ) -> Result<RegistryResponse> {
        let url = self.resource_url(resource_type, id)?;

        let (status, body) = self
            .retry_request(|| self.send(hospital, method.clone(), url.clone(), Some(payload)))
            .await?;

        if !status.is_success() {
            let rejection = classify(status.as_u16(), body);
            tracing::info!(
                hospital_id = %hospital,
                resource_type = resource_type,
                status = rejection.status,
                kind = ?rejection.kind,
                message = %rejection.message,
                "Registry rejected payload"
            );
            return Ok(RegistryResponse::Rejected(rejection));
        }

        let returned_id = body
            .get("id")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .or_else(|| id.map(str::to_string))
            .ok_or_else(|| {
                RegistryError::InvalidResponse(format!(
                    "{resource_type} accepted without an id"
                ))
            })?;

        let returned_type = body
            .get("resourceType")
            .and_then(Value::as_str)
            .unwrap_or(resource_type)
            .to_string();

        tracing::debug!(
            hospital_id = %hospital,
            resource_type = %returned_type,
            external_id = %returned_id,
            "Registry accepted payload"
        );

        Ok(RegistryResponse::Accepted(Accepted {
            id: returned_id,
            resource_type: returned_type,
            body,
        }))
    }
}

#[async_trait]
impl RegistryClient for HttpRegistryClient {
    async fn create(
        &self,
        hospital: &HospitalId,
        resource_type: &str,
        payload: &Value,
    ) -> Result<RegistryResponse> {
        self.write(hospital, Method::POST, resource_type, None, payload)
            .await
    }

    async fn update(
        &self,
        hospital: &HospitalId,
        resource_type: &str,
        id: &str,
        payload: &Value,
    ) -> Result<RegistryResponse> {
        self.write(hospital, Method::PUT, resource_type, Some(id), payload)
            .await
    }

    async fn search(
        &self,
        hospital: &HospitalId,
        resource_type: &str,
        params: &[(String, String)],
    ) -> Result<Vec<Value>> {
        let mut url = self.resource_url(resource_type, None)?;
        url.query_pairs_mut().extend_pairs(params);

        let (status, body) = self
            .retry_request(|| self.send(hospital, Method::GET, url.clone(), None))
            .await?;

        if !status.is_success() {
            let rejection = classify(status.as_u16(), body);
            return Err(RegistryError::InvalidResponse(format!(
                "{resource_type} search failed with status {}: {}",
                rejection.status, rejection.message
            ))
            .into());
        }

        let resources = body
            .get("entry")
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|entry| entry.get("resource").cloned())
                    .collect()
            })
            .unwrap_or_default();

        Ok(resources)
    }

    fn name(&self) -> &str {
        "http"
    }
}
