//! Per-hospital access token cache
//!
//! Tokens come from the OAuth2 client-credentials endpoint and are reused
//! until `expires_in - refresh_margin` seconds have passed since issue.
//! Each hospital has its own lock, so a refresh race converges on one token.

use crate::config::{secret_string, HospitalConfig, SecretString};
use crate::domain::errors::RegistryError;
use crate::domain::ids::HospitalId;
use crate::domain::Result;
use chrono::{DateTime, Duration, Utc};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

struct Credentials {
    client_id: String,
    client_secret: SecretString,
}

struct CachedToken {
    access_token: SecretString,
    issued_at: DateTime<Utc>,
    expires_in: i64,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        now - self.issued_at < Duration::seconds(self.expires_in) - margin
    }
}

/// Token endpoint response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    /// Sent as a string by some gateways
    #[serde(default)]
    expires_in: Value,
}

impl TokenResponse {
    fn expires_in_seconds(&self) -> i64 {
        match &self.expires_in {
            Value::Number(n) => n.as_i64().unwrap_or(0),
            Value::String(s) => s.trim().parse().unwrap_or(0),
            _ => 0,
        }
    }
}

struct HospitalSlot {
    credentials: Credentials,
    token: Mutex<Option<CachedToken>>,
}

/// Lazily refreshed access tokens, one per hospital
pub struct TokenCache {
    http: reqwest::Client,
    auth_url: String,
    refresh_margin: Duration,
    slots: HashMap<HospitalId, Arc<HospitalSlot>>,
}

impl TokenCache {
    pub fn new(
        http: reqwest::Client,
        auth_url: impl Into<String>,
        refresh_margin_seconds: u64,
        hospitals: &[HospitalConfig],
    ) -> Result<Self> {
        let mut slots = HashMap::new();
        for hospital in hospitals {
            let id = HospitalId::new(hospital.id.clone())
                .map_err(crate::domain::BridgeError::Configuration)?;
            slots.insert(
                id,
                Arc::new(HospitalSlot {
                    credentials: Credentials {
                        client_id: hospital.client_id.clone(),
                        client_secret: hospital.client_secret.clone(),
                    },
                    token: Mutex::new(None),
                }),
            );
        }

        Ok(Self {
            http,
            auth_url: auth_url.into(),
            refresh_margin: Duration::seconds(refresh_margin_seconds as i64),
            slots,
        })
    }

    fn slot(&self, hospital: &HospitalId) -> Result<Arc<HospitalSlot>> {
        self.slots
            .get(hospital)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownHospital(hospital.to_string()).into())
    }

    /// Returns a valid token, fetching a new one when needed
    pub async fn token(&self, hospital: &HospitalId) -> Result<SecretString> {
        let slot = self.slot(hospital)?;
        let mut cached = slot.token.lock().await;

        if let Some(ref token) = *cached {
            if token.is_fresh(Utc::now(), self.refresh_margin) {
                tracing::trace!(hospital_id = %hospital, "Reusing cached access token");
                return Ok(token.access_token.clone());
            }
            tracing::info!(hospital_id = %hospital, "Access token expired, regenerating");
        }

        let fresh = self.fetch(hospital, &slot.credentials).await?;
        let token = fresh.access_token.clone();
        *cached = Some(fresh);
        Ok(token)
    }

    /// Drops the cached token so the next call fetches a new one
    pub async fn invalidate(&self, hospital: &HospitalId) {
        if let Ok(slot) = self.slot(hospital) {
            *slot.token.lock().await = None;
        }
    }

    async fn fetch(&self, hospital: &HospitalId, credentials: &Credentials) -> Result<CachedToken> {
        tracing::debug!(
            hospital_id = %hospital,
            auth_url = %self.auth_url,
            "Requesting access token with client credentials"
        );

        let response = self
            .http
            .post(&self.auth_url)
            .query(&[("grant_type", "client_credentials")])
            .form(&[
                ("client_id", credentials.client_id.as_str()),
                ("client_secret", credentials.client_secret.expose_secret().as_str()),
            ])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RegistryError::Timeout(format!("token request: {e}"))
                } else {
                    RegistryError::ConnectionFailed(format!("token request: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = if status.is_server_error() {
                RegistryError::ServerError {
                    status: status.as_u16(),
                    message: body,
                }
            } else {
                RegistryError::AuthenticationFailed(format!(
                    "token request failed with status {status}: {body}"
                ))
            };
            return Err(err.into());
        }

        let parsed: TokenResponse = response.json().await.map_err(|e| {
            RegistryError::InvalidResponse(format!("Failed to parse token response: {e}"))
        })?;

        if parsed.access_token.trim().is_empty() {
            return Err(RegistryError::AuthenticationFailed(
                "token endpoint returned an empty access_token".to_string(),
            )
            .into());
        }

        let expires_in = parsed.expires_in_seconds();
        tracing::info!(
            hospital_id = %hospital,
            expires_in = expires_in,
            "Acquired registry access token"
        );

        Ok(CachedToken {
            access_token: secret_string(parsed.access_token.clone()),
            issued_at: Utc::now(),
            expires_in,
        })
    }
}
