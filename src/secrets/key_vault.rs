//! Azure Key Vault secret store.
//!
//! Writes secrets through the Key Vault data plane REST API:
//!
//! ```text
//! PUT {vaultUri}secrets/{name}?api-version=7.4
//! {"value": "..."}
//! ```
//!
//! The response echoes the value back; it is never deserialized or logged.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

use super::error::{SecretError, SecretResult};
use super::no_log::SensitiveString;
use super::store::{SecretMetadata, SecretStore};
use crate::azure::credential::{TokenCredential, KEY_VAULT_SCOPE};

/// Key Vault data plane API version.
pub const KEY_VAULT_API_VERSION: &str = "7.4";

/// Key Vault secret store.
pub struct KeyVaultSecretStore {
    http: reqwest::Client,
    credential: Arc<dyn TokenCredential>,
    api_version: String,
}

#[derive(Serialize)]
struct SetSecretRequest<'a> {
    value: &'a str,
}

// `value` is deliberately absent.
#[derive(Deserialize)]
struct SecretBundle {
    id: String,
    #[serde(default)]
    attributes: Option<SecretAttributes>,
}

#[derive(Deserialize)]
struct SecretAttributes {
    #[serde(default)]
    enabled: Option<bool>,
    #[serde(default)]
    created: Option<i64>,
    #[serde(default)]
    updated: Option<i64>,
}

#[derive(Deserialize)]
struct KeyVaultErrorResponse {
    error: KeyVaultErrorBody,
}

#[derive(Deserialize)]
struct KeyVaultErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl KeyVaultSecretStore {
    /// Create a store using `credential` for Key Vault tokens.
    pub fn new(http: reqwest::Client, credential: Arc<dyn TokenCredential>) -> Self {
        Self {
            http,
            credential,
            api_version: KEY_VAULT_API_VERSION.to_string(),
        }
    }

    /// Override the API version.
    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    fn secret_url(&self, vault_uri: &str, name: &str) -> SecretResult<Url> {
        let base = if vault_uri.ends_with('/') {
            vault_uri.to_string()
        } else {
            format!("{}/", vault_uri)
        };
        let base = Url::parse(&base).map_err(|e| {
            SecretError::Configuration(format!("invalid vault URI '{}': {}", vault_uri, e))
        })?;

        let mut url = base.join("secrets/").map_err(|e| {
            SecretError::Configuration(format!("invalid vault URI '{}': {}", vault_uri, e))
        })?;
        url.path_segments_mut()
            .map_err(|_| {
                SecretError::Configuration(format!("vault URI '{}' cannot be a base", vault_uri))
            })?
            .pop_if_empty()
            .push(name);
        url.query_pairs_mut()
            .append_pair("api-version", &self.api_version);
        Ok(url)
    }

    /// Map a Key Vault error response to a [`SecretError`].
    fn parse_error(status: StatusCode, headers: &HeaderMap, body: &str) -> SecretError {
        let (code, message) = match serde_json::from_str::<KeyVaultErrorResponse>(body) {
            Ok(parsed) => (
                parsed.error.code.unwrap_or_default(),
                parsed.error.message.unwrap_or_default(),
            ),
            Err(_) => (String::new(), String::new()),
        };
        let message = match (code.is_empty(), message.is_empty()) {
            (true, true) => format!("HTTP {}", status),
            (true, false) => message,
            (false, true) => code,
            (false, false) => format!("{}: {}", code, message),
        };

        match status {
            StatusCode::UNAUTHORIZED => SecretError::Authentication(message),
            StatusCode::FORBIDDEN => SecretError::Authorization(message),
            StatusCode::NOT_FOUND => SecretError::NotFound(message),
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = headers
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .map(|v| format!(" (retry after {}s)", v))
                    .unwrap_or_default();
                SecretError::RateLimited(format!("{}{}", message, retry_after))
            }
            _ => SecretError::backend(message, Some(status.as_u16())),
        }
    }

    /// Split `https://{vault}/secrets/{name}/{version}` into name and version.
    fn parse_secret_id(id: &str) -> (Option<String>, Option<String>) {
        let Ok(url) = Url::parse(id) else {
            return (None, None);
        };
        let segments: Vec<&str> = match url.path_segments() {
            Some(segments) => segments.filter(|s| !s.is_empty()).collect(),
            None => return (None, None),
        };
        match segments.as_slice() {
            ["secrets", name, version, ..] => {
                (Some(name.to_string()), Some(version.to_string()))
            }
            ["secrets", name] => (Some(name.to_string()), None),
            _ => (None, None),
        }
    }
}

fn timestamp(secs: Option<i64>) -> Option<DateTime<Utc>> {
    secs.and_then(|s| DateTime::from_timestamp(s, 0))
}

#[async_trait]
impl SecretStore for KeyVaultSecretStore {
    async fn set_secret(
        &self,
        vault_uri: &str,
        name: &str,
        value: &SensitiveString,
    ) -> SecretResult<SecretMetadata> {
        let url = self.secret_url(vault_uri, name)?;

        let token = self
            .credential
            .get_token(KEY_VAULT_SCOPE)
            .await
            .map_err(|e| SecretError::Authentication(e.to_string()))?;

        debug!(secret = %name, vault = %vault_uri, "Writing secret");

        let response = self
            .http
            .put(url)
            .bearer_auth(token.token.expose())
            .json(&SetSecretRequest {
                value: value.expose(),
            })
            .send()
            .await?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(Self::parse_error(status, &headers, &body));
        }

        let bundle: SecretBundle = serde_json::from_str(&body)
            .map_err(|e| SecretError::InvalidResponse(e.to_string()))?;

        let (parsed_name, version) = Self::parse_secret_id(&bundle.id);
        let attributes = bundle.attributes;

        let metadata = SecretMetadata {
            name: parsed_name.unwrap_or_else(|| name.to_string()),
            version,
            id: bundle.id,
            enabled: attributes.as_ref().and_then(|a| a.enabled),
            created: timestamp(attributes.as_ref().and_then(|a| a.created)),
            updated: timestamp(attributes.as_ref().and_then(|a| a.updated)),
        };

        info!(
            secret = %metadata.name,
            version = metadata.version.as_deref().unwrap_or("-"),
            "Secret stored"
        );

        Ok(metadata)
    }
}
