//! Thin Azure Resource Manager REST client.

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;
use uuid::Uuid;

use super::credential::TokenCredential;
use super::lro::LongRunningOperation;
use crate::error::{Error, Result};

/// Public cloud management endpoint.
pub const DEFAULT_MANAGEMENT_ENDPOINT: &str = "https://management.azure.com/";

const AZURE_ASYNC_OPERATION: &str = "azure-asyncoperation";
const CLIENT_REQUEST_ID: &str = "x-ms-client-request-id";

/// A response whose body has been read.
#[derive(Debug)]
pub(crate) struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl RawResponse {
    /// `Retry-After` in seconds, if present.
    pub fn retry_after(&self) -> Option<Duration> {
        self.headers
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
    }

    pub fn header_url(&self, name: &str) -> Option<Url> {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Url::parse(v).ok())
    }

    pub fn async_operation_url(&self) -> Option<Url> {
        self.header_url(AZURE_ASYNC_OPERATION)
    }

    pub fn location_url(&self) -> Option<Url> {
        self.header_url(reqwest::header::LOCATION.as_str())
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.body)?)
    }

    /// Turn a non-success response into an [`Error`].
    pub fn error_for_status(self) -> Result<Self> {
        if self.status.is_success() {
            Ok(self)
        } else {
            Err(error_for_status(self.status, &self.body))
        }
    }
}

#[derive(Deserialize)]
struct ArmErrorResponse {
    error: ArmErrorBody,
}

/// The `error` object ARM returns on failures and in operation status bodies.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ArmErrorBody {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ArmErrorBody {
    pub fn describe(&self) -> String {
        match (self.code.as_deref(), self.message.as_deref()) {
            (Some(code), Some(message)) => format!("{}: {}", code, message),
            (Some(code), None) => code.to_string(),
            (None, Some(message)) => message.to_string(),
            (None, None) => "no details".to_string(),
        }
    }
}

/// Map an ARM error response to an [`Error`].
pub fn error_for_status(status: StatusCode, body: &str) -> Error {
    let parsed = serde_json::from_str::<ArmErrorResponse>(body)
        .map(|r| r.error)
        .unwrap_or_default();
    let code = parsed.code.clone().unwrap_or_else(|| status.to_string());
    let message = match parsed.message {
        Some(message) => message,
        None if body.trim().is_empty() => format!("HTTP {}", status),
        None => body.trim().to_string(),
    };

    match status {
        StatusCode::UNAUTHORIZED => Error::Authentication(message),
        StatusCode::FORBIDDEN => Error::Authorization(format!("{}: {}", code, message)),
        StatusCode::NOT_FOUND => Error::NotFound(message),
        StatusCode::CONFLICT => Error::Conflict(format!("{}: {}", code, message)),
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => Error::Transient {
            status: status.as_u16(),
            message,
        },
        s if s.is_server_error() => Error::Transient {
            status: s.as_u16(),
            message,
        },
        s => Error::Api {
            status: s.as_u16(),
            code,
            message,
        },
    }
}

/// Azure Resource Manager client.
///
/// Authenticates every request with a bearer token for the management
/// endpoint and tags it with a fresh `x-ms-client-request-id`.
#[derive(Clone)]
pub struct ArmClient {
    http: reqwest::Client,
    endpoint: Url,
    scope: String,
    credential: Arc<dyn TokenCredential>,
    poll_interval: Duration,
}

impl ArmClient {
    /// Create a client for `endpoint`.
    pub fn new(
        http: reqwest::Client,
        endpoint: Url,
        credential: Arc<dyn TokenCredential>,
        poll_interval: Duration,
    ) -> Self {
        let mut endpoint = endpoint;
        if !endpoint.path().ends_with('/') {
            let path = format!("{}/", endpoint.path());
            endpoint.set_path(&path);
        }
        let scope = format!("{}.default", endpoint);
        Self {
            http,
            endpoint,
            scope,
            credential,
            poll_interval,
        }
    }

    /// The management endpoint.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Token scope used for this endpoint.
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Default delay between long-running operation polls.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Build `{endpoint}{path}?api-version={api_version}`.
    pub fn resource_url(&self, path: &str, api_version: &str) -> Result<Url> {
        let mut url = self.endpoint.join(path.trim_start_matches('/'))?;
        url.query_pairs_mut().append_pair("api-version", api_version);
        Ok(url)
    }

    /// Authenticate, tag and send a request, reading the whole body.
    pub(crate) async fn send(&self, request: RequestBuilder) -> Result<RawResponse> {
        let token = self.credential.get_token(&self.scope).await?;
        let request = request
            .bearer_auth(token.token.expose())
            .header(CLIENT_REQUEST_ID, Uuid::new_v4().to_string())
            .build()?;

        let method = request.method().clone();
        let url = request.url().clone();

        let response = self.http.execute(request).await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await?;

        debug!(%method, url = %url, status = status.as_u16(), "ARM request");

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }

    pub(crate) async fn get_raw(&self, url: Url) -> Result<RawResponse> {
        self.send(self.http.request(Method::GET, url)).await
    }

    /// GET a resource and deserialize it.
    pub async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        self.get_raw(url).await?.error_for_status()?.json()
    }

    /// Start a create-or-update and return the operation to await.
    pub async fn begin_put<B>(
        &self,
        url: Url,
        body: &B,
        resource: &str,
    ) -> Result<LongRunningOperation<'_>>
    where
        B: Serialize + ?Sized,
    {
        let response = self
            .send(self.http.request(Method::PUT, url.clone()).json(body))
            .await?
            .error_for_status()?;

        Ok(LongRunningOperation::new(self, url, resource, response))
    }

    /// Create-or-update and wait for the resource to reach a terminal state.
    pub async fn put_and_wait<B, T>(&self, url: Url, body: &B, resource: &str) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.begin_put(url, body, resource).await?.wait().await
    }
}

impl std::fmt::Debug for ArmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArmClient")
            .field("endpoint", &self.endpoint.as_str())
            .field("credential", &self.credential.name())
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}
