//! Long-running operation polling.
//!
//! ARM acknowledges create-or-update requests before the resource is ready.
//! Completion is tracked one of three ways, in order of preference:
//!
//! 1. `Azure-AsyncOperation`: poll the status URL until `Succeeded`,
//!    `Failed` or `Canceled`, then GET the resource
//! 2. `Location` with HTTP 202: poll until the response is no longer 202,
//!    then GET the resource
//! 3. Neither: poll the resource until `properties.provisioningState` is
//!    terminal
//!
//! There is no overall timeout; each request is bounded by the HTTP client.

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::client::{ArmClient, ArmErrorBody, RawResponse};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Terminal {
    Succeeded,
    Failed,
    Canceled,
}

fn classify(status: &str) -> Option<Terminal> {
    if status.eq_ignore_ascii_case("succeeded") {
        Some(Terminal::Succeeded)
    } else if status.eq_ignore_ascii_case("failed") {
        Some(Terminal::Failed)
    } else if status.eq_ignore_ascii_case("canceled") || status.eq_ignore_ascii_case("cancelled")
    {
        Some(Terminal::Canceled)
    } else {
        None
    }
}

#[derive(Deserialize)]
struct OperationStatus {
    status: String,
    #[serde(default)]
    error: Option<ArmErrorBody>,
}

#[derive(Deserialize)]
struct ProvisioningProbe {
    #[serde(default)]
    properties: Option<ProbeProperties>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProbeProperties {
    #[serde(default)]
    provisioning_state: Option<String>,
}

fn provisioning_state(body: &str) -> Option<String> {
    serde_json::from_str::<ProvisioningProbe>(body)
        .ok()
        .and_then(|p| p.properties)
        .and_then(|p| p.provisioning_state)
}

/// An in-flight create-or-update.
pub struct LongRunningOperation<'a> {
    client: &'a ArmClient,
    resource_url: Url,
    resource: String,
    initial: RawResponse,
}

impl<'a> LongRunningOperation<'a> {
    pub(crate) fn new(
        client: &'a ArmClient,
        resource_url: Url,
        resource: &str,
        initial: RawResponse,
    ) -> Self {
        Self {
            client,
            resource_url,
            resource: resource.to_string(),
            initial,
        }
    }

    /// Name of the resource being created.
    pub fn resource(&self) -> &str {
        &self.resource
    }

    fn delay(&self, response: &RawResponse) -> Duration {
        response
            .retry_after()
            .unwrap_or_else(|| self.client.poll_interval())
    }

    fn failed(&self, terminal: Terminal, error: Option<ArmErrorBody>) -> Error {
        let status = match terminal {
            Terminal::Succeeded => "Succeeded",
            Terminal::Failed => "Failed",
            Terminal::Canceled => "Canceled",
        };
        Error::OperationFailed {
            resource: self.resource.clone(),
            status: status.to_string(),
            message: error
                .map(|e| e.describe())
                .unwrap_or_else(|| "no details".to_string()),
        }
    }

    /// Wait for a terminal state and return the final resource.
    pub async fn wait<T: DeserializeOwned>(self) -> Result<T> {
        if let Some(status_url) = self.initial.async_operation_url() {
            self.wait_async_operation(status_url).await?;
            return self.client.get_json(self.resource_url.clone()).await;
        }

        if self.initial.status == StatusCode::ACCEPTED {
            if let Some(location) = self.initial.location_url() {
                self.wait_location(location).await?;
                return self.client.get_json(self.resource_url.clone()).await;
            }
        }

        self.wait_provisioning_state().await
    }

    async fn wait_async_operation(&self, status_url: Url) -> Result<()> {
        let mut delay = self.delay(&self.initial);
        loop {
            tokio::time::sleep(delay).await;
            let response = self
                .client
                .get_raw(status_url.clone())
                .await?
                .error_for_status()?;
            let status: OperationStatus = response.json()?;

            debug!(resource = %self.resource, status = %status.status, "Polled operation status");

            match classify(&status.status) {
                Some(Terminal::Succeeded) => return Ok(()),
                Some(terminal) => return Err(self.failed(terminal, status.error)),
                None => delay = self.delay(&response),
            }
        }
    }

    async fn wait_location(&self, location: Url) -> Result<()> {
        let mut delay = self.delay(&self.initial);
        loop {
            tokio::time::sleep(delay).await;
            let response = self
                .client
                .get_raw(location.clone())
                .await?
                .error_for_status()?;

            debug!(
                resource = %self.resource,
                status = response.status.as_u16(),
                "Polled operation location"
            );

            if response.status != StatusCode::ACCEPTED {
                return Ok(());
            }
            delay = self.delay(&response);
        }
    }

    async fn wait_provisioning_state<T: DeserializeOwned>(&self) -> Result<T> {
        let mut response_body = self.initial.body.clone();
        let mut delay = self.delay(&self.initial);

        loop {
            if response_body.trim().is_empty() {
                debug!(resource = %self.resource, "Empty response body, polling the resource");
            } else {
                match provisioning_state(&response_body) {
                    None => return Ok(serde_json::from_str(&response_body)?),
                    Some(state) => match classify(&state) {
                        Some(Terminal::Succeeded) => {
                            return Ok(serde_json::from_str(&response_body)?)
                        }
                        Some(terminal) => return Err(self.failed(terminal, None)),
                        None => {
                            debug!(resource = %self.resource, state = %state, "Resource still provisioning");
                        }
                    },
                }
            }

            // Every GET waits out the delay, empty bodies included.
            tokio::time::sleep(delay).await;
            let response = self
                .client
                .get_raw(self.resource_url.clone())
                .await?
                .error_for_status()?;
            delay = self.delay(&response);
            response_body = response.body;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(classify("Succeeded"), Some(Terminal::Succeeded));
        assert_eq!(classify("failed"), Some(Terminal::Failed));
        assert_eq!(classify("Canceled"), Some(Terminal::Canceled));
        assert_eq!(classify("InProgress"), None);
        assert_eq!(classify("Updating"), None);
    }

    #[test]
    fn test_provisioning_state_probe() {
        assert_eq!(
            provisioning_state(r#"{"properties":{"provisioningState":"Creating"}}"#).as_deref(),
            Some("Creating")
        );
        assert_eq!(provisioning_state(r#"{"id":"x"}"#), None);
        assert_eq!(provisioning_state("not json"), None);
    }
}
