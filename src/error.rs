//! Error types for azvm.
//!
//! Every failure in the provisioning sequence is fatal. Errors raised while a
//! step is running are wrapped in [`Error::Step`], which records the failed
//! step and the resources that were already created and are now left behind.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::provisioner::{CreatedResource, ProvisionStep};
use crate::secrets::SecretError;

/// Result type alias for azvm operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for azvm.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Identity Errors
    // ========================================================================
    /// No credential could be obtained, or the API rejected it (401).
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The credential is valid but lacks permission (403).
    #[error("Authorization failed: {0}")]
    Authorization(String),

    // ========================================================================
    // Management API Errors
    // ========================================================================
    /// A looked-up resource does not exist (404).
    #[error("Not found: {0}")]
    NotFound(String),

    /// A resource with the same name exists in a conflicting state (409).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Throttling or a server-side failure (408, 429, 5xx).
    #[error("Transient failure (HTTP {status}): {message}")]
    Transient {
        /// HTTP status code
        status: u16,
        /// Error message
        message: String,
    },

    /// Any other error response from the management API.
    #[error("API error (HTTP {status}) {code}: {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// ARM error code
        code: String,
        /// Error message
        message: String,
    },

    /// A long-running operation finished in a non-success state.
    #[error("Operation on '{resource}' ended with status {status}: {message}")]
    OperationFailed {
        /// Resource the operation was acting on
        resource: String,
        /// Terminal status reported by the service
        status: String,
        /// Error message
        message: String,
    },

    /// Transport failure talking to a collaborator.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    // ========================================================================
    // Secret Store Errors
    // ========================================================================
    /// Secret generation or secret store write failure.
    #[error("Secret store error: {0}")]
    Secret(#[from] SecretError),

    // ========================================================================
    // Configuration and Input Errors
    // ========================================================================
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid configuration value.
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidConfig {
        /// Configuration key
        key: String,
        /// Error message
        message: String,
    },

    /// Failed to read or parse a configuration file.
    #[error("Failed to load config file '{path}': {message}")]
    ConfigFile {
        /// Path to the file
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// Invalid operator input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL construction error.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    // ========================================================================
    // Provisioning Errors
    // ========================================================================
    /// A provisioning step failed; earlier resources were not rolled back.
    #[error("{step} failed: {source}")]
    Step {
        /// The step that failed
        step: ProvisionStep,
        /// Resources created before the failure
        left_behind: Vec<CreatedResource>,
        /// Underlying error
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Creates a new invalid config error.
    pub fn invalid_config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Wraps an error raised while `step` was running.
    pub fn step(step: ProvisionStep, left_behind: Vec<CreatedResource>, source: Error) -> Self {
        Self::Step {
            step,
            left_behind,
            source: Box::new(source),
        }
    }

    /// The innermost error, looking through [`Error::Step`].
    pub fn root(&self) -> &Error {
        match self {
            Error::Step { source, .. } => source.root(),
            other => other,
        }
    }

    /// Returns true if the failure is likely to go away on its own.
    ///
    /// Nothing retries automatically; this only shapes operator hints.
    pub fn is_retryable(&self) -> bool {
        match self.root() {
            Error::Transient { .. } | Error::Network(_) => true,
            Error::Secret(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Returns true for authentication and authorization failures.
    pub fn is_auth_error(&self) -> bool {
        match self.root() {
            Error::Authentication(_) | Error::Authorization(_) => true,
            Error::Secret(e) => e.is_auth_error(),
            _ => false,
        }
    }

    /// Returns true for not-found failures.
    pub fn is_not_found(&self) -> bool {
        match self.root() {
            Error::NotFound(_) => true,
            Error::Secret(SecretError::NotFound(_)) => true,
            _ => false,
        }
    }

    /// Get the HTTP status code if available.
    pub fn status_code(&self) -> Option<u16> {
        match self.root() {
            Error::Authentication(_) => Some(401),
            Error::Authorization(_) => Some(403),
            Error::NotFound(_) => Some(404),
            Error::Conflict(_) => Some(409),
            Error::Transient { status, .. } | Error::Api { status, .. } => Some(*status),
            Error::Network(e) => e.status().map(|s| s.as_u16()),
            Error::Secret(e) => e.status_code(),
            _ => None,
        }
    }

    /// Returns the error code for CLI exit status.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Config(_)
            | Error::InvalidConfig { .. }
            | Error::ConfigFile { .. }
            | Error::InvalidInput(_) => 2,
            _ => 1,
        }
    }
}

/// Operator hints for common failures.
pub struct ErrorHints;

impl ErrorHints {
    /// Get hints for a specific error.
    pub fn get_hints(error: &Error) -> Vec<String> {
        if error.is_auth_error() {
            return vec![
                "Run 'az login' (or set AZURE_CLIENT_ID, AZURE_CLIENT_SECRET and AZURE_TENANT_ID)"
                    .to_string(),
                "Check that the identity has Contributor on the resource group".to_string(),
                "Check that the identity may set secrets in the Key Vault (access policy or RBAC)"
                    .to_string(),
            ];
        }
        if error.is_not_found() {
            return vec![
                "Verify the subscription, resource group and vault names in the config".to_string(),
                "The Key Vault must exist before running azvm".to_string(),
            ];
        }
        match error.root() {
            Error::Conflict(_) => vec![
                "A resource with this name already exists; choose different names".to_string(),
                "Re-running azvm is not idempotent".to_string(),
            ],
            Error::Transient { .. } | Error::Network(_) => vec![
                "Check network connectivity to management.azure.com".to_string(),
                "The service may be throttling requests; try again later".to_string(),
            ],
            Error::OperationFailed { .. } => vec![
                "Inspect the activity log of the resource group for details".to_string(),
            ],
            Error::Config(_) | Error::InvalidConfig { .. } | Error::ConfigFile { .. } => vec![
                "Check azvm.toml and the AZVM_* / AZURE_* environment variables".to_string(),
            ],
            _ => Vec::new(),
        }
    }

    /// Format error with hints for display.
    pub fn format_with_hints(error: &Error) -> String {
        let hints = Self::get_hints(error);
        let mut output = format!("Error: {}", error);

        if !hints.is_empty() {
            output.push_str("\n\nHints:");
            for hint in hints {
                output.push_str(&format!("\n  - {}", hint));
            }
        }

        output
    }
}

/// Renders the list of resources a failed run left behind.
pub struct LeftBehind<'a>(pub &'a [CreatedResource]);

impl fmt::Display for LeftBehind<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "no resources were created");
        }
        for (i, resource) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{} {} ({})", resource.step, resource.name, resource.id)?;
        }
        Ok(())
    }
}
