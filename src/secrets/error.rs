//! Error types for secret generation and storage.

use thiserror::Error;

/// Result type for secret operations.
pub type SecretResult<T> = std::result::Result<T, SecretError>;

/// Errors that can occur while generating or persisting a secret.
#[derive(Error, Debug)]
pub enum SecretError {
    /// The vault or secret was not found.
    #[error("Secret store not found: {0}")]
    NotFound(String),

    /// Could not obtain a token for the secret store.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The caller is not allowed to write secrets to the store.
    #[error("Authorization failed: {0}")]
    Authorization(String),

    /// Invalid generator or store configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The store rejected the request.
    #[error("Backend error: {message}")]
    Backend {
        /// Error message from the backend
        message: String,
        /// HTTP status code if applicable
        status_code: Option<u16>,
    },

    /// Rate limit exceeded.
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    /// The store did not answer with a usable response.
    #[error("Invalid response from secret store: {0}")]
    InvalidResponse(String),

    /// Network error.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SecretError {
    /// Create a new backend error with status code.
    pub fn backend(message: impl Into<String>, status_code: Option<u16>) -> Self {
        Self::Backend {
            message: message.into(),
            status_code,
        }
    }

    /// Check if this error is transient.
    pub fn is_retryable(&self) -> bool {
        match self {
            SecretError::RateLimited(_) | SecretError::Network(_) => true,
            SecretError::Backend {
                status_code: Some(code),
                ..
            } => *code >= 500,
            _ => false,
        }
    }

    /// Check if this is an authentication or authorization error.
    pub fn is_auth_error(&self) -> bool {
        matches!(
            self,
            SecretError::Authentication(_) | SecretError::Authorization(_)
        )
    }

    /// Get the HTTP status code if available.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            SecretError::Backend { status_code, .. } => *status_code,
            SecretError::NotFound(_) => Some(404),
            SecretError::Authentication(_) => Some(401),
            SecretError::Authorization(_) => Some(403),
            SecretError::RateLimited(_) => Some(429),
            SecretError::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
