//! Secret store abstraction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::SecretResult;
use super::no_log::SensitiveString;

/// Metadata of a stored secret version. Never carries the value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretMetadata {
    /// Secret name
    pub name: String,
    /// Version created by the write
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Full identifier of the version
    pub id: String,
    /// Whether the secret is enabled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Creation timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    /// Last update timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateTime<Utc>>,
}

/// Persists generated secrets.
///
/// Writing an existing name creates a new version rather than failing.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Store `value` under `name` in the vault at `vault_uri`.
    async fn set_secret(
        &self,
        vault_uri: &str,
        name: &str,
        value: &SensitiveString,
    ) -> SecretResult<SecretMetadata>;

    /// Store name for logging.
    fn name(&self) -> &str {
        "Azure Key Vault"
    }
}
