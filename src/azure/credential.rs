//! Token credentials for Azure Resource Manager and Key Vault.
//!
//! Credentials are loaded from one of:
//!
//! 1. The Azure CLI session (`az login`), the default
//! 2. A service principal in `AZURE_CLIENT_ID`, `AZURE_CLIENT_SECRET`, `AZURE_TENANT_ID`
//! 3. Both, environment first (`auth = "auto"`)
//!
//! Tokens are requested per scope and reused until shortly before expiry.

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};
use crate::secrets::SensitiveString;

/// Scope for Azure Resource Manager.
pub const ARM_SCOPE: &str = "https://management.azure.com/.default";

/// Scope for the Key Vault data plane.
pub const KEY_VAULT_SCOPE: &str = "https://vault.azure.net/.default";

/// Default Microsoft Entra authority.
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com/";

/// Tokens this close to expiry are refreshed.
const REFRESH_MARGIN_SECS: i64 = 300;

/// A bearer token and its expiry.
#[derive(Clone)]
pub struct AccessToken {
    /// The bearer token
    pub token: SensitiveString,
    /// When the token stops being valid
    pub expires_on: DateTime<Utc>,
}

impl AccessToken {
    /// Create a token.
    pub fn new(token: impl Into<String>, expires_on: DateTime<Utc>) -> Self {
        Self {
            token: SensitiveString::new(token),
            expires_on,
        }
    }

    /// True if the token expires within `margin`.
    pub fn expires_within(&self, margin: chrono::Duration) -> bool {
        self.expires_on - margin <= Utc::now()
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &self.token)
            .field("expires_on", &self.expires_on)
            .finish()
    }
}

/// Source of bearer tokens.
#[async_trait]
pub trait TokenCredential: Send + Sync {
    /// Get a token for `scope` (for example [`ARM_SCOPE`]).
    async fn get_token(&self, scope: &str) -> Result<AccessToken>;

    /// Credential name for logging.
    fn name(&self) -> &'static str;
}

/// How to authenticate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// Azure CLI session
    #[default]
    Cli,
    /// Service principal from the environment
    ClientSecret,
    /// Environment first, then the CLI
    Auto,
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMethod::Cli => write!(f, "cli"),
            AuthMethod::ClientSecret => write!(f, "client_secret"),
            AuthMethod::Auto => write!(f, "auto"),
        }
    }
}

impl FromStr for AuthMethod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cli" | "azure_cli" | "azure-cli" => Ok(AuthMethod::Cli),
            "client_secret" | "client-secret" | "env" | "environment" => {
                Ok(AuthMethod::ClientSecret)
            }
            "auto" | "default" => Ok(AuthMethod::Auto),
            _ => Err(format!("Unknown auth method: {}", s)),
        }
    }
}

/// Strip `/.default` from a scope to get the CLI `--resource` value.
fn scope_to_resource(scope: &str) -> &str {
    scope.strip_suffix("/.default").unwrap_or(scope)
}

// ============================================================================
// Azure CLI
// ============================================================================

/// Uses the ambient `az login` session.
#[derive(Debug, Clone)]
pub struct AzureCliCredential {
    program: String,
    tenant_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CliTokenResponse {
    access_token: String,
    #[serde(default)]
    expires_on: Option<String>,
    #[serde(default, rename = "expires_on")]
    expires_on_epoch: Option<i64>,
}

impl AzureCliCredential {
    /// Credential using `az` from `PATH`.
    pub fn new() -> Self {
        Self {
            program: "az".to_string(),
            tenant_id: None,
        }
    }

    /// Request tokens for a specific tenant.
    pub fn with_tenant(mut self, tenant_id: Option<String>) -> Self {
        self.tenant_id = tenant_id;
        self
    }

    /// Use a different executable (for wrappers and tests).
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Parse the JSON printed by `az account get-access-token`.
    pub fn parse_token(stdout: &[u8]) -> Result<AccessToken> {
        let response: CliTokenResponse = serde_json::from_slice(stdout).map_err(|e| {
            Error::Authentication(format!("unexpected output from Azure CLI: {}", e))
        })?;

        let expires_on = match (response.expires_on_epoch, response.expires_on.as_deref()) {
            (Some(epoch), _) => DateTime::from_timestamp(epoch, 0),
            (None, Some(local)) => NaiveDateTime::parse_from_str(local, "%Y-%m-%d %H:%M:%S%.f")
                .ok()
                .and_then(|naive| Local.from_local_datetime(&naive).single())
                .map(|dt| dt.with_timezone(&Utc)),
            (None, None) => None,
        }
        // Unknown expiry: use once, never cache.
        .unwrap_or_else(Utc::now);

        Ok(AccessToken::new(response.access_token, expires_on))
    }
}

impl Default for AzureCliCredential {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenCredential for AzureCliCredential {
    async fn get_token(&self, scope: &str) -> Result<AccessToken> {
        let mut command = tokio::process::Command::new(&self.program);
        command
            .arg("account")
            .arg("get-access-token")
            .arg("--output")
            .arg("json")
            .arg("--resource")
            .arg(scope_to_resource(scope));
        if let Some(tenant) = &self.tenant_id {
            command.arg("--tenant").arg(tenant);
        }

        debug!(scope = %scope, "Requesting token from Azure CLI");

        let output = command.output().await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::Authentication(format!(
                    "Azure CLI '{}' not found on PATH",
                    self.program
                ))
            } else {
                Error::Authentication(format!("failed to run Azure CLI: {}", e))
            }
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = stderr.trim();
            return Err(Error::Authentication(if message.is_empty() {
                format!("Azure CLI exited with {}", output.status)
            } else {
                message.to_string()
            }));
        }

        Self::parse_token(&output.stdout)
    }

    fn name(&self) -> &'static str {
        "AzureCliCredential"
    }
}

// ============================================================================
// Service principal
// ============================================================================

/// OAuth2 client-credentials flow for a service principal.
pub struct ClientSecretCredential {
    http: reqwest::Client,
    authority_host: Url,
    tenant_id: String,
    client_id: String,
    client_secret: SensitiveString,
}

#[derive(Deserialize)]
struct OAuthTokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Deserialize)]
struct OAuthErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

impl ClientSecretCredential {
    /// Create a credential for the given service principal.
    pub fn new(
        http: reqwest::Client,
        authority_host: Url,
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: SensitiveString,
    ) -> Self {
        Self {
            http,
            authority_host,
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret,
        }
    }

    /// Build from `AZURE_CLIENT_ID`, `AZURE_CLIENT_SECRET` and `AZURE_TENANT_ID`.
    ///
    /// `tenant_id` from configuration is used when `AZURE_TENANT_ID` is unset.
    pub fn from_env(
        http: reqwest::Client,
        authority_host: Url,
        tenant_id: Option<&str>,
    ) -> Result<Self> {
        let client_id = std::env::var("AZURE_CLIENT_ID")
            .map_err(|_| Error::Authentication("AZURE_CLIENT_ID is not set".into()))?;
        let client_secret = std::env::var("AZURE_CLIENT_SECRET")
            .map_err(|_| Error::Authentication("AZURE_CLIENT_SECRET is not set".into()))?;
        let tenant_id = std::env::var("AZURE_TENANT_ID")
            .ok()
            .or_else(|| tenant_id.map(String::from))
            .ok_or_else(|| Error::Authentication("AZURE_TENANT_ID is not set".into()))?;

        Ok(Self::new(
            http,
            authority_host,
            tenant_id,
            client_id,
            SensitiveString::new(client_secret),
        ))
    }

    fn token_url(&self) -> Result<Url> {
        Ok(self
            .authority_host
            .join(&format!("{}/oauth2/v2.0/token", self.tenant_id))?)
    }
}

impl fmt::Debug for ClientSecretCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSecretCredential")
            .field("authority_host", &self.authority_host.as_str())
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret)
            .finish()
    }
}

#[async_trait]
impl TokenCredential for ClientSecretCredential {
    async fn get_token(&self, scope: &str) -> Result<AccessToken> {
        let url = self.token_url()?;
        debug!(scope = %scope, client_id = %self.client_id, "Requesting service principal token");

        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.expose()),
            ("scope", scope),
        ];

        let response = self
            .http
            .post(url)
            .form(&form)
            .send()
            .await
            .map_err(|e| Error::Authentication(format!("token request failed: {}", e)))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            let message = serde_json::from_str::<OAuthErrorResponse>(&body)
                .map(|e| e.error_description.unwrap_or(e.error))
                .unwrap_or_else(|_| format!("token endpoint returned HTTP {}", status));
            return Err(Error::Authentication(message));
        }

        let token: OAuthTokenResponse = serde_json::from_str(&body).map_err(|e| {
            Error::Authentication(format!("unexpected token endpoint response: {}", e))
        })?;

        let expires_on = Utc::now() + chrono::Duration::seconds(token.expires_in as i64);
        Ok(AccessToken::new(token.access_token, expires_on))
    }

    fn name(&self) -> &'static str {
        "ClientSecretCredential"
    }
}

// ============================================================================
// Composition
// ============================================================================

/// Tries each credential in turn and returns the first token obtained.
pub struct ChainedTokenCredential {
    sources: Vec<Arc<dyn TokenCredential>>,
}

impl ChainedTokenCredential {
    /// Chain the given credentials.
    pub fn new(sources: Vec<Arc<dyn TokenCredential>>) -> Self {
        Self { sources }
    }
}

#[async_trait]
impl TokenCredential for ChainedTokenCredential {
    async fn get_token(&self, scope: &str) -> Result<AccessToken> {
        let mut failures = Vec::new();
        for source in &self.sources {
            match source.get_token(scope).await {
                Ok(token) => {
                    debug!(credential = source.name(), "Credential chain resolved");
                    return Ok(token);
                }
                Err(e) => failures.push(format!("{}: {}", source.name(), e)),
            }
        }
        Err(Error::Authentication(if failures.is_empty() {
            "no credentials configured".to_string()
        } else {
            failures.join("; ")
        }))
    }

    fn name(&self) -> &'static str {
        "ChainedTokenCredential"
    }
}

/// Reuses tokens per scope until they are close to expiry.
pub struct CachedCredential {
    inner: Arc<dyn TokenCredential>,
    tokens: Mutex<HashMap<String, AccessToken>>,
}

impl CachedCredential {
    /// Wrap `inner`.
    pub fn new(inner: Arc<dyn TokenCredential>) -> Self {
        Self {
            inner,
            tokens: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl TokenCredential for CachedCredential {
    async fn get_token(&self, scope: &str) -> Result<AccessToken> {
        let margin = chrono::Duration::seconds(REFRESH_MARGIN_SECS);
        if let Some(token) = self.tokens.lock().get(scope) {
            if !token.expires_within(margin) {
                return Ok(token.clone());
            }
        }

        let token = self.inner.get_token(scope).await?;
        self.tokens.lock().insert(scope.to_string(), token.clone());
        Ok(token)
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}

/// Build the credential selected by `method`, wrapped in a token cache.
pub fn credential_for(
    method: AuthMethod,
    http: reqwest::Client,
    authority_host: Url,
    tenant_id: Option<&str>,
) -> Result<Arc<dyn TokenCredential>> {
    let cli = || -> Arc<dyn TokenCredential> {
        Arc::new(AzureCliCredential::new().with_tenant(tenant_id.map(String::from)))
    };

    let inner: Arc<dyn TokenCredential> = match method {
        AuthMethod::Cli => cli(),
        AuthMethod::ClientSecret => Arc::new(ClientSecretCredential::from_env(
            http,
            authority_host,
            tenant_id,
        )?),
        AuthMethod::Auto => {
            let mut sources: Vec<Arc<dyn TokenCredential>> = Vec::new();
            if let Ok(env) = ClientSecretCredential::from_env(http, authority_host, tenant_id) {
                sources.push(Arc::new(env));
            }
            sources.push(cli());
            Arc::new(ChainedTokenCredential::new(sources))
        }
    };

    Ok(Arc::new(CachedCredential::new(inner)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingCredential {
        calls: AtomicUsize,
        lifetime: chrono::Duration,
    }

    #[async_trait]
    impl TokenCredential for CountingCredential {
        async fn get_token(&self, _scope: &str) -> Result<AccessToken> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(AccessToken::new(format!("token-{}", n), Utc::now() + self.lifetime))
        }

        fn name(&self) -> &'static str {
            "CountingCredential"
        }
    }

    struct FailingCredential;

    #[async_trait]
    impl TokenCredential for FailingCredential {
        async fn get_token(&self, _scope: &str) -> Result<AccessToken> {
            Err(Error::Authentication("not logged in".to_string()))
        }

        fn name(&self) -> &'static str {
            "FailingCredential"
        }
    }

    #[test]
    fn test_scope_to_resource() {
        assert_eq!(scope_to_resource(ARM_SCOPE), "https://management.azure.com");
        assert_eq!(scope_to_resource(KEY_VAULT_SCOPE), "https://vault.azure.net");
        assert_eq!(scope_to_resource("https://example"), "https://example");
    }

    #[test]
    fn test_parse_cli_token_with_epoch() {
        let stdout = br#"{
            "accessToken": "eyJ0eXAi",
            "expiresOn": "2030-01-01 00:00:00.000000",
            "expires_on": 1893456000,
            "subscription": "71815b3c-0000-0000-0000-000000000000",
            "tenant": "fb9c6107-0000-0000-0000-000000000000",
            "tokenType": "Bearer"
        }"#;

        let token = AzureCliCredential::parse_token(stdout).unwrap();
        assert_eq!(token.token.expose(), "eyJ0eXAi");
        assert_eq!(token.expires_on.timestamp(), 1893456000);
    }

    #[test]
    fn test_parse_cli_token_local_time_only() {
        let stdout = br#"{"accessToken": "abc", "expiresOn": "2030-06-01 12:00:00.000000"}"#;
        let token = AzureCliCredential::parse_token(stdout).unwrap();
        assert!(!token.expires_within(chrono::Duration::seconds(60)));
    }

    #[test]
    fn test_parse_cli_token_rejects_garbage() {
        let err = AzureCliCredential::parse_token(b"Please run 'az login'").unwrap_err();
        assert!(matches!(err, Error::Authentication(_)));
    }

    #[test]
    fn test_access_token_debug_redacted() {
        let token = AccessToken::new("super-secret-token", Utc::now());
        assert!(!format!("{:?}", token).contains("super-secret-token"));
    }

    #[test]
    fn test_auth_method_from_str() {
        assert_eq!("cli".parse::<AuthMethod>().unwrap(), AuthMethod::Cli);
        assert_eq!(
            "client-secret".parse::<AuthMethod>().unwrap(),
            AuthMethod::ClientSecret
        );
        assert_eq!("auto".parse::<AuthMethod>().unwrap(), AuthMethod::Auto);
        assert!("kerberos".parse::<AuthMethod>().is_err());
    }

    #[tokio::test]
    async fn test_cached_credential_reuses_fresh_token() {
        let inner = Arc::new(CountingCredential {
            calls: AtomicUsize::new(0),
            lifetime: chrono::Duration::hours(1),
        });
        let cached = CachedCredential::new(inner.clone());

        let a = cached.get_token(ARM_SCOPE).await.unwrap();
        let b = cached.get_token(ARM_SCOPE).await.unwrap();
        assert_eq!(a.token, b.token);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);

        cached.get_token(KEY_VAULT_SCOPE).await.unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cached_credential_refreshes_expiring_token() {
        let inner = Arc::new(CountingCredential {
            calls: AtomicUsize::new(0),
            lifetime: chrono::Duration::seconds(30),
        });
        let cached = CachedCredential::new(inner.clone());

        cached.get_token(ARM_SCOPE).await.unwrap();
        cached.get_token(ARM_SCOPE).await.unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_chain_falls_through_to_next_source() {
        let first: Arc<dyn TokenCredential> = Arc::new(FailingCredential);
        let second: Arc<dyn TokenCredential> = Arc::new(CountingCredential {
            calls: AtomicUsize::new(0),
            lifetime: chrono::Duration::hours(1),
        });
        let chain = ChainedTokenCredential::new(vec![first, second]);
        let token = chain.get_token(ARM_SCOPE).await.unwrap();
        assert_eq!(token.token.expose(), "token-0");
    }

    #[tokio::test]
    async fn test_chain_reports_all_failures() {
        let chain = ChainedTokenCredential::new(vec![Arc::new(FailingCredential)]);
        let err = chain.get_token(ARM_SCOPE).await.unwrap_err();
        assert!(err.to_string().contains("FailingCredential"));
    }

    #[tokio::test]
    async fn test_missing_cli_program() {
        let credential = AzureCliCredential::new().with_program("azvm-no-such-az-binary");
        let err = credential.get_token(ARM_SCOPE).await.unwrap_err();
        assert!(matches!(err, Error::Authentication(_)));
        assert!(err.to_string().contains("not found"));
    }
}
