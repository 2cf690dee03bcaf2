//! Configuration module for azvm
//!
//! Handles loading and merging configuration from multiple sources:
//! - Default values
//! - System configuration (/etc/azvm/azvm.toml)
//! - User configuration (~/.azvm.toml, ~/.config/azvm/azvm.toml)
//! - Project configuration (./azvm.toml)
//! - Environment variables
//!
//! Files are merged table by table, so a later file only needs to name the
//! keys it changes.

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::azure::{
    AuthMethod, ImageReference, VaultReference, DEFAULT_AUTHORITY_HOST,
    DEFAULT_MANAGEMENT_ENDPOINT,
};
use crate::error::{Error, Result};
use crate::secrets::PasswordPolicy;

/// Configuration passed to the provisioner.
pub type ProvisionConfig = Config;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Subscription, resource group and authentication
    pub azure: AzureConfig,
    /// Existing Key Vault that receives the password
    pub vault: VaultConfig,
    /// Password generation policy
    pub password: PasswordPolicy,
    /// Network resource names and address space
    pub network: NetworkConfig,
    /// Virtual machine size and image
    pub vm: VmConfig,
    /// HTTP transport settings
    pub http: HttpConfig,
}

/// Azure account settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AzureConfig {
    /// Tenant to authenticate against
    pub tenant_id: Option<String>,
    /// Subscription to create resources in (required)
    pub subscription_id: Option<String>,
    /// Resource group holding the vault and the new resources (required)
    pub resource_group: Option<String>,
    /// Resource Manager endpoint
    pub management_endpoint: String,
    /// Microsoft Entra authority
    pub authority_host: String,
    /// Credential source
    pub auth: AuthMethod,
}

impl Default for AzureConfig {
    fn default() -> Self {
        Self {
            tenant_id: None,
            subscription_id: None,
            resource_group: None,
            management_endpoint: DEFAULT_MANAGEMENT_ENDPOINT.to_string(),
            authority_host: DEFAULT_AUTHORITY_HOST.to_string(),
            auth: AuthMethod::default(),
        }
    }
}

/// Key Vault settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Vault name (required)
    pub name: Option<String>,
    /// Secret the password is written to
    pub secret_name: String,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            name: None,
            secret_name: "vm-passwords".to_string(),
        }
    }
}

/// Network resource settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Virtual network name
    pub vnet_name: String,
    /// Virtual network address space
    pub address_prefix: String,
    /// Subnet name
    pub subnet_name: String,
    /// Subnet address prefix
    pub subnet_prefix: String,
    /// Network security group name
    pub nsg_name: String,
    /// Network interface name
    pub nic_name: String,
    /// NIC IP configuration name
    pub ip_configuration_name: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            vnet_name: "MyVNet".to_string(),
            address_prefix: "10.0.0.0/16".to_string(),
            subnet_name: "MySubnet".to_string(),
            subnet_prefix: "10.0.0.0/24".to_string(),
            nsg_name: "MyNSG".to_string(),
            nic_name: "MyNIC".to_string(),
            ip_configuration_name: "ipconfig1".to_string(),
        }
    }
}

/// Virtual machine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    /// VM size
    pub size: String,
    /// Marketplace image
    pub image: ImageReference,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            size: "Standard_DS2_v2".to_string(),
            image: ImageReference::default(),
        }
    }
}

/// HTTP transport settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Per-request timeout
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Delay between long-running operation polls when the service gives none
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_secs(5),
        }
    }
}

impl Config {
    /// Load configuration from all sources
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut merged = toml::Table::new();

        for path in Self::get_config_paths(config_path) {
            if path.exists() {
                tracing::debug!(path = %path.display(), "Loading config file");
                merge_tables(&mut merged, Self::read_table(&path)?);
            } else if config_path.is_some() {
                return Err(Error::ConfigFile {
                    path,
                    message: "file does not exist".to_string(),
                });
            }
        }

        let mut config: Config = toml::Value::Table(merged)
            .try_into()
            .map_err(|e: toml::de::Error| Error::Config(e.to_string()))?;

        // Apply environment variable overrides
        config.apply_env_overrides()?;

        Ok(config)
    }

    /// Load a single file over the defaults, without environment overrides.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        toml::Value::Table(Self::read_table(path)?)
            .try_into()
            .map_err(|e: toml::de::Error| Error::ConfigFile {
                path: path.to_path_buf(),
                message: e.to_string(),
            })
    }

    /// Get the list of configuration file paths to check
    pub fn get_config_paths(explicit_path: Option<&Path>) -> Vec<PathBuf> {
        // Explicit path replaces the search
        if let Some(path) = explicit_path {
            return vec![path.to_path_buf()];
        }

        let mut paths = vec![PathBuf::from("/etc/azvm/azvm.toml")];

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".azvm.toml"));
            paths.push(home.join(".config").join("azvm").join("azvm.toml"));
        }

        paths.push(PathBuf::from("azvm.toml"));
        paths
    }

    fn read_table(path: &Path) -> Result<toml::Table> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::ConfigFile {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        content
            .parse::<toml::Table>()
            .map_err(|e| Error::ConfigFile {
                path: path.to_path_buf(),
                message: e.to_string(),
            })
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup` (environment variable name to value).
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(tenant) = lookup("AZURE_TENANT_ID") {
            self.azure.tenant_id = Some(tenant);
        }
        if let Some(subscription) = lookup("AZURE_SUBSCRIPTION_ID") {
            self.azure.subscription_id = Some(subscription);
        }
        if let Some(group) = lookup("AZVM_RESOURCE_GROUP") {
            self.azure.resource_group = Some(group);
        }
        if let Some(vault) = lookup("AZVM_VAULT_NAME") {
            self.vault.name = Some(vault);
        }
        if let Some(secret) = lookup("AZVM_SECRET_NAME") {
            self.vault.secret_name = secret;
        }
        if let Some(size) = lookup("AZVM_VM_SIZE") {
            self.vm.size = size;
        }
        if let Some(auth) = lookup("AZVM_AUTH") {
            self.azure.auth = auth
                .parse()
                .map_err(|e: String| Error::invalid_config("AZVM_AUTH", e))?;
        }
        Ok(())
    }

    /// Check required fields, the password policy and the address space.
    pub fn validate(&self) -> Result<()> {
        self.subscription_id()?;
        self.resource_group()?;
        self.vault_name()?;

        if self.vault.secret_name.trim().is_empty() {
            return Err(Error::invalid_config("vault.secret_name", "must not be empty"));
        }

        self.password
            .validate()
            .map_err(|e| Error::invalid_config("password", e.to_string()))?;

        let vnet = parse_cidr(&self.network.address_prefix).ok_or_else(|| {
            Error::invalid_config(
                "network.address_prefix",
                format!("'{}' is not an IPv4 CIDR", self.network.address_prefix),
            )
        })?;
        let subnet = parse_cidr(&self.network.subnet_prefix).ok_or_else(|| {
            Error::invalid_config(
                "network.subnet_prefix",
                format!("'{}' is not an IPv4 CIDR", self.network.subnet_prefix),
            )
        })?;
        if !vnet.contains(&subnet) {
            return Err(Error::invalid_config(
                "network.subnet_prefix",
                format!(
                    "{} is not inside the virtual network address space {}",
                    self.network.subnet_prefix, self.network.address_prefix
                ),
            ));
        }

        for (key, value) in [
            ("network.vnet_name", &self.network.vnet_name),
            ("network.subnet_name", &self.network.subnet_name),
            ("network.nsg_name", &self.network.nsg_name),
            ("network.nic_name", &self.network.nic_name),
            ("network.ip_configuration_name", &self.network.ip_configuration_name),
            ("vm.size", &self.vm.size),
        ] {
            if value.trim().is_empty() {
                return Err(Error::invalid_config(key, "must not be empty"));
            }
        }

        self.management_endpoint()?;
        self.authority_host()?;

        if self.http.poll_interval.is_zero() {
            tracing::warn!("http.poll_interval is zero; polling without delay");
        }

        Ok(())
    }

    /// The configured subscription.
    pub fn subscription_id(&self) -> Result<&str> {
        required(&self.azure.subscription_id, "azure.subscription_id")
    }

    /// The configured resource group.
    pub fn resource_group(&self) -> Result<&str> {
        required(&self.azure.resource_group, "azure.resource_group")
    }

    /// The configured vault name.
    pub fn vault_name(&self) -> Result<&str> {
        required(&self.vault.name, "vault.name")
    }

    /// The vault to look up.
    pub fn vault_reference(&self) -> Result<VaultReference> {
        Ok(VaultReference::new(self.resource_group()?, self.vault_name()?))
    }

    /// Parsed Resource Manager endpoint.
    pub fn management_endpoint(&self) -> Result<Url> {
        Url::parse(&self.azure.management_endpoint).map_err(|e| {
            Error::invalid_config("azure.management_endpoint", e.to_string())
        })
    }

    /// Parsed authority host, with a trailing slash so paths join beneath it.
    pub fn authority_host(&self) -> Result<Url> {
        let mut host = self.azure.authority_host.clone();
        if !host.ends_with('/') {
            host.push('/');
        }
        Url::parse(&host)
            .map_err(|e| Error::invalid_config("azure.authority_host", e.to_string()))
    }
}

fn required<'a>(value: &'a Option<String>, key: &str) -> Result<&'a str> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(Error::invalid_config(key, "is required")),
    }
}

/// Merge `overlay` into `base`; nested tables merge, everything else replaces.
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        let toml::Value::Table(incoming) = value else {
            base.insert(key, value);
            continue;
        };
        if let Some(toml::Value::Table(existing)) = base.get_mut(&key) {
            merge_tables(existing, incoming);
            continue;
        }
        base.insert(key, toml::Value::Table(incoming));
    }
}

/// An IPv4 network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Cidr {
    network: u32,
    prefix: u8,
}

impl Ipv4Cidr {
    fn mask(prefix: u8) -> u32 {
        if prefix == 0 {
            0
        } else {
            u32::MAX << (32 - u32::from(prefix))
        }
    }

    /// True if `other` lies entirely within this network.
    pub fn contains(&self, other: &Ipv4Cidr) -> bool {
        other.prefix >= self.prefix
            && (other.network & Self::mask(self.prefix)) == (self.network & Self::mask(self.prefix))
    }
}

/// Parse `a.b.c.d/n`.
pub fn parse_cidr(value: &str) -> Option<Ipv4Cidr> {
    let (addr, prefix) = value.trim().split_once('/')?;
    let addr: Ipv4Addr = addr.parse().ok()?;
    let prefix: u8 = prefix.parse().ok()?;
    if prefix > 32 {
        return None;
    }
    Some(Ipv4Cidr {
        network: u32::from(addr) & Ipv4Cidr::mask(prefix),
        prefix,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::HashMap;
    use std::io::Write;

    fn complete() -> Config {
        let mut config = Config::default();
        config.azure.subscription_id = Some("71815b3c-0000-0000-0000-000000000000".to_string());
        config.azure.resource_group = Some("rg-azvm-demo".to_string());
        config.vault.name = Some("keyvaultname3221".to_string());
        config
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.vault.secret_name, "vm-passwords");
        assert_eq!(config.password.length, 16);
        assert_eq!(config.network.vnet_name, "MyVNet");
        assert_eq!(config.network.address_prefix, "10.0.0.0/16");
        assert_eq!(config.network.subnet_prefix, "10.0.0.0/24");
        assert_eq!(config.network.ip_configuration_name, "ipconfig1");
        assert_eq!(config.vm.size, "Standard_DS2_v2");
        assert_eq!(config.vm.image.publisher, "MicrosoftWindowsServer");
        assert_eq!(config.azure.auth, AuthMethod::Cli);
        assert_eq!(config.http.poll_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_defaults_require_account_fields() {
        let err = Config::default().validate().unwrap_err();
        assert!(err.to_string().contains("azure.subscription_id"));
        assert_eq!(err.exit_code(), 2);
        assert!(complete().validate().is_ok());
    }

    #[test]
    fn test_subnet_outside_vnet_rejected() {
        let mut config = complete();
        config.network.subnet_prefix = "10.1.0.0/24".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("network.subnet_prefix"));
    }

    #[test]
    fn test_bad_cidr_rejected() {
        let mut config = complete();
        config.network.address_prefix = "10.0.0.0".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_alphabet_rejected() {
        let mut config = complete();
        config.password.alphabet = String::new();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("password"));
    }

    #[test]
    fn test_parse_cidr() {
        let vnet = parse_cidr("10.0.0.0/16").unwrap();
        assert!(vnet.contains(&parse_cidr("10.0.0.0/24").unwrap()));
        assert!(vnet.contains(&parse_cidr("10.0.255.0/24").unwrap()));
        assert!(!vnet.contains(&parse_cidr("10.1.0.0/24").unwrap()));
        assert!(!vnet.contains(&parse_cidr("10.0.0.0/8").unwrap()));
        assert!(parse_cidr("0.0.0.0/0").unwrap().contains(&vnet));
        assert!(parse_cidr("10.0.0.0/33").is_none());
        assert!(parse_cidr("10.0.0/16").is_none());
    }

    #[test]
    fn test_merge_tables_is_deep() {
        let mut base: toml::Table = r#"
            [network]
            vnet_name = "A"
            nic_name = "N"
        "#
        .parse()
        .unwrap();
        let overlay: toml::Table = r#"
            [network]
            vnet_name = "B"
        "#
        .parse()
        .unwrap();

        merge_tables(&mut base, overlay);
        let network = base["network"].as_table().unwrap();
        assert_eq!(network["vnet_name"].as_str(), Some("B"));
        assert_eq!(network["nic_name"].as_str(), Some("N"));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[azure]
subscription_id = "sub"
resource_group = "rg"
auth = "client_secret"

[vault]
name = "kv"

[http]
poll_interval = "250ms"
"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.azure.auth, AuthMethod::ClientSecret);
        assert_eq!(config.http.poll_interval, Duration::from_millis(250));
        assert_eq!(config.http.request_timeout, Duration::from_secs(60));
        assert_eq!(config.network.nsg_name, "MyNSG");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_file_reports_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[azure\nbroken").unwrap();
        match Config::from_file(file.path()).unwrap_err() {
            Error::ConfigFile { path, .. } => assert_eq!(path, file.path()),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_overrides_from_lookup() {
        let env: HashMap<&str, &str> = [
            ("AZURE_SUBSCRIPTION_ID", "sub-env"),
            ("AZVM_RESOURCE_GROUP", "rg-env"),
            ("AZVM_VAULT_NAME", "kv-env"),
            ("AZVM_SECRET_NAME", "admin-password"),
            ("AZVM_VM_SIZE", "Standard_B2s"),
            ("AZVM_AUTH", "auto"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_overrides_from(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.subscription_id().unwrap(), "sub-env");
        assert_eq!(config.resource_group().unwrap(), "rg-env");
        assert_eq!(config.vault_name().unwrap(), "kv-env");
        assert_eq!(config.vault.secret_name, "admin-password");
        assert_eq!(config.vm.size, "Standard_B2s");
        assert_eq!(config.azure.auth, AuthMethod::Auto);
    }

    #[test]
    fn test_invalid_auth_override() {
        let mut config = Config::default();
        let err = config
            .apply_overrides_from(|k| (k == "AZVM_AUTH").then(|| "kerberos".to_string()))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));
    }

    #[test]
    #[serial]
    fn test_env_override() {
        std::env::set_var("AZVM_VM_SIZE", "Standard_D4s_v5");
        let mut config = Config::default();
        config.apply_env_overrides().unwrap();
        assert_eq!(config.vm.size, "Standard_D4s_v5");
        std::env::remove_var("AZVM_VM_SIZE");
    }

    #[test]
    #[serial]
    fn test_load_explicit_path_missing() {
        let err = Config::load(Some(Path::new("/nonexistent/azvm.toml"))).unwrap_err();
        assert!(matches!(err, Error::ConfigFile { .. }));
    }

    #[test]
    fn test_authority_host_gets_trailing_slash() {
        let mut config = complete();
        config.azure.authority_host = "https://login.microsoftonline.us".to_string();
        assert_eq!(
            config.authority_host().unwrap().as_str(),
            "https://login.microsoftonline.us/"
        );
    }
}
