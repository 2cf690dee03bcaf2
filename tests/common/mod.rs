//! Shared test utilities and fixtures for the azvm test suite.
//!
//! This module provides:
//! - A recording `ResourceManager` that checks dependency ordering
//! - A `SecretStore` mock with configurable failure
//! - An observer and a tracing writer that capture everything emitted
//! - Configuration fixtures
//!
//! # Usage
//!
//! ```rust,ignore
//! mod common;
//! use common::*;
//! ```

#![allow(dead_code)]

use std::collections::HashSet;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use azvm::azure::{
    AccessToken, ArmResource, ArmResourceProperties, NetworkInterface, NetworkSecurityGroup,
    ResourceManager, Subnet, TokenCredential, Vault, VaultReference, VirtualMachine,
    VirtualNetwork,
};
use azvm::config::Config;
use azvm::error::{Error, Result};
use azvm::provisioner::{CreatedResource, ProvisionObserver, ProvisionStep};
use azvm::secrets::{SecretError, SecretMetadata, SecretResult, SecretStore, SensitiveString};

pub const SUBSCRIPTION: &str = "71815b3c-0000-4000-8000-000000000001";
pub const RESOURCE_GROUP: &str = "rg-azvm-demo";
pub const VAULT_NAME: &str = "keyvaultname3221";
pub const REGION: &str = "westeurope";

// ============================================================================
// Fixtures
// ============================================================================

/// A configuration that passes validation, with fast polling.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.azure.subscription_id = Some(SUBSCRIPTION.to_string());
    config.azure.resource_group = Some(RESOURCE_GROUP.to_string());
    config.vault.name = Some(VAULT_NAME.to_string());
    config.http.poll_interval = Duration::from_millis(10);
    config
}

fn arm_id(provider: &str, kind: &str, name: &str) -> String {
    format!(
        "/subscriptions/{}/resourceGroups/{}/providers/{}/{}/{}",
        SUBSCRIPTION, RESOURCE_GROUP, provider, kind, name
    )
}

// ============================================================================
// Credentials
// ============================================================================

/// Credential that always returns the same token.
pub struct StaticCredential {
    pub calls: AtomicUsize,
}

impl StaticCredential {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl TokenCredential for StaticCredential {
    async fn get_token(&self, _scope: &str) -> Result<AccessToken> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(AccessToken::new(
            "test-token",
            chrono::Utc::now() + chrono::Duration::hours(1),
        ))
    }

    fn name(&self) -> &'static str {
        "StaticCredential"
    }
}

// ============================================================================
// Mock ResourceManager
// ============================================================================

/// A call made against [`MockResourceManager`].
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCall {
    GetVault {
        resource_group: String,
        name: String,
    },
    VirtualNetwork {
        name: String,
        location: String,
        address_prefixes: Vec<String>,
    },
    Subnet {
        vnet_name: String,
        name: String,
        address_prefix: String,
    },
    NetworkSecurityGroup {
        name: String,
        location: String,
    },
    NetworkInterface {
        name: String,
        location: String,
        subnet_ids: Vec<String>,
        nsg_id: String,
    },
    VirtualMachine {
        name: String,
        location: String,
        computer_name: String,
        admin_username: String,
        nic_ids: Vec<String>,
    },
}

impl RecordedCall {
    /// The step this call belongs to.
    pub fn step(&self) -> ProvisionStep {
        match self {
            RecordedCall::GetVault { .. } => ProvisionStep::LookupVault,
            RecordedCall::VirtualNetwork { .. } => ProvisionStep::VirtualNetwork,
            RecordedCall::Subnet { .. } => ProvisionStep::Subnet,
            RecordedCall::NetworkSecurityGroup { .. } => ProvisionStep::NetworkSecurityGroup,
            RecordedCall::NetworkInterface { .. } => ProvisionStep::NetworkInterface,
            RecordedCall::VirtualMachine { .. } => ProvisionStep::VirtualMachine,
        }
    }

    /// Region the request targets, if it carries one.
    pub fn location(&self) -> Option<&str> {
        match self {
            RecordedCall::VirtualNetwork { location, .. }
            | RecordedCall::NetworkSecurityGroup { location, .. }
            | RecordedCall::NetworkInterface { location, .. }
            | RecordedCall::VirtualMachine { location, .. } => Some(location),
            _ => None,
        }
    }
}

/// Records every call, returns synthetic ids, and checks that each request
/// only references ids returned by calls that already completed.
pub struct MockResourceManager {
    region: String,
    calls: RwLock<Vec<RecordedCall>>,
    issued_ids: RwLock<HashSet<String>>,
    created_vnets: RwLock<HashSet<String>>,
    violations: RwLock<Vec<String>>,
    fail_at: RwLock<Option<ProvisionStep>>,
    vm_passwords: RwLock<Vec<String>>,
}

impl MockResourceManager {
    pub fn new() -> Self {
        Self::in_region(REGION)
    }

    pub fn in_region(region: &str) -> Self {
        Self {
            region: region.to_string(),
            calls: RwLock::new(Vec::new()),
            issued_ids: RwLock::new(HashSet::new()),
            created_vnets: RwLock::new(HashSet::new()),
            violations: RwLock::new(Vec::new()),
            fail_at: RwLock::new(None),
            vm_passwords: RwLock::new(Vec::new()),
        }
    }

    /// Make the call for `step` fail with a conflict (or 404 for the vault).
    pub fn fail_at(self, step: ProvisionStep) -> Self {
        *self.fail_at.write() = Some(step);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.read().clone()
    }

    pub fn steps(&self) -> Vec<ProvisionStep> {
        self.calls.read().iter().map(RecordedCall::step).collect()
    }

    pub fn violations(&self) -> Vec<String> {
        self.violations.read().clone()
    }

    /// Passwords the VM requests carried, for comparison with the stored secret.
    pub fn vm_passwords(&self) -> Vec<String> {
        self.vm_passwords.read().clone()
    }

    fn check_known(&self, what: &str, id: &str) {
        if !self.issued_ids.read().contains(id) {
            self.violations
                .write()
                .push(format!("{} references unknown id {}", what, id));
        }
    }

    fn respond(&self, step: ProvisionStep, call: RecordedCall, id: String, name: &str) -> Result<ArmResource> {
        self.calls.write().push(call);
        if *self.fail_at.read() == Some(step) {
            return Err(Error::Conflict(format!("{} already exists", name)));
        }
        self.issued_ids.write().insert(id.clone());
        Ok(ArmResource {
            id,
            name: name.to_string(),
            location: Some(self.region.clone()),
            properties: ArmResourceProperties {
                provisioning_state: Some("Succeeded".to_string()),
            },
        })
    }
}

impl Default for MockResourceManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResourceManager for MockResourceManager {
    async fn get_vault(&self, vault: &VaultReference) -> Result<Vault> {
        self.calls.write().push(RecordedCall::GetVault {
            resource_group: vault.resource_group.clone(),
            name: vault.name.clone(),
        });
        if *self.fail_at.read() == Some(ProvisionStep::LookupVault) {
            return Err(Error::NotFound(format!("Key Vault '{}'", vault.name)));
        }
        Ok(Vault {
            id: arm_id("Microsoft.KeyVault", "vaults", &vault.name),
            name: vault.name.clone(),
            location: self.region.clone(),
            vault_uri: format!("https://{}.vault.azure.net/", vault.name),
        })
    }

    async fn create_virtual_network(&self, name: &str, vnet: &VirtualNetwork) -> Result<ArmResource> {
        let result = self.respond(
            ProvisionStep::VirtualNetwork,
            RecordedCall::VirtualNetwork {
                name: name.to_string(),
                location: vnet.location.clone(),
                address_prefixes: vnet.properties.address_space.address_prefixes.clone(),
            },
            arm_id("Microsoft.Network", "virtualNetworks", name),
            name,
        );
        if result.is_ok() {
            self.created_vnets.write().insert(name.to_string());
        }
        result
    }

    async fn create_subnet(&self, vnet_name: &str, name: &str, subnet: &Subnet) -> Result<ArmResource> {
        if !self.created_vnets.read().contains(vnet_name) {
            self.violations
                .write()
                .push(format!("subnet {} created in unknown vnet {}", name, vnet_name));
        }
        self.respond(
            ProvisionStep::Subnet,
            RecordedCall::Subnet {
                vnet_name: vnet_name.to_string(),
                name: name.to_string(),
                address_prefix: subnet.properties.address_prefix.clone(),
            },
            format!(
                "{}/subnets/{}",
                arm_id("Microsoft.Network", "virtualNetworks", vnet_name),
                name
            ),
            name,
        )
    }

    async fn create_network_security_group(
        &self,
        name: &str,
        nsg: &NetworkSecurityGroup,
    ) -> Result<ArmResource> {
        self.respond(
            ProvisionStep::NetworkSecurityGroup,
            RecordedCall::NetworkSecurityGroup {
                name: name.to_string(),
                location: nsg.location.clone(),
            },
            arm_id("Microsoft.Network", "networkSecurityGroups", name),
            name,
        )
    }

    async fn create_network_interface(&self, name: &str, nic: &NetworkInterface) -> Result<ArmResource> {
        let subnet_ids: Vec<String> = nic
            .properties
            .ip_configurations
            .iter()
            .map(|c| c.properties.subnet.id.clone())
            .collect();
        let nsg_id = nic.properties.network_security_group.id.clone();
        for id in &subnet_ids {
            self.check_known("network interface subnet", id);
        }
        self.check_known("network interface nsg", &nsg_id);

        self.respond(
            ProvisionStep::NetworkInterface,
            RecordedCall::NetworkInterface {
                name: name.to_string(),
                location: nic.location.clone(),
                subnet_ids,
                nsg_id,
            },
            arm_id("Microsoft.Network", "networkInterfaces", name),
            name,
        )
    }

    async fn create_virtual_machine(&self, name: &str, vm: &VirtualMachine) -> Result<ArmResource> {
        let nic_ids: Vec<String> = vm.nic_ids().map(String::from).collect();
        for id in &nic_ids {
            self.check_known("virtual machine nic", id);
        }
        self.vm_passwords
            .write()
            .push(vm.properties.os_profile.admin_password.expose().to_string());

        self.respond(
            ProvisionStep::VirtualMachine,
            RecordedCall::VirtualMachine {
                name: name.to_string(),
                location: vm.location.clone(),
                computer_name: vm.properties.os_profile.computer_name.clone(),
                admin_username: vm.properties.os_profile.admin_username.clone(),
                nic_ids,
            },
            arm_id("Microsoft.Compute", "virtualMachines", name),
            name,
        )
    }
}

// ============================================================================
// Mock SecretStore
// ============================================================================

/// A secret written to [`MockSecretStore`].
#[derive(Debug, Clone)]
pub struct StoredSecret {
    pub vault_uri: String,
    pub name: String,
    pub value: String,
}

/// In-memory secret store with optional failure.
pub struct MockSecretStore {
    stored: RwLock<Vec<StoredSecret>>,
    fail_with_status: RwLock<Option<u16>>,
}

impl MockSecretStore {
    pub fn new() -> Self {
        Self {
            stored: RwLock::new(Vec::new()),
            fail_with_status: RwLock::new(None),
        }
    }

    /// Reject every write with this HTTP status.
    pub fn failing(status: u16) -> Self {
        let store = Self::new();
        *store.fail_with_status.write() = Some(status);
        store
    }

    pub fn stored(&self) -> Vec<StoredSecret> {
        self.stored.read().clone()
    }
}

impl Default for MockSecretStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SecretStore for MockSecretStore {
    async fn set_secret(
        &self,
        vault_uri: &str,
        name: &str,
        value: &SensitiveString,
    ) -> SecretResult<SecretMetadata> {
        if let Some(status) = *self.fail_with_status.read() {
            return Err(match status {
                403 => SecretError::Authorization("caller lacks secrets/set".to_string()),
                404 => SecretError::NotFound(vault_uri.to_string()),
                other => SecretError::backend("store unavailable", Some(other)),
            });
        }

        let version = format!("v{}", self.stored.read().len() + 1);
        self.stored.write().push(StoredSecret {
            vault_uri: vault_uri.to_string(),
            name: name.to_string(),
            value: value.expose().to_string(),
        });

        Ok(SecretMetadata {
            name: name.to_string(),
            version: Some(version.clone()),
            id: format!("{}secrets/{}/{}", vault_uri, name, version),
            enabled: Some(true),
            created: None,
            updated: None,
        })
    }

    fn name(&self) -> &str {
        "MockSecretStore"
    }
}

// ============================================================================
// Capture helpers
// ============================================================================

/// Records observer events as text lines.
#[derive(Default)]
pub struct CaptureObserver {
    lines: Mutex<Vec<String>>,
}

impl CaptureObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    fn push(&self, line: String) {
        self.lines.lock().push(line);
    }
}

impl ProvisionObserver for CaptureObserver {
    fn step_started(&self, step: ProvisionStep) {
        self.push(format!("started {}", step));
    }

    fn vault_resolved(&self, vault: &Vault) {
        self.push(format!("vault {:?}", vault));
    }

    fn secret_stored(&self, metadata: &SecretMetadata) {
        self.push(format!(
            "secret {}",
            serde_json::to_string(metadata).unwrap_or_default()
        ));
    }

    fn resource_created(&self, resource: &CreatedResource) {
        self.push(format!("created {:?}", resource));
    }
}

/// Shared in-memory buffer usable as a tracing `MakeWriter`.
#[derive(Clone, Default)]
pub struct SharedBuffer(pub Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl io::Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for SharedBuffer {
    type Writer = SharedBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
