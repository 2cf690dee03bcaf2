//! Resource management operations the provisioner depends on.

use async_trait::async_trait;
use tracing::{debug, info};

use super::client::ArmClient;
use super::models::{
    ArmResource, NetworkInterface, NetworkSecurityGroup, Subnet, Vault, VaultReference,
    VirtualMachine, VirtualNetwork,
};
use crate::error::{Error, Result};

/// Key Vault management API version.
pub const KEY_VAULT_MGMT_API_VERSION: &str = "2023-07-01";
/// Network resource provider API version.
pub const NETWORK_API_VERSION: &str = "2023-09-01";
/// Compute resource provider API version.
pub const COMPUTE_API_VERSION: &str = "2024-03-01";

/// Management operations for one subscription and resource group.
///
/// Every `create_*` call returns only after the resource reached a terminal
/// success state.
#[async_trait]
pub trait ResourceManager: Send + Sync {
    /// Look up an existing Key Vault.
    async fn get_vault(&self, vault: &VaultReference) -> Result<Vault>;

    /// Create or update a virtual network.
    async fn create_virtual_network(&self, name: &str, vnet: &VirtualNetwork)
        -> Result<ArmResource>;

    /// Create or update a subnet inside `vnet_name`.
    async fn create_subnet(
        &self,
        vnet_name: &str,
        name: &str,
        subnet: &Subnet,
    ) -> Result<ArmResource>;

    /// Create or update a network security group.
    async fn create_network_security_group(
        &self,
        name: &str,
        nsg: &NetworkSecurityGroup,
    ) -> Result<ArmResource>;

    /// Create or update a network interface.
    async fn create_network_interface(
        &self,
        name: &str,
        nic: &NetworkInterface,
    ) -> Result<ArmResource>;

    /// Create or update a virtual machine.
    async fn create_virtual_machine(&self, name: &str, vm: &VirtualMachine)
        -> Result<ArmResource>;
}

/// [`ResourceManager`] backed by the ARM REST API.
#[derive(Debug, Clone)]
pub struct ArmResourceManager {
    client: ArmClient,
    subscription_id: String,
    resource_group: String,
}

impl ArmResourceManager {
    /// Manage resources in `resource_group` of `subscription_id`.
    pub fn new(
        client: ArmClient,
        subscription_id: impl Into<String>,
        resource_group: impl Into<String>,
    ) -> Self {
        Self {
            client,
            subscription_id: subscription_id.into(),
            resource_group: resource_group.into(),
        }
    }

    fn resource_group_path(&self, resource_group: &str) -> String {
        format!(
            "/subscriptions/{}/resourceGroups/{}",
            self.subscription_id, resource_group
        )
    }

    fn network_path(&self, kind: &str, name: &str) -> String {
        format!(
            "{}/providers/Microsoft.Network/{}/{}",
            self.resource_group_path(&self.resource_group),
            kind,
            name
        )
    }

    async fn put_network<B>(&self, path: String, body: &B, name: &str) -> Result<ArmResource>
    where
        B: serde::Serialize + Sync,
    {
        let url = self.client.resource_url(&path, NETWORK_API_VERSION)?;
        self.client.put_and_wait(url, body, name).await
    }
}

#[async_trait]
impl ResourceManager for ArmResourceManager {
    async fn get_vault(&self, vault: &VaultReference) -> Result<Vault> {
        let path = format!(
            "{}/providers/Microsoft.KeyVault/vaults/{}",
            self.resource_group_path(&vault.resource_group),
            vault.name
        );
        let url = self.client.resource_url(&path, KEY_VAULT_MGMT_API_VERSION)?;
        debug!(vault = %vault.name, resource_group = %vault.resource_group, "Looking up Key Vault");

        self.client.get_json(url).await.map_err(|e| match e {
            Error::NotFound(_) => Error::NotFound(format!(
                "Key Vault '{}' in resource group '{}'",
                vault.name, vault.resource_group
            )),
            other => other,
        })
    }

    async fn create_virtual_network(
        &self,
        name: &str,
        vnet: &VirtualNetwork,
    ) -> Result<ArmResource> {
        info!(resource = %name, location = %vnet.location, "Creating virtual network");
        self.put_network(self.network_path("virtualNetworks", name), vnet, name)
            .await
    }

    async fn create_subnet(
        &self,
        vnet_name: &str,
        name: &str,
        subnet: &Subnet,
    ) -> Result<ArmResource> {
        info!(resource = %name, vnet = %vnet_name, "Creating subnet");
        let path = format!(
            "{}/subnets/{}",
            self.network_path("virtualNetworks", vnet_name),
            name
        );
        self.put_network(path, subnet, name).await
    }

    async fn create_network_security_group(
        &self,
        name: &str,
        nsg: &NetworkSecurityGroup,
    ) -> Result<ArmResource> {
        info!(resource = %name, location = %nsg.location, "Creating network security group");
        self.put_network(self.network_path("networkSecurityGroups", name), nsg, name)
            .await
    }

    async fn create_network_interface(
        &self,
        name: &str,
        nic: &NetworkInterface,
    ) -> Result<ArmResource> {
        info!(resource = %name, location = %nic.location, "Creating network interface");
        self.put_network(self.network_path("networkInterfaces", name), nic, name)
            .await
    }

    async fn create_virtual_machine(
        &self,
        name: &str,
        vm: &VirtualMachine,
    ) -> Result<ArmResource> {
        info!(
            resource = %name,
            location = %vm.location,
            size = %vm.properties.hardware_profile.vm_size,
            "Creating virtual machine"
        );
        let path = format!(
            "{}/providers/Microsoft.Compute/virtualMachines/{}",
            self.resource_group_path(&self.resource_group),
            name
        );
        let url = self.client.resource_url(&path, COMPUTE_API_VERSION)?;
        self.client.put_and_wait(url, vm, name).await
    }
}
