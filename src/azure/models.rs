//! Azure Resource Manager request and response payloads.
//!
//! Requests follow the ARM wire shape (`location` plus a camelCase
//! `properties` object). Only the fields the provisioner sets are modelled.

use serde::{Deserialize, Serialize};

use crate::secrets::{serialize_exposed, SensitiveString};

// ============================================================================
// Key Vault (management plane)
// ============================================================================

/// A Key Vault identified by name within a resource group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultReference {
    /// Owning resource group
    pub resource_group: String,
    /// Vault name
    pub name: String,
}

impl VaultReference {
    /// Create a reference.
    pub fn new(resource_group: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            resource_group: resource_group.into(),
            name: name.into(),
        }
    }
}

/// A resolved Key Vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Vault {
    /// ARM resource id
    pub id: String,
    /// Vault name
    pub name: String,
    /// Region every other resource is created in
    pub location: String,
    /// Data-plane URI, always ending in `/`
    pub vault_uri: String,
}

#[derive(Deserialize)]
struct VaultResource {
    id: String,
    name: String,
    location: String,
    #[serde(default)]
    properties: VaultResourceProperties,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VaultResourceProperties {
    #[serde(default)]
    vault_uri: Option<String>,
}

impl<'de> Deserialize<'de> for Vault {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = VaultResource::deserialize(deserializer)?;
        // Older vaults may omit vaultUri; the public cloud form is predictable.
        let mut vault_uri = raw
            .properties
            .vault_uri
            .unwrap_or_else(|| format!("https://{}.vault.azure.net/", raw.name));
        if !vault_uri.ends_with('/') {
            vault_uri.push('/');
        }
        Ok(Vault {
            id: raw.id,
            name: raw.name,
            location: raw.location,
            vault_uri,
        })
    }
}

// ============================================================================
// Generic resource response
// ============================================================================

/// The parts of any ARM resource response the provisioner reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArmResource {
    /// ARM resource id
    pub id: String,
    /// Resource name
    pub name: String,
    /// Region (absent for child resources such as subnets)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Resource properties
    #[serde(default)]
    pub properties: ArmResourceProperties,
}

/// Resource properties common to every provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArmResourceProperties {
    /// `Succeeded`, `Failed`, `Canceled` or an in-flight state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioning_state: Option<String>,
}

impl ArmResource {
    /// The provisioning state, if the provider reports one.
    pub fn provisioning_state(&self) -> Option<&str> {
        self.properties.provisioning_state.as_deref()
    }
}

/// Reference to another resource by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubResource {
    /// ARM resource id
    pub id: String,
}

impl SubResource {
    /// Reference `id`.
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

// ============================================================================
// Network
// ============================================================================

/// Virtual network create request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VirtualNetwork {
    /// Region
    pub location: String,
    /// Properties
    pub properties: VirtualNetworkProperties,
}

/// Virtual network properties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualNetworkProperties {
    /// Address space
    pub address_space: AddressSpace,
}

/// A set of CIDR prefixes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressSpace {
    /// CIDR prefixes
    pub address_prefixes: Vec<String>,
}

impl VirtualNetwork {
    /// A virtual network with a single address prefix.
    pub fn new(location: impl Into<String>, address_prefix: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            properties: VirtualNetworkProperties {
                address_space: AddressSpace {
                    address_prefixes: vec![address_prefix.into()],
                },
            },
        }
    }
}

/// Subnet create request. Subnets inherit the region of their network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subnet {
    /// Properties
    pub properties: SubnetProperties,
}

/// Subnet properties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubnetProperties {
    /// CIDR prefix
    pub address_prefix: String,
}

impl Subnet {
    /// A subnet covering `address_prefix`.
    pub fn new(address_prefix: impl Into<String>) -> Self {
        Self {
            properties: SubnetProperties {
                address_prefix: address_prefix.into(),
            },
        }
    }
}

/// Network security group create request. Created with the default rules only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkSecurityGroup {
    /// Region
    pub location: String,
}

impl NetworkSecurityGroup {
    /// An empty security group.
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
        }
    }
}

/// Network interface create request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkInterface {
    /// Region
    pub location: String,
    /// Properties
    pub properties: NetworkInterfaceProperties,
}

/// Network interface properties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInterfaceProperties {
    /// IP configurations
    pub ip_configurations: Vec<IpConfiguration>,
    /// Attached security group
    pub network_security_group: SubResource,
}

/// A NIC IP configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IpConfiguration {
    /// Configuration name
    pub name: String,
    /// Properties
    pub properties: IpConfigurationProperties,
}

/// IP configuration properties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IpConfigurationProperties {
    /// Subnet the address is allocated from
    pub subnet: SubResource,
    /// `Dynamic` or `Static`
    #[serde(rename = "privateIPAllocationMethod")]
    pub private_ip_allocation_method: String,
}

impl NetworkInterface {
    /// A NIC with one dynamic IP configuration in `subnet_id`, guarded by `nsg_id`.
    pub fn new(
        location: impl Into<String>,
        ip_configuration_name: impl Into<String>,
        subnet_id: impl Into<String>,
        nsg_id: impl Into<String>,
    ) -> Self {
        Self {
            location: location.into(),
            properties: NetworkInterfaceProperties {
                ip_configurations: vec![IpConfiguration {
                    name: ip_configuration_name.into(),
                    properties: IpConfigurationProperties {
                        subnet: SubResource::new(subnet_id),
                        private_ip_allocation_method: "Dynamic".to_string(),
                    },
                }],
                network_security_group: SubResource::new(nsg_id),
            },
        }
    }
}

// ============================================================================
// Compute
// ============================================================================

/// Marketplace image reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageReference {
    /// Image publisher (e.g., "MicrosoftWindowsServer")
    pub publisher: String,
    /// Image offer (e.g., "WindowsServer")
    pub offer: String,
    /// Image SKU (e.g., "2019-datacenter")
    pub sku: String,
    /// Image version (e.g., "latest")
    pub version: String,
}

impl Default for ImageReference {
    fn default() -> Self {
        Self {
            publisher: "MicrosoftWindowsServer".to_string(),
            offer: "WindowsServer".to_string(),
            sku: "2019-datacenter".to_string(),
            version: "latest".to_string(),
        }
    }
}

impl ImageReference {
    /// True for Windows images, whose computer names follow NetBIOS rules.
    pub fn is_windows(&self) -> bool {
        self.publisher
            .to_ascii_lowercase()
            .starts_with("microsoftwindows")
            || self.offer.to_ascii_lowercase().contains("windows")
    }
}

/// Virtual machine create request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VirtualMachine {
    /// Region
    pub location: String,
    /// Properties
    pub properties: VirtualMachineProperties,
}

/// Virtual machine properties.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineProperties {
    /// Size
    pub hardware_profile: HardwareProfile,
    /// Image
    pub storage_profile: StorageProfile,
    /// Computer name and administrator account
    pub os_profile: OsProfile,
    /// Attached NICs
    pub network_profile: NetworkProfile,
}

/// VM hardware profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HardwareProfile {
    /// VM size (e.g., "Standard_DS2_v2")
    pub vm_size: String,
}

/// VM storage profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageProfile {
    /// Source image
    pub image_reference: ImageReference,
}

/// VM OS profile.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OsProfile {
    /// Host name inside the guest
    pub computer_name: String,
    /// Administrator account
    pub admin_username: String,
    /// Administrator password, sent in plaintext on the wire only
    #[serde(serialize_with = "serialize_exposed")]
    pub admin_password: SensitiveString,
}

/// VM network profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkProfile {
    /// NIC references
    pub network_interfaces: Vec<SubResource>,
}

/// Inputs for [`VirtualMachine::new`].
#[derive(Debug, Clone)]
pub struct VirtualMachineSpec<'a> {
    /// Region
    pub location: &'a str,
    /// VM and computer name
    pub vm_name: &'a str,
    /// VM size
    pub vm_size: &'a str,
    /// Source image
    pub image: &'a ImageReference,
    /// Administrator account
    pub admin_username: &'a str,
    /// Administrator password
    pub admin_password: &'a SensitiveString,
    /// NIC to attach
    pub nic_id: &'a str,
}

impl VirtualMachine {
    /// Build a VM request from its inputs.
    pub fn new(spec: VirtualMachineSpec<'_>) -> Self {
        Self {
            location: spec.location.to_string(),
            properties: VirtualMachineProperties {
                hardware_profile: HardwareProfile {
                    vm_size: spec.vm_size.to_string(),
                },
                storage_profile: StorageProfile {
                    image_reference: spec.image.clone(),
                },
                os_profile: OsProfile {
                    computer_name: spec.vm_name.to_string(),
                    admin_username: spec.admin_username.to_string(),
                    admin_password: spec.admin_password.clone(),
                },
                network_profile: NetworkProfile {
                    network_interfaces: vec![SubResource::new(spec.nic_id)],
                },
            },
        }
    }

    /// The NIC ids this request references.
    pub fn nic_ids(&self) -> impl Iterator<Item = &str> {
        self.properties
            .network_profile
            .network_interfaces
            .iter()
            .map(|nic| nic.id.as_str())
    }
}
