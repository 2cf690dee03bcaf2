//! Provisioning steps and the run report.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::secrets::SecretMetadata;

/// One step of the provisioning sequence, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionStep {
    /// Resolve the Key Vault and its region
    LookupVault,
    /// Generate the password and write it to the vault
    StorePassword,
    /// Create the virtual network
    VirtualNetwork,
    /// Create the subnet
    Subnet,
    /// Create the network security group
    NetworkSecurityGroup,
    /// Create the network interface
    NetworkInterface,
    /// Create the virtual machine
    VirtualMachine,
}

impl ProvisionStep {
    /// Every step, in execution order.
    pub const ALL: [ProvisionStep; 7] = [
        ProvisionStep::LookupVault,
        ProvisionStep::StorePassword,
        ProvisionStep::VirtualNetwork,
        ProvisionStep::Subnet,
        ProvisionStep::NetworkSecurityGroup,
        ProvisionStep::NetworkInterface,
        ProvisionStep::VirtualMachine,
    ];

    /// True for steps that create an Azure resource.
    pub fn creates_resource(&self) -> bool {
        !matches!(self, ProvisionStep::LookupVault | ProvisionStep::StorePassword)
    }
}

impl fmt::Display for ProvisionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ProvisionStep::LookupVault => "key vault lookup",
            ProvisionStep::StorePassword => "password storage",
            ProvisionStep::VirtualNetwork => "virtual network",
            ProvisionStep::Subnet => "subnet",
            ProvisionStep::NetworkSecurityGroup => "network security group",
            ProvisionStep::NetworkInterface => "network interface",
            ProvisionStep::VirtualMachine => "virtual machine",
        };
        f.write_str(label)
    }
}

/// A resource that reached a terminal success state during the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedResource {
    /// Step that created it
    pub step: ProvisionStep,
    /// Resource name
    pub name: String,
    /// ARM resource id
    pub id: String,
}

/// Summary of the created virtual machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmSummary {
    /// VM name
    pub name: String,
    /// ARM resource id
    pub id: String,
    /// Final provisioning state reported by Compute
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provisioning_state: Option<String>,
}

/// Outcome of a successful run. Contains no secret values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionReport {
    /// Region every resource was created in
    pub region: String,
    /// Vault the password was stored in
    pub vault_name: String,
    /// Metadata of the stored password
    pub secret: SecretMetadata,
    /// Created resources, in creation order
    pub resources: Vec<CreatedResource>,
    /// The virtual machine
    pub vm: VmSummary,
}
