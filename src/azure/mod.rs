//! Azure collaborators: identity, Resource Manager client and resource
//! operations.
//!
//! ## Layout
//!
//! - [`credential`]: bearer tokens from the Azure CLI or a service principal
//! - [`client`]: authenticated ARM REST calls and error mapping
//! - [`lro`]: long-running operation polling
//! - [`models`]: request and response payloads
//! - [`resources`]: the [`ResourceManager`] seam and its ARM implementation

pub mod client;
pub mod credential;
pub mod lro;
pub mod models;
pub mod resources;

pub use client::{ArmClient, DEFAULT_MANAGEMENT_ENDPOINT};
pub use credential::{
    credential_for, AccessToken, AuthMethod, AzureCliCredential, CachedCredential,
    ChainedTokenCredential, ClientSecretCredential, TokenCredential, ARM_SCOPE,
    DEFAULT_AUTHORITY_HOST, KEY_VAULT_SCOPE,
};
pub use lro::LongRunningOperation;
pub use models::{
    ArmResource, ArmResourceProperties, ImageReference, NetworkInterface, NetworkSecurityGroup,
    Subnet, Vault, VaultReference, VirtualMachine, VirtualMachineSpec, VirtualNetwork,
};
pub use resources::{ArmResourceManager, ResourceManager};
