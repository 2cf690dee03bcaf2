//! # azvm - Single-VM Azure Provisioner
//!
//! azvm provisions one virtual machine and its minimal network in an Azure
//! subscription. The administrator password is generated from the operating
//! system CSPRNG and written to an existing Key Vault before any resource is
//! created; it never appears in logs, console output or reports.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                           CLI Interface                              │
//! │               (clap flags, dialoguer fallback prompts)               │
//! └─────────────────────────────────────────────────────────────────────┘
//!                                    │
//!                                    ▼
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                            Provisioner                               │
//! │     vault ─► password ─► vnet ─► subnet ─► nsg ─► nic ─► vm          │
//! └─────────────────────────────────────────────────────────────────────┘
//!          │                         │                         │
//!          ▼                         ▼                         ▼
//! ┌─────────────────┐   ┌─────────────────────┐   ┌─────────────────────┐
//! │ ResourceManager │   │    SecretStore      │   │   NoLogRegistry     │
//! │ (ARM REST, LRO) │   │   (Key Vault)       │   │   (redaction)       │
//! └─────────────────┘   └─────────────────────┘   └─────────────────────┘
//!          │                         │
//!          └────────────┬────────────┘
//!                       ▼
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                 TokenCredential (Azure CLI / SP)                     │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use azvm::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::load(None)?;
//!     let registry = Arc::new(NoLogRegistry::new());
//!     let http = reqwest::Client::new();
//!     let credential = credential_for(
//!         config.azure.auth,
//!         http.clone(),
//!         config.authority_host()?,
//!         config.azure.tenant_id.as_deref(),
//!     )?;
//!
//!     let arm = ArmClient::new(
//!         http.clone(),
//!         config.management_endpoint()?,
//!         credential.clone(),
//!         config.http.poll_interval,
//!     );
//!     let resources = ArmResourceManager::new(
//!         arm,
//!         config.subscription_id()?,
//!         config.resource_group()?,
//!     );
//!     let secrets = KeyVaultSecretStore::new(http, credential);
//!
//!     let provisioner =
//!         Provisioner::new(config, Arc::new(resources), Arc::new(secrets), registry)?;
//!     let report = provisioner.run(&VmRequest::new("web01", "azureuser")).await?;
//!     println!("{}", report.vm.id);
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

// Re-export commonly used items in prelude
pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.

    pub use crate::azure::{
        credential_for, ArmClient, ArmResourceManager, ResourceManager, TokenCredential,
    };
    pub use crate::config::{Config, ProvisionConfig};
    pub use crate::error::{Error, Result};
    pub use crate::provisioner::{
        ProvisionObserver, ProvisionReport, ProvisionStep, Provisioner, VmRequest,
    };
    pub use crate::secrets::{
        KeyVaultSecretStore, NoLogRegistry, PasswordGenerator, SecretStore, SensitiveString,
    };
}

// ============================================================================
// Core
// ============================================================================

/// Error types and operator hints.
pub mod error;

/// Configuration loading, environment overrides and validation.
pub mod config;

// ============================================================================
// Collaborators
// ============================================================================

/// Identity, Resource Manager client and resource operations.
pub mod azure;

/// Password generation, Key Vault storage and no-log enforcement.
pub mod secrets;

// ============================================================================
// Orchestration
// ============================================================================

/// The ordered provisioning sequence.
pub mod provisioner;

pub use azure::Vault;
pub use error::{Error, Result};

// ============================================================================
// Version Information
// ============================================================================

/// Returns the current version of azvm.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
