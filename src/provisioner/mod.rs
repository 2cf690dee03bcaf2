//! The provisioning sequence.
//!
//! ```text
//! get_vault ──► generate + set_secret ──► vnet ──► subnet ──► nsg ──► nic ──► vm
//!   (region)        (abort on failure)                 └──────┴──► ids
//! ```
//!
//! Every step is awaited to a terminal state before the next one starts.
//! The first failure ends the run; nothing is retried or rolled back, and the
//! error lists the resources already created.

mod report;
mod request;

pub use report::{CreatedResource, ProvisionReport, ProvisionStep, VmSummary};
pub use request::{
    validate_admin_password, validate_admin_username, validate_computer_name, validate_vm_name,
    validate_windows_computer_name, VmRequest, MAX_ADMIN_PASSWORD_LEN, MAX_ADMIN_USERNAME_LEN,
    MAX_VM_NAME_LEN, MAX_WINDOWS_COMPUTER_NAME_LEN,
};

use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

use crate::azure::{
    ArmResource, NetworkInterface, NetworkSecurityGroup, ResourceManager, Subnet, Vault,
    VirtualMachine, VirtualMachineSpec, VirtualNetwork,
};
use crate::config::ProvisionConfig;
use crate::error::{Error, Result};
use crate::secrets::{NoLogRegistry, PasswordGenerator, SecretMetadata, SecretStore};

/// Receives progress notifications while a run executes.
///
/// All methods default to no-ops.
pub trait ProvisionObserver: Send + Sync {
    /// A step is about to start.
    fn step_started(&self, _step: ProvisionStep) {}

    /// The vault was resolved.
    fn vault_resolved(&self, _vault: &Vault) {}

    /// The password was written to the vault.
    fn secret_stored(&self, _metadata: &SecretMetadata) {}

    /// A resource reached its terminal success state.
    fn resource_created(&self, _resource: &CreatedResource) {}
}

/// Observer that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ProvisionObserver for NoopObserver {}

/// Runs the provisioning sequence against its collaborators.
pub struct Provisioner {
    config: ProvisionConfig,
    resources: Arc<dyn ResourceManager>,
    secrets: Arc<dyn SecretStore>,
    registry: Arc<NoLogRegistry>,
    generator: PasswordGenerator,
    observer: Arc<dyn ProvisionObserver>,
}

impl Provisioner {
    /// Create a provisioner. The configuration is validated here.
    pub fn new(
        config: ProvisionConfig,
        resources: Arc<dyn ResourceManager>,
        secrets: Arc<dyn SecretStore>,
        registry: Arc<NoLogRegistry>,
    ) -> Result<Self> {
        config.validate()?;
        let generator = PasswordGenerator::new(&config.password)
            .map_err(|e| Error::invalid_config("password", e.to_string()))?;

        Ok(Self {
            config,
            resources,
            secrets,
            registry,
            generator,
            observer: Arc::new(NoopObserver),
        })
    }

    /// Report progress to `observer`.
    pub fn with_observer(mut self, observer: Arc<dyn ProvisionObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// The configuration in use.
    pub fn config(&self) -> &ProvisionConfig {
        &self.config
    }

    async fn attempt<T, F>(
        &self,
        step: ProvisionStep,
        created: &[CreatedResource],
        operation: F,
    ) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.observer.step_started(step);
        operation.await.map_err(|e| {
            warn!(
                step = %step,
                left_behind = created.len(),
                error = %e,
                "Provisioning step failed"
            );
            Error::step(step, created.to_vec(), e)
        })
    }

    fn record(
        &self,
        created: &mut Vec<CreatedResource>,
        step: ProvisionStep,
        resource: &ArmResource,
    ) {
        let entry = CreatedResource {
            step,
            name: resource.name.clone(),
            id: resource.id.clone(),
        };
        info!(step = %step, resource = %entry.name, id = %entry.id, "Resource created");
        self.observer.resource_created(&entry);
        created.push(entry);
    }

    /// Provision the VM described by `request`.
    pub async fn run(&self, request: &VmRequest) -> Result<ProvisionReport> {
        request.validate_for(&self.config.vm.image)?;

        let network = &self.config.network;
        let mut created: Vec<CreatedResource> = Vec::new();

        // Region is fixed here for the whole run.
        let vault_ref = self.config.vault_reference()?;
        let vault = self
            .attempt(
                ProvisionStep::LookupVault,
                &created,
                self.resources.get_vault(&vault_ref),
            )
            .await?;
        let region = vault.location.clone();
        info!(vault = %vault.name, region = %region, "Using existing Key Vault");
        self.observer.vault_resolved(&vault);

        let password = self.generator.generate();
        self.registry.register_sensitive(&password);

        let secret_name = &self.config.vault.secret_name;
        let secret = self
            .attempt(ProvisionStep::StorePassword, &created, async {
                validate_admin_password(&password)?;
                let metadata = self
                    .secrets
                    .set_secret(&vault.vault_uri, secret_name, &password)
                    .await?;
                Ok::<_, Error>(metadata)
            })
            .await?;
        self.observer.secret_stored(&secret);

        let vnet = self
            .attempt(
                ProvisionStep::VirtualNetwork,
                &created,
                self.resources.create_virtual_network(
                    &network.vnet_name,
                    &VirtualNetwork::new(&region, &network.address_prefix),
                ),
            )
            .await?;
        self.record(&mut created, ProvisionStep::VirtualNetwork, &vnet);

        let subnet = self
            .attempt(
                ProvisionStep::Subnet,
                &created,
                self.resources.create_subnet(
                    &vnet.name,
                    &network.subnet_name,
                    &Subnet::new(&network.subnet_prefix),
                ),
            )
            .await?;
        self.record(&mut created, ProvisionStep::Subnet, &subnet);

        let nsg = self
            .attempt(
                ProvisionStep::NetworkSecurityGroup,
                &created,
                self.resources.create_network_security_group(
                    &network.nsg_name,
                    &NetworkSecurityGroup::new(&region),
                ),
            )
            .await?;
        self.record(&mut created, ProvisionStep::NetworkSecurityGroup, &nsg);

        let nic = self
            .attempt(
                ProvisionStep::NetworkInterface,
                &created,
                self.resources.create_network_interface(
                    &network.nic_name,
                    &NetworkInterface::new(
                        &region,
                        &network.ip_configuration_name,
                        &subnet.id,
                        &nsg.id,
                    ),
                ),
            )
            .await?;
        self.record(&mut created, ProvisionStep::NetworkInterface, &nic);

        info!(
            vm = %request.vm_name,
            "Provisioning the VM; this operation may take a few minutes"
        );
        let vm_request = VirtualMachine::new(VirtualMachineSpec {
            location: &region,
            vm_name: &request.vm_name,
            vm_size: &self.config.vm.size,
            image: &self.config.vm.image,
            admin_username: &request.admin_username,
            admin_password: &password,
            nic_id: &nic.id,
        });
        let vm = self
            .attempt(
                ProvisionStep::VirtualMachine,
                &created,
                self.resources
                    .create_virtual_machine(&request.vm_name, &vm_request),
            )
            .await?;
        self.record(&mut created, ProvisionStep::VirtualMachine, &vm);

        Ok(ProvisionReport {
            region,
            vault_name: vault.name,
            secret,
            resources: created,
            vm: VmSummary {
                name: vm.name.clone(),
                id: vm.id.clone(),
                provisioning_state: vm.provisioning_state().map(String::from),
            },
        })
    }
}

impl std::fmt::Debug for Provisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provisioner")
            .field("config", &self.config)
            .field("secret_store", &self.secrets.name())
            .finish()
    }
}
