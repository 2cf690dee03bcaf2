//! azvm - provision a single Azure VM
//!
//! This is the main entry point for the azvm CLI.

mod cli;

use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use azvm::azure::{credential_for, ArmClient, ArmResourceManager};
use azvm::config::Config;
use azvm::error::Error;
use azvm::provisioner::{ProvisionObserver, ProvisionReport, Provisioner};
use azvm::secrets::{KeyVaultSecretStore, NoLogRegistry, RedactingMakeWriter};
use cli::output::OutputFormatter;
use cli::{Cli, LogFormat};

/// Application version information
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Every secret minted in this process is registered here
    let registry = Arc::new(NoLogRegistry::new());

    // Initialize logging based on verbosity
    init_logging(cli.verbosity(), cli.log_format, Arc::clone(&registry));

    let output = Arc::new(OutputFormatter::new(
        !cli.no_color,
        cli.is_json(),
        cli.verbosity(),
        Arc::clone(&registry),
    ));

    let exit_code = match run(&cli, registry, Arc::clone(&output)).await {
        Ok(report) => {
            output.report(&report);
            0
        }
        Err(e) => {
            output.failure(&e);
            e.exit_code()
        }
    };

    std::process::exit(exit_code);
}

async fn run(
    cli: &Cli,
    registry: Arc<NoLogRegistry>,
    output: Arc<OutputFormatter>,
) -> azvm::Result<ProvisionReport> {
    // Load configuration
    let config = Config::load(cli.config.as_deref())?;
    config.validate()?;

    output.banner("Provisioning a VM in Azure");
    debug!(version = VERSION, "azvm starting");

    let request = cli::interactive::resolve_request(
        cli.vm_name.clone(),
        cli.admin_username.clone(),
        &config.vm.image,
    )
    .map_err(|e| Error::InvalidInput(format!("{:#}", e)))?;
    request.validate_for(&config.vm.image)?;

    let http = reqwest::Client::builder()
        .timeout(config.http.request_timeout)
        .user_agent(format!("azvm/{}", VERSION))
        .build()?;

    let credential = credential_for(
        config.azure.auth,
        http.clone(),
        config.authority_host()?,
        config.azure.tenant_id.as_deref(),
    )?;

    let arm = ArmClient::new(
        http.clone(),
        config.management_endpoint()?,
        Arc::clone(&credential),
        config.http.poll_interval,
    );

    // Fail before touching any resource if no credential is available.
    credential.get_token(arm.scope()).await?;
    info!(credential = credential.name(), "Authenticated");

    let resources = ArmResourceManager::new(arm, config.subscription_id()?, config.resource_group()?);
    let secrets = KeyVaultSecretStore::new(http, credential);

    let observer: Arc<dyn ProvisionObserver> = output;
    let provisioner = Provisioner::new(config, Arc::new(resources), Arc::new(secrets), registry)?
        .with_observer(observer);

    provisioner.run(&request).await
}

/// Initialize logging based on verbosity level
fn init_logging(verbosity: u8, format: LogFormat, registry: Arc<NoLogRegistry>) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    let writer = RedactingMakeWriter::new(std::io::stderr, registry);

    match format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(writer)
                    .with_target(verbosity >= 3),
            )
            .with(env_filter)
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(writer))
            .with(env_filter)
            .init(),
    }
}
