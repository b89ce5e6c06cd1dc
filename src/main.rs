use anyhow::{anyhow, Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;
mod credentials;
mod directory;
mod manifest;
mod poll;
mod provision;
mod registry;

use cli::{Command, ConfigureArgs, InfoArgs, RootArgs};
use config::{ProvisionConfig, SecretBackend};
use credentials::open_store;
use directory::AzCliDirectory;
use provision::{Orchestrator, ProvisioningRequest};
use registry::InstanceRegistry;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = RootArgs::parse();
    match args.command {
        Command::Configure(args) => cmd_configure(args),
        Command::Info(args) => cmd_info(args),
    }
}

fn cmd_configure(args: ConfigureArgs) -> Result<()> {
    let az_command = config::resolve_az_command(args.az.as_deref())?;

    if !args.skip_cli_check && !directory::cli_installed(&az_command) {
        println!("The Azure CLI is not installed; installing it now before proceeding.");
        directory::install_cli()?;
        if std::env::consts::OS == "windows" {
            println!(
                "Close this shell, reopen it, and run configure again so the \
                 Azure CLI lands on your PATH."
            );
        } else {
            println!("Azure CLI installed. Run configure again to continue.");
        }
        return Ok(());
    }

    let config = ProvisionConfig {
        az_command,
        audience: if args.multi_tenant {
            config::Audience::MultiTenant
        } else {
            config::Audience::SingleTenant
        },
        port: args.port,
        implicit_grant: args.implicit_grant,
        max_poll_attempts: args.poll_attempts,
        registry_path: match args.registry {
            Some(path) => path,
            None => config::default_registry_path()?,
        },
        secret_backend: config::resolve_secret_backend(args.secrets_file)?,
        account: config::resolve_account(),
    };

    let mut directory = AzCliDirectory::new(config.az_command.clone(), config.port);
    let registry = InstanceRegistry::new(&config.registry_path);
    let secrets = open_store(&config.secret_backend, &config.account);
    let request = ProvisioningRequest {
        application_name: args.name.clone(),
        manifest_path: args.manifest.clone(),
    };

    println!("Provisioning application registration for {}", args.name);
    let outcome = Orchestrator::new(&mut directory, &registry, secrets.as_ref(), &config)
        .provision(&request)
        .map_err(|failure| {
            // Tell the operator which directory-side mutations already exist
            // before surfacing the error itself.
            eprintln!("Run stopped after state: {}", failure.last_state);
            if failure.cause.is_post_provisioning() {
                eprintln!(
                    "The directory application was fully provisioned; fix the local \
                     store and re-run configure to repeat only the commit."
                );
            }
            failure
        })?;

    println!("Application registered successfully.");
    println!("  display name:   {}", outcome.application.display_name);
    println!("  application id: {}", outcome.record.application_id);
    println!("  tenant id:      {}", outcome.record.tenant_id);
    println!("  registry:       {}", config.registry_path.display());
    println!(
        "  client secret:  stored in {}",
        describe_backend(&config.secret_backend)
    );
    for warning in &outcome.warnings {
        println!("warning: {warning}");
    }

    if let Some(manifest_path) = &request.manifest_path {
        manifest::patch_manifest(manifest_path, &outcome.record.application_id)
            .with_context(|| format!("patch manifest {}", manifest_path.display()))?;
        println!("Updated {}", manifest_path.display());
    }
    if let Some(env_path) = &args.env_file {
        manifest::patch_env_file(env_path, &outcome.record.application_id)
            .with_context(|| format!("patch env file {}", env_path.display()))?;
        println!("Updated {}", env_path.display());
    }

    Ok(())
}

#[derive(Serialize)]
struct InfoReport {
    name: String,
    #[serde(rename = "applicationId")]
    application_id: String,
    #[serde(rename = "tenantId")]
    tenant_id: String,
    #[serde(rename = "secretPresent")]
    secret_present: bool,
}

fn cmd_info(args: InfoArgs) -> Result<()> {
    let registry_path = match args.registry {
        Some(path) => path,
        None => config::default_registry_path()?,
    };
    let registry = InstanceRegistry::new(&registry_path);
    let Some(record) = registry.get(&args.name)? else {
        return Err(anyhow!(
            "no instance named {} in {}",
            args.name,
            registry_path.display()
        ));
    };

    let backend = config::resolve_secret_backend(args.secrets_file)?;
    let store = open_store(&backend, &config::resolve_account());
    let secret_present = store
        .retrieve(&args.name)
        .with_context(|| format!("read credential store for {}", args.name))?
        .is_some();

    let report = InfoReport {
        name: args.name,
        application_id: record.application_id,
        tenant_id: record.tenant_id,
        secret_present,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("name:           {}", report.name);
        println!("application id: {}", report.application_id);
        println!("tenant id:      {}", report.tenant_id);
        if report.secret_present {
            println!(
                "client secret:  present in {}",
                describe_backend(&backend)
            );
        } else {
            // Normal condition: the companion service will refuse to start
            // until configure has stored a secret for this name.
            println!("client secret:  not configured");
        }
    }
    Ok(())
}

fn describe_backend(backend: &SecretBackend) -> String {
    match backend {
        SecretBackend::Keychain => "the macOS Keychain".to_string(),
        SecretBackend::CredentialManager => "the Windows Credential Manager".to_string(),
        SecretBackend::File(path) => path.display().to_string(),
    }
}
