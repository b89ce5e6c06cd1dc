//! CLI argument parsing for the provisioning workflow.
//!
//! The CLI is intentionally thin: arguments are resolved into an explicit
//! `ProvisionConfig` in `main`, so the orchestrator and stores never read
//! ambient process state themselves.
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::DEFAULT_PORT;
use crate::poll::DEFAULT_MAX_ATTEMPTS;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "ssoprov",
    version,
    about = "Register an Azure AD application for add-in single sign-on",
    after_help = "Examples:\n  ssoprov configure --name \"Contoso Add-in\" --manifest manifest.xml\n  ssoprov configure --name \"Contoso Add-in\" --multi-tenant --implicit-grant\n  ssoprov info --name \"Contoso Add-in\" --json",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    #[command(subcommand)]
    pub command: Command,
}

/// Top-level commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    Configure(ConfigureArgs),
    Info(InfoArgs),
}

/// Configure command inputs: provision one application end to end.
#[derive(Parser, Debug)]
#[command(about = "Provision an application registration and record it locally")]
pub struct ConfigureArgs {
    /// Application name: directory display name and local registry key
    #[arg(long, value_name = "NAME")]
    pub name: String,

    /// Add-in manifest to patch with the issued application id
    #[arg(long, value_name = "PATH")]
    pub manifest: Option<PathBuf>,

    /// Dotenv file whose CLIENT_ID line should be completed
    #[arg(long, value_name = "PATH")]
    pub env_file: Option<PathBuf>,

    /// Register for any organizational directory instead of a single tenant
    #[arg(long)]
    pub multi_tenant: bool,

    /// Enable the implicit-grant flow after consent
    #[arg(long)]
    pub implicit_grant: bool,

    /// Local development port used in identifier and redirect URIs
    #[arg(long, value_name = "PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Readiness poll attempt budget
    #[arg(long, value_name = "N", default_value_t = DEFAULT_MAX_ATTEMPTS)]
    pub poll_attempts: u32,

    /// Directory CLI invocation override (also SSOPROV_AZ_COMMAND)
    #[arg(long, value_name = "CMD")]
    pub az: Option<String>,

    /// Instance registry file override
    #[arg(long, value_name = "PATH")]
    pub registry: Option<PathBuf>,

    /// Store secrets in this JSON file instead of the platform vault
    #[arg(long, value_name = "PATH")]
    pub secrets_file: Option<PathBuf>,

    /// Skip the directory CLI existence check and installer
    #[arg(long)]
    pub skip_cli_check: bool,
}

/// Info command inputs: report local state for one application.
#[derive(Parser, Debug)]
#[command(about = "Show the registered instance and whether a secret is stored")]
pub struct InfoArgs {
    /// Application name to look up
    #[arg(long, value_name = "NAME")]
    pub name: String,

    /// Emit machine-readable JSON output
    #[arg(long)]
    pub json: bool,

    /// Instance registry file override
    #[arg(long, value_name = "PATH")]
    pub registry: Option<PathBuf>,

    /// Read secrets from this JSON file instead of the platform vault
    #[arg(long, value_name = "PATH")]
    pub secrets_file: Option<PathBuf>,
}
