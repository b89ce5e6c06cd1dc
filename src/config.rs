//! Explicit run configuration.
//!
//! Everything platform- or environment-derived is resolved once, here, and
//! handed to the orchestrator and stores at construction time. Deep helpers
//! never read ambient process state.
use anyhow::{anyhow, Result};
use std::path::PathBuf;

/// Environment variable overriding the directory CLI invocation.
pub const AZ_COMMAND_ENV: &str = "SSOPROV_AZ_COMMAND";

/// Default port embedded in identifier URIs and redirect URIs.
pub const DEFAULT_PORT: u16 = 3000;

/// Sign-in audience for the registered application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    SingleTenant,
    MultiTenant,
}

impl Audience {
    /// Microsoft Graph `signInAudience` value.
    pub fn graph_value(&self) -> &'static str {
        match self {
            Audience::SingleTenant => "AzureADMyOrg",
            Audience::MultiTenant => "AzureADMultipleOrgs",
        }
    }
}

/// Where application secrets are kept on this machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretBackend {
    /// macOS Keychain via security(1).
    Keychain,
    /// Windows Credential Manager via PowerShell.
    CredentialManager,
    /// JSON file, used on other platforms and by tests.
    File(PathBuf),
}

/// Configuration for one provisioning run.
#[derive(Debug, Clone)]
pub struct ProvisionConfig {
    /// Directory CLI argv (program + leading args), e.g. `["az"]`.
    pub az_command: Vec<String>,
    pub audience: Audience,
    pub port: u16,
    /// Whether to enable the implicit-grant flow after consent.
    pub implicit_grant: bool,
    /// Readiness poll attempt budget.
    pub max_poll_attempts: u32,
    /// Instance registry file path.
    pub registry_path: PathBuf,
    pub secret_backend: SecretBackend,
    /// Account name used for credential-store entries.
    pub account: String,
}

/// Resolve the directory CLI invocation: explicit arg > env var > `az`.
pub fn resolve_az_command(explicit: Option<&str>) -> Result<Vec<String>> {
    let raw = explicit
        .map(|s| s.to_string())
        .or_else(|| std::env::var(AZ_COMMAND_ENV).ok())
        .unwrap_or_else(|| "az".to_string());
    let argv = shell_words::split(&raw)?;
    if argv.is_empty() {
        return Err(anyhow!("directory CLI command is empty"));
    }
    Ok(argv)
}

/// Default registry location: `<data dir>/ssoprov/instances.json`.
pub fn default_registry_path() -> Result<PathBuf> {
    let data_dir = dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .ok_or_else(|| anyhow!("cannot determine home directory"))?;
    Ok(data_dir.join("ssoprov").join("instances.json"))
}

/// Default secrets-file location for the file-backed store.
pub fn default_secrets_path() -> Result<PathBuf> {
    let data_dir = dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .ok_or_else(|| anyhow!("cannot determine home directory"))?;
    Ok(data_dir.join("ssoprov").join("secrets.json"))
}

/// Pick the secret backend for this platform, honoring an explicit file path.
pub fn resolve_secret_backend(secrets_file: Option<PathBuf>) -> Result<SecretBackend> {
    if let Some(path) = secrets_file {
        return Ok(SecretBackend::File(path));
    }
    match std::env::consts::OS {
        "macos" => Ok(SecretBackend::Keychain),
        "windows" => Ok(SecretBackend::CredentialManager),
        _ => Ok(SecretBackend::File(default_secrets_path()?)),
    }
}

/// Account name recorded alongside credential-store entries.
pub fn resolve_account() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "ssoprov".to_string())
}
