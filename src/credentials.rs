//! Platform credential storage for application secrets.
//!
//! One secret per application name. The plaintext secret never touches the
//! instance registry; it exists transiently in memory and inside whichever
//! backend this module selects. Retrieval of a never-stored name is a normal
//! `Ok(None)`, distinct from a store failure: the commit path and the token
//! service both branch on that difference.
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use thiserror::Error;

use crate::config::SecretBackend;

#[derive(Debug, Error)]
pub enum SecretStoreError {
    #[error("credential store I/O failed")]
    Io(#[from] std::io::Error),
    #[error("credential store command failed: {detail}")]
    Command { detail: String },
    #[error("credential store file is invalid: {detail}")]
    Corrupt { detail: String },
}

/// Secret custody boundary: store overwrites, retrieve never errors on miss.
pub trait SecretStore {
    fn store(&self, name: &str, secret: &str) -> Result<(), SecretStoreError>;
    fn retrieve(&self, name: &str) -> Result<Option<String>, SecretStoreError>;
}

/// Open the store for the configured backend.
pub fn open_store(backend: &SecretBackend, account: &str) -> Box<dyn SecretStore> {
    match backend {
        SecretBackend::Keychain => Box::new(KeychainSecretStore {
            account: account.to_string(),
        }),
        SecretBackend::CredentialManager => Box::new(CredentialManagerSecretStore {
            account: account.to_string(),
        }),
        SecretBackend::File(path) => Box::new(FileSecretStore { path: path.clone() }),
    }
}

fn stderr_trim(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}

/// macOS Keychain, shelled through security(1).
#[derive(Debug)]
pub struct KeychainSecretStore {
    account: String,
}

impl SecretStore for KeychainSecretStore {
    fn store(&self, name: &str, secret: &str) -> Result<(), SecretStoreError> {
        tracing::info!(name, "storing application secret in Keychain");
        // -U updates in place when an item for this service already exists.
        let output = Command::new("security")
            .args(["add-generic-password", "-a", &self.account, "-U", "-s", name, "-w", secret])
            .output()?;
        if !output.status.success() {
            return Err(SecretStoreError::Command {
                detail: stderr_trim(&output),
            });
        }
        Ok(())
    }

    fn retrieve(&self, name: &str) -> Result<Option<String>, SecretStoreError> {
        let output = Command::new("security")
            .args(["find-generic-password", "-a", &self.account, "-s", name, "-w"])
            .output()?;
        if output.status.success() {
            let secret = String::from_utf8_lossy(&output.stdout).trim_end().to_string();
            return Ok(Some(secret));
        }
        // security(1) exits 44 (errSecItemNotFound) when no item matches.
        let stderr = stderr_trim(&output);
        if output.status.code() == Some(44) || stderr.contains("could not be found") {
            return Ok(None);
        }
        Err(SecretStoreError::Command { detail: stderr })
    }
}

/// Windows Credential Manager, shelled through PowerShell's PasswordVault.
#[derive(Debug)]
pub struct CredentialManagerSecretStore {
    account: String,
}

impl CredentialManagerSecretStore {
    fn run_script(&self, script: &str) -> Result<Output, SecretStoreError> {
        let output = Command::new("powershell")
            .args(["-NoProfile", "-NonInteractive", "-Command", script])
            .output()?;
        Ok(output)
    }
}

fn ps_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

const PS_VAULT_PRELUDE: &str = "[Windows.Security.Credentials.PasswordVault,Windows.Security.Credentials,ContentType=WindowsRuntime] | Out-Null; $vault = New-Object Windows.Security.Credentials.PasswordVault;";

impl SecretStore for CredentialManagerSecretStore {
    fn store(&self, name: &str, secret: &str) -> Result<(), SecretStoreError> {
        tracing::info!(name, "storing application secret in Credential Manager");
        // Remove any prior entry first so store is an overwrite, not a duplicate.
        let script = format!(
            "{PS_VAULT_PRELUDE} try {{ $old = $vault.Retrieve({name}, {account}); $vault.Remove($old) }} catch {{}}; $vault.Add((New-Object Windows.Security.Credentials.PasswordCredential({name}, {account}, {secret})))",
            name = ps_quote(name),
            account = ps_quote(&self.account),
            secret = ps_quote(secret),
        );
        let output = self.run_script(&script)?;
        if !output.status.success() {
            return Err(SecretStoreError::Command {
                detail: stderr_trim(&output),
            });
        }
        Ok(())
    }

    fn retrieve(&self, name: &str) -> Result<Option<String>, SecretStoreError> {
        let script = format!(
            "{PS_VAULT_PRELUDE} $cred = $vault.Retrieve({name}, {account}); $cred.RetrievePassword(); $cred.Password",
            name = ps_quote(name),
            account = ps_quote(&self.account),
        );
        let output = self.run_script(&script)?;
        if output.status.success() {
            let secret = String::from_utf8_lossy(&output.stdout).trim_end().to_string();
            return Ok(Some(secret));
        }
        let stderr = stderr_trim(&output);
        if stderr.contains("Element not found") {
            return Ok(None);
        }
        Err(SecretStoreError::Command { detail: stderr })
    }
}

/// File-backed store: a JSON map from application name to secret.
///
/// Used on platforms without a native vault and throughout the test suite.
#[derive(Debug)]
pub struct FileSecretStore {
    path: PathBuf,
}

impl FileSecretStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn load(&self) -> Result<BTreeMap<String, String>, SecretStoreError> {
        if !self.path.is_file() {
            return Ok(BTreeMap::new());
        }
        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&content).map_err(|err| SecretStoreError::Corrupt {
            detail: err.to_string(),
        })
    }

    fn write_atomic(&self, secrets: &BTreeMap<String, String>) -> Result<(), SecretStoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file_name = self
            .path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("secrets.json");
        let tmp_path = self
            .path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(format!(".{file_name}.tmp"));
        let json = serde_json::to_string_pretty(secrets).map_err(|err| {
            SecretStoreError::Corrupt {
                detail: err.to_string(),
            }
        })?;
        fs::write(&tmp_path, json)?;
        restrict_permissions(&tmp_path)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<(), SecretStoreError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<(), SecretStoreError> {
    Ok(())
}

impl SecretStore for FileSecretStore {
    fn store(&self, name: &str, secret: &str) -> Result<(), SecretStoreError> {
        let mut secrets = self.load()?;
        secrets.insert(name.to_string(), secret.to_string());
        self.write_atomic(&secrets)
    }

    fn retrieve(&self, name: &str) -> Result<Option<String>, SecretStoreError> {
        Ok(self.load()?.get(name).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_store_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSecretStore::new(dir.path().join("secrets.json"));
        store.store("contoso", "s3cret").unwrap();
        assert_eq!(store.retrieve("contoso").unwrap(), Some("s3cret".to_string()));
    }

    #[test]
    fn retrieve_of_missing_name_is_none_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSecretStore::new(dir.path().join("secrets.json"));
        assert_eq!(store.retrieve("never-stored").unwrap(), None);
    }

    #[test]
    fn store_overwrites_prior_secret() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSecretStore::new(dir.path().join("secrets.json"));
        store.store("contoso", "old").unwrap();
        store.store("contoso", "new").unwrap();
        assert_eq!(store.retrieve("contoso").unwrap(), Some("new".to_string()));
    }

    #[test]
    fn io_failure_is_an_error_not_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        // Parent path is a regular file, so any access through it fails.
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "not a directory").unwrap();
        let store = FileSecretStore::new(blocker.join("secrets.json"));
        assert!(store.store("contoso", "s").is_err());
    }

    #[test]
    fn corrupt_file_is_an_error_not_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secrets.json");
        fs::write(&path, "{ not json").unwrap();
        let store = FileSecretStore::new(&path);
        assert!(matches!(
            store.retrieve("contoso"),
            Err(SecretStoreError::Corrupt { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn file_store_is_user_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secrets.json");
        let store = FileSecretStore::new(&path);
        store.store("contoso", "s3cret").unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn ps_quote_doubles_single_quotes() {
        assert_eq!(ps_quote("o'brien"), "'o''brien'");
    }
}
