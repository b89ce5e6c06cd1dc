//! Project file patching: write the issued application id into the
//! developer's manifest and env file.
//!
//! This is a thin boundary over simple placeholder substitution; manifest
//! schema details stay out of this tool.
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::Path;

/// Placeholder the add-in templates ship with.
pub const APP_ID_PLACEHOLDER: &str = "{application GUID here}";

/// Replace every application-id placeholder in the manifest.
pub fn patch_manifest(manifest_path: &Path, application_id: &str) -> Result<()> {
    if !manifest_path.is_file() {
        return Err(anyhow!("{} does not exist", manifest_path.display()));
    }
    let content = fs::read_to_string(manifest_path)
        .with_context(|| format!("read {}", manifest_path.display()))?;
    if !content.contains(APP_ID_PLACEHOLDER) {
        tracing::warn!(
            manifest = %manifest_path.display(),
            "manifest has no application-id placeholder; leaving it unchanged"
        );
        return Ok(());
    }
    let updated = content.replace(APP_ID_PLACEHOLDER, application_id);
    fs::write(manifest_path, updated)
        .with_context(|| format!("write {}", manifest_path.display()))?;
    Ok(())
}

/// Complete the `CLIENT_ID=` line in a dotenv-style file.
pub fn patch_env_file(env_path: &Path, application_id: &str) -> Result<()> {
    if !env_path.is_file() {
        return Err(anyhow!("{} does not exist", env_path.display()));
    }
    let content =
        fs::read_to_string(env_path).with_context(|| format!("read {}", env_path.display()))?;
    let updated = content.replace("CLIENT_ID=", &format!("CLIENT_ID={application_id}"));
    fs::write(env_path, updated).with_context(|| format!("write {}", env_path.display()))?;
    Ok(())
}
