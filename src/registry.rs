//! Local instance registry: non-secret metadata keyed by application name.
//!
//! One JSON file per user. Readers tolerate an absent or empty file as an
//! empty registry; writers replace the whole file through a tmp-file rename
//! so a concurrent reader never observes a half-written registry.
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Persisted, non-secret record for one provisioned application.
///
/// The client secret deliberately has no field here; it lives only in the
/// credential store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SsoInstanceRecord {
    pub application_id: String,
    pub tenant_id: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryFile {
    instances: BTreeMap<String, SsoInstanceRecord>,
}

/// File-backed registry of provisioned application instances.
#[derive(Debug)]
pub struct InstanceRegistry {
    path: PathBuf,
}

impl InstanceRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Insert or fully replace the record for `name`.
    pub fn upsert(&self, name: &str, record: SsoInstanceRecord) -> Result<()> {
        let mut file = self.load()?;
        file.instances.insert(name.to_string(), record);
        self.write_atomic(&file)
            .with_context(|| format!("write registry {}", self.path.display()))
    }

    pub fn get(&self, name: &str) -> Result<Option<SsoInstanceRecord>> {
        Ok(self.load()?.instances.remove(name))
    }

    pub fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.load()?.instances.contains_key(name))
    }

    fn load(&self) -> Result<RegistryFile> {
        if !self.path.is_file() {
            return Ok(RegistryFile::default());
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("read registry {}", self.path.display()))?;
        if content.trim().is_empty() {
            return Ok(RegistryFile::default());
        }
        serde_json::from_str(&content)
            .with_context(|| format!("parse registry {}", self.path.display()))
    }

    fn write_atomic(&self, file: &RegistryFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        let file_name = self
            .path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("instances.json");
        let tmp_path = self
            .path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(format!(".{file_name}.tmp"));
        let json = serde_json::to_string_pretty(file).context("serialize registry")?;
        fs::write(&tmp_path, json).with_context(|| format!("write {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("replace {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(app: &str, tenant: &str) -> SsoInstanceRecord {
        SsoInstanceRecord {
            application_id: app.to_string(),
            tenant_id: tenant.to_string(),
        }
    }

    #[test]
    fn absent_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let registry = InstanceRegistry::new(dir.path().join("instances.json"));
        assert!(!registry.exists("contoso").unwrap());
        assert_eq!(registry.get("contoso").unwrap(), None);
    }

    #[test]
    fn empty_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("instances.json");
        fs::write(&path, "").unwrap();
        let registry = InstanceRegistry::new(&path);
        assert!(!registry.exists("contoso").unwrap());
    }

    #[test]
    fn upsert_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let registry = InstanceRegistry::new(dir.path().join("instances.json"));
        registry.upsert("contoso", record("app-1", "tenant-1")).unwrap();
        assert_eq!(
            registry.get("contoso").unwrap(),
            Some(record("app-1", "tenant-1"))
        );
        assert!(registry.exists("contoso").unwrap());
    }

    #[test]
    fn upsert_is_idempotent_under_identical_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("instances.json");
        let registry = InstanceRegistry::new(&path);
        registry.upsert("contoso", record("app-1", "tenant-1")).unwrap();
        let first = fs::read_to_string(&path).unwrap();
        registry.upsert("contoso", record("app-1", "tenant-1")).unwrap();
        let second = fs::read_to_string(&path).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn upsert_fully_replaces_prior_record() {
        let dir = tempfile::tempdir().unwrap();
        let registry = InstanceRegistry::new(dir.path().join("instances.json"));
        registry.upsert("x", record("app-1", "A")).unwrap();
        registry.upsert("x", record("app-1", "B")).unwrap();
        assert_eq!(registry.get("x").unwrap(), Some(record("app-1", "B")));
    }

    #[test]
    fn upsert_preserves_other_entries() {
        let dir = tempfile::tempdir().unwrap();
        let registry = InstanceRegistry::new(dir.path().join("instances.json"));
        registry.upsert("a", record("app-a", "t")).unwrap();
        registry.upsert("b", record("app-b", "t")).unwrap();
        assert_eq!(registry.get("a").unwrap(), Some(record("app-a", "t")));
        assert_eq!(registry.get("b").unwrap(), Some(record("app-b", "t")));
    }

    #[test]
    fn write_leaves_no_tmp_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let registry = InstanceRegistry::new(dir.path().join("instances.json"));
        registry.upsert("contoso", record("app-1", "t")).unwrap();
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .filter(|name| name.ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty(), "tmp files left behind: {leftovers:?}");
    }

    #[test]
    fn registry_file_shape_matches_contract() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("instances.json");
        let registry = InstanceRegistry::new(&path);
        registry.upsert("contoso", record("app-1", "tenant-1")).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["instances"]["contoso"]["applicationId"], "app-1");
        assert_eq!(value["instances"]["contoso"]["tenantId"], "tenant-1");
    }

    #[test]
    fn get_and_exists_do_not_create_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("instances.json");
        let registry = InstanceRegistry::new(&path);
        let _ = registry.get("contoso").unwrap();
        let _ = registry.exists("contoso").unwrap();
        assert!(!path.exists());
    }
}
