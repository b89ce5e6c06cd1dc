//! Application provisioning orchestrator and its state machine.
//!
//! Provisioning is a fixed sequence of directory mutations where every step
//! depends on identifiers produced by earlier steps. Directory side effects
//! are never rolled back; instead the orchestrator tracks an explicit "last
//! completed state" so the operator knows exactly which mutations already
//! exist when a run fails, and whether re-running the commit alone is the
//! right remediation.
use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::config::ProvisionConfig;
use crate::credentials::{SecretStore, SecretStoreError};
use crate::directory::{DirectoryApplication, DirectoryClient};
use crate::poll::{wait_until_ready, PollOutcome};
use crate::registry::{InstanceRegistry, SsoInstanceRecord};

/// Inputs for one orchestration run. Immutable for its duration.
#[derive(Debug, Clone)]
pub struct ProvisioningRequest {
    /// Directory display name and registry key.
    pub application_name: String,
    /// Opaque handle for the external project-file patcher.
    pub manifest_path: Option<PathBuf>,
}

/// States of one provisioning run, strictly forward, never revisited.
///
/// A skipped consent leaves the run at `ConsentPending`; `ConsentGranted` is
/// reached only when admin consent was actually applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProvisioningState {
    NotStarted,
    SignedIn,
    Created,
    IdentifierUriSet,
    AudienceSet,
    ConsentPending,
    ConsentGranted,
    SecretIssued,
    Committed,
}

impl ProvisioningState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProvisioningState::NotStarted => "not_started",
            ProvisioningState::SignedIn => "signed_in",
            ProvisioningState::Created => "created",
            ProvisioningState::IdentifierUriSet => "identifier_uri_set",
            ProvisioningState::AudienceSet => "audience_set",
            ProvisioningState::ConsentPending => "consent_pending",
            ProvisioningState::ConsentGranted => "consent_granted",
            ProvisioningState::SecretIssued => "secret_issued",
            ProvisioningState::Committed => "committed",
        }
    }
}

impl fmt::Display for ProvisioningState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Step-classified failures. Callers branch on these: pre-commit failures
/// mean abandoned or re-run-from-scratch; the two commit failures mean the
/// directory application already exists and only the local commit must be
/// repeated.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("directory sign-in produced no identity")]
    AuthenticationFailed(#[source] anyhow::Error),
    #[error("directory did not register application {name}")]
    RegistrationFailed {
        name: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("directory call failed while trying to {step}")]
    Directory {
        step: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error("application {application_id} was still not visible after {attempts} attempts")]
    ReadinessTimeout {
        application_id: String,
        attempts: u32,
    },
    #[error("directory did not issue a client secret for {name}")]
    SecretCreationFailed {
        name: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to store the client secret for {name}; directory state is already applied, re-run to repeat the commit")]
    CredentialStoreWriteFailed {
        name: String,
        #[source]
        source: SecretStoreError,
    },
    #[error("failed to record instance {name}; directory state is already applied, re-run to repeat the commit")]
    RegistryWriteFailed {
        name: String,
        #[source]
        source: anyhow::Error,
    },
}

impl ProvisionError {
    /// True when directory provisioning succeeded and only the local commit
    /// failed, so remediation differs from the pre-commit failures.
    pub fn is_post_provisioning(&self) -> bool {
        matches!(
            self,
            ProvisionError::CredentialStoreWriteFailed { .. }
                | ProvisionError::RegistryWriteFailed { .. }
        )
    }
}

/// Terminal failure: the cause plus the last successfully completed state.
#[derive(Debug)]
pub struct ProvisionFailure {
    pub last_state: ProvisioningState,
    pub cause: ProvisionError,
}

impl fmt::Display for ProvisionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "provisioning failed after reaching state {}: {}",
            self.last_state, self.cause
        )
    }
}

impl std::error::Error for ProvisionFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.cause)
    }
}

/// Result of a committed run.
#[derive(Debug)]
pub struct ProvisionOutcome {
    pub record: SsoInstanceRecord,
    pub application: DirectoryApplication,
    /// Non-fatal conditions the operator should see (skipped consent, etc.).
    pub warnings: Vec<String>,
}

/// Drives the ordered provisioning sequence against a directory client and
/// commits the result to the registry and credential store.
pub struct Orchestrator<'a> {
    directory: &'a mut dyn DirectoryClient,
    registry: &'a InstanceRegistry,
    secrets: &'a dyn SecretStore,
    config: &'a ProvisionConfig,
    state: ProvisioningState,
    warnings: Vec<String>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        directory: &'a mut dyn DirectoryClient,
        registry: &'a InstanceRegistry,
        secrets: &'a dyn SecretStore,
        config: &'a ProvisionConfig,
    ) -> Self {
        Self {
            directory,
            registry,
            secrets,
            config,
            state: ProvisioningState::NotStarted,
            warnings: Vec::new(),
        }
    }

    /// Run the full provisioning sequence for `request`.
    ///
    /// Every step from application creation onward mutates external directory
    /// state; nothing is persisted locally until the final commit, and
    /// already-applied directory mutations survive a failed run.
    pub fn provision(
        mut self,
        request: &ProvisioningRequest,
    ) -> Result<ProvisionOutcome, ProvisionFailure> {
        let name = &request.application_name;

        let user = match self.directory.sign_in() {
            Ok(Some(user)) => user,
            Ok(None) => {
                return Err(self.fail(ProvisionError::AuthenticationFailed(anyhow::anyhow!(
                    "sign-in returned an empty identity list"
                ))))
            }
            Err(source) => return Err(self.fail(ProvisionError::AuthenticationFailed(source))),
        };
        tracing::info!(user = %user.user_principal_name, tenant = %user.tenant_id, "signed in");
        self.advance(ProvisioningState::SignedIn);

        // Re-run policy decision point: an existing record means a directory
        // application for this name already exists somewhere. We create a
        // second one and overwrite the local record rather than trying to
        // repair the first.
        match self.registry.exists(name) {
            Ok(true) => self.warn(format!(
                "an instance named {name} is already registered; a new directory application \
                 will be created and the local record overwritten"
            )),
            Ok(false) => {}
            Err(err) => tracing::debug!(error = %err, "pre-create registry check failed"),
        }

        let application = match self.directory.create_application(name) {
            Ok(Some(application)) => application,
            Ok(None) => {
                return Err(self.fail(ProvisionError::RegistrationFailed {
                    name: name.clone(),
                    source: anyhow::anyhow!("directory returned no application object"),
                }))
            }
            Err(source) => {
                return Err(self.fail(ProvisionError::RegistrationFailed {
                    name: name.clone(),
                    source,
                }))
            }
        };
        tracing::info!(
            application_id = %application.application_id,
            object_id = %application.object_id,
            "application registered"
        );
        self.advance(ProvisioningState::Created);

        if let Err(source) = self.directory.set_identifier_uri(&application) {
            return Err(self.fail(ProvisionError::Directory {
                step: "set the identifier URI",
                source,
            }));
        }
        self.advance(ProvisioningState::IdentifierUriSet);

        if let Err(source) = self
            .directory
            .set_sign_in_audience(&application.object_id, self.config.audience)
        {
            return Err(self.fail(ProvisionError::Directory {
                step: "set the sign-in audience",
                source,
            }));
        }
        self.advance(ProvisioningState::AudienceSet);

        // Consent needs the object to be independently queryable first; a
        // just-created application can lag behind its own dependent APIs.
        self.advance(ProvisioningState::ConsentPending);
        let ready = self.wait_for_visibility(&application.application_id);
        if ready.is_ready() {
            self.grant_consent(&user, &application)?;
        } else {
            self.warn(format!(
                "application {} never became visible to dependent APIs; skipping admin consent — \
                 grant it manually once the directory catches up",
                application.application_id
            ));
        }

        if self.config.implicit_grant {
            // Fresh probe: implicit grant cannot proceed against an object
            // view that does not exist, so exhaustion here is fatal.
            match self.wait_for_visibility(&application.application_id) {
                PollOutcome::Ready { .. } => {
                    if let Err(source) = self.directory.set_implicit_grant(&application.object_id)
                    {
                        return Err(self.fail(ProvisionError::Directory {
                            step: "enable the implicit-grant flow",
                            source,
                        }));
                    }
                }
                PollOutcome::Exhausted { attempts } => {
                    return Err(self.fail(ProvisionError::ReadinessTimeout {
                        application_id: application.application_id.clone(),
                        attempts,
                    }))
                }
            }
        }

        let secret = match self.directory.create_secret(&application.object_id) {
            Ok(Some(secret)) => secret,
            Ok(None) => {
                return Err(self.fail(ProvisionError::SecretCreationFailed {
                    name: name.clone(),
                    source: anyhow::anyhow!("directory returned no secret text"),
                }))
            }
            Err(source) => {
                return Err(self.fail(ProvisionError::SecretCreationFailed {
                    name: name.clone(),
                    source,
                }))
            }
        };
        self.advance(ProvisioningState::SecretIssued);

        // Commit order matters: the secret lands first so a registry entry is
        // never observable without its secret.
        if let Err(source) = self.secrets.store(name, &secret) {
            return Err(self.fail(ProvisionError::CredentialStoreWriteFailed {
                name: name.clone(),
                source,
            }));
        }
        let record = SsoInstanceRecord {
            application_id: application.application_id.clone(),
            tenant_id: user.tenant_id.clone(),
        };
        if let Err(source) = self.registry.upsert(name, record.clone()) {
            return Err(self.fail(ProvisionError::RegistryWriteFailed {
                name: name.clone(),
                source,
            }));
        }
        self.advance(ProvisioningState::Committed);

        if let Err(err) = self.directory.sign_out() {
            tracing::warn!(error = %err, "directory sign-out failed; session may still be active");
        }

        Ok(ProvisionOutcome {
            record,
            application,
            warnings: self.warnings,
        })
    }

    fn grant_consent(
        &mut self,
        user: &crate::directory::SignedInUser,
        application: &DirectoryApplication,
    ) -> Result<(), ProvisionFailure> {
        let is_admin = match self.directory.is_tenant_admin(user) {
            Ok(is_admin) => is_admin,
            Err(source) => {
                return Err(self.fail(ProvisionError::Directory {
                    step: "check tenant administrator membership",
                    source,
                }))
            }
        };
        if !is_admin {
            self.warn(format!(
                "{} is not a tenant administrator, so admin consent was not granted; ask your \
                 tenant admin to consent for application {}",
                user.user_principal_name, application.application_id
            ));
            return Ok(());
        }
        if let Err(source) = self
            .directory
            .grant_admin_consent(&application.application_id)
        {
            return Err(self.fail(ProvisionError::Directory {
                step: "grant admin consent",
                source,
            }));
        }
        self.advance(ProvisioningState::ConsentGranted);
        Ok(())
    }

    fn wait_for_visibility(&mut self, application_id: &str) -> PollOutcome {
        let directory = &mut *self.directory;
        let outcome = wait_until_ready(self.config.max_poll_attempts, |attempt| {
            match directory.application_visible(application_id) {
                Ok(visible) => visible,
                Err(err) => {
                    tracing::debug!(attempt, error = %err, "visibility probe failed");
                    false
                }
            }
        });
        match outcome {
            PollOutcome::Ready { attempts } => {
                tracing::debug!(attempts, application_id, "application visible");
            }
            PollOutcome::Exhausted { attempts } => {
                tracing::debug!(attempts, application_id, "visibility poll exhausted");
            }
        }
        outcome
    }

    fn advance(&mut self, next: ProvisioningState) {
        debug_assert!(self.state < next, "state machine must move forward");
        tracing::debug!(from = %self.state, to = %next, "provisioning state advanced");
        self.state = next;
    }

    fn warn(&mut self, message: String) {
        tracing::warn!("{message}");
        self.warnings.push(message);
    }

    fn fail(&self, cause: ProvisionError) -> ProvisionFailure {
        ProvisionFailure {
            last_state: self.state,
            cause,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Audience, SecretBackend};
    use crate::credentials::FileSecretStore;
    use crate::directory::SignedInUser;
    use anyhow::anyhow;
    use std::path::Path;

    /// Scripted directory: responses are fixed up front, calls are counted.
    struct ScriptedDirectory {
        identity: Option<SignedInUser>,
        create_result: Option<DirectoryApplication>,
        visible_after: Option<u32>,
        is_admin: bool,
        secret: Option<String>,
        fail_secret_call: bool,
        fail_sign_out: bool,
        show_calls: u32,
        consent_calls: u32,
        implicit_calls: u32,
        sign_out_calls: u32,
    }

    impl ScriptedDirectory {
        fn happy() -> Self {
            Self {
                identity: Some(SignedInUser {
                    user_principal_name: "dev@contoso.com".to_string(),
                    tenant_id: "tenant-1".to_string(),
                }),
                create_result: Some(DirectoryApplication {
                    object_id: "obj-1".to_string(),
                    application_id: "app-1".to_string(),
                    display_name: "contoso".to_string(),
                }),
                visible_after: Some(1),
                is_admin: true,
                secret: Some("s3cret".to_string()),
                fail_secret_call: false,
                fail_sign_out: false,
                show_calls: 0,
                consent_calls: 0,
                implicit_calls: 0,
                sign_out_calls: 0,
            }
        }
    }

    impl DirectoryClient for ScriptedDirectory {
        fn sign_in(&mut self) -> anyhow::Result<Option<SignedInUser>> {
            Ok(self.identity.clone())
        }

        fn create_application(
            &mut self,
            _display_name: &str,
        ) -> anyhow::Result<Option<DirectoryApplication>> {
            Ok(self.create_result.clone())
        }

        fn set_identifier_uri(&mut self, _app: &DirectoryApplication) -> anyhow::Result<()> {
            Ok(())
        }

        fn set_sign_in_audience(
            &mut self,
            _object_id: &str,
            _audience: Audience,
        ) -> anyhow::Result<()> {
            Ok(())
        }

        fn application_visible(&mut self, _application_id: &str) -> anyhow::Result<bool> {
            self.show_calls += 1;
            Ok(self
                .visible_after
                .is_some_and(|after| self.show_calls >= after))
        }

        fn is_tenant_admin(&mut self, _user: &SignedInUser) -> anyhow::Result<bool> {
            Ok(self.is_admin)
        }

        fn grant_admin_consent(&mut self, _application_id: &str) -> anyhow::Result<()> {
            self.consent_calls += 1;
            Ok(())
        }

        fn set_implicit_grant(&mut self, _object_id: &str) -> anyhow::Result<()> {
            self.implicit_calls += 1;
            Ok(())
        }

        fn create_secret(&mut self, _object_id: &str) -> anyhow::Result<Option<String>> {
            if self.fail_secret_call {
                return Err(anyhow!("directory rejected addPassword"));
            }
            Ok(self.secret.clone())
        }

        fn sign_out(&mut self) -> anyhow::Result<()> {
            self.sign_out_calls += 1;
            if self.fail_sign_out {
                return Err(anyhow!("logout failed"));
            }
            Ok(())
        }
    }

    /// Store whose writes always fail, for commit-order assertions.
    struct BrokenSecretStore;

    impl SecretStore for BrokenSecretStore {
        fn store(&self, _name: &str, _secret: &str) -> Result<(), SecretStoreError> {
            Err(SecretStoreError::Command {
                detail: "vault unavailable".to_string(),
            })
        }

        fn retrieve(&self, _name: &str) -> Result<Option<String>, SecretStoreError> {
            Ok(None)
        }
    }

    fn test_config(dir: &Path, max_poll_attempts: u32, implicit_grant: bool) -> ProvisionConfig {
        ProvisionConfig {
            az_command: vec!["az".to_string()],
            audience: Audience::SingleTenant,
            port: 3000,
            implicit_grant,
            max_poll_attempts,
            registry_path: dir.join("instances.json"),
            secret_backend: SecretBackend::File(dir.join("secrets.json")),
            account: "test".to_string(),
        }
    }

    fn request(name: &str) -> ProvisioningRequest {
        ProvisioningRequest {
            application_name: name.to_string(),
            manifest_path: None,
        }
    }

    struct Fixture {
        registry: InstanceRegistry,
        secrets: FileSecretStore,
        config: ProvisionConfig,
    }

    fn fixture(dir: &Path) -> Fixture {
        let config = test_config(dir, 5, false);
        Fixture {
            registry: InstanceRegistry::new(&config.registry_path),
            secrets: FileSecretStore::new(dir.join("secrets.json")),
            config,
        }
    }

    #[test]
    fn successful_run_commits_registry_and_secret() {
        let dir = tempfile::tempdir().unwrap();
        let f = fixture(dir.path());
        let mut directory = ScriptedDirectory::happy();

        let outcome = Orchestrator::new(&mut directory, &f.registry, &f.secrets, &f.config)
            .provision(&request("contoso"))
            .unwrap();

        assert_eq!(outcome.record.application_id, "app-1");
        assert_eq!(outcome.record.tenant_id, "tenant-1");
        assert!(outcome.warnings.is_empty());
        assert_eq!(
            f.registry.get("contoso").unwrap().map(|r| r.application_id),
            Some("app-1".to_string())
        );
        assert_eq!(
            f.secrets.retrieve("contoso").unwrap(),
            Some("s3cret".to_string())
        );
        assert_eq!(directory.consent_calls, 1);
        assert_eq!(directory.sign_out_calls, 1);
    }

    #[test]
    fn empty_identity_is_authentication_failure_at_not_started() {
        let dir = tempfile::tempdir().unwrap();
        let f = fixture(dir.path());
        let mut directory = ScriptedDirectory::happy();
        directory.identity = None;

        let failure = Orchestrator::new(&mut directory, &f.registry, &f.secrets, &f.config)
            .provision(&request("contoso"))
            .unwrap_err();

        assert_eq!(failure.last_state, ProvisioningState::NotStarted);
        assert!(matches!(
            failure.cause,
            ProvisionError::AuthenticationFailed(_)
        ));
    }

    #[test]
    fn empty_create_result_is_registration_failure_after_sign_in() {
        let dir = tempfile::tempdir().unwrap();
        let f = fixture(dir.path());
        let mut directory = ScriptedDirectory::happy();
        directory.create_result = None;

        let failure = Orchestrator::new(&mut directory, &f.registry, &f.secrets, &f.config)
            .provision(&request("contoso"))
            .unwrap_err();

        assert_eq!(failure.last_state, ProvisioningState::SignedIn);
        assert!(matches!(
            failure.cause,
            ProvisionError::RegistrationFailed { .. }
        ));
    }

    #[test]
    fn non_admin_skips_consent_but_still_commits() {
        let dir = tempfile::tempdir().unwrap();
        let f = fixture(dir.path());
        let mut directory = ScriptedDirectory::happy();
        directory.is_admin = false;

        let outcome = Orchestrator::new(&mut directory, &f.registry, &f.secrets, &f.config)
            .provision(&request("contoso"))
            .unwrap();

        assert_eq!(directory.consent_calls, 0);
        assert_eq!(outcome.warnings.len(), 1);
        assert!(outcome.warnings[0].contains("not a tenant administrator"));
        assert!(f.registry.exists("contoso").unwrap());
        assert!(f.secrets.retrieve("contoso").unwrap().is_some());
    }

    #[test]
    fn readiness_exhaustion_soft_skips_consent() {
        let dir = tempfile::tempdir().unwrap();
        let f = fixture(dir.path());
        let mut directory = ScriptedDirectory::happy();
        directory.visible_after = None;

        let outcome = Orchestrator::new(&mut directory, &f.registry, &f.secrets, &f.config)
            .provision(&request("contoso"))
            .unwrap();

        // The probe runs exactly the configured budget, then consent is
        // skipped rather than failed.
        assert_eq!(directory.show_calls, f.config.max_poll_attempts);
        assert_eq!(directory.consent_calls, 0);
        assert!(outcome.warnings[0].contains("never became visible"));
        assert!(f.registry.exists("contoso").unwrap());
    }

    #[test]
    fn readiness_becomes_visible_mid_poll() {
        let dir = tempfile::tempdir().unwrap();
        let f = fixture(dir.path());
        let mut directory = ScriptedDirectory::happy();
        directory.visible_after = Some(3);

        let outcome = Orchestrator::new(&mut directory, &f.registry, &f.secrets, &f.config)
            .provision(&request("contoso"))
            .unwrap();

        assert_eq!(directory.show_calls, 3);
        assert_eq!(directory.consent_calls, 1);
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn implicit_grant_timeout_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut f = fixture(dir.path());
        f.config.implicit_grant = true;
        let mut directory = ScriptedDirectory::happy();
        directory.visible_after = None;

        let failure = Orchestrator::new(&mut directory, &f.registry, &f.secrets, &f.config)
            .provision(&request("contoso"))
            .unwrap_err();

        assert_eq!(failure.last_state, ProvisioningState::ConsentPending);
        assert!(matches!(
            failure.cause,
            ProvisionError::ReadinessTimeout { attempts: 5, .. }
        ));
        assert_eq!(directory.implicit_calls, 0);
        // Commit was never reached.
        assert!(!f.registry.exists("contoso").unwrap());
        assert_eq!(f.secrets.retrieve("contoso").unwrap(), None);
    }

    #[test]
    fn implicit_grant_applies_after_fresh_probe() {
        let dir = tempfile::tempdir().unwrap();
        let mut f = fixture(dir.path());
        f.config.implicit_grant = true;
        let mut directory = ScriptedDirectory::happy();

        Orchestrator::new(&mut directory, &f.registry, &f.secrets, &f.config)
            .provision(&request("contoso"))
            .unwrap();

        assert_eq!(directory.implicit_calls, 1);
        // Two polls: one before consent, one fresh before implicit grant.
        assert_eq!(directory.show_calls, 2);
    }

    #[test]
    fn secret_failure_leaves_no_local_state() {
        let dir = tempfile::tempdir().unwrap();
        let f = fixture(dir.path());
        let mut directory = ScriptedDirectory::happy();
        directory.fail_secret_call = true;

        let failure = Orchestrator::new(&mut directory, &f.registry, &f.secrets, &f.config)
            .provision(&request("contoso"))
            .unwrap_err();

        assert_eq!(failure.last_state, ProvisioningState::ConsentGranted);
        assert!(matches!(
            failure.cause,
            ProvisionError::SecretCreationFailed { .. }
        ));
        assert!(!failure.cause.is_post_provisioning());
        assert!(!f.registry.exists("contoso").unwrap());
        assert_eq!(f.secrets.retrieve("contoso").unwrap(), None);
    }

    #[test]
    fn credential_store_failure_prevents_registry_write() {
        let dir = tempfile::tempdir().unwrap();
        let f = fixture(dir.path());
        let mut directory = ScriptedDirectory::happy();
        let broken = BrokenSecretStore;

        let failure = Orchestrator::new(&mut directory, &f.registry, &broken, &f.config)
            .provision(&request("contoso"))
            .unwrap_err();

        assert_eq!(failure.last_state, ProvisioningState::SecretIssued);
        assert!(matches!(
            failure.cause,
            ProvisionError::CredentialStoreWriteFailed { .. }
        ));
        assert!(failure.cause.is_post_provisioning());
        // Secret write comes first, so its failure must leave no registry entry.
        assert!(!f.registry.exists("contoso").unwrap());
    }

    #[test]
    fn existing_name_warns_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let f = fixture(dir.path());
        f.registry
            .upsert(
                "contoso",
                SsoInstanceRecord {
                    application_id: "old-app".to_string(),
                    tenant_id: "old-tenant".to_string(),
                },
            )
            .unwrap();
        let mut directory = ScriptedDirectory::happy();

        let outcome = Orchestrator::new(&mut directory, &f.registry, &f.secrets, &f.config)
            .provision(&request("contoso"))
            .unwrap();

        assert!(outcome.warnings[0].contains("already registered"));
        assert_eq!(
            f.registry.get("contoso").unwrap().map(|r| r.application_id),
            Some("app-1".to_string())
        );
    }

    #[test]
    fn sign_out_failure_does_not_fail_a_committed_run() {
        let dir = tempfile::tempdir().unwrap();
        let f = fixture(dir.path());
        let mut directory = ScriptedDirectory::happy();
        directory.fail_sign_out = true;

        let outcome = Orchestrator::new(&mut directory, &f.registry, &f.secrets, &f.config)
            .provision(&request("contoso"))
            .unwrap();

        assert_eq!(outcome.record.application_id, "app-1");
        assert!(f.registry.exists("contoso").unwrap());
    }
}
