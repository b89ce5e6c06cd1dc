//! Identity directory client, shelled through the Azure CLI.
//!
//! Directory access is isolated behind `DirectoryClient` so the orchestrator
//! stays deterministic and mock-testable. The production implementation
//! drives `az` / `az rest` against Microsoft Graph and parses JSON stdout;
//! it never interprets directory identifiers beyond treating them as opaque
//! strings.
use anyhow::{anyhow, Context, Result};
use regex::Regex;
use serde::Deserialize;
use std::process::{Command, Output, Stdio};
use std::time::Instant;

use crate::config::Audience;

const GRAPH_APPLICATIONS_URL: &str = "https://graph.microsoft.com/v1.0/applications";
const GRAPH_DIRECTORY_ROLES_URL: &str = "https://graph.microsoft.com/v1.0/directoryRoles";

/// Identity returned by an interactive sign-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedInUser {
    pub user_principal_name: String,
    pub tenant_id: String,
}

/// Application object created in the directory.
///
/// `object_id` and `application_id` are distinct, directory-issued opaque
/// identifiers; neither can be derived from the other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryApplication {
    pub object_id: String,
    pub application_id: String,
    pub display_name: String,
}

/// Operation set the orchestrator needs from the directory.
pub trait DirectoryClient {
    /// Interactive sign-in. `None` means the directory returned no identity.
    fn sign_in(&mut self) -> Result<Option<SignedInUser>>;
    /// Create the application object. `None` means the directory returned
    /// an empty result rather than an error.
    fn create_application(&mut self, display_name: &str) -> Result<Option<DirectoryApplication>>;
    fn set_identifier_uri(&mut self, app: &DirectoryApplication) -> Result<()>;
    fn set_sign_in_audience(&mut self, object_id: &str, audience: Audience) -> Result<()>;
    /// Read-back probe: is the created object independently queryable yet?
    /// Expected query failures count as "not visible", not as errors.
    fn application_visible(&mut self, application_id: &str) -> Result<bool>;
    fn is_tenant_admin(&mut self, user: &SignedInUser) -> Result<bool>;
    fn grant_admin_consent(&mut self, application_id: &str) -> Result<()>;
    fn set_implicit_grant(&mut self, object_id: &str) -> Result<()>;
    /// Issue a client secret. `None` means no secret text came back.
    fn create_secret(&mut self, object_id: &str) -> Result<Option<String>>;
    fn sign_out(&mut self) -> Result<()>;
}

#[derive(Deserialize)]
struct LoginEntry {
    #[serde(rename = "tenantId")]
    tenant_id: String,
    user: LoginUser,
}

#[derive(Deserialize)]
struct LoginUser {
    name: String,
}

#[derive(Deserialize)]
struct AppCreateResponse {
    id: String,
    #[serde(rename = "appId")]
    app_id: String,
    #[serde(rename = "displayName")]
    display_name: String,
}

#[derive(Deserialize)]
struct DirectoryList<T> {
    value: Vec<T>,
}

#[derive(Deserialize)]
struct DirectoryRole {
    id: String,
    #[serde(rename = "displayName")]
    display_name: String,
}

#[derive(Deserialize)]
struct RoleMember {
    #[serde(rename = "userPrincipalName")]
    user_principal_name: Option<String>,
}

#[derive(Deserialize)]
struct SecretResponse {
    #[serde(rename = "secretText")]
    secret_text: Option<String>,
}

/// Production client driving the `az` CLI.
#[derive(Debug)]
pub struct AzCliDirectory {
    argv: Vec<String>,
    port: u16,
}

impl AzCliDirectory {
    pub fn new(argv: Vec<String>, port: u16) -> Self {
        Self { argv, port }
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        let start = Instant::now();
        let output = Command::new(&self.argv[0])
            .args(&self.argv[1..])
            .args(args)
            .output()
            .with_context(|| format!("run {} {}", self.argv[0], args.first().unwrap_or(&"")))?;
        let elapsed_ms = start.elapsed().as_millis();
        tracing::debug!(
            elapsed_ms,
            subcommand = args.first().copied().unwrap_or(""),
            status = ?output.status.code(),
            stdout_bytes = output.stdout.len(),
            "directory CLI call complete"
        );
        Ok(output)
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            return Err(anyhow!(
                "{} {} failed: {}",
                self.argv[0],
                args.first().unwrap_or(&""),
                stderr_trim(&output)
            ));
        }
        Ok(output)
    }

    fn run_json<T: for<'de> Deserialize<'de>>(&self, args: &[&str]) -> Result<Option<T>> {
        let output = self.run_checked(args)?;
        if output.stdout.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(None);
        }
        let parsed = serde_json::from_slice(&output.stdout)
            .with_context(|| format!("parse {} output as JSON", args.first().unwrap_or(&"")))?;
        Ok(Some(parsed))
    }

    fn graph_rest<T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<Option<T>> {
        let rendered;
        let mut args = vec![
            "rest",
            "--method",
            method,
            "--url",
            url,
            "--headers",
            "Content-Type=application/json",
        ];
        if let Some(body) = body {
            rendered = body.to_string();
            args.push("--body");
            args.push(&rendered);
        }
        self.run_json(&args)
    }

    fn graph_patch(&self, url: &str, body: &serde_json::Value) -> Result<()> {
        let _: Option<serde_json::Value> = self.graph_rest("patch", url, Some(body))?;
        Ok(())
    }
}

impl DirectoryClient for AzCliDirectory {
    fn sign_in(&mut self) -> Result<Option<SignedInUser>> {
        tracing::info!("opening browser for interactive directory sign-in");
        let entries: Option<Vec<LoginEntry>> =
            self.run_json(&["login", "--allow-no-subscriptions"])?;
        let entries = match entries {
            Some(entries) if !entries.is_empty() => entries,
            _ => {
                // Stale token caches can yield an empty login result; clear
                // the session and retry a plain login once.
                tracing::warn!("sign-in returned no identity; retrying after sign-out");
                let _ = self.run(&["logout"]);
                match self.run_json::<Vec<LoginEntry>>(&["login"])? {
                    Some(entries) if !entries.is_empty() => entries,
                    _ => return Ok(None),
                }
            }
        };
        let first = &entries[0];
        Ok(Some(SignedInUser {
            user_principal_name: first.user.name.clone(),
            tenant_id: first.tenant_id.clone(),
        }))
    }

    fn create_application(&mut self, display_name: &str) -> Result<Option<DirectoryApplication>> {
        let body = create_application_body(display_name, self.port);
        let created: Option<AppCreateResponse> =
            self.graph_rest("post", GRAPH_APPLICATIONS_URL, Some(&body))?;
        let Some(created) = created else {
            return Ok(None);
        };
        if !looks_like_guid(&created.app_id) {
            tracing::warn!(
                application_id = %created.app_id,
                "directory returned an application id that is not GUID-shaped"
            );
        }
        Ok(Some(DirectoryApplication {
            object_id: created.id,
            application_id: created.app_id,
            display_name: created.display_name,
        }))
    }

    fn set_identifier_uri(&mut self, app: &DirectoryApplication) -> Result<()> {
        let url = format!("{GRAPH_APPLICATIONS_URL}/{}", app.object_id);
        let body = serde_json::json!({
            "identifierUris": [identifier_uri(self.port, &app.application_id)],
        });
        self.graph_patch(&url, &body)
    }

    fn set_sign_in_audience(&mut self, object_id: &str, audience: Audience) -> Result<()> {
        let url = format!("{GRAPH_APPLICATIONS_URL}/{object_id}");
        let body = serde_json::json!({ "signInAudience": audience.graph_value() });
        self.graph_patch(&url, &body)
    }

    fn application_visible(&mut self, application_id: &str) -> Result<bool> {
        // `az ad app show` fails while the object is still propagating; that
        // is the expected "not yet" signal, not an error.
        let output = self.run(&["ad", "app", "show", "--id", application_id])?;
        if !output.status.success() {
            return Ok(false);
        }
        Ok(!output.stdout.iter().all(|b| b.is_ascii_whitespace()))
    }

    fn is_tenant_admin(&mut self, user: &SignedInUser) -> Result<bool> {
        let roles: Option<DirectoryList<DirectoryRole>> =
            self.graph_rest("get", GRAPH_DIRECTORY_ROLES_URL, None)?;
        let Some(roles) = roles else {
            return Ok(false);
        };
        let Some(admin_role) = roles.value.iter().find(|role| {
            role.display_name == "Company Administrator"
                || role.display_name == "Global Administrator"
        }) else {
            return Ok(false);
        };
        let members_url = format!("{GRAPH_DIRECTORY_ROLES_URL}/{}/members", admin_role.id);
        let members: Option<DirectoryList<RoleMember>> =
            self.graph_rest("get", &members_url, None)?;
        let Some(members) = members else {
            return Ok(false);
        };
        Ok(members.value.iter().any(|member| {
            member
                .user_principal_name
                .as_deref()
                .is_some_and(|upn| upn.eq_ignore_ascii_case(&user.user_principal_name))
        }))
    }

    fn grant_admin_consent(&mut self, application_id: &str) -> Result<()> {
        self.run_checked(&["ad", "app", "permission", "admin-consent", "--id", application_id])?;
        Ok(())
    }

    fn set_implicit_grant(&mut self, object_id: &str) -> Result<()> {
        let url = format!("{GRAPH_APPLICATIONS_URL}/{object_id}");
        let body = serde_json::json!({
            "web": {
                "implicitGrantSettings": {
                    "enableIdTokenIssuance": true,
                    "enableAccessTokenIssuance": true,
                }
            }
        });
        self.graph_patch(&url, &body)
    }

    fn create_secret(&mut self, object_id: &str) -> Result<Option<String>> {
        let url = format!("{GRAPH_APPLICATIONS_URL}/{object_id}/addPassword");
        let body = serde_json::json!({
            "passwordCredential": { "displayName": "ssoprov" },
        });
        let response: Option<SecretResponse> = self.graph_rest("post", &url, Some(&body))?;
        Ok(response
            .and_then(|r| r.secret_text)
            .filter(|text| !text.is_empty()))
    }

    fn sign_out(&mut self) -> Result<()> {
        self.run_checked(&["logout"])?;
        Ok(())
    }
}

/// Identifier URI registered for the application (original command template:
/// `api://localhost:{PORT}/{appId}`).
pub fn identifier_uri(port: u16, application_id: &str) -> String {
    format!("api://localhost:{port}/{application_id}")
}

fn create_application_body(display_name: &str, port: u16) -> serde_json::Value {
    serde_json::json!({
        "displayName": display_name,
        "web": {
            "redirectUris": [format!("https://localhost:{port}/dialog.html")],
        },
    })
}

/// GUID-shape check for directory-issued application identifiers.
pub fn looks_like_guid(value: &str) -> bool {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .map(|re| re.is_match(value))
        .unwrap_or(false)
}

fn stderr_trim(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}

/// Is the directory CLI resolvable on PATH?
pub fn cli_installed(argv: &[String]) -> bool {
    argv.first()
        .map(|program| which::which(program).is_ok())
        .unwrap_or(false)
}

/// Invoke the platform installer for the directory CLI. The operator must
/// re-run configure afterwards; on Windows the shell has to be reopened so
/// the PATH update takes effect.
pub fn install_cli() -> Result<()> {
    tracing::info!("installing the Azure CLI; this can take a minute");
    let status = match std::env::consts::OS {
        "macos" => Command::new("sh")
            .args(["-c", "brew update && brew install azure-cli"])
            .stdin(Stdio::inherit())
            .status()
            .context("run brew install azure-cli")?,
        "windows" => Command::new("winget")
            .args(["install", "--exact", "--id", "Microsoft.AzureCLI"])
            .stdin(Stdio::inherit())
            .status()
            .context("run winget install Microsoft.AzureCLI")?,
        os => return Err(anyhow!("no Azure CLI installer wired for platform {os}")),
    };
    if !status.success() {
        return Err(anyhow!("Azure CLI installer exited with {status}"));
    }
    Ok(())
}
