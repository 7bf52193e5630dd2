use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, instrument};

use super::types::Identity;
use super::PrError;
use crate::config::Config;

/// Azure DevOps application id; access tokens are requested for this resource.
pub const ADO_RESOURCE_ID: &str = "499b84ac-1321-427f-aa17-267ca6975798";

/// `Identity::kind` reported by a PAT session.
pub const PAT_KIND: &str = "pat";

/// How REST requests authenticate.
#[derive(Clone)]
pub enum Credential {
    /// Entra ID access token from the Azure CLI
    Bearer(String),
    /// Personal access token, sent as basic auth with an empty user
    Pat(String),
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::Bearer(_) => f.write_str("Bearer([REDACTED])"),
            Credential::Pat(_) => f.write_str("Pat([REDACTED])"),
        }
    }
}

/// Source of identity and credentials. The login lifecycle itself
/// (az login, token refresh) belongs to the implementation's backing tool.
#[async_trait]
pub trait Session: Send + Sync {
    /// Read-only probe of who is logged in.
    async fn identity(&self) -> Result<Identity, PrError>;

    /// Credential for one REST call. Not cached between calls.
    async fn credential(&self) -> Result<Credential, PrError>;
}

/// Pick the session for this config: a PAT if one is configured,
/// otherwise the Azure CLI login.
pub fn from_config(config: &Config) -> Arc<dyn Session> {
    match config.pat() {
        Some(token) => {
            debug!("using personal access token session");
            Arc::new(PatSession::new(token))
        }
        None => {
            debug!(az = %config.azure.az_path, "using Azure CLI session");
            Arc::new(AzCliSession::new(&config.azure.az_path))
        }
    }
}

/// Session backed by the user's existing `az login`.
pub struct AzCliSession {
    az_path: String,
}

impl AzCliSession {
    pub fn new(az_path: &str) -> Self {
        Self {
            az_path: az_path.to_string(),
        }
    }

    /// Run `az` and return stdout. A non-zero exit is reported with stderr.
    async fn az(&self, args: &[&str]) -> Result<String, AzFailure> {
        let output = Command::new(&self.az_path)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| AzFailure::Spawn(format!("failed to execute {}: {}", self.az_path, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(AzFailure::Exit(stderr));
        }

        String::from_utf8(output.stdout)
            .map_err(|_| AzFailure::Spawn("az output contains invalid UTF-8".to_string()))
    }
}

enum AzFailure {
    Spawn(String),
    Exit(String),
}

impl AzFailure {
    fn into_message(self) -> String {
        match self {
            AzFailure::Spawn(message) => message,
            AzFailure::Exit(stderr) if stderr.is_empty() => "az exited with an error".to_string(),
            AzFailure::Exit(stderr) => stderr,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountShow {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    tenant_id: Option<String>,
    #[serde(default)]
    user: Option<AccountUser>,
}

#[derive(Debug, Deserialize)]
struct AccountUser {
    name: String,
    #[serde(rename = "type", default)]
    kind: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccessToken {
    access_token: String,
}

#[async_trait]
impl Session for AzCliSession {
    #[instrument(skip(self))]
    async fn identity(&self) -> Result<Identity, PrError> {
        let stdout = self
            .az(&["account", "show", "--output", "json"])
            .await
            .map_err(|e| PrError::Unauthenticated(e.into_message()))?;
        parse_account(&stdout)
    }

    async fn credential(&self) -> Result<Credential, PrError> {
        let stdout = self
            .az(&[
                "account",
                "get-access-token",
                "--resource",
                ADO_RESOURCE_ID,
                "--output",
                "json",
            ])
            .await
            .map_err(|e| PrError::Unauthenticated(e.into_message()))?;
        let token: AccessToken = serde_json::from_str(&stdout).map_err(|e| {
            PrError::remote("get access token", format!("unexpected az output: {}", e))
        })?;
        Ok(Credential::Bearer(token.access_token))
    }
}

fn parse_account(stdout: &str) -> Result<Identity, PrError> {
    let account: AccountShow = serde_json::from_str(stdout).map_err(|e| {
        PrError::remote("check_az_login", format!("invalid response from az account show: {}", e))
    })?;
    let (name, kind) = match account.user {
        Some(user) => (user.name, user.kind.unwrap_or_else(|| "user".to_string())),
        None => ("Unknown".to_string(), "user".to_string()),
    };
    Ok(Identity {
        name,
        kind,
        tenant_id: account.tenant_id,
        subscription: account.name,
    })
}

/// Session backed by a personal access token.
pub struct PatSession {
    token: String,
}

impl PatSession {
    pub fn new(token: &str) -> Self {
        Self {
            token: token.trim().to_string(),
        }
    }

    fn token(&self) -> Result<&str, PrError> {
        if self.token.is_empty() {
            return Err(PrError::Unauthenticated(
                "the configured personal access token is empty".to_string(),
            ));
        }
        Ok(&self.token)
    }
}

#[async_trait]
impl Session for PatSession {
    /// Only checks a token is present; the client verifies it remotely.
    async fn identity(&self) -> Result<Identity, PrError> {
        self.token()?;
        Ok(Identity {
            name: "personal access token".to_string(),
            kind: PAT_KIND.to_string(),
            tenant_id: None,
            subscription: None,
        })
    }

    async fn credential(&self) -> Result<Credential, PrError> {
        Ok(Credential::Pat(self.token()?.to_string()))
    }
}
