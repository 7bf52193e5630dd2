use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Default config file looked up in the current directory.
pub const CONFIG_FILE: &str = ".ado-pr.toml";

/// Environment variable the Azure DevOps CLI extension reads a PAT from.
pub const PAT_ENV_VAR: &str = "AZURE_DEVOPS_EXT_PAT";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level configuration loaded from .ado-pr.toml.
/// All fields are optional; the server works with zero config.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub azure: AzureConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AzureConfig {
    /// REST API root. Organizations are addressed as `{api_base}/{org}`.
    pub api_base: String,
    /// Value sent as `api-version` on every REST call
    pub api_version: String,
    /// Azure CLI executable
    pub az_path: String,
    /// Personal access token. If None, falls back to AZURE_DEVOPS_EXT_PAT,
    /// then to the Azure CLI session.
    pub token: Option<String>,
    /// Organization the login check verifies against when none is given
    pub organization: Option<String>,
    /// Per-request HTTP timeout. None keeps the client default.
    pub timeout_secs: Option<u64>,
    /// Target branch used by create_pr when none is given
    pub default_target_branch: String,
}

impl Default for AzureConfig {
    fn default() -> Self {
        Self {
            api_base: "https://dev.azure.com".to_string(),
            api_version: "7.1".to_string(),
            az_path: "az".to_string(),
            token: None,
            organization: None,
            timeout_secs: None,
            default_target_branch: "main".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from `path`, or from .ado-pr.toml in the current
    /// directory when no path is given. A missing default file yields the
    /// default config; an explicit path must exist.
    pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load_from(path)?,
            None => {
                let path = Path::new(CONFIG_FILE);
                if path.exists() {
                    Self::load_from(path)?
                } else {
                    Config::default()
                }
            }
        };

        if config.azure.token.is_none() {
            config.azure.token = std::env::var(PAT_ENV_VAR)
                .ok()
                .filter(|token| !token.trim().is_empty());
        }

        Ok(config)
    }

    /// Load from a specific path (useful for testing).
    pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// The configured personal access token, if any.
    pub fn pat(&self) -> Option<&str> {
        self.azure.token.as_deref()
    }
}
