use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Scope needed to list the folders in the user's Drive root.
pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";

const CLIENT_SECRET_ENV: &str = "SCRIPT_QUICKSTART_CLIENT_SECRET";
const CREDENTIALS_DIR_ENV: &str = "SCRIPT_QUICKSTART_CREDENTIALS_DIR";
const CALLBACK_PORT_ENV: &str = "SCRIPT_QUICKSTART_CALLBACK_PORT";

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub application_name: String,
    pub scopes: Vec<String>,
    pub user_id: String,
    pub credentials_dir: PathBuf,
    pub client_secret_path: PathBuf,
    /// Port of the local consent callback listener, 0 picks a free one.
    pub callback_port: u16,
    pub api_root: String,
    /// Applied as reqwest's whole-request timeout, which bounds connect,
    /// send and the wait for the response body together.
    #[serde(with = "duration_secs")]
    pub read_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));

        Settings {
            application_name: "Apps Script API Rust Quickstart".to_string(),
            scopes: vec![DRIVE_SCOPE.to_string()],
            user_id: "user".to_string(),
            credentials_dir: home.join(".credentials").join("script-api-quickstart"),
            client_secret_path: PathBuf::from("client_secret.json"),
            callback_port: 0,
            api_root: "https://script.googleapis.com/".to_string(),
            // Scripts may run for up to 6 minutes, plus a little overhead
            read_timeout: Duration::from_secs(380),
        }
    }
}

impl Settings {
    /// Default settings with the local paths and callback port overridable
    /// through `SCRIPT_QUICKSTART_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Settings::default();

        if let Some(path) = lookup(CLIENT_SECRET_ENV) {
            settings.client_secret_path = PathBuf::from(path);
        }
        if let Some(dir) = lookup(CREDENTIALS_DIR_ENV) {
            settings.credentials_dir = PathBuf::from(dir);
        }
        if let Some(port) = lookup(CALLBACK_PORT_ENV) {
            settings.callback_port = port
                .parse()
                .with_context(|| format!("{} is not a valid port: '{}'", CALLBACK_PORT_ENV, port))?;
        }

        Ok(settings)
    }
}

/// OAuth client descriptor as downloaded from the Google Cloud console.
#[derive(Clone, Debug, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    pub auth_uri: String,
    pub token_uri: String,
}

#[derive(Deserialize)]
struct ClientSecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

impl ClientSecrets {
    pub fn from_json(json: &str) -> Result<Self> {
        let file: ClientSecretsFile =
            serde_json::from_str(json).context("Client secrets are not valid JSON")?;

        file.installed
            .or(file.web)
            .context("Client secrets contain neither an 'installed' nor a 'web' section")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read client secrets from {}", path.display()))?;
        Self::from_json(&json)
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}
