//! Client configuration, service endpoints and on-disk locations.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{DriveError, Result};

/// Microsoft Graph drive of the signed-in user.
pub const GRAPH_DRIVE_BASE: &str = "https://graph.microsoft.com/v1.0/me/drive";

/// Microsoft identity platform authorization endpoint.
pub const AUTHORIZE_URL: &str = "https://login.microsoftonline.com/common/oauth2/v2.0/authorize";

/// Microsoft identity platform token endpoint.
pub const TOKEN_URL: &str = "https://login.microsoftonline.com/common/oauth2/v2.0/token";

/// Redirect URI registered for the application; the callback listener binds to it.
pub const REDIRECT_URI: &str = "http://localhost:8080/";

/// Scopes requested during authorization.
pub const SCOPES: &[&str] = &["files.readwrite", "offline_access"];

const CONFIG_FILE: &str = "config.json";
const TOKEN_FILE: &str = "access_token.json";

/// OAuth2 application credentials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub client_id: String,
    pub client_secret: String,
}

impl ClientConfig {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Result<Self> {
        let config = Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(DriveError::InvalidConfig("client_id is required".to_string()));
        }
        if self.client_secret.trim().is_empty() {
            return Err(DriveError::InvalidConfig(
                "client_secret is required".to_string(),
            ));
        }
        Ok(())
    }

    /// Load the config from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(DriveError::ConfigNotFound(path.to_path_buf()))
            }
            Err(e) => return Err(e.into()),
        };
        let config: ClientConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the config as JSON, creating parent directories.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        debug!("Saved client config to {}", path.display());
        Ok(())
    }
}

/// Service endpoints used by the authenticator and the client.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub api_base: String,
    pub authorize_url: String,
    pub token_url: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            api_base: GRAPH_DRIVE_BASE.to_string(),
            authorize_url: AUTHORIZE_URL.to_string(),
            token_url: TOKEN_URL.to_string(),
            redirect_uri: REDIRECT_URI.to_string(),
            scopes: SCOPES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Directory holding `config.json` and `access_token.json`.
#[derive(Debug, Clone)]
pub struct ConfigDir {
    root: PathBuf,
}

impl ConfigDir {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    /// `~/.onedrive` for the current user.
    pub fn default_location() -> Result<Self> {
        let home = directories::BaseDirs::new()
            .ok_or_else(|| DriveError::InvalidConfig("cannot determine home directory".to_string()))?
            .home_dir()
            .join(".onedrive");
        Ok(Self::new(home))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    pub fn token_file(&self) -> PathBuf {
        self.root.join(TOKEN_FILE)
    }
}
