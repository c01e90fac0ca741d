//! Server configuration types

use daad_bridge::BridgeConfig;
use serde::{Deserialize, Serialize};

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP / WebSocket listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Built UI shell to serve at `/` (SPA fallback to index.html)
    #[serde(default)]
    pub web_ui_dir: Option<String>,
    /// Origins allowed to open a session; empty means this server's own
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    /// Shared secret session clients must present, if set
    #[serde(default)]
    pub access_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            web_ui_dir: None,
            allowed_origins: Vec::new(),
            access_token: None,
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8790
}

/// Project folder the file store is confined to
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    #[serde(default)]
    pub root: Option<String>,
}

/// Log file output (console logging is always on)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Directory for daily rolling log files
    #[serde(default)]
    pub directory: Option<String>,
}
