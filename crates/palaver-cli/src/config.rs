//! Configuration file support

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use palaver_gateway::GatewayConfig;
use palaver_session::{FileHistoryStore, SessionConfig};

/// Configuration for palaver
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the session proxy
    pub base_url: Option<String>,
    /// Bearer token for the proxy (falls back to PALAVER_API_KEY)
    pub api_key: Option<String>,
    /// Invisible opening message that makes the agent greet the user
    pub greeting: Option<String>,
    /// Pause before an agent reply is shown, in milliseconds
    pub reply_delay_ms: Option<u64>,
    /// Status checks are ignored for this long after creation, in milliseconds
    pub grace_window_ms: Option<u64>,
    /// Delay of the status check after each reply, in milliseconds (0 disables it)
    pub status_poll_delay_ms: Option<u64>,
    /// Per-request timeout in seconds
    pub request_timeout_secs: Option<u64>,
    /// History file location
    pub history_path: Option<String>,
    /// Regex recognizing calendar booking links
    pub booking_pattern: Option<String>,
}

impl Config {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("palaver")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("PALAVER_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from the default location
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Load config from a file. Missing or broken files give the defaults.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("Warning: Failed to parse config file: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                eprintln!("Warning: Failed to read config file: {}", e);
                Self::default()
            }
        }
    }

    /// Save config to a file
    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let content = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        fs::write(path, content)
    }

    /// Create a default config file if it doesn't exist
    pub fn init() -> std::io::Result<PathBuf> {
        let path = Self::config_path();
        if path.exists() {
            return Ok(path);
        }

        let default_config = Config {
            base_url: Some(GatewayConfig::default().base_url),
            greeting: Some(DEFAULT_GREETING.to_string()),
            ..Default::default()
        };

        default_config.save_to(&path)?;
        Ok(path)
    }

    /// API key from config, then environment
    pub fn api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var("PALAVER_API_KEY").ok().filter(|k| !k.is_empty()))
    }

    pub fn gateway_config(&self) -> GatewayConfig {
        let defaults = GatewayConfig::default();
        GatewayConfig {
            base_url: self.base_url.clone().unwrap_or(defaults.base_url),
            api_key: self.api_key(),
            timeout: self
                .request_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        let defaults = SessionConfig::default();
        SessionConfig {
            reply_delay: self
                .reply_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.reply_delay),
            grace_window: self
                .grace_window_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.grace_window),
            follow_up_poll: match self.status_poll_delay_ms {
                Some(0) => None,
                Some(ms) => Some(Duration::from_millis(ms)),
                None => defaults.follow_up_poll,
            },
        }
    }

    pub fn history_path(&self) -> PathBuf {
        self.history_path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(FileHistoryStore::default_path)
    }
}

/// Greeting sent silently when a conversation starts
pub const DEFAULT_GREETING: &str = "Hello";

/// Generate example config content
pub fn example_config() -> &'static str {
    r#"# palaver configuration file
# Place at ~/.config/palaver/config.toml (Linux) or set PALAVER_CONFIG_PATH

# Session proxy endpoint
base_url = "http://localhost:3000/api/chat"

# Bearer token for the proxy (optional, PALAVER_API_KEY also works)
# api_key = "..."

# Sent invisibly at the start of each conversation so the agent opens the chat
greeting = "Hello"

# Timing, in milliseconds
# reply_delay_ms = 0
# grace_window_ms = 2000
# status_poll_delay_ms = 500    # 0 disables the follow-up status check

# request_timeout_secs = 30

# history_path = "~/.local/share/palaver/history.json"

# Links matching this regex are shown as calendar actions
# booking_pattern = "https://calendly\\.com/\\S+"
"#
}
