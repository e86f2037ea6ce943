//! JSON configuration consumed by the core. Lives at `$PERSONAL_OS_CONFIG`
//! or `~/.picoclaw/config.json`; unknown keys are preserved round-trip via
//! the flattened `extra` map so the setup wizard can own fields the core
//! never reads.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::caldav::NextcloudConfig;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub(crate) struct Config {
    #[serde(default)]
    pub(crate) agents: AgentsConfig,
    #[serde(default)]
    pub(crate) providers: HashMap<String, ProviderConfig>,
    #[serde(default)]
    pub(crate) model_list: Vec<ModelEntry>,
    #[serde(default)]
    pub(crate) tools: ToolsConfig,
    #[serde(default)]
    pub(crate) channels: ChannelsConfig,
    #[serde(default)]
    pub(crate) heartbeat: HeartbeatConfig,
    #[serde(default)]
    pub(crate) monitor: MonitorConfig,
    #[serde(default)]
    pub(crate) gateway: GatewayConfig,
    #[serde(default, flatten)]
    pub(crate) extra: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub(crate) struct AgentsConfig {
    #[serde(default)]
    pub(crate) defaults: AgentDefaults,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct AgentDefaults {
    #[serde(default)]
    pub(crate) provider: String,
    #[serde(default)]
    pub(crate) model: String,
    #[serde(default = "default_max_tokens")]
    pub(crate) max_tokens: u64,
    #[serde(default)]
    pub(crate) temperature: Option<f64>,
    #[serde(default = "default_max_tool_iterations")]
    pub(crate) max_tool_iterations: usize,
    #[serde(default)]
    pub(crate) restrict_to_workspace: bool,
}

fn default_max_tokens() -> u64 {
    8192
}

fn default_max_tool_iterations() -> usize {
    8
}

impl Default for AgentDefaults {
    fn default() -> Self {
        AgentDefaults {
            provider: String::new(),
            model: String::new(),
            max_tokens: default_max_tokens(),
            temperature: None,
            max_tool_iterations: default_max_tool_iterations(),
            restrict_to_workspace: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub(crate) struct ProviderConfig {
    #[serde(default)]
    pub(crate) api_key: String,
    #[serde(default)]
    pub(crate) api_base: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub(crate) struct ModelEntry {
    #[serde(default)]
    pub(crate) provider: String,
    #[serde(default)]
    pub(crate) model: String,
    #[serde(default)]
    pub(crate) model_name: String,
    #[serde(default)]
    pub(crate) api_key: String,
    #[serde(default)]
    pub(crate) api_base: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub(crate) struct ToolsConfig {
    #[serde(default)]
    pub(crate) nextcloud: NextcloudConfig,
    #[serde(default)]
    pub(crate) telegram: TelegramToolConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub(crate) struct TelegramToolConfig {
    #[serde(default)]
    pub(crate) bot_token: String,
    #[serde(default)]
    pub(crate) chat_id: String,
    #[serde(default)]
    pub(crate) timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub(crate) struct ChannelsConfig {
    #[serde(default)]
    pub(crate) telegram: TelegramChannelConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub(crate) struct TelegramChannelConfig {
    #[serde(default)]
    pub(crate) enabled: bool,
    #[serde(default)]
    pub(crate) token: String,
    /// Chat ids allowed to talk to the daemon; enforced by the adapter.
    #[serde(default)]
    pub(crate) allow_from: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub(crate) struct HeartbeatConfig {
    #[serde(default)]
    pub(crate) enabled: bool,
    /// Minutes between ticks; 0 disables.
    #[serde(default)]
    pub(crate) interval: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub(crate) struct MonitorConfig {
    #[serde(default)]
    pub(crate) feeds: Vec<FeedConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct FeedConfig {
    pub(crate) name: String,
    pub(crate) url: String,
    #[serde(default = "default_category")]
    pub(crate) category: String,
    #[serde(default = "default_tier")]
    pub(crate) tier: i64,
    #[serde(default = "default_lang")]
    pub(crate) lang: String,
    #[serde(default = "default_active")]
    pub(crate) active: bool,
}

fn default_category() -> String {
    "default".to_string()
}
fn default_tier() -> i64 {
    1
}
fn default_lang() -> String {
    "en".to_string()
}
fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct GatewayConfig {
    #[serde(default = "default_gateway_host")]
    pub(crate) host: String,
    #[serde(default = "default_gateway_port")]
    pub(crate) port: u16,
}

fn default_gateway_host() -> String {
    "127.0.0.1".to_string()
}
fn default_gateway_port() -> u16 {
    18790
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            host: default_gateway_host(),
            port: default_gateway_port(),
        }
    }
}

/// `$PERSONAL_OS_CONFIG` wins; otherwise `~/.picoclaw/config.json`.
pub(crate) fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("PERSONAL_OS_CONFIG") {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".picoclaw")
        .join("config.json")
}

/// Workspace root holding the per-skill directories.
pub(crate) fn workspace_root() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".picoclaw")
        .join("workspace")
}

/// Load the config, creating parent directories and a default file on
/// first run. A malformed file is fatal (exit 1 at startup).
pub(crate) fn load_config(path: &Path) -> Result<Config, String> {
    if !path.exists() {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| format!("create {}: {e}", parent.display()))?;
        }
        let config = Config::default();
        save_config(path, &config)?;
        return Ok(config);
    }
    let data = fs::read_to_string(path).map_err(|e| format!("read {}: {e}", path.display()))?;
    serde_json::from_str(&data).map_err(|e| format!("parse {}: {e}", path.display()))
}

pub(crate) fn save_config(path: &Path, config: &Config) -> Result<(), String> {
    let json = serde_json::to_string_pretty(config).map_err(|e| format!("serialize config: {e}"))?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, &json).map_err(|e| format!("write {}: {e}", tmp.display()))?;
    fs::rename(&tmp, path).map_err(|e| format!("rename {}: {e}", path.display()))
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_creates_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = load_config(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.agents.defaults.max_tool_iterations, 8);
        assert_eq!(config.agents.defaults.max_tokens, 8192);
    }

    #[test]
    fn test_unknown_keys_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let raw = r#"{
            "agents": {"defaults": {"provider": "openrouter", "model": "m"}},
            "wizard_private": {"step": 3}
        }"#;
        fs::write(&path, raw).unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.extra["wizard_private"]["step"], 3);

        save_config(&path, &config).unwrap();
        let reloaded = load_config(&path).unwrap();
        assert_eq!(reloaded.extra["wizard_private"]["step"], 3);
        assert_eq!(reloaded.agents.defaults.provider, "openrouter");
    }

    #[test]
    fn test_feed_defaults() {
        let raw = r#"{"monitor": {"feeds": [{"name": "BBC", "url": "https://bbc/rss"}]}}"#;
        let config: Config = serde_json::from_str(raw).unwrap();
        let feed = &config.monitor.feeds[0];
        assert_eq!(feed.category, "default");
        assert_eq!(feed.tier, 1);
        assert_eq!(feed.lang, "en");
        assert!(feed.active);
    }

    #[test]
    fn test_malformed_config_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{not json").unwrap();
        assert!(load_config(&path).is_err());
    }
}
