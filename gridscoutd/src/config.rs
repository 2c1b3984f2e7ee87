use std::collections::HashMap;
use std::path::{Path, PathBuf};
use serde::Deserialize;
use anyhow::{Context, Result};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub discord: DiscordConfig,
    /// Per-tenant routing, keyed by tenant (guild) id
    #[serde(default)]
    pub tenants: HashMap<String, TenantConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default = "default_local_report_cap")]
    pub local_report_cap: usize,
    #[serde(default = "default_liveness_window")]
    pub liveness_window_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifyConfig {
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
    #[serde(default = "default_scout_login_cooldown")]
    pub scout_login_cooldown_secs: u64,
    #[serde(default = "default_enemy_sighting_cooldown")]
    pub enemy_sighting_cooldown_secs: u64,
    #[serde(default = "default_on_grid_threat_cooldown")]
    pub on_grid_threat_cooldown_secs: u64,
    #[serde(default = "default_spy_behavior_cooldown")]
    pub spy_behavior_cooldown_secs: u64,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_jitter")]
    pub retry_jitter_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscordConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Environment variable holding the bot token; delivery is log-only without it
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

/// Notification routing for one tenant
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TenantConfig {
    #[serde(default)]
    pub event_channel_id: Option<String>,
    #[serde(default)]
    pub enabled_events: Vec<String>,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("/var/lib/gridscout/grid.db")
}

fn default_local_report_cap() -> usize {
    5000
}

fn default_liveness_window() -> u64 {
    300
}

fn default_listen() -> String {
    "[::]:3000".to_string()
}

fn default_max_body_bytes() -> usize {
    256 * 1024
}

fn default_queue_depth() -> usize {
    256
}

fn default_scout_login_cooldown() -> u64 {
    5 * 60
}

fn default_enemy_sighting_cooldown() -> u64 {
    10 * 60
}

fn default_on_grid_threat_cooldown() -> u64 {
    2 * 60
}

fn default_spy_behavior_cooldown() -> u64 {
    10 * 60
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_base_delay() -> u64 {
    200
}

fn default_retry_jitter() -> u64 {
    75
}

fn default_api_base() -> String {
    "https://discord.com/api/v10".to_string()
}

fn default_token_env() -> String {
    "DISCORD_BOT_TOKEN".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            local_report_cap: default_local_report_cap(),
            liveness_window_secs: default_liveness_window(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            queue_depth: default_queue_depth(),
            scout_login_cooldown_secs: default_scout_login_cooldown(),
            enemy_sighting_cooldown_secs: default_enemy_sighting_cooldown(),
            on_grid_threat_cooldown_secs: default_on_grid_threat_cooldown(),
            spy_behavior_cooldown_secs: default_spy_behavior_cooldown(),
            retry_attempts: default_retry_attempts(),
            retry_base_delay_ms: default_retry_base_delay(),
            retry_jitter_ms: default_retry_jitter(),
        }
    }
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            token_env: default_token_env(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_apply_to_empty_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.store.local_report_cap, 5000);
        assert_eq!(config.store.liveness_window_secs, 300);
        assert_eq!(config.notify.retry_attempts, 3);
        assert_eq!(config.notify.enemy_sighting_cooldown_secs, 600);
        assert!(config.tenants.is_empty());
    }

    #[test]
    fn test_tenant_tables() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
            [store]
            local_report_cap = 10

            [tenants."123456789012345678"]
            event_channel_id = "987654321098765432"
            enabled_events = ["new_enemy_sighted"]
            "#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.store.local_report_cap, 10);
        let tenant = &config.tenants["123456789012345678"];
        assert_eq!(tenant.event_channel_id.as_deref(), Some("987654321098765432"));
        assert_eq!(tenant.enabled_events, vec!["new_enemy_sighted".to_string()]);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(Config::load("/nonexistent/gridscoutd.toml").is_err());
    }
}
