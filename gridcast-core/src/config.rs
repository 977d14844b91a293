use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fs, path::PathBuf, time::Duration};

use crate::provider::ProviderId;

pub const DEFAULT_BIND: &str = "0.0.0.0:8080";
pub const DEFAULT_NWS_BASE_URL: &str = "https://api.weather.gov";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Configuration for a single passthrough provider (e.g., API key).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub api_key: String,

    /// Overrides the provider's public endpoint, mostly for testing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServerConfig {
    pub bind: Option<String>,
}

/// Settings for the point-resolution and gridded-series provider.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NwsConfig {
    pub base_url: Option<String>,
    pub user_agent: Option<String>,
    pub timeout_secs: Option<u64>,
}

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Grid identity database; defaults to `gridcast.db` in the platform data dir.
    pub database_path: Option<PathBuf>,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub nws: NwsConfig,

    /// Example TOML:
    /// [providers.airvisual]
    /// api_key = "..."
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

impl Config {
    pub fn provider_config(&self, id: ProviderId) -> Option<&ProviderConfig> {
        self.providers.get(id.as_str())
    }

    pub fn bind_address(&self) -> String {
        self.server.bind.clone().unwrap_or_else(|| DEFAULT_BIND.to_string())
    }

    pub fn nws_base_url(&self) -> String {
        self.nws
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_NWS_BASE_URL.to_string())
    }

    /// The forecast provider rejects requests without a User-Agent.
    pub fn user_agent(&self) -> String {
        self.nws
            .user_agent
            .clone()
            .unwrap_or_else(|| format!("gridcast/{}", env!("CARGO_PKG_VERSION")))
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.nws.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }

    /// Load config from disk, or return an empty default if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        let path = Self::config_file_path()?;
        if !path.exists() {
            // First run: no config file, return empty.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_file_path()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(&path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file; `GRIDCAST_CONFIG` takes precedence.
    pub fn config_file_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var("GRIDCAST_CONFIG") {
            return Ok(PathBuf::from(path));
        }

        Ok(project_dirs()?.config_dir().join("config.toml"))
    }

    pub fn database_file_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.database_path {
            return Ok(path.clone());
        }

        let dirs = project_dirs()?;
        let data_dir = dirs.data_dir();
        fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        Ok(data_dir.join("gridcast.db"))
    }

    /// Set or replace a provider API key, keeping any endpoint override.
    pub fn upsert_provider_api_key(&mut self, provider_id: ProviderId, api_key: String) {
        self.providers
            .entry(provider_id.as_str().to_string())
            .and_modify(|cfg| cfg.api_key = api_key.clone())
            .or_insert(ProviderConfig {
                api_key,
                base_url: None,
            });
    }

    /// Returns API key for a provider, if present.
    pub fn provider_api_key(&self, provider_id: ProviderId) -> Option<&str> {
        self.providers.get(provider_id.as_str()).map(|cfg| cfg.api_key.as_str())
    }

    pub fn is_provider_configured(&self, provider_id: ProviderId) -> bool {
        self.provider_api_key(provider_id).is_some_and(|key| !key.is_empty())
    }
}

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("dev", "gridcast", "gridcast")
        .ok_or_else(|| anyhow!("Could not determine platform config directory"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderId;

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = Config::default();

        assert_eq!(cfg.bind_address(), "0.0.0.0:8080");
        assert_eq!(cfg.nws_base_url(), "https://api.weather.gov");
        assert_eq!(cfg.upstream_timeout(), Duration::from_secs(10));
        assert!(cfg.user_agent().starts_with("gridcast/"));
    }

    #[test]
    fn set_api_key_for_provider() {
        let mut cfg = Config::default();

        cfg.upsert_provider_api_key(ProviderId::AirVisual, "AQI_KEY".into());

        let key = cfg.provider_api_key(ProviderId::AirVisual);
        assert_eq!(key, Some("AQI_KEY"));
        assert!(cfg.is_provider_configured(ProviderId::AirVisual));
        assert!(!cfg.is_provider_configured(ProviderId::MapQuest));
    }

    #[test]
    fn upsert_keeps_base_url_override() {
        let mut cfg = Config::default();
        cfg.providers.insert(
            "mapquest".into(),
            ProviderConfig {
                api_key: "OLD".into(),
                base_url: Some("http://localhost:9999".into()),
            },
        );

        cfg.upsert_provider_api_key(ProviderId::MapQuest, "NEW".into());

        let provider = cfg.provider_config(ProviderId::MapQuest).unwrap();
        assert_eq!(provider.api_key, "NEW");
        assert_eq!(provider.base_url.as_deref(), Some("http://localhost:9999"));
    }

    #[test]
    fn parses_full_toml() {
        let cfg: Config = toml::from_str(
            r#"
            database_path = "/tmp/grid.db"

            [server]
            bind = "127.0.0.1:3000"

            [nws]
            user_agent = "test-agent"
            timeout_secs = 3

            [providers.airvisual]
            api_key = "abc"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.bind_address(), "127.0.0.1:3000");
        assert_eq!(cfg.user_agent(), "test-agent");
        assert_eq!(cfg.upstream_timeout(), Duration::from_secs(3));
        assert_eq!(cfg.database_file_path().unwrap(), PathBuf::from("/tmp/grid.db"));
        assert!(cfg.is_provider_configured(ProviderId::AirVisual));
    }

    #[test]
    fn toml_round_trip_preserves_providers() {
        let mut cfg = Config::default();
        cfg.upsert_provider_api_key(ProviderId::MapQuest, "MQ".into());

        let text = toml::to_string_pretty(&cfg).unwrap();
        let back: Config = toml::from_str(&text).unwrap();

        assert_eq!(back.provider_api_key(ProviderId::MapQuest), Some("MQ"));
    }
}
