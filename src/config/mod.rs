/// Configuration management
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub api: ApiConfig,
    pub remote: RemoteConfig,
    pub embed: EmbedConfig,
    pub reconcile: ReconcileConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Directory for persisted UI preferences
    pub data_dir: Option<String>,
    /// Log level (error, warn, info, debug, trace)
    pub log_level: String,
}

/// The application's own REST backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL, e.g. https://app.example.com/api/
    pub base_url: String,
    /// Bearer credential for the application session, if the host uses one
    pub session_token: Option<String>,
    /// Token refetch period; stays ahead of the vendor's ~60 minute expiry
    pub token_refresh_secs: u64,
    pub request_timeout_secs: u64,
}

/// Remote-device backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub enabled: bool,
    /// Name the virtual device registers under
    pub device_name: String,
    /// Vendor volume requested at connect (0.0-1.0)
    pub initial_volume: f64,
    pub sdk_url: String,
}

/// Embedded backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedConfig {
    pub enabled: bool,
    pub script_url: String,
    /// Id of the surface the player is embedded into
    pub element_id: String,
    pub poll_interval_ms: u64,
    /// Delay between the vendor ready callback and probing the handle
    pub settle_delay_ms: u64,
    pub ready_timeout_ms: u64,
}

/// Reconciliation timings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    pub position_poll_ms: u64,
    /// Delay before skipping an unplayable embedded track
    pub auto_skip_delay_ms: u64,
    /// How often the host checks whether preferences need saving
    pub preference_save_secs: u64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            log_level: "info".to_string(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3000/api/".to_string(),
            session_token: None,
            token_refresh_secs: 55 * 60,
            request_timeout_secs: 15,
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            device_name: "Playdeck Web Player".to_string(),
            initial_volume: 0.75,
            sdk_url: "https://sdk.scdn.co/spotify-player.js".to_string(),
        }
    }
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            script_url: "https://www.youtube.com/iframe_api".to_string(),
            element_id: "embedded-player".to_string(),
            poll_interval_ms: 200,
            settle_delay_ms: 500,
            ready_timeout_ms: 15_000,
        }
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            position_poll_ms: 1000,
            auto_skip_delay_ms: 1500,
            preference_save_secs: 30,
        }
    }
}

impl ApiConfig {
    pub fn token_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.token_refresh_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

impl EmbedConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }
}

impl ReconcileConfig {
    pub fn position_poll_interval(&self) -> Duration {
        Duration::from_millis(self.position_poll_ms.max(1))
    }

    pub fn auto_skip_delay(&self) -> Duration {
        Duration::from_millis(self.auto_skip_delay_ms)
    }

    pub fn preference_save_interval(&self) -> Duration {
        Duration::from_secs(self.preference_save_secs.max(1))
    }
}

impl Config {
    /// Load configuration from file or create default
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let config_path = Self::config_dir()?.join("config.toml");
        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit path, writing defaults if it is missing
    pub fn load_from(config_path: &std::path::Path) -> Result<Self, Box<dyn std::error::Error>> {
        if config_path.exists() {
            let content = std::fs::read_to_string(config_path)?;
            Ok(toml::from_str(&content)?)
        } else {
            if let Some(parent) = config_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let config = Self::default();
            let content = toml::to_string_pretty(&config)?;
            std::fs::write(config_path, content)?;
            Ok(config)
        }
    }

    /// Get configuration directory path
    pub fn config_dir() -> Result<PathBuf, Box<dyn std::error::Error>> {
        let dir = dirs::config_dir()
            .ok_or("Unable to determine config directory")?
            .join("playdeck");
        Ok(dir)
    }

    /// Get data directory, honouring `general.data_dir`
    pub fn data_dir(&self) -> Result<PathBuf, Box<dyn std::error::Error>> {
        if let Some(ref custom_dir) = self.general.data_dir {
            return Ok(PathBuf::from(custom_dir));
        }
        let dir = dirs::data_dir()
            .ok_or("Unable to determine data directory")?
            .join("playdeck");
        Ok(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.remote.initial_volume, 0.75);
        assert_eq!(config.embed.poll_interval(), Duration::from_millis(200));
        assert_eq!(config.reconcile.position_poll_interval(), Duration::from_secs(1));
        assert_eq!(config.api.token_refresh_interval(), Duration::from_secs(3300));
    }

    #[test]
    fn test_partial_file_falls_back_to_defaults() {
        let config: Config = toml::from_str(
            r#"
            [api]
            base_url = "https://focus.example.com/api/"

            [embed]
            settle_delay_ms = 250
            "#,
        )
        .unwrap();
        assert_eq!(config.api.base_url, "https://focus.example.com/api/");
        assert_eq!(config.api.token_refresh_secs, 3300);
        assert_eq!(config.embed.settle_delay_ms, 250);
        assert_eq!(config.embed.poll_interval_ms, 200);
        assert!(config.remote.enabled);
    }

    #[test]
    fn test_load_from_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.reconcile.auto_skip_delay_ms, 1500);

        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded.embed.element_id, config.embed.element_id);
    }

    #[test]
    fn test_custom_data_dir() {
        let mut config = Config::default();
        config.general.data_dir = Some("/tmp/playdeck-test".to_string());
        assert_eq!(
            config.data_dir().unwrap(),
            PathBuf::from("/tmp/playdeck-test")
        );
    }
}
