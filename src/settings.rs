use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Runtime settings for the hub connection and the deck
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub hub: HubSettings,
    pub deck: DeckSettings,
}

impl Settings {
    /// Load settings from `path`, or the default location; a missing file means defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let settings_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::settings_path()?,
        };

        if settings_path.exists() {
            let contents = std::fs::read_to_string(&settings_path)
                .with_context(|| format!("Failed to read {}", settings_path.display()))?;
            let settings: Settings = toml::from_str(&contents)
                .map_err(|e| anyhow!("Failed to parse {}: {}", settings_path.display(), e))?;
            Ok(settings)
        } else {
            Ok(Settings::default())
        }
    }

    /// Get settings file path
    pub fn settings_path() -> Result<PathBuf> {
        let home = std::env::var("HOME")?;
        Ok(PathBuf::from(home).join(".config/hass-deck/settings.toml"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubSettings {
    /// Home Assistant host, optionally with a port
    pub host: String,
    /// Long-lived access token
    pub token: String,
    /// `wss` or `ws`
    pub protocol: String,
    /// Connection attempts before giving up
    pub max_retries: u32,
    /// Base delay between attempts; grows linearly
    pub retry_delay_secs: f64,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            token: String::new(),
            protocol: "wss".to_string(),
            max_retries: 5,
            retry_delay_secs: 5.0,
        }
    }
}

impl HubSettings {
    pub fn url(&self) -> String {
        format!("{}://{}/api/websocket", self.protocol, self.host)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.retry_delay_secs).unwrap_or(Duration::ZERO)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeckSettings {
    /// Page layout document
    pub config: PathBuf,
    /// Bundled images, downloaded icons and the font
    pub assets: PathBuf,
    /// Defaults to `Roboto-Regular.ttf` in the assets directory
    pub font: Option<PathBuf>,
    pub key_cache_size: usize,
    pub text_cache_size: usize,
}

impl Default for DeckSettings {
    fn default() -> Self {
        Self {
            config: PathBuf::from("configuration.yaml"),
            assets: PathBuf::from("assets"),
            font: None,
            key_cache_size: 128,
            text_cache_size: 1000,
        }
    }
}

impl DeckSettings {
    pub fn font_path(&self) -> PathBuf {
        self.font
            .clone()
            .unwrap_or_else(|| self.assets.join("Roboto-Regular.ttf"))
    }
}
