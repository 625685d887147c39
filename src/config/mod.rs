//! Deck configuration document: pages of buttons and dials plus global settings

mod button;
mod dial;
mod error;
mod light_page;
mod navigation;
mod page;

pub use button::{Action, Appearance, Button, Delay, LightPalette, LongPress, PageTarget, SpecialType};
pub use dial::{Dial, DialPush, DialTurn, Limits, TurnProperties};
pub use error::ConfigError;
pub use light_page::light_page;
pub use navigation::PageId;
pub use page::Page;

use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

fn default_brightness() -> u8 {
    100
}

fn default_inactivity_time() -> f64 {
    -1.0
}

fn default_long_press_duration() -> f64 {
    3.0
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Document {
    #[serde(default)]
    pages: Vec<Page>,
    #[serde(default)]
    anonymous_pages: Vec<Page>,
    state_entity_id: Option<String>,
    brightness_entity_id: Option<String>,
    #[serde(default = "default_brightness")]
    brightness: u8,
    #[serde(default)]
    auto_reload: bool,
    #[serde(default = "default_inactivity_time")]
    inactivity_time: f64,
    #[serde(default = "default_long_press_duration")]
    long_press_duration: f64,
}

/// The loaded configuration plus navigation and power state
#[derive(Debug, Clone)]
pub struct DeckConfig {
    pub pages: Vec<Page>,
    pub anonymous_pages: Vec<Page>,
    /// Boolean entity mirrored to the device's on/off state
    pub state_entity_id: Option<String>,
    pub brightness_entity_id: Option<String>,
    pub brightness: u8,
    pub auto_reload: bool,
    /// Idle seconds before turning off; negative disables
    pub inactivity_time: f64,
    pub long_press_duration: f64,
    current_page_index: usize,
    parent_page_index: usize,
    detached_page: Option<Page>,
    is_on: bool,
    source: Option<PathBuf>,
}

impl DeckConfig {
    /// Parse and validate a YAML document
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let doc: Document = serde_yml::from_str(text)?;
        validate(&doc)?;
        Ok(Self {
            pages: doc.pages,
            anonymous_pages: doc.anonymous_pages,
            state_entity_id: doc.state_entity_id,
            brightness_entity_id: doc.brightness_entity_id,
            brightness: doc.brightness,
            auto_reload: doc.auto_reload,
            inactivity_time: doc.inactivity_time,
            long_press_duration: doc.long_press_duration,
            current_page_index: 0,
            parent_page_index: 0,
            detached_page: None,
            is_on: true,
            source: None,
        })
    }

    /// Load from a file, remembering it for `reload`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_yaml(&text)?;
        config.source = Some(path.to_path_buf());
        debug!(
            "Loaded {} pages and {} anonymous pages from {}",
            config.pages.len(),
            config.anonymous_pages.len(),
            path.display()
        );
        Ok(config)
    }

    /// Re-read the source document; on error the current configuration is left untouched
    pub fn reload(&mut self) -> Result<(), ConfigError> {
        let path = self.source.clone().ok_or(ConfigError::NoSource)?;
        let fresh = Self::load(&path)?;

        let detached = self.detached_page.take().map(|p| p.name);
        let last = fresh.pages.len() - 1;
        *self = Self {
            current_page_index: self.current_page_index.min(last),
            parent_page_index: self.parent_page_index.min(last),
            is_on: self.is_on,
            ..fresh
        };

        if let Some(name) = detached {
            self.detached_page = self
                .anonymous_pages
                .iter()
                .find(|p| p.name == name)
                .cloned();
            if self.detached_page.is_none() {
                info!("Detached page {:?} is gone after reload, closing it", name);
            }
        }
        info!("Reloaded configuration from {}", path.display());
        Ok(())
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn is_on(&self) -> bool {
        self.is_on
    }

    pub fn set_on(&mut self, on: bool) {
        self.is_on = on;
    }

    pub fn inactivity_timeout(&self) -> Option<Duration> {
        (self.inactivity_time >= 0.0).then(|| Duration::from_secs_f64(self.inactivity_time))
    }

    pub fn long_press_threshold(&self) -> Duration {
        Duration::from_secs_f64(self.long_press_duration)
    }
}

fn validate(doc: &Document) -> Result<(), ConfigError> {
    let invalid = |msg: String| Err(ConfigError::Invalid(msg));

    if doc.pages.is_empty() {
        return invalid("at least one page is required".to_string());
    }
    if doc.brightness > 100 {
        return invalid(format!("brightness must be 0-100, got {}", doc.brightness));
    }
    if doc.long_press_duration < 0.0 || !doc.long_press_duration.is_finite() {
        return invalid(format!(
            "long_press_duration must be non-negative, got {}",
            doc.long_press_duration
        ));
    }
    if !doc.inactivity_time.is_finite() {
        return invalid("inactivity_time must be a number".to_string());
    }

    for (kind, pages) in [("pages", &doc.pages), ("anonymous_pages", &doc.anonymous_pages)] {
        let mut seen = HashSet::new();
        for page in pages.iter() {
            if !seen.insert(page.name.as_str()) {
                return invalid(format!("duplicate page name {:?} in {}", page.name, kind));
            }
        }
    }

    let exists = |name: &str| {
        doc.pages.iter().any(|p| p.name == name) || doc.anonymous_pages.iter().any(|p| p.name == name)
    };
    for page in doc.pages.iter().chain(&doc.anonymous_pages) {
        for (key, button) in page.buttons.iter().enumerate() {
            let long_press = button.long_press.as_ref().map(|lp| &lp.special_type);
            for special in std::iter::once(&button.special_type).chain(long_press) {
                match special {
                    SpecialType::GoToPage(PageTarget::Index(i)) if *i >= doc.pages.len() => {
                        return invalid(format!(
                            "page {:?} key {}: go-to-page index {} out of range ({} pages)",
                            page.name,
                            key,
                            i,
                            doc.pages.len()
                        ));
                    }
                    SpecialType::GoToPage(PageTarget::Name(name))
                        if !name.contains('{') && !exists(name) =>
                    {
                        return invalid(format!(
                            "page {:?} key {}: go-to-page target {:?} does not exist",
                            page.name, key, name
                        ));
                    }
                    _ => {}
                }
            }
        }
    }
    Ok(())
}
