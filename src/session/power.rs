use anyhow::Result;
use serde_json::{Map, Value};
use tracing::{info, warn};

use super::Session;
use crate::device::Deck;
use crate::hub::HubCommand;
use crate::state;

impl<D: Deck> Session<D> {
    pub(super) async fn set_power(&mut self, on: bool) -> Result<()> {
        if on {
            self.turn_on().await
        } else {
            self.turn_off().await
        }
    }

    /// Light the deck and redraw whatever page is visible
    pub(super) async fn turn_on(&mut self) -> Result<()> {
        if self.config.is_on() {
            return Ok(());
        }
        info!("Turning on");
        self.config.set_on(true);
        self.redraw_all().await?;
        self.deck.set_brightness(self.config.brightness).await
    }

    /// Blank the deck; redraws are suppressed until turned on again
    pub(super) async fn turn_off(&mut self) -> Result<()> {
        if !self.config.is_on() {
            return Ok(());
        }
        info!("Turning off");
        self.config.set_on(false);
        self.invalidate_all();
        self.deck.reset().await?;
        self.deck.set_brightness(0).await
    }

    /// Mirror the power state to the state entity when it is an input_boolean
    pub(super) fn sync_input_boolean(&self, on: bool) {
        let Some(entity_id) = self.config.state_entity_id.as_deref() else {
            return;
        };
        if state::domain(entity_id) != Some("input_boolean") {
            return;
        }
        let mut target = Map::new();
        target.insert("entity_id".to_string(), Value::from(entity_id));
        let command = HubCommand::CallService {
            service: format!("input_boolean.turn_{}", if on { "on" } else { "off" }),
            service_data: Map::new(),
            target: Some(target),
        };
        if self.hub.send(command).is_err() {
            warn!("Hub connection is gone; cannot sync {}", entity_id);
        }
    }

    /// Input while off only wakes the deck
    pub(super) async fn wake(&mut self) -> Result<()> {
        self.turn_on().await?;
        self.sync_input_boolean(true);
        Ok(())
    }

    /// Take the deck brightness from the brightness entity
    pub(super) async fn apply_brightness_entity(&mut self, entity_id: &str) -> Result<()> {
        let Some(entity) = self.states.get(entity_id) else {
            return Ok(());
        };
        let brightness = if state::domain(entity_id) == Some("light") {
            if entity.is_on() {
                let raw = entity.numeric_attribute("brightness").unwrap_or(255.0);
                (raw.clamp(0.0, 255.0) * 100.0 / 255.0).round() as u8
            } else {
                0
            }
        } else {
            match entity.state.trim().parse::<f64>() {
                Ok(value) if value.is_finite() => value.clamp(0.0, 100.0).round() as u8,
                _ => {
                    warn!(
                        "Ignoring non-numeric brightness {:?} from {}",
                        entity.state, entity_id
                    );
                    return Ok(());
                }
            }
        };

        info!("Brightness set to {}% by {}", brightness, entity_id);
        self.config.brightness = brightness;
        if self.config.is_on() {
            self.deck.set_brightness(brightness).await?;
        }
        Ok(())
    }
}
