//! Which part of the deck a state change affects

use crate::config::DeckConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Redraw {
    /// The entity mirrors the device's on/off state
    Power,
    Brightness,
    /// Positions on the visible page bound to the entity
    Widgets { keys: Vec<usize>, dials: Vec<usize> },
    Nothing,
}

/// Resolve a changed entity against the visible page only
pub fn resolve(config: &DeckConfig, entity_id: &str) -> Redraw {
    if config.state_entity_id.as_deref() == Some(entity_id) {
        return Redraw::Power;
    }
    if config.brightness_entity_id.as_deref() == Some(entity_id) {
        return Redraw::Brightness;
    }

    let page = config.current_page();
    let keys = page.keys_bound_to(entity_id);
    let dials = page.dials_bound_to(entity_id);
    if keys.is_empty() && dials.is_empty() {
        Redraw::Nothing
    } else {
        Redraw::Widgets { keys, dials }
    }
}
