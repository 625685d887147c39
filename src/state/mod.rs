//! Snapshot of remote entity state, keyed by entity id

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// State of a single remote entity as reported by the hub
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub entity_id: String,
    #[serde(deserialize_with = "scalar_as_string")]
    pub state: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl EntityState {
    pub fn new(entity_id: &str, state: &str) -> Self {
        Self {
            entity_id: entity_id.to_string(),
            state: state.to_string(),
            attributes: Map::new(),
        }
    }

    /// Builder-style attribute setter
    pub fn with_attribute(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    pub fn is_on(&self) -> bool {
        self.state == "on"
    }

    pub fn is_off(&self) -> bool {
        self.state == "off"
    }

    /// Numeric attribute, accepting numbers and numeric strings
    pub fn numeric_attribute(&self, name: &str) -> Option<f64> {
        match self.attributes.get(name)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// The hub occasionally reports states as bare numbers or booleans
fn scalar_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// Full state of every known entity.
///
/// Cloning is cheap; the map is shared until the next mutation.
#[derive(Debug, Clone, Default)]
pub struct StateSnapshot {
    entities: Arc<HashMap<String, EntityState>>,
}

impl StateSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_states(states: impl IntoIterator<Item = EntityState>) -> Self {
        let entities = states
            .into_iter()
            .map(|s| (s.entity_id.clone(), s))
            .collect();
        Self {
            entities: Arc::new(entities),
        }
    }

    pub fn get(&self, entity_id: &str) -> Option<&EntityState> {
        self.entities.get(entity_id)
    }

    pub fn contains(&self, entity_id: &str) -> bool {
        self.entities.contains_key(entity_id)
    }

    /// Raw state string of an entity
    pub fn state(&self, entity_id: &str) -> Option<&str> {
        self.get(entity_id).map(|s| s.state.as_str())
    }

    pub fn attribute(&self, entity_id: &str, attribute: &str) -> Option<&Value> {
        self.get(entity_id)?.attributes.get(attribute)
    }

    /// Apply a state-changed notification; `None` means the entity was removed
    pub fn update(&mut self, entity_id: &str, new_state: Option<EntityState>) {
        let entities = Arc::make_mut(&mut self.entities);
        match new_state {
            Some(state) => {
                entities.insert(entity_id.to_string(), state);
            }
            None => {
                entities.remove(entity_id);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// Domain part of an entity id or service name (`light.kitchen` -> `light`)
pub fn domain(id: &str) -> Option<&str> {
    id.split_once('.').map(|(domain, _)| domain)
}
