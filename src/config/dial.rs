use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::warn;

use super::button::{Action, Appearance, Delay};
use crate::state::{EntityState, StateSnapshot};
use crate::template::{DialValues, Templater};

const DEFAULT_MIN: f64 = 0.0;
const DEFAULT_MAX: f64 = 100.0;
const DEFAULT_STEP: f64 = 1.0;

/// Effective bounds of a dial after defaults and corrections
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Limits {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

/// Value range and current value of a dial turn
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawTurnProperties")]
pub struct TurnProperties {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub step: Option<f64>,
    pub state: f64,
    /// Entity attribute that seeds `state` instead of the entity state itself
    pub service_attribute: Option<String>,
    limits: Limits,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTurnProperties {
    min: Option<f64>,
    max: Option<f64>,
    step: Option<f64>,
    #[serde(default)]
    state: f64,
    service_attribute: Option<String>,
}

impl TryFrom<RawTurnProperties> for TurnProperties {
    type Error = String;

    fn try_from(raw: RawTurnProperties) -> Result<Self, Self::Error> {
        if let (Some(min), Some(max)) = (raw.min, raw.max) {
            if min >= max {
                return Err(format!("dial min ({}) must be below max ({})", min, max));
            }
        }
        let mut properties = Self {
            min: raw.min,
            max: raw.max,
            step: raw.step,
            state: raw.state,
            service_attribute: raw.service_attribute,
            limits: Limits {
                min: DEFAULT_MIN,
                max: DEFAULT_MAX,
                step: DEFAULT_STEP,
            },
        };
        properties.resolve_limits(None);
        Ok(properties)
    }
}

impl Default for TurnProperties {
    fn default() -> Self {
        Self {
            min: None,
            max: None,
            step: None,
            state: 0.0,
            service_attribute: None,
            limits: Limits {
                min: DEFAULT_MIN,
                max: DEFAULT_MAX,
                step: DEFAULT_STEP,
            },
        }
    }
}

impl TurnProperties {
    pub fn limits(&self) -> Limits {
        self.limits
    }

    pub fn values(&self) -> DialValues {
        DialValues {
            state: self.state,
            min: self.limits.min,
            max: self.limits.max,
            step: self.limits.step,
        }
    }

    /// Move by `ticks` steps, staying within bounds
    pub fn increment(&mut self, ticks: i32) {
        let Limits { min, max, step } = self.limits;
        self.state = (self.state + ticks as f64 * step).clamp(min, max);
    }

    /// Set the value directly, e.g. to an extreme from a touch gesture
    pub fn set_state(&mut self, value: f64) {
        let Limits { min, max, .. } = self.limits;
        self.state = value.clamp(min, max);
    }

    /// Take the current value (and missing bounds) from the bound entity
    pub fn seed(&mut self, entity: &EntityState) {
        self.resolve_limits(Some(entity));

        let seed = match &self.service_attribute {
            Some(attr) => entity.numeric_attribute(attr),
            None => entity.state.trim().parse().ok(),
        };
        if let Some(value) = seed {
            self.set_state(value);
        }
    }

    /// Apply defaults and entity attributes, coercing bounds that violate `min < max`
    fn resolve_limits(&mut self, entity: Option<&EntityState>) {
        let from_entity = |name: &str| entity.and_then(|e| e.numeric_attribute(name));
        let min = self.min.or_else(|| from_entity("min")).unwrap_or(DEFAULT_MIN);
        let mut max = self.max.or_else(|| from_entity("max")).unwrap_or(DEFAULT_MAX);
        let mut step = self.step.or_else(|| from_entity("step")).unwrap_or(DEFAULT_STEP);

        let mut corrected = false;
        if min >= max {
            max = min + 1.0;
            corrected = true;
        }
        if step.abs() > max - min {
            step = (max - min).copysign(step);
            corrected = true;
        }

        let limits = Limits { min, max, step };
        if corrected && limits != self.limits {
            warn!(
                "Dial bounds corrected to min={} max={} step={}",
                limits.min, limits.max, limits.step
            );
        }
        self.limits = limits;
        self.state = self.state.clamp(min, max);
    }
}

/// Service invoked when the dial is turned
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DialTurn {
    pub service: Option<String>,
    pub service_data: Option<Map<String, Value>>,
    pub target: Option<Map<String, Value>>,
    /// Quiet period after the last tick before the service is called
    pub delay: Option<Delay>,
    #[serde(default)]
    pub properties: TurnProperties,
}

/// Service invoked when the dial is pressed
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DialPush {
    pub service: Option<String>,
    pub service_data: Option<Map<String, Value>>,
    pub target: Option<Map<String, Value>>,
}

/// One rotary encoder and its slice of the touchscreen
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(try_from = "RawDial")]
pub struct Dial {
    pub entity_id: Option<String>,
    pub linked_entity: Option<String>,
    pub appearance: Appearance,
    pub turn: Option<DialTurn>,
    pub push: Option<DialPush>,
    pub allow_touchscreen_events: bool,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDial {
    entity_id: Option<String>,
    linked_entity: Option<String>,
    text: Option<String>,
    text_color: Option<String>,
    text_size: Option<u32>,
    text_offset: Option<i32>,
    icon: Option<String>,
    icon_mdi: Option<String>,
    icon_background_color: Option<String>,
    icon_mdi_color: Option<String>,
    #[serde(default)]
    icon_gray_when_off: bool,
    turn: Option<DialTurn>,
    push: Option<DialPush>,
    #[serde(default)]
    allow_touchscreen_events: bool,
}

impl TryFrom<RawDial> for Dial {
    type Error = String;

    fn try_from(raw: RawDial) -> Result<Self, Self::Error> {
        if let Some(Delay::Seconds(s)) = raw.turn.as_ref().and_then(|t| t.delay.as_ref()) {
            if *s < 0.0 {
                return Err(format!("dial turn delay must be non-negative, got {}", s));
            }
        }
        Ok(Self {
            entity_id: raw.entity_id,
            linked_entity: raw.linked_entity,
            appearance: Appearance {
                text: raw.text,
                text_color: raw.text_color,
                text_size: raw.text_size,
                text_offset: raw.text_offset,
                icon: raw.icon,
                icon_mdi: raw.icon_mdi,
                icon_background_color: raw.icon_background_color,
                icon_mdi_color: raw.icon_mdi_color,
                icon_gray_when_off: raw.icon_gray_when_off,
            },
            turn: raw.turn,
            push: raw.push,
            allow_touchscreen_events: raw.allow_touchscreen_events,
        })
    }
}

impl Dial {
    pub const TEMPLATABLE: &'static [&'static str] = &[
        "entity_id",
        "linked_entity",
        "text",
        "text_color",
        "icon",
        "icon_mdi",
        "icon_background_color",
        "icon_mdi_color",
        "turn.service",
        "turn.service_data",
        "turn.target",
        "turn.delay",
        "push.service",
        "push.service_data",
        "push.target",
    ];

    pub fn values(&self) -> DialValues {
        self.turn
            .as_ref()
            .map(|t| t.properties.values())
            .unwrap_or(DialValues {
                state: 0.0,
                min: DEFAULT_MIN,
                max: DEFAULT_MAX,
                step: DEFAULT_STEP,
            })
    }

    /// Copy with templatable fields evaluated; templates may use `dial_value()`
    pub fn rendered(&self, states: &StateSnapshot) -> Dial {
        let t = Templater::for_dial(states, self.values());
        Dial {
            entity_id: t.render_opt(self.entity_id.as_ref()),
            linked_entity: t.render_opt(self.linked_entity.as_ref()),
            appearance: self.appearance.rendered(&t),
            turn: self.turn.as_ref().map(|turn| DialTurn {
                service: t.render_opt(turn.service.as_ref()),
                service_data: turn.service_data.as_ref().map(|d| t.render_map(d)),
                target: turn.target.as_ref().map(|d| t.render_map(d)),
                delay: turn.delay.as_ref().map(|d| d.rendered(&t)),
                properties: turn.properties.clone(),
            }),
            push: self.push.as_ref().map(|push| DialPush {
                service: t.render_opt(push.service.as_ref()),
                service_data: push.service_data.as_ref().map(|d| t.render_map(d)),
                target: push.target.as_ref().map(|d| t.render_map(d)),
            }),
            allow_touchscreen_events: self.allow_touchscreen_events,
        }
    }

    pub fn is_bound_to(&self, entity_id: &str) -> bool {
        self.entity_id.as_deref() == Some(entity_id)
            || self.linked_entity.as_deref() == Some(entity_id)
    }

    /// Coalescing delay after the last tick, zero when unset
    pub fn turn_delay_seconds(&self) -> f64 {
        self.turn
            .as_ref()
            .and_then(|t| t.delay.as_ref())
            .and_then(Delay::seconds)
            .filter(|s| *s > 0.0)
            .unwrap_or(0.0)
    }

    pub fn turn_action(&self) -> Option<Action> {
        let turn = self.turn.as_ref()?;
        Some(self.action(turn.service.clone(), turn.service_data.clone(), turn.target.clone()))
    }

    pub fn push_action(&self) -> Option<Action> {
        let push = self.push.as_ref()?;
        Some(self.action(push.service.clone(), push.service_data.clone(), push.target.clone()))
    }

    /// Dial calls always carry the bound entity in their service data
    fn action(
        &self,
        service: Option<String>,
        service_data: Option<Map<String, Value>>,
        target: Option<Map<String, Value>>,
    ) -> Action {
        let mut data = service_data.unwrap_or_default();
        if let Some(entity_id) = &self.entity_id {
            data.entry("entity_id")
                .or_insert_with(|| Value::from(entity_id.as_str()));
        }
        Action {
            entity_id: self.entity_id.clone(),
            service,
            service_data: Some(data),
            target,
            ..Action::default()
        }
    }

    /// Re-seed the turn value from the bound entity, if there is one in `states`
    pub fn sync_with_state(&mut self, states: &StateSnapshot) {
        let Some(entity) = self.entity_id.as_deref().and_then(|id| states.get(id)) else {
            return;
        };
        if let Some(turn) = self.turn.as_mut() {
            turn.properties.seed(entity);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dial(yaml: &str) -> Dial {
        serde_yml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_increment_clamps() {
        let mut d = dial("entity_id: input_number.x\nturn:\n  properties: {min: 0, max: 100, step: 5}");
        let props = &mut d.turn.as_mut().unwrap().properties;
        props.increment(3);
        assert_eq!(props.state, 15.0);
        props.increment(100);
        assert_eq!(props.state, 100.0);
        props.increment(-1000);
        assert_eq!(props.state, 0.0);

        // Negative step reverses direction but still clamps
        let mut d = dial("turn:\n  properties: {min: -10, max: 10, step: -3, state: 0}");
        let props = &mut d.turn.as_mut().unwrap().properties;
        props.increment(4);
        assert_eq!(props.state, -10.0);
    }

    #[test]
    fn test_min_not_below_max_rejected() {
        assert!(serde_yml::from_str::<Dial>("turn:\n  properties: {min: 10, max: 10}").is_err());
        assert!(serde_yml::from_str::<Dial>("turn:\n  properties: {min: 20, max: 10}").is_err());
    }

    #[test]
    fn test_bounds_coerced_from_entity() {
        let mut d = dial("entity_id: input_number.x\nturn: {}");
        let entity = EntityState::new("input_number.x", "7")
            .with_attribute("min", 50)
            .with_attribute("max", 20);
        d.turn.as_mut().unwrap().properties.seed(&entity);
        let limits = d.turn.as_ref().unwrap().properties.limits();
        assert_eq!(limits.min, 50.0);
        assert_eq!(limits.max, 51.0);
        assert_eq!(limits.step, 1.0);
        assert_eq!(d.values().state, 50.0);
    }

    #[test]
    fn test_step_larger_than_range_coerced() {
        let d = dial("turn:\n  properties: {min: 0, max: 4, step: 10}");
        assert_eq!(d.turn.unwrap().properties.limits().step, 4.0);
    }

    #[test]
    fn test_seed_from_attribute() {
        let mut d = dial(
            "entity_id: light.x\nturn:\n  properties: {min: 0, max: 255, service_attribute: brightness}",
        );
        let states = StateSnapshot::from_states([
            EntityState::new("light.x", "on").with_attribute("brightness", 120)
        ]);
        d.sync_with_state(&states);
        assert_eq!(d.values().state, 120.0);

        // Non-numeric seeds leave the value alone
        let states = StateSnapshot::from_states([EntityState::new("light.x", "off")]);
        d.sync_with_state(&states);
        assert_eq!(d.values().state, 120.0);
    }

    #[test]
    fn test_turn_action_inserts_entity() {
        let d = dial(
            "entity_id: input_number.x\nturn:\n  service: input_number.set_value\n  service_data: {value: \"{{ dial_value() }}\"}\n  properties: {state: 30}",
        );
        let action = d.rendered(&StateSnapshot::new()).turn_action().unwrap();
        let data = action.service_data.unwrap();
        assert_eq!(data["entity_id"], Value::from("input_number.x"));
        assert_eq!(data["value"], Value::from("30.0"));

        let d = dial("entity_id: input_number.x\npush: {service: input_number.reset}");
        let data = d.push_action().unwrap().service_data.unwrap();
        assert_eq!(data["entity_id"], Value::from("input_number.x"));
    }
}
